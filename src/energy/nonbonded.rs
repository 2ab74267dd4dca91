// Copyright (c) 2022 Mikael Lund
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//!
//! Pairwise-additive nonbonded interactions. The pair-potential zoo is kept
//! at the trait boundary; the concrete set below covers the models used by
//! the test scenarios. `Nonbonded` owns the change-driven bookkeeping that
//! restricts the O(N²) pair sum to particles touched by the latest move.
//!

use crate::change::{Change, GroupChange};
use crate::energy::EnergyTerm;
use crate::group::Group;
use crate::particle::Particle;
use crate::space::Space;
use crate::topology::Topology;
use itertools::Itertools;

/// Numerical overlap guard (Å²); below this separation any potential with
/// a singular core reports +∞
const OVERLAP_LIMIT_SQUARED: f64 = 1e-12;

/// Pair energy between two particles at a given minimum-image squared
/// distance, in kT
pub trait PairPotential {
    fn energy(&self, a: &Particle, b: &Particle, squared_distance: f64) -> f64;
}

/// No interaction; ideal-gas reference systems
#[derive(Clone, Copy, Debug, Default)]
pub struct Ideal;

impl PairPotential for Ideal {
    fn energy(&self, _a: &Particle, _b: &Particle, _squared_distance: f64) -> f64 {
        0.0
    }
}

///
/// 12-6 Lennard-Jones with Lorentz-Berthelot mixing, parameterized from
/// the atom table at construction.
///
#[derive(Clone, Debug)]
pub struct LennardJones {
    /// flattened per-pair (σ², 4ε) table, row-major over atom ids
    table: Vec<(f64, f64)>,
    kinds: usize,
}

impl LennardJones {
    pub fn new(topology: &Topology) -> Self {
        let kinds = topology.atoms.len();
        let mut table = Vec::with_capacity(kinds * kinds);
        for a in &topology.atoms {
            for b in &topology.atoms {
                let sigma = 0.5 * (a.sigma + b.sigma);
                let eps = (a.eps * b.eps).sqrt();
                table.push((sigma * sigma, 4.0 * eps));
            }
        }
        LennardJones { table, kinds }
    }
}

impl PairPotential for LennardJones {
    fn energy(&self, a: &Particle, b: &Particle, squared_distance: f64) -> f64 {
        if squared_distance < OVERLAP_LIMIT_SQUARED {
            return f64::INFINITY;
        }
        let (sigma_squared, four_eps) = self.table[a.id * self.kinds + b.id];
        let x = (sigma_squared / squared_distance).powi(3);
        four_eps * (x * x - x)
    }
}

/// Plain truncated Coulomb with a Bjerrum-length prefactor
#[derive(Clone, Copy, Debug)]
pub struct Coulomb {
    /// Bjerrum length, e²/(4πε₀ε_r·k_BT), in Å
    pub bjerrum_length: f64,
}

impl Coulomb {
    pub fn new(bjerrum_length: f64) -> Self {
        Coulomb { bjerrum_length }
    }
}

impl PairPotential for Coulomb {
    fn energy(&self, a: &Particle, b: &Particle, squared_distance: f64) -> f64 {
        if a.charge == 0.0 || b.charge == 0.0 {
            return 0.0;
        }
        if squared_distance < OVERLAP_LIMIT_SQUARED {
            return f64::INFINITY;
        }
        self.bjerrum_length * a.charge * b.charge / squared_distance.sqrt()
    }
}

/// Infinite wall at contact, zero beyond; σ from the atom table
#[derive(Clone, Debug)]
pub struct HardSphere {
    /// per-pair squared contact distance, row-major over atom ids
    table: Vec<f64>,
    kinds: usize,
}

impl HardSphere {
    pub fn new(topology: &Topology) -> Self {
        let kinds = topology.atoms.len();
        let mut table = Vec::with_capacity(kinds * kinds);
        for a in &topology.atoms {
            for b in &topology.atoms {
                let contact = 0.5 * (a.sigma + b.sigma);
                table.push(contact * contact);
            }
        }
        HardSphere { table, kinds }
    }
}

impl PairPotential for HardSphere {
    fn energy(&self, a: &Particle, b: &Particle, squared_distance: f64) -> f64 {
        if squared_distance < self.table[a.id * self.kinds + b.id] {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Sum of two pair potentials, e.g. Lennard-Jones plus Coulomb or the
/// primitive model (hard sphere plus Coulomb)
#[derive(Clone, Debug)]
pub struct Sum<A: PairPotential, B: PairPotential>(pub A, pub B);

impl<A: PairPotential, B: PairPotential> PairPotential for Sum<A, B> {
    fn energy(&self, a: &Particle, b: &Particle, squared_distance: f64) -> f64 {
        let first = self.0.energy(a, b, squared_distance);
        if first.is_infinite() {
            return first;
        }
        first + self.1.energy(a, b, squared_distance)
    }
}

///
/// Nonbonded energy term: all active-active pair interactions within a
/// spherical cutoff, evaluated incrementally from the change descriptor.
///
pub struct Nonbonded<T: PairPotential> {
    pair_potential: T,
    cutoff_squared: f64,
}

impl<T: PairPotential> Nonbonded<T> {
    pub fn new(pair_potential: T, cutoff: f64) -> Self {
        Self {
            pair_potential,
            cutoff_squared: cutoff * cutoff,
        }
    }

    fn pair(&self, space: &Space, i: usize, j: usize) -> f64 {
        let a = &space.particles[i];
        let b = &space.particles[j];
        let squared_distance = space.cell.sqdist(&a.pos, &b.pos);
        if squared_distance > self.cutoff_squared {
            0.0
        } else {
            self.pair_potential.energy(a, b, squared_distance)
        }
    }

    ///
    /// Absolute indices of the *active* particles a group-change touches.
    /// Listed slots beyond the active size are skipped: a deleted particle
    /// contributes on the accepted side only and an inserted one on the
    /// trial side only, which is exactly the wanted delta.
    ///
    fn touched(space: &Space, group_change: &GroupChange) -> Vec<usize> {
        let group = &space.groups[group_change.group_index];
        if group_change.all {
            group.range().collect()
        } else {
            group_change
                .atom_indices
                .iter()
                .filter(|&&rel| rel < group.size)
                .map(|&rel| group.absolute(rel))
                .collect()
        }
    }

    /// Interactions of the given absolute indices with every active
    /// particle of another group
    fn atoms_vs_group(&self, space: &Space, atoms: &[usize], other: &Group) -> f64 {
        let mut energy = 0.0;
        for &i in atoms {
            for j in other.range() {
                energy += self.pair(space, i, j);
            }
        }
        energy
    }

    /// All active pair interactions between two distinct groups
    fn group_to_group(&self, space: &Space, a: &Group, b: &Group) -> f64 {
        let mut energy = 0.0;
        for i in a.range() {
            for j in b.range() {
                energy += self.pair(space, i, j);
            }
        }
        energy
    }

    /// All active pair interactions within one group
    fn intra_full(&self, space: &Space, group: &Group) -> f64 {
        let mut energy = 0.0;
        let range = group.range();
        for i in range.clone() {
            for j in (i + 1)..range.end {
                energy += self.pair(space, i, j);
            }
        }
        energy
    }

    /// Intra-group pairs with at least one endpoint in `atoms`, counted once
    fn intra_partial(&self, space: &Space, group: &Group, atoms: &[usize]) -> f64 {
        let mut energy = 0.0;
        for (k, &i) in atoms.iter().enumerate() {
            for j in group.range() {
                if j == i {
                    continue;
                }
                // pairs between two touched atoms count once
                if atoms[..k].contains(&j) {
                    continue;
                }
                energy += self.pair(space, i, j);
            }
        }
        energy
    }

    /// Pairs between two changed groups with at least one changed endpoint
    fn changed_to_changed(
        &self,
        space: &Space,
        first: &GroupChange,
        second: &GroupChange,
    ) -> f64 {
        let group_a = &space.groups[first.group_index];
        let group_b = &space.groups[second.group_index];
        if first.all || second.all {
            return self.group_to_group(space, group_a, group_b);
        }
        let touched_a = Self::touched(space, first);
        let touched_b = Self::touched(space, second);
        let mut energy = self.atoms_vs_group(space, &touched_a, group_b);
        for &j in &touched_b {
            for i in group_a.range() {
                if touched_a.contains(&i) {
                    continue; // already counted above
                }
                energy += self.pair(space, i, j);
            }
        }
        energy
    }

    fn system_energy(&self, space: &Space) -> f64 {
        let mut energy = 0.0;
        for (a, b) in space.groups.iter().tuple_combinations() {
            energy += self.group_to_group(space, a, b);
            if energy.is_infinite() {
                return f64::INFINITY;
            }
        }
        for group in &space.groups {
            energy += self.intra_full(space, group);
            if energy.is_infinite() {
                return f64::INFINITY;
            }
        }
        energy
    }

    fn partial_energy(&self, space: &Space, change: &Change) -> f64 {
        let mut energy = 0.0;
        for (k, group_change) in change.groups.iter().enumerate() {
            let group = &space.groups[group_change.group_index];
            let whole = group_change.all;
            let touched = Self::touched(space, group_change);
            // against groups outside the change
            for (gj, other) in space.groups.iter().enumerate() {
                if change.groups.iter().any(|c| c.group_index == gj) {
                    continue;
                }
                energy += if whole {
                    self.group_to_group(space, group, other)
                } else {
                    self.atoms_vs_group(space, &touched, other)
                };
            }
            // against later changed groups, counted once
            for later in change.groups.iter().skip(k + 1) {
                energy += self.changed_to_changed(space, group_change, later);
            }
            if group_change.internal {
                energy += if whole {
                    self.intra_full(space, group)
                } else {
                    self.intra_partial(space, group, &touched)
                };
            }
            if energy.is_infinite() {
                return f64::INFINITY;
            }
        }
        energy
    }
}

impl<T: PairPotential> EnergyTerm for Nonbonded<T> {
    fn name(&self) -> &'static str {
        "nonbonded"
    }

    fn energy(&self, space: &Space, change: &Change) -> f64 {
        if change.everything || change.volume_changed {
            self.system_energy(space)
        } else {
            self.partial_energy(space, change)
        }
    }

    fn internal(&self, space: &Space, group: &Group) -> f64 {
        self.intra_full(space, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, InsertionPolicy, MoleculeKind, Topology};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn two_ion_space() -> Space {
        let mut topology = Topology::default();
        for (name, charge) in [("P", 1.0), ("M", -1.0)] {
            topology.atoms.push(AtomKind {
                name: name.to_string(),
                sigma: 2.0,
                eps: 0.25,
                mass: 1.0,
                charge,
                implicit: false,
                activity: None,
                dipole: None,
                cigar: None,
            });
        }
        for (name, atom) in [("P", 0), ("M", 1)] {
            topology.molecules.push(MoleculeKind {
                name: name.to_string(),
                atomic: true,
                atoms: vec![atom],
                bonds: vec![],
                conformations: vec![],
                weights: vec![],
                insertion: InsertionPolicy::default(),
            });
        }
        let mut space = Space::from_topology(
            Arc::new(topology),
            Cell::cube(100.0).unwrap(),
            &[(0, 2, 0), (1, 2, 0)],
        )
        .unwrap();
        let positions = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(0.0, 4.0, 0.0),
            Vector3::new(4.0, 4.0, 0.0),
        ];
        for (particle, pos) in space.particles.iter_mut().zip(positions) {
            particle.pos = pos;
        }
        space
    }

    #[test]
    fn test_coulomb_system_energy() {
        let space = two_ion_space();
        let nonbonded = Nonbonded::new(Coulomb::new(7.0), 50.0);
        let reference = nonbonded.system_energy(&space);
        let mut direct = 0.0;
        for i in 0..4 {
            for j in (i + 1)..4 {
                let r2 = space
                    .cell
                    .sqdist(&space.particles[i].pos, &space.particles[j].pos);
                direct += 7.0 * space.particles[i].charge * space.particles[j].charge / r2.sqrt();
            }
        }
        assert_relative_eq!(reference, direct, epsilon = 1e-12);
    }

    #[test]
    fn test_partial_matches_full_difference() {
        let mut space = two_ion_space();
        let nonbonded = Nonbonded::new(Coulomb::new(7.0), 50.0);
        let before = nonbonded.system_energy(&space);
        let mut change = Change::default();
        change.groups.push(GroupChange::single(0, 1));
        let partial_before = nonbonded.energy(&space, &change);
        space.particles[1].pos = Vector3::new(6.0, 1.0, -2.0);
        let partial_after = nonbonded.energy(&space, &change);
        let after = nonbonded.system_energy(&space);
        assert_relative_eq!(after - before, partial_after - partial_before, epsilon = 1e-10);
    }

    #[test]
    fn test_deleted_atom_leaves_sum() {
        let mut space = two_ion_space();
        let nonbonded = Nonbonded::new(Coulomb::new(7.0), 50.0);
        let full_before = nonbonded.system_energy(&space);
        // deactivate the last cation (relative slot 1 of group 0)
        let mut change = Change::default();
        change.matter_changed = true;
        change.groups.push(GroupChange {
            group_index: 0,
            size_changed: true,
            internal: true,
            atom_indices: vec![1],
            ..Default::default()
        });
        let partial_before = nonbonded.energy(&space, &change);
        space.groups[0].deactivate(1, 0).unwrap();
        let partial_after = nonbonded.energy(&space, &change);
        let full_after = nonbonded.system_energy(&space);
        assert_relative_eq!(
            full_after - full_before,
            partial_after - partial_before,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_hard_sphere_overlap_is_infinite() {
        let mut space = two_ion_space();
        let nonbonded = Nonbonded::new(HardSphere::new(&space.topology.clone()), 50.0);
        assert_eq!(nonbonded.system_energy(&space), 0.0);
        space.particles[1].pos = Vector3::new(1.0, 0.0, 0.0);
        assert!(nonbonded.system_energy(&space).is_infinite());
    }

    #[test]
    fn test_lennard_jones_minimum() {
        let space = two_ion_space();
        let lj = LennardJones::new(&space.topology);
        let a = &space.particles[0];
        let b = &space.particles[1];
        // at r = 2^(1/6) σ the potential is exactly -ε
        let r2 = (2.0_f64.powf(1.0 / 6.0) * 2.0).powi(2);
        assert_relative_eq!(lj.energy(a, b, r2), -0.25, epsilon = 1e-12);
        assert!(lj.energy(a, b, 0.0).is_infinite());
    }
}
