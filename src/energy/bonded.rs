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
//! Intramolecular bonded interactions, read from the molecule table. Only
//! changes flagged `internal` touch this term; rigid-body moves leave it
//! untouched by construction.
//!

use crate::change::Change;
use crate::energy::EnergyTerm;
use crate::group::Group;
use crate::space::Space;

#[derive(Clone, Copy, Debug, Default)]
pub struct Bonded;

impl Bonded {
    /// All bond energies of one active group (kT)
    fn group_energy(space: &Space, group: &Group) -> f64 {
        if !group.is_active() || group.atomic {
            return 0.0;
        }
        let kind = &space.topology.molecules[group.molid];
        let mut energy = 0.0;
        for bond in &kind.bonds {
            let (i, j) = bond.index();
            let a = &space.particles[group.absolute(i)];
            let b = &space.particles[group.absolute(j)];
            let r = space.cell.vdist(&a.pos, &b.pos).norm();
            energy += bond.energy(r);
        }
        energy
    }

    /// Bonds with at least one endpoint among the given relative indices
    fn partial_energy(space: &Space, group: &Group, relative: &[usize]) -> f64 {
        if !group.is_active() || group.atomic {
            return 0.0;
        }
        let kind = &space.topology.molecules[group.molid];
        let mut energy = 0.0;
        for bond in &kind.bonds {
            let (i, j) = bond.index();
            if !relative.contains(&i) && !relative.contains(&j) {
                continue;
            }
            let a = &space.particles[group.absolute(i)];
            let b = &space.particles[group.absolute(j)];
            let r = space.cell.vdist(&a.pos, &b.pos).norm();
            energy += bond.energy(r);
        }
        energy
    }
}

impl EnergyTerm for Bonded {
    fn name(&self) -> &'static str {
        "bonded"
    }

    fn energy(&self, space: &Space, change: &Change) -> f64 {
        if change.everything || change.volume_changed {
            return space
                .groups
                .iter()
                .map(|group| Self::group_energy(space, group))
                .sum();
        }
        let mut energy = 0.0;
        for group_change in &change.groups {
            if !group_change.internal {
                continue;
            }
            let group = &space.groups[group_change.group_index];
            energy += if group_change.all {
                Self::group_energy(space, group)
            } else {
                Self::partial_energy(space, group, &group_change.atom_indices)
            };
        }
        energy
    }

    fn internal(&self, space: &Space, group: &Group) -> f64 {
        Self::group_energy(space, group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::GroupChange;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, Bond, InsertionPolicy, MoleculeKind, Topology};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn dimer_space(bond_length: f64) -> Space {
        let mut topology = Topology::default();
        topology.atoms.push(AtomKind {
            name: "B".to_string(),
            sigma: 1.0,
            eps: 0.0,
            mass: 1.0,
            charge: 0.0,
            implicit: false,
            activity: None,
            dipole: None,
            cigar: None,
        });
        topology.molecules.push(MoleculeKind {
            name: "dimer".to_string(),
            atomic: false,
            atoms: vec![0, 0],
            bonds: vec![Bond::Harmonic {
                index: (0, 1),
                k: 10.0,
                req: 2.0,
            }],
            conformations: vec![vec![
                Vector3::zeros(),
                Vector3::new(bond_length, 0.0, 0.0),
            ]],
            weights: vec![],
            insertion: InsertionPolicy::default(),
        });
        Space::from_topology(Arc::new(topology), Cell::cube(50.0).unwrap(), &[(0, 1, 0)]).unwrap()
    }

    #[test]
    fn test_harmonic_energy() {
        let space = dimer_space(3.0);
        let bonded = Bonded;
        // 0.5 * 10 * (3 - 2)^2 = 5 kT
        assert_relative_eq!(bonded.energy(&space, &Change::all()), 5.0);
        assert_relative_eq!(bonded.internal(&space, &space.groups[0]), 5.0);
    }

    #[test]
    fn test_only_internal_changes_count() {
        let space = dimer_space(3.0);
        let bonded = Bonded;
        let mut change = Change::default();
        change.groups.push(GroupChange::whole(0, false));
        assert_relative_eq!(bonded.energy(&space, &change), 0.0);
        let mut change = Change::default();
        change.groups.push(GroupChange {
            group_index: 0,
            internal: true,
            atom_indices: vec![1],
            ..Default::default()
        });
        assert_relative_eq!(bonded.energy(&space, &change), 5.0);
    }

    #[test]
    fn test_inactive_group_has_no_bond_energy() {
        let mut space = dimer_space(3.0);
        space.groups[0].deactivate(2, 0).unwrap();
        let bonded = Bonded;
        assert_relative_eq!(bonded.energy(&space, &Change::all()), 0.0);
    }
}
