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
//! Internal chain moves for flexible polymers: pivot rotates the chain
//! tail about a random axis through a pivot bead, crankshaft rotates the
//! beads between two anchors about the connecting axis.
//!

use crate::change::Change;
use crate::energy::Hamiltonian;
use crate::group::Selection;
use crate::moves::{random_small_rotation, MoveAlgorithm};
use crate::space::Space;
use crate::ConsistencyError;
use nalgebra::{Unit, UnitQuaternion};
use rand::prelude::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;

/// Rotate chain beads `indices` about an axis anchored at bead `anchor`
fn rotate_tail(
    space: &mut Space,
    group_index: usize,
    anchor: usize,
    indices: std::ops::Range<usize>,
    rotation: &UnitQuaternion<f64>,
) {
    let group = space.groups[group_index].clone();
    let origin = space.particles[group.absolute(anchor)].pos;
    let cell = space.cell.clone();
    for relative in indices {
        let particle = &mut space.particles[group.absolute(relative)];
        let arm = cell.vdist(&particle.pos, &origin);
        particle.pos = origin + rotation * arm;
        cell.boundary(&mut particle.pos);
        particle.rotate(rotation);
    }
    space.update_mass_center(group_index);
}

pub struct Pivot {
    label: String,
    molid: usize,
    dprot: f64,
}

impl Pivot {
    pub fn new(label: String, molid: usize, dprot: f64) -> Self {
        Pivot { label, molid, dprot }
    }
}

impl MoveAlgorithm for Pivot {
    fn name(&self) -> &str {
        &self.label
    }

    fn propose(
        &mut self,
        trial: &mut Space,
        _peer: &mut Space,
        _hamiltonian: &Hamiltonian,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<(), ConsistencyError> {
        let candidates: Vec<usize> = trial
            .find_molecules(self.molid, Selection::Active)
            .filter(|&g| !trial.groups[g].atomic && trial.groups[g].size >= 3)
            .collect();
        let Some(&group_index) = candidates.choose(rng) else {
            return Ok(());
        };
        let size = trial.groups[group_index].size;
        let anchor = rng.gen_range(0..size - 1);
        let rotation = random_small_rotation(0.5 * self.dprot, rng);
        rotate_tail(trial, group_index, anchor, anchor + 1..size, &rotation);
        let entry = change.entry(group_index);
        entry.internal = true;
        entry.atom_indices.extend(anchor + 1..size);
        Ok(())
    }
}

pub struct Crankshaft {
    label: String,
    molid: usize,
    dprot: f64,
}

impl Crankshaft {
    pub fn new(label: String, molid: usize, dprot: f64) -> Self {
        Crankshaft { label, molid, dprot }
    }
}

impl MoveAlgorithm for Crankshaft {
    fn name(&self) -> &str {
        &self.label
    }

    fn propose(
        &mut self,
        trial: &mut Space,
        _peer: &mut Space,
        _hamiltonian: &Hamiltonian,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<(), ConsistencyError> {
        let candidates: Vec<usize> = trial
            .find_molecules(self.molid, Selection::Active)
            .filter(|&g| !trial.groups[g].atomic && trial.groups[g].size >= 3)
            .collect();
        let Some(&group_index) = candidates.choose(rng) else {
            return Ok(());
        };
        let group = trial.groups[group_index].clone();
        let first = rng.gen_range(0..group.size - 2);
        let second = rng.gen_range(first + 2..group.size);
        let a = trial.particles[group.absolute(first)].pos;
        let b = trial.particles[group.absolute(second)].pos;
        let axis = Unit::new_normalize(trial.cell.vdist(&b, &a));
        let angle = self.dprot * (rng.gen::<f64>() - 0.5);
        let rotation = UnitQuaternion::from_axis_angle(&axis, angle);
        rotate_tail(trial, group_index, first, first + 1..second, &rotation);
        let entry = change.entry(group_index);
        entry.internal = true;
        entry.atom_indices.extend(first + 1..second);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, Bond, InsertionPolicy, MoleculeKind, Topology};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn chain_space(beads: usize) -> Space {
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
        let bonds = (0..beads - 1)
            .map(|i| Bond::Harmonic {
                index: (i, i + 1),
                k: 5.0,
                req: 2.0,
            })
            .collect();
        topology.molecules.push(MoleculeKind {
            name: "chain".to_string(),
            atomic: false,
            atoms: vec![0; beads],
            bonds,
            conformations: vec![(0..beads)
                .map(|i| Vector3::new(2.0 * i as f64, 0.0, 0.0))
                .collect()],
            weights: vec![],
            insertion: InsertionPolicy::default(),
        });
        Space::from_topology(Arc::new(topology), Cell::cube(60.0).unwrap(), &[(0, 1, 0)]).unwrap()
    }

    #[test]
    fn test_crankshaft_keeps_anchors_fixed() {
        let mut trial = chain_space(6);
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut change = Change::default();
        let mut rng = Pcg64::seed_from_u64(40);
        let before = trial.particles.clone();
        let mut mc_move = Crankshaft::new("crankshaft".into(), 0, 2.0);
        mc_move
            .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
            .unwrap();
        change.sanitize();
        let touched = &change.groups[0].atom_indices;
        assert!(!touched.is_empty());
        for (index, particle) in trial.particles.iter().enumerate() {
            if touched.contains(&index) {
                continue;
            }
            assert_eq!(particle.pos, before[index].pos);
        }
        trial.check(0).unwrap();
    }

    #[test]
    fn test_pivot_preserves_bond_lengths() {
        let mut trial = chain_space(5);
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut change = Change::default();
        let mut rng = Pcg64::seed_from_u64(41);
        let mut mc_move = Pivot::new("pivot".into(), 0, 3.0);
        mc_move
            .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
            .unwrap();
        for i in 0..4 {
            let r = trial
                .cell
                .vdist(&trial.particles[i].pos, &trial.particles[i + 1].pos)
                .norm();
            assert_relative_eq!(r, 2.0, epsilon = 1e-9);
        }
        assert!(change.groups[0].internal);
        trial.check(0).unwrap();
    }
}
