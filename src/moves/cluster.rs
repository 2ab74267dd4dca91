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
//! Rigid cluster move: single-linkage clusters of molecules within a
//! mass-center distance threshold are translated and rotated as one body.
//! Detailed balance requires the cluster found from the same seed to be
//! unchanged after the move; otherwise the proposal is force-rejected
//! through an infinite bias.
//!

use crate::change::{Change, GroupChange};
use crate::energy::Hamiltonian;
use crate::group::Selection;
use crate::moves::{random_displacement, random_small_rotation, MoveAlgorithm};
use crate::space::Space;
use crate::ConsistencyError;
use nalgebra::Vector3;
use rand::prelude::SliceRandom;
use rand_pcg::Pcg64;

pub struct ClusterMove {
    label: String,
    molids: Vec<usize>,
    /// single-linkage mass-center distance threshold (Å)
    threshold: f64,
    dp: f64,
    dprot: f64,
    directions: Vector3<f64>,
    seed_group: usize,
    members: Vec<usize>,
}

impl ClusterMove {
    pub fn new(
        label: String,
        molids: Vec<usize>,
        threshold: f64,
        dp: f64,
        dprot: f64,
        directions: Vector3<f64>,
    ) -> Self {
        ClusterMove {
            label,
            molids,
            threshold,
            dp,
            dprot,
            directions,
            seed_group: 0,
            members: Vec::new(),
        }
    }

    fn candidates(&self, space: &Space) -> Vec<usize> {
        self.molids
            .iter()
            .flat_map(|&molid| space.find_molecules(molid, Selection::Active))
            .filter(|&g| !space.groups[g].atomic)
            .collect()
    }

    /// Single-linkage cluster grown from a seed over mass-center distances
    fn grow_cluster(&self, space: &Space, seed: usize) -> Vec<usize> {
        let candidates = self.candidates(space);
        let mut members = vec![seed];
        let mut frontier = vec![seed];
        let threshold_squared = self.threshold * self.threshold;
        while let Some(current) = frontier.pop() {
            let current_cm = space.groups[current].mass_center.unwrap_or_else(Vector3::zeros);
            for &other in &candidates {
                if members.contains(&other) {
                    continue;
                }
                let other_cm = space.groups[other].mass_center.unwrap_or_else(Vector3::zeros);
                if space.cell.sqdist(&current_cm, &other_cm) <= threshold_squared {
                    members.push(other);
                    frontier.push(other);
                }
            }
        }
        members.sort_unstable();
        members
    }

    /// Mass-weighted cluster center, unwrapped relative to the seed
    fn cluster_center(&self, space: &Space, members: &[usize], seed: usize) -> Vector3<f64> {
        let seed_cm = space.groups[seed].mass_center.unwrap_or_else(Vector3::zeros);
        let mut weighted = Vector3::zeros();
        let mut total = 0.0;
        for &g in members {
            let group = &space.groups[g];
            let mass: f64 = space.particles[group.range()]
                .iter()
                .map(|p| space.topology.atoms[p.id].mass)
                .sum();
            let cm = group.mass_center.unwrap_or_else(Vector3::zeros);
            weighted += mass * space.cell.vdist(&cm, &seed_cm);
            total += mass;
        }
        seed_cm + weighted / total
    }
}

impl MoveAlgorithm for ClusterMove {
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
        let candidates = self.candidates(trial);
        let Some(&seed) = candidates.choose(rng) else {
            return Ok(());
        };
        self.seed_group = seed;
        self.members = self.grow_cluster(trial, seed);
        let pivot = self.cluster_center(trial, &self.members, seed);
        let displacement = random_displacement(self.dp, &self.directions, rng);
        let rotation = (self.dprot > 0.0).then(|| random_small_rotation(0.5 * self.dprot, rng));
        for &g in &self.members.clone() {
            let cm = trial.groups[g].mass_center.unwrap_or_else(Vector3::zeros);
            let mut relative = trial.cell.vdist(&cm, &pivot);
            if let Some(q) = rotation {
                relative = q * relative;
            }
            let mut new_cm = pivot + relative + displacement;
            trial.cell.boundary(&mut new_cm);
            trial.position_group(g, new_cm, rotation);
            change.groups.push(GroupChange::whole(g, false));
        }
        Ok(())
    }

    fn bias(
        &mut self,
        trial: &Space,
        _accepted: &Space,
        _change: &Change,
        _u_old: f64,
        _u_new: f64,
    ) -> f64 {
        // reverse move must find the same cluster from the same seed
        if self.grow_cluster(trial, self.seed_group) == self.members {
            0.0
        } else {
            f64::INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, InsertionPolicy, MoleculeKind, Topology};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn dimer_fluid() -> Space {
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
            name: "pair".to_string(),
            atomic: false,
            atoms: vec![0, 0],
            bonds: vec![],
            conformations: vec![vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)]],
            weights: vec![],
            insertion: InsertionPolicy::default(),
        });
        Space::from_topology(Arc::new(topology), Cell::cube(40.0).unwrap(), &[(0, 3, 0)]).unwrap()
    }

    #[test]
    fn test_cluster_membership_and_rigidity() {
        let mut trial = dimer_fluid();
        // two close molecules, one far away
        trial.position_group(0, Vector3::new(0.0, 0.0, 0.0), None);
        trial.position_group(1, Vector3::new(3.0, 0.0, 0.0), None);
        trial.position_group(2, Vector3::new(15.0, 0.0, 0.0), None);
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut change = Change::default();
        let mut rng = Pcg64::seed_from_u64(30);
        let mut mc_move = ClusterMove::new(
            "cluster".into(),
            vec![0],
            5.0,
            2.0,
            1.0,
            Vector3::from_element(1.0),
        );
        let members = mc_move.grow_cluster(&trial, 0);
        assert_eq!(members, vec![0, 1]);
        let separation_before = trial.cell.vdist(
            &trial.groups[0].mass_center.unwrap(),
            &trial.groups[1].mass_center.unwrap(),
        );
        mc_move
            .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
            .unwrap();
        change.sanitize();
        if mc_move.members == vec![0, 1] {
            let separation_after = trial.cell.vdist(
                &trial.groups[0].mass_center.unwrap(),
                &trial.groups[1].mass_center.unwrap(),
            );
            assert_relative_eq!(
                separation_before.norm(),
                separation_after.norm(),
                epsilon = 1e-9
            );
        }
        trial.check(0).unwrap();
    }

    #[test]
    fn test_broken_cluster_is_force_rejected() {
        let mut trial = dimer_fluid();
        trial.position_group(0, Vector3::new(0.0, 0.0, 0.0), None);
        trial.position_group(1, Vector3::new(4.9, 0.0, 0.0), None);
        trial.position_group(2, Vector3::new(-15.0, 0.0, 0.0), None);
        let accepted = trial.clone();
        let mut mc_move = ClusterMove::new(
            "cluster".into(),
            vec![0],
            5.0,
            2.0,
            0.0,
            Vector3::from_element(1.0),
        );
        mc_move.seed_group = 0;
        mc_move.members = vec![0, 1];
        // drift member 1 out of range: reverse cluster differs
        trial.position_group(1, Vector3::new(9.0, 0.0, 0.0), None);
        let change = Change::default();
        assert!(mc_move.bias(&trial, &accepted, &change, 0.0, 0.0).is_infinite());
    }
}
