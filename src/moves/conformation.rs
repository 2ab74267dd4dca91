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
//! Conformation swap: replace the internal geometry of one molecule with a
//! weight-picked member of its rigid conformation library. The weighted
//! proposal cancels exactly against the target weights, so no bias is
//! needed.
//!

use crate::change::{Change, GroupChange};
use crate::energy::Hamiltonian;
use crate::group::Selection;
use crate::moves::MoveAlgorithm;
use crate::space::Space;
use crate::topology::Topology;
use crate::ConsistencyError;
use nalgebra::Vector3;
use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::SliceRandom;
use rand_pcg::Pcg64;

pub struct ConformationSwap {
    label: String,
    molid: usize,
    /// mass-weighted center of each library conformation
    conformation_centers: Vec<Vector3<f64>>,
    distribution: Option<WeightedIndex<f64>>,
}

impl ConformationSwap {
    pub fn new(label: String, molid: usize, topology: &Topology) -> Self {
        let kind = &topology.molecules[molid];
        let conformation_centers = kind
            .conformations
            .iter()
            .map(|positions| {
                let mut weighted = Vector3::zeros();
                let mut total = 0.0;
                for (slot, position) in positions.iter().enumerate() {
                    let mass = topology.atoms[kind.atoms[slot]].mass;
                    weighted += mass * position;
                    total += mass;
                }
                weighted / total
            })
            .collect();
        let weights = if kind.weights.is_empty() {
            vec![1.0; kind.conformations.len()]
        } else {
            kind.weights.clone()
        };
        ConformationSwap {
            label,
            molid,
            conformation_centers,
            distribution: WeightedIndex::new(weights).ok(),
        }
    }
}

impl MoveAlgorithm for ConformationSwap {
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
        let Some(distribution) = &self.distribution else {
            return Ok(());
        };
        let candidates: Vec<usize> = trial.find_molecules(self.molid, Selection::Active).collect();
        let Some(&group_index) = candidates.choose(rng) else {
            return Ok(());
        };
        let confid = distribution.sample(rng);
        let topology = trial.topology.clone();
        let kind = &topology.molecules[self.molid];
        let cm = trial.groups[group_index].mass_center.unwrap_or_else(Vector3::zeros);
        let center = self.conformation_centers[confid];
        let begin = trial.groups[group_index].begin;
        let cell = trial.cell.clone();
        for (slot, template) in kind.conformations[confid].iter().enumerate() {
            let particle = &mut trial.particles[begin + slot];
            particle.pos = cm + (template - center);
            cell.boundary(&mut particle.pos);
        }
        trial.groups[group_index].confid = confid;
        trial.update_mass_center(group_index);
        change.groups.push(GroupChange::whole(group_index, true));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, InsertionPolicy, MoleculeKind};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn library_space() -> Space {
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
            name: "switch".to_string(),
            atomic: false,
            atoms: vec![0, 0],
            bonds: vec![],
            conformations: vec![
                vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)],
                vec![Vector3::zeros(), Vector3::new(3.0, 0.0, 0.0)],
            ],
            weights: vec![1.0, 2.0],
            insertion: InsertionPolicy::default(),
        });
        Space::from_topology(Arc::new(topology), Cell::cube(20.0).unwrap(), &[(0, 1, 0)]).unwrap()
    }

    #[test]
    fn test_swap_preserves_mass_center() {
        let mut trial = library_space();
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut rng = Pcg64::seed_from_u64(12);
        let topology = trial.topology.clone();
        let mut mc_move = ConformationSwap::new("conformationswap".into(), 0, &topology);
        let cm_before = trial.groups[0].mass_center.unwrap();
        for _ in 0..20 {
            let mut change = Change::default();
            mc_move
                .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
                .unwrap();
            assert!(change.groups[0].all && change.groups[0].internal);
            let cm_after = trial.groups[0].mass_center.unwrap();
            assert_relative_eq!((cm_before - cm_after).norm(), 0.0, epsilon = 1e-9);
            trial.check(0).unwrap();
        }
    }

    #[test]
    fn test_weighted_sampling_frequencies() {
        let mut trial = library_space();
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut rng = Pcg64::seed_from_u64(13);
        let topology = trial.topology.clone();
        let mut mc_move = ConformationSwap::new("conformationswap".into(), 0, &topology);
        let mut picks = [0usize; 2];
        for _ in 0..3000 {
            let mut change = Change::default();
            mc_move
                .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
                .unwrap();
            picks[trial.groups[0].confid] += 1;
        }
        let fraction = picks[1] as f64 / 3000.0;
        assert!((fraction - 2.0 / 3.0).abs() < 0.05);
    }
}
