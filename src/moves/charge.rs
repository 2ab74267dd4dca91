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
//! Charge fluctuation move for constant-potential and fluctuating-charge
//! models: displace the charge of one random active atom.
//!

use crate::change::Change;
use crate::energy::Hamiltonian;
use crate::group::Selection;
use crate::moves::MoveAlgorithm;
use crate::space::Space;
use crate::ConsistencyError;
use rand::prelude::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;

pub struct ChargeMove {
    label: String,
    molid: usize,
    /// maximum charge displacement (e)
    dq: f64,
}

impl ChargeMove {
    pub fn new(label: String, molid: usize, dq: f64) -> Self {
        ChargeMove { label, molid, dq }
    }
}

impl MoveAlgorithm for ChargeMove {
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
        let candidates: Vec<(usize, usize)> = trial
            .find_molecules(self.molid, Selection::Active)
            .flat_map(|g| (0..trial.groups[g].size).map(move |rel| (g, rel)))
            .collect();
        let Some(&(group_index, relative)) = candidates.choose(rng) else {
            return Ok(());
        };
        let absolute = trial.groups[group_index].absolute(relative);
        trial.particles[absolute].charge += self.dq * (rng.gen::<f64>() - 0.5);
        let entry = change.entry(group_index);
        entry.internal = true;
        entry.atom_indices.push(relative);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, InsertionPolicy, MoleculeKind, Topology};
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn test_charge_displacement() {
        let mut topology = Topology::default();
        topology.atoms.push(AtomKind {
            name: "Q".to_string(),
            sigma: 1.0,
            eps: 0.0,
            mass: 1.0,
            charge: 0.5,
            implicit: false,
            activity: None,
            dipole: None,
            cigar: None,
        });
        topology.molecules.push(MoleculeKind {
            name: "Q".to_string(),
            atomic: true,
            atoms: vec![0],
            bonds: vec![],
            conformations: vec![],
            weights: vec![],
            insertion: InsertionPolicy::default(),
        });
        let mut trial =
            Space::from_topology(Arc::new(topology), Cell::cube(10.0).unwrap(), &[(0, 3, 0)])
                .unwrap();
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut change = Change::default();
        let mut rng = Pcg64::seed_from_u64(21);
        let mut mc_move = ChargeMove::new("charge".into(), 0, 0.2);
        mc_move
            .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
            .unwrap();
        change.sanitize();
        assert_eq!(change.groups.len(), 1);
        let moved = change.groups[0].atom_indices[0];
        assert!((trial.particles[moved].charge - 0.5).abs() <= 0.1);
        assert!(trial.particles[moved].charge != 0.5);
    }
}
