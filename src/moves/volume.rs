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
//! Isobaric volume move: a random walk in ln V with the standard NPT
//! acceptance correction.
//!

use crate::change::Change;
use crate::energy::Hamiltonian;
use crate::geometry::VolumeScalePolicy;
use crate::moves::MoveAlgorithm;
use crate::space::Space;
use crate::ConsistencyError;
use rand::Rng;
use rand_pcg::Pcg64;

pub struct VolumeMove {
    label: String,
    /// maximum |Δln V| per attempt
    dv: f64,
    policy: VolumeScalePolicy,
    /// external pressure (kT/Å³); zero for pure shape moves
    pressure: f64,
    old_volume: f64,
    new_volume: f64,
}

impl VolumeMove {
    pub fn new(label: String, dv: f64, policy: VolumeScalePolicy, pressure: f64) -> Self {
        VolumeMove {
            label,
            dv,
            policy,
            pressure,
            old_volume: 0.0,
            new_volume: 0.0,
        }
    }
}

impl MoveAlgorithm for VolumeMove {
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
        self.old_volume = trial.cell.volume();
        let scale = f64::exp(self.dv * (2.0 * rng.gen::<f64>() - 1.0));
        match self.policy {
            VolumeScalePolicy::Isochoric => {
                self.new_volume = self.old_volume;
                trial
                    .scale_volume(scale, VolumeScalePolicy::Isochoric)
                    .map_err(|e| ConsistencyError::NonFiniteEnergy(e.to_string()))?;
            }
            policy => {
                self.new_volume = self.old_volume * scale;
                trial
                    .scale_volume(self.new_volume, policy)
                    .map_err(|e| ConsistencyError::NonFiniteEnergy(e.to_string()))?;
            }
        }
        *change = Change::volume();
        Ok(())
    }

    fn bias(
        &mut self,
        _trial: &Space,
        accepted: &Space,
        _change: &Change,
        _u_old: f64,
        _u_new: f64,
    ) -> f64 {
        if self.policy == VolumeScalePolicy::Isochoric {
            return 0.0;
        }
        let n = accepted.degrees_of_freedom() as f64;
        self.pressure * (self.new_volume - self.old_volume)
            - (n + 1.0) * f64::ln(self.new_volume / self.old_volume)
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

    fn gas_space(n: usize) -> Space {
        let mut topology = Topology::default();
        topology.atoms.push(AtomKind {
            name: "N".to_string(),
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
            name: "N".to_string(),
            atomic: true,
            atoms: vec![0],
            bonds: vec![],
            conformations: vec![],
            weights: vec![],
            insertion: InsertionPolicy::default(),
        });
        let mut space =
            Space::from_topology(Arc::new(topology), Cell::cube(50.0).unwrap(), &[(0, n, 0)])
                .unwrap();
        let mut rng = Pcg64::seed_from_u64(2);
        for i in 0..n {
            space.particles[i].pos = space.cell.random_position(&mut rng);
        }
        space
    }

    #[test]
    fn test_volume_move_round_trip() {
        let mut trial = gas_space(20);
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut change = Change::default();
        let mut rng = Pcg64::seed_from_u64(6);
        let mut mc_move = VolumeMove::new(
            "volume".into(),
            0.3,
            VolumeScalePolicy::Isotropic,
            0.0,
        );
        let before: Vec<_> = trial.particles.iter().map(|p| p.pos).collect();
        mc_move
            .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
            .unwrap();
        assert!(change.volume_changed && change.everything);
        // invert by scaling back to the original volume
        trial
            .scale_volume(mc_move.old_volume, VolumeScalePolicy::Isotropic)
            .unwrap();
        for (old, particle) in before.iter().zip(&trial.particles) {
            assert_relative_eq!((old - particle.pos).norm(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_isobaric_bias_sign() {
        let mut trial = gas_space(10);
        let accepted = trial.clone();
        let mut peer = trial.clone();
        let hamiltonian = Hamiltonian::default();
        let mut change = Change::default();
        let mut rng = Pcg64::seed_from_u64(8);
        let pressure = 1e-3;
        let mut mc_move =
            VolumeMove::new("volume".into(), 0.2, VolumeScalePolicy::Isotropic, pressure);
        mc_move
            .propose(&mut trial, &mut peer, &hamiltonian, &mut change, &mut rng)
            .unwrap();
        let bias = mc_move.bias(&trial, &accepted, &change, 0.0, 0.0);
        let dv = mc_move.new_volume - mc_move.old_volume;
        let expected =
            pressure * dv - 11.0 * f64::ln(mc_move.new_volume / mc_move.old_volume);
        assert_relative_eq!(bias, expected, epsilon = 1e-12);
    }
}
