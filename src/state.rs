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
//! Checkpoint files: the full particle array (inactive slots included),
//! group metadata, cell, reservoir counters, and optionally the RNG
//! state. Textual JSON is offered for inspection; the binary encoding is
//! the canonical one for bit-faithful floating point round trips.
//!

use crate::montecarlo::RandomState;
use crate::space::Space;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Serialize, Deserialize)]
pub struct SavedState {
    pub topology: crate::topology::Topology,
    pub cell: crate::geometry::Cell,
    pub particles: Vec<crate::particle::Particle>,
    pub groups: Vec<crate::group::Group>,
    pub reservoirs: Vec<Option<usize>>,
    /// present when the input asked for reproducible replay
    pub random: Option<RandomState>,
    pub step: usize,
}

impl SavedState {
    pub fn from_space(space: &Space, random: Option<&RandomState>, step: usize) -> Self {
        SavedState {
            topology: (*space.topology).clone(),
            cell: space.cell.clone(),
            particles: space.particles.clone(),
            groups: space.groups.clone(),
            reservoirs: space.reservoirs.clone(),
            random: random.cloned(),
            step,
        }
    }

    /// Encoding is chosen by extension: `.json` is textual, anything else
    /// is canonical binary
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let file = BufWriter::new(File::create(path)?);
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::to_writer_pretty(file, self)
                .map_err(|e| ConfigError::Encoding(e.to_string()))
        } else {
            bincode::serialize_into(file, self).map_err(|e| ConfigError::Encoding(e.to_string()))
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = BufReader::new(File::open(path)?);
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_reader(file).map_err(|e| ConfigError::Encoding(e.to_string()))
        } else {
            bincode::deserialize_from(file).map_err(|e| ConfigError::Encoding(e.to_string()))
        }
    }

    ///
    /// Overwrite a topology-built space with the stored configuration.
    /// Layout mismatches mean the state file belongs to another input and
    /// are fatal.
    ///
    pub fn apply(&self, space: &mut Space) -> Result<(), ConfigError> {
        let names = |topology: &crate::topology::Topology| {
            (
                topology.atoms.iter().map(|a| a.name.clone()).collect::<Vec<_>>(),
                topology
                    .molecules
                    .iter()
                    .map(|m| m.name.clone())
                    .collect::<Vec<_>>(),
            )
        };
        if names(&self.topology) != names(&space.topology) {
            return Err(ConfigError::StateMismatch(
                "atom/molecule tables differ from the topology".to_string(),
            ));
        }
        if self.particles.len() != space.particles.len() {
            return Err(ConfigError::StateMismatch(format!(
                "particle count {} differs from topology ({})",
                self.particles.len(),
                space.particles.len()
            )));
        }
        if self.groups.len() != space.groups.len() {
            return Err(ConfigError::StateMismatch(format!(
                "group count {} differs from topology ({})",
                self.groups.len(),
                space.groups.len()
            )));
        }
        for (stored, built) in self.groups.iter().zip(&space.groups) {
            if stored.molid != built.molid || stored.capacity != built.capacity {
                return Err(ConfigError::StateMismatch(format!(
                    "group over slots {}..{} does not match the topology",
                    stored.begin,
                    stored.begin + stored.capacity
                )));
            }
        }
        if self.reservoirs.len() != space.reservoirs.len() {
            return Err(ConfigError::StateMismatch(
                "reaction list differs from topology".to_string(),
            ));
        }
        space.cell = self.cell.clone();
        space.particles.clone_from(&self.particles);
        space.groups.clone_from(&self.groups);
        space.reservoirs.clone_from(&self.reservoirs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::group::Group;
    use crate::montecarlo::RandomState;
    use crate::particle::Particle;
    use nalgebra::Vector3;
    use rand::Rng;

    fn sample_topology() -> crate::topology::Topology {
        let mut topology = crate::topology::Topology::default();
        topology.atoms.push(crate::topology::AtomKind {
            name: "Na".to_string(),
            sigma: 4.0,
            eps: 0.05,
            mass: 23.0,
            charge: 1.0,
            implicit: false,
            activity: None,
            dipole: None,
            cigar: None,
        });
        topology.molecules.push(crate::topology::MoleculeKind {
            name: "Na".to_string(),
            atomic: true,
            atoms: vec![0],
            bonds: vec![],
            conformations: vec![],
            weights: vec![],
            insertion: crate::topology::InsertionPolicy::default(),
        });
        topology
    }

    fn sample_state() -> SavedState {
        SavedState {
            topology: sample_topology(),
            cell: Cell::cube(12.5).unwrap(),
            particles: vec![
                Particle::new(0, Vector3::new(0.125, -3.5, 1.0e-7), 1.0),
                Particle::new(1, Vector3::new(-6.25, 0.0, 2.25), -1.0),
            ],
            groups: vec![Group::new(0, 0, 2, true)],
            reservoirs: vec![Some(42)],
            random: Some(RandomState::from_seed(17)),
            step: 1000,
        }
    }

    #[test]
    fn test_binary_round_trip_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.state");
        let state = sample_state();
        state.save(&path).unwrap();
        let loaded = SavedState::load(&path).unwrap();
        assert_eq!(loaded.particles, state.particles);
        assert_eq!(loaded.groups, state.groups);
        assert_eq!(loaded.reservoirs, state.reservoirs);
        assert_eq!(loaded.step, 1000);
        // save -> load -> save must reproduce the same bytes
        let path2 = dir.path().join("checkpoint2.state");
        loaded.save(&path2).unwrap();
        assert_eq!(
            std::fs::read(&path).unwrap(),
            std::fs::read(&path2).unwrap()
        );
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let state = sample_state();
        state.save(&path).unwrap();
        let loaded = SavedState::load(&path).unwrap();
        assert_eq!(loaded.groups, state.groups);
        assert_eq!(loaded.step, state.step);
    }

    #[test]
    fn test_rng_state_round_trip_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.state");
        let mut state = sample_state();
        // advance the generator so the saved state is mid-stream
        let expected: u64 = state.random.as_mut().unwrap().moves.gen();
        state.save(&path).unwrap();
        let mut loaded = SavedState::load(&path).unwrap();
        let mut original = RandomState::from_seed(17);
        let first: u64 = original.moves.gen();
        assert_eq!(first, expected);
        // the loaded stream continues where the saved one left off
        let a: u64 = state.random.as_mut().unwrap().moves.gen();
        let b: u64 = loaded.random.as_mut().unwrap().moves.gen();
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_mismatch_is_rejected() {
        let state = sample_state();
        let mut topology = crate::topology::Topology::default();
        topology.atoms.push(crate::topology::AtomKind {
            name: "X".to_string(),
            sigma: 1.0,
            eps: 0.0,
            mass: 1.0,
            charge: 0.0,
            implicit: false,
            activity: None,
            dipole: None,
            cigar: None,
        });
        topology.molecules.push(crate::topology::MoleculeKind {
            name: "X".to_string(),
            atomic: true,
            atoms: vec![0],
            bonds: vec![],
            conformations: vec![],
            weights: vec![],
            insertion: crate::topology::InsertionPolicy::default(),
        });
        let mut space = Space::from_topology(
            std::sync::Arc::new(topology),
            Cell::cube(12.5).unwrap(),
            &[(0, 3, 0)],
        )
        .unwrap();
        assert!(state.apply(&mut space).is_err());
    }
}
