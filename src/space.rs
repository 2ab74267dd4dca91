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
//! The simulation state: one flat particle vector tiled by groups, a cell,
//! and per-reaction reservoir counters. Two `Space` instances exist per
//! replica (accepted and trial); they are kept bit-identical outside the
//! last change window through the single [`Space::sync`] entry point.
//!

use crate::change::Change;
use crate::geometry::{Cell, VolumeScalePolicy};
use crate::group::{Group, Selection};
use crate::particle::Particle;
use crate::topology::Topology;
use crate::{ConfigError, ConsistencyError};
use nalgebra::{UnitQuaternion, Vector3};
use std::sync::Arc;

/// Mass-center agreement required after every accepted step (Å²)
pub const MASS_CENTER_TOLERANCE_SQUARED: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct Space {
    pub cell: Cell,
    pub particles: Vec<Particle>,
    pub groups: Vec<Group>,
    pub topology: Arc<Topology>,
    /// remaining implicit matter per canonic reaction; `None` when unbounded
    pub reservoirs: Vec<Option<usize>>,
}

impl Space {
    ///
    /// Allocate particles and groups for the given insertion directives
    /// `(molid, total, inactive)`. Every slot that will ever exist is
    /// created here; groups tile the particle vector in directive order.
    /// Positions start at the template (first conformation) or the origin;
    /// initial placement is the caller's concern.
    ///
    pub fn from_topology(
        topology: Arc<Topology>,
        cell: Cell,
        directives: &[(usize, usize, usize)],
    ) -> Result<Self, ConfigError> {
        let mut particles = Vec::new();
        let mut groups = Vec::new();
        for &(molid, total, inactive) in directives {
            let kind = &topology.molecules[molid];
            if inactive > total {
                return Err(ConfigError::InvalidValue(
                    "insertmolecules",
                    format!("molecule '{}': inactive > N", kind.name),
                ));
            }
            if kind.atomic {
                let begin = particles.len();
                for slot in 0..total {
                    let atomid = kind.atoms[slot % kind.atoms.len()];
                    particles.push(topology.atoms[atomid].to_particle(atomid, Vector3::zeros()));
                }
                let mut group = Group::new(molid, begin, total, true);
                group.size = total - inactive;
                groups.push(group);
            } else {
                if kind.atoms.len() > 1 && kind.conformations.is_empty() {
                    return Err(ConfigError::InvalidMolecule(
                        kind.name.clone(),
                        "polyatomic molecules need at least one conformation".to_string(),
                    ));
                }
                for copy in 0..total {
                    let begin = particles.len();
                    for (slot, &atomid) in kind.atoms.iter().enumerate() {
                        let pos = kind
                            .conformations
                            .first()
                            .map(|c| c[slot])
                            .unwrap_or_else(Vector3::zeros);
                        particles.push(topology.atoms[atomid].to_particle(atomid, pos));
                    }
                    let mut group = Group::new(molid, begin, kind.atoms.len(), false);
                    if copy >= total - inactive {
                        group.size = 0;
                    }
                    groups.push(group);
                }
            }
        }
        let reservoirs = topology
            .reactions
            .iter()
            .map(|r| r.canonic.then_some(r.reservoir))
            .collect();
        let mut space = Space {
            cell,
            particles,
            groups,
            topology,
            reservoirs,
        };
        for index in 0..space.groups.len() {
            if !space.groups[index].atomic && space.groups[index].is_active() {
                space.update_mass_center(index);
            }
        }
        Ok(space)
    }

    /// Indices of groups with the given molecule id and activity
    pub fn find_molecules(
        &self,
        molid: usize,
        selection: Selection,
    ) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, g)| g.molid == molid && g.matches(selection))
            .map(|(index, _)| index)
    }

    /// Absolute indices of *active* particles with the given atom id
    pub fn find_atoms(&self, atomid: usize) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flat_map(move |g| {
            self.particles[g.range()]
                .iter()
                .enumerate()
                .filter(move |(_, p)| p.id == atomid)
                .map(move |(rel, _)| g.begin + rel)
        })
    }

    /// Group owning the given particle slot
    pub fn group_containing(&self, particle: usize) -> Result<usize, ConsistencyError> {
        let index = self
            .groups
            .partition_point(|g| g.begin + g.capacity <= particle);
        if index < self.groups.len() && self.groups[index].contains(particle) {
            Ok(index)
        } else {
            Err(ConsistencyError::InvalidGroupOperation {
                group: index,
                reason: format!("particle {} not covered by any group", particle),
            })
        }
    }

    /// Number of active molecules (groups) of a kind
    pub fn count_molecules(&self, molid: usize) -> usize {
        self.find_molecules(molid, Selection::Active).count()
    }

    /// Number of active particles with a given atom id
    pub fn count_atoms(&self, atomid: usize) -> usize {
        self.find_atoms(atomid).count()
    }

    /// Total number of active, independently translating entities:
    /// one per active molecular group, one per active reservoir atom
    pub fn degrees_of_freedom(&self) -> usize {
        self.groups
            .iter()
            .map(|g| if g.atomic { g.size } else { usize::from(g.is_active()) })
            .sum()
    }

    ///
    /// Mass center of a group's active particles under periodic
    /// boundaries, using the first active particle as the unwrap
    /// reference.
    ///
    pub fn mass_center_of(&self, group: &Group) -> Option<Vector3<f64>> {
        if !group.is_active() {
            return None;
        }
        let reference = self.particles[group.begin].pos;
        let mut weighted = Vector3::zeros();
        let mut total_mass = 0.0;
        for particle in &self.particles[group.range()] {
            let mass = self.topology.atoms[particle.id].mass;
            weighted += mass * self.cell.vdist(&particle.pos, &reference);
            total_mass += mass;
        }
        let mut cm = reference + weighted / total_mass;
        self.cell.boundary(&mut cm);
        Some(cm)
    }

    /// Recompute and store the mass center of a molecular group
    pub fn update_mass_center(&mut self, group_index: usize) {
        let cm = self.mass_center_of(&self.groups[group_index]);
        self.groups[group_index].mass_center = cm;
    }

    ///
    /// Rigidly place a group: translate its active particles so that the
    /// mass center lands on `new_cm`, optionally rotating about it first.
    ///
    pub fn position_group(
        &mut self,
        group_index: usize,
        new_cm: Vector3<f64>,
        rotation: Option<UnitQuaternion<f64>>,
    ) {
        let group = self.groups[group_index].clone();
        let old_cm = match self.mass_center_of(&group) {
            Some(cm) => cm,
            None => return,
        };
        let cell = self.cell.clone();
        for particle in &mut self.particles[group.range()] {
            let mut relative = cell.vdist(&particle.pos, &old_cm);
            if let Some(q) = rotation {
                relative = q * relative;
                particle.rotate(&q);
            }
            particle.pos = new_cm + relative;
            cell.boundary(&mut particle.pos);
        }
        if !group.atomic {
            self.groups[group_index].mass_center = Some(new_cm);
        }
    }

    ///
    /// Rescale the cell and move particles accordingly: molecular groups
    /// translate rigidly with their mass center, reservoir atoms rescale
    /// individually.
    ///
    pub fn scale_volume(
        &mut self,
        new_volume: f64,
        policy: VolumeScalePolicy,
    ) -> Result<(), ConfigError> {
        let scale = self.cell.scale_volume(new_volume, policy)?;
        let cell = self.cell.clone();
        for index in 0..self.groups.len() {
            let group = self.groups[index].clone();
            if group.atomic {
                for particle in &mut self.particles[group.range()] {
                    particle.pos.component_mul_assign(&scale);
                    cell.boundary(&mut particle.pos);
                }
            } else if group.is_active() {
                let old_cm = group.mass_center.unwrap_or_else(Vector3::zeros);
                let new_cm = old_cm.component_mul(&scale);
                let delta = new_cm - old_cm;
                for particle in &mut self.particles[group.range()] {
                    particle.pos += delta;
                    cell.boundary(&mut particle.pos);
                }
                self.groups[index].mass_center = Some(new_cm);
            }
        }
        Ok(())
    }

    ///
    /// Copy the slots covered by `change` from `other` into `self`. This
    /// is the only way state flows between the trial and the accepted
    /// space; afterwards the two are bit-identical outside the window.
    ///
    pub fn sync(&mut self, other: &Space, change: &Change) {
        if change.volume_changed {
            self.cell = other.cell.clone();
        }
        if change.matter_changed {
            self.reservoirs.clone_from(&other.reservoirs);
        }
        if change.everything {
            self.particles.clone_from(&other.particles);
            self.groups.clone_from(&other.groups);
            return;
        }
        for group_change in &change.groups {
            let index = group_change.group_index;
            let range_all = other.groups[index].range_all();
            self.groups[index] = other.groups[index].clone();
            if group_change.all || group_change.size_changed {
                self.particles[range_all.clone()].clone_from_slice(&other.particles[range_all]);
            } else {
                let begin = other.groups[index].begin;
                for &relative in &group_change.atom_indices {
                    self.particles[begin + relative] = other.particles[begin + relative].clone();
                }
            }
        }
    }

    ///
    /// Invariant check run by the sanity analysis and, in debug builds,
    /// after every accepted step.
    ///
    pub fn check(&self, step: usize) -> Result<(), ConsistencyError> {
        let mut expected_begin = 0;
        for (index, group) in self.groups.iter().enumerate() {
            if group.begin != expected_begin || group.size > group.capacity {
                return Err(ConsistencyError::BrokenGroupTiling { step, group: index });
            }
            expected_begin += group.capacity;
            for absolute in group.range() {
                if self.cell.collision(&self.particles[absolute].pos) {
                    return Err(ConsistencyError::ParticleOutsideCell {
                        step,
                        group: index,
                        particle: absolute,
                    });
                }
            }
            if !group.atomic && group.is_active() {
                let stored = group.mass_center.unwrap_or_else(Vector3::zeros);
                let recomputed = self.mass_center_of(group).unwrap_or_else(Vector3::zeros);
                let drift = self.cell.sqdist(&stored, &recomputed);
                if drift > MASS_CENTER_TOLERANCE_SQUARED {
                    return Err(ConsistencyError::MassCenterDrift {
                        step,
                        group: index,
                        drift: drift.sqrt(),
                    });
                }
            }
        }
        if expected_begin != self.particles.len() {
            return Err(ConsistencyError::BrokenGroupTiling {
                step,
                group: self.groups.len(),
            });
        }
        Ok(())
    }
}
