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
//! External potentials acting on single groups. Currently a harmonic
//! spherical confinement used to keep selected molecules inside a
//! sub-volume.
//!

use crate::change::Change;
use crate::energy::EnergyTerm;
use crate::group::Group;
use crate::space::Space;
use nalgebra::Vector3;

///
/// Harmonic restraint outside a sphere: molecular groups are restrained by
/// their mass center, reservoir atoms individually.
///
#[derive(Clone, Debug)]
pub struct Confine {
    pub molids: Vec<usize>,
    /// force constant (kT/Å²)
    pub k: f64,
    /// confinement radius (Å)
    pub radius: f64,
    pub origin: Vector3<f64>,
}

impl Confine {
    fn point_energy(&self, space: &Space, point: &Vector3<f64>) -> f64 {
        let distance = space.cell.vdist(point, &self.origin).norm();
        if distance > self.radius {
            0.5 * self.k * (distance - self.radius) * (distance - self.radius)
        } else {
            0.0
        }
    }

    fn group_energy(&self, space: &Space, group: &Group) -> f64 {
        if !group.is_active() || !self.molids.contains(&group.molid) {
            return 0.0;
        }
        if group.atomic {
            space.particles[group.range()]
                .iter()
                .map(|p| self.point_energy(space, &p.pos))
                .sum()
        } else {
            self.point_energy(space, &group.mass_center.unwrap_or_else(Vector3::zeros))
        }
    }
}

impl EnergyTerm for Confine {
    fn name(&self) -> &'static str {
        "confine"
    }

    fn energy(&self, space: &Space, change: &Change) -> f64 {
        if change.everything || change.volume_changed {
            return space
                .groups
                .iter()
                .map(|group| self.group_energy(space, group))
                .sum();
        }
        change
            .groups
            .iter()
            .map(|gc| self.group_energy(space, &space.groups[gc.group_index]))
            .sum()
    }

    fn internal(&self, _space: &Space, _group: &Group) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Cell;
    use crate::topology::{AtomKind, InsertionPolicy, MoleculeKind, Topology};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_confinement_outside_radius() {
        let mut topology = Topology::default();
        topology.atoms.push(AtomKind {
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
        topology.molecules.push(MoleculeKind {
            name: "X".to_string(),
            atomic: true,
            atoms: vec![0],
            bonds: vec![],
            conformations: vec![],
            weights: vec![],
            insertion: InsertionPolicy::default(),
        });
        let mut space =
            Space::from_topology(Arc::new(topology), Cell::cube(40.0).unwrap(), &[(0, 1, 0)])
                .unwrap();
        let confine = Confine {
            molids: vec![0],
            k: 2.0,
            radius: 5.0,
            origin: Vector3::zeros(),
        };
        assert_relative_eq!(confine.energy(&space, &Change::all()), 0.0);
        space.particles[0].pos = Vector3::new(8.0, 0.0, 0.0);
        // 0.5 * 2 * (8-5)^2 = 9
        assert_relative_eq!(confine.energy(&space, &Change::all()), 9.0);
    }
}
