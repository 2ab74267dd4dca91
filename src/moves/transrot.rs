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
//! Single-particle and rigid-body translate/rotate moves.
//!

use crate::change::Change;
use crate::energy::Hamiltonian;
use crate::group::Selection;
use crate::moves::{
    random_displacement, random_small_rotation, MoveAlgorithm,
};
use crate::space::Space;
use crate::ConsistencyError;
use nalgebra::Vector3;
use rand::prelude::SliceRandom;
use rand_pcg::Pcg64;

///
/// Displace one random active atom of a molecule kind inside a cube of
/// half-width `dp/2`, optionally rotating anisotropic particles.
///
pub struct AtomicTranslateRotate {
    label: String,
    molid: usize,
    dp: f64,
    dprot: f64,
    directions: Vector3<f64>,
}

impl AtomicTranslateRotate {
    pub fn new(label: String, molid: usize, dp: f64, dprot: f64, directions: Vector3<f64>) -> Self {
        AtomicTranslateRotate {
            label,
            molid,
            dp,
            dprot,
            directions,
        }
    }
}

impl MoveAlgorithm for AtomicTranslateRotate {
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
        let displacement = random_displacement(self.dp, &self.directions, rng);
        let cell = trial.cell.clone();
        let particle = &mut trial.particles[absolute];
        particle.pos += displacement;
        cell.boundary(&mut particle.pos);
        if self.dprot > 0.0 && particle.shape.is_anisotropic() {
            particle.rotate(&random_small_rotation(0.5 * self.dprot, rng));
        }
        if !trial.groups[group_index].atomic {
            trial.update_mass_center(group_index);
        }
        // intra-group pair energy changes for reservoir atoms and for
        // single atoms of molecules alike
        let entry = change.entry(group_index);
        entry.internal = true;
        entry.atom_indices.push(relative);
        Ok(())
    }
}

///
/// Rigid-body move of one random active molecule: mass-center translation
/// inside a masked cube plus rotation about the mass center with angle
/// uniform in ±`dprot/2`.
///
pub struct MolecularTranslateRotate {
    label: String,
    molid: usize,
    dp: f64,
    dprot: f64,
    directions: Vector3<f64>,
}

impl MolecularTranslateRotate {
    pub fn new(label: String, molid: usize, dp: f64, dprot: f64, directions: Vector3<f64>) -> Self {
        MolecularTranslateRotate {
            label,
            molid,
            dp,
            dprot,
            directions,
        }
    }
}

impl MoveAlgorithm for MolecularTranslateRotate {
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
        let candidates: Vec<usize> = trial.find_molecules(self.molid, Selection::Active).collect();
        let Some(&group_index) = candidates.choose(rng) else {
            return Ok(());
        };
        let old_cm = trial.groups[group_index]
            .mass_center
            .unwrap_or_else(Vector3::zeros);
        let mut new_cm = old_cm + random_displacement(self.dp, &self.directions, rng);
        trial.cell.boundary(&mut new_cm);
        let rotation = (self.dprot > 0.0).then(|| random_small_rotation(0.5 * self.dprot, rng));
        trial.position_group(group_index, new_cm, rotation);
        change.groups.push(crate::change::GroupChange::whole(group_index, false));
        Ok(())
    }
}
