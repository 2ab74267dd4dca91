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
//! Periodic observables sampled from the accepted state. Perturbative
//! probes (Widom insertion, virtual volume) piggyback on the trial state
//! and restore it through the same `sync` mechanism used by moves, so they
//! can never leak into the Markov chain.
//!

use crate::change::{Change, GroupChange};
use crate::energy::EnergyTerm;
use crate::geometry::VolumeScalePolicy;
use crate::group::Selection;
use crate::montecarlo::{MarkovChain, RandomState};
use crate::moves::random_unit_quaternion;
use crate::space::Space;
use crate::ConsistencyError;
use average::Estimate;
use log::info;
use rand::prelude::SliceRandom;
use std::collections::BTreeMap;

use crate::LITER_PER_ANGSTROM3;

///
/// Interface for observables run every `interval` steps.
///
pub trait Analysis {
    fn name(&self) -> &str;

    fn interval(&self) -> usize;

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        rng: &mut RandomState,
        step: usize,
    ) -> Result<(), ConsistencyError>;

    /// Log end-of-run results
    fn report(&self) {}

    /// Flush any file-backed output
    fn finalize(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Ordered list of analyses, dispatched by step number
#[derive(Default)]
pub struct AnalysisCollection {
    analyses: Vec<Box<dyn Analysis>>,
}

impl AnalysisCollection {
    pub fn push(&mut self, analysis: Box<dyn Analysis>) {
        self.analyses.push(analysis);
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    pub fn sample(
        &mut self,
        chain: &mut MarkovChain,
        rng: &mut RandomState,
        step: usize,
    ) -> Result<(), ConsistencyError> {
        for analysis in &mut self.analyses {
            if step % analysis.interval().max(1) == 0 {
                analysis.sample(chain, rng, step)?;
            }
        }
        Ok(())
    }

    pub fn report(&self) {
        for analysis in &self.analyses {
            analysis.report();
        }
    }

    pub fn finalize(&mut self) -> std::io::Result<()> {
        for analysis in &mut self.analyses {
            analysis.finalize()?;
        }
        Ok(())
    }
}

///
/// Invariant watchdog: verifies group tiling, containment, stored mass
/// centers, and bit-identity of the two states. Any violation is a fatal
/// consistency error, not a user mistake.
///
pub struct SystemSanity {
    interval: usize,
}

impl SystemSanity {
    pub fn new(interval: usize) -> Self {
        SystemSanity { interval }
    }
}

impl Analysis for SystemSanity {
    fn name(&self) -> &str {
        "sanity"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        step: usize,
    ) -> Result<(), ConsistencyError> {
        chain.accepted.space.check(step)?;
        chain.trial.space.check(step)?;
        let accepted = &chain.accepted.space;
        let trial = &chain.trial.space;
        for (index, (a, b)) in accepted
            .particles
            .iter()
            .zip(&trial.particles)
            .enumerate()
        {
            if a != b {
                return Err(ConsistencyError::StatesOutOfSync {
                    step,
                    particle: index,
                });
            }
        }
        Ok(())
    }
}

///
/// Widom test-particle insertion using an inactive group as the ghost:
/// activate, place randomly, measure, roll back through `sync`. Reports
/// the excess chemical potential `−ln⟨exp(−ΔU)⟩`.
///
pub struct WidomInsertion {
    interval: usize,
    molid: usize,
    insertions: usize,
    samples: usize,
    boltzmann: average::Mean,
}

impl WidomInsertion {
    pub fn new(interval: usize, molid: usize, insertions: usize) -> Self {
        WidomInsertion {
            interval,
            molid,
            insertions: insertions.max(1),
            samples: 0,
            boltzmann: average::Mean::new(),
        }
    }

    pub fn excess_chemical_potential(&self) -> f64 {
        -f64::ln(self.boltzmann.mean())
    }

    fn ghost_change(space: &Space, group_index: usize) -> Change {
        let mut change = Change::default();
        change.matter_changed = true;
        let atomic = space.groups[group_index].atomic;
        change.groups.push(GroupChange {
            group_index,
            all: !atomic,
            // the rigid ghost's self-energy is constant and stays out of
            // the insertion energy; ghost atoms interact with their own
            // reservoir like any other pair
            internal: atomic,
            size_changed: true,
            atom_indices: if atomic {
                vec![space.groups[group_index].size]
            } else {
                vec![]
            },
            ..Default::default()
        });
        change
    }
}

impl Analysis for WidomInsertion {
    fn name(&self) -> &str {
        "widom"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        rng: &mut RandomState,
        _step: usize,
    ) -> Result<(), ConsistencyError> {
        for _ in 0..self.insertions {
            let trial = &mut chain.trial.space;
            let kind = trial.topology.molecules[self.molid].clone();
            let change = if kind.atomic {
                let Some(group_index) = trial.find_molecules(self.molid, Selection::All).next()
                else {
                    return Ok(());
                };
                if trial.groups[group_index].size == trial.groups[group_index].capacity {
                    return Ok(());
                }
                let change = Self::ghost_change(trial, group_index);
                let relative = trial.groups[group_index].size;
                trial.groups[group_index].activate(1, group_index)?;
                let absolute = trial.groups[group_index].absolute(relative);
                let atomid = kind.atoms[0];
                let position = trial.cell.random_position(&mut rng.global);
                trial.particles[absolute] =
                    trial.topology.atoms[atomid].to_particle(atomid, position);
                change
            } else {
                let inactive: Vec<usize> =
                    trial.find_molecules(self.molid, Selection::Inactive).collect();
                let Some(&group_index) = inactive.choose(&mut rng.global) else {
                    return Ok(());
                };
                let change = Self::ghost_change(trial, group_index);
                let capacity = trial.groups[group_index].capacity;
                trial.groups[group_index].activate(capacity, group_index)?;
                let target = trial.cell.random_position(&mut rng.global);
                let rotation = random_unit_quaternion(&mut rng.global);
                trial.position_group(group_index, target, Some(rotation));
                change
            };
            let delta = chain
                .trial
                .hamiltonian
                .energy(&chain.trial.space, &change);
            self.boltzmann.add(f64::exp(-delta));
            self.samples += 1;
            chain.trial.space.sync(&chain.accepted.space, &change);
        }
        Ok(())
    }

    fn report(&self) {
        info!(
            "widom: excess chemical potential = {:.4} kT ({} insertions)",
            self.excess_chemical_potential(),
            self.samples
        );
    }
}

///
/// Virtual volume perturbation: scale the trial state by +ΔV, measure the
/// energy response, restore. Reports total and excess pressure.
///
pub struct VirtualVolume {
    interval: usize,
    dv: f64,
    perturbation: average::Mean,
    ideal: average::Mean,
}

impl VirtualVolume {
    pub fn new(interval: usize, dv: f64) -> Self {
        VirtualVolume {
            interval,
            dv,
            perturbation: average::Mean::new(),
            ideal: average::Mean::new(),
        }
    }

    /// Total pressure (kT/Å³)
    pub fn total_pressure(&self) -> f64 {
        f64::ln(self.perturbation.mean()) / self.dv
    }

    /// Excess over the ideal-gas pressure (kT/Å³)
    pub fn excess_pressure(&self) -> f64 {
        self.total_pressure() - self.ideal.mean()
    }
}

impl Analysis for VirtualVolume {
    fn name(&self) -> &str {
        "virtualvolume"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        _step: usize,
    ) -> Result<(), ConsistencyError> {
        let old_volume = chain.trial.space.cell.volume();
        let new_volume = old_volume + self.dv;
        let u_old = chain.tracked_energy();
        let n = chain.trial.space.degrees_of_freedom() as f64;
        chain
            .trial
            .space
            .scale_volume(new_volume, VolumeScalePolicy::Isotropic)
            .map_err(|e| ConsistencyError::NonFiniteEnergy(e.to_string()))?;
        let change = Change::volume();
        let u_new = chain.trial.hamiltonian.energy(&chain.trial.space, &change);
        let delta = u_new - u_old;
        self.perturbation
            .add((new_volume / old_volume).powf(n) * f64::exp(-delta));
        self.ideal.add(n / old_volume);
        chain.trial.space.sync(&chain.accepted.space, &change);
        Ok(())
    }

    fn report(&self) {
        info!(
            "virtual volume: total pressure = {:.4e} kT/Å³, excess = {:.4e} kT/Å³",
            self.total_pressure(),
            self.excess_pressure()
        );
    }
}

///
/// Mean active molecule counts and molar concentrations per kind.
///
pub struct Density {
    interval: usize,
    counts: Vec<average::Mean>,
    volume: average::Mean,
}

impl Density {
    pub fn new(interval: usize, kinds: usize) -> Self {
        Density {
            interval,
            counts: (0..kinds).map(|_| average::Mean::new()).collect(),
            volume: average::Mean::new(),
        }
    }

    pub fn mean_count(&self, molid: usize) -> f64 {
        self.counts[molid].mean()
    }
}

impl Analysis for Density {
    fn name(&self) -> &str {
        "density"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        _step: usize,
    ) -> Result<(), ConsistencyError> {
        let space = &chain.accepted.space;
        for (molid, mean) in self.counts.iter_mut().enumerate() {
            let count: usize = space
                .groups
                .iter()
                .filter(|g| g.molid == molid)
                .map(|g| if g.atomic { g.size } else { usize::from(g.is_active()) })
                .sum();
            mean.add(count as f64);
        }
        self.volume.add(space.cell.volume());
        Ok(())
    }

    fn report(&self) {
        let volume = self.volume.mean();
        for (molid, mean) in self.counts.iter().enumerate() {
            let molarity = mean.mean() / volume / LITER_PER_ANGSTROM3;
            info!(
                "density: molecule {} ⟨N⟩ = {:.3}, concentration = {:.4} mol/l",
                molid,
                mean.mean(),
                molarity
            );
        }
    }
}

///
/// Records the rigid-conformation id of every active molecule of a kind.
///
pub struct ConformationProbe {
    interval: usize,
    molid: usize,
    per_molecule: BTreeMap<usize, average::Mean>,
}

impl ConformationProbe {
    pub fn new(interval: usize, molid: usize) -> Self {
        ConformationProbe {
            interval,
            molid,
            per_molecule: BTreeMap::new(),
        }
    }

    pub fn mean_confid(&self, group_index: usize) -> Option<f64> {
        self.per_molecule.get(&group_index).map(|m| m.mean())
    }
}

impl Analysis for ConformationProbe {
    fn name(&self) -> &str {
        "conformation"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        _step: usize,
    ) -> Result<(), ConsistencyError> {
        let space = &chain.accepted.space;
        let groups: Vec<(usize, usize)> = space
            .find_molecules(self.molid, Selection::Active)
            .map(|g| (g, space.groups[g].confid))
            .collect();
        for (group_index, confid) in groups {
            self.per_molecule
                .entry(group_index)
                .or_insert_with(average::Mean::new)
                .add(confid as f64);
        }
        Ok(())
    }

    fn report(&self) {
        for (group_index, mean) in &self.per_molecule {
            info!(
                "conformation: molecule {} ⟨confid⟩ = {:.4}",
                group_index,
                mean.mean()
            );
        }
    }
}
