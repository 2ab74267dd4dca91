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
//! The Metropolis-Hastings machinery: acceptance criterion, ideal-gas
//! correction for particle-number changes, weighted move selection, and
//! the dual-state driver that keeps the accepted and the trial state
//! synchronized through change descriptors.
//!

use average::Estimate;
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::energy::{EnergyTerm, Hamiltonian};
use crate::moves::MoveAlgorithm;
use crate::space::Space;
use crate::topology::Species;
use crate::ConsistencyError;

///
/// Use the Metropolis-Hastings criterion to determine if a
/// move should be accepted or rejected based on the energy difference.
///
/// # Arguments
///
/// * `energy_change` - New energy minus old energy in units of kT,
///   including move bias and the ideal-gas term
///
pub fn accept_move(energy_change: f64, rng: &mut impl Rng) -> bool {
    if energy_change.is_nan() {
        return false;
    }
    let acceptance_probability = f64::min(1.0, f64::exp(-energy_change));
    rng.gen::<f64>() < acceptance_probability
}

/// ΔU = u_new − u_old with hard-core infinities resolved: +∞ on the new
/// side always rejects; +∞ only on the old side always accepts
pub fn energy_difference(u_new: f64, u_old: f64) -> f64 {
    if u_new.is_infinite() && u_new > 0.0 {
        f64::INFINITY
    } else if u_old.is_infinite() && u_old > 0.0 {
        f64::NEG_INFINITY
    } else {
        u_new - u_old
    }
}

///
/// Ideal-gas contribution to the acceptance when the particle count
/// changes: `−Σ ln(N_old!/N_new! · V^{N_new−N_old})` summed over every
/// species whose active count differs between the trial and the accepted
/// state. This is the term that drives insertion/deletion equilibria to
/// the configured activities.
///
pub fn ideal_term(trial: &Space, accepted: &Space, change: &Change) -> f64 {
    if !change.matter_changed {
        return 0.0;
    }
    let volume = trial.cell.volume();
    // true: count over all active particles (identity swaps, whose random
    // pick also ranges over everything); false: count reservoirs or groups
    let mut species: Vec<(Species, bool)> = Vec::new();
    let collect = |entry: (Species, bool), list: &mut Vec<(Species, bool)>| {
        if !list.iter().any(|(species, _)| *species == entry.0) {
            list.push(entry);
        }
    };
    for group_change in &change.groups {
        let group = &trial.groups[group_change.group_index];
        if group_change.swapped {
            for space in [trial, accepted] {
                let group = &space.groups[group_change.group_index];
                for &relative in &group_change.atom_indices {
                    if relative < group.size {
                        let id = space.particles[group.absolute(relative)].id;
                        collect((Species::Atom(id), true), &mut species);
                    }
                }
            }
        } else if group.atomic {
            for space in [trial, accepted] {
                let window = space.groups[group_change.group_index].range();
                for particle in &space.particles[window] {
                    collect((Species::Atom(particle.id), false), &mut species);
                }
            }
        } else {
            collect((Species::Molecule(group.molid), false), &mut species);
        }
    }
    let mut energy = 0.0;
    for (entry, global) in species {
        let (n_new, n_old) = match entry {
            Species::Atom(id) if global => (trial.count_atoms(id), accepted.count_atoms(id)),
            Species::Atom(id) => (
                count_reservoir_atoms(trial, id),
                count_reservoir_atoms(accepted, id),
            ),
            Species::Molecule(id) => (trial.count_molecules(id), accepted.count_molecules(id)),
        };
        if n_new > n_old {
            for n in (n_old + 1)..=n_new {
                energy += (n as f64).ln() - volume.ln();
            }
        } else {
            for n in (n_new + 1)..=n_old {
                energy -= (n as f64).ln() - volume.ln();
            }
        }
    }
    energy
}

/// Active atoms of a kind inside reservoir groups only; molecular
/// constituents are accounted for by their molecule species
fn count_reservoir_atoms(space: &Space, atomid: usize) -> usize {
    space
        .groups
        .iter()
        .filter(|g| g.atomic)
        .flat_map(|g| space.particles[g.range()].iter())
        .filter(|p| p.id == atomid)
        .count()
}

///
/// Final Monte Carlo move that in addition to a move algorithm also
/// tracks acceptance statistics. Instances are normally created by
/// [`Propagator::push`].
///
pub struct MonteCarloMove {
    acceptance_ratio: average::Mean,
    algorithm: Box<dyn MoveAlgorithm>,
}

impl MonteCarloMove {
    pub fn new(algorithm: Box<dyn MoveAlgorithm>) -> Self {
        MonteCarloMove {
            acceptance_ratio: average::Mean::new(),
            algorithm,
        }
    }

    /// Ratio of accepted vs. total Monte Carlo moves
    pub fn mean_acceptance(&self) -> f64 {
        self.acceptance_ratio.mean()
    }

    pub fn algorithm_mut(&mut self) -> &mut dyn MoveAlgorithm {
        self.algorithm.as_mut()
    }

    pub fn record(&mut self, accepted: bool) {
        self.acceptance_ratio.add(accepted as usize as f64);
    }

    pub fn name(&self) -> String {
        self.algorithm.name().to_string()
    }
}

///
/// Aggregator for multiple Monte Carlo moves, drawn from a weighted
/// categorical distribution. The weight of a move is its configured
/// `repeat`; one sweep performs the summed repeat count of draws.
///
#[derive(Default)]
pub struct Propagator {
    moves: Vec<MonteCarloMove>,
    weights: Vec<f64>,
    distribution: Option<WeightedIndex<f64>>,
}

impl Propagator {
    pub fn push<T: 'static + MoveAlgorithm>(&mut self, algorithm: T, weight: f64) {
        self.moves.push(MonteCarloMove::new(Box::new(algorithm)));
        self.weights.push(weight);
        self.distribution = WeightedIndex::new(self.weights.clone()).ok();
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Number of draws per sweep
    pub fn sweep_length(&self) -> usize {
        (self.weights.iter().sum::<f64>().round() as usize).max(1)
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Option<usize> {
        self.distribution.as_ref().map(|d| d.sample(rng))
    }

    pub fn get_mut(&mut self, index: usize) -> &mut MonteCarloMove {
        &mut self.moves[index]
    }

    /// Log acceptance ratios and per-move statistics
    pub fn log_statistics(&self) {
        for mc_move in &self.moves {
            info!(
                "move '{}' acceptance ratio = {:.3}",
                mc_move.name(),
                mc_move.mean_acceptance()
            );
            mc_move.algorithm.report();
        }
    }
}

///
/// Seedable, serializable random number generators: one stream for the
/// moves (part of the Markov chain) and one for analyses and initial
/// placement. Both are checkpointed so that replay is bitwise
/// reproducible.
///
#[derive(Clone, Serialize, Deserialize)]
pub struct RandomState {
    pub moves: Pcg64,
    pub global: Pcg64,
}

impl RandomState {
    pub fn from_seed(seed: u64) -> Self {
        RandomState {
            moves: Pcg64::seed_from_u64(seed),
            global: Pcg64::seed_from_u64(seed ^ 0x9e37_79b9_7f4a_7c15),
        }
    }

    pub fn from_entropy() -> Self {
        RandomState::from_seed(rand::thread_rng().gen())
    }
}

/// One simulation state: a space plus its Hamiltonian so that energy-term
/// caches can follow the state they describe
pub struct System {
    pub space: Space,
    pub hamiltonian: Hamiltonian,
}

/// Outcome of a single driver step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Accepted,
    Rejected,
}

///
/// The Markov chain driver. Owns the accepted and the trial state,
/// proposes moves on the trial state, applies the Metropolis criterion,
/// and restores the dual-state invariant through `sync` on every
/// decision. The accepted state is a monotone history; the trial state is
/// a scratchpad.
///
pub struct MarkovChain {
    pub accepted: System,
    pub trial: System,
    pub propagator: Propagator,
    change: Change,
    step_count: usize,
    initial_energy: f64,
    accumulated: f64,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl MarkovChain {
    pub fn new(accepted: System, trial: System, propagator: Propagator) -> Self {
        let mut chain = MarkovChain {
            accepted,
            trial,
            propagator,
            change: Change::default(),
            step_count: 0,
            initial_energy: 0.0,
            accumulated: 0.0,
            stop: std::sync::Arc::default(),
        };
        chain.rebase();
        chain
    }

    ///
    /// Cooperative stop flag, observed between sweeps only so that a
    /// request can never leave the trial state desynchronized mid-step.
    ///
    pub fn stop_handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.stop.clone()
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Reset the drift baseline to a fresh full energy evaluation
    pub fn rebase(&mut self) {
        self.initial_energy = self
            .accepted
            .hamiltonian
            .energy(&self.accepted.space, &Change::all());
        self.accumulated = 0.0;
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Energy of the accepted state as tracked by summed deltas (kT)
    pub fn tracked_energy(&self) -> f64 {
        self.initial_energy + self.accumulated
    }

    ///
    /// Absolute energy drift: difference between a fresh full evaluation
    /// and the tracked value. Divergence indicates broken bookkeeping.
    ///
    pub fn drift(&self) -> f64 {
        let current = self
            .accepted
            .hamiltonian
            .energy(&self.accepted.space, &Change::all());
        current - self.tracked_energy()
    }

    ///
    /// One Metropolis step: draw a move, propose on the trial state,
    /// evaluate ΔU over the change, decide, synchronize.
    ///
    pub fn step(&mut self, rng: &mut RandomState) -> Result<StepOutcome, ConsistencyError> {
        self.step_count += 1;
        let index = match self.propagator.sample(&mut rng.moves) {
            Some(index) => index,
            None => return Ok(StepOutcome::Rejected),
        };
        self.change.clear();
        let mc_move = self.propagator.get_mut(index);
        {
            let System { space, hamiltonian } = &mut self.trial;
            mc_move.algorithm_mut().propose(
                space,
                &mut self.accepted.space,
                hamiltonian,
                &mut self.change,
                &mut rng.moves,
            )?;
        }
        self.change.sanitize();
        if self.change.is_empty() {
            mc_move.algorithm_mut().reject(&self.change);
            mc_move.record(false);
            return Ok(StepOutcome::Rejected);
        }
        let u_new = self.trial.hamiltonian.energy(&self.trial.space, &self.change);
        let u_old = self
            .accepted
            .hamiltonian
            .energy(&self.accepted.space, &self.change);
        let du = energy_difference(u_new, u_old);
        let bias =
            mc_move
                .algorithm_mut()
                .bias(&self.trial.space, &self.accepted.space, &self.change, u_old, u_new);
        let ideal = ideal_term(&self.trial.space, &self.accepted.space, &self.change);
        let total = du + bias + ideal;
        debug!(
            "step {}: move '{}' du = {:.4} bias = {:.4} ideal = {:.4}",
            self.step_count,
            mc_move.name(),
            du,
            bias,
            ideal
        );
        if accept_move(total, &mut rng.moves) {
            self.accepted.space.sync(&self.trial.space, &self.change);
            self.accepted
                .hamiltonian
                .update_state(&self.accepted.space, &self.change);
            if du.is_finite() {
                self.accumulated += du;
            } else {
                self.rebase();
            }
            let mc_move = self.propagator.get_mut(index);
            mc_move.algorithm_mut().accept(&self.change);
            mc_move.record(true);
            #[cfg(debug_assertions)]
            self.accepted.space.check(self.step_count)?;
            Ok(StepOutcome::Accepted)
        } else {
            self.trial.space.sync(&self.accepted.space, &self.change);
            self.trial
                .hamiltonian
                .update_state(&self.trial.space, &self.change);
            let mc_move = self.propagator.get_mut(index);
            mc_move.algorithm_mut().reject(&self.change);
            mc_move.record(false);
            Ok(StepOutcome::Rejected)
        }
    }

    /// One sweep of weighted draws
    pub fn sweep(&mut self, rng: &mut RandomState) -> Result<(), ConsistencyError> {
        for _ in 0..self.propagator.sweep_length() {
            self.step(rng)?;
        }
        Ok(())
    }

    /// Warn when the relative drift exceeds the given tolerance
    pub fn check_drift(&self, tolerance: f64) -> f64 {
        let drift = self.drift();
        let relative = drift.abs() / f64::max(1.0, self.tracked_energy().abs());
        if relative > tolerance {
            warn!(
                "energy drift {:.3e} kT (relative {:.3e}) exceeds tolerance {:.1e}",
                drift, relative, tolerance
            );
        }
        relative
    }

    /// The last sanitized change descriptor (test and analysis support)
    pub fn last_change(&self) -> &Change {
        &self.change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_move() {
        use num_traits::Float;
        let mut rng = Pcg64::seed_from_u64(0);
        let max_exponent = f64::ln(<f64 as Float>::max_value());
        assert!(accept_move(-1.0, &mut rng));
        assert!(accept_move(0.0, &mut rng));
        assert!(!accept_move(max_exponent, &mut rng));
        assert!(!accept_move(max_exponent * 1.1, &mut rng));
        assert!(!accept_move(f64::NAN, &mut rng));
    }

    #[test]
    fn test_energy_difference_infinities() {
        assert_eq!(energy_difference(f64::INFINITY, 1.0), f64::INFINITY);
        assert_eq!(energy_difference(1.0, f64::INFINITY), f64::NEG_INFINITY);
        assert_eq!(energy_difference(3.0, 1.0), 2.0);
    }

    #[test]
    fn test_random_state_reproducible() {
        let mut a = RandomState::from_seed(42);
        let mut b = RandomState::from_seed(42);
        assert_eq!(a.moves.gen::<u64>(), b.moves.gen::<u64>());
        assert_eq!(a.global.gen::<u64>(), b.global.gen::<u64>());
        // the two streams must differ from each other
        let mut c = RandomState::from_seed(42);
        assert_ne!(c.moves.gen::<u64>(), c.global.gen::<u64>());
    }
}
