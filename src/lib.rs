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
//! Metropolis Monte Carlo engine for molecular and coarse-grained systems in
//! the canonical, isobaric, grand-canonical, and reactive ensembles.
//!
//! Particles are grouped into molecules stored in a flat particle vector;
//! trial moves mutate a scratch [`space::Space`] and describe their footprint
//! through a [`change::Change`] descriptor which drives incremental energy
//! evaluation and O(change) accept/reject synchronization between the trial
//! and the accepted state.
//!
//! Units: lengths in ångström (Å), energies in units of kT, charges in
//! elementary charges, volumes in Å³. Conversions to and from molar
//! concentrations and kelvin happen only at the configuration and output
//! boundaries.
//!

pub mod analysis;
pub mod change;
pub mod config;
pub mod energy;
pub mod geometry;
pub mod group;
pub mod montecarlo;
pub mod moves;
pub mod particle;
pub mod space;
pub mod state;
pub mod topology;
pub mod trajectory;

use thiserror::Error;

/// Avogadro's number over 1e27, i.e. particles per Å³ at 1 mol/l
pub const LITER_PER_ANGSTROM3: f64 = 6.02214076e-4;

/// Bjerrum length prefactor, e²/(4πε₀k_B) in Å·K
pub const BJERRUM_COEFF: f64 = 167100.9;

/// Bjerrum length (Å) in a medium with relative dielectric constant
/// `epsilon_r` at temperature `temperature` (K)
pub fn bjerrum_length(temperature: f64, epsilon_r: f64) -> f64 {
    BJERRUM_COEFF / (epsilon_r * temperature)
}

/// Errors raised while loading and validating the input; always fatal and
/// reported before any part of the system is initialized.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown atom name '{0}'")]
    UnknownAtom(String),
    #[error("unknown molecule name '{0}'")]
    UnknownMolecule(String),
    #[error("unknown name '{0}' in reaction '{1}'")]
    UnknownReactionSpecies(String, String),
    #[error("malformed reaction '{0}': {1}")]
    MalformedReaction(String, String),
    #[error("swap reaction '{0}' must have exactly one explicit atomic species on each side")]
    InvalidSwapReaction(String),
    #[error("atomic reservoir for molecule '{0}' declared more than once")]
    DuplicateReservoir(String),
    #[error("molecule '{0}': {1}")]
    InvalidMolecule(String, String),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid value for '{0}': {1}")]
    InvalidValue(&'static str, String),
    #[error("state file does not match topology: {0}")]
    StateMismatch(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("state encoding error: {0}")]
    Encoding(String),
}

/// Runtime invariant violations; these indicate a bug in the engine or a
/// corrupt state file, never ordinary user input, and abort the simulation
/// with a structured diagnostic.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("step {step}: mass center of group {group} drifted by {drift:.3e} Å")]
    MassCenterDrift { step: usize, group: usize, drift: f64 },
    #[error("step {step}: particle {particle} in group {group} lies outside the cell")]
    ParticleOutsideCell { step: usize, group: usize, particle: usize },
    #[error("step {step}: groups do not tile the particle vector at group {group}")]
    BrokenGroupTiling { step: usize, group: usize },
    #[error("step {step}: trial and accepted states differ at slot {particle}")]
    StatesOutOfSync { step: usize, particle: usize },
    #[error("canonic reservoir for reaction '{reaction}' underflowed")]
    ReservoirUnderflow { reaction: String },
    #[error("misconfigured reaction '{reaction}': {reason}")]
    MisconfiguredReaction { reaction: String, reason: String },
    #[error("group {group}: {reason}")]
    InvalidGroupOperation { group: usize, reason: String },
    #[error("non-finite energy encountered: {0}")]
    NonFiniteEnergy(String),
    #[error("output error: {0}")]
    Output(String),
}
