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

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use reactive_mc::config::Config;
use reactive_mc::montecarlo::{MarkovChain, System};
use reactive_mc::state::SavedState;
use reactive_mc::trajectory::save_coordinates;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a Monte Carlo simulation
    Run {
        /// Input configuration (YAML)
        #[clap(short, long)]
        input: PathBuf,

        /// Resume from a previously saved state
        #[clap(long)]
        state: Option<PathBuf>,

        /// State file written at the end (.json or binary)
        #[clap(short = 'o', long)]
        output_state: Option<PathBuf>,

        /// Final coordinate snapshot (.xyz, .pqr, .gro or .aam)
        #[clap(short = 'c', long)]
        coordinates: Option<PathBuf>,

        /// Relative energy-drift tolerance checked per macro cycle
        #[clap(long, default_value_t = 1e-4)]
        drift_tolerance: f64,
    },
    /// Validate an input file without running
    Check {
        /// Input configuration (YAML)
        #[clap(short, long)]
        input: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Commands::Run {
            input,
            state,
            output_state,
            coordinates,
            drift_tolerance,
        } => run(input, state, output_state, coordinates, drift_tolerance),
        Commands::Check { input } => check(input),
    }
}

fn check(input: PathBuf) -> anyhow::Result<()> {
    let config = Config::from_yaml_file(&input)
        .with_context(|| format!("cannot load '{}'", input.display()))?;
    let topology = config.build_topology()?;
    config.validate(&topology)?;
    config.build_hamiltonian(&topology)?;
    config.build_propagator(&topology)?;
    println!(
        "ok: {} atom kinds, {} molecule kinds, {} reactions",
        topology.atoms.len(),
        topology.molecules.len(),
        topology.reactions.len()
    );
    Ok(())
}

fn run(
    input: PathBuf,
    state: Option<PathBuf>,
    output_state: Option<PathBuf>,
    coordinates: Option<PathBuf>,
    drift_tolerance: f64,
) -> anyhow::Result<()> {
    let config = Config::from_yaml_file(&input)
        .with_context(|| format!("cannot load '{}'", input.display()))?;
    let topology = Arc::new(config.build_topology()?);
    config.validate(&topology)?;

    let mut random = config.random.seed.build()?;
    let mut space = config.build_space(topology.clone(), &mut random.global)?;
    let mut step = 0;
    if let Some(path) = &state {
        let saved = SavedState::load(path)
            .with_context(|| format!("cannot load state '{}'", path.display()))?;
        saved.apply(&mut space)?;
        step = saved.step;
        if let Some(stored) = saved.random {
            random = stored;
            info!("resumed RNG state from '{}'", path.display());
        }
    }

    let trial = System {
        space: space.clone(),
        hamiltonian: config.build_hamiltonian(&topology)?,
    };
    let accepted = System {
        space,
        hamiltonian: config.build_hamiltonian(&topology)?,
    };
    let propagator = config.build_propagator(&topology)?;
    let mut chain = MarkovChain::new(accepted, trial, propagator);
    let mut analyses = config.build_analyses(&topology)?;

    info!(
        "{} particles in {} groups, V = {:.1} Å³, U = {:.4} kT",
        chain.accepted.space.particles.len(),
        chain.accepted.space.groups.len(),
        chain.accepted.space.cell.volume(),
        chain.tracked_energy()
    );

    // customise progress bar
    let bar = ProgressBar::new(config.mcloop.macro_cycles as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    // main Monte Carlo loop
    'outer: for _ in 0..config.mcloop.macro_cycles {
        for _ in 0..config.mcloop.micro {
            chain.sweep(&mut random)?;
            step += 1;
            analyses.sample(&mut chain, &mut random, step)?;
            if chain.stop_requested() {
                info!("stop requested; finishing after sweep {}", step);
                break 'outer;
            }
        }
        chain.check_drift(drift_tolerance);
        bar.inc(1);
    }
    bar.finish();

    chain.propagator.log_statistics();
    analyses.report();
    analyses.finalize()?;
    info!(
        "final energy = {:.4} kT, drift = {:.3e} kT",
        chain.tracked_energy(),
        chain.drift()
    );

    if let Some(path) = &output_state {
        let rng = config.random.save.then_some(&random);
        SavedState::from_space(&chain.accepted.space, rng, step).save(path)?;
        info!("state saved to '{}'", path.display());
    }
    if let Some(path) = &coordinates {
        save_coordinates(path, &chain.accepted.space)?;
        info!("coordinates saved to '{}'", path.display());
    }
    Ok(())
}
