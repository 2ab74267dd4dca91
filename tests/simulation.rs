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

//! End-to-end simulations on small systems with fixed seeds: ensemble
//! averages, conservation laws, dual-state integrity, and energy
//! bookkeeping.

use reactive_mc::analysis::AnalysisCollection;
use reactive_mc::config::Config;
use reactive_mc::montecarlo::{MarkovChain, RandomState, StepOutcome, System};
use reactive_mc::LITER_PER_ANGSTROM3;
use std::sync::Arc;

fn build(yaml: &str) -> (MarkovChain, AnalysisCollection, RandomState) {
    let config: Config = serde_yaml::from_str(yaml).expect("parse config");
    let topology = Arc::new(config.build_topology().expect("topology"));
    config.validate(&topology).expect("validation");
    let mut random = config.random.seed.build().expect("rng");
    let space = config
        .build_space(topology.clone(), &mut random.global)
        .expect("space");
    let trial = System {
        space: space.clone(),
        hamiltonian: config.build_hamiltonian(&topology).expect("hamiltonian"),
    };
    let accepted = System {
        space,
        hamiltonian: config.build_hamiltonian(&topology).expect("hamiltonian"),
    };
    let propagator = config.build_propagator(&topology).expect("propagator");
    let chain = MarkovChain::new(accepted, trial, propagator);
    let analyses = config.build_analyses(&topology).expect("analyses");
    (chain, analyses, random)
}

fn states_identical(chain: &MarkovChain) -> bool {
    chain.accepted.space.particles == chain.trial.space.particles
        && chain.accepted.space.groups == chain.trial.space.groups
        && chain.accepted.space.cell == chain.trial.space.cell
        && chain.accepted.space.reservoirs == chain.trial.space.reservoirs
}

#[test]
fn conformation_swap_reaches_weighted_equilibrium() {
    let yaml = r#"
temperature: 300.0
random: {seed: 1}
geometry: {type: cuboid, length: 30.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - B: {sigma: 1.0, mass: 1.0}
moleculelist:
  - switch:
      atoms: [B, B]
      conformations:
        - [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]
        - [[0.0, 0.0, 0.0], [3.0, 0.0, 0.0]]
      weights: [1.0, 2.0]
insertmolecules:
  - switch: {N: 2}
energy:
  - nonbonded: {pairpotential: ideal, cutoff: 10.0}
moves:
  - conformationswap: {molecule: switch, repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    let mut sums = [0.0_f64; 2];
    let mut samples = 0.0;
    for step in 0..20_000 {
        chain.step(&mut random).unwrap();
        if step >= 2_000 && step % 5 == 0 {
            for (slot, group) in chain.accepted.space.groups.iter().enumerate() {
                sums[slot] += group.confid as f64;
            }
            samples += 1.0;
        }
        if step % 997 == 0 {
            chain.accepted.space.check(step).unwrap();
        }
    }
    // weights 1:2 put each molecule in conformation 1 two thirds of the time
    for sum in sums {
        let mean = sum / samples;
        assert!(
            (mean - 2.0 / 3.0).abs() < 0.05,
            "mean confid {} outside window",
            mean
        );
    }
}

#[test]
fn rejected_moves_restore_trial_state_exactly() {
    // dense hard spheres with oversized displacements force rejections
    let yaml = r#"
temperature: 300.0
random: {seed: 2}
geometry: {type: cuboid, length: 14.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - B: {sigma: 4.0, mass: 1.0}
moleculelist:
  - trimer:
      atoms: [B, B, B]
      conformations:
        - [[0.0, 0.0, 0.0], [4.5, 0.0, 0.0], [0.0, 4.5, 0.0]]
insertmolecules:
  - trimer: {N: 3}
energy:
  - nonbonded: {pairpotential: hardsphere, cutoff: 7.0}
moves:
  - moltransrot: {molecule: trimer, dp: 10.0, dprot: 3.0, repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    let mut rejected = 0;
    for _ in 0..500 {
        let outcome = chain.step(&mut random).unwrap();
        if outcome == StepOutcome::Rejected {
            rejected += 1;
        }
        // either decision must leave the two states bit-identical
        assert!(states_identical(&chain));
    }
    assert!(rejected > 50, "expected frequent rejections, got {}", rejected);
    // mass centers of all active molecules stay exact
    chain.accepted.space.check(0).unwrap();
}

#[test]
fn energy_bookkeeping_stays_exact() {
    let yaml = r#"
temperature: 300.0
random: {seed: 3}
geometry: {type: cuboid, length: 25.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - Na: {q: 1.0, sigma: 3.0, eps: 0.2, mass: 23.0}
  - Cl: {q: -1.0, sigma: 4.0, eps: 0.2, mass: 35.5}
insertmolecules:
  - Na: {N: 12}
  - Cl: {N: 12}
energy:
  - nonbonded:
      pairpotential:
        ljcoulomb: {bjerrum: 7.0}
      cutoff: 12.0
moves:
  - transrot: {molecule: Na, dp: 1.5, repeat: 1}
  - transrot: {molecule: Cl, dp: 1.5, repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    for _ in 0..400 {
        chain.sweep(&mut random).unwrap();
    }
    let drift = chain.drift().abs();
    let scale = f64::max(1.0, chain.tracked_energy().abs());
    assert!(
        drift / scale < 1e-8,
        "relative drift {} too large",
        drift / scale
    );
}

#[test]
fn salt_dissociation_conserves_matter() {
    let yaml = r#"
temperature: 300.0
random: {seed: 4}
geometry: {type: cuboid, length: 35.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - Na: {q: 1.0, sigma: 3.0, mass: 23.0}
  - Cl: {q: -1.0, sigma: 4.0, mass: 35.5}
  - NaCl: {implicit: true}
insertmolecules:
  - Na: {N: 30, inactive: 30}
  - Cl: {N: 30, inactive: 30}
reactionlist:
  - "NaCl = Na + Cl": {lnk: 0.0, canonic: true, N: 30}
energy:
  - nonbonded: {pairpotential: ideal, cutoff: 10.0}
moves:
  - rcmc: {repeat: 2}
  - transrot: {molecule: Na, dp: 2.0, repeat: 1}
  - transrot: {molecule: Cl, dp: 2.0, repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    let mut na_total = 0.0;
    let mut cl_total = 0.0;
    let mut samples = 0.0;
    for step in 0..20_000 {
        chain.step(&mut random).unwrap();
        let space = &chain.accepted.space;
        let sodium = space.groups[0].size;
        let chloride = space.groups[1].size;
        let reservoir = space.reservoirs[0].unwrap();
        // stoichiometry ties the two reservoirs together
        assert_eq!(sodium, chloride);
        // total matter is invariant under the canonic reservoir
        assert_eq!(sodium + reservoir, 30);
        if step % 50 == 0 {
            assert!(states_identical(&chain));
        }
        if step >= 5_000 {
            na_total += sodium as f64;
            cl_total += chloride as f64;
            samples += 1.0;
        }
    }
    let na_mean = na_total / samples;
    let cl_mean = cl_total / samples;
    assert!((na_mean - cl_mean).abs() < 1e-9);
    assert!(na_mean > 1.0, "dissociation never happened: {}", na_mean);
    let drift = chain.drift().abs();
    assert!(drift < 1e-6, "drift {} with ideal energies", drift);
}

#[test]
fn grand_canonical_density_matches_activity() {
    // lnk = ln(a * N_Av/liter-per-Å³ scale) gives a Poisson with mean a*V
    let activity: f64 = 0.4; // mol/l
    let volume = 30.0_f64.powi(3);
    let lnk = (activity * LITER_PER_ANGSTROM3).ln();
    let yaml = format!(
        r#"
temperature: 300.0
random: {{seed: 5}}
geometry: {{type: cuboid, length: 30.0}}
mcloop: {{macro: 1, micro: 1}}
atomlist:
  - Na: {{q: 0.0, sigma: 3.0, mass: 23.0}}
insertmolecules:
  - Na: {{N: 60, inactive: 60}}
reactionlist:
  - "= Na": {{lnk: {lnk}}}
energy:
  - nonbonded: {{pairpotential: ideal, cutoff: 10.0}}
moves:
  - rcmc: {{repeat: 1}}
"#
    );
    let (mut chain, _analyses, mut random) = build(&yaml);
    let mut total = 0.0;
    let mut samples = 0.0;
    for step in 0..60_000 {
        chain.step(&mut random).unwrap();
        if step >= 10_000 {
            total += chain.accepted.space.groups[0].size as f64;
            samples += 1.0;
        }
    }
    let mean = total / samples;
    let expected = activity * LITER_PER_ANGSTROM3 * volume;
    assert!(
        (mean - expected).abs() / expected < 0.05,
        "mean {} vs expected {}",
        mean,
        expected
    );
}

#[test]
fn acid_base_swap_matches_ionization_fraction() {
    // lnK = ln 2 makes every site deprotonated two thirds of the time
    let yaml = r#"
temperature: 300.0
random: {seed: 6}
geometry: {type: cuboid, length: 30.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - HA: {q: 0.0, sigma: 3.0, mass: 1.0}
  - A: {q: -1.0, sigma: 3.0, mass: 1.0}
insertmolecules:
  - HA: {N: 20}
reactionlist:
  - "HA = A": {lnk: 0.6931471805599453, swap: true}
energy:
  - nonbonded: {pairpotential: ideal, cutoff: 10.0}
moves:
  - rcmc: {repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    let mut ionized = 0.0;
    let mut samples = 0.0;
    for step in 0..60_000 {
        chain.step(&mut random).unwrap();
        if step >= 10_000 {
            let space = &chain.accepted.space;
            ionized += space.count_atoms(1) as f64 / 20.0;
            samples += 1.0;
        }
    }
    let fraction = ionized / samples;
    assert!(
        (fraction - 2.0 / 3.0).abs() < 0.02,
        "ionization fraction {} outside window",
        fraction
    );
}

#[test]
fn ideal_gas_pressure_from_virtual_volume() {
    let yaml = r#"
temperature: 300.0
random: {seed: 7}
geometry: {type: cuboid, length: 50.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - N: {sigma: 1.0, mass: 1.0}
insertmolecules:
  - N: {N: 20}
energy:
  - nonbonded: {pairpotential: ideal, cutoff: 10.0}
moves:
  - transrot: {molecule: N, dp: 5.0, repeat: 1}
analysis:
  - sanity: {nstep: 500}
"#;
    let (mut chain, mut analyses, mut random) = build(yaml);
    let volume = 50.0_f64.powi(3);
    let expected = 20.0 / volume;
    let mut probe = reactive_mc::analysis::VirtualVolume::new(1, 1.0);
    use reactive_mc::analysis::Analysis;
    for step in 1..=10_000 {
        chain.step(&mut random).unwrap();
        probe.sample(&mut chain, &mut random, step).unwrap();
        analyses.sample(&mut chain, &mut random, step).unwrap();
    }
    let total = probe.total_pressure();
    assert!(
        (total - expected).abs() / expected < 0.01,
        "total pressure {} vs ideal {}",
        total,
        expected
    );
    assert!(
        probe.excess_pressure().abs() < 1e-4,
        "excess pressure {} should vanish",
        probe.excess_pressure()
    );
}

#[test]
fn widom_insertion_in_ideal_gas_is_free() {
    let yaml = r#"
temperature: 300.0
random: {seed: 8}
geometry: {type: cuboid, length: 40.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - N: {sigma: 1.0, mass: 1.0}
insertmolecules:
  - N: {N: 30, inactive: 10}
energy:
  - nonbonded: {pairpotential: ideal, cutoff: 10.0}
moves:
  - transrot: {molecule: N, dp: 4.0, repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    let mut widom = reactive_mc::analysis::WidomInsertion::new(1, 0, 2);
    use reactive_mc::analysis::Analysis;
    for step in 0..2_000 {
        chain.step(&mut random).unwrap();
        widom.sample(&mut chain, &mut random, step).unwrap();
        assert!(states_identical(&chain));
    }
    assert!(
        widom.excess_chemical_potential().abs() < 1e-9,
        "ideal gas has zero excess chemical potential"
    );
}

#[test]
fn volume_moves_keep_isobaric_bookkeeping() {
    let yaml = r#"
temperature: 300.0
random: {seed: 9}
pressure: 0.1
geometry: {type: cuboid, length: 30.0}
mcloop: {macro: 1, micro: 1}
atomlist:
  - N: {sigma: 2.0, eps: 0.1, mass: 1.0}
insertmolecules:
  - N: {N: 20}
energy:
  - nonbonded: {pairpotential: lennardjones, cutoff: 12.0}
moves:
  - transrot: {molecule: N, dp: 2.0, repeat: 5}
  - volume: {dv: 0.05, method: isotropic, repeat: 1}
"#;
    let (mut chain, _analyses, mut random) = build(yaml);
    for _ in 0..300 {
        chain.sweep(&mut random).unwrap();
        assert!(states_identical(&chain));
        chain.accepted.space.check(0).unwrap();
    }
    let drift = chain.drift().abs();
    let scale = f64::max(1.0, chain.tracked_energy().abs());
    assert!(
        drift / scale < 1e-7,
        "relative drift {} after volume moves",
        drift / scale
    );
}
