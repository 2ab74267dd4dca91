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
//! Hierarchical YAML configuration: topology tables, geometry, ensemble
//! parameters, energy terms, moves, and analyses. Validation happens here
//! in full before any state is created; a bad input never leads to a
//! partially initialized simulation.
//!

use crate::analysis::{
    AnalysisCollection, ConformationProbe, Density, SystemSanity, VirtualVolume, WidomInsertion,
};
use crate::energy::{
    Bonded, Confine, Coulomb, HardSphere, Hamiltonian, Ideal, LennardJones, Nonbonded, Sum,
};
use crate::geometry::{Cell, VolumeScalePolicy};
use crate::montecarlo::{Propagator, RandomState};
use crate::moves::{
    AtomicTranslateRotate, ChargeMove, ClusterMove, ConformationSwap, Crankshaft,
    MolecularTranslateRotate, Pivot, SpeciationMove, VolumeMove,
};
use crate::space::Space;
use crate::topology::{AtomKind, Bond, InsertionPolicy, MoleculeKind, Topology};
use crate::trajectory::{ChargeRadiusTrajectory, CompactTrajectory, SnapshotWriter};
use crate::{bjerrum_length, ConfigError, LITER_PER_ANGSTROM3};
use nalgebra::Vector3;
use rand_pcg::Pcg64;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FIXED_SEED: u64 = 4711;

fn default_repeat() -> usize {
    1
}

fn default_directions() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// temperature (K); fixes the energy unit kT
    pub temperature: f64,
    /// external pressure (mol/l) for isobaric runs
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub random: RandomSpec,
    pub geometry: GeometrySpec,
    pub mcloop: McLoop,
    pub atomlist: Vec<HashMap<String, AtomSpec>>,
    #[serde(default)]
    pub moleculelist: Vec<HashMap<String, MoleculeSpec>>,
    pub insertmolecules: Vec<HashMap<String, InsertSpec>>,
    #[serde(default)]
    pub reactionlist: Vec<HashMap<String, ReactionSpec>>,
    pub energy: Vec<EnergySpec>,
    pub moves: Vec<MoveSpec>,
    #[serde(default)]
    pub analysis: Vec<AnalysisSpec>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RandomSpec {
    #[serde(default)]
    pub seed: Seed,
    /// include the generator state in saved states
    #[serde(default)]
    pub save: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Integer(u64),
    Policy(String),
}

impl Default for Seed {
    fn default() -> Self {
        Seed::Policy("default".to_string())
    }
}

impl Seed {
    pub fn build(&self) -> Result<RandomState, ConfigError> {
        match self {
            Seed::Integer(seed) => Ok(RandomState::from_seed(*seed)),
            Seed::Policy(policy) => match policy.as_str() {
                "default" => Ok(RandomState::from_entropy()),
                "fixed" => Ok(RandomState::from_seed(FIXED_SEED)),
                other => Err(ConfigError::InvalidValue(
                    "random.seed",
                    format!("expected 'default', 'fixed' or an integer, got '{}'", other),
                )),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeometrySpec {
    Cuboid { length: LengthSpec },
    Sphere { radius: f64 },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum LengthSpec {
    Cube(f64),
    Sides([f64; 3]),
}

impl GeometrySpec {
    pub fn build(&self) -> Result<Cell, ConfigError> {
        match self {
            GeometrySpec::Cuboid {
                length: LengthSpec::Cube(side),
            } => Cell::cube(*side),
            GeometrySpec::Cuboid {
                length: LengthSpec::Sides(sides),
            } => Cell::cuboid(Vector3::new(sides[0], sides[1], sides[2])),
            GeometrySpec::Sphere { radius } => Cell::sphere(*radius),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct McLoop {
    /// outer cycles; progress and drift are reported per macro cycle
    #[serde(rename = "macro")]
    pub macro_cycles: usize,
    /// sweeps per macro cycle
    pub micro: usize,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AtomSpec {
    #[serde(default)]
    pub sigma: f64,
    /// Lennard-Jones well depth (kT)
    #[serde(default)]
    pub eps: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// charge (e)
    #[serde(default, rename = "q")]
    pub charge: f64,
    #[serde(default)]
    pub implicit: bool,
    /// activity (mol/l) of an implicit species
    #[serde(default)]
    pub activity: Option<f64>,
    /// dipole moment scalar (eÅ)
    #[serde(default)]
    pub dipole: Option<f64>,
    /// sphero-cylinder half length (Å)
    #[serde(default)]
    pub cigar: Option<f64>,
}

fn default_mass() -> f64 {
    1.0
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MoleculeSpec {
    #[serde(default)]
    pub atomic: bool,
    pub atoms: Vec<String>,
    #[serde(default)]
    pub bonds: Vec<Bond>,
    #[serde(default)]
    pub conformations: Vec<Vec<[f64; 3]>>,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub insertion: Option<InsertionPolicy>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertSpec {
    #[serde(rename = "N")]
    pub count: usize,
    #[serde(default)]
    pub inactive: InactiveSpec,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(untagged)]
pub enum InactiveSpec {
    All(bool),
    Count(usize),
}

impl Default for InactiveSpec {
    fn default() -> Self {
        InactiveSpec::Count(0)
    }
}

impl InactiveSpec {
    fn count(&self, total: usize) -> usize {
        match self {
            InactiveSpec::All(true) => total,
            InactiveSpec::All(false) => 0,
            InactiveSpec::Count(n) => *n,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionSpec {
    #[serde(default)]
    pub lnk: f64,
    /// alternative to lnk: base-10 equilibrium constant, lnK = −ln(10)·pK
    #[serde(default)]
    pub pk: Option<f64>,
    #[serde(default)]
    pub canonic: bool,
    #[serde(default, rename = "N")]
    pub reservoir: usize,
    #[serde(default)]
    pub swap: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergySpec {
    Nonbonded {
        pairpotential: PairPotentialSpec,
        cutoff: f64,
    },
    Bonded,
    Confine {
        molecules: Vec<String>,
        k: f64,
        radius: f64,
        #[serde(default)]
        origin: [f64; 3],
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairPotentialSpec {
    Ideal,
    LennardJones,
    HardSphere,
    Coulomb {
        #[serde(default)]
        epsr: Option<f64>,
        #[serde(default)]
        bjerrum: Option<f64>,
    },
    LjCoulomb {
        #[serde(default)]
        epsr: Option<f64>,
        #[serde(default)]
        bjerrum: Option<f64>,
    },
    Primitive {
        #[serde(default)]
        epsr: Option<f64>,
        #[serde(default)]
        bjerrum: Option<f64>,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveSpec {
    MolTransRot {
        molecule: String,
        dp: f64,
        #[serde(default)]
        dprot: f64,
        #[serde(default = "default_directions")]
        dir: [f64; 3],
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    TransRot {
        molecule: String,
        dp: f64,
        #[serde(default)]
        dprot: f64,
        #[serde(default = "default_directions")]
        dir: [f64; 3],
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    Volume {
        #[serde(alias = "dV")]
        dv: f64,
        #[serde(default = "default_volume_method")]
        method: VolumeScalePolicy,
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    ConformationSwap {
        molecule: String,
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    Rcmc {
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    Charge {
        molecule: String,
        dq: f64,
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    Cluster {
        molecules: Vec<String>,
        threshold: f64,
        dp: f64,
        #[serde(default)]
        dprot: f64,
        #[serde(default = "default_directions")]
        dir: [f64; 3],
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    Pivot {
        molecule: String,
        dprot: f64,
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
    Crankshaft {
        molecule: String,
        dprot: f64,
        #[serde(default = "default_repeat")]
        repeat: usize,
    },
}

fn default_volume_method() -> VolumeScalePolicy {
    VolumeScalePolicy::Isotropic
}

fn default_interval() -> usize {
    100
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSpec {
    Sanity {
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    Widom {
        molecule: String,
        #[serde(default = "default_repeat")]
        ninsert: usize,
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    VirtualVolume {
        #[serde(alias = "dV")]
        dv: f64,
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    Density {
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    Conformation {
        molecule: String,
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    CompactTraj {
        file: PathBuf,
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    Snapshot {
        file: PathBuf,
        #[serde(default = "default_interval")]
        nstep: usize,
    },
    ChargeRadius {
        file: PathBuf,
        #[serde(default = "default_interval")]
        nstep: usize,
    },
}

/// Single-key maps give the configuration its `- name: {...}` list shape
fn single_entry<'a, T>(
    map: &'a HashMap<String, T>,
    context: &'static str,
) -> Result<(&'a str, &'a T), ConfigError> {
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((key, value)), None) => Ok((key.as_str(), value)),
        _ => Err(ConfigError::InvalidValue(
            context,
            "expected exactly one name per list entry".to_string(),
        )),
    }
}

impl Config {
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    ///
    /// Resolve names into the immutable topology tables. Atom and molecule
    /// ids follow list order; every atomic kind used without an explicit
    /// molecule entry gets an implicit single-atom molecule of the same
    /// name.
    ///
    pub fn build_topology(&self) -> Result<Topology, ConfigError> {
        let mut topology = Topology::default();
        for entry in &self.atomlist {
            let (name, spec) = single_entry(entry, "atomlist")?;
            topology.atoms.push(AtomKind {
                name: name.to_string(),
                sigma: spec.sigma,
                eps: spec.eps,
                mass: spec.mass,
                charge: spec.charge,
                implicit: spec.implicit,
                activity: spec.activity,
                dipole: spec.dipole,
                cigar: spec.cigar,
            });
        }
        for entry in &self.moleculelist {
            let (name, spec) = single_entry(entry, "moleculelist")?;
            let atoms = spec
                .atoms
                .iter()
                .map(|atom| {
                    topology
                        .atom_id(atom)
                        .ok_or_else(|| ConfigError::UnknownAtom(atom.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            topology.molecules.push(MoleculeKind {
                name: name.to_string(),
                atomic: spec.atomic,
                atoms,
                bonds: spec.bonds.clone(),
                conformations: spec
                    .conformations
                    .iter()
                    .map(|c| c.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect())
                    .collect(),
                weights: spec.weights.clone(),
                insertion: spec.insertion.clone().unwrap_or_default(),
            });
        }
        // free atoms inserted directly become implicit single-atom reservoirs
        for entry in &self.insertmolecules {
            let (name, _) = single_entry(entry, "insertmolecules")?;
            if topology.molecule_id(name).is_none() {
                let atomid = topology
                    .atom_id(name)
                    .ok_or_else(|| ConfigError::UnknownMolecule(name.to_string()))?;
                topology.molecules.push(MoleculeKind {
                    name: name.to_string(),
                    atomic: true,
                    atoms: vec![atomid],
                    bonds: vec![],
                    conformations: vec![],
                    weights: vec![],
                    insertion: InsertionPolicy::default(),
                });
            }
        }
        for entry in &self.reactionlist {
            let (equation, spec) = single_entry(entry, "reactionlist")?;
            let lnk = match spec.pk {
                Some(pk) => -std::f64::consts::LN_10 * pk,
                None => spec.lnk,
            };
            let reaction =
                topology.parse_reaction(equation, lnk, spec.canonic, spec.reservoir, spec.swap)?;
            topology.reactions.push(reaction);
        }
        topology.validate()?;
        self.validate_reservoirs(&topology)?;
        Ok(topology)
    }

    /// Atomic species taking part in reactions must be backed by exactly
    /// one reservoir group
    fn validate_reservoirs(&self, topology: &Topology) -> Result<(), ConfigError> {
        for (molid, kind) in topology.molecules.iter().enumerate() {
            if !kind.atomic {
                continue;
            }
            let used = topology.reactions.iter().any(|r| {
                r.reactants
                    .iter()
                    .chain(&r.products)
                    .any(|(s, _)| *s == crate::topology::Species::Molecule(molid))
            });
            if !used {
                continue;
            }
            let declarations = self
                .insertmolecules
                .iter()
                .filter(|entry| entry.contains_key(&kind.name))
                .count();
            if declarations > 1 {
                return Err(ConfigError::DuplicateReservoir(kind.name.clone()));
            }
            if declarations == 0 {
                return Err(ConfigError::InvalidValue(
                    "reactionlist",
                    format!("no reservoir declared for reactive species '{}'", kind.name),
                ));
            }
        }
        Ok(())
    }

    /// Allocate and randomly place the initial configuration
    pub fn build_space(
        &self,
        topology: Arc<Topology>,
        rng: &mut Pcg64,
    ) -> Result<Space, ConfigError> {
        let cell = self.geometry.build()?;
        let mut directives = Vec::new();
        for entry in &self.insertmolecules {
            let (name, spec) = single_entry(entry, "insertmolecules")?;
            let molid = topology
                .molecule_id(name)
                .ok_or_else(|| ConfigError::UnknownMolecule(name.to_string()))?;
            let inactive = spec.inactive.count(spec.count);
            if inactive > spec.count {
                return Err(ConfigError::InvalidValue(
                    "insertmolecules",
                    format!("molecule '{}': inactive > N", name),
                ));
            }
            directives.push((molid, spec.count, inactive));
        }
        let mut space = Space::from_topology(topology, cell, &directives)?;
        // scatter the initially active matter
        for index in 0..space.groups.len() {
            let group = space.groups[index].clone();
            if !group.is_active() {
                continue;
            }
            if group.atomic {
                for absolute in group.range() {
                    space.particles[absolute].pos = space.cell.random_position(rng);
                }
            } else {
                let target = space.cell.random_position(rng);
                let rotation = crate::moves::random_unit_quaternion(rng);
                space.position_group(index, target, Some(rotation));
            }
        }
        Ok(space)
    }

    pub fn build_hamiltonian(&self, topology: &Topology) -> Result<Hamiltonian, ConfigError> {
        let mut hamiltonian = Hamiltonian::default();
        for term in &self.energy {
            match term {
                EnergySpec::Nonbonded {
                    pairpotential,
                    cutoff,
                } => self.push_nonbonded(&mut hamiltonian, topology, pairpotential, *cutoff)?,
                EnergySpec::Bonded => hamiltonian.push(Bonded),
                EnergySpec::Confine {
                    molecules,
                    k,
                    radius,
                    origin,
                } => {
                    let molids = molecules
                        .iter()
                        .map(|name| {
                            topology
                                .molecule_id(name)
                                .ok_or_else(|| ConfigError::UnknownMolecule(name.clone()))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    hamiltonian.push(Confine {
                        molids,
                        k: *k,
                        radius: *radius,
                        origin: Vector3::new(origin[0], origin[1], origin[2]),
                    });
                }
            }
        }
        Ok(hamiltonian)
    }

    fn push_nonbonded(
        &self,
        hamiltonian: &mut Hamiltonian,
        topology: &Topology,
        spec: &PairPotentialSpec,
        cutoff: f64,
    ) -> Result<(), ConfigError> {
        let coulomb = |epsr: &Option<f64>, bjerrum: &Option<f64>| -> Result<Coulomb, ConfigError> {
            match (bjerrum, epsr) {
                (Some(lambda), _) => Ok(Coulomb::new(*lambda)),
                (None, Some(epsr)) => Ok(Coulomb::new(bjerrum_length(self.temperature, *epsr))),
                (None, None) => Err(ConfigError::InvalidValue(
                    "energy.nonbonded",
                    "coulomb needs either 'epsr' or 'bjerrum'".to_string(),
                )),
            }
        };
        match spec {
            PairPotentialSpec::Ideal => hamiltonian.push(Nonbonded::new(Ideal, cutoff)),
            PairPotentialSpec::LennardJones => {
                hamiltonian.push(Nonbonded::new(LennardJones::new(topology), cutoff))
            }
            PairPotentialSpec::HardSphere => {
                hamiltonian.push(Nonbonded::new(HardSphere::new(topology), cutoff))
            }
            PairPotentialSpec::Coulomb { epsr, bjerrum } => {
                hamiltonian.push(Nonbonded::new(coulomb(epsr, bjerrum)?, cutoff))
            }
            PairPotentialSpec::LjCoulomb { epsr, bjerrum } => hamiltonian.push(Nonbonded::new(
                Sum(LennardJones::new(topology), coulomb(epsr, bjerrum)?),
                cutoff,
            )),
            PairPotentialSpec::Primitive { epsr, bjerrum } => hamiltonian.push(Nonbonded::new(
                Sum(HardSphere::new(topology), coulomb(epsr, bjerrum)?),
                cutoff,
            )),
        }
        Ok(())
    }

    pub fn build_propagator(&self, topology: &Topology) -> Result<Propagator, ConfigError> {
        let molecule_id = |name: &String| {
            topology
                .molecule_id(name)
                .ok_or_else(|| ConfigError::UnknownMolecule(name.clone()))
        };
        let vector = |d: &[f64; 3]| Vector3::new(d[0], d[1], d[2]);
        let mut propagator = Propagator::default();
        for spec in &self.moves {
            match spec {
                MoveSpec::MolTransRot {
                    molecule,
                    dp,
                    dprot,
                    dir,
                    repeat,
                } => propagator.push(
                    MolecularTranslateRotate::new(
                        format!("moltransrot/{}", molecule),
                        molecule_id(molecule)?,
                        *dp,
                        *dprot,
                        vector(dir),
                    ),
                    *repeat as f64,
                ),
                MoveSpec::TransRot {
                    molecule,
                    dp,
                    dprot,
                    dir,
                    repeat,
                } => propagator.push(
                    AtomicTranslateRotate::new(
                        format!("transrot/{}", molecule),
                        molecule_id(molecule)?,
                        *dp,
                        *dprot,
                        vector(dir),
                    ),
                    *repeat as f64,
                ),
                MoveSpec::Volume { dv, method, repeat } => {
                    let pressure =
                        self.pressure.unwrap_or(0.0) * LITER_PER_ANGSTROM3;
                    propagator.push(
                        VolumeMove::new("volume".to_string(), *dv, *method, pressure),
                        *repeat as f64,
                    );
                }
                MoveSpec::ConformationSwap { molecule, repeat } => propagator.push(
                    ConformationSwap::new(
                        format!("conformationswap/{}", molecule),
                        molecule_id(molecule)?,
                        topology,
                    ),
                    *repeat as f64,
                ),
                MoveSpec::Rcmc { repeat } => propagator.push(
                    SpeciationMove::new("rcmc".to_string(), topology.reactions.len()),
                    *repeat as f64,
                ),
                MoveSpec::Charge {
                    molecule,
                    dq,
                    repeat,
                } => propagator.push(
                    ChargeMove::new(format!("charge/{}", molecule), molecule_id(molecule)?, *dq),
                    *repeat as f64,
                ),
                MoveSpec::Cluster {
                    molecules,
                    threshold,
                    dp,
                    dprot,
                    dir,
                    repeat,
                } => {
                    let molids = molecules
                        .iter()
                        .map(molecule_id)
                        .collect::<Result<Vec<_>, _>>()?;
                    propagator.push(
                        ClusterMove::new(
                            "cluster".to_string(),
                            molids,
                            *threshold,
                            *dp,
                            *dprot,
                            vector(dir),
                        ),
                        *repeat as f64,
                    );
                }
                MoveSpec::Pivot {
                    molecule,
                    dprot,
                    repeat,
                } => propagator.push(
                    Pivot::new(format!("pivot/{}", molecule), molecule_id(molecule)?, *dprot),
                    *repeat as f64,
                ),
                MoveSpec::Crankshaft {
                    molecule,
                    dprot,
                    repeat,
                } => propagator.push(
                    Crankshaft::new(
                        format!("crankshaft/{}", molecule),
                        molecule_id(molecule)?,
                        *dprot,
                    ),
                    *repeat as f64,
                ),
            }
        }
        Ok(propagator)
    }

    pub fn build_analyses(&self, topology: &Topology) -> Result<AnalysisCollection, ConfigError> {
        let molecule_id = |name: &String| {
            topology
                .molecule_id(name)
                .ok_or_else(|| ConfigError::UnknownMolecule(name.clone()))
        };
        let mut collection = AnalysisCollection::default();
        for spec in &self.analysis {
            match spec {
                AnalysisSpec::Sanity { nstep } => {
                    collection.push(Box::new(SystemSanity::new(*nstep)))
                }
                AnalysisSpec::Widom {
                    molecule,
                    ninsert,
                    nstep,
                } => collection.push(Box::new(WidomInsertion::new(
                    *nstep,
                    molecule_id(molecule)?,
                    *ninsert,
                ))),
                AnalysisSpec::VirtualVolume { dv, nstep } => {
                    collection.push(Box::new(VirtualVolume::new(*nstep, *dv)))
                }
                AnalysisSpec::Density { nstep } => collection.push(Box::new(Density::new(
                    *nstep,
                    topology.molecules.len(),
                ))),
                AnalysisSpec::Conformation { molecule, nstep } => collection.push(Box::new(
                    ConformationProbe::new(*nstep, molecule_id(molecule)?),
                )),
                AnalysisSpec::CompactTraj { file, nstep } => {
                    collection.push(Box::new(CompactTrajectory::create(file, *nstep)?))
                }
                AnalysisSpec::Snapshot { file, nstep } => {
                    collection.push(Box::new(SnapshotWriter::new(file.clone(), *nstep)))
                }
                AnalysisSpec::ChargeRadius { file, nstep } => {
                    collection.push(Box::new(ChargeRadiusTrajectory::create(file, *nstep)?))
                }
            }
        }
        Ok(collection)
    }

    /// Sanity check on molecules referenced by moves before the run starts
    pub fn validate(&self, topology: &Topology) -> Result<(), ConfigError> {
        for group in topology.molecules.iter() {
            if !group.atomic && group.atoms.len() > 1 && group.conformations.is_empty() {
                return Err(ConfigError::InvalidMolecule(
                    group.name.clone(),
                    "polyatomic molecules need at least one conformation".to_string(),
                ));
            }
        }
        Ok(())
    }
}
