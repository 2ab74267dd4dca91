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
//! Atom, molecule, and reaction tables. Loaded once from the configuration,
//! validated, then shared immutably (`Arc`) by both simulation states and
//! all moves for the lifetime of the process.
//!

use crate::particle::{Particle, Shape};
use crate::ConfigError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

///
/// Static per-atom-type properties, looked up by id (= index in the atom
/// table).
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtomKind {
    pub name: String,
    /// Lennard-Jones diameter (Å)
    #[serde(default)]
    pub sigma: f64,
    /// Lennard-Jones well depth (kT)
    #[serde(default)]
    pub eps: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// charge template (e), assigned on creation and on identity swaps
    #[serde(default)]
    pub charge: f64,
    /// implicit species take part in reactions only through their activity
    #[serde(default)]
    pub implicit: bool,
    /// activity (mol/l) of an implicit species; folded into reaction lnK
    #[serde(default)]
    pub activity: Option<f64>,
    /// dipole moment scalar (eÅ); makes particles of this kind dipolar
    #[serde(default)]
    pub dipole: Option<f64>,
    /// sphero-cylinder half length (Å)
    #[serde(default)]
    pub cigar: Option<f64>,
}

fn default_mass() -> f64 {
    1.0
}

impl AtomKind {
    /// Fresh particle of this kind at the given position
    pub fn to_particle(&self, id: usize, pos: Vector3<f64>) -> Particle {
        let shape = if let Some(mulen) = self.dipole {
            Shape::Dipole {
                mu: Vector3::z(),
                mulen,
                polarizability: Matrix3::zeros(),
                induced: Vector3::zeros(),
            }
        } else if let Some(half_length) = self.cigar {
            Shape::Cigar {
                axis: Vector3::z(),
                half_length,
            }
        } else {
            Shape::Point
        };
        Particle {
            id,
            pos,
            charge: self.charge,
            shape,
        }
    }
}

/// Bonded interaction between two atoms of one molecule, by relative index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bond {
    Harmonic {
        index: (usize, usize),
        /// force constant (kT/Å²)
        k: f64,
        /// equilibrium distance (Å)
        req: f64,
    },
}

impl Bond {
    pub fn index(&self) -> (usize, usize) {
        match self {
            Bond::Harmonic { index, .. } => *index,
        }
    }

    /// Bond energy (kT) at separation `r` (Å)
    pub fn energy(&self, r: f64) -> f64 {
        match self {
            Bond::Harmonic { k, req, .. } => 0.5 * k * (r - req) * (r - req),
        }
    }
}

/// Placement rules when a molecule is inserted or activated
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsertionPolicy {
    /// offset added to the sampled mass-center position (Å)
    #[serde(default = "zero_offset")]
    pub offset: Vector3<f64>,
    /// random rigid-body rotation on insertion
    #[serde(default = "default_true")]
    pub rotate: bool,
}

fn zero_offset() -> Vector3<f64> {
    Vector3::zeros()
}

fn default_true() -> bool {
    true
}

impl Default for InsertionPolicy {
    fn default() -> Self {
        InsertionPolicy {
            offset: Vector3::zeros(),
            rotate: true,
        }
    }
}

///
/// Static per-molecule-type properties. A molecular kind has fixed
/// constituents and optional rigid conformations; an atomic kind models a
/// variable-size reservoir of free atoms.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MoleculeKind {
    pub name: String,
    #[serde(default)]
    pub atomic: bool,
    /// constituent atom ids (one per particle slot for molecular kinds)
    pub atoms: Vec<usize>,
    #[serde(default)]
    pub bonds: Vec<Bond>,
    /// rigid conformation library; positions per constituent atom
    #[serde(default)]
    pub conformations: Vec<Vec<Vector3<f64>>>,
    /// statistical weight per conformation; empty means uniform
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub insertion: InsertionPolicy,
}

impl MoleculeKind {
    /// Number of particle slots per group of this kind
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::InvalidMolecule(
                self.name.clone(),
                reason.to_string(),
            ))
        };
        if self.atoms.is_empty() {
            return invalid("no constituent atoms");
        }
        if self.atomic {
            if !self.bonds.is_empty() {
                return invalid("atomic molecules cannot have bonds");
            }
            if !self.conformations.is_empty() {
                return invalid("atomic molecules cannot have conformations");
            }
            return Ok(());
        }
        for conformation in &self.conformations {
            if conformation.len() != self.atoms.len() {
                return invalid("conformation size differs from atom count");
            }
        }
        if !self.weights.is_empty() && self.weights.len() != self.conformations.len() {
            return invalid("number of weights differs from number of conformations");
        }
        if self.weights.iter().any(|w| *w < 0.0) {
            return invalid("negative conformation weight");
        }
        for bond in &self.bonds {
            let (i, j) = bond.index();
            if i == j || i >= self.atoms.len() || j >= self.atoms.len() {
                return invalid("bond index out of range");
            }
        }
        Ok(())
    }
}

/// A reaction participant: a free atom kind (identity swaps) or a whole
/// molecule kind (insertion and deletion of groups or reservoir atoms)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    Atom(usize),
    Molecule(usize),
}

///
/// One reversible reaction `aA + bB = cC + dD` over explicit species,
/// with implicit participants already folded into the equilibrium
/// constant.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReactionData {
    /// the equation as given in the input; used for reporting
    pub name: String,
    /// explicit left-hand species with multiplicities
    pub reactants: Vec<(Species, usize)>,
    /// explicit right-hand species with multiplicities
    pub products: Vec<(Species, usize)>,
    /// effective ln K for the forward direction, implicit activities folded in
    pub lnk: f64,
    /// bounded-matter reservoir semantics
    pub canonic: bool,
    /// initial reservoir content when canonic
    pub reservoir: usize,
    /// in-place identity change of a single atom
    pub swap: bool,
}

impl ReactionData {
    /// The single (outgoing, incoming) atom-id pair of a swap reaction
    pub fn swap_pair(&self) -> Option<(usize, usize)> {
        if !self.swap {
            return None;
        }
        match (self.reactants.as_slice(), self.products.as_slice()) {
            ([(Species::Atom(out), 1)], [(Species::Atom(inc), 1)]) => Some((*out, *inc)),
            _ => None,
        }
    }
}

///
/// The process-wide topology: write-once after load, read-many afterwards.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Topology {
    pub atoms: Vec<AtomKind>,
    pub molecules: Vec<MoleculeKind>,
    pub reactions: Vec<ReactionData>,
}

impl Topology {
    pub fn atom_id(&self, name: &str) -> Option<usize> {
        self.atoms.iter().position(|kind| kind.name == name)
    }

    pub fn molecule_id(&self, name: &str) -> Option<usize> {
        self.molecules.iter().position(|kind| kind.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for molecule in &self.molecules {
            molecule.validate()?;
            if let Some(id) = molecule.atoms.iter().find(|id| **id >= self.atoms.len()) {
                return Err(ConfigError::InvalidMolecule(
                    molecule.name.clone(),
                    format!("atom id {} out of range", id),
                ));
            }
        }
        for reaction in &self.reactions {
            if reaction.swap && reaction.swap_pair().is_none() {
                return Err(ConfigError::InvalidSwapReaction(reaction.name.clone()));
            }
            if !reaction.swap
                && reaction
                    .reactants
                    .iter()
                    .chain(&reaction.products)
                    .any(|(species, _)| matches!(species, Species::Atom(_)))
            {
                return Err(ConfigError::MalformedReaction(
                    reaction.name.clone(),
                    "free atom species are only allowed in swap reactions".to_string(),
                ));
            }
        }
        Ok(())
    }

    ///
    /// Parse a reaction equation such as `"NaCl = Na + Cl"` or
    /// `"= Na + Cl"` (insertion from an implicit bath). Multiplicities are
    /// written either as repeated names or as `"2 Cl"`. Names resolve to
    /// molecule kinds first, then to atom kinds; implicit atom kinds are
    /// folded into the equilibrium constant through their activity and do
    /// not appear in the explicit multisets.
    ///
    pub fn parse_reaction(
        &self,
        equation: &str,
        lnk: f64,
        canonic: bool,
        reservoir: usize,
        swap: bool,
    ) -> Result<ReactionData, ConfigError> {
        let mut sides = equation.split('=');
        let (lhs, rhs) = match (sides.next(), sides.next(), sides.next()) {
            (Some(lhs), Some(rhs), None) => (lhs, rhs),
            _ => {
                return Err(ConfigError::MalformedReaction(
                    equation.to_string(),
                    "expected exactly one '='".to_string(),
                ))
            }
        };
        let mut lnk_effective = lnk;
        let mut parse_side = |side: &str, sign: f64| -> Result<Vec<(Species, usize)>, ConfigError> {
            let mut multiset: Vec<(Species, usize)> = Vec::new();
            for token in side.split('+').map(str::trim).filter(|t| !t.is_empty()) {
                let (count, name) = match token.split_once(char::is_whitespace) {
                    Some((count, name)) => (
                        count.trim().parse::<usize>().map_err(|_| {
                            ConfigError::MalformedReaction(
                                equation.to_string(),
                                format!("bad multiplicity in '{}'", token),
                            )
                        })?,
                        name.trim(),
                    ),
                    None => (1, token),
                };
                if count == 0 {
                    return Err(ConfigError::MalformedReaction(
                        equation.to_string(),
                        format!("zero multiplicity in '{}'", token),
                    ));
                }
                // swap reactions name atom kinds, others molecule kinds;
                // resolve in that order so shared names go to the right table
                let molecule = self.molecule_id(name).map(Species::Molecule);
                let atom = self.atom_id(name).map(Species::Atom);
                let resolved = if swap {
                    atom.or(molecule)
                } else {
                    molecule.or(atom)
                };
                let species = match resolved {
                    Some(Species::Atom(id)) if self.atoms[id].implicit => {
                        let activity = self.atoms[id].activity.unwrap_or(1.0);
                        if activity <= 0.0 {
                            return Err(ConfigError::MalformedReaction(
                                equation.to_string(),
                                format!("non-positive activity for implicit '{}'", name),
                            ));
                        }
                        lnk_effective += sign * count as f64 * activity.ln();
                        continue;
                    }
                    Some(species) => species,
                    None => {
                        return Err(ConfigError::UnknownReactionSpecies(
                            name.to_string(),
                            equation.to_string(),
                        ));
                    }
                };
                match multiset.iter_mut().find(|(s, _)| *s == species) {
                    Some((_, n)) => *n += count,
                    None => multiset.push((species, count)),
                }
            }
            Ok(multiset)
        };
        // K = Π a(products) / Π a(reactants): an implicit product lowers the
        // effective constant, an implicit reactant raises it
        let reactants = parse_side(lhs, 1.0)?;
        let products = parse_side(rhs, -1.0)?;
        let reaction = ReactionData {
            name: equation.trim().to_string(),
            reactants,
            products,
            lnk: lnk_effective,
            canonic,
            reservoir,
            swap,
        };
        if reaction.swap && reaction.swap_pair().is_none() {
            return Err(ConfigError::InvalidSwapReaction(reaction.name));
        }
        Ok(reaction)
    }
}
