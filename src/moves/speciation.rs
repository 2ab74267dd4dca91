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
//! Reactive speciation: a reversible Monte Carlo move that transfers
//! matter between reservoirs according to configured reactions. One
//! attempt samples a reaction and a direction, deletes the species on one
//! side and inserts the species on the other, or swaps a single atom
//! identity in place.
//!
//! Reservoir deletions swap the victim to the end of the active region in
//! *both* states so that a later `sync` copies the correct slot; this
//! mirrored permutation is what keeps rejection O(change) for
//! multi-particle rearrangements.
//!

use crate::change::Change;
use crate::energy::{EnergyTerm, Hamiltonian};
use crate::group::Selection;
use crate::moves::{random_unit_quaternion, MoveAlgorithm};
use crate::space::Space;
use crate::topology::Species;
use crate::ConsistencyError;
use log::info;
use rand::prelude::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Default)]
struct ReactionStatistics {
    accepted: usize,
    rejected: usize,
}

struct Pending {
    reaction: usize,
    direction: Direction,
    bond_energy: f64,
}

pub struct SpeciationMove {
    label: String,
    statistics: Vec<ReactionStatistics>,
    pending: Option<Pending>,
}

impl SpeciationMove {
    pub fn new(label: String, reaction_count: usize) -> Self {
        SpeciationMove {
            label,
            statistics: vec![ReactionStatistics::default(); reaction_count],
            pending: None,
        }
    }

    /// The single group backing an atomic species; anything else is a
    /// configuration bug
    fn reservoir_group(
        space: &Space,
        molid: usize,
        reaction: &str,
    ) -> Result<usize, ConsistencyError> {
        let mut groups = space.find_molecules(molid, Selection::All);
        match (groups.next(), groups.next()) {
            (Some(index), None) => Ok(index),
            _ => Err(ConsistencyError::MisconfiguredReaction {
                reaction: reaction.to_string(),
                reason: format!(
                    "atomic species '{}' must occupy exactly one group",
                    space.topology.molecules[molid].name
                ),
            }),
        }
    }

    ///
    /// Verify there is enough matter to remove and enough headroom to
    /// insert. Insufficient matter is not an error; the move simply
    /// proposes nothing.
    ///
    fn feasible(
        trial: &Space,
        remove_set: &[(Species, usize)],
        add_set: &[(Species, usize)],
        reaction: &str,
    ) -> Result<bool, ConsistencyError> {
        for &(species, count) in remove_set {
            let Species::Molecule(molid) = species else {
                return Err(ConsistencyError::MisconfiguredReaction {
                    reaction: reaction.to_string(),
                    reason: "free atom species outside a swap reaction".to_string(),
                });
            };
            if trial.topology.molecules[molid].atomic {
                let group = Self::reservoir_group(trial, molid, reaction)?;
                if trial.groups[group].size < count {
                    return Ok(false);
                }
            } else if trial.find_molecules(molid, Selection::Active).count() < count {
                return Ok(false);
            }
        }
        for &(species, count) in add_set {
            let Species::Molecule(molid) = species else {
                return Err(ConsistencyError::MisconfiguredReaction {
                    reaction: reaction.to_string(),
                    reason: "free atom species outside a swap reaction".to_string(),
                });
            };
            if trial.topology.molecules[molid].atomic {
                let group = Self::reservoir_group(trial, molid, reaction)?;
                if trial.groups[group].size + count > trial.groups[group].capacity {
                    return Ok(false);
                }
            } else if trial.find_molecules(molid, Selection::Inactive).count() < count {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// In-place identity change of one random atom of the outgoing kind
    fn propose_swap(
        trial: &mut Space,
        outgoing: usize,
        incoming: usize,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<bool, ConsistencyError> {
        let candidates: Vec<usize> = trial.find_atoms(outgoing).collect();
        let Some(&absolute) = candidates.choose(rng) else {
            return Ok(false);
        };
        let group_index = trial.group_containing(absolute)?;
        let kind = &trial.topology.atoms[incoming].clone();
        let particle = &mut trial.particles[absolute];
        particle.id = incoming;
        particle.charge = kind.charge;
        let relative = trial.groups[group_index].relative(absolute);
        let entry = change.entry(group_index);
        entry.internal = true;
        entry.swapped = true;
        entry.atom_indices.push(relative);
        Ok(true)
    }

    ///
    /// Delete one active reservoir atom: swap the victim into the last
    /// active slot in *both* states, then shrink the active region. The
    /// recorded index is the end slot, which afterwards differs between
    /// the two states while the victim's old slot is identical in both.
    ///
    fn delete_reservoir_atom(
        trial: &mut Space,
        peer: &mut Space,
        group_index: usize,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<(), ConsistencyError> {
        let group = &trial.groups[group_index];
        let last = group.size - 1;
        let victim = rng.gen_range(0..group.size);
        let a = group.absolute(victim);
        let b = group.absolute(last);
        trial.particles.swap(a, b);
        peer.particles.swap(a, b);
        trial.groups[group_index].deactivate(1, group_index)?;
        let entry = change.entry(group_index);
        entry.size_changed = true;
        entry.internal = true;
        entry.atom_indices.push(last);
        Ok(())
    }

    /// Activate one reservoir slot with a fresh particle at a random
    /// position
    fn insert_reservoir_atom(
        trial: &mut Space,
        group_index: usize,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<(), ConsistencyError> {
        let relative = trial.groups[group_index].size;
        trial.groups[group_index].activate(1, group_index)?;
        let absolute = trial.groups[group_index].absolute(relative);
        let molid = trial.groups[group_index].molid;
        let atomid = trial.topology.molecules[molid].atoms[0];
        let position = trial.cell.random_position(rng);
        trial.particles[absolute] = trial.topology.atoms[atomid].to_particle(atomid, position);
        let entry = change.entry(group_index);
        entry.size_changed = true;
        entry.internal = true;
        entry.atom_indices.push(relative);
        Ok(())
    }
}

impl MoveAlgorithm for SpeciationMove {
    fn name(&self) -> &str {
        &self.label
    }

    fn propose(
        &mut self,
        trial: &mut Space,
        peer: &mut Space,
        hamiltonian: &Hamiltonian,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<(), ConsistencyError> {
        self.pending = None;
        let topology = trial.topology.clone();
        if topology.reactions.is_empty() {
            return Ok(());
        }
        let reaction_index = rng.gen_range(0..topology.reactions.len());
        let reaction = &topology.reactions[reaction_index];
        let direction = if rng.gen::<bool>() {
            Direction::Forward
        } else {
            Direction::Backward
        };

        // a drained canonic reservoir blocks the consuming direction
        if reaction.canonic
            && direction == Direction::Forward
            && trial.reservoirs[reaction_index] == Some(0)
        {
            return Ok(());
        }

        let mut bond_energy = 0.0;
        if reaction.swap {
            let Some((out_forward, in_forward)) = reaction.swap_pair() else {
                return Err(ConsistencyError::MisconfiguredReaction {
                    reaction: reaction.name.clone(),
                    reason: "swap reaction without a unique atom pair".to_string(),
                });
            };
            let (outgoing, incoming) = match direction {
                Direction::Forward => (out_forward, in_forward),
                Direction::Backward => (in_forward, out_forward),
            };
            if !Self::propose_swap(trial, outgoing, incoming, change, rng)? {
                return Ok(());
            }
        } else {
            let (remove_set, add_set) = match direction {
                Direction::Forward => (&reaction.reactants, &reaction.products),
                Direction::Backward => (&reaction.products, &reaction.reactants),
            };
            if !Self::feasible(trial, remove_set, add_set, &reaction.name)? {
                return Ok(());
            }
            // deletions, in declared order
            for &(species, count) in remove_set {
                let Species::Molecule(molid) = species else {
                    unreachable!("checked by feasibility");
                };
                if topology.molecules[molid].atomic {
                    let group = Self::reservoir_group(trial, molid, &reaction.name)?;
                    for _ in 0..count {
                        Self::delete_reservoir_atom(trial, peer, group, change, rng)?;
                    }
                } else {
                    for _ in 0..count {
                        let actives: Vec<usize> =
                            trial.find_molecules(molid, Selection::Active).collect();
                        let Some(&group) = actives.choose(rng) else {
                            return Err(ConsistencyError::InvalidGroupOperation {
                                group: 0,
                                reason: "deletion target vanished mid-proposal".to_string(),
                            });
                        };
                        bond_energy += hamiltonian.internal(trial, &trial.groups[group]);
                        let capacity = trial.groups[group].capacity;
                        trial.groups[group].deactivate(capacity, group)?;
                        let entry = change.entry(group);
                        entry.all = true;
                        entry.internal = true;
                        entry.size_changed = true;
                    }
                }
            }
            // insertions, in declared order
            for &(species, count) in add_set {
                let Species::Molecule(molid) = species else {
                    unreachable!("checked by feasibility");
                };
                let kind = &topology.molecules[molid];
                if kind.atomic {
                    let group = Self::reservoir_group(trial, molid, &reaction.name)?;
                    for _ in 0..count {
                        Self::insert_reservoir_atom(trial, group, change, rng)?;
                    }
                } else {
                    for _ in 0..count {
                        let inactives: Vec<usize> =
                            trial.find_molecules(molid, Selection::Inactive).collect();
                        let Some(&group) = inactives.choose(rng) else {
                            return Err(ConsistencyError::InvalidGroupOperation {
                                group: 0,
                                reason: "insertion slot vanished mid-proposal".to_string(),
                            });
                        };
                        let capacity = trial.groups[group].capacity;
                        trial.groups[group].activate(capacity, group)?;
                        let mut target = trial.cell.random_position(rng) + kind.insertion.offset;
                        trial.cell.boundary(&mut target);
                        let rotation = kind
                            .insertion
                            .rotate
                            .then(|| random_unit_quaternion(rng));
                        trial.position_group(group, target, rotation);
                        let entry = change.entry(group);
                        entry.all = true;
                        entry.internal = true;
                        entry.size_changed = true;
                        bond_energy -= hamiltonian.internal(trial, &trial.groups[group]);
                    }
                }
            }
        }
        change.matter_changed = true;
        if reaction.canonic {
            let counter = &mut trial.reservoirs[reaction_index];
            *counter = match (direction, *counter) {
                (Direction::Forward, Some(n)) if n > 0 => Some(n - 1),
                (Direction::Backward, Some(n)) => Some(n + 1),
                _ => {
                    return Err(ConsistencyError::ReservoirUnderflow {
                        reaction: reaction.name.clone(),
                    })
                }
            };
        }
        self.pending = Some(Pending {
            reaction: reaction_index,
            direction,
            bond_energy,
        });
        Ok(())
    }

    ///
    /// `±lnK` plus the internal energy of created and destroyed molecules;
    /// the latter cancels the Hamiltonian delta for matter that appeared
    /// or disappeared, leaving the chemistry to the equilibrium constant.
    ///
    fn bias(
        &mut self,
        _trial: &Space,
        accepted: &Space,
        _change: &Change,
        _u_old: f64,
        _u_new: f64,
    ) -> f64 {
        match &self.pending {
            Some(pending) => {
                let lnk = accepted.topology.reactions[pending.reaction].lnk;
                let sign = match pending.direction {
                    Direction::Forward => -1.0,
                    Direction::Backward => 1.0,
                };
                sign * lnk + pending.bond_energy
            }
            None => 0.0,
        }
    }

    fn accept(&mut self, _change: &Change) {
        if let Some(pending) = self.pending.take() {
            self.statistics[pending.reaction].accepted += 1;
        }
    }

    fn reject(&mut self, _change: &Change) {
        if let Some(pending) = self.pending.take() {
            self.statistics[pending.reaction].rejected += 1;
        }
    }

    fn report(&self) {
        for (index, stats) in self.statistics.iter().enumerate() {
            let total = stats.accepted + stats.rejected;
            if total > 0 {
                info!(
                    "reaction {}: {} attempts, acceptance {:.3}",
                    index,
                    total,
                    stats.accepted as f64 / total as f64
                );
            }
        }
    }
}
