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
//! Energy terms and their ordered sum, the Hamiltonian. Every term consumes
//! a change descriptor and returns energy in units of kT; a term untouched
//! by the change returns zero, and +∞ from any term short-circuits the sum
//! (hard-core overlap, always rejected).
//!

pub mod bonded;
pub mod external;
pub mod nonbonded;

pub use bonded::Bonded;
pub use external::Confine;
pub use nonbonded::{Coulomb, HardSphere, Ideal, LennardJones, Nonbonded, PairPotential, Sum};

use crate::change::Change;
use crate::group::Group;
use crate::space::Space;

///
/// Interface for terms in the Hamiltonian (nonbonded, bonded, external).
///
pub trait EnergyTerm {
    fn name(&self) -> &'static str;

    /// Energy associated with the change, in kT. For `change.everything`
    /// or a volume change the term re-evaluates globally.
    fn energy(&self, space: &Space, change: &Change) -> f64;

    /// Self-energy of one group; used by grand-canonical and speciation
    /// corrections for matter that appears or disappears.
    fn internal(&self, _space: &Space, _group: &Group) -> f64 {
        0.0
    }

    /// Refresh internal caches after a decision (no-op for stateless terms)
    fn update_state(&mut self, _space: &Space, _change: &Change) {}
}

///
/// Ordered sum of energy terms. One Hamiltonian instance is owned by each
/// of the accepted and the trial state so that term caches can follow
/// their state independently.
///
#[derive(Default)]
pub struct Hamiltonian {
    terms: Vec<Box<dyn EnergyTerm>>,
}

impl Hamiltonian {
    pub fn push<T: 'static + EnergyTerm>(&mut self, term: T) {
        self.terms.push(Box::new(term));
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.terms.iter().map(|t| t.name()).collect()
    }
}

impl EnergyTerm for Hamiltonian {
    fn name(&self) -> &'static str {
        "hamiltonian"
    }

    fn energy(&self, space: &Space, change: &Change) -> f64 {
        let mut sum = 0.0;
        for term in &self.terms {
            let energy = term.energy(space, change);
            if energy.is_infinite() && energy > 0.0 {
                return f64::INFINITY;
            }
            sum += energy;
        }
        sum
    }

    fn internal(&self, space: &Space, group: &Group) -> f64 {
        self.terms.iter().map(|t| t.internal(space, group)).sum()
    }

    fn update_state(&mut self, space: &Space, change: &Change) {
        for term in &mut self.terms {
            term.update_state(space, change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f64);

    impl EnergyTerm for Constant {
        fn name(&self) -> &'static str {
            "constant"
        }
        fn energy(&self, _space: &Space, _change: &Change) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_sum_and_infinity_propagation() {
        let topology = std::sync::Arc::new(crate::topology::Topology::default());
        let space = Space {
            cell: crate::geometry::Cell::cube(10.0).unwrap(),
            particles: vec![],
            groups: vec![],
            topology,
            reservoirs: vec![],
        };
        let mut hamiltonian = Hamiltonian::default();
        hamiltonian.push(Constant(1.5));
        hamiltonian.push(Constant(-0.5));
        assert_eq!(hamiltonian.energy(&space, &Change::all()), 1.0);
        hamiltonian.push(Constant(f64::INFINITY));
        assert!(hamiltonian.energy(&space, &Change::all()).is_infinite());
    }
}
