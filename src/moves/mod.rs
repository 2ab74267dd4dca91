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
//! Trial moves. Each move mutates the trial space, records its footprint
//! in a change descriptor, and may return a non-Hamiltonian bias. Energy
//! evaluation and state synchronization are strictly the driver's job; an
//! infeasible proposal leaves the change empty, which counts as a
//! rejection without touching any state.
//!

pub mod chain;
pub mod charge;
pub mod cluster;
pub mod conformation;
pub mod speciation;
pub mod transrot;
pub mod volume;

pub use chain::{Crankshaft, Pivot};
pub use charge::ChargeMove;
pub use cluster::ClusterMove;
pub use conformation::ConformationSwap;
pub use speciation::SpeciationMove;
pub use transrot::{AtomicTranslateRotate, MolecularTranslateRotate};
pub use volume::VolumeMove;

use crate::change::Change;
use crate::energy::Hamiltonian;
use crate::space::Space;
use crate::ConsistencyError;
use nalgebra::{UnitQuaternion, Unit, Vector3};
use rand::Rng;
use rand_pcg::Pcg64;
use std::f64::consts::PI;

///
/// Interface for Monte Carlo move algorithms that all
/// move schemes implement.
///
pub trait MoveAlgorithm {
    fn name(&self) -> &str;

    ///
    /// Propose a trial: pick a random sub-action, mutate the trial space,
    /// and fill the change descriptor. Must not evaluate the Hamiltonian;
    /// the reference is passed solely for group self-energies needed by
    /// matter-transfer bookkeeping. `peer` is the accepted state and is
    /// only touched for index-swap mirroring during reservoir deletions.
    ///
    fn propose(
        &mut self,
        trial: &mut Space,
        peer: &mut Space,
        hamiltonian: &Hamiltonian,
        change: &mut Change,
        rng: &mut Pcg64,
    ) -> Result<(), ConsistencyError>;

    /// Extra ΔU not captured by the Hamiltonian (kT)
    fn bias(
        &mut self,
        _trial: &Space,
        _accepted: &Space,
        _change: &Change,
        _u_old: f64,
        _u_new: f64,
    ) -> f64 {
        0.0
    }

    /// Statistics bookkeeping only; state sync is the driver's job
    fn accept(&mut self, _change: &Change) {}

    /// Statistics bookkeeping only; state sync is the driver's job
    fn reject(&mut self, _change: &Change) {}

    /// Log end-of-run statistics beyond the acceptance ratio
    fn report(&self) {}
}

/// Uniform random point on the unit sphere
pub fn random_unit_vector(rng: &mut impl Rng) -> Vector3<f64> {
    let phi = f64::acos(2.0 * rng.gen::<f64>() - 1.0);
    let theta = 2.0 * PI * rng.gen::<f64>();
    Vector3::new(
        phi.sin() * theta.cos(),
        phi.sin() * theta.sin(),
        phi.cos(),
    )
}

/// Uniform random rotation (Shoemake's subgroup algorithm)
pub fn random_unit_quaternion(rng: &mut impl Rng) -> UnitQuaternion<f64> {
    let (u1, u2, u3) = (rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
    let quaternion = nalgebra::Quaternion::new(
        (u1).sqrt() * (2.0 * PI * u3).cos(),
        (1.0 - u1).sqrt() * (2.0 * PI * u2).sin(),
        (1.0 - u1).sqrt() * (2.0 * PI * u2).cos(),
        (u1).sqrt() * (2.0 * PI * u3).sin(),
    );
    UnitQuaternion::from_quaternion(quaternion)
}

/// Rotation about a random axis with angle uniform in ±`half_angle`
pub fn random_small_rotation(half_angle: f64, rng: &mut impl Rng) -> UnitQuaternion<f64> {
    let axis = Unit::new_normalize(random_unit_vector(rng));
    let angle = half_angle * (2.0 * rng.gen::<f64>() - 1.0);
    UnitQuaternion::from_axis_angle(&axis, angle)
}

/// Displacement inside a cube of side `dp`, masked by a direction vector
pub fn random_displacement(
    dp: f64,
    directions: &Vector3<f64>,
    rng: &mut impl Rng,
) -> Vector3<f64> {
    Vector3::new(
        dp * (rng.gen::<f64>() - 0.5) * directions.x,
        dp * (rng.gen::<f64>() - 0.5) * directions.y,
        dp * (rng.gen::<f64>() - 0.5) * directions.z,
    )
}
