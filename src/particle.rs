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
//! Particle data: atom type id, position, charge, and an optional shape
//! payload for anisotropic models (point dipoles, quadrupoles, sphero-
//! cylinders). Rotation is defined per member: unit quaternions rotate the
//! vector members, rotation matrices the tensor members.
//!

use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

///
/// Orientational degrees of freedom beyond the point charge.
///
/// Kept as a tagged variant rather than trait objects so that particles
/// stay cheap to copy, serializable, and bit-comparable between the trial
/// and the accepted state.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Isotropic point particle
    Point,
    /// Point dipole with optional induced moment
    Dipole {
        /// dipole direction, unit length
        mu: Vector3<f64>,
        /// dipole moment scalar (eÅ)
        mulen: f64,
        /// polarizability tensor (Å³)
        polarizability: Matrix3<f64>,
        /// induced dipole moment (eÅ)
        induced: Vector3<f64>,
    },
    /// Point quadrupole
    Quadrupole {
        /// quadrupole tensor (eÅ²)
        tensor: Matrix3<f64>,
    },
    /// Sphero-cylinder
    Cigar {
        /// long axis, unit length
        axis: Vector3<f64>,
        /// half the cylinder length (Å)
        half_length: f64,
    },
}

impl Shape {
    ///
    /// Rotate the shape in place. Vector members use the quaternion;
    /// tensor members the equivalent rotation matrix.
    ///
    pub fn rotate(&mut self, quaternion: &UnitQuaternion<f64>, matrix: &Matrix3<f64>) {
        match self {
            Shape::Point => {}
            Shape::Dipole {
                mu,
                polarizability,
                induced,
                ..
            } => {
                *mu = quaternion * *mu;
                *induced = quaternion * *induced;
                *polarizability = matrix * *polarizability * matrix.transpose();
            }
            Shape::Quadrupole { tensor } => {
                *tensor = matrix * *tensor * matrix.transpose();
            }
            Shape::Cigar { axis, .. } => {
                *axis = quaternion * *axis;
            }
        }
    }

    pub fn is_anisotropic(&self) -> bool {
        !matches!(self, Shape::Point)
    }
}

///
/// A single particle slot in the flat particle vector. Slots are allocated
/// once at topology load and never freed; inactive reservoir slots keep
/// their last content so that activation is cheap and rejection restores
/// in O(change).
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// atom type id; index into the atom table
    pub id: usize,
    /// position (Å)
    pub pos: Vector3<f64>,
    /// charge (e)
    pub charge: f64,
    pub shape: Shape,
}

impl Particle {
    pub fn new(id: usize, pos: Vector3<f64>, charge: f64) -> Self {
        Particle {
            id,
            pos,
            charge,
            shape: Shape::Point,
        }
    }

    ///
    /// Rotate internal degrees of freedom. The position is *not* touched;
    /// moves rotate positions about their own pivot and then call this for
    /// the orientational members.
    ///
    pub fn rotate(&mut self, quaternion: &UnitQuaternion<f64>) {
        if self.shape.is_anisotropic() {
            let matrix = quaternion.to_rotation_matrix().into_inner();
            self.shape.rotate(quaternion, &matrix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_dipole_rotation() {
        let mut particle = Particle::new(0, Vector3::zeros(), 0.0);
        particle.shape = Shape::Dipole {
            mu: Vector3::x(),
            mulen: 1.8,
            polarizability: Matrix3::identity(),
            induced: Vector3::zeros(),
        };
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        particle.rotate(&q);
        if let Shape::Dipole { mu, mulen, .. } = particle.shape {
            assert_relative_eq!(mu.x, 0.0, epsilon = 1e-12);
            assert_relative_eq!(mu.y, 1.0, epsilon = 1e-12);
            assert_relative_eq!(mulen, 1.8);
        } else {
            panic!("shape changed variant");
        }
    }

    #[test]
    fn test_quadrupole_rotation_preserves_trace() {
        let mut tensor = Matrix3::zeros();
        tensor[(0, 0)] = 1.0;
        tensor[(1, 1)] = -0.5;
        tensor[(2, 2)] = -0.5;
        let mut particle = Particle::new(0, Vector3::zeros(), 0.0);
        particle.shape = Shape::Quadrupole { tensor };
        let q = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.7);
        particle.rotate(&q);
        if let Shape::Quadrupole { tensor } = particle.shape {
            assert_relative_eq!(tensor.trace(), 0.0, epsilon = 1e-12);
        } else {
            panic!("shape changed variant");
        }
    }

    #[test]
    fn test_point_rotation_is_noop() {
        let mut particle = Particle::new(3, Vector3::new(1.0, 2.0, 3.0), -1.0);
        let before = particle.clone();
        let q = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 1.0);
        particle.rotate(&q);
        assert_eq!(particle, before);
    }
}
