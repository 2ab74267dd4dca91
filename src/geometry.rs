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
//! Simulation cells and periodic boundary arithmetic: minimum image
//! displacements, wrapping, overlap tests, uniform position sampling,
//! and volume scaling for isobaric moves.
//!

use crate::ConfigError;
use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a volume change is mapped onto the cell dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeScalePolicy {
    /// All sides scale by ∛(V'/V)
    Isotropic,
    /// x and y scale by √(V'/V); z is untouched
    #[serde(rename = "xy")]
    IsotropicXY,
    /// Shape change at fixed volume; the argument is the z scale factor
    Isochoric,
}

///
/// Simulation cell. The cuboid is periodic in all directions and centered
/// on the origin so that coordinates live in `[-L/2, L/2)`; the sphere has
/// no periodicity and is used for surface and droplet systems.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    Cuboid { lengths: Vector3<f64> },
    Sphere { radius: f64 },
}

impl Cell {
    /// Periodic cube with equal sides
    pub fn cube(side: f64) -> Result<Self, ConfigError> {
        Self::cuboid(Vector3::new(side, side, side))
    }

    pub fn cuboid(lengths: Vector3<f64>) -> Result<Self, ConfigError> {
        if lengths.iter().any(|l| *l <= 0.0) || !lengths.iter().all(|l| l.is_finite()) {
            return Err(ConfigError::InvalidGeometry(format!(
                "cuboid sides must be positive and finite, got {:?}",
                lengths
            )));
        }
        Ok(Cell::Cuboid { lengths })
    }

    pub fn sphere(radius: f64) -> Result<Self, ConfigError> {
        if radius <= 0.0 || !radius.is_finite() {
            return Err(ConfigError::InvalidGeometry(format!(
                "sphere radius must be positive and finite, got {}",
                radius
            )));
        }
        Ok(Cell::Sphere { radius })
    }

    /// Minimum image displacement vector b → a
    pub fn vdist(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
        let mut d = a - b;
        if let Cell::Cuboid { lengths } = self {
            for k in 0..3 {
                d[k] -= lengths[k] * (d[k] / lengths[k]).round();
            }
        }
        d
    }

    /// Squared minimum image distance; avoids the square root
    pub fn sqdist(&self, a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
        self.vdist(a, b).norm_squared()
    }

    /// Wrap a position back into the cell, in place. No-op for
    /// non-periodic cells.
    pub fn boundary(&self, position: &mut Vector3<f64>) {
        if let Cell::Cuboid { lengths } = self {
            for k in 0..3 {
                position[k] -= lengths[k] * (position[k] / lengths[k]).round();
            }
        }
    }

    /// True if the position lies outside the cell
    pub fn collision(&self, position: &Vector3<f64>) -> bool {
        match self {
            Cell::Cuboid { lengths } => (0..3).any(|k| position[k].abs() > 0.5 * lengths[k] + 1e-9),
            Cell::Sphere { radius } => position.norm_squared() > radius * radius,
        }
    }

    /// Uniform random position inside the cell
    pub fn random_position(&self, rng: &mut impl Rng) -> Vector3<f64> {
        match self {
            Cell::Cuboid { lengths } => Vector3::new(
                lengths.x * (rng.gen::<f64>() - 0.5),
                lengths.y * (rng.gen::<f64>() - 0.5),
                lengths.z * (rng.gen::<f64>() - 0.5),
            ),
            Cell::Sphere { radius } => loop {
                let p = Vector3::new(
                    2.0 * radius * (rng.gen::<f64>() - 0.5),
                    2.0 * radius * (rng.gen::<f64>() - 0.5),
                    2.0 * radius * (rng.gen::<f64>() - 0.5),
                );
                if p.norm_squared() <= radius * radius {
                    break p;
                }
            },
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Cell::Cuboid { lengths } => lengths.x * lengths.y * lengths.z,
            Cell::Sphere { radius } => 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3),
        }
    }

    /// Side lengths; for a sphere the bounding-box diameter on each axis
    pub fn lengths(&self) -> Vector3<f64> {
        match self {
            Cell::Cuboid { lengths } => *lengths,
            Cell::Sphere { radius } => Vector3::from_element(2.0 * radius),
        }
    }

    ///
    /// Rescale the cell to the given volume and return the per-axis scale
    /// factors so that the caller can move particles accordingly. For the
    /// isochoric policy the argument is interpreted as the z scale factor
    /// and the volume stays fixed.
    ///
    /// Particle positions are *not* touched here; [`crate::space::Space`]
    /// applies the returned factors.
    ///
    pub fn scale_volume(
        &mut self,
        new_volume: f64,
        policy: VolumeScalePolicy,
    ) -> Result<Vector3<f64>, ConfigError> {
        if new_volume <= 0.0 || !new_volume.is_finite() {
            return Err(ConfigError::InvalidGeometry(format!(
                "cannot scale to volume {}",
                new_volume
            )));
        }
        let old_volume = self.volume();
        match self {
            Cell::Cuboid { lengths } => {
                let scale = match policy {
                    VolumeScalePolicy::Isotropic => {
                        let s = (new_volume / old_volume).cbrt();
                        Vector3::new(s, s, s)
                    }
                    VolumeScalePolicy::IsotropicXY => {
                        let s = (new_volume / old_volume).sqrt();
                        Vector3::new(s, s, 1.0)
                    }
                    VolumeScalePolicy::Isochoric => {
                        let s = new_volume; // z scale factor, not a volume
                        Vector3::new(1.0 / s.sqrt(), 1.0 / s.sqrt(), s)
                    }
                };
                *lengths = lengths.component_mul(&scale);
                Ok(scale)
            }
            Cell::Sphere { radius } => match policy {
                VolumeScalePolicy::Isotropic => {
                    let s = (new_volume / old_volume).cbrt();
                    *radius *= s;
                    Ok(Vector3::new(s, s, s))
                }
                _ => Err(ConfigError::InvalidGeometry(
                    "spherical cells support only isotropic scaling".to_string(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_minimum_image() {
        let cell = Cell::cube(10.0).unwrap();
        let a = Vector3::new(4.5, 0.0, 0.0);
        let b = Vector3::new(-4.5, 0.0, 0.0);
        let d = cell.vdist(&a, &b);
        assert_relative_eq!(d.x, -1.0);
        assert_relative_eq!(cell.sqdist(&a, &b), 1.0);
    }

    #[test]
    fn test_boundary_wrap() {
        let cell = Cell::cube(10.0).unwrap();
        let mut p = Vector3::new(6.0, -7.0, 0.0);
        cell.boundary(&mut p);
        assert_relative_eq!(p.x, -4.0);
        assert_relative_eq!(p.y, 3.0);
        assert!(!cell.collision(&p));
    }

    #[test]
    fn test_random_positions_inside() {
        let mut rng = Pcg64::seed_from_u64(1);
        let cell = Cell::cube(8.0).unwrap();
        for _ in 0..1000 {
            let p = cell.random_position(&mut rng);
            assert!(!cell.collision(&p));
        }
        let sphere = Cell::sphere(5.0).unwrap();
        for _ in 0..1000 {
            let p = sphere.random_position(&mut rng);
            assert!(!sphere.collision(&p));
        }
    }

    #[test]
    fn test_isotropic_scaling() {
        let mut cell = Cell::cube(10.0).unwrap();
        let scale = cell
            .scale_volume(2000.0, VolumeScalePolicy::Isotropic)
            .unwrap();
        assert_relative_eq!(cell.volume(), 2000.0, epsilon = 1e-9);
        assert_relative_eq!(scale.x, 2.0_f64.cbrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_xy_scaling_keeps_z() {
        let mut cell = Cell::cube(10.0).unwrap();
        cell.scale_volume(1100.0, VolumeScalePolicy::IsotropicXY)
            .unwrap();
        let l = cell.lengths();
        assert_relative_eq!(l.z, 10.0);
        assert_relative_eq!(l.x * l.y * l.z, 1100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_isochoric_preserves_volume() {
        let mut cell = Cell::cube(10.0).unwrap();
        cell.scale_volume(1.3, VolumeScalePolicy::Isochoric).unwrap();
        assert_relative_eq!(cell.volume(), 1000.0, epsilon = 1e-9);
        assert_relative_eq!(cell.lengths().z, 13.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_cell_rejected() {
        assert!(Cell::cube(-1.0).is_err());
        let mut cell = Cell::cube(10.0).unwrap();
        assert!(cell.scale_volume(0.0, VolumeScalePolicy::Isotropic).is_err());
        assert!(cell
            .scale_volume(f64::NAN, VolumeScalePolicy::Isotropic)
            .is_err());
    }
}
