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
//! Trajectory output. The compact stream stores every slot (inactive
//! included) at fixed 10⁻³ Å precision in lz4-compressed frames; the text
//! snapshot writers (XYZ, PQR, GRO, AAM) store active particles only and
//! are chosen by file extension.
//!

use crate::analysis::Analysis;
use crate::montecarlo::{MarkovChain, RandomState};
use crate::space::Space;
use crate::ConsistencyError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Fixed-point resolution of the compact stream (Å)
const COMPACT_PRECISION: f64 = 1e-3;

///
/// One frame of the compact stream: box vectors plus quantized positions
/// for *all* slots so that reservoir states survive a round trip.
///
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CompactFrame {
    pub step: u64,
    pub lengths: [f64; 3],
    pub coordinates: Vec<i32>,
}

impl CompactFrame {
    pub fn from_space(space: &Space, step: usize) -> Self {
        let lengths = space.cell.lengths();
        let coordinates = space
            .particles
            .iter()
            .flat_map(|p| [p.pos.x, p.pos.y, p.pos.z])
            .map(|x| (x / COMPACT_PRECISION).round() as i32)
            .collect();
        CompactFrame {
            step: step as u64,
            lengths: [lengths.x, lengths.y, lengths.z],
            coordinates,
        }
    }

    /// Position of slot `index` restored to floating point (Å)
    pub fn position(&self, index: usize) -> [f64; 3] {
        let base = 3 * index;
        [
            self.coordinates[base] as f64 * COMPACT_PRECISION,
            self.coordinates[base + 1] as f64 * COMPACT_PRECISION,
            self.coordinates[base + 2] as f64 * COMPACT_PRECISION,
        ]
    }
}

///
/// Length-prefixed, lz4-compressed, bincode-encoded frame stream.
///
pub struct CompactTrajectory {
    interval: usize,
    writer: BufWriter<File>,
}

impl CompactTrajectory {
    pub fn create(path: &Path, interval: usize) -> std::io::Result<Self> {
        Ok(CompactTrajectory {
            interval,
            writer: BufWriter::new(File::create(path)?),
        })
    }

    fn write_frame(&mut self, frame: &CompactFrame) -> std::io::Result<()> {
        let encoded = bincode::serialize(frame)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let compressed = lz4_flex::compress_prepend_size(&encoded);
        self.writer
            .write_all(&(compressed.len() as u32).to_le_bytes())?;
        self.writer.write_all(&compressed)?;
        Ok(())
    }

    /// Read back a full stream, e.g. for post-processing
    pub fn read_frames(path: &Path) -> std::io::Result<Vec<CompactFrame>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut frames = Vec::new();
        loop {
            let mut length = [0u8; 4];
            match reader.read_exact(&mut length) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let mut compressed = vec![0u8; u32::from_le_bytes(length) as usize];
            reader.read_exact(&mut compressed)?;
            let encoded = lz4_flex::decompress_size_prepended(&compressed)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let frame = bincode::deserialize(&encoded)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            frames.push(frame);
        }
        Ok(frames)
    }
}

impl Analysis for CompactTrajectory {
    fn name(&self) -> &str {
        "compacttraj"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        step: usize,
    ) -> Result<(), ConsistencyError> {
        let frame = CompactFrame::from_space(&chain.accepted.space, step);
        self.write_frame(&frame)
            .map_err(|e| ConsistencyError::Output(format!("trajectory write: {}", e)))
    }

    fn finalize(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

///
/// One line per frame with alternating charge and radius per slot; zeros
/// for inactive slots.
///
pub struct ChargeRadiusTrajectory {
    interval: usize,
    writer: BufWriter<File>,
}

impl ChargeRadiusTrajectory {
    pub fn create(path: &Path, interval: usize) -> std::io::Result<Self> {
        Ok(ChargeRadiusTrajectory {
            interval,
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl Analysis for ChargeRadiusTrajectory {
    fn name(&self) -> &str {
        "chargeradius"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        _step: usize,
    ) -> Result<(), ConsistencyError> {
        let space = &chain.accepted.space;
        let mut line = String::new();
        for group in &space.groups {
            for (relative, particle) in space.particles[group.range_all()].iter().enumerate() {
                let (charge, radius) = if relative < group.size {
                    (
                        particle.charge,
                        0.5 * space.topology.atoms[particle.id].sigma,
                    )
                } else {
                    (0.0, 0.0)
                };
                line.push_str(&format!("{:.3} {:.3} ", charge, radius));
            }
        }
        writeln!(self.writer, "{}", line.trim_end())
            .map_err(|e| ConsistencyError::Output(format!("trajectory write: {}", e)))
    }

    fn finalize(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

///
/// Save active particles to a coordinate file (xyz, pqr, gro, aam ...)
///
pub fn save_coordinates(path: &Path, space: &Space) -> std::io::Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xyz") => save_xyzfile(path, space),
        Some("pqr") => save_pqrfile(path, space),
        Some("gro") => save_grofile(path, space),
        Some("aam") => save_aamfile(path, space),
        other => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsupported snapshot format: {:?}", other),
        )),
    }
}

fn active_particles(space: &Space) -> impl Iterator<Item = &crate::particle::Particle> + '_ {
    space
        .groups
        .iter()
        .flat_map(|g| space.particles[g.range()].iter())
}

///
/// Save in XYZ molecular file format (atom names and positions)
///
fn save_xyzfile(path: &Path, space: &Space) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    let count = active_particles(space).count();
    writeln!(file, "{}\ngenerated by reactive-mc", count)?;
    for particle in active_particles(space) {
        let name = &space.topology.atoms[particle.id].name;
        writeln!(
            file,
            "{} {} {} {}",
            name, particle.pos.x, particle.pos.y, particle.pos.z
        )?;
    }
    Ok(())
}

///
/// Save in PQR molecular file format (names, positions, charges, radii)
///
fn save_pqrfile(path: &Path, space: &Space) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(
        file,
        "{}\ngenerated by reactive-mc",
        active_particles(space).count()
    )?;
    for (index, particle) in active_particles(space).enumerate() {
        let kind = &space.topology.atoms[particle.id];
        writeln!(
            file,
            "{:6}{:5} {:^4.4}{:1}{:3.3} {:1}{:4}{:1}   {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}",
            "ATOM",
            index + 1,
            kind.name,
            "A",
            "MOL",
            "A",
            1,
            "0",
            particle.pos.x,
            particle.pos.y,
            particle.pos.z,
            particle.charge,
            0.5 * kind.sigma
        )?;
    }
    Ok(())
}

///
/// Save in Gromos-87 format; positions converted from Å to nm
///
fn save_grofile(path: &Path, space: &Space) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "generated by reactive-mc")?;
    writeln!(file, "{}", active_particles(space).count())?;
    for (index, particle) in active_particles(space).enumerate() {
        let name = &space.topology.atoms[particle.id].name;
        writeln!(
            file,
            "{:5}{:<5}{:>5}{:5}{:8.3}{:8.3}{:8.3}",
            1,
            "MOL",
            name,
            (index + 1) % 100_000,
            particle.pos.x * 0.1,
            particle.pos.y * 0.1,
            particle.pos.z * 0.1
        )?;
    }
    let lengths = space.cell.lengths() * 0.1;
    writeln!(file, "{:10.5}{:10.5}{:10.5}", lengths.x, lengths.y, lengths.z)?;
    Ok(())
}

///
/// Save in AAM format (name, number, position, charge, weight, radius)
///
fn save_aamfile(path: &Path, space: &Space) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{}", active_particles(space).count())?;
    for (index, particle) in active_particles(space).enumerate() {
        let kind = &space.topology.atoms[particle.id];
        writeln!(
            file,
            "{} {} {:.3} {:.3} {:.3} {:.3} {:.3} {:.3}",
            kind.name,
            index + 1,
            particle.pos.x,
            particle.pos.y,
            particle.pos.z,
            particle.charge,
            kind.mass,
            0.5 * kind.sigma
        )?;
    }
    Ok(())
}

///
/// Periodic numbered snapshots in a text format chosen by extension.
///
pub struct SnapshotWriter {
    interval: usize,
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(path: PathBuf, interval: usize) -> Self {
        SnapshotWriter { interval, path }
    }

    fn numbered_path(&self, step: usize) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("snapshot");
        let extension = self
            .path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("xyz");
        self.path
            .with_file_name(format!("{}_{}.{}", stem, step, extension))
    }
}

impl Analysis for SnapshotWriter {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn interval(&self) -> usize {
        self.interval
    }

    fn sample(
        &mut self,
        chain: &mut MarkovChain,
        _rng: &mut RandomState,
        step: usize,
    ) -> Result<(), ConsistencyError> {
        save_coordinates(&self.numbered_path(step), &chain.accepted.space)
            .map_err(|e| ConsistencyError::Output(format!("snapshot write: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compact_frame_quantization() {
        let frame = CompactFrame {
            step: 7,
            lengths: [10.0, 10.0, 10.0],
            coordinates: vec![1234, -567, 0],
        };
        let position = frame.position(0);
        assert_relative_eq!(position[0], 1.234);
        assert_relative_eq!(position[1], -0.567);
        assert_relative_eq!(position[2], 0.0);
    }

    #[test]
    fn test_compact_round_trip() {
        let frame = CompactFrame {
            step: 3,
            lengths: [25.0, 25.0, 50.0],
            coordinates: vec![100, 200, 300, -400, -500, -600],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.traj");
        {
            let mut trajectory = CompactTrajectory::create(&path, 1).unwrap();
            trajectory.write_frame(&frame).unwrap();
            trajectory.write_frame(&frame).unwrap();
            trajectory.finalize().unwrap();
        }
        let frames = CompactTrajectory::read_frames(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frame);
    }
}
