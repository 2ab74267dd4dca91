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
//! Groups: contiguous windows over the flat particle vector, one per
//! molecule or per atomic reservoir. The capacity of a group is fixed at
//! allocation; only the number of *active* slots changes during the
//! simulation. Inactive tail slots stay allocated as frozen placeholders
//! for reactive activation.
//!

use crate::ConsistencyError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Activity filter for group lookups
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    /// size > 0
    Active,
    /// size == 0
    Inactive,
    All,
}

///
/// Window over the particle vector. Molecular groups are all-or-nothing
/// (`size` is 0 or `capacity`); atomic reservoir groups resize freely
/// within capacity.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// molecule kind id
    pub molid: usize,
    /// first particle slot
    pub begin: usize,
    /// number of active slots
    pub size: usize,
    /// total allocated slots; immutable
    pub capacity: usize,
    /// variable-size reservoir semantics
    pub atomic: bool,
    /// mass center of the active particles; `None` for atomic groups
    pub mass_center: Option<Vector3<f64>>,
    /// id of the last applied rigid conformation
    pub confid: usize,
}

impl Group {
    pub fn new(molid: usize, begin: usize, capacity: usize, atomic: bool) -> Self {
        Group {
            molid,
            begin,
            size: capacity,
            capacity,
            atomic,
            mass_center: if atomic { None } else { Some(Vector3::zeros()) },
            confid: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.size > 0
    }

    pub fn matches(&self, selection: Selection) -> bool {
        match selection {
            Selection::Active => self.is_active(),
            Selection::Inactive => !self.is_active(),
            Selection::All => true,
        }
    }

    /// Absolute slot range of the active particles
    pub fn range(&self) -> Range<usize> {
        self.begin..self.begin + self.size
    }

    /// Absolute slot range of all allocated particles, inactive included
    pub fn range_all(&self) -> Range<usize> {
        self.begin..self.begin + self.capacity
    }

    /// Absolute index of a relative (within-group) index
    pub fn absolute(&self, relative: usize) -> usize {
        self.begin + relative
    }

    /// Relative index of an absolute particle index
    pub fn relative(&self, absolute: usize) -> usize {
        absolute - self.begin
    }

    pub fn contains(&self, absolute: usize) -> bool {
        self.range_all().contains(&absolute)
    }

    /// Grow the active region by `n` slots
    pub fn activate(&mut self, n: usize, index: usize) -> Result<(), ConsistencyError> {
        if self.size + n > self.capacity {
            return Err(ConsistencyError::InvalidGroupOperation {
                group: index,
                reason: format!(
                    "cannot activate {} slots: size {} of capacity {}",
                    n, self.size, self.capacity
                ),
            });
        }
        self.size += n;
        Ok(())
    }

    /// Shrink the active region by `n` slots
    pub fn deactivate(&mut self, n: usize, index: usize) -> Result<(), ConsistencyError> {
        if n > self.size {
            return Err(ConsistencyError::InvalidGroupOperation {
                group: index,
                reason: format!("cannot deactivate {} slots: size is {}", n, self.size),
            });
        }
        self.size -= n;
        Ok(())
    }
}
