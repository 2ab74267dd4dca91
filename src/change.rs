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
//! The change descriptor: a structured summary of what the latest trial
//! move altered. Energy terms consume it to restrict pair sums to the
//! affected particles; the driver consumes it to synchronize the trial and
//! the accepted state in O(change).
//!

///
/// Per-group record of a change.
///
/// `atom_indices` holds *relative* indices into the group and is kept
/// sorted ascending; group entries themselves are kept sorted by group
/// index. Energy terms rely on this ordering when intersecting or
/// de-duplicating against the change.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupChange {
    pub group_index: usize,
    /// every particle of the group is affected
    pub all: bool,
    /// internal (intra-group) energy is affected
    pub internal: bool,
    /// the number of active particles changed
    pub size_changed: bool,
    /// an atom changed identity in place
    pub swapped: bool,
    /// affected relative atom indices; empty when `all`
    pub atom_indices: Vec<usize>,
}

impl GroupChange {
    pub fn single(group_index: usize, relative: usize) -> Self {
        GroupChange {
            group_index,
            atom_indices: vec![relative],
            ..Default::default()
        }
    }

    pub fn whole(group_index: usize, internal: bool) -> Self {
        GroupChange {
            group_index,
            all: true,
            internal,
            ..Default::default()
        }
    }
}

///
/// Hierarchical description of everything that differs from the last
/// accepted state.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Change {
    /// the cell volume changed
    pub volume_changed: bool,
    /// give up on bookkeeping; every particle may have moved
    pub everything: bool,
    /// the number of active particles changed
    pub matter_changed: bool,
    pub groups: Vec<GroupChange>,
}

impl Change {
    /// Reset to "no change"
    pub fn clear(&mut self) {
        *self = Change::default();
    }

    /// True if nothing changed; such a proposal counts as a rejection
    pub fn is_empty(&self) -> bool {
        !self.volume_changed && !self.everything && !self.matter_changed && self.groups.is_empty()
    }

    /// Global re-evaluation marker, also used for the initial energy
    pub fn all() -> Self {
        Change {
            everything: true,
            ..Default::default()
        }
    }

    /// Volume move footprint: every position is rescaled
    pub fn volume() -> Self {
        Change {
            volume_changed: true,
            everything: true,
            ..Default::default()
        }
    }

    pub fn touches_group(&self, group_index: usize) -> bool {
        self.everything || self.groups.iter().any(|g| g.group_index == group_index)
    }

    /// Entry for a group, creating it if absent
    pub fn entry(&mut self, group_index: usize) -> &mut GroupChange {
        if let Some(position) = self
            .groups
            .iter()
            .position(|g| g.group_index == group_index)
        {
            return &mut self.groups[position];
        }
        let index = self.groups.len();
        self.groups.push(GroupChange {
            group_index,
            ..Default::default()
        });
        &mut self.groups[index]
    }

    ///
    /// Restore the ordering contract: group entries sorted by group index,
    /// relative atom indices sorted ascending and de-duplicated.
    ///
    pub fn sanitize(&mut self) {
        self.groups.sort_by_key(|g| g.group_index);
        for group in &mut self.groups {
            group.atom_indices.sort_unstable();
            group.atom_indices.dedup();
            if group.all {
                group.atom_indices.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_clear() {
        let mut change = Change::default();
        assert!(change.is_empty());
        change.groups.push(GroupChange::single(3, 0));
        assert!(!change.is_empty());
        change.clear();
        assert!(change.is_empty());
    }

    #[test]
    fn test_sanitize_orders_entries() {
        let mut change = Change::default();
        change.groups.push(GroupChange {
            group_index: 5,
            atom_indices: vec![3, 1, 3],
            ..Default::default()
        });
        change.groups.push(GroupChange::single(2, 7));
        change.sanitize();
        assert_eq!(change.groups[0].group_index, 2);
        assert_eq!(change.groups[1].atom_indices, vec![1, 3]);
    }

    #[test]
    fn test_entry_is_idempotent() {
        let mut change = Change::default();
        change.entry(4).atom_indices.push(0);
        change.entry(4).atom_indices.push(2);
        assert_eq!(change.groups.len(), 1);
        assert_eq!(change.groups[0].atom_indices, vec![0, 2]);
    }
}
