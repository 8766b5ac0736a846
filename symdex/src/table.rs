// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-size hash tables: 4096 groups of 8 slots each.

use crate::group::{Entry, Group, GROUP_SIZE, TAG_MASK};

pub(crate) const TABLE_GROUPS: usize = 4096;
pub(crate) const TABLE_MASK: u32 = (TABLE_GROUPS - 1) as u32;

/// A table splits once it passes three-quarters occupancy. The split paths
/// rely on this: a parent never holds more than `GROWTH_THRESHOLD + 1`
/// entries, so a child can absorb all of them without filling up.
pub(crate) const GROWTH_THRESHOLD: u32 = (TABLE_GROUPS * GROUP_SIZE * 3 / 4) as u32;

/// One table of the extendible-hashing directory.
///
/// Tables live in page-backed regions obtained from the allocator and are
/// only ever handled through `NonNull`; a fresh region is zero-filled, which
/// reads as all-occupied control bytes, so [Table::init] must run before a
/// table is exposed.
#[repr(C)]
pub(crate) struct Table {
    groups: [Group; TABLE_GROUPS],
    /// Number of leading hash bits that route to this table.
    pub(crate) local_depth: u32,
    /// Occupied slots.
    pub(crate) used: u32,
    /// Index of this table in the directory at its own local depth.
    pub(crate) index: u32,
}

/// Starting group for a probe: the 12 hash bits above the tag.
#[inline]
pub(crate) fn probe_start(hash: u32) -> u32 {
    (hash >> 7) & TABLE_MASK
}

impl Table {
    pub(crate) fn init(&mut self) {
        for group in self.groups.iter_mut() {
            group.init();
        }
        self.local_depth = 0;
        self.used = 0;
        self.index = 0;
    }

    /// The masked index is statically below `TABLE_GROUPS`, so the bounds
    /// check compiles away.
    #[inline]
    pub(crate) fn group_mut(&mut self, index: u32) -> &mut Group {
        &mut self.groups[(index & TABLE_MASK) as usize]
    }

    /// Re-inserts an entry while splitting. Walks the probe sequence to the
    /// first group with an empty slot; never triggers growth, since the
    /// destination is a fresh child with more free space than its parent.
    pub(crate) fn insert(&mut self, ent: Entry) {
        let mut group_index = probe_start(ent.hash);
        for _ in 0..TABLE_GROUPS {
            let group = self.group_mut(group_index);
            if let Some(slot) = group.control.find_empty().next() {
                group.entries[slot] = ent;
                group.control.set(slot, (ent.hash & TAG_MASK) as u8);
                self.used += 1;
                return;
            }
            group_index = (group_index + 1) & TABLE_MASK;
        }
        panic!("probe sequence exhausted without an empty slot");
    }

    /// Partitions every occupied entry between two fresh children.
    ///
    /// The discriminator is the single hash bit exposed by the children's
    /// local depth: clear routes to `low`, set routes to `high`.
    pub(crate) fn split_into(&self, low: &mut Table, high: &mut Table) {
        debug_assert_eq!(low.local_depth, self.local_depth + 1);
        debug_assert_eq!(high.local_depth, self.local_depth + 1);

        let mask = 1u32 << (31 - self.local_depth);
        for group in self.groups.iter() {
            for slot in group.control.find_full() {
                let ent = group.entries[slot];
                let child = if ent.hash & mask == 0 {
                    &mut *low
                } else {
                    &mut *high
                };
                child.insert(ent);
            }
        }
    }

    /// Occupied slots counted from the control bytes, for cross-checking
    /// against `used`.
    #[cfg(test)]
    pub(crate) fn occupied_slots(&self) -> u32 {
        self.groups
            .iter()
            .map(|g| g.control.find_full().count() as u32)
            .sum()
    }
}
