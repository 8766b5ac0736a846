// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The extendible-hashing directory: a power-of-two array of table
//! references, indexed by the top bits of a key's hash.

use crate::table::Table;
use core::ptr::NonNull;
use core::slice;
use symdex_alloc::{AllocError, VirtualAllocator};

type Slot = Option<NonNull<Table>>;

/// Maps hash prefixes to tables.
///
/// The slot array holds `2^global_depth` references and lives in its own
/// page-backed region. A table with local depth `d` is referenced from
/// exactly `2^(global_depth - d)` contiguous slots, starting at
/// `index << (global_depth - d)`; growth doubles the array by duplicating
/// every reference, which preserves that property for every table.
pub(crate) struct Directory {
    slots: NonNull<Slot>,
    global_depth: u32,
}

fn alloc_slots(n: usize) -> Result<NonNull<Slot>, AllocError> {
    // The region is zero-filled, and the all-zero bit pattern of
    // `Option<NonNull<_>>` is `None`, so every new slot reads as vacant.
    let region = VirtualAllocator.alloc_array_zeroed::<Slot>(n)?;
    Ok(region.cast::<Slot>())
}

impl Directory {
    /// A directory of depth zero: a single slot, initially vacant.
    pub(crate) fn new() -> Result<Self, AllocError> {
        let slots = alloc_slots(1)?;
        Ok(Self {
            slots,
            global_depth: 0,
        })
    }

    #[inline]
    pub(crate) fn global_depth(&self) -> u32 {
        self.global_depth
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        1usize << self.global_depth
    }

    pub(crate) fn slots(&self) -> &[Slot] {
        // SAFETY: the region holds len() initialized slots.
        unsafe { slice::from_raw_parts(self.slots.as_ptr(), self.len()) }
    }

    fn slots_mut(&mut self) -> &mut [Slot] {
        // SAFETY: the region holds len() initialized slots, and we have
        // exclusive access.
        unsafe { slice::from_raw_parts_mut(self.slots.as_ptr(), self.len()) }
    }

    /// The table routing the given hash: the slot named by the hash's top
    /// `global_depth` bits.
    #[inline]
    pub(crate) fn select(&self, hash: u32) -> NonNull<Table> {
        // The widening keeps the shift legal while the depth is zero.
        let index = (hash as u64 >> (32 - self.global_depth)) as usize;
        match self.slots()[index] {
            Some(table) => table,
            None => panic!("vacant slot in table directory"),
        }
    }

    /// Doubles the directory, duplicating each reference into a pair of
    /// adjacent slots. Tables are untouched; each one is simply referenced
    /// from twice as many slots afterwards.
    pub(crate) fn grow(&mut self) -> Result<(), AllocError> {
        let old_len = self.len();
        let new_slots = alloc_slots(old_len * 2)?;

        // SAFETY: both regions are live, distinct, and large enough; the
        // old region holds old_len initialized slots.
        unsafe {
            let old = self.slots.as_ptr();
            let new = new_slots.as_ptr();
            for i in 0..old_len {
                let table = *old.add(i);
                *new.add(2 * i) = table;
                *new.add(2 * i + 1) = table;
            }
            VirtualAllocator.free_array::<Slot>(self.slots, old_len);
        }

        self.slots = new_slots;
        self.global_depth += 1;
        Ok(())
    }

    /// Points every slot in the table's prefix range at the table.
    ///
    /// After a split this repartitions the parent's old range: the lower
    /// half to the child at `index = 2i`, the upper half to `2i + 1`.
    pub(crate) fn install(&mut self, table: NonNull<Table>) {
        // SAFETY: short-lived shared read of the table's metadata.
        let (local_depth, index) = {
            let table = unsafe { table.as_ref() };
            (table.local_depth, table.index)
        };
        debug_assert!(local_depth <= self.global_depth);

        let width = 1usize << (self.global_depth - local_depth);
        let first = (index as usize) << (self.global_depth - local_depth);
        for slot in &mut self.slots_mut()[first..first + width] {
            *slot = Some(table);
        }
    }
}

impl Drop for Directory {
    fn drop(&mut self) {
        // Releases only the slot array; the tables it references are owned
        // and freed by the interner.
        unsafe { VirtualAllocator.free_array::<Slot>(self.slots, self.len()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestTable(NonNull<Table>);

    impl TestTable {
        fn new(local_depth: u32, index: u32) -> Self {
            let region = VirtualAllocator
                .alloc_array_zeroed::<Table>(1)
                .expect("table allocation");
            let mut table = region.cast::<Table>();
            let t = unsafe { table.as_mut() };
            t.init();
            t.local_depth = local_depth;
            t.index = index;
            Self(table)
        }
    }

    impl Drop for TestTable {
        fn drop(&mut self) {
            unsafe { VirtualAllocator.free_array::<Table>(self.0, 1) };
        }
    }

    #[test]
    fn new_directory_has_one_vacant_slot() {
        let dir = Directory::new().unwrap();
        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.len(), 1);
        assert!(dir.slots()[0].is_none());
    }

    #[test]
    fn install_at_depth_zero_fills_the_directory() {
        let table = TestTable::new(0, 0);
        let mut dir = Directory::new().unwrap();
        dir.install(table.0);
        assert_eq!(dir.slots(), &[Some(table.0)]);

        // Any hash routes to the only table.
        assert_eq!(dir.select(0), table.0);
        assert_eq!(dir.select(u32::MAX), table.0);
    }

    #[test]
    fn grow_duplicates_every_reference() {
        let table = TestTable::new(0, 0);
        let mut dir = Directory::new().unwrap();
        dir.install(table.0);

        dir.grow().unwrap();
        dir.grow().unwrap();
        assert_eq!(dir.global_depth(), 2);
        assert_eq!(dir.slots(), &[Some(table.0); 4]);
    }

    #[test]
    fn install_covers_the_prefix_range() {
        let shallow = TestTable::new(1, 0);
        let low = TestTable::new(2, 2);
        let high = TestTable::new(2, 3);

        let mut dir = Directory::new().unwrap();
        dir.grow().unwrap();
        dir.grow().unwrap();

        dir.install(shallow.0);
        dir.install(low.0);
        dir.install(high.0);

        assert_eq!(
            dir.slots(),
            &[Some(shallow.0), Some(shallow.0), Some(low.0), Some(high.0)]
        );

        // Selection by the top two bits of the hash.
        assert_eq!(dir.select(0x0000_0000), shallow.0);
        assert_eq!(dir.select(0x7fff_ffff), shallow.0);
        assert_eq!(dir.select(0x8000_0000), low.0);
        assert_eq!(dir.select(0xc000_0000), high.0);
    }

    #[test]
    #[should_panic(expected = "vacant slot")]
    fn select_panics_on_vacant_slot() {
        let dir = Directory::new().unwrap();
        _ = dir.select(0);
    }
}
