// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The interner facade: probe, insert, growth policy, table lifecycle.

use crate::directory::Directory;
use crate::group::{Entry, GROUP_SIZE, TAG_MASK};
use crate::hash::hash_key;
use crate::int_bank::IntBank;
use crate::string_bank::StringBank;
use crate::table::{probe_start, Table, GROWTH_THRESHOLD, TABLE_GROUPS, TABLE_MASK};
use core::ptr::NonNull;
use log::debug;
use symdex_alloc::VirtualAllocator;

/// Assigns monotonically increasing sequence numbers to distinct byte-string
/// keys and maps in both directions. The first key interned receives
/// sequence 1; sequence 0 is reserved and means "absent".
///
/// All bulk data lives off-heap: the hash tables, the directory, the key
/// bytes and the reverse map are page-backed mappings released when the
/// table is dropped.
pub struct SymbolTable {
    directory: Directory,
    /// One recently freed table kept for reuse.
    spare_table: Option<NonNull<Table>>,
    string_bank: StringBank,
    int_bank: IntBank,
    count: usize,
    table_count: usize,
}

// SAFETY: the table exclusively owns every mapping it references; nothing
// is shared, so moving it to another thread is fine. It is not Sync: all
// mutation is single-threaded by design.
unsafe impl Send for SymbolTable {}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Creates an empty symbol table with a depth-zero directory and one
    /// fresh table.
    ///
    /// # Panics
    /// Panics if the initial off-heap mappings cannot be created.
    pub fn new() -> Self {
        let directory = Directory::new().expect("allocating the table directory to succeed");
        let mut symbols = Self {
            directory,
            spare_table: None,
            string_bank: StringBank::new(),
            int_bank: IntBank::new(),
            count: 0,
            table_count: 0,
        };
        let first = symbols.new_table();
        symbols.directory.install(first);
        symbols
    }

    /// Number of unique keys stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total slot capacity across all tables.
    pub fn capacity(&self) -> usize {
        self.table_count * TABLE_GROUPS * GROUP_SIZE
    }

    /// Approximate bytes of key storage. An over-estimate: unused and
    /// wasted space in the string bank is included.
    pub fn symbol_size(&self) -> usize {
        self.string_bank.size()
    }

    /// Looks up a key by its sequence number, as previously returned by
    /// [Self::intern]. The slice shares the table's storage and stays valid
    /// for as long as the borrow.
    ///
    /// Sequences outside `1..=len()` have never been assigned; passing one
    /// is a caller error.
    pub fn lookup_sequence(&self, seq: u32) -> &[u8] {
        self.string_bank.get(self.int_bank.lookup(seq))
    }

    /// Looks up the sequence number for `key`, inserting it if absent and
    /// `add_new` is set.
    ///
    /// Returns the sequence and whether the key was already present. An
    /// absent key with `add_new` unset reports `(0, false)`.
    ///
    /// # Panics
    /// Panics if growth needs an off-heap mapping the allocator cannot
    /// provide, or on index corruption.
    pub fn intern(&mut self, key: &[u8], add_new: bool) -> (u32, bool) {
        let hash = hash_key(key);
        let table_ptr = self.directory.select(hash);
        // SAFETY: tables are pointer-stable and exclusively owned; no other
        // reference to this table exists while intern runs.
        let table = unsafe { &mut *table_ptr.as_ptr() };

        let tag = (hash & TAG_MASK) as u8;
        let mut group_index = probe_start(hash);
        for _ in 0..TABLE_GROUPS {
            let group = table.group_mut(group_index);

            // Candidates matched by tag; the portable probe can yield false
            // positives, so verify the full hash, then the key bytes.
            for slot in group.control.find_matches(tag) {
                let ent = group.entries[slot];
                if ent.hash == hash
                    && self.string_bank.get(self.int_bank.lookup(ent.seq)) == key
                {
                    return (ent.seq, true);
                }
            }

            if let Some(slot) = group.control.find_empty().next() {
                // An empty slot ends the probe sequence: the key is absent.
                if !add_new {
                    return (0, false);
                }

                self.count += 1;
                let seq = self.count as u32;
                let offset = self.string_bank.save(key);
                self.int_bank.save(seq, offset);

                group.entries[slot] = Entry { seq, hash };
                group.control.set(slot, tag);
                table.used += 1;
                if table.used > GROWTH_THRESHOLD {
                    self.grow_table(table_ptr);
                }
                return (seq, false);
            }

            group_index = (group_index + 1) & TABLE_MASK;
        }
        panic!("probe sequence exhausted without an empty slot");
    }

    /// Splits an over-full table, growing the directory first when the
    /// table is already at the directory's depth.
    fn grow_table(&mut self, table_ptr: NonNull<Table>) {
        // SAFETY: short-lived shared read of the table's metadata.
        let local_depth = unsafe { table_ptr.as_ref().local_depth };
        if local_depth == self.directory.global_depth() {
            self.directory
                .grow()
                .expect("allocating a doubled directory to succeed");
            debug!(
                "directory doubled to depth {}",
                self.directory.global_depth()
            );
        }

        let (low, high) = self.split_table(table_ptr);
        self.directory.install(low);
        self.directory.install(high);
        self.free_table(table_ptr);
        debug!(
            "table split at local depth {}; {} tables, {} keys",
            local_depth + 1,
            self.table_count,
            self.count
        );
    }

    /// Replaces a table with two children one level deeper, partitioning
    /// its entries between them.
    fn split_table(&mut self, parent_ptr: NonNull<Table>) -> (NonNull<Table>, NonNull<Table>) {
        let low_ptr = self.new_table();
        let high_ptr = self.new_table();

        // SAFETY: parent, low and high are three distinct live allocations;
        // the references do not outlive this block.
        unsafe {
            let parent = parent_ptr.as_ref();
            let low = &mut *low_ptr.as_ptr();
            let high = &mut *high_ptr.as_ptr();

            low.local_depth = parent.local_depth + 1;
            low.index = parent.index * 2;
            high.local_depth = parent.local_depth + 1;
            high.index = parent.index * 2 + 1;

            parent.split_into(low, high);
        }
        (low_ptr, high_ptr)
    }

    /// A fresh, initialized table: the spare if one is pooled, otherwise a
    /// new mapping.
    fn new_table(&mut self) -> NonNull<Table> {
        self.table_count += 1;
        if let Some(table) = self.spare_table.take() {
            return table;
        }
        let region = VirtualAllocator
            .alloc_array_zeroed::<Table>(1)
            .expect("allocating a table to succeed");
        let mut table = region.cast::<Table>();
        // Zero-filled control bytes read as occupied; reset them to
        // all-empty before the table is exposed.
        // SAFETY: freshly allocated, correctly laid out, exclusively owned.
        unsafe { table.as_mut() }.init();
        table
    }

    /// Retires a table: pooled as the spare if the slot is free, otherwise
    /// returned to the allocator.
    fn free_table(&mut self, mut table: NonNull<Table>) {
        self.table_count -= 1;
        if self.spare_table.is_none() {
            // SAFETY: the table has been unlinked from the directory, so
            // this is the only reference.
            unsafe { table.as_mut() }.init();
            self.spare_table = Some(table);
            return;
        }
        // SAFETY: allocated via alloc_array_zeroed::<Table>(1), freed once.
        unsafe { VirtualAllocator.free_array::<Table>(table, 1) };
    }
}

impl Drop for SymbolTable {
    fn drop(&mut self) {
        // A table at local depth d is referenced from 2^(global - d)
        // directory slots; free it only via the first of them.
        let global_depth = self.directory.global_depth();
        for (i, slot) in self.directory.slots().iter().enumerate() {
            if let Some(table) = *slot {
                // SAFETY: short-lived shared read of the table's metadata.
                let (local_depth, index) = {
                    let table = unsafe { table.as_ref() };
                    (table.local_depth, table.index)
                };
                let first = (index as usize) << (global_depth - local_depth);
                if first == i {
                    // SAFETY: each table is freed exactly once, via its
                    // first directory slot.
                    unsafe { VirtualAllocator.free_array::<Table>(table, 1) };
                }
            }
        }
        if let Some(spare) = self.spare_table.take() {
            // SAFETY: the spare is never referenced by the directory.
            unsafe { VirtualAllocator.free_array::<Table>(spare, 1) };
        }
        // The directory's slot array and the banks' mappings are released
        // by their own Drop impls.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Checks the structural invariants of the directory and its tables.
    fn check_invariants(symbols: &SymbolTable) {
        let global_depth = directory_depth(symbols);
        let slots = symbols.directory.slots();
        assert_eq!(slots.len(), 1 << global_depth);

        let mut referenced: HashMap<NonNull<Table>, usize> = HashMap::new();
        for (i, slot) in slots.iter().enumerate() {
            let table_ptr = slot.expect("no vacant directory slots");
            let table = unsafe { table_ptr.as_ref() };

            assert!(table.local_depth <= global_depth);
            assert!(table.used <= GROWTH_THRESHOLD);
            assert_eq!(table.occupied_slots(), table.used);

            // Every slot referencing a table must fall in the table's
            // contiguous prefix range.
            let width = 1usize << (global_depth - table.local_depth);
            let first = (table.index as usize) << (global_depth - table.local_depth);
            assert!(i >= first && i < first + width);

            *referenced.entry(table_ptr).or_insert(0) += 1;
        }

        assert_eq!(referenced.len(), symbols.table_count);
        for (table_ptr, count) in referenced {
            let table = unsafe { table_ptr.as_ref() };
            let width = 1usize << (global_depth - table.local_depth);
            assert_eq!(count, width);
        }
    }

    fn directory_depth(symbols: &SymbolTable) -> u32 {
        symbols.directory.global_depth()
    }

    #[test]
    fn basic_round_trip() {
        let mut symbols = SymbolTable::new();

        assert_eq!(symbols.intern(b"a1", true), (1, false));
        assert_eq!(symbols.intern(b"a2", true), (2, false));
        assert_eq!(symbols.intern(b"a3", true), (3, false));
        assert_eq!(symbols.intern(b"a2", true), (2, true));
        assert_eq!(symbols.intern(b"a3", true), (3, true));

        assert_eq!(symbols.lookup_sequence(1), b"a1");
        assert_eq!(symbols.lookup_sequence(2), b"a2");
        assert_eq!(symbols.lookup_sequence(3), b"a3");

        assert_eq!(symbols.len(), 3);
        assert_eq!(symbols.capacity(), TABLE_GROUPS * GROUP_SIZE);
    }

    #[test]
    fn add_new_gates_insertion() {
        let mut symbols = SymbolTable::new();

        // Won't add an entry if asked not to.
        assert_eq!(symbols.intern(b"hat", false), (0, false));
        assert_eq!(symbols.intern(b"hat", true), (1, false));
        // Can find an existing entry without adding.
        assert_eq!(symbols.intern(b"hat", false), (1, true));
    }

    #[test]
    fn empty_key_is_a_valid_symbol() {
        let mut symbols = SymbolTable::new();
        assert_eq!(symbols.intern(b"", true), (1, false));
        assert_eq!(symbols.intern(b"", true), (1, true));
        assert_eq!(symbols.lookup_sequence(1), b"");
    }

    #[test]
    fn len_counts_unique_keys_only() {
        let mut symbols = SymbolTable::new();
        assert!(symbols.is_empty());
        symbols.intern(b"x", true);
        symbols.intern(b"x", true);
        symbols.intern(b"y", true);
        assert_eq!(symbols.len(), 2);
        assert!(!symbols.is_empty());
    }

    #[test]
    fn growth_preserves_structure() {
        let mut symbols = SymbolTable::new();
        // Enough keys to force several splits and at least one directory
        // doubling.
        let count = 60_000u32;
        for i in 0..count {
            let key = i.to_string();
            assert_eq!(symbols.intern(key.as_bytes(), true), (i + 1, false));
        }
        assert!(directory_depth(&symbols) >= 1);
        assert!(symbols.capacity() >= symbols.len());
        check_invariants(&symbols);

        for i in 0..count {
            let key = i.to_string();
            assert_eq!(symbols.intern(key.as_bytes(), true), (i + 1, true));
        }
        check_invariants(&symbols);
    }

    #[test]
    fn fuzz_against_golden_model() {
        bolero::check!()
            .with_type::<Vec<Vec<u8>>>()
            .for_each(|keys| {
                let mut golden: HashMap<Vec<u8>, u32> = HashMap::new();
                let mut symbols = SymbolTable::new();

                for key in keys {
                    let expected = golden.get(key).copied();
                    let (seq, found) = symbols.intern(key, true);
                    match expected {
                        Some(known) => {
                            assert!(found);
                            assert_eq!(seq, known);
                        }
                        None => {
                            assert!(!found);
                            assert_eq!(seq as usize, golden.len() + 1);
                            golden.insert(key.clone(), seq);
                        }
                    }
                    assert_eq!(symbols.len(), golden.len());
                }

                for (key, seq) in &golden {
                    assert_eq!(symbols.lookup_sequence(*seq), &key[..]);
                    assert_eq!(symbols.intern(key, false), (*seq, true));
                }
            })
    }
}
