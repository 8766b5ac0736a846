// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The sequence-to-offset map.
//!
//! Sequence numbers are handed out in strictly increasing order starting at
//! 1, so the map is an append-indexed array of string-bank offsets, stored
//! in fixed-size off-heap pages.

use core::ptr::NonNull;
use symdex_alloc::VirtualAllocator;

const PAGE_SHIFT: usize = 13;
const PAGE_ENTRIES: usize = 1 << PAGE_SHIFT;

pub(crate) struct IntBank {
    pages: Vec<NonNull<usize>>,
    len: usize,
}

impl IntBank {
    pub(crate) fn new() -> Self {
        Self {
            pages: Vec::new(),
            len: 0,
        }
    }

    /// Records that sequence `seq` maps to `offset`. Sequences must arrive
    /// in order: each call's `seq` is one past the previous call's.
    pub(crate) fn save(&mut self, seq: u32, offset: usize) {
        let index = (seq - 1) as usize;
        debug_assert_eq!(index, self.len);

        let page = index >> PAGE_SHIFT;
        if page == self.pages.len() {
            let region = VirtualAllocator
                .alloc_array_zeroed::<usize>(PAGE_ENTRIES)
                .expect("allocating an int bank page to succeed");
            self.pages.push(region.cast::<usize>());
        }

        // SAFETY: the masked index is below PAGE_ENTRIES, within the page.
        unsafe {
            *self.pages[page].as_ptr().add(index & (PAGE_ENTRIES - 1)) = offset;
        }
        self.len = index + 1;
    }

    /// The offset recorded for `seq`. Sequence 0 is never assigned and
    /// sequences beyond the last saved one have no defined offset.
    #[inline]
    pub(crate) fn lookup(&self, seq: u32) -> usize {
        debug_assert!(seq >= 1 && seq as usize <= self.len);
        let index = (seq - 1) as usize;
        // SAFETY: the masked index is below PAGE_ENTRIES; the page lookup
        // itself stays bounds-checked.
        unsafe { *self.pages[index >> PAGE_SHIFT].as_ptr().add(index & (PAGE_ENTRIES - 1)) }
    }
}

impl Drop for IntBank {
    fn drop(&mut self) {
        for page in self.pages.drain(..) {
            // SAFETY: every page was allocated with PAGE_ENTRIES elements
            // and is freed once.
            unsafe { VirtualAllocator.free_array::<usize>(page, PAGE_ENTRIES) };
        }
    }
}
