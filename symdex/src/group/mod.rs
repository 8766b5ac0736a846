// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups of eight slots probed in parallel.
//!
//! Each group carries one control byte per slot. An empty slot's control
//! byte has its high bit set (`0x80`); an occupied slot's byte holds the
//! entry's tag, the low 7 bits of the key's hash. Probing a group is a
//! single bit-parallel comparison over all eight bytes, either with SSE2
//! vector equality or with a SWAR trick on the packed 64-bit control word.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2",
        not(miri),
    ))] {
        mod sse2;
        use sse2 as imp;
    } else {
        mod swar;
        use swar as imp;
    }
}

pub(crate) use imp::GroupBits;

pub(crate) const GROUP_SIZE: usize = 8;

/// Low 7 bits of a key's hash, stored in the control byte to filter probes.
pub(crate) const TAG_MASK: u32 = 0x7f;

const EMPTY: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct Entry {
    pub(crate) seq: u32,
    pub(crate) hash: u32,
}

/// The packed control bytes of one group.
///
/// The 8-byte alignment lets the portable probe read the whole block as one
/// aligned word. `u64::from_le_bytes` fixes the aliasing so byte `i` sits at
/// bits `[8i, 8i+8)` on any host, which is the layout the SWAR masks assume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub(crate) struct GroupControl([u8; GROUP_SIZE]);

#[repr(C)]
pub(crate) struct Group {
    pub(crate) control: GroupControl,
    pub(crate) entries: [Entry; GROUP_SIZE],
}

impl Group {
    /// Marks every slot empty. Entries are left as-is; the control bytes
    /// gate all access to them.
    #[inline]
    pub(crate) fn init(&mut self) {
        self.control = GroupControl([EMPTY; GROUP_SIZE]);
    }
}

impl GroupControl {
    /// Occupies slot `index` with the given tag.
    #[inline]
    pub(crate) fn set(&mut self, index: usize, tag: u8) {
        debug_assert_eq!(tag & EMPTY, 0);
        self.0[index] = tag;
    }

    /// Slots whose control byte matches `tag`.
    ///
    /// The portable implementation can report false positives on occupied
    /// slots; callers must re-verify candidates against the entry's full
    /// hash. Empty slots are never reported by either implementation.
    #[inline]
    pub(crate) fn find_matches(self, tag: u8) -> GroupBits {
        imp::find_matches(self, tag)
    }

    /// Slots that are empty.
    #[inline]
    pub(crate) fn find_empty(self) -> GroupBits {
        imp::find_empty(self)
    }

    /// Slots that are occupied.
    #[inline]
    pub(crate) fn find_full(self) -> GroupBits {
        imp::find_full(self)
    }
}
