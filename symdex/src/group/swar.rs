// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Portable control-block probes over the packed 64-bit control word.

use super::GroupControl;

const EMPTY_WORD: u64 = 0x8080_8080_8080_8080;
const EXPAND: u64 = 0x0101_0101_0101_0101;

/// The control bytes as one word, little-endian so byte `i` sits at bits
/// `[8i, 8i+8)` on any host.
#[inline]
fn word(control: GroupControl) -> u64 {
    u64::from_le_bytes(control.0)
}

/// Slot mask produced by a probe: one bit per slot, in the high bit of the
/// slot's byte. Iterates slots lowest-index first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GroupBits(u64);

impl Iterator for GroupBits {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        // The bit for slot i is at position 8i + 7, so dividing the
        // trailing-zero count by 8 recovers the slot index.
        let index = (self.0.trailing_zeros() >> 3) as usize;
        self.0 &= self.0 - 1;
        Some(index)
    }
}

/// SWAR tag match.
///
/// Expand the tag to one copy per byte and XOR with the control word: a
/// matching byte becomes zero. Subtracting `0x01` from each byte then
/// borrows into the high bit of exactly the zero bytes, and AND-NOT with
/// the pre-subtract value keeps only bytes that did not already have their
/// high bit set. The borrow can ripple into the byte following a match,
/// yielding a false positive there; it lands only on occupied bytes (an
/// empty byte's high bit clears the AND-NOT), so candidates always carry a
/// live entry for the caller's full-hash check.
#[inline]
pub(super) fn find_matches(control: GroupControl, tag: u8) -> GroupBits {
    let diff = word(control) ^ (EXPAND * tag as u64);
    GroupBits(diff.wrapping_sub(EXPAND) & !diff & EMPTY_WORD)
}

#[inline]
pub(super) fn find_empty(control: GroupControl) -> GroupBits {
    GroupBits(word(control) & EMPTY_WORD)
}

#[inline]
pub(super) fn find_full(control: GroupControl) -> GroupBits {
    GroupBits(!word(control) & EMPTY_WORD)
}
