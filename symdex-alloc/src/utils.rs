// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// https://doc.rust-lang.org/beta/std/primitive.pointer.html#method.is_aligned_to
/// Convenience function until the std lib standardizes this.
#[cfg(test)]
#[track_caller]
pub(crate) fn is_aligned_to<T>(p: *const T, align: usize) -> bool {
    p.align_offset(align) == 0
}

/// One fuzzer step against the typed-array interface: allocate a zeroed
/// array of `n` elements, check alignment and zero-fill, write and read
/// back one element, release. Sizes that overflow or exceed `max_bytes`
/// are skipped.
#[cfg(test)]
pub(crate) fn check_array_round_trip<T: Copy + PartialEq + core::fmt::Debug>(
    allocator: &crate::VirtualAllocator,
    n: usize,
    idx: usize,
    val: T,
    max_bytes: usize,
) {
    use core::mem::{align_of, size_of};

    let Some(bytes) = n.checked_mul(size_of::<T>()) else {
        return;
    };
    if bytes == 0 || bytes > max_bytes {
        return;
    }

    let Ok(region) = allocator.alloc_array_zeroed::<T>(n) else {
        return;
    };
    // Page rounding may extend the array, never shrink it.
    assert!(region.len() >= n);

    let base = region.cast::<T>();
    assert!(is_aligned_to(base.as_ptr(), align_of::<T>()));

    let idx = idx % n;
    // SAFETY: idx < n, so the element is inside the zero-filled region.
    unsafe {
        let slot = base.as_ptr().add(idx);
        let raw = slot.cast::<u8>();
        for byte in 0..size_of::<T>() {
            assert_eq!(raw.add(byte).read(), 0, "byte {byte} of element {idx} not zeroed");
        }
        slot.write(val);
        assert_eq!(slot.read(), val);
    }

    // SAFETY: the same T and n that produced the region.
    unsafe { allocator.free_array::<T>(base, n) };
}
