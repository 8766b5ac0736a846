// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::AllocError;
use allocator_api2::alloc::Allocator;
use core::alloc::Layout;
use core::mem::size_of;
use core::ptr::NonNull;

/// Allocates whole pages of anonymous virtual memory for each allocation.
///
/// Regions come back zero-filled and are released to the OS on deallocation.
/// Requests are rounded up to a page multiple, so this is meant for large,
/// long-lived objects: hash tables, directory arrays, bank chunks. Small
/// allocations waste most of a page.
#[derive(Clone, Copy, Debug, Default)]
pub struct VirtualAllocator;

impl VirtualAllocator {
    /// Allocates a zero-filled array of `n` values of `T`.
    ///
    /// The backing region is page-rounded; the returned slice covers every
    /// element that fits, which may be more than `n`. Pass the same `n` to
    /// [Self::free_array] when releasing.
    pub fn alloc_array_zeroed<T>(&self, n: usize) -> Result<NonNull<[T]>, AllocError> {
        let layout = Layout::array::<T>(n).map_err(|_| AllocError)?;
        let region = self.allocate_zeroed(layout)?;
        let len = region.len() / size_of::<T>();
        Ok(NonNull::slice_from_raw_parts(region.cast::<T>(), len))
    }

    /// Releases an array obtained from [Self::alloc_array_zeroed].
    ///
    /// # Safety
    /// `ptr` must have been returned by `alloc_array_zeroed::<T>` with the
    /// same `n` on this allocator, and must not have been freed already.
    pub unsafe fn free_array<T>(&self, ptr: NonNull<T>, n: usize) {
        // SAFETY: the layout was valid when the array was allocated, so it
        // is valid here.
        let layout = unsafe { Layout::array::<T>(n).unwrap_unchecked() };
        // SAFETY: upheld by the caller.
        unsafe { self.deallocate(ptr.cast(), layout) };
    }
}

/// Number of whole pages needed for `layout`, in bytes.
///
/// Zero-sized layouts are refused, as are alignments beyond a page: page
/// boundaries are the strongest alignment this allocator can promise.
#[cfg_attr(debug_assertions, track_caller)]
#[inline]
fn layout_to_page_size(layout: Layout) -> Result<usize, AllocError> {
    if layout.size() == 0 {
        return Err(AllocError);
    }

    let page_size = os::page_size()?;
    if layout.align() > page_size {
        return Err(AllocError);
    }

    round_to_pages(layout.size(), page_size).ok_or(AllocError)
}

#[inline]
fn round_to_pages(size: usize, page_size: usize) -> Option<usize> {
    debug_assert!(page_size.is_power_of_two());

    // Power-of-two modulus: size & (page_size - 1) == size % page_size.
    let bytes = size.max(page_size);
    match bytes & (page_size - 1) {
        0 => Some(bytes),
        // The remainder is less than the divisor, so the subtraction cannot
        // underflow; the add can, on sizes near usize::MAX.
        rem => bytes.checked_add(page_size - rem),
    }
}

#[inline]
fn validated_page_size(raw: usize) -> Result<usize, AllocError> {
    if raw.is_power_of_two() {
        Ok(raw)
    } else {
        Err(AllocError)
    }
}

#[cfg(unix)]
pub mod os {
    use super::{validated_page_size, VirtualAllocator};
    use allocator_api2::alloc::{AllocError, Allocator};
    use core::alloc::Layout;
    use core::ptr;

    pub fn page_size() -> Result<usize, AllocError> {
        // SAFETY: sysconf with a valid name is always safe to call.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if raw <= 0 {
            return Err(AllocError);
        }
        validated_page_size(raw as usize)
    }

    unsafe impl Allocator for VirtualAllocator {
        fn allocate(&self, layout: Layout) -> Result<ptr::NonNull<[u8]>, AllocError> {
            // Fresh anonymous mappings are always zeroed.
            self.allocate_zeroed(layout)
        }

        fn allocate_zeroed(&self, layout: Layout) -> Result<ptr::NonNull<[u8]>, AllocError> {
            let size = super::layout_to_page_size(layout)?;

            let null = ptr::null_mut();
            let prot = libc::PROT_READ | libc::PROT_WRITE;
            let flags = libc::MAP_PRIVATE | libc::MAP_ANON;
            // SAFETY: requesting a new private anonymous mapping, akin to
            // malloc.
            let result = unsafe { libc::mmap(null, size as libc::size_t, prot, flags, -1, 0) };

            if result == libc::MAP_FAILED {
                return Err(AllocError);
            }

            // SAFETY: without MAP_FIXED a successful mmap never returns the
            // zero page, so the address is not null.
            let addr = unsafe { ptr::NonNull::new_unchecked(result.cast()) };
            Ok(ptr::NonNull::slice_from_raw_parts(addr, size))
        }

        unsafe fn deallocate(&self, nonnull: ptr::NonNull<u8>, layout: Layout) {
            // SAFETY: the allocation would have failed if the layout didn't
            // produce a valid page size.
            let size = unsafe { super::layout_to_page_size(layout).unwrap_unchecked() };

            // SAFETY: unmapping the same range that allocate returned.
            _ = unsafe { libc::munmap(nonnull.as_ptr().cast(), size) };
        }
    }
}

#[cfg(windows)]
pub mod os {
    use super::{validated_page_size, VirtualAllocator};
    use allocator_api2::alloc::{AllocError, Allocator};
    use core::alloc::Layout;
    use core::{mem, ptr};
    use windows_sys::Win32::System::Memory;
    use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

    pub fn page_size() -> Result<usize, AllocError> {
        let mut system_info = mem::MaybeUninit::<SYSTEM_INFO>::uninit();
        // SAFETY: passing a correctly-sized uninitialized SYSTEM_INFO.
        unsafe { GetSystemInfo(system_info.as_mut_ptr()) };

        // SAFETY: GetSystemInfo is not documented to fail, so the struct
        // has been initialized.
        let system_info = unsafe { system_info.assume_init() };

        validated_page_size(system_info.dwPageSize as usize)
    }

    unsafe impl Allocator for VirtualAllocator {
        fn allocate(&self, layout: Layout) -> Result<ptr::NonNull<[u8]>, AllocError> {
            // MEM_COMMIT memory is always zeroed.
            self.allocate_zeroed(layout)
        }

        fn allocate_zeroed(&self, layout: Layout) -> Result<ptr::NonNull<[u8]>, AllocError> {
            let size = super::layout_to_page_size(layout)?;

            let null = ptr::null_mut();
            let alloc_type = Memory::MEM_COMMIT | Memory::MEM_RESERVE;
            let protection = Memory::PAGE_READWRITE;
            // SAFETY: requesting a new committed region, akin to malloc.
            let result = unsafe { Memory::VirtualAlloc(null, size, alloc_type, protection) };

            match ptr::NonNull::new(result.cast::<u8>()) {
                Some(addr) => Ok(ptr::NonNull::slice_from_raw_parts(addr, size)),
                None => Err(AllocError),
            }
        }

        unsafe fn deallocate(&self, nonnull: ptr::NonNull<u8>, _layout: Layout) {
            // SAFETY: releasing a region VirtualAlloc returned; size must be
            // zero for MEM_RELEASE.
            _ = unsafe { Memory::VirtualFree(nonnull.as_ptr().cast(), 0, Memory::MEM_RELEASE) };
        }
    }
}
