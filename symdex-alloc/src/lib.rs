// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Page-granular virtual-memory allocation for the symdex interner.
//!
//! Every allocation made through [VirtualAllocator] is backed by whole pages
//! of anonymous virtual memory, zero-filled by the operating system, and
//! pointer-stable: a region is never relocated or remapped once it has been
//! handed out. The interner relies on this to keep raw references into its
//! tables and banks alive across directory growth.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod utils;
mod virtual_alloc;

pub use virtual_alloc::*;

// Expose certain allocator_api2 things for our users.
pub use allocator_api2::alloc::{AllocError, Allocator, Layout, LayoutError};
