// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! An off-heap bidirectional symbol interner.
//!
//! [SymbolTable] assigns monotonically increasing 32-bit sequence numbers
//! to distinct byte-string keys and maps in both directions. It is built
//! for high insert/lookup throughput with minimal allocator traffic on the
//! managed heap: the index is a SwissTable-style open-addressed structure
//! probing groups of eight slots in parallel, sharded over fixed-size
//! tables by an extendible-hashing directory so that growth never rehashes
//! globally. Keys, tables and the reverse map all live in page-backed
//! virtual-memory regions.
//!
//! ```
//! use symdex::SymbolTable;
//!
//! let mut symbols = SymbolTable::new();
//! let (seq, found) = symbols.intern(b"10293-ahdb-28383-555", true);
//! assert!(!found);
//! assert_eq!(symbols.lookup_sequence(seq), b"10293-ahdb-28383-555");
//! ```
//!
//! A `SymbolTable` is single-threaded: callers needing shared access must
//! serialize externally or shard across independent tables. Deletion and
//! sequence recycling are not supported.

mod directory;
mod group;
mod hash;
mod int_bank;
mod string_bank;
mod symbols;
mod table;

pub use symbols::SymbolTable;
