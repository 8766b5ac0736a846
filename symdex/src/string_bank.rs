// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Append-only off-heap storage for key bytes.
//!
//! Keys are written into page-backed chunks as a varint length prefix
//! followed by the bytes. Saving returns a stable offset that encodes the
//! chunk and the position within it; the chunk never moves, so lookups are
//! zero-copy slices into the mapping.

use core::ptr::NonNull;
use core::slice;
use symdex_alloc::VirtualAllocator;

/// Chunks are 1 MiB unless a single key needs more, in which case it gets a
/// dedicated page-rounded chunk of its own.
const CHUNK_SHIFT: usize = 20;
const CHUNK_SIZE: usize = 1 << CHUNK_SHIFT;
const CHUNK_MASK: usize = CHUNK_SIZE - 1;

struct Chunk {
    data: NonNull<u8>,
    /// Reserved bytes; `CHUNK_SIZE` rounded up to pages, or more for an
    /// oversized key.
    size: usize,
}

pub(crate) struct StringBank {
    chunks: Vec<Chunk>,
    /// Write position within the last chunk.
    head: usize,
    /// Total reserved bytes across all chunks.
    reserved: usize,
}

/// Bytes needed for the varint encoding of `n`.
#[inline]
fn varint_len(n: usize) -> usize {
    let bits = usize::BITS - n.leading_zeros();
    1 + (bits.saturating_sub(1) / 7) as usize
}

/// LEB128-encodes `n` into the front of `dst`, returning the encoded width.
fn encode_len(mut n: usize, dst: &mut [u8]) -> usize {
    let mut written = 0;
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            dst[written] = byte;
            return written + 1;
        }
        dst[written] = byte | 0x80;
        written += 1;
    }
}

/// Decodes a LEB128 length from the front of `src`, returning the value and
/// the encoded width.
fn decode_len(src: &[u8]) -> (usize, usize) {
    let mut value = 0usize;
    let mut shift = 0;
    for (i, &byte) in src.iter().enumerate() {
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return (value, i + 1);
        }
        shift += 7;
    }
    panic!("truncated length prefix in string bank");
}

impl StringBank {
    pub(crate) fn new() -> Self {
        Self {
            chunks: Vec::new(),
            head: 0,
            reserved: 0,
        }
    }

    fn push_chunk(&mut self, min_size: usize) {
        let region = VirtualAllocator
            .alloc_array_zeroed::<u8>(min_size)
            .expect("allocating a string bank chunk to succeed");
        self.chunks.push(Chunk {
            data: region.cast::<u8>(),
            size: region.len(),
        });
        self.reserved += region.len();
        self.head = 0;
    }

    fn chunk_bytes_mut(&mut self, index: usize) -> &mut [u8] {
        let chunk = &self.chunks[index];
        // SAFETY: the chunk's mapping covers size bytes and we have
        // exclusive access.
        unsafe { slice::from_raw_parts_mut(chunk.data.as_ptr(), chunk.size) }
    }

    /// Stores a key and returns its offset. Offsets never move or expire
    /// while the bank is alive.
    pub(crate) fn save(&mut self, key: &[u8]) -> usize {
        let needed = varint_len(key.len()) + key.len();
        if needed > CHUNK_SIZE {
            // Dedicated chunk; the tail of the current chunk is abandoned.
            self.push_chunk(needed);
        } else if self.chunks.is_empty() || self.head + needed > CHUNK_SIZE {
            // The head sits past CHUNK_SIZE when the last chunk was an
            // oversized one, which also lands here.
            self.push_chunk(CHUNK_SIZE);
        }

        let chunk_index = self.chunks.len() - 1;
        let within = self.head;
        let buf = &mut self.chunk_bytes_mut(chunk_index)[within..];
        let prefix = encode_len(key.len(), buf);
        buf[prefix..prefix + key.len()].copy_from_slice(key);

        self.head = within + needed;
        (chunk_index << CHUNK_SHIFT) | within
    }

    /// The key previously saved at `offset`, as a slice sharing the bank's
    /// storage.
    pub(crate) fn get(&self, offset: usize) -> &[u8] {
        let chunk = &self.chunks[offset >> CHUNK_SHIFT];
        let within = offset & CHUNK_MASK;
        // SAFETY: the chunk's mapping covers size bytes, is initialized,
        // and only grows in content, never shrinks or moves.
        let bytes = unsafe { slice::from_raw_parts(chunk.data.as_ptr(), chunk.size) };
        let (len, prefix) = decode_len(&bytes[within..]);
        &bytes[within + prefix..within + prefix + len]
    }

    /// Reserved storage in bytes. An over-estimate of the stored content:
    /// abandoned chunk tails and page rounding are included.
    pub(crate) fn size(&self) -> usize {
        self.reserved
    }
}

impl Drop for StringBank {
    fn drop(&mut self) {
        for chunk in self.chunks.drain(..) {
            // SAFETY: size is the chunk's mapped length, which page-rounds
            // to the same region the allocation produced; each chunk is
            // freed once.
            unsafe { VirtualAllocator.free_array::<u8>(chunk.data, chunk.size) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip() {
        let mut buf = [0u8; 12];
        for n in [0usize, 1, 0x7f, 0x80, 0x3fff, 0x4000, 1 << 20, usize::MAX] {
            let written = encode_len(n, &mut buf);
            assert_eq!(written, varint_len(n));
            assert_eq!(decode_len(&buf), (n, written));
        }
    }

    #[test]
    fn save_and_get() {
        let mut bank = StringBank::new();
        let a = bank.save(b"a1");
        let b = bank.save(b"");
        let c = bank.save(b"a slightly longer symbol name");

        assert_eq!(bank.get(a), b"a1");
        assert_eq!(bank.get(b), b"");
        assert_eq!(bank.get(c), b"a slightly longer symbol name");
    }

    #[test]
    fn offsets_survive_chunk_rollover() {
        let mut bank = StringBank::new();
        let key = [0x5au8; 4000];
        let mut offsets = Vec::new();
        // Well past one chunk of content.
        for _ in 0..1000 {
            offsets.push(bank.save(&key));
        }
        assert!(bank.size() > CHUNK_SIZE);
        for offset in offsets {
            assert_eq!(bank.get(offset), &key);
        }
    }

    #[test]
    fn oversized_key_gets_a_dedicated_chunk() {
        let mut bank = StringBank::new();
        let small = bank.save(b"before");
        let big_key = vec![7u8; 2 * CHUNK_SIZE];
        let big = bank.save(&big_key);
        let after = bank.save(b"after");

        assert_eq!(bank.get(small), b"before");
        assert_eq!(bank.get(big), &big_key[..]);
        assert_eq!(bank.get(after), b"after");
        assert!(bank.size() >= 2 * CHUNK_SIZE);
    }

    #[test]
    fn size_reports_reserved_bytes() {
        let mut bank = StringBank::new();
        assert_eq!(bank.size(), 0);
        bank.save(b"x");
        assert_eq!(bank.size(), CHUNK_SIZE);
    }
}
