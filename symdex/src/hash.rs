// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Key hashing.
//!
//! The index wants 32 bits with uniform dispersion everywhere: the top bits
//! select the directory slot, the middle bits the starting group, and the
//! low 7 the control tag. xxh3 delivers that; the 64-bit digest is
//! truncated to its low half.

use xxhash_rust::xxh3::xxh3_64;

pub(crate) type HashValue = u32;

#[inline]
pub(crate) fn hash_key(key: &[u8]) -> HashValue {
    xxh3_64(key) as HashValue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        assert_eq!(hash_key(b"symbol"), hash_key(b"symbol"));
        assert_eq!(hash_key(b""), hash_key(b""));
        assert_ne!(hash_key(b"symbol"), hash_key(b"symbol2"));
    }
}
