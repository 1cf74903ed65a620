// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Per-byte XOR transform applied by producers on write and consumers on read.
//!
//! This is an obfuscation step, not a security mechanism: a single-byte
//! repeating key is recovered from any one known plaintext byte.

use crate::types::XorKey;

/// Transform a plaintext byte before it is stored in a slot.
#[inline]
pub fn encrypt(byte: u8, key: XorKey) -> u8 {
    byte ^ key.value()
}

/// Invert [`encrypt`]. XOR is an involution, so both directions are identical.
#[inline]
pub fn decrypt(byte: u8, key: XorKey) -> u8 {
    byte ^ key.value()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_bytes_all_keys() {
        for key in 0..=u8::MAX {
            let key = XorKey::new(key);
            for byte in 0..=u8::MAX {
                assert_eq!(decrypt(encrypt(byte, key), key), byte);
            }
        }
    }

    #[test]
    fn test_zero_key_is_identity() {
        let key = XorKey::new(0);
        for byte in 0..=u8::MAX {
            assert_eq!(encrypt(byte, key), byte);
        }
    }

    #[test]
    fn test_known_ciphertext() {
        let key = XorKey::new(0x2A);
        assert_eq!(encrypt(b'A', key), 0x41 ^ 0x2A);
        assert_eq!(encrypt(b'A', key), 0x6B);
    }
}
