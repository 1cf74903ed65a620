// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HardValidationError;

/// Smallest ring buffer accepted by any participant.
pub const MIN_CAPACITY: u32 = 1;
/// Largest ring buffer accepted by any participant.
pub const MAX_CAPACITY: u32 = 10_000;

/// Maximum length of a segment name, excluding the leading slash.
const MAX_SEGMENT_NAME_LEN: usize = 250;

/// Validated ring buffer slot count.
/// Must be in range 1-10000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Capacity(u32);

impl Capacity {
    /// Create a new Capacity with bounds validation.
    ///
    /// Takes a signed value so that negative command-line input is reported
    /// as an invalid capacity rather than as a parse failure.
    pub fn new(slots: i64) -> Result<Self, HardValidationError> {
        if !(i64::from(MIN_CAPACITY)..=i64::from(MAX_CAPACITY)).contains(&slots) {
            return Err(HardValidationError::InvalidCapacity {
                value: slots,
                min: MIN_CAPACITY,
                max: MAX_CAPACITY,
            });
        }
        Ok(Self(slots as u32))
    }

    /// Get the slot count.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Slot count as a `usize`, for offset arithmetic.
    pub fn slots(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} slots", self.0)
    }
}

impl TryFrom<i64> for Capacity {
    type Error = HardValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Capacity> for u32 {
    fn from(capacity: Capacity) -> Self {
        capacity.0
    }
}

/// Validated shared memory segment name.
///
/// Accepted with or without a leading `/`; stored without it. Must be
/// non-empty, contain no further `/` and no NUL byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SegmentName(String);

impl SegmentName {
    /// Create a new SegmentName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, HardValidationError> {
        let raw = name.into();
        let name = raw.strip_prefix('/').unwrap_or(&raw).to_string();

        let invalid = |reason: &str| HardValidationError::InvalidSegmentName {
            name: raw.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("Segment name cannot be empty"));
        }
        if name.len() > MAX_SEGMENT_NAME_LEN {
            return Err(invalid(&format!(
                "Segment name too long: {} bytes (max {})",
                name.len(),
                MAX_SEGMENT_NAME_LEN
            )));
        }
        if name.contains('/') {
            return Err(invalid("Segment name may only contain a leading '/'"));
        }
        if name.contains('\0') {
            return Err(invalid("Segment name cannot contain NUL bytes"));
        }

        Ok(Self(name))
    }

    /// Get the name without the leading slash.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name in the form expected by `shm_open`.
    pub fn os_name(&self) -> String {
        format!("/{}", self.0)
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SegmentName {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SegmentName {
    type Error = HardValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SegmentName> for String {
    fn from(name: SegmentName) -> Self {
        name.0
    }
}

/// Single-byte XOR key shared by producers and consumers of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u8")]
pub struct XorKey(u8);

impl XorKey {
    pub const fn new(key: u8) -> Self {
        Self(key)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for XorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

impl TryFrom<u16> for XorKey {
    type Error = HardValidationError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map(Self)
            .map_err(|_| HardValidationError::InvalidFieldValue {
                field: "key",
                value: value.to_string(),
                reason: "Key must fit in a single byte (0-255)".to_string(),
            })
    }
}

impl From<XorKey> for u8 {
    fn from(key: XorKey) -> Self {
        key.0
    }
}

impl FromStr for XorKey {
    type Err = HardValidationError;

    /// Parse a key written in decimal (`42`) or hex (`0x2A`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => trimmed.parse::<u8>(),
        };

        parsed
            .map(Self)
            .map_err(|e| HardValidationError::InvalidFieldValue {
                field: "key",
                value: s.to_string(),
                reason: format!("Key must be a byte in decimal or 0x hex: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bounds() {
        assert!(Capacity::new(0).is_err());
        assert!(Capacity::new(-5).is_err());
        assert!(Capacity::new(10001).is_err());
        assert_eq!(Capacity::new(1).unwrap().get(), 1);
        assert_eq!(Capacity::new(10000).unwrap().get(), 10000);
    }

    #[test]
    fn test_capacity_error_variant() {
        let err = Capacity::new(-5).unwrap_err();
        assert!(matches!(
            err,
            HardValidationError::InvalidCapacity { value: -5, .. }
        ));
    }

    #[test]
    fn test_segment_name_validation() {
        assert_eq!(SegmentName::new("/demo").unwrap().as_str(), "demo");
        assert_eq!(SegmentName::new("demo").unwrap().os_name(), "/demo");
        assert!(SegmentName::new("").is_err());
        assert!(SegmentName::new("/").is_err());
        assert!(SegmentName::new("a/b").is_err());
        assert!(SegmentName::new("nul\0byte").is_err());
        assert!(SegmentName::new("x".repeat(251)).is_err());
    }

    #[test]
    fn test_xor_key_parsing() {
        assert_eq!("42".parse::<XorKey>().unwrap().value(), 42);
        assert_eq!("0x2A".parse::<XorKey>().unwrap().value(), 0x2A);
        assert_eq!("0".parse::<XorKey>().unwrap().value(), 0);
        assert!("256".parse::<XorKey>().is_err());
        assert!("-1".parse::<XorKey>().is_err());
        assert!("0xZZ".parse::<XorKey>().is_err());
    }

    #[test]
    fn test_xor_key_display() {
        assert_eq!(XorKey::new(0x2A).to_string(), "0x2A");
    }
}
