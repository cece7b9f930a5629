//! Packed store for fixed-width hashes.
//!
//! One contiguous buffer feeds Merkle computation without per-hash allocation
//! and doubles as the persisted list value keyed by the Merkle root.

use crate::section::SectionError;

/// N equal-width hashes stored back-to-back. The width is fixed by the first
/// append; widths must never mix within one store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashesCat {
    bytes: Vec<u8>,
    unit: usize,
}

impl HashesCat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the buffer for `count` hashes of `unit` bytes each.
    pub fn with_capacity(count: usize, unit: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(count * unit),
            unit: 0,
        }
    }

    /// Reinterprets an existing buffer as `unit`-wide hashes.
    pub fn from_bytes(bytes: Vec<u8>, unit: usize) -> Result<Self, SectionError> {
        if unit == 0 || bytes.len() % unit != 0 {
            return Err(SectionError::InvariantViolation(format!(
                "hash list length {} is not a multiple of hash width {}",
                bytes.len(),
                unit
            )));
        }
        Ok(Self { bytes, unit })
    }

    pub fn append(&mut self, hash: &[u8]) -> Result<(), SectionError> {
        if self.unit == 0 {
            if hash.is_empty() {
                return Err(SectionError::InvariantViolation(
                    "zero-width hash appended".into(),
                ));
            }
            self.unit = hash.len();
        } else if hash.len() != self.unit {
            return Err(SectionError::InvariantViolation(format!(
                "hash width mismatch: store holds {}-byte hashes, got {}",
                self.unit,
                hash.len()
            )));
        }
        self.bytes.extend_from_slice(hash);
        Ok(())
    }

    pub fn len(&self) -> usize {
        if self.unit == 0 {
            0
        } else {
            self.bytes.len() / self.unit
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hash width in bytes, zero before the first append.
    pub fn unit(&self) -> usize {
        self.unit
    }

    pub fn get(&self, i: usize) -> &[u8] {
        &self.bytes[i * self.unit..(i + 1) * self.unit]
    }

    /// The whole packed buffer, as persisted under the Merkle root key.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
