//! Block-level inputs to section building.
//!
//! These records are snapshots handed over by the block executor once all
//! transactions of a block have run. Everything derived from them (sections,
//! digests, hashes) is immutable after construction.

/// Source network id used in decisions signed by validators of this chain.
pub const SRC_NETWORK_UID: &str = "icon";

/// Width of the per-block network-id bit-set filter in bytes.
///
/// Covers network ids `0..NID_FILTER_BYTES * 8`; a network outside that range
/// is a configuration error and fails section construction.
pub const NID_FILTER_BYTES: usize = 32;

/// Per-network state as of the end of the block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Network {
    /// Sequence number the next outbound message of this network will get.
    pub next_message_sn: i64,
    /// True if the proof context of the owning network type changed this block.
    pub next_proof_context_changed: bool,
    /// Hash of this network's section in the previous block, empty if none.
    pub last_network_section_hash: Vec<u8>,
}

impl Network {
    pub fn new(next_message_sn: i64) -> Self {
        Self {
            next_message_sn,
            next_proof_context_changed: false,
            last_network_section_hash: Vec::new(),
        }
    }

    pub fn with_proof_context_changed(mut self) -> Self {
        self.next_proof_context_changed = true;
        self
    }

    pub fn with_last_section_hash(mut self, hash: Vec<u8>) -> Self {
        self.last_network_section_hash = hash;
        self
    }
}

/// Messages a network emitted during the block, in emission order.
///
/// The order is part of the consensus hash and must not be disturbed.
#[derive(Debug, Clone, Default)]
pub struct NetworkEntry {
    pub messages: Vec<Vec<u8>>,
}

impl NetworkEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Vec<u8>) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A family of networks sharing one cryptographic module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkType {
    /// Selects the cryptographic module (hash, Merkle, proof context codec).
    pub uid: String,
    /// Encoded proof context receivers use to verify next-term proofs.
    pub next_proof_context: Vec<u8>,
}

impl NetworkType {
    pub fn new(uid: impl Into<String>, next_proof_context: Vec<u8>) -> Self {
        Self {
            uid: uid.into(),
            next_proof_context,
        }
    }
}
