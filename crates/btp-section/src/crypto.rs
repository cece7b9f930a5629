//! Pluggable per-network-type cryptography.
//!
//! Each network type family brings its own hash function and, through it, its
//! own Merkle construction and proof-context codec. Modules are looked up by
//! a short UID string from a process-wide registry populated at startup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use sha3::{Digest, Keccak256, Sha3_256};

use crate::hashes::HashesCat;
use crate::section::SectionError;

/// Validator-set-and-rules snapshot receivers use to verify next-term proofs.
///
/// The bytes are opaque at this layer; only their module hash matters for
/// section hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofContext {
    bytes: Vec<u8>,
    hash: Vec<u8>,
}

impl ProofContext {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }
}

/// Cryptographic capability set of one network type family.
pub trait NetworkTypeModule: Send + Sync + std::fmt::Debug {
    /// Registry key, e.g. `"icon"` or `"eth"`.
    fn uid(&self) -> &'static str;

    /// Output width of [`NetworkTypeModule::hash`] in bytes.
    fn hash_len(&self) -> usize;

    fn hash(&self, data: &[u8]) -> Vec<u8>;

    /// Deterministic, order-dependent Merkle root over fixed-width hashes.
    ///
    /// Callers must not assume the internal tree shape. The root of empty
    /// input is stable: the all-zero hash of this module's width.
    fn merkle_root(&self, hashes: &HashesCat) -> Vec<u8> {
        binary_merkle_root(self.dyn_ref(), hashes)
    }

    fn new_proof_context_from_bytes(&self, bytes: &[u8]) -> Result<ProofContext, SectionError> {
        if bytes.is_empty() {
            return Err(SectionError::InvalidProofContext {
                uid: self.uid().to_string(),
                reason: "empty proof context".into(),
            });
        }
        Ok(ProofContext {
            hash: self.hash(bytes),
            bytes: bytes.to_vec(),
        })
    }

    /// Object-safe self borrow for default method implementations.
    fn dyn_ref(&self) -> &dyn NetworkTypeModule;
}

fn hash_pair(module: &dyn NetworkTypeModule, left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(left.len() + right.len());
    buf.extend_from_slice(left);
    buf.extend_from_slice(right);
    module.hash(&buf)
}

/// Binary Merkle root: levels pair up left-to-right, an odd tail node pairs
/// with the current level's pad hash (`pad(0)` = zero hash, `pad(n + 1)` =
/// `H(pad(n) || pad(n))`). A single leaf is its own root.
pub fn binary_merkle_root(module: &dyn NetworkTypeModule, hashes: &HashesCat) -> Vec<u8> {
    let n = hashes.len();
    if n == 0 {
        return vec![0; module.hash_len()];
    }
    let mut level: Vec<Vec<u8>> = (0..n).map(|i| hashes.get(i).to_vec()).collect();
    let mut pad = vec![0u8; module.hash_len()];
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(hash_pair(module, left, right)),
                [left] => next.push(hash_pair(module, left, &pad)),
                _ => unreachable!(),
            }
        }
        pad = hash_pair(module, &pad, &pad);
        level = next;
    }
    level.pop().unwrap()
}

/// SHA3-256 module for the icon network type family.
#[derive(Debug, Default)]
pub struct IconModule;

impl NetworkTypeModule for IconModule {
    fn uid(&self) -> &'static str {
        "icon"
    }

    fn hash_len(&self) -> usize {
        32
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Sha3_256::digest(data).to_vec()
    }

    fn dyn_ref(&self) -> &dyn NetworkTypeModule {
        self
    }
}

/// Keccak-256 module for the eth network type family.
#[derive(Debug, Default)]
pub struct EthModule;

impl NetworkTypeModule for EthModule {
    fn uid(&self) -> &'static str {
        "eth"
    }

    fn hash_len(&self) -> usize {
        32
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        Keccak256::digest(data).to_vec()
    }

    fn dyn_ref(&self) -> &dyn NetworkTypeModule {
        self
    }
}

/// SHA3-256 of `data`; the algorithm fixed for the digest outer hash,
/// independent of any network type module.
pub fn sha3_256(data: &[u8]) -> Vec<u8> {
    Sha3_256::digest(data).to_vec()
}

fn registry() -> &'static RwLock<HashMap<String, Arc<dyn NetworkTypeModule>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<dyn NetworkTypeModule>>>> =
        OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Installs a module under its UID, replacing any previous registration.
pub fn register_module(module: Arc<dyn NetworkTypeModule>) {
    registry()
        .write()
        .unwrap()
        .insert(module.uid().to_string(), module);
}

/// Installs the built-in `icon` and `eth` modules. Call once at startup.
pub fn register_builtin_modules() {
    register_module(Arc::new(IconModule));
    register_module(Arc::new(EthModule));
}

pub fn module_for_uid(uid: &str) -> Option<Arc<dyn NetworkTypeModule>> {
    registry().read().unwrap().get(uid).cloned()
}
