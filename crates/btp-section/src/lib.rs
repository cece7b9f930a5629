//! BTP Section builder - Merkle-hashed cross-chain message aggregation
//!
//! Aggregates the outbound cross-chain messages produced during a block into
//! a commit-ready, content-addressed artifact. Network sections (one per
//! source network) roll up into network type sections (one per cryptographic
//! family), which roll up into the block's BTP section and its
//! consensus-visible digest.
//!
//! # Core Concepts
//!
//! - **Network section**: ordered messages of one network, hashed and
//!   Merkle-rooted under the owning type's module
//! - **Network type section**: sections of one family plus the next-term
//!   proof context, rooted under the family's module
//! - **Digest**: canonical serialization of the whole section; its hash
//!   (SHA3-256, module-independent) is what consensus commits
//! - **Flush**: content-addressed persistence; every key is the hash of its
//!   value, so retries are safe
//!
//! # Example
//!
//! ```rust
//! use btp_section::{register_builtin_modules, Network, NetworkType, SectionBuilder};
//!
//! fn main() -> Result<(), btp_section::SectionError> {
//!     register_builtin_modules();
//!
//!     let mut builder = SectionBuilder::new();
//!     builder.ensure_network_type(0, NetworkType::new("icon", b"proof context".to_vec()));
//!     builder.ensure_network(0, 7, Network::new(1))?;
//!     builder.send_message(0, 7, vec![0xaa])?;
//!
//!     let section = builder.build()?;
//!     let digest = section.digest();
//!     assert_eq!(digest.hash().len(), 32);
//!     assert!(digest.network_section_filter().test(7));
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod codec;
pub mod crypto;
pub mod digest;
pub mod filter;
pub mod hashes;
pub mod lock;
pub mod messages;
pub mod section;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use builder::SectionBuilder;
pub use codec::{int_from_bytes, int_to_bytes, CodecError, Decoder, ListEncoder};
pub use crypto::{
    binary_merkle_root, module_for_uid, register_builtin_modules, register_module, sha3_256,
    EthModule, IconModule, NetworkTypeModule, ProofContext,
};
pub use digest::{
    BtpSectionDigest, DecodedBtpDigest, DecodedNetworkDigest, DecodedNetworkTypeDigest,
    NetworkDigest, NetworkTypeDigest,
};
pub use filter::BitSetFilter;
pub use hashes::HashesCat;
pub use lock::{AutoCallGuard, AutoCallMutex, AutoLock};
pub use messages::MessageList;
pub use section::{BtpSection, Decision, NetworkSection, NetworkTypeSection, SectionError};
pub use store::{
    bytes_by_hash_for, list_by_merkle_root_for, MemoryStore, SectionStore, StoreError,
    BYTES_BY_HASH,
};
pub use types::{Network, NetworkEntry, NetworkType, NID_FILTER_BYTES, SRC_NETWORK_UID};
