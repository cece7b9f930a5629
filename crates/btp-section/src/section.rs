//! The three-level section tree built once per block.
//!
//! Leaf: [`NetworkSection`] per source network. Middle: [`NetworkTypeSection`]
//! per cryptographic family. Root: [`BtpSection`] with its consensus-visible
//! digest. Everything is immutable after construction; derived bytes and
//! hashes are memoized at most once.

use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::codec::{CodecError, ListEncoder};
use crate::crypto::{module_for_uid, NetworkTypeModule, ProofContext};
use crate::digest::BtpSectionDigest;
use crate::hashes::HashesCat;
use crate::messages::MessageList;
use crate::store::{bytes_by_hash_for, list_by_merkle_root_for, SectionStore, StoreError};
use crate::types::{Network, NetworkEntry, NetworkType, NID_FILTER_BYTES, SRC_NETWORK_UID};

/// Errors raised while building or reading sections.
///
/// Any construction error aborts the whole [`BtpSection`]; a block cannot
/// commit a partially-built one.
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("unknown network type uid {uid:?}")]
    UnknownNetworkType { uid: String },
    #[error("invalid proof context for {uid:?}: {reason}")]
    InvalidProofContext { uid: String, reason: String },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ordered messages of one network, hashed and Merkle-rooted under the
/// owning type's module.
#[derive(Debug)]
pub struct NetworkSection {
    network_id: i64,
    update_number: i64,
    prev_hash: Vec<u8>,
    messages: Vec<Vec<u8>>,
    message_hashes: HashesCat,
    messages_root: Vec<u8>,
    hash: Vec<u8>,
    pub(crate) module: Arc<dyn NetworkTypeModule>,
}

impl NetworkSection {
    /// Builds the leaf section for `network_id` from the block snapshot.
    ///
    /// `network.next_message_sn` must be at least the number of messages in
    /// `entry`, and the id must fit the network-id filter.
    pub fn new(
        network_id: i64,
        network: &Network,
        entry: NetworkEntry,
        module: Arc<dyn NetworkTypeModule>,
    ) -> Result<Self, SectionError> {
        if !(0..(NID_FILTER_BYTES as i64) * 8).contains(&network_id) {
            return Err(SectionError::InvariantViolation(format!(
                "network id {} outside filter range 0..{}",
                network_id,
                NID_FILTER_BYTES * 8
            )));
        }
        let count = entry.messages.len() as i64;
        if network.next_message_sn < count {
            return Err(SectionError::InvariantViolation(format!(
                "next message sn {} below message count {}",
                network.next_message_sn, count
            )));
        }
        let mut update_number = (network.next_message_sn - count) << 1;
        if network.next_proof_context_changed {
            update_number |= 1;
        }

        let mut message_hashes = HashesCat::with_capacity(entry.messages.len(), module.hash_len());
        for msg in &entry.messages {
            message_hashes.append(&module.hash(msg))?;
        }
        let messages_root = module.merkle_root(&message_hashes);

        let mut format = ListEncoder::new();
        format
            .write_int(network_id)
            .write_int(update_number)
            .write_bytes(&network.last_network_section_hash)
            .write_int(count)
            .write_bytes(&messages_root);
        let hash = module.hash(&format.encode());

        Ok(Self {
            network_id,
            update_number,
            prev_hash: network.last_network_section_hash.clone(),
            messages: entry.messages,
            message_hashes,
            messages_root,
            hash,
            module,
        })
    }

    pub fn network_id(&self) -> i64 {
        self.network_id
    }

    /// Raw packed value: bits `[63:1]` first message sequence number, bit
    /// `[0]` proof-context-changed. Consensus serialization uses it as one
    /// integer.
    pub fn update_number(&self) -> i64 {
        self.update_number
    }

    pub fn first_message_sn(&self) -> i64 {
        self.update_number >> 1
    }

    pub fn next_proof_context_changed(&self) -> bool {
        self.update_number & 1 != 0
    }

    /// Previous block's section hash for this network, empty if none.
    pub fn prev_hash(&self) -> &[u8] {
        &self.prev_hash
    }

    pub fn message_count(&self) -> i64 {
        self.message_hashes.len() as i64
    }

    pub fn messages_root(&self) -> &[u8] {
        &self.messages_root
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// Loads the persisted message list for this section, `None` before the
    /// first flush.
    pub async fn message_list<S: SectionStore>(
        &self,
        store: Arc<S>,
    ) -> Result<Option<MessageList<S>>, SectionError> {
        MessageList::load(store, self.module.clone(), &self.messages_root).await
    }

    pub(crate) async fn flush_messages<S: SectionStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<(), SectionError> {
        store
            .put(
                &list_by_merkle_root_for(self.module.uid()),
                &self.messages_root,
                self.message_hashes.bytes(),
            )
            .await?;
        let bodies = bytes_by_hash_for(self.module.uid());
        for (i, msg) in self.messages.iter().enumerate() {
            store.put(&bodies, self.message_hashes.get(i), msg).await?;
        }
        tracing::trace!(
            network_id = self.network_id,
            messages = self.messages.len(),
            "flushed network section messages"
        );
        Ok(())
    }

    pub(crate) fn encode_digest(&self, out: &mut ListEncoder) {
        let mut e = ListEncoder::new();
        e.write_int(self.network_id)
            .write_bytes(&self.hash)
            .write_bytes(&self.messages_root);
        out.write_list(e);
    }
}

/// Sections of one cryptographic family, Merkle-rooted under its module.
#[derive(Debug)]
pub struct NetworkTypeSection {
    network_type_id: i64,
    next_proof_context: ProofContext,
    network_sections: Vec<NetworkSection>,
    network_sections_root: Vec<u8>,
    hash: Vec<u8>,
    pub(crate) module: Arc<dyn NetworkTypeModule>,
}

impl NetworkTypeSection {
    /// Builds the middle section. `sections` must be sorted by network id
    /// ascending and hashed under the module named by `network_type.uid`.
    pub fn new(
        network_type_id: i64,
        network_type: &NetworkType,
        sections: Vec<NetworkSection>,
    ) -> Result<Self, SectionError> {
        let module =
            module_for_uid(&network_type.uid).ok_or_else(|| SectionError::UnknownNetworkType {
                uid: network_type.uid.clone(),
            })?;
        for pair in sections.windows(2) {
            if pair[0].network_id() >= pair[1].network_id() {
                return Err(SectionError::InvariantViolation(format!(
                    "network sections not sorted: id {} before {}",
                    pair[0].network_id(),
                    pair[1].network_id()
                )));
            }
        }
        for section in &sections {
            if section.module.uid() != module.uid() {
                return Err(SectionError::InvariantViolation(format!(
                    "network section {} hashed under module {:?}, type {} uses {:?}",
                    section.network_id(),
                    section.module.uid(),
                    network_type_id,
                    module.uid()
                )));
            }
        }
        let next_proof_context =
            module.new_proof_context_from_bytes(&network_type.next_proof_context)?;

        let mut section_hashes = HashesCat::with_capacity(sections.len(), module.hash_len());
        for section in &sections {
            section_hashes.append(section.hash())?;
        }
        let network_sections_root = module.merkle_root(&section_hashes);

        let mut format = ListEncoder::new();
        format
            .write_bytes(next_proof_context.hash())
            .write_bytes(&network_sections_root);
        let hash = module.hash(&format.encode());

        Ok(Self {
            network_type_id,
            next_proof_context,
            network_sections: sections,
            network_sections_root,
            hash,
            module,
        })
    }

    pub fn network_type_id(&self) -> i64 {
        self.network_type_id
    }

    pub fn next_proof_context(&self) -> &ProofContext {
        &self.next_proof_context
    }

    pub fn network_sections(&self) -> &[NetworkSection] {
        &self.network_sections
    }

    pub fn network_section_for(&self, network_id: i64) -> Option<&NetworkSection> {
        self.network_sections
            .binary_search_by_key(&network_id, NetworkSection::network_id)
            .ok()
            .map(|i| &self.network_sections[i])
    }

    pub fn network_sections_root(&self) -> &[u8] {
        &self.network_sections_root
    }

    /// Merkle root of the section hashes under a foreign module, for interop
    /// queries. Recomputed on every call, never cached.
    pub fn network_sections_root_with_mod(&self, module: &dyn NetworkTypeModule) -> Vec<u8> {
        if module.uid() == self.module.uid() {
            return self.network_sections_root.clone();
        }
        let mut hashes = HashesCat::new();
        for section in &self.network_sections {
            // section hashes share one width, so append cannot fail
            hashes
                .append(section.hash())
                .expect("section hashes have equal width");
        }
        module.merkle_root(&hashes)
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// The unsigned tuple validators sign to attest this section's hash at
    /// `height`/`round`.
    pub fn new_decision(&self, height: i64, round: i32) -> Decision {
        Decision {
            src_network_id: SRC_NETWORK_UID.as_bytes().to_vec(),
            dst_type: self.network_type_id,
            height,
            round,
            network_type_section_hash: self.hash.clone(),
            module: self.module.clone(),
            bytes: OnceLock::new(),
            hash: OnceLock::new(),
        }
    }

    pub(crate) fn encode_digest(&self, out: &mut ListEncoder) {
        let mut e = ListEncoder::new();
        e.write_int(self.network_type_id).write_bytes(&self.hash);
        for section in &self.network_sections {
            section.encode_digest(&mut e);
        }
        out.write_list(e);
    }

    pub(crate) async fn flush_messages<S: SectionStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<(), SectionError> {
        for section in &self.network_sections {
            section.flush_messages(store).await?;
        }
        Ok(())
    }
}

/// Canonically-encoded tuple validators sign to commit a network-type
/// section hash. Hashing uses the type's own module.
#[derive(Debug)]
pub struct Decision {
    src_network_id: Vec<u8>,
    dst_type: i64,
    height: i64,
    round: i32,
    network_type_section_hash: Vec<u8>,
    module: Arc<dyn NetworkTypeModule>,
    bytes: OnceLock<Vec<u8>>,
    hash: OnceLock<Vec<u8>>,
}

impl Decision {
    pub fn src_network_id(&self) -> &[u8] {
        &self.src_network_id
    }

    pub fn dst_type(&self) -> i64 {
        self.dst_type
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    pub fn round(&self) -> i32 {
        self.round
    }

    pub fn network_type_section_hash(&self) -> &[u8] {
        &self.network_type_section_hash
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes.get_or_init(|| {
            let mut e = ListEncoder::new();
            e.write_bytes(&self.src_network_id)
                .write_int(self.dst_type)
                .write_int(self.height)
                .write_int(i64::from(self.round))
                .write_bytes(&self.network_type_section_hash);
            e.encode()
        })
    }

    pub fn hash(&self) -> &[u8] {
        self.hash.get_or_init(|| self.module.hash(self.bytes()))
    }
}

/// Root of the per-block section tree.
#[derive(Debug)]
pub struct BtpSection {
    sections: Arc<Vec<NetworkTypeSection>>,
    digest: BtpSectionDigest,
}

impl BtpSection {
    /// Wraps type sections sorted by id ascending.
    pub fn new(sections: Vec<NetworkTypeSection>) -> Result<Self, SectionError> {
        for pair in sections.windows(2) {
            if pair[0].network_type_id() >= pair[1].network_type_id() {
                return Err(SectionError::InvariantViolation(format!(
                    "network type sections not sorted: id {} before {}",
                    pair[0].network_type_id(),
                    pair[1].network_type_id()
                )));
            }
        }
        let sections = Arc::new(sections);
        let digest = BtpSectionDigest::new(sections.clone());
        Ok(Self { sections, digest })
    }

    pub fn network_type_sections(&self) -> &[NetworkTypeSection] {
        &self.sections
    }

    pub fn network_type_section_for(&self, network_type_id: i64) -> Option<&NetworkTypeSection> {
        self.sections
            .binary_search_by_key(&network_type_id, NetworkTypeSection::network_type_id)
            .ok()
            .map(|i| &self.sections[i])
    }

    /// The consensus-visible digest of this section.
    pub fn digest(&self) -> &BtpSectionDigest {
        &self.digest
    }
}
