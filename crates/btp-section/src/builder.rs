//! Per-block accumulator turning executor output into a [`BtpSection`].
//!
//! The block executor declares the active network types and networks, feeds
//! outbound messages in emission order, and finally calls
//! [`SectionBuilder::build`]. Ordered maps keyed by id give the ascending
//! sort that makes hashes reproducible on every replica.

use std::collections::BTreeMap;

use tracing::debug;

use crate::crypto::module_for_uid;
use crate::section::{BtpSection, NetworkSection, NetworkTypeSection, SectionError};
use crate::types::{Network, NetworkEntry, NetworkType};

#[derive(Debug)]
struct TypeAccumulator {
    network_type: NetworkType,
    networks: BTreeMap<i64, NetworkAccumulator>,
}

#[derive(Debug)]
struct NetworkAccumulator {
    network: Network,
    entry: NetworkEntry,
}

/// Collects one block's outbound messages, then builds the section tree.
#[derive(Debug, Default)]
pub struct SectionBuilder {
    types: BTreeMap<i64, TypeAccumulator>,
}

impl SectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a network type for this block. Declaring the same id again
    /// replaces its snapshot.
    pub fn ensure_network_type(&mut self, network_type_id: i64, network_type: NetworkType) {
        self.types
            .entry(network_type_id)
            .and_modify(|acc| acc.network_type = network_type.clone())
            .or_insert_with(|| TypeAccumulator {
                network_type,
                networks: BTreeMap::new(),
            });
    }

    /// Declares an active network under a previously declared type.
    pub fn ensure_network(
        &mut self,
        network_type_id: i64,
        network_id: i64,
        network: Network,
    ) -> Result<(), SectionError> {
        let acc = self.types.get_mut(&network_type_id).ok_or_else(|| {
            SectionError::InvariantViolation(format!(
                "network type {} not declared",
                network_type_id
            ))
        })?;
        acc.networks
            .entry(network_id)
            .and_modify(|n| n.network = network.clone())
            .or_insert_with(|| NetworkAccumulator {
                network,
                entry: NetworkEntry::new(),
            });
        Ok(())
    }

    /// Appends an outbound message; call order is emission order and is part
    /// of the consensus hash.
    pub fn send_message(
        &mut self,
        network_type_id: i64,
        network_id: i64,
        payload: Vec<u8>,
    ) -> Result<(), SectionError> {
        let acc = self
            .types
            .get_mut(&network_type_id)
            .and_then(|t| t.networks.get_mut(&network_id))
            .ok_or_else(|| {
                SectionError::InvariantViolation(format!(
                    "network {}/{} not declared",
                    network_type_id, network_id
                ))
            })?;
        acc.entry.push(payload);
        Ok(())
    }

    /// Builds the immutable section tree. Types with no active networks are
    /// dropped; a block where nothing happened yields an empty section.
    pub fn build(self) -> Result<BtpSection, SectionError> {
        let mut type_sections = Vec::with_capacity(self.types.len());
        let mut network_count = 0usize;
        let mut message_count = 0usize;
        for (ntid, acc) in self.types {
            if acc.networks.is_empty() {
                continue;
            }
            let module = module_for_uid(&acc.network_type.uid).ok_or_else(|| {
                SectionError::UnknownNetworkType {
                    uid: acc.network_type.uid.clone(),
                }
            })?;
            let mut sections = Vec::with_capacity(acc.networks.len());
            for (nid, n) in acc.networks {
                network_count += 1;
                message_count += n.entry.len();
                sections.push(NetworkSection::new(nid, &n.network, n.entry, module.clone())?);
            }
            type_sections.push(NetworkTypeSection::new(ntid, &acc.network_type, sections)?);
        }
        let section = BtpSection::new(type_sections)?;
        debug!(
            network_types = section.network_type_sections().len(),
            networks = network_count,
            messages = message_count,
            "built btp section"
        );
        Ok(section)
    }
}
