// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain data model shared by the listener, poller and catch-up pipeline.
//!
//! Relay-chain and parachain payloads arrive SCALE-encoded; the structs here
//! carry the codec derives so the rest of the crate only handles decoded values.

use crate::crypto::keccak256;
use crate::error::{RelayError, RelayResult};
use ethers::types::{Address as EthAddress, H256};
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parachain heads recorded in one relay-chain block, keyed by parachain id.
pub type ParaHeads = BTreeMap<u32, Vec<u8>>;

/// Outbound message channels from the parachain to Ethereum
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    Basic,
    Incentivized,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Basic, ChannelId::Incentivized];

    /// Parachain pallet that owns the channel's outbound nonce
    pub fn outbound_pallet(&self) -> &'static str {
        match self {
            ChannelId::Basic => "BasicOutboundModule",
            ChannelId::Incentivized => "IncentivizedOutboundModule",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Basic => write!(f, "basic"),
            ChannelId::Incentivized => write!(f, "incentivized"),
        }
    }
}

/// Stable identity of a BEEFY commitment, independent of delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitmentId {
    pub validator_set_id: u64,
    pub block_number: u32,
}

impl CommitmentId {
    pub fn new(block_number: u32, validator_set_id: u64) -> Self {
        Self {
            validator_set_id,
            block_number,
        }
    }
}

impl fmt::Display for CommitmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.validator_set_id, self.block_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Commitment {
    /// MMR root the validators signed over
    pub payload: [u8; 32],
    pub block_number: u32,
    pub validator_set_id: u64,
}

/// A BEEFY commitment with the sparse list of validator signatures
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SignedCommitment {
    pub commitment: Commitment,
    /// Indexed by validator position; `None` where the validator did not sign
    pub signatures: Vec<Option<[u8; 65]>>,
}

impl SignedCommitment {
    /// Decode the hex string delivered by the justification subscription
    pub fn decode_hex(encoded: &str) -> RelayResult<Self> {
        let trimmed = encoded.trim().trim_start_matches("0x");
        let bytes = hex::decode(trimmed)?;
        let mut input = bytes.as_slice();
        let decoded = Self::decode(&mut input)?;
        if !input.is_empty() {
            return Err(RelayError::Decode(format!(
                "{} trailing bytes after signed commitment",
                input.len()
            )));
        }
        Ok(decoded)
    }

    pub fn id(&self) -> CommitmentId {
        CommitmentId::new(
            self.commitment.block_number,
            self.commitment.validator_set_id,
        )
    }

    pub fn mmr_root(&self) -> H256 {
        H256::from(self.commitment.payload)
    }

    pub fn block_number(&self) -> u32 {
        self.commitment.block_number
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.iter().filter(|s| s.is_some()).count()
    }
}

/// Substrate digest log, restricted to the variants a parachain header carries
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum DigestItem {
    #[codec(index = 0)]
    Other(Vec<u8>),
    #[codec(index = 4)]
    Consensus([u8; 4], Vec<u8>),
    #[codec(index = 5)]
    Seal([u8; 4], Vec<u8>),
    #[codec(index = 6)]
    PreRuntime([u8; 4], Vec<u8>),
    #[codec(index = 8)]
    RuntimeEnvironmentUpdated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Digest {
    pub logs: Vec<DigestItem>,
}

/// Channel commitment announced in a parachain header's `Other` digest log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum AuxiliaryDigestItem {
    Commitment(ChannelId, [u8; 32]),
}

/// Decoded form of [`AuxiliaryDigestItem::Commitment`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentDigest {
    pub channel_id: ChannelId,
    pub commitment_hash: H256,
}

/// Parachain block header as stored in the relay chain's para heads
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ParaHeader {
    pub parent_hash: [u8; 32],
    #[codec(compact)]
    pub number: u32,
    pub state_root: [u8; 32],
    pub extrinsics_root: [u8; 32],
    pub digest: Digest,
}

impl ParaHeader {
    /// Decode opaque head data fetched from the relay chain
    pub fn decode_head(head: &[u8]) -> RelayResult<Self> {
        let mut input = head;
        Ok(Self::decode(&mut input)?)
    }

    /// Channel commitments carried in `Other` logs; unrelated logs are skipped
    pub fn commitment_digests(&self) -> RelayResult<Vec<CommitmentDigest>> {
        let mut items = Vec::new();
        for log in &self.digest.logs {
            if let DigestItem::Other(data) = log {
                let AuxiliaryDigestItem::Commitment(channel_id, hash) =
                    AuxiliaryDigestItem::decode(&mut data.as_slice())?;
                items.push(CommitmentDigest {
                    channel_id,
                    commitment_hash: H256::from(hash),
                });
            }
        }
        Ok(items)
    }
}

/// A message emitted on a parachain outbound channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub target: EthAddress,
    pub nonce: u64,
    /// Always zero on the basic channel
    pub fee: u128,
    pub payload: Vec<u8>,
}

/// Messages committed by one channel commitment, with their raw encoding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageBatch {
    pub messages: Vec<OutboundMessage>,
    pub data: Vec<u8>,
}

impl MessageBatch {
    pub fn min_nonce(&self) -> Option<u64> {
        self.messages.iter().map(|m| m.nonce).min()
    }

    pub fn max_nonce(&self) -> Option<u64> {
        self.messages.iter().map(|m| m.nonce).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BeefyNextAuthoritySet {
    pub id: u64,
    pub len: u32,
    pub root: [u8; 32],
}

/// Leaf appended to the relay chain's MMR once per block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct MmrLeaf {
    pub version: u8,
    pub parent_number_and_hash: (u32, [u8; 32]),
    pub beefy_next_authority_set: BeefyNextAuthoritySet,
    pub parachain_heads: [u8; 32],
}

impl MmrLeaf {
    pub fn hash(&self) -> H256 {
        keccak256(&self.encode())
    }

    pub fn parachain_heads(&self) -> H256 {
        H256::from(self.parachain_heads)
    }
}

/// MMR inclusion proof as returned by the relay chain's `mmr_generateProof`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMmrProof {
    pub block_hash: H256,
    pub leaf: MmrLeaf,
    pub leaf_index: u64,
    pub leaf_count: u64,
    pub items: Vec<H256>,
}

/// Destination-chain block header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthHeader {
    pub number: u64,
    pub hash: H256,
    pub parent_hash: H256,
}

/// `InitialVerificationSuccessful` event emitted by the light client contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEvent {
    pub tx_hash: H256,
    pub block_number: u64,
}
