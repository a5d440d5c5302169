// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Values handed from one catch-up stage to the next

use crate::crypto::{MerkleProofData, SimplifiedMmrProof};
use crate::types::{CommitmentDigest, OutboundMessage, ParaHeader};
use ethers::types::H256;

/// A channel commitment together with the messages it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestItemWithData {
    pub digest: CommitmentDigest,
    pub messages: Vec<OutboundMessage>,
    /// Raw encoded batch as stored on the parachain
    pub data: Vec<u8>,
}

/// Parachain block holding commitments the destination has not processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParaBlockWithDigest {
    pub block_number: u64,
    pub digest_items: Vec<DigestItemWithData>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParaBlockWithProofs {
    pub block: ParaBlockWithDigest,
    pub header: ParaHeader,
    /// Relay block whose para heads include `header`
    pub relay_block: u64,
    pub mmr_proof: SimplifiedMmrProof,
    pub mmr_root_hash: H256,
    pub merkle_proof_data: MerkleProofData,
}

/// Everything the destination chain needs to accept one parachain block's
/// messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePackage {
    pub para_id: u32,
    pub block_number: u64,
    pub digest_items: Vec<DigestItemWithData>,
    pub header: ParaHeader,
    pub merkle_proof_data: MerkleProofData,
    pub mmr_proof: SimplifiedMmrProof,
    pub mmr_root_hash: H256,
    pub mmr_leaf_count: u64,
}

impl MessagePackage {
    pub fn new(proofs: ParaBlockWithProofs, para_id: u32, mmr_leaf_count: u64) -> Self {
        Self {
            para_id,
            block_number: proofs.block.block_number,
            digest_items: proofs.block.digest_items,
            header: proofs.header,
            merkle_proof_data: proofs.merkle_proof_data,
            mmr_proof: proofs.mmr_proof,
            mmr_root_hash: proofs.mmr_root_hash,
            mmr_leaf_count,
        }
    }

    /// Check the full chain: head in the heads tree, heads root in the MMR
    /// leaf, and the leaf under the MMR root
    pub fn verify(&self) -> bool {
        self.merkle_proof_data.verify()
            && self.merkle_proof_data.root == self.mmr_proof.leaf.parachain_heads()
            && self.mmr_proof.verify(self.mmr_root_hash)
    }
}

/// Package proven blocks in the order given, which must be ascending
pub fn create_message_packages(
    blocks: Vec<ParaBlockWithProofs>,
    para_id: u32,
    mmr_leaf_count: u64,
) -> Vec<MessagePackage> {
    blocks
        .into_iter()
        .map(|b| MessagePackage::new(b, para_id, mmr_leaf_count))
        .collect()
}
