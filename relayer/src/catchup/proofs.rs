// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Proof construction for recovered parachain blocks
//!
//! Each block is tied to the reference relay block through two proofs: the
//! parachain head sits in the heads tree of the relay block that included it,
//! and that tree's root sits in an MMR leaf under the reference MMR root.

use super::package::{ParaBlockWithDigest, ParaBlockWithProofs};
use crate::crypto::{build_parachain_heads_proof, SimplifiedMmrProof};
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::relaychain::{read_required, RelayChainClient};
use crate::retry_with_max_elapsed_time;
use crate::types::{ParaHeads, ParaHeader, RawMmrProof};
use ethers::types::H256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const MMR_PALLET: &str = "Mmr";
pub const MMR_ROOT_ITEM: &str = "RootHash";
pub const MMR_LEAF_COUNT_ITEM: &str = "NumberOfLeaves";

#[derive(Debug, Clone)]
pub struct ProofConfig {
    pub para_id: u32,
    pub beefy_starting_block: u64,
    pub mmr_leaf_offset: u64,
    pub max_retry_duration: Duration,
}

/// Relay block found to include a parachain block
struct Inclusion {
    relay_block: u64,
    heads: ParaHeads,
    header: ParaHeader,
}

pub struct ProofBuilder<R> {
    client: Arc<R>,
    config: ProofConfig,
    metrics: Arc<RelayerMetrics>,
    // relay block -> para heads, valid for one catch-up run
    heads_cache: HashMap<u64, ParaHeads>,
}

impl<R: RelayChainClient> ProofBuilder<R> {
    pub fn new(client: Arc<R>, config: ProofConfig, metrics: Arc<RelayerMetrics>) -> Self {
        Self {
            client,
            config,
            metrics,
            heads_cache: HashMap::new(),
        }
    }

    /// Prove every block in `blocks`, which must be in ascending order.
    ///
    /// Fails as a whole on the first block that cannot be proven.
    pub async fn build(
        &mut self,
        blocks: Vec<ParaBlockWithDigest>,
        relay_block: u64,
        relay_hash: H256,
        cancel: &CancellationToken,
    ) -> RelayResult<Vec<ParaBlockWithProofs>> {
        let mut proven = Vec::with_capacity(blocks.len());
        for block in blocks {
            let para_block = block.block_number;
            let with_proofs = self
                .build_one(block, relay_block, relay_hash, cancel)
                .await
                .map_err(|e| {
                    if !e.is_cancellation() {
                        error!(
                            "[catchup] Failed to build proofs for parachain block {}: {}",
                            para_block, e
                        );
                    }
                    e
                })?;
            proven.push(with_proofs);
        }
        Ok(proven)
    }

    async fn build_one(
        &mut self,
        block: ParaBlockWithDigest,
        relay_block: u64,
        relay_hash: H256,
        cancel: &CancellationToken,
    ) -> RelayResult<ParaBlockWithProofs> {
        let inclusion = self
            .locate_inclusion(block.block_number, relay_block, cancel)
            .await?;
        info!(
            "[catchup] Parachain block {} included at relay block {}",
            block.block_number, inclusion.relay_block
        );

        let leaf_block = inclusion.relay_block + self.config.mmr_leaf_offset;
        let raw = self.fetch_mmr_proof(leaf_block, relay_hash).await?;
        let mmr_proof = SimplifiedMmrProof::from_raw(&raw)?;

        let merkle_proof_data = build_parachain_heads_proof(&inclusion.heads, self.config.para_id)
            .ok_or(RelayError::ParachainNotRegistered {
                para_id: self.config.para_id,
                relay_block: inclusion.relay_block,
            })?;
        let committed = mmr_proof.leaf.parachain_heads();
        if merkle_proof_data.root != committed {
            return Err(RelayError::ProofInconsistency {
                calculated: merkle_proof_data.root,
                committed,
            });
        }
        debug!(
            "[catchup] Parachain heads root {:?} matches MMR leaf {}",
            committed, raw.leaf_index
        );

        let mmr_root: [u8; 32] =
            read_required(self.client.as_ref(), relay_hash, MMR_PALLET, MMR_ROOT_ITEM).await?;

        Ok(ParaBlockWithProofs {
            block,
            header: inclusion.header,
            relay_block: inclusion.relay_block,
            mmr_proof,
            mmr_root_hash: H256::from(mmr_root),
            merkle_proof_data,
        })
    }

    /// Walk back from `from_relay_block` to the newest relay block whose
    /// recorded head for our parachain is `para_block`.
    async fn locate_inclusion(
        &mut self,
        para_block: u64,
        from_relay_block: u64,
        cancel: &CancellationToken,
    ) -> RelayResult<Inclusion> {
        let mut relay_block = from_relay_block;
        loop {
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }
            let heads = self.para_heads(relay_block).await?;
            let head = heads
                .get(&self.config.para_id)
                .ok_or(RelayError::ParachainNotRegistered {
                    para_id: self.config.para_id,
                    relay_block,
                })?;
            let header = ParaHeader::decode_head(head)?;
            let head_number = header.number as u64;

            if head_number == para_block {
                return Ok(Inclusion {
                    relay_block,
                    heads,
                    header,
                });
            }
            // Older relay blocks only hold older heads
            if head_number < para_block || relay_block == 0 {
                return Err(RelayError::ParaBlockNotIncluded { para_block });
            }
            relay_block -= 1;
        }
    }

    async fn para_heads(&mut self, relay_block: u64) -> RelayResult<ParaHeads> {
        if let Some(heads) = self.heads_cache.get(&relay_block) {
            return Ok(heads.clone());
        }
        let client = self.client.clone();
        let heads = match retry_with_max_elapsed_time!(
            async {
                let hash = client.get_block_hash(relay_block).await?;
                client.fetch_para_heads(hash).await
            },
            self.config.max_retry_duration
        ) {
            Ok(Ok(heads)) => heads,
            Ok(Err(e)) | Err(e) => return Err(e),
        };
        self.metrics.relay_blocks_scanned.inc();
        debug!(
            "[catchup] Fetched {} para heads at relay block {}",
            heads.len(),
            relay_block
        );
        self.heads_cache.insert(relay_block, heads.clone());
        Ok(heads)
    }

    async fn fetch_mmr_proof(&self, leaf_block: u64, relay_hash: H256) -> RelayResult<RawMmrProof> {
        match retry_with_max_elapsed_time!(
            self.client
                .fetch_mmr_proof(leaf_block, relay_hash, self.config.beefy_starting_block),
            self.config.max_retry_duration
        ) {
            Ok(Ok(proof)) => Ok(proof),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}
