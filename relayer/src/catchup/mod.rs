// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Recovery of parachain messages the destination channels never received.
//!
//! A run compares delivered and generated nonces, walks parachain history back
//! to the last delivered nonce, and proves every block in between against a
//! single reference relay block. The run is read-only; it either yields a
//! complete ascending list of [`MessagePackage`]s or an error.

pub mod nonce;
pub mod package;
pub mod proofs;
pub mod search;

pub use nonce::{ChannelNonces, NonceReconciliation};
pub use package::{
    create_message_packages, DigestItemWithData, MessagePackage, ParaBlockWithDigest,
    ParaBlockWithProofs,
};
pub use proofs::{ProofBuilder, ProofConfig};
pub use search::LostCommitmentSearch;

use crate::config::RelayerConfig;
use crate::error::{RelayError, RelayResult};
use crate::ethereum::EthereumClient;
use crate::metrics::RelayerMetrics;
use crate::parachain::ParachainClient;
use crate::relaychain::{read_required, RelayChainClient};
use crate::retry_with_max_elapsed_time;
use ethers::types::H256;
use nonce::{fetch_delivered_nonces, fetch_generated_nonces};
use proofs::{MMR_LEAF_COUNT_ITEM, MMR_PALLET};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct CatchUp<R, P, E> {
    relay_client: Arc<R>,
    para_client: Arc<P>,
    eth_client: Arc<E>,
    config: RelayerConfig,
    metrics: Arc<RelayerMetrics>,
}

impl<R, P, E> CatchUp<R, P, E>
where
    R: RelayChainClient,
    P: ParachainClient,
    E: EthereumClient,
{
    pub fn new(
        relay_client: Arc<R>,
        para_client: Arc<P>,
        eth_client: Arc<E>,
        config: RelayerConfig,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self {
            relay_client,
            para_client,
            eth_client,
            config,
            metrics,
        }
    }

    /// Build message packages for every parachain block between the last
    /// delivered nonce and `para_block`, proven against `relay_hash`.
    ///
    /// Returns an empty list when both channels are up to date.
    pub async fn build_missed_message_packages(
        &self,
        relay_block: u64,
        relay_hash: H256,
        para_block: u64,
        para_hash: H256,
        cancel: &CancellationToken,
    ) -> RelayResult<Vec<MessagePackage>> {
        self.metrics.catch_up_runs.inc();
        let _timer = self.metrics.catch_up_duration.start_timer();

        let result = self
            .run(relay_block, relay_hash, para_block, para_hash, cancel)
            .await;
        match &result {
            Ok(packages) => {
                self.metrics
                    .catch_up_packages_built
                    .inc_by(packages.len() as u64);
            }
            Err(e) if e.is_cancellation() => {
                info!("[catchup] Catch-up cancelled");
            }
            Err(e) => {
                error!("[catchup] Catch-up failed: {}", e);
                self.metrics
                    .catch_up_errors
                    .with_label_values(&[e.error_type()])
                    .inc();
            }
        }
        result
    }

    async fn run(
        &self,
        relay_block: u64,
        relay_hash: H256,
        para_block: u64,
        para_hash: H256,
        cancel: &CancellationToken,
    ) -> RelayResult<Vec<MessagePackage>> {
        let nonces = self.reconcile_nonces(para_hash).await?;
        if !nonces.any_needed() {
            info!("[catchup] Destination channels are up to date, nothing to recover");
            return Ok(vec![]);
        }
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }

        let search = LostCommitmentSearch::new(
            self.para_client.clone(),
            self.config.max_retry_duration(),
            self.metrics.clone(),
        );
        let mut blocks = search.search(para_block, &nonces, cancel).await?;
        // Delivery must follow nonce order
        blocks.reverse();

        let mut builder = ProofBuilder::new(
            self.relay_client.clone(),
            ProofConfig {
                para_id: self.config.parachain.para_id,
                beefy_starting_block: self.config.relaychain.beefy_starting_block,
                mmr_leaf_offset: self.config.relaychain.mmr_leaf_offset,
                max_retry_duration: self.config.max_retry_duration(),
            },
            self.metrics.clone(),
        );
        let proven = builder
            .build(blocks, relay_block, relay_hash, cancel)
            .await?;

        let leaf_count: u64 = read_required(
            self.relay_client.as_ref(),
            relay_hash,
            MMR_PALLET,
            MMR_LEAF_COUNT_ITEM,
        )
        .await?;

        let packages =
            create_message_packages(proven, self.config.parachain.para_id, leaf_count);
        info!(
            "[catchup] Built {} message packages against relay block {} ({} mmr leaves)",
            packages.len(),
            relay_block,
            leaf_count
        );
        Ok(packages)
    }

    async fn reconcile_nonces(&self, para_hash: H256) -> RelayResult<NonceReconciliation> {
        let max_retry_duration = self.config.max_retry_duration();
        let delivered = match retry_with_max_elapsed_time!(
            fetch_delivered_nonces(self.eth_client.as_ref(), &self.config.ethereum),
            max_retry_duration
        ) {
            Ok(Ok(nonces)) => nonces,
            Ok(Err(e)) | Err(e) => return Err(e),
        };
        let generated = match retry_with_max_elapsed_time!(
            fetch_generated_nonces(self.para_client.as_ref(), para_hash),
            max_retry_duration
        ) {
            Ok(Ok(nonces)) => nonces,
            Ok(Err(e)) | Err(e) => return Err(e),
        };
        Ok(NonceReconciliation::new(delivered, generated))
    }
}
