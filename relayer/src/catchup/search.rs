// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Backward scan of parachain history for commitments the destination missed

use super::nonce::NonceReconciliation;
use super::package::{DigestItemWithData, ParaBlockWithDigest};
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::parachain::ParachainClient;
use crate::retry_with_max_elapsed_time;
use crate::types::{ChannelId, CommitmentDigest, MessageBatch, ParaHeader};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct LostCommitmentSearch<P> {
    client: Arc<P>,
    max_retry_duration: Duration,
    metrics: Arc<RelayerMetrics>,
}

impl<P: ParachainClient> LostCommitmentSearch<P> {
    pub fn new(client: Arc<P>, max_retry_duration: Duration, metrics: Arc<RelayerMetrics>) -> Self {
        Self {
            client,
            max_retry_duration,
            metrics,
        }
    }

    /// Walk back from `head` collecting blocks with undelivered commitments.
    ///
    /// A channel is satisfied at the first block whose batch contains a nonce
    /// at or below the delivered nonce. Channels already up to date start out
    /// satisfied. Results are in discovery order, highest block first.
    pub async fn search(
        &self,
        head: u64,
        nonces: &NonceReconciliation,
        cancel: &CancellationToken,
    ) -> RelayResult<Vec<ParaBlockWithDigest>> {
        let mut found: HashSet<ChannelId> = ChannelId::ALL
            .into_iter()
            .filter(|c| !nonces.needs_catch_up(*c))
            .collect();
        info!(
            "[catchup] Searching backwards from parachain block {}: basic nonce={}, incentivized nonce={}",
            head, nonces.delivered.basic, nonces.delivered.incentivized
        );

        let mut blocks = Vec::new();
        let mut number = head;
        loop {
            if found.len() == ChannelId::ALL.len() {
                break;
            }
            if cancel.is_cancelled() {
                info!("[catchup] Search cancelled at parachain block {}", number);
                return Err(RelayError::Cancelled);
            }

            let header = self.fetch_header(number).await?;
            self.metrics.para_blocks_scanned.inc();

            let mut digest_items = Vec::new();
            for digest in header.commitment_digests()? {
                if found.contains(&digest.channel_id) {
                    continue;
                }
                let target = nonces.delivered.get(digest.channel_id);
                let batch = self.fetch_batch(&digest).await?;

                // The batch holding the target nonce marks the delivered
                // boundary; it and everything older stay out of the result
                if batch.min_nonce().map(|n| n <= target).unwrap_or(false) {
                    info!(
                        "[catchup] Found delivered {} nonce {} at parachain block {}",
                        digest.channel_id, target, number
                    );
                    found.insert(digest.channel_id);
                    continue;
                }
                if batch.messages.is_empty() {
                    continue;
                }
                debug!(
                    "[catchup] Parachain block {} holds undelivered {} messages",
                    number, digest.channel_id
                );
                digest_items.push(DigestItemWithData {
                    digest,
                    messages: batch.messages,
                    data: batch.data,
                });
            }

            if !digest_items.is_empty() {
                blocks.push(ParaBlockWithDigest {
                    block_number: number,
                    digest_items,
                });
            }

            if number == 0 {
                // Every message back to genesis is undelivered for a zero target
                for channel in ChannelId::ALL {
                    let target = nonces.delivered.get(channel);
                    if !found.contains(&channel) && target > 0 {
                        return Err(RelayError::HistoryExhausted {
                            channel,
                            nonce: target,
                        });
                    }
                }
                break;
            }
            number -= 1;
        }

        info!(
            "[catchup] Stopped searching at parachain block {}: found {} blocks with lost commitments",
            number,
            blocks.len()
        );
        Ok(blocks)
    }

    async fn fetch_header(&self, number: u64) -> RelayResult<ParaHeader> {
        match retry_with_max_elapsed_time!(
            async {
                let hash = self.client.get_block_hash(number).await?;
                self.client.get_header(hash).await
            },
            self.max_retry_duration
        ) {
            Ok(Ok(header)) => Ok(header),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }

    async fn fetch_batch(&self, digest: &CommitmentDigest) -> RelayResult<MessageBatch> {
        match retry_with_max_elapsed_time!(
            self.client
                .get_outbound_messages(digest.channel_id, digest.commitment_hash),
            self.max_retry_duration
        ) {
            Ok(Ok(batch)) => Ok(batch),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}
