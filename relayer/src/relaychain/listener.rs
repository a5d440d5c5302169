// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Relay chain commitment listener

use super::RelayChainClient;
use crate::config::RelayerConfig;
use crate::crypto::authority_key_to_eth_address;
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::registry::{CommitmentRecord, CommitmentRegistry};
use crate::retry_with_max_elapsed_time;
use crate::types::{CommitmentId, SignedCommitment};
use ethers::types::Address as EthAddress;
use futures::stream::BoxStream;
use futures::StreamExt;
use parity_scale_codec::Decode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BEEFY_PALLET: &str = "Beefy";
const AUTHORITIES_ITEM: &str = "Authorities";

/// Admits newly signed BEEFY commitments into the registry.
///
/// Bad messages are logged and dropped. A dropped subscription is
/// re-established; only cancellation or a closed notification channel ends
/// the loop.
pub struct CommitmentListener<C> {
    client: Arc<C>,
    registry: Arc<CommitmentRegistry>,
    notify_tx: mpsc::Sender<CommitmentId>,
    // validator_set_id -> signer addresses
    validator_cache: HashMap<u64, Vec<EthAddress>>,
    max_retry_duration: Duration,
    metrics: Arc<RelayerMetrics>,
}

impl<C: RelayChainClient> CommitmentListener<C> {
    pub fn new(
        client: Arc<C>,
        registry: Arc<CommitmentRegistry>,
        notify_tx: mpsc::Sender<CommitmentId>,
        max_retry_duration: Duration,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self {
            client,
            registry,
            notify_tx,
            validator_cache: HashMap::new(),
            max_retry_duration,
            metrics,
        }
    }

    pub fn from_config(
        client: Arc<C>,
        registry: Arc<CommitmentRegistry>,
        notify_tx: mpsc::Sender<CommitmentId>,
        config: &RelayerConfig,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self::new(
            client,
            registry,
            notify_tx,
            config.max_retry_duration(),
            metrics,
        )
    }

    pub async fn run(mut self, cancel: CancellationToken) -> RelayResult<()> {
        info!("[relaychain] Starting commitment listener");
        loop {
            let mut justifications = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[relaychain] Cancelled, stopping commitment listener");
                    return Ok(());
                }
                subscription = self.subscribe() => subscription?,
            };

            loop {
                let message = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("[relaychain] Cancelled, stopping commitment listener");
                        return Ok(());
                    }
                    message = justifications.next() => message,
                };
                let Some(message) = message else {
                    warn!("[relaychain] Justification subscription closed, resubscribing");
                    self.metrics.relaychain_resubscriptions.inc();
                    break;
                };
                if let Some(id) = self.handle_message(&message).await {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("[relaychain] Cancelled, stopping commitment listener");
                            return Ok(());
                        }
                        sent = self.notify_tx.send(id) => {
                            sent.map_err(|_| {
                                RelayError::ChannelClosed("commitment notifications".to_string())
                            })?;
                        }
                    }
                }
            }
        }
    }

    async fn subscribe(&self) -> RelayResult<BoxStream<'static, String>> {
        match retry_with_max_elapsed_time!(
            self.client.subscribe_justifications(),
            self.max_retry_duration
        ) {
            Ok(Ok(stream)) => {
                debug!("[relaychain] Subscribed to justifications");
                Ok(stream)
            }
            Ok(Err(e)) | Err(e) => {
                error!("[relaychain] Failed to subscribe to justifications: {}", e);
                Err(RelayError::SubscriptionClosed(e.to_string()))
            }
        }
    }

    /// Decode, validate and admit one subscription message. Returns the id of
    /// a newly inserted record.
    async fn handle_message(&mut self, message: &str) -> Option<CommitmentId> {
        self.metrics.commitments_witnessed.inc();
        let commitment = match SignedCommitment::decode_hex(message) {
            Ok(commitment) => commitment,
            Err(e) => {
                warn!("[relaychain] Dropping undecodable commitment: {}", e);
                self.discard("decode");
                return None;
            }
        };

        if commitment.signature_count() == 0 {
            info!(
                "[relaychain] Discarding commitment {} without signatures",
                commitment.id()
            );
            self.discard("no_signatures");
            return None;
        }

        let validators = match self.validator_addresses(&commitment).await {
            Ok(validators) => validators,
            Err(e) => {
                warn!(
                    "[relaychain] Failed to resolve validators for commitment {}: {}",
                    commitment.id(),
                    e
                );
                self.discard("validator_lookup");
                return None;
            }
        };

        let id = commitment.id();
        info!(
            "[relaychain] Witnessed commitment {}: mmr_root={:?}, signatures={}",
            id,
            commitment.mmr_root(),
            commitment.signature_count()
        );
        if !self
            .registry
            .put(CommitmentRecord::new(commitment, validators))
            .await
        {
            return None;
        }
        self.metrics.commitments_admitted.inc();
        Some(id)
    }

    async fn validator_addresses(
        &mut self,
        commitment: &SignedCommitment,
    ) -> RelayResult<Vec<EthAddress>> {
        let set_id = commitment.commitment.validator_set_id;
        if let Some(cached) = self.validator_cache.get(&set_id) {
            return Ok(cached.clone());
        }

        let block_number = commitment.block_number() as u64;
        let client = self.client.clone();
        let (block_hash, stored) = match retry_with_max_elapsed_time!(
            async {
                let block_hash = client.get_block_hash(block_number).await?;
                let stored = client
                    .read_storage(block_hash, BEEFY_PALLET, AUTHORITIES_ITEM)
                    .await?;
                Ok::<_, RelayError>((block_hash, stored))
            },
            self.max_retry_duration
        ) {
            Ok(Ok(read)) => read,
            Ok(Err(e)) | Err(e) => return Err(e),
        };
        // An unset authority list is permanent, only the reads are retried
        let bytes = stored.ok_or(RelayError::MissingStorage {
            pallet: BEEFY_PALLET,
            item: AUTHORITIES_ITEM,
            at: block_hash,
        })?;
        let keys = Vec::<[u8; 33]>::decode(&mut bytes.as_slice())?;
        let addresses = keys
            .iter()
            .map(|key| authority_key_to_eth_address(key))
            .collect::<RelayResult<Vec<_>>>()?;

        debug!(
            "[relaychain] Resolved {} validators for set {}",
            addresses.len(),
            set_id
        );
        self.validator_cache.insert(set_id, addresses.clone());
        Ok(addresses)
    }

    fn discard(&self, reason: &str) {
        self.metrics
            .commitments_discarded
            .with_label_values(&[reason])
            .inc();
    }
}
