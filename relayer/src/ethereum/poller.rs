// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Destination chain confirmation poller
//!
//! Moves registry records from `InitialVerificationTxSent` through
//! `InitialVerificationTxConfirmed` to `ReadyToComplete`, driven by final
//! headers and the light client's verification events.

use super::EthereumClient;
use crate::config::RelayerConfig;
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::registry::{CommitmentRegistry, CommitmentStatus};
use crate::retry_with_max_elapsed_time;
use crate::types::{CommitmentId, EthHeader, VerificationEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct ConfirmationPoller<E> {
    client: Arc<E>,
    registry: Arc<CommitmentRegistry>,
    ready_tx: mpsc::Sender<CommitmentId>,
    beefy_block_delay: u64,
    max_retry_duration: Duration,
    metrics: Arc<RelayerMetrics>,
}

impl<E: EthereumClient> ConfirmationPoller<E> {
    pub fn new(
        client: Arc<E>,
        registry: Arc<CommitmentRegistry>,
        ready_tx: mpsc::Sender<CommitmentId>,
        beefy_block_delay: u64,
        max_retry_duration: Duration,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self {
            client,
            registry,
            ready_tx,
            beefy_block_delay,
            max_retry_duration,
            metrics,
        }
    }

    pub fn from_config(
        client: Arc<E>,
        registry: Arc<CommitmentRegistry>,
        ready_tx: mpsc::Sender<CommitmentId>,
        config: &RelayerConfig,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self::new(
            client,
            registry,
            ready_tx,
            config.ethereum.beefy_block_delay,
            config.max_retry_duration(),
            metrics,
        )
    }

    /// Consume final headers until the feed closes or `cancel` fires
    pub async fn run(
        self,
        mut final_headers: mpsc::Receiver<EthHeader>,
        cancel: CancellationToken,
    ) -> RelayResult<()> {
        info!(
            "[ethereum] Starting confirmation poller: beefy_block_delay={}",
            self.beefy_block_delay
        );
        loop {
            let header = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[ethereum] Cancelled, stopping confirmation poller");
                    return Ok(());
                }
                header = final_headers.recv() => header,
            };
            let Some(header) = header else {
                info!("[ethereum] Final header feed closed, stopping confirmation poller");
                return Ok(());
            };

            match self.process_header(&header, &cancel).await {
                Ok(()) => {}
                Err(RelayError::Cancelled) => return Ok(()),
                Err(e) => {
                    error!(
                        "[ethereum] Failed to process final header {}: {}",
                        header.number, e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn process_header(&self, header: &EthHeader, cancel: &CancellationToken) -> RelayResult<()> {
        let events = match retry_with_max_elapsed_time!(
            self.client
                .query_verification_events(header.number, header.number),
            self.max_retry_duration
        ) {
            Ok(Ok(events)) => events,
            Ok(Err(e)) | Err(e) => return Err(e),
        };

        for event in events {
            self.on_verification_event(&event).await?;
        }

        for id in self.on_finalized_header(header.number).await? {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                sent = self.ready_tx.send(id) => {
                    sent.map_err(|_| RelayError::ChannelClosed("ready commitments".to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Confirm the record whose verification transaction emitted `event`.
    ///
    /// Returns the confirmed id, or `None` when no sent record matches or
    /// another task already confirmed it.
    pub async fn on_verification_event(
        &self,
        event: &VerificationEvent,
    ) -> RelayResult<Option<CommitmentId>> {
        self.metrics.verification_events_observed.inc();
        let Some(record) = self
            .registry
            .list_by_status(CommitmentStatus::InitialVerificationTxSent)
            .await
            .into_iter()
            .find(|r| r.initial_verification_tx_hash == Some(event.tx_hash))
        else {
            debug!(
                "[ethereum] No sent commitment matches verification tx {:?}",
                event.tx_hash
            );
            return Ok(None);
        };

        let complete_on_block = event.block_number + self.beefy_block_delay;
        let tx_hash = event.tx_hash;
        let result = self
            .registry
            .update(&record.id, |r| {
                if r.initial_verification_tx_hash != Some(tx_hash) {
                    return Err(RelayError::InvalidTransition {
                        id: r.id,
                        from: r.status,
                        to: CommitmentStatus::InitialVerificationTxConfirmed,
                    });
                }
                r.advance(
                    CommitmentStatus::InitialVerificationTxSent,
                    CommitmentStatus::InitialVerificationTxConfirmed,
                )?;
                r.complete_on_block = Some(complete_on_block);
                Ok(())
            })
            .await;

        match result {
            Ok(_) => {
                info!(
                    "[ethereum] Commitment {} verification confirmed at block {}, complete on block {}",
                    record.id, event.block_number, complete_on_block
                );
                Ok(Some(record.id))
            }
            Err(e @ RelayError::InvalidTransition { .. }) | Err(e @ RelayError::NotFound(_)) => {
                debug!("[ethereum] Lost race confirming {}: {}", record.id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Promote confirmed records whose completion block has been reached
    pub async fn on_finalized_header(&self, block_number: u64) -> RelayResult<Vec<CommitmentId>> {
        let candidates = self
            .registry
            .list_by_status(CommitmentStatus::InitialVerificationTxConfirmed)
            .await
            .into_iter()
            .filter(|r| r.is_ready_at(block_number));

        let mut ready = Vec::new();
        for record in candidates {
            let result = self
                .registry
                .update(&record.id, |r| {
                    r.advance(
                        CommitmentStatus::InitialVerificationTxConfirmed,
                        CommitmentStatus::ReadyToComplete,
                    )
                })
                .await;
            match result {
                Ok(_) => {
                    info!(
                        "[ethereum] Commitment {} ready to complete at block {}",
                        record.id, block_number
                    );
                    ready.push(record.id);
                }
                Err(e @ RelayError::InvalidTransition { .. }) | Err(e @ RelayError::NotFound(_)) => {
                    debug!("[ethereum] Lost race readying {}: {}", record.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ready)
    }
}
