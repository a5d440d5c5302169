// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Descendant-count finality for destination chain headers

use crate::config::RelayerConfig;
use crate::error::{RelayError, RelayResult};
use crate::ethereum::EthereumClient;
use crate::metrics::RelayerMetrics;
use crate::retry_with_max_elapsed_time;
use crate::types::EthHeader;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sliding window over consecutive headers.
///
/// Header `k` leaves the window, and is final, when header
/// `k + descendants_until_final` is pushed.
#[derive(Debug)]
pub struct HeaderWindow {
    descendants_until_final: u64,
    pending: VecDeque<EthHeader>,
    last: Option<EthHeader>,
}

impl HeaderWindow {
    pub fn new(descendants_until_final: u64) -> Self {
        Self {
            descendants_until_final,
            pending: VecDeque::new(),
            last: None,
        }
    }

    /// Add the next header, returning the header that just became final.
    ///
    /// The first header may have any number; every later one must be exactly
    /// one above its predecessor.
    pub fn push(&mut self, header: EthHeader) -> RelayResult<Option<EthHeader>> {
        if let Some(last) = &self.last {
            let expected = last.number + 1;
            if header.number != expected {
                return Err(RelayError::MalformedHeaderStream {
                    expected,
                    actual: header.number,
                });
            }
            if header.parent_hash != last.hash {
                warn!(
                    "[finality] Header {} parent {:?} does not match previous hash {:?}",
                    header.number, header.parent_hash, last.hash
                );
            }
        }
        self.last = Some(header);
        self.pending.push_back(header);

        if self.pending.len() as u64 > self.descendants_until_final {
            return Ok(self.pending.pop_front());
        }
        Ok(None)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Turns the destination header subscription into a feed of final headers.
///
/// The window outlives individual subscriptions, so a feed that resumes with a
/// replayed or skipped header is still rejected.
pub struct HeaderFinalityTracker<E> {
    client: Arc<E>,
    window: HeaderWindow,
    max_retry_duration: Duration,
    metrics: Arc<RelayerMetrics>,
}

impl<E: EthereumClient> HeaderFinalityTracker<E> {
    pub fn new(
        client: Arc<E>,
        descendants_until_final: u64,
        max_retry_duration: Duration,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self {
            client,
            window: HeaderWindow::new(descendants_until_final),
            max_retry_duration,
            metrics,
        }
    }

    pub fn from_config(
        client: Arc<E>,
        config: &RelayerConfig,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self::new(
            client,
            config.ethereum.descendants_until_final,
            config.max_retry_duration(),
            metrics,
        )
    }

    /// Forward final headers to `final_tx` until cancelled.
    ///
    /// A full `final_tx` stalls header intake rather than dropping headers.
    /// Returning drops `final_tx`, which is how consumers observe shutdown.
    pub async fn run(
        mut self,
        final_tx: mpsc::Sender<EthHeader>,
        cancel: CancellationToken,
    ) -> RelayResult<()> {
        info!(
            "[finality] Starting header finality tracker: descendants_until_final={}",
            self.window.descendants_until_final
        );
        loop {
            let mut headers = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[finality] Cancelled, stopping header finality tracker");
                    return Ok(());
                }
                subscription = self.subscribe() => subscription?,
            };

            loop {
                let header = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("[finality] Cancelled, stopping header finality tracker");
                        return Ok(());
                    }
                    next = headers.next() => next,
                };
                let Some(header) = header else {
                    warn!("[finality] Header subscription closed, resubscribing");
                    self.metrics.eth_header_resubscriptions.inc();
                    break;
                };

                let Some(final_header) = self.window.push(header)? else {
                    continue;
                };
                debug!("[finality] Header {} is final", final_header.number);
                self.metrics
                    .last_finalized_eth_block
                    .set(final_header.number as i64);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("[finality] Cancelled while delivering header {}", final_header.number);
                        return Ok(());
                    }
                    sent = final_tx.send(final_header) => {
                        sent.map_err(|_| RelayError::ChannelClosed("final headers".to_string()))?;
                    }
                }
            }
        }
    }

    async fn subscribe(&self) -> RelayResult<BoxStream<'static, EthHeader>> {
        match retry_with_max_elapsed_time!(
            self.client.subscribe_new_headers(),
            self.max_retry_duration
        ) {
            Ok(Ok(stream)) => {
                debug!("[finality] Subscribed to destination headers");
                Ok(stream)
            }
            Ok(Err(e)) | Err(e) => {
                error!("[finality] Failed to subscribe to destination headers: {}", e);
                Err(RelayError::SubscriptionClosed(e.to_string()))
            }
        }
    }
}
