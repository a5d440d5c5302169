// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Commitment registry - concurrent store of in-flight commitment records

use super::types::{CommitmentRecord, CommitmentStatus};
use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayerMetrics;
use crate::types::CommitmentId;
use ethers::types::H256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

type RecordSlot = Arc<Mutex<CommitmentRecord>>;

/// In-memory registry of commitment records.
///
/// The outer map lock is held only to look up or insert a slot; every status
/// change happens under the record's own mutex, so updates to different
/// records never contend and updates to the same record are linearized.
pub struct CommitmentRegistry {
    records: RwLock<HashMap<CommitmentId, RecordSlot>>,
    metrics: Arc<RelayerMetrics>,
}

impl CommitmentRegistry {
    pub fn new(metrics: Arc<RelayerMetrics>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Insert a record. Returns `false` without touching the registry when a
    /// record with the same id exists and has not failed.
    pub async fn put(&self, record: CommitmentRecord) -> bool {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&record.id) {
            let status = existing.lock().await.status;
            if status != CommitmentStatus::Failed {
                debug!(
                    "[registry] Ignoring duplicate commitment {}: existing status={}",
                    record.id, status
                );
                return false;
            }
            info!("[registry] Re-admitting failed commitment {}", record.id);
        }
        debug!(
            "[registry] Insert commitment {}: signatures={}, validators={}",
            record.id,
            record.commitment.signature_count(),
            record.validator_addresses.len()
        );
        records.insert(record.id, Arc::new(Mutex::new(record)));
        true
    }

    pub async fn get(&self, id: &CommitmentId) -> Option<CommitmentRecord> {
        let slot = self.records.read().await.get(id).cloned()?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    /// Atomic read-modify-write of one record.
    ///
    /// `mutate` works on a copy; the copy replaces the stored record only when
    /// `mutate` succeeds and the resulting status is reachable from the current
    /// one. Returns the stored record after the update.
    pub async fn update<F>(&self, id: &CommitmentId, mutate: F) -> RelayResult<CommitmentRecord>
    where
        F: FnOnce(&mut CommitmentRecord) -> RelayResult<()>,
    {
        let slot = self
            .records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(RelayError::NotFound(*id))?;

        let mut current = slot.lock().await;
        let mut next = current.clone();
        if let Err(e) = mutate(&mut next) {
            if matches!(e, RelayError::InvalidTransition { .. }) {
                self.metrics.registry_invalid_transitions.inc();
            }
            return Err(e);
        }
        next.id = current.id;

        if !current.status.can_transition_to(next.status) {
            self.metrics.registry_invalid_transitions.inc();
            warn!(
                "[registry] Rejected transition for {}: {} -> {}",
                id, current.status, next.status
            );
            return Err(RelayError::InvalidTransition {
                id: *id,
                from: current.status,
                to: next.status,
            });
        }

        if next.status != current.status {
            self.metrics
                .registry_transitions
                .with_label_values(&[next.status.as_str()])
                .inc();
            debug!(
                "[registry] Commitment {} transitioned {} -> {}",
                id, current.status, next.status
            );
        }
        *current = next;
        Ok(current.clone())
    }

    /// Snapshot of all records currently in `status`
    pub async fn list_by_status(&self, status: CommitmentStatus) -> Vec<CommitmentRecord> {
        let slots: Vec<RecordSlot> = self.records.read().await.values().cloned().collect();
        let mut matching = Vec::new();
        for slot in slots {
            let record = slot.lock().await;
            if record.status == status {
                matching.push(record.clone());
            }
        }
        matching
    }

    pub async fn mark_initial_verification_sent(
        &self,
        id: &CommitmentId,
        tx_hash: H256,
    ) -> RelayResult<CommitmentRecord> {
        self.update(id, |record| {
            record.advance(
                CommitmentStatus::Witnessed,
                CommitmentStatus::InitialVerificationTxSent,
            )?;
            record.initial_verification_tx_hash = Some(tx_hash);
            Ok(())
        })
        .await
    }

    pub async fn mark_complete(&self, id: &CommitmentId) -> RelayResult<CommitmentRecord> {
        self.update(id, |record| {
            record.advance(CommitmentStatus::ReadyToComplete, CommitmentStatus::Complete)
        })
        .await
    }

    pub async fn mark_failed(
        &self,
        id: &CommitmentId,
        reason: impl Into<String>,
    ) -> RelayResult<CommitmentRecord> {
        let reason = reason.into();
        warn!("[registry] Marking commitment {} failed: {}", id, reason);
        self.update(id, |record| {
            if record.status.is_terminal() {
                return Err(RelayError::InvalidTransition {
                    id: record.id,
                    from: record.status,
                    to: CommitmentStatus::Failed,
                });
            }
            record.status = CommitmentStatus::Failed;
            record.failure_reason = Some(reason);
            Ok(())
        })
        .await
    }

    /// Drop `Complete` and `Failed` records, returning how many were removed
    pub async fn prune_terminal(&self) -> usize {
        let mut records = self.records.write().await;
        let mut terminal = Vec::new();
        for (id, slot) in records.iter() {
            if slot.lock().await.status.is_terminal() {
                terminal.push(*id);
            }
        }
        for id in &terminal {
            records.remove(id);
        }
        if !terminal.is_empty() {
            info!(
                "[registry] Pruned {} terminal commitments, remaining={}",
                terminal.len(),
                records.len()
            );
        }
        terminal.len()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
