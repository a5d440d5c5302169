// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Commitment record and its relay status

use crate::error::{RelayError, RelayResult};
use crate::types::{CommitmentId, SignedCommitment};
use ethers::types::{Address as EthAddress, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay progress of a commitment.
///
/// ```text
/// Witnessed -> InitialVerificationTxSent -> InitialVerificationTxConfirmed
///   -> ReadyToComplete -> Complete
/// any non-terminal state -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommitmentStatus {
    Witnessed,
    InitialVerificationTxSent,
    InitialVerificationTxConfirmed,
    ReadyToComplete,
    Complete,
    Failed,
}

impl CommitmentStatus {
    pub fn next(&self) -> Option<CommitmentStatus> {
        match self {
            CommitmentStatus::Witnessed => Some(CommitmentStatus::InitialVerificationTxSent),
            CommitmentStatus::InitialVerificationTxSent => {
                Some(CommitmentStatus::InitialVerificationTxConfirmed)
            }
            CommitmentStatus::InitialVerificationTxConfirmed => {
                Some(CommitmentStatus::ReadyToComplete)
            }
            CommitmentStatus::ReadyToComplete => Some(CommitmentStatus::Complete),
            CommitmentStatus::Complete | CommitmentStatus::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitmentStatus::Complete | CommitmentStatus::Failed)
    }

    /// Staying put is always allowed so a mutation may touch fields only.
    pub fn can_transition_to(&self, to: CommitmentStatus) -> bool {
        if *self == to {
            return true;
        }
        if to == CommitmentStatus::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Witnessed => "witnessed",
            CommitmentStatus::InitialVerificationTxSent => "initial_verification_tx_sent",
            CommitmentStatus::InitialVerificationTxConfirmed => "initial_verification_tx_confirmed",
            CommitmentStatus::ReadyToComplete => "ready_to_complete",
            CommitmentStatus::Complete => "complete",
            CommitmentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CommitmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A commitment accepted for relay, with its delivery progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentRecord {
    pub id: CommitmentId,
    pub commitment: SignedCommitment,
    /// Addresses of the validator set active at the commitment block
    pub validator_addresses: Vec<EthAddress>,
    pub status: CommitmentStatus,
    /// Set when entering `InitialVerificationTxSent`
    pub initial_verification_tx_hash: Option<H256>,
    /// Set when entering `InitialVerificationTxConfirmed`
    pub complete_on_block: Option<u64>,
    pub failure_reason: Option<String>,
}

impl CommitmentRecord {
    pub fn new(commitment: SignedCommitment, validator_addresses: Vec<EthAddress>) -> Self {
        Self {
            id: commitment.id(),
            commitment,
            validator_addresses,
            status: CommitmentStatus::Witnessed,
            initial_verification_tx_hash: None,
            complete_on_block: None,
            failure_reason: None,
        }
    }

    /// Move from `from` to `to`, failing if the record is not currently at `from`.
    ///
    /// Two tasks racing on the same step both call this with the same `from`;
    /// the second one to take the record lock sees the new status and loses.
    pub fn advance(&mut self, from: CommitmentStatus, to: CommitmentStatus) -> RelayResult<()> {
        if self.status != from {
            return Err(RelayError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn is_ready_at(&self, block_number: u64) -> bool {
        self.status == CommitmentStatus::InitialVerificationTxConfirmed
            && self
                .complete_on_block
                .map(|b| b <= block_number)
                .unwrap_or(false)
    }
}
