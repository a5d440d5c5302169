// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::registry::CommitmentStatus;
use crate::types::{ChannelId, CommitmentId};
use ethers::types::H256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    // Transient chain RPC failure
    #[error("RPC error: {0}")]
    Rpc(String),

    // A subscription feed ended or failed
    #[error("Subscription closed: {0}")]
    SubscriptionClosed(String),

    // A downstream consumer dropped its receiver
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // Malformed payload from a chain
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Commitment at block {0} carries no signatures")]
    InsufficientSignatures(u32),

    #[error("Commitment record {0} not found")]
    NotFound(CommitmentId),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: CommitmentId,
        from: CommitmentStatus,
        to: CommitmentStatus,
    },

    #[error("Required storage item {pallet}::{item} missing at {at:?}")]
    MissingStorage {
        pallet: &'static str,
        item: &'static str,
        at: H256,
    },

    // Computed parachain heads root does not match the one committed in the MMR leaf
    #[error("Parachain heads root mismatch: calculated {calculated:?}, mmr leaf {committed:?}")]
    ProofInconsistency { calculated: H256, committed: H256 },

    #[error("Parachain {para_id} is not registered at relay block {relay_block}")]
    ParachainNotRegistered { para_id: u32, relay_block: u64 },

    #[error("Parachain block {para_block} was never included in a relay block")]
    ParaBlockNotIncluded { para_block: u64 },

    #[error("Invalid MMR proof: {0}")]
    InvalidMmrProof(String),

    #[error("Malformed header stream: expected block {expected}, got {actual}")]
    MalformedHeaderStream { expected: u64, actual: u64 },

    // Scanned to genesis without locating the delivered nonce
    #[error("History exhausted before finding nonce {nonce} on {channel} channel")]
    HistoryExhausted { channel: ChannelId, nonce: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Rpc(_) => "rpc",
            RelayError::SubscriptionClosed(_) => "subscription_closed",
            RelayError::ChannelClosed(_) => "channel_closed",
            RelayError::Decode(_) => "decode",
            RelayError::InsufficientSignatures(_) => "insufficient_signatures",
            RelayError::NotFound(_) => "not_found",
            RelayError::InvalidTransition { .. } => "invalid_transition",
            RelayError::MissingStorage { .. } => "missing_storage",
            RelayError::ProofInconsistency { .. } => "proof_inconsistency",
            RelayError::ParachainNotRegistered { .. } => "parachain_not_registered",
            RelayError::ParaBlockNotIncluded { .. } => "para_block_not_included",
            RelayError::InvalidMmrProof(_) => "invalid_mmr_proof",
            RelayError::MalformedHeaderStream { .. } => "malformed_header_stream",
            RelayError::HistoryExhausted { .. } => "history_exhausted",
            RelayError::Cancelled => "cancelled",
            RelayError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Whether the owning loop may retry the failed call
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Rpc(_) | RelayError::SubscriptionClosed(_)
        )
    }

    /// Cancellation is a shutdown signal, not a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }
}

impl From<parity_scale_codec::Error> for RelayError {
    fn from(e: parity_scale_codec::Error) -> Self {
        RelayError::Decode(e.to_string())
    }
}

impl From<hex::FromHexError> for RelayError {
    fn from(e: hex::FromHexError) -> Self {
        RelayError::Decode(format!("invalid hex: {}", e))
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
