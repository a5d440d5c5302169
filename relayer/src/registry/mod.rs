// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Commitment registry
//!
//! Single source of truth for commitments in flight between the relay chain
//! and the destination chain. The listener inserts records, the poller and the
//! external writer advance them, all through [`CommitmentRegistry::update`].

mod store;
mod types;

pub use store::CommitmentRegistry;
pub use types::{CommitmentRecord, CommitmentStatus};
