// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Destination chain access and the confirmation poller

mod poller;

pub use poller::ConfirmationPoller;

use crate::error::RelayResult;
use crate::types::{EthHeader, VerificationEvent};
use async_trait::async_trait;
use ethers::types::Address as EthAddress;
use futures::stream::BoxStream;

#[async_trait]
pub trait EthereumClient: Send + Sync + 'static {
    /// New block headers in arrival order
    async fn subscribe_new_headers(&self) -> RelayResult<BoxStream<'static, EthHeader>>;

    /// Last nonce processed by the inbound channel contract at `channel`.
    /// With `pending` set the read includes not yet mined transactions.
    async fn get_inbound_nonce(&self, channel: EthAddress, pending: bool) -> RelayResult<u64>;

    /// `InitialVerificationSuccessful` events of the light client contract in
    /// `[from_block, to_block]`, ordered by block
    async fn query_verification_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<VerificationEvent>>;
}
