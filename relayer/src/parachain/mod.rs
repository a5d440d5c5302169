// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parachain access used by the catch-up search

use crate::error::RelayResult;
use crate::types::{ChannelId, MessageBatch, ParaHeader};
use async_trait::async_trait;
use ethers::types::H256;
use parity_scale_codec::Decode;

#[async_trait]
pub trait ParachainClient: Send + Sync + 'static {
    async fn get_block_hash(&self, number: u64) -> RelayResult<H256>;

    async fn get_header(&self, hash: H256) -> RelayResult<ParaHeader>;

    /// Raw SCALE bytes of a plain storage value, `None` when unset
    async fn read_storage(
        &self,
        at: H256,
        pallet: &'static str,
        item: &'static str,
    ) -> RelayResult<Option<Vec<u8>>>;

    /// Messages committed on `channel` under `commitment_hash`, as kept in
    /// the parachain's offchain storage
    async fn get_outbound_messages(
        &self,
        channel: ChannelId,
        commitment_hash: H256,
    ) -> RelayResult<MessageBatch>;
}

/// Outbound nonce of `channel` at parachain block `at`; unset reads as 0
pub async fn read_outbound_nonce<P>(client: &P, at: H256, channel: ChannelId) -> RelayResult<u64>
where
    P: ParachainClient + ?Sized,
{
    match client
        .read_storage(at, channel.outbound_pallet(), "Nonce")
        .await?
    {
        Some(bytes) => Ok(u64::decode(&mut bytes.as_slice())?),
        None => Ok(0),
    }
}
