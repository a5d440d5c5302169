// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Relay chain access and the commitment listener

mod listener;

pub use listener::CommitmentListener;

use crate::error::{RelayError, RelayResult};
use crate::types::{ParaHeads, RawMmrProof};
use async_trait::async_trait;
use ethers::types::H256;
use futures::stream::BoxStream;
use parity_scale_codec::Decode;

/// Read-only view of the relay chain used by the listener and catch-up
#[async_trait]
pub trait RelayChainClient: Send + Sync + 'static {
    /// Feed of hex-encoded signed commitments, one per BEEFY justification
    async fn subscribe_justifications(&self) -> RelayResult<BoxStream<'static, String>>;

    async fn get_block_hash(&self, number: u64) -> RelayResult<H256>;

    /// Raw SCALE bytes of a plain storage value, `None` when unset
    async fn read_storage(
        &self,
        at: H256,
        pallet: &'static str,
        item: &'static str,
    ) -> RelayResult<Option<Vec<u8>>>;

    /// All parachain heads recorded at relay block `at`
    async fn fetch_para_heads(&self, at: H256) -> RelayResult<ParaHeads>;

    /// MMR proof for the leaf added at `leaf_block`, generated against the
    /// MMR as of block `at`
    async fn fetch_mmr_proof(
        &self,
        leaf_block: u64,
        at: H256,
        beefy_starting_block: u64,
    ) -> RelayResult<RawMmrProof>;
}

/// Read and decode a storage value
pub async fn read_decoded<C, T>(
    client: &C,
    at: H256,
    pallet: &'static str,
    item: &'static str,
) -> RelayResult<Option<T>>
where
    C: RelayChainClient + ?Sized,
    T: Decode,
{
    match client.read_storage(at, pallet, item).await? {
        Some(bytes) => Ok(Some(T::decode(&mut bytes.as_slice())?)),
        None => Ok(None),
    }
}

/// Read and decode a storage value that must exist
pub async fn read_required<C, T>(
    client: &C,
    at: H256,
    pallet: &'static str,
    item: &'static str,
) -> RelayResult<T>
where
    C: RelayChainClient + ?Sized,
    T: Decode,
{
    read_decoded(client, at, pallet, item)
        .await?
        .ok_or(RelayError::MissingStorage { pallet, item, at })
}
