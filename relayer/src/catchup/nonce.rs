// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Nonce reconciliation between the parachain outbound channels and the
//! destination inbound channels

use crate::config::EthereumConfig;
use crate::error::RelayResult;
use crate::ethereum::EthereumClient;
use crate::parachain::{read_outbound_nonce, ParachainClient};
use crate::types::ChannelId;
use ethers::types::H256;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelNonces {
    pub basic: u64,
    pub incentivized: u64,
}

impl ChannelNonces {
    pub fn new(basic: u64, incentivized: u64) -> Self {
        Self {
            basic,
            incentivized,
        }
    }

    pub fn get(&self, channel: ChannelId) -> u64 {
        match channel {
            ChannelId::Basic => self.basic,
            ChannelId::Incentivized => self.incentivized,
        }
    }

    fn set(&mut self, channel: ChannelId, nonce: u64) {
        match channel {
            ChannelId::Basic => self.basic = nonce,
            ChannelId::Incentivized => self.incentivized = nonce,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceReconciliation {
    /// Last nonce processed by the destination inbound channels
    pub delivered: ChannelNonces,
    /// Last nonce generated by the parachain outbound channels
    pub generated: ChannelNonces,
}

impl NonceReconciliation {
    pub fn new(delivered: ChannelNonces, generated: ChannelNonces) -> Self {
        Self {
            delivered,
            generated,
        }
    }

    pub fn needs_catch_up(&self, channel: ChannelId) -> bool {
        self.delivered.get(channel) < self.generated.get(channel)
    }

    pub fn any_needed(&self) -> bool {
        ChannelId::ALL.iter().any(|c| self.needs_catch_up(*c))
    }
}

pub async fn fetch_delivered_nonces<E>(client: &E, config: &EthereumConfig) -> RelayResult<ChannelNonces>
where
    E: EthereumClient + ?Sized,
{
    let mut nonces = ChannelNonces::default();
    for channel in ChannelId::ALL {
        let address = match channel {
            ChannelId::Basic => config.basic_inbound_channel,
            ChannelId::Incentivized => config.incentivized_inbound_channel,
        };
        let nonce = client
            .get_inbound_nonce(address, config.read_pending_nonces)
            .await?;
        info!(
            "[catchup] Latest nonce delivered to destination {} channel: {}",
            channel, nonce
        );
        nonces.set(channel, nonce);
    }
    Ok(nonces)
}

pub async fn fetch_generated_nonces<P>(client: &P, para_hash: H256) -> RelayResult<ChannelNonces>
where
    P: ParachainClient + ?Sized,
{
    let mut nonces = ChannelNonces::default();
    for channel in ChannelId::ALL {
        let nonce = read_outbound_nonce(client, para_hash, channel).await?;
        info!(
            "[catchup] Latest nonce generated by parachain {} channel: {}",
            channel, nonce
        );
        nonces.set(channel, nonce);
    }
    Ok(nonces)
}
