// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use ethers::types::Address as EthAddress;
use relayer_config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RelaychainConfig {
    // First relay block with an MMR leaf, forwarded to proof generation.
    pub beefy_starting_block: u64,
    // Distance from the relay block that included a para head to the MMR leaf committing to it.
    #[serde(default = "default_mmr_leaf_offset")]
    pub mmr_leaf_offset: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ParachainConfig {
    pub para_id: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct EthereumConfig {
    #[serde(default = "default_descendants_until_final")]
    pub descendants_until_final: u64,
    // Blocks to wait after initial verification before completion is allowed.
    pub beefy_block_delay: u64,
    pub basic_inbound_channel: EthAddress,
    pub incentivized_inbound_channel: EthAddress,
    // Read inbound channel nonces including pending transactions.
    #[serde(default = "default_true")]
    pub read_pending_nonces: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelsConfig {
    #[serde(default = "default_notification_channel_size")]
    pub notification_channel_size: usize,
    #[serde(default = "default_header_channel_size")]
    pub header_channel_size: usize,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            notification_channel_size: default_notification_channel_size(),
            header_channel_size: default_header_channel_size(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    #[serde(default = "default_max_retry_duration_secs")]
    pub max_retry_duration_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_duration_secs: default_max_retry_duration_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    pub relaychain: RelaychainConfig,
    pub parachain: ParachainConfig,
    pub ethereum: EthereumConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_mmr_leaf_offset() -> u64 {
    1
}

fn default_descendants_until_final() -> u64 {
    8
}

fn default_true() -> bool {
    true
}

fn default_notification_channel_size() -> usize {
    100
}

fn default_header_channel_size() -> usize {
    5
}

fn default_max_retry_duration_secs() -> u64 {
    120
}

impl Config for RelayerConfig {}

impl RelayerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        info!("Starting relayer config validation");
        if self.parachain.para_id == 0 {
            return Err(anyhow!("parachain para-id must be non-zero"));
        }
        if self.channels.notification_channel_size == 0 || self.channels.header_channel_size == 0
        {
            return Err(anyhow!(
                "channel sizes must be non-zero, got notification={} header={}",
                self.channels.notification_channel_size,
                self.channels.header_channel_size
            ));
        }
        if self.ethereum.basic_inbound_channel == self.ethereum.incentivized_inbound_channel {
            return Err(anyhow!(
                "basic and incentivized inbound channels share address {:?}",
                self.ethereum.basic_inbound_channel
            ));
        }
        Ok(())
    }

    pub fn max_retry_duration(&self) -> Duration {
        Duration::from_secs(self.retry.max_retry_duration_secs)
    }

    /// Channel carrying commitment ids between the relay stages
    pub fn notification_channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.channels.notification_channel_size)
    }

    /// Channel carrying final destination headers from the tracker to the poller
    pub fn header_channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.channels.header_channel_size)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> RelayerConfig {
    RelayerConfig {
        relaychain: RelaychainConfig {
            beefy_starting_block: 1,
            mmr_leaf_offset: default_mmr_leaf_offset(),
        },
        parachain: ParachainConfig { para_id: 1000 },
        ethereum: EthereumConfig {
            descendants_until_final: 2,
            beefy_block_delay: 4,
            basic_inbound_channel: EthAddress::repeat_byte(0xb1),
            incentivized_inbound_channel: EthAddress::repeat_byte(0x1c),
            read_pending_nonces: true,
        },
        channels: ChannelsConfig::default(),
        retry: RetryConfig {
            max_retry_duration_secs: 1,
        },
    }
}
