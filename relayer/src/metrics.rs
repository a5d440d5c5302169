// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Histogram, IntCounter,
    IntCounterVec, IntGauge, Registry,
};

const CATCH_UP_DURATION_SEC_BUCKETS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10., 20., 30., 60., 120., 300., 600.,
];

#[derive(Clone, Debug)]
pub struct RelayerMetrics {
    pub(crate) commitments_witnessed: IntCounter,
    pub(crate) commitments_discarded: IntCounterVec,
    pub(crate) commitments_admitted: IntCounter,
    pub(crate) relaychain_resubscriptions: IntCounter,

    pub(crate) registry_transitions: IntCounterVec,
    pub(crate) registry_invalid_transitions: IntCounter,
    pub(crate) verification_events_observed: IntCounter,

    pub(crate) last_finalized_eth_block: IntGauge,
    pub(crate) eth_header_resubscriptions: IntCounter,

    pub(crate) catch_up_runs: IntCounter,
    pub(crate) catch_up_packages_built: IntCounter,
    pub(crate) catch_up_errors: IntCounterVec,
    pub(crate) catch_up_duration: Histogram,
    pub(crate) para_blocks_scanned: IntCounter,
    pub(crate) relay_blocks_scanned: IntCounter,
}

impl RelayerMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            commitments_witnessed: register_int_counter_with_registry!(
                "relayer_commitments_witnessed",
                "Total number of signed commitments received from the relay chain",
                registry,
            )
            .unwrap(),
            commitments_discarded: register_int_counter_vec_with_registry!(
                "relayer_commitments_discarded",
                "Total number of signed commitments dropped before admission, by reason",
                &["reason"],
                registry,
            )
            .unwrap(),
            commitments_admitted: register_int_counter_with_registry!(
                "relayer_commitments_admitted",
                "Total number of commitment records inserted into the registry",
                registry,
            )
            .unwrap(),
            relaychain_resubscriptions: register_int_counter_with_registry!(
                "relayer_relaychain_resubscriptions",
                "Total number of times the justification subscription was re-established",
                registry,
            )
            .unwrap(),
            registry_transitions: register_int_counter_vec_with_registry!(
                "relayer_registry_transitions",
                "Total number of commitment status transitions, by target status",
                &["status"],
                registry,
            )
            .unwrap(),
            registry_invalid_transitions: register_int_counter_with_registry!(
                "relayer_registry_invalid_transitions",
                "Total number of rejected commitment status transitions",
                registry,
            )
            .unwrap(),
            verification_events_observed: register_int_counter_with_registry!(
                "relayer_verification_events_observed",
                "Total number of initial verification events seen on the destination chain",
                registry,
            )
            .unwrap(),
            last_finalized_eth_block: register_int_gauge_with_registry!(
                "relayer_last_finalized_eth_block",
                "The latest destination chain block considered final",
                registry,
            )
            .unwrap(),
            eth_header_resubscriptions: register_int_counter_with_registry!(
                "relayer_eth_header_resubscriptions",
                "Total number of times the destination header subscription was re-established",
                registry,
            )
            .unwrap(),
            catch_up_runs: register_int_counter_with_registry!(
                "relayer_catch_up_runs",
                "Total number of catch-up runs started",
                registry,
            )
            .unwrap(),
            catch_up_packages_built: register_int_counter_with_registry!(
                "relayer_catch_up_packages_built",
                "Total number of message packages produced by catch-up",
                registry,
            )
            .unwrap(),
            catch_up_errors: register_int_counter_vec_with_registry!(
                "relayer_catch_up_errors",
                "Total number of failed catch-up runs, by error type",
                &["type"],
                registry,
            )
            .unwrap(),
            catch_up_duration: register_histogram_with_registry!(
                "relayer_catch_up_duration",
                "Wall time of a complete catch-up run in seconds",
                CATCH_UP_DURATION_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
            para_blocks_scanned: register_int_counter_with_registry!(
                "relayer_para_blocks_scanned",
                "Total number of parachain blocks visited by the lost commitment search",
                registry,
            )
            .unwrap(),
            relay_blocks_scanned: register_int_counter_with_registry!(
                "relayer_relay_blocks_scanned",
                "Total number of relay chain blocks visited while locating para heads",
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}
