// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! BEEFY commitment relaying and missed-message catch-up.
//!
//! Live path: [`relaychain::CommitmentListener`] admits signed commitments into
//! the [`registry::CommitmentRegistry`], [`ethereum::ConfirmationPoller`]
//! advances them as the destination chain confirms. Catch-up path:
//! [`catchup::CatchUp`] rebuilds proofs for parachain messages the destination
//! channels never received.

pub mod catchup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ethereum;
pub mod finality;
pub mod metrics;
pub mod parachain;
pub mod registry;
pub mod relaychain;
pub mod types;

#[cfg(test)]
pub mod test_utils;

/// Retry `$func` with exponential backoff until it succeeds or
/// `$max_elapsed_time` passes. Evaluates to `Result<Result<T, E>, E>`.
#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 51.2, 102.4, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}
