// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Header finality tracking for the destination chain
//!
//! The destination chain is treated as final after a fixed number of
//! descendants. [`HeaderWindow`] holds the pure sliding-window logic and
//! [`HeaderFinalityTracker`] drives it from a header subscription.

mod tracker;

pub use tracker::{HeaderFinalityTracker, HeaderWindow};
