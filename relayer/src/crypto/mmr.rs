// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! MMR proof simplification.
//!
//! The relay chain returns MMR proofs as `[left peaks.., merkle path.., bagged
//! right peaks]`. The Ethereum light client instead folds a flat list of
//! siblings, where bit `i` of the order field says sibling `i` is hashed on the
//! left. Peaks are bagged right to left as `keccak(right ++ left)`.

use crate::crypto::keccak256;
use crate::error::{RelayError, RelayResult};
use crate::types::{MmrLeaf, RawMmrProof};
use ethers::types::H256;

/// Perfect binary subtree of the MMR, addressed by its first leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Peak {
    pub first_leaf: u64,
    pub height: u32,
}

impl Peak {
    pub fn width(&self) -> u64 {
        1u64 << self.height
    }

    pub fn contains(&self, leaf_index: u64) -> bool {
        leaf_index >= self.first_leaf && leaf_index - self.first_leaf < self.width()
    }
}

/// Peaks of an MMR with `leaf_count` leaves, left to right
pub(crate) fn peaks(leaf_count: u64) -> Vec<Peak> {
    let mut peaks = Vec::new();
    let mut first_leaf = 0;
    for height in (0..u64::BITS).rev() {
        let width = 1u64 << height;
        if leaf_count & width != 0 {
            peaks.push(Peak { first_leaf, height });
            first_leaf += width;
        }
    }
    peaks
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifiedMmrProof {
    pub block_hash: H256,
    pub leaf: MmrLeaf,
    pub merkle_proof_items: Vec<H256>,
    pub merkle_proof_order_bit_field: u64,
}

impl SimplifiedMmrProof {
    pub fn from_raw(raw: &RawMmrProof) -> RelayResult<Self> {
        if raw.leaf_index >= raw.leaf_count {
            return Err(RelayError::InvalidMmrProof(format!(
                "leaf index {} out of range for {} leaves",
                raw.leaf_index, raw.leaf_count
            )));
        }

        let peaks = peaks(raw.leaf_count);
        let (position, peak) = peaks
            .iter()
            .enumerate()
            .find(|(_, p)| p.contains(raw.leaf_index))
            .map(|(i, p)| (i, *p))
            .ok_or_else(|| {
                RelayError::InvalidMmrProof(format!("no peak holds leaf {}", raw.leaf_index))
            })?;

        let has_right_peaks = position + 1 < peaks.len();
        let path_len = peak.height as usize;
        let expected = position + path_len + usize::from(has_right_peaks);
        if raw.items.len() != expected {
            return Err(RelayError::InvalidMmrProof(format!(
                "expected {} proof items for leaf {} of {}, got {}",
                expected,
                raw.leaf_index,
                raw.leaf_count,
                raw.items.len()
            )));
        }
        if expected > u64::BITS as usize {
            return Err(RelayError::InvalidMmrProof(format!(
                "{} proof items exceed the order bit field",
                expected
            )));
        }

        let (left_peaks, rest) = raw.items.split_at(position);
        let (path, right_bag) = rest.split_at(path_len);
        let local_index = raw.leaf_index - peak.first_leaf;

        let mut items = Vec::with_capacity(expected);
        let mut order = 0u64;
        for (level, sibling) in path.iter().enumerate() {
            if (local_index >> level) & 1 == 1 {
                order |= 1u64 << items.len();
            }
            items.push(*sibling);
        }
        if let Some(bag) = right_bag.first() {
            order |= 1u64 << items.len();
            items.push(*bag);
        }
        items.extend(left_peaks.iter().rev());

        Ok(Self {
            block_hash: raw.block_hash,
            leaf: raw.leaf,
            merkle_proof_items: items,
            merkle_proof_order_bit_field: order,
        })
    }

    /// Root implied by folding the leaf hash with every proof item
    pub fn calculate_root(&self) -> H256 {
        self.merkle_proof_items
            .iter()
            .enumerate()
            .fold(self.leaf.hash(), |acc, (i, sibling)| {
                if (self.merkle_proof_order_bit_field >> i) & 1 == 1 {
                    keccak256(&[sibling.as_bytes(), acc.as_bytes()].concat())
                } else {
                    keccak256(&[acc.as_bytes(), sibling.as_bytes()].concat())
                }
            })
    }

    pub fn verify(&self, root: H256) -> bool {
        self.calculate_root() == root
    }
}
