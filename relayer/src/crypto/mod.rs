// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Hashing and proof helpers for the catch-up pipeline.
//!
//! - [`merkle`]: binary Merkle tree over the parachain heads of one relay block
//! - [`mmr`]: conversion of relay-chain MMR proofs into the linear form the
//!   Ethereum light client verifies

pub mod merkle;
pub mod mmr;

use crate::error::{RelayError, RelayResult};
use ethers::core::k256::ecdsa::VerifyingKey;
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::types::{Address as EthAddress, H256};

pub use merkle::{build_parachain_heads_proof, Keccak256Algorithm, MerkleProofData};
pub use mmr::SimplifiedMmrProof;

pub fn keccak256(data: &[u8]) -> H256 {
    H256::from(ethers::utils::keccak256(data))
}

/// Ethereum address of a compressed (33 byte) secp256k1 BEEFY authority key
pub fn authority_key_to_eth_address(compressed: &[u8]) -> RelayResult<EthAddress> {
    let pubkey = VerifyingKey::from_sec1_bytes(compressed)
        .map_err(|e| RelayError::Decode(format!("invalid authority key: {}", e)))?;
    let affine: &ethers::core::k256::AffinePoint = pubkey.as_ref();
    let encoded = affine.to_encoded_point(false);
    // Drop the 0x04 SEC1 tag
    let raw = &encoded.as_bytes()[1..];
    let hash = keccak256(raw);
    Ok(EthAddress::from_slice(&hash.as_bytes()[12..]))
}
