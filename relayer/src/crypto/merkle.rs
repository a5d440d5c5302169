// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parachain heads Merkle proofs.
//!
//! The relay chain commits to all parachain heads of a block with a binary
//! Merkle tree whose leaves are `keccak256(SCALE((para_id, head)))`, ordered by
//! para id. An odd trailing node is carried up unchanged.

use crate::types::ParaHeads;
use ethers::types::H256;
use parity_scale_codec::Encode;
use rs_merkle::{MerkleProof, MerkleTree};

#[derive(Clone)]
pub struct Keccak256Algorithm;

impl rs_merkle::Hasher for Keccak256Algorithm {
    type Hash = [u8; 32];

    fn hash(data: &[u8]) -> [u8; 32] {
        ethers::utils::keccak256(data)
    }
}

/// Proof that one parachain head is part of a relay block's heads root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProofData {
    pub root: H256,
    pub proof: Vec<H256>,
    pub para_id: u32,
    pub para_head: Vec<u8>,
    pub leaf: H256,
    pub leaf_index: usize,
    pub number_of_leaves: usize,
}

impl MerkleProofData {
    pub fn verify(&self) -> bool {
        let hashes: Vec<[u8; 32]> = self.proof.iter().map(|h| h.0).collect();
        MerkleProof::<Keccak256Algorithm>::new(hashes).verify(
            self.root.0,
            &[self.leaf_index],
            &[self.leaf.0],
            self.number_of_leaves,
        )
    }
}

pub fn para_head_leaf(para_id: u32, head: &[u8]) -> [u8; 32] {
    ethers::utils::keccak256((para_id, head.to_vec()).encode())
}

/// Build the heads tree for `heads` and extract the proof for `para_id`.
///
/// Returns `None` when `para_id` has no head in the set.
pub fn build_parachain_heads_proof(heads: &ParaHeads, para_id: u32) -> Option<MerkleProofData> {
    let leaf_index = heads.keys().position(|id| *id == para_id)?;
    let para_head = heads.get(&para_id)?.clone();

    let leaves: Vec<[u8; 32]> = heads
        .iter()
        .map(|(id, head)| para_head_leaf(*id, head))
        .collect();
    let tree = MerkleTree::<Keccak256Algorithm>::from_leaves(&leaves);
    let root = tree.root()?;
    let proof = tree
        .proof(&[leaf_index])
        .proof_hashes()
        .iter()
        .map(|h| H256::from(*h))
        .collect();

    Some(MerkleProofData {
        root: H256::from(root),
        proof,
        para_id,
        para_head,
        leaf: H256::from(leaves[leaf_index]),
        leaf_index,
        number_of_leaves: leaves.len(),
    })
}

/// Root of the heads tree, as stored in the MMR leaf's `parachain_heads`
pub fn parachain_heads_root(heads: &ParaHeads) -> H256 {
    let leaves: Vec<[u8; 32]> = heads
        .iter()
        .map(|(id, head)| para_head_leaf(*id, head))
        .collect();
    MerkleTree::<Keccak256Algorithm>::from_leaves(&leaves)
        .root()
        .map(H256::from)
        .unwrap_or_else(H256::zero)
}
