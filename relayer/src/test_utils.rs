// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::keccak256;
use crate::crypto::merkle::parachain_heads_root;
use crate::crypto::mmr::{peaks, Peak};
use crate::error::{RelayError, RelayResult};
use crate::ethereum::EthereumClient;
use crate::parachain::ParachainClient;
use crate::relaychain::RelayChainClient;
use crate::types::{
    AuxiliaryDigestItem, BeefyNextAuthoritySet, ChannelId, Commitment, Digest, DigestItem,
    EthHeader, MessageBatch, MmrLeaf, OutboundMessage, ParaHeader, ParaHeads, RawMmrProof,
    SignedCommitment, VerificationEvent,
};
use async_trait::async_trait;
use ethers::types::{Address as EthAddress, H256};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use hex_literal::hex;
use parity_scale_codec::Encode;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const TEST_PARA_ID: u32 = 1000;
const NEIGHBOUR_PARA_ID: u32 = 2000;

/// Compressed BEEFY authority keys with known Ethereum addresses
pub const TEST_AUTHORITY_KEYS: [[u8; 33]; 2] = [
    hex!("02321ede33d2c2d7a8a152f275a1484edef2098f034121a602cb7d767d38680aa4"),
    hex!("0376698beebe8ee5c74d8cc50ab84ac301ee8f10af6f28d0ffd6adf4d6d3b9b762"),
];

pub fn init_for_testing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Signed commitment with `sig_count` signatures followed by one empty slot
pub fn signed_commitment(block_number: u32, validator_set_id: u64, sig_count: usize) -> SignedCommitment {
    let mut signatures: Vec<Option<[u8; 65]>> =
        (0..sig_count).map(|i| Some([i as u8 + 1; 65])).collect();
    signatures.push(None);
    SignedCommitment {
        commitment: Commitment {
            payload: keccak256(&block_number.to_be_bytes()).0,
            block_number,
            validator_set_id,
        },
        signatures,
    }
}

pub fn encode_hex(commitment: &SignedCommitment) -> String {
    format!("0x{}", hex::encode(commitment.encode()))
}

fn eth_block_hash(number: u64) -> H256 {
    keccak256(&[b"eth".as_slice(), &number.to_be_bytes()].concat())
}

pub fn eth_header(number: u64) -> EthHeader {
    EthHeader {
        number,
        hash: eth_block_hash(number),
        parent_hash: eth_block_hash(number.saturating_sub(1)),
    }
}

/// Relay block hashes carry their number in the low bytes
pub fn relay_block_hash(number: u64) -> H256 {
    let mut hash = H256::from_low_u64_be(number);
    hash.0[0] = 0x5e;
    hash
}

fn relay_block_number(hash: H256) -> u64 {
    hash.to_low_u64_be()
}

/// Fixture block hash; the mocks never compare it with a real parachain hash
pub fn fixture_header_hash(header: &ParaHeader) -> H256 {
    keccak256(&header.encode())
}

pub fn test_mmr_leaf(index: u64) -> MmrLeaf {
    MmrLeaf {
        version: 0,
        parent_number_and_hash: (index as u32, keccak256(&index.to_le_bytes()).0),
        beefy_next_authority_set: BeefyNextAuthoritySet {
            id: 1,
            len: 2,
            root: [3u8; 32],
        },
        parachain_heads: keccak256(&(index + 1).to_le_bytes()).0,
    }
}

/// In-memory MMR producing proofs in the relay chain's raw layout
pub struct TestMmr {
    leaves: Vec<MmrLeaf>,
    hashes: Vec<H256>,
}

impl TestMmr {
    pub fn new(leaf_count: u64) -> Self {
        Self::from_leaves((0..leaf_count).map(test_mmr_leaf).collect())
    }

    pub fn from_leaves(leaves: Vec<MmrLeaf>) -> Self {
        let hashes = leaves.iter().map(|l| l.hash()).collect();
        Self { leaves, hashes }
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    fn subtree_root(&self, first_leaf: u64, height: u32) -> H256 {
        if height == 0 {
            return self.hashes[first_leaf as usize];
        }
        let half = 1u64 << (height - 1);
        let left = self.subtree_root(first_leaf, height - 1);
        let right = self.subtree_root(first_leaf + half, height - 1);
        keccak256(&[left.as_bytes(), right.as_bytes()].concat())
    }

    fn bag(&self, peaks: &[Peak]) -> Option<H256> {
        peaks
            .iter()
            .rev()
            .map(|p| self.subtree_root(p.first_leaf, p.height))
            .reduce(|right, left| keccak256(&[right.as_bytes(), left.as_bytes()].concat()))
    }

    pub fn root(&self) -> H256 {
        self.bag(&peaks(self.leaf_count())).unwrap_or_default()
    }

    pub fn raw_proof(&self, leaf_index: u64) -> RawMmrProof {
        let peaks = peaks(self.leaf_count());
        let position = peaks
            .iter()
            .position(|p| p.contains(leaf_index))
            .expect("leaf index within the mmr");
        let peak = peaks[position];

        let mut items: Vec<H256> = peaks[..position]
            .iter()
            .map(|p| self.subtree_root(p.first_leaf, p.height))
            .collect();
        let local = leaf_index - peak.first_leaf;
        for level in 0..peak.height {
            let sibling = ((local >> level) ^ 1) << level;
            items.push(self.subtree_root(peak.first_leaf + sibling, level));
        }
        if let Some(bag) = self.bag(&peaks[position + 1..]) {
            items.push(bag);
        }

        RawMmrProof {
            block_hash: H256::zero(),
            leaf: self.leaves[leaf_index as usize],
            leaf_index,
            leaf_count: self.leaf_count(),
            items,
        }
    }
}

type StorageKey = (H256, &'static str, &'static str);

#[derive(Default)]
pub struct MockRelayChainClient {
    // Each segment is served by one subscription; the last stays open
    justifications: Mutex<VecDeque<Vec<String>>>,
    subscriptions: AtomicUsize,
    storage: Mutex<HashMap<StorageKey, Vec<u8>>>,
    storage_reads: AtomicUsize,
    failing_storage_reads: AtomicUsize,
    para_heads: Mutex<HashMap<H256, ParaHeads>>,
    para_heads_fetches: AtomicUsize,
    mmr_leaves: Mutex<Vec<MmrLeaf>>,
}

impl MockRelayChainClient {
    pub fn push_justification(&self, message: String) {
        let mut segments = self.justifications.lock().unwrap();
        if segments.is_empty() {
            segments.push_back(Vec::new());
        }
        segments.back_mut().unwrap().push(message);
    }

    /// End the current subscription after the messages pushed so far
    pub fn end_subscription(&self) {
        let mut segments = self.justifications.lock().unwrap();
        if segments.is_empty() {
            segments.push_back(Vec::new());
        }
        segments.push_back(Vec::new());
    }

    pub fn set_storage(&self, at: H256, pallet: &'static str, item: &'static str, value: Vec<u8>) {
        self.storage
            .lock()
            .unwrap()
            .insert((at, pallet, item), value);
    }

    pub fn set_authorities(&self, block_number: u64, keys: &[[u8; 33]]) {
        self.set_storage(
            relay_block_hash(block_number),
            "Beefy",
            "Authorities",
            keys.to_vec().encode(),
        );
    }

    pub fn set_para_heads(&self, at: H256, heads: ParaHeads) {
        self.para_heads.lock().unwrap().insert(at, heads);
    }

    /// Leaves in MMR order; leaf `i` belongs to block `beefy_starting_block + i`
    pub fn set_mmr_leaves(&self, leaves: Vec<MmrLeaf>) {
        *self.mmr_leaves.lock().unwrap() = leaves;
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn storage_reads(&self) -> usize {
        self.storage_reads.load(Ordering::SeqCst)
    }

    /// Fail the next `times` storage reads with an RPC error
    pub fn fail_storage_reads(&self, times: usize) {
        self.failing_storage_reads.store(times, Ordering::SeqCst);
    }

    pub fn para_heads_fetches(&self) -> usize {
        self.para_heads_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelayChainClient for MockRelayChainClient {
    async fn subscribe_justifications(&self) -> RelayResult<BoxStream<'static, String>> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let mut segments = self.justifications.lock().unwrap();
        if segments.len() > 1 {
            let segment = segments.pop_front().unwrap_or_default();
            Ok(stream::iter(segment).boxed())
        } else {
            let segment = segments.pop_front().unwrap_or_default();
            Ok(stream::iter(segment).chain(stream::pending()).boxed())
        }
    }

    async fn get_block_hash(&self, number: u64) -> RelayResult<H256> {
        Ok(relay_block_hash(number))
    }

    async fn read_storage(
        &self,
        at: H256,
        pallet: &'static str,
        item: &'static str,
    ) -> RelayResult<Option<Vec<u8>>> {
        self.storage_reads.fetch_add(1, Ordering::SeqCst);
        if self
            .failing_storage_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RelayError::Rpc("storage read failed".to_string()));
        }
        Ok(self.storage.lock().unwrap().get(&(at, pallet, item)).cloned())
    }

    async fn fetch_para_heads(&self, at: H256) -> RelayResult<ParaHeads> {
        self.para_heads_fetches.fetch_add(1, Ordering::SeqCst);
        self.para_heads
            .lock()
            .unwrap()
            .get(&at)
            .cloned()
            .ok_or_else(|| RelayError::Rpc(format!("no para heads at {:?}", at)))
    }

    async fn fetch_mmr_proof(
        &self,
        leaf_block: u64,
        at: H256,
        beefy_starting_block: u64,
    ) -> RelayResult<RawMmrProof> {
        let at_number = relay_block_number(at);
        let leaves = self.mmr_leaves.lock().unwrap();
        if leaf_block < beefy_starting_block || leaf_block > at_number {
            return Err(RelayError::Rpc(format!(
                "no mmr leaf for block {} at block {}",
                leaf_block, at_number
            )));
        }
        let leaf_count = (at_number + 1 - beefy_starting_block) as usize;
        if leaf_count > leaves.len() {
            return Err(RelayError::Rpc(format!("mmr not built up to block {}", at_number)));
        }
        let mmr = TestMmr::from_leaves(leaves[..leaf_count].to_vec());
        let mut proof = mmr.raw_proof(leaf_block - beefy_starting_block);
        proof.block_hash = at;
        Ok(proof)
    }
}

#[derive(Default)]
pub struct MockParachainClient {
    hashes: Mutex<HashMap<u64, H256>>,
    headers: Mutex<HashMap<H256, ParaHeader>>,
    storage: Mutex<HashMap<StorageKey, Vec<u8>>>,
    batches: Mutex<HashMap<(ChannelId, H256), MessageBatch>>,
    header_failures: Mutex<HashMap<H256, usize>>,
}

impl MockParachainClient {
    pub fn add_header(&self, header: ParaHeader) -> H256 {
        let hash = fixture_header_hash(&header);
        self.hashes
            .lock()
            .unwrap()
            .insert(header.number as u64, hash);
        self.headers.lock().unwrap().insert(hash, header);
        hash
    }

    pub fn add_batch(&self, channel: ChannelId, commitment_hash: H256, batch: MessageBatch) {
        self.batches
            .lock()
            .unwrap()
            .insert((channel, commitment_hash), batch);
    }

    pub fn set_outbound_nonce(&self, at: H256, channel: ChannelId, nonce: u64) {
        self.storage
            .lock()
            .unwrap()
            .insert((at, channel.outbound_pallet(), "Nonce"), nonce.encode());
    }

    /// Fail the next `times` header reads of block `number`
    pub fn fail_header_reads(&self, number: u64, times: usize) {
        let hash = self.hashes.lock().unwrap()[&number];
        self.header_failures.lock().unwrap().insert(hash, times);
    }
}

#[async_trait]
impl ParachainClient for MockParachainClient {
    async fn get_block_hash(&self, number: u64) -> RelayResult<H256> {
        self.hashes
            .lock()
            .unwrap()
            .get(&number)
            .copied()
            .ok_or_else(|| RelayError::Rpc(format!("unknown parachain block {}", number)))
    }

    async fn get_header(&self, hash: H256) -> RelayResult<ParaHeader> {
        if let Some(remaining) = self.header_failures.lock().unwrap().get_mut(&hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RelayError::Rpc("connection reset".to_string()));
            }
        }
        self.headers
            .lock()
            .unwrap()
            .get(&hash)
            .cloned()
            .ok_or_else(|| RelayError::Rpc(format!("unknown parachain header {:?}", hash)))
    }

    async fn read_storage(
        &self,
        at: H256,
        pallet: &'static str,
        item: &'static str,
    ) -> RelayResult<Option<Vec<u8>>> {
        Ok(self.storage.lock().unwrap().get(&(at, pallet, item)).cloned())
    }

    async fn get_outbound_messages(
        &self,
        channel: ChannelId,
        commitment_hash: H256,
    ) -> RelayResult<MessageBatch> {
        self.batches
            .lock()
            .unwrap()
            .get(&(channel, commitment_hash))
            .cloned()
            .ok_or_else(|| {
                RelayError::Rpc(format!(
                    "no {} messages for commitment {:?}",
                    channel, commitment_hash
                ))
            })
    }
}

#[derive(Default)]
pub struct MockEthereumClient {
    // channel -> (confirmed, pending)
    inbound_nonces: Mutex<HashMap<EthAddress, (u64, u64)>>,
    events: Mutex<Vec<VerificationEvent>>,
    // Each segment is served by one subscription; the last stays open
    headers: Mutex<VecDeque<Vec<EthHeader>>>,
    header_subscriptions: AtomicUsize,
}

impl MockEthereumClient {
    pub fn set_inbound_nonce(&self, channel: EthAddress, confirmed: u64, pending: u64) {
        self.inbound_nonces
            .lock()
            .unwrap()
            .insert(channel, (confirmed, pending));
    }

    pub fn add_verification_event(&self, event: VerificationEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn push_header(&self, header: EthHeader) {
        let mut segments = self.headers.lock().unwrap();
        if segments.is_empty() {
            segments.push_back(Vec::new());
        }
        segments.back_mut().unwrap().push(header);
    }

    /// End the current header subscription after the headers pushed so far
    pub fn end_header_subscription(&self) {
        let mut segments = self.headers.lock().unwrap();
        if segments.is_empty() {
            segments.push_back(Vec::new());
        }
        segments.push_back(Vec::new());
    }

    pub fn header_subscription_count(&self) -> usize {
        self.header_subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EthereumClient for MockEthereumClient {
    async fn subscribe_new_headers(&self) -> RelayResult<BoxStream<'static, EthHeader>> {
        self.header_subscriptions.fetch_add(1, Ordering::SeqCst);
        let mut segments = self.headers.lock().unwrap();
        let segment = segments.pop_front().unwrap_or_default();
        if segments.is_empty() {
            Ok(stream::iter(segment).chain(stream::pending()).boxed())
        } else {
            Ok(stream::iter(segment).boxed())
        }
    }

    async fn get_inbound_nonce(&self, channel: EthAddress, pending: bool) -> RelayResult<u64> {
        let (confirmed, pending_nonce) = self
            .inbound_nonces
            .lock()
            .unwrap()
            .get(&channel)
            .copied()
            .unwrap_or_default();
        Ok(if pending { pending_nonce } else { confirmed })
    }

    async fn query_verification_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<VerificationEvent>> {
        let mut events: Vec<_> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .copied()
            .collect();
        events.sort_by_key(|e| e.block_number);
        Ok(events)
    }
}

/// Synthetic parachain chain `0..=head` with channel commitments at chosen blocks
pub struct ParachainHistory {
    head: u64,
    messages: BTreeMap<u64, Vec<(ChannelId, Vec<u64>)>>,
}

impl ParachainHistory {
    pub fn new(head: u64) -> Self {
        Self {
            head,
            messages: BTreeMap::new(),
        }
    }

    pub fn with_messages(mut self, block: u64, channel: ChannelId, nonces: &[u64]) -> Self {
        assert!(block <= self.head);
        self.messages
            .entry(block)
            .or_default()
            .push((channel, nonces.to_vec()));
        self
    }

    fn batch(block: u64, channel: ChannelId, nonces: &[u64]) -> MessageBatch {
        let messages = nonces
            .iter()
            .map(|nonce| OutboundMessage {
                target: EthAddress::repeat_byte(0xaa),
                nonce: *nonce,
                fee: match channel {
                    ChannelId::Basic => 0,
                    ChannelId::Incentivized => *nonce as u128 * 10,
                },
                payload: nonce.encode(),
            })
            .collect();
        MessageBatch {
            messages,
            data: (block, channel, nonces.to_vec()).encode(),
        }
    }

    /// Headers in block order, with the batches their digests commit to
    fn build(&self) -> (Vec<ParaHeader>, Vec<(ChannelId, H256, MessageBatch)>) {
        let mut headers: Vec<ParaHeader> = Vec::new();
        let mut batches = Vec::new();
        for number in 0..=self.head {
            let mut logs = vec![DigestItem::PreRuntime(*b"aura", number.encode())];
            for (channel, nonces) in self.messages.get(&number).into_iter().flatten() {
                let batch = Self::batch(number, *channel, nonces);
                let commitment_hash = keccak256(&batch.data);
                logs.push(DigestItem::Other(
                    AuxiliaryDigestItem::Commitment(*channel, commitment_hash.0).encode(),
                ));
                batches.push((*channel, commitment_hash, batch));
            }
            headers.push(ParaHeader {
                parent_hash: headers.last().map(|h| fixture_header_hash(h).0).unwrap_or_default(),
                number: number as u32,
                state_root: keccak256(&number.to_be_bytes()).0,
                extrinsics_root: [0u8; 32],
                digest: Digest { logs },
            });
        }
        (headers, batches)
    }

    pub fn headers(&self) -> Vec<ParaHeader> {
        self.build().0
    }

    pub fn block_hash(&self, number: u64) -> H256 {
        fixture_header_hash(&self.headers()[number as usize])
    }

    pub fn client(&self) -> MockParachainClient {
        let client = MockParachainClient::default();
        let (headers, batches) = self.build();
        for header in headers {
            client.add_header(header);
        }
        for (channel, hash, batch) in batches {
            client.add_batch(channel, hash, batch);
        }
        client
    }
}

/// Synthetic relay chain `0..=head` whose blocks record parachain heads from a
/// [`ParachainHistory`], with an MMR starting at block 1.
///
/// The leaf added at block `b` commits to the para heads of block `b - 1`.
pub struct RelayChainFixture {
    head: u64,
    para_heads: Vec<ParaHeads>,
    leaves: Vec<MmrLeaf>,
    missing_roots: HashSet<u64>,
}

impl RelayChainFixture {
    /// `inclusion(r)` is the parachain block whose head relay block `r` records
    pub fn new(history: &ParachainHistory, head: u64, inclusion: impl Fn(u64) -> u64) -> Self {
        let headers = history.headers();
        let para_heads: Vec<ParaHeads> = (0..=head)
            .map(|r| {
                let mut heads = ParaHeads::new();
                heads.insert(TEST_PARA_ID, headers[inclusion(r) as usize].encode());
                heads.insert(NEIGHBOUR_PARA_ID, r.encode());
                heads
            })
            .collect();
        let leaves = (1..=head)
            .map(|b| MmrLeaf {
                version: 0,
                parent_number_and_hash: ((b - 1) as u32, relay_block_hash(b - 1).0),
                beefy_next_authority_set: BeefyNextAuthoritySet {
                    id: 1,
                    len: TEST_AUTHORITY_KEYS.len() as u32,
                    root: [7u8; 32],
                },
                parachain_heads: parachain_heads_root(&para_heads[(b - 1) as usize]).0,
            })
            .collect();
        Self {
            head,
            para_heads,
            leaves,
            missing_roots: HashSet::new(),
        }
    }

    pub fn block_hash(&self, number: u64) -> H256 {
        relay_block_hash(number)
    }

    /// MMR root stored at relay block `number`
    pub fn mmr_root_at(&self, number: u64) -> H256 {
        TestMmr::from_leaves(self.leaves[..number as usize].to_vec()).root()
    }

    /// Make the leaf added at `block` commit to a wrong heads root
    pub fn corrupt_leaf_heads(&mut self, block: u64) {
        self.leaves[(block - 1) as usize].parachain_heads = [0xee; 32];
    }

    pub fn remove_mmr_root(&mut self, block: u64) {
        self.missing_roots.insert(block);
    }

    pub fn client(&self) -> MockRelayChainClient {
        let client = MockRelayChainClient::default();
        for (number, heads) in self.para_heads.iter().enumerate() {
            client.set_para_heads(relay_block_hash(number as u64), heads.clone());
        }
        client.set_mmr_leaves(self.leaves.clone());
        for number in 1..=self.head {
            let hash = relay_block_hash(number);
            if !self.missing_roots.contains(&number) {
                client.set_storage(hash, "Mmr", "RootHash", self.mmr_root_at(number).0.encode());
            }
            client.set_storage(hash, "Mmr", "NumberOfLeaves", number.encode());
        }
        client
    }
}
