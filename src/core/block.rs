//! Block structure with proof-of-work mining
//!
//! A block commits to an ordered list of transactions through a merkle root
//! and chains to prior history through the previous block's header hash.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::transaction::{Outpoint, Transaction, TransactionOutput};
use crate::crypto::{calculate_merkle_root, double_sha256, NULL_HASH};

/// Default mining difficulty (leading zero hex characters of the header hash)
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// A block in the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block height
    pub index: u64,
    /// Cached header hash, recomputed whenever the header changes
    pub hash: String,
    /// Hash of the previous block ([`NULL_HASH`] for the genesis block)
    pub previous_hash: String,
    /// Merkle root over the contained transactions' ids
    pub merkle_root: String,
    /// Creation time (unix seconds)
    pub timestamp: i64,
    /// Proof-of-work nonce
    pub nonce: u64,
    /// Difficulty the block was mined at
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Ordered transactions; the first must be the coinbase
    pub transactions: Vec<Transaction>,
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

impl Block {
    /// Create a new unmined block.
    ///
    /// The merkle root is always derived from the supplied transactions
    /// here; it is never accepted from deserialized input.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        difficulty: u32,
    ) -> Self {
        let tx_ids: Vec<String> = transactions.iter().map(|tx| tx.id.clone()).collect();
        let merkle_root = calculate_merkle_root(&tx_ids);

        let mut block = Self {
            index,
            hash: String::new(),
            previous_hash,
            merkle_root,
            timestamp: Utc::now().timestamp(),
            nonce: 0,
            difficulty,
            transactions,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create an unmined genesis block carrying only the given coinbase
    /// reward
    pub fn genesis(miner_address: &str, reward: u64, difficulty: u32) -> Self {
        let coinbase = Transaction::coinbase(miner_address, reward, 0);
        Self::new(0, vec![coinbase], NULL_HASH.to_string(), difficulty)
    }

    /// Header hash: double-SHA-256 over the canonical (key-sorted) header
    /// JSON, hex-encoded without the byte reversal that transaction ids and
    /// merkle nodes use.
    pub fn calculate_hash(&self) -> String {
        let header = json!({
            "index": self.index,
            "previous_hash": self.previous_hash,
            "merkle_root": self.merkle_root,
            "timestamp": self.timestamp,
            "difficulty": self.difficulty,
            "nonce": self.nonce,
        });
        hex::encode(double_sha256(header.to_string().as_bytes()))
    }

    /// The contained transactions' ids, in block order
    pub fn transaction_ids(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.id.clone()).collect()
    }

    /// The coinbase transaction, if the block has one in first position
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Mine the block: brute-force the nonce from its current value until
    /// the header hash has at least `difficulty` leading zero hex
    /// characters. Returns the number of hash attempts.
    pub fn mine(&mut self, difficulty: u32) -> u64 {
        let target = "0".repeat(difficulty as usize);
        let mut attempts = 0u64;

        log::info!("mining block {} at difficulty {}", self.index, difficulty);

        loop {
            self.hash = self.calculate_hash();
            attempts += 1;

            if self.hash.starts_with(&target) {
                log::info!(
                    "block {} mined after {} attempts: {}",
                    self.index,
                    attempts,
                    self.hash
                );
                return attempts;
            }

            self.nonce += 1;
        }
    }

    /// Bounded variant of [`mine`](Self::mine): identical nonce order, but
    /// gives up after `max_attempts` header hashes.
    ///
    /// Returns `None` when the budget runs out; the nonce is left at the
    /// last attempted value, so a later call resumes the search where this
    /// one stopped.
    pub fn mine_with_budget(&mut self, difficulty: u32, max_attempts: u64) -> Option<u64> {
        let target = "0".repeat(difficulty as usize);
        let mut attempts = 0u64;

        while attempts < max_attempts {
            self.hash = self.calculate_hash();
            attempts += 1;

            if self.hash.starts_with(&target) {
                return Some(attempts);
            }

            self.nonce += 1;
        }

        None
    }

    /// Check the proof of work without recomputing anything
    pub fn is_valid_proof(&self, difficulty: u32) -> bool {
        self.hash.starts_with(&"0".repeat(difficulty as usize))
    }

    /// Validate the block's transactions against the supplied previous
    /// outputs: the list must be non-empty, the first transaction must be
    /// the coinbase, every other transaction must verify, and the stored
    /// merkle root must match a fresh recomputation.
    pub fn validate_transactions(
        &self,
        prev_outputs: &HashMap<Outpoint, TransactionOutput>,
    ) -> bool {
        if self.transactions.is_empty() {
            log::warn!("block {} has no transactions", self.index);
            return false;
        }

        if !self.transactions[0].is_coinbase() {
            log::warn!("block {}: first transaction is not a coinbase", self.index);
            return false;
        }

        for (index, tx) in self.transactions.iter().enumerate().skip(1) {
            if !tx.verify(prev_outputs) {
                log::warn!(
                    "block {}: transaction {} ({}) failed verification",
                    self.index,
                    index,
                    tx.id
                );
                return false;
            }
        }

        if self.merkle_root != calculate_merkle_root(&self.transaction_ids()) {
            log::warn!("block {}: merkle root mismatch", self.index);
            return false;
        }

        true
    }
}
