//! Transaction handling for the ledger
//!
//! Implements the UTXO transaction model: inputs consume previous outputs,
//! outputs lock value to an address, and each input carries a signature
//! script proving ownership of the output it spends.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::crypto::{
    double_sha256, reversed_hex, KeyError, Network, PrivateKey, PublicKey, NULL_HASH,
};

// =============================================================================
// Constants
// =============================================================================

/// Current transaction version
pub const TX_VERSION: u32 = 1;

/// Default sequence number
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Reserved output index used by coinbase inputs
pub const COINBASE_OUTPUT_INDEX: u32 = 0xffff_ffff;

/// Smallest unit of value: 1 coin = 100,000,000 guidos
pub const GUIDOS_PER_COIN: u64 = 100_000_000;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("input index {0} out of range")]
    InputIndexOutOfRange(usize),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

// =============================================================================
// Outpoint
// =============================================================================

/// The unique identity of a spendable output: the id of the transaction
/// that created it plus the output's position in that transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outpoint {
    pub txid: String,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// Transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Id of the transaction whose output is being spent
    pub prev_tx_id: String,
    /// Index of the output in the previous transaction
    pub prev_output_index: u32,
    /// Unlocking script: `hex(signature) + ":" + hex(compressed pubkey)`
    #[serde(default)]
    pub signature_script: String,
    /// Sequence number
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    /// Locking script of the spent output, copied here at signing time.
    /// Reference only; not part of the persisted record.
    #[serde(skip)]
    pub pubkey_script: String,
}

fn default_sequence() -> u32 {
    SEQUENCE_FINAL
}

impl TransactionInput {
    /// Create an unsigned input spending the given outpoint
    pub fn new(prev_tx_id: impl Into<String>, prev_output_index: u32) -> Self {
        Self {
            prev_tx_id: prev_tx_id.into(),
            prev_output_index,
            signature_script: String::new(),
            sequence: SEQUENCE_FINAL,
            pubkey_script: String::new(),
        }
    }

    /// The outpoint this input consumes
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(self.prev_tx_id.clone(), self.prev_output_index)
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output locking value to an address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Amount in guidos
    pub amount: u64,
    /// Recipient's address
    pub recipient_address: String,
    /// Locking script, carried opaquely
    #[serde(default)]
    pub pubkey_script: String,
}

impl TransactionOutput {
    pub fn new(amount: u64, recipient_address: impl Into<String>) -> Self {
        Self {
            amount,
            recipient_address: recipient_address.into(),
            pubkey_script: String::new(),
        }
    }

    /// Check whether this output is locked to the given address
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.recipient_address == address
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A ledger transaction.
///
/// The id is a pure function of the canonical signing form (which never
/// includes unlocking scripts) and is recomputed explicitly at the end of
/// every mutation, so there is no hidden lazy state to go stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Cached transaction id, recomputed after any input is (re)signed
    #[serde(rename = "tx_id")]
    pub id: String,
    /// Transaction version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Creation time; informational, not covered by the id
    pub timestamp: DateTime<Utc>,
    /// Ordered inputs
    pub inputs: Vec<TransactionInput>,
    /// Ordered outputs
    pub outputs: Vec<TransactionOutput>,
    /// Lock time; coinbase transactions carry the block height here
    #[serde(default)]
    pub lock_time: u32,
}

fn default_version() -> u32 {
    TX_VERSION
}

impl Transaction {
    /// Create a new unsigned transaction
    pub fn new(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        Self::with_lock_time(inputs, outputs, 0)
    }

    /// Create a new unsigned transaction with an explicit lock time
    pub fn with_lock_time(
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
        lock_time: u32,
    ) -> Self {
        let mut tx = Self {
            id: String::new(),
            version: TX_VERSION,
            timestamp: Utc::now(),
            inputs,
            outputs,
            lock_time,
        };
        tx.id = tx.calculate_id();
        tx
    }

    /// Create a coinbase (reward-minting) transaction for a block.
    ///
    /// The unlocking script embeds the height by convention but sits outside
    /// the id preimage, so the height is also carried in `lock_time` to keep
    /// coinbase ids distinct across blocks paying the same reward to the
    /// same miner.
    pub fn coinbase(recipient_address: &str, amount: u64, block_height: u64) -> Self {
        let input = TransactionInput {
            prev_tx_id: NULL_HASH.to_string(),
            prev_output_index: COINBASE_OUTPUT_INDEX,
            signature_script: format!("coinbase_block_{block_height}"),
            sequence: SEQUENCE_FINAL,
            pubkey_script: String::new(),
        };
        let output = TransactionOutput::new(amount, recipient_address);

        Self::with_lock_time(vec![input], vec![output], block_height as u32)
    }

    /// Whether this is a coinbase transaction: exactly one input spending
    /// the null outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_tx_id == NULL_HASH
    }

    /// Canonical signing form: a key-sorted JSON serialization of the
    /// transaction with every input reduced to its outpoint and sequence.
    ///
    /// Unlocking scripts are deliberately excluded (including them would
    /// make signing self-referential), so the form is identical before and
    /// after signing.
    pub fn serialize_for_signing(&self) -> String {
        let data = json!({
            "version": self.version,
            "inputs": self
                .inputs
                .iter()
                .map(|input| {
                    json!({
                        "prev_tx_id": input.prev_tx_id,
                        "prev_output_index": input.prev_output_index,
                        "sequence": input.sequence,
                    })
                })
                .collect::<Vec<_>>(),
            "outputs": self
                .outputs
                .iter()
                .map(|output| {
                    json!({
                        "amount": output.amount,
                        "recipient_address": output.recipient_address,
                        "pubkey_script": output.pubkey_script,
                    })
                })
                .collect::<Vec<_>>(),
            "lock_time": self.lock_time,
        });
        data.to_string()
    }

    /// The 32-byte digest every input signature commits to
    fn signing_digest(&self) -> Vec<u8> {
        double_sha256(self.serialize_for_signing().as_bytes())
    }

    /// Transaction id: double-SHA-256 of the canonical signing form,
    /// hex-encoded with the byte order reversed (the display convention
    /// shared with merkle nodes; block header hashes are not reversed).
    pub fn calculate_id(&self) -> String {
        reversed_hex(&self.signing_digest())
    }

    /// Sign one input with the given private key.
    ///
    /// Stores the unlocking script on the input, copies the previous
    /// output's locking script for reference, and recomputes the cached id
    /// as the visible final step of the mutation.
    pub fn sign_input(
        &mut self,
        input_index: usize,
        private_key: &PrivateKey,
        prev_pubkey_script: &str,
    ) -> Result<(), TransactionError> {
        if input_index >= self.inputs.len() {
            return Err(TransactionError::InputIndexOutOfRange(input_index));
        }

        let digest = self.signing_digest();
        let signature = private_key.sign(&digest)?;
        let pubkey_hex = private_key.public_key().to_hex(true);

        let input = &mut self.inputs[input_index];
        input.signature_script = format!("{}:{}", hex::encode(signature), pubkey_hex);
        input.pubkey_script = prev_pubkey_script.to_string();

        self.id = self.calculate_id();
        Ok(())
    }

    /// Verify the signature on one input against the output it spends.
    ///
    /// The sole locking-script check is ownership by address: the embedded
    /// public key must hash to the previous output's recipient address.
    /// Returns `false` for malformed scripts rather than raising.
    pub fn verify_input(&self, input_index: usize, prev_output: &TransactionOutput) -> bool {
        let Some(input) = self.inputs.get(input_index) else {
            return false;
        };
        let Some((sig_hex, pubkey_hex)) = input.signature_script.split_once(':') else {
            return false;
        };
        let Ok(signature) = hex::decode(sig_hex) else {
            return false;
        };
        let Ok(public_key) = PublicKey::from_hex(pubkey_hex) else {
            return false;
        };

        if public_key.to_address(true, Network::Mainnet) != prev_output.recipient_address {
            return false;
        }

        // The digest covers the canonical form with every unlocking script
        // blanked; stored scripts cannot influence it.
        public_key.verify(&self.signing_digest(), &signature)
    }

    /// Verify every input against the supplied previous-output map.
    ///
    /// Fails if any referenced outpoint is missing from the map. Value
    /// conservation is a separate caller responsibility.
    pub fn verify(&self, prev_outputs: &HashMap<Outpoint, TransactionOutput>) -> bool {
        for (index, input) in self.inputs.iter().enumerate() {
            let outpoint = input.outpoint();
            let Some(prev_output) = prev_outputs.get(&outpoint) else {
                log::debug!("previous output not found: {outpoint}");
                return false;
            };
            if !self.verify_input(index, prev_output) {
                log::debug!("input {index} of transaction {} failed verification", self.id);
                return false;
            }
        }
        true
    }

    /// Total value consumed, resolved against the supplied previous outputs
    pub fn input_value(&self, prev_outputs: &HashMap<Outpoint, TransactionOutput>) -> u64 {
        self.inputs
            .iter()
            .filter_map(|input| prev_outputs.get(&input.outpoint()))
            .map(|output| output.amount)
            .sum()
    }

    /// Total value produced
    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|output| output.amount).sum()
    }

    /// Implicit fee: inputs minus outputs
    pub fn fee(&self, prev_outputs: &HashMap<Outpoint, TransactionOutput>) -> u64 {
        self.input_value(prev_outputs)
            .saturating_sub(self.output_value())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_input(key: &PrivateKey, amount: u64) -> (TransactionOutput, Outpoint) {
        let address = key.public_key().to_address(true, Network::Mainnet);
        let prev_output = TransactionOutput::new(amount, address);
        let outpoint = Outpoint::new("a".repeat(64), 0);
        (prev_output, outpoint)
    }

    #[test]
    fn test_id_is_stable_across_signing() {
        let key = PrivateKey::generate();
        let (prev_output, outpoint) = funded_input(&key, 1000);

        let mut tx = Transaction::new(
            vec![TransactionInput::new(outpoint.txid.clone(), outpoint.vout)],
            vec![TransactionOutput::new(900, "recipient")],
        );

        let unsigned_id = tx.id.clone();
        tx.sign_input(0, &key, &prev_output.pubkey_script).unwrap();

        // Signing recomputes the cached id, but the id never covers the
        // unlocking script, so the value is unchanged.
        assert_eq!(tx.id, unsigned_id);
        assert_eq!(tx.id, tx.calculate_id());
    }

    #[test]
    fn test_sign_and_verify_input() {
        let key = PrivateKey::generate();
        let (prev_output, outpoint) = funded_input(&key, 1000);

        let mut tx = Transaction::new(
            vec![TransactionInput::new(outpoint.txid.clone(), outpoint.vout)],
            vec![TransactionOutput::new(900, "recipient")],
        );
        tx.sign_input(0, &key, &prev_output.pubkey_script).unwrap();

        assert!(tx.verify_input(0, &prev_output));
    }

    #[test]
    fn test_verify_input_rejects_wrong_owner() {
        let key = PrivateKey::generate();
        let (_, outpoint) = funded_input(&key, 1000);

        // The output is locked to someone else's address
        let other = PrivateKey::generate();
        let foreign_output =
            TransactionOutput::new(1000, other.public_key().to_address(true, Network::Mainnet));

        let mut tx = Transaction::new(
            vec![TransactionInput::new(outpoint.txid.clone(), outpoint.vout)],
            vec![TransactionOutput::new(900, "recipient")],
        );
        tx.sign_input(0, &key, "").unwrap();

        assert!(!tx.verify_input(0, &foreign_output));
    }

    #[test]
    fn test_flipped_signature_byte_fails_only_that_input() {
        let key = PrivateKey::generate();
        let address = key.public_key().to_address(true, Network::Mainnet);
        let prev_a = TransactionOutput::new(500, address.clone());
        let prev_b = TransactionOutput::new(700, address);

        let mut tx = Transaction::new(
            vec![
                TransactionInput::new("a".repeat(64), 0),
                TransactionInput::new("b".repeat(64), 1),
            ],
            vec![TransactionOutput::new(1000, "recipient")],
        );
        tx.sign_input(0, &key, "").unwrap();
        tx.sign_input(1, &key, "").unwrap();

        // Corrupt one hex digit of the first input's signature
        let script = tx.inputs[0].signature_script.clone();
        let mut chars: Vec<char> = script.chars().collect();
        chars[10] = if chars[10] == '0' { '1' } else { '0' };
        tx.inputs[0].signature_script = chars.into_iter().collect();

        assert!(!tx.verify_input(0, &prev_a));
        assert!(tx.verify_input(1, &prev_b));
    }

    #[test]
    fn test_verify_requires_known_outpoints() {
        let key = PrivateKey::generate();
        let (prev_output, outpoint) = funded_input(&key, 1000);

        let mut tx = Transaction::new(
            vec![TransactionInput::new(outpoint.txid.clone(), outpoint.vout)],
            vec![TransactionOutput::new(900, "recipient")],
        );
        tx.sign_input(0, &key, "").unwrap();

        let empty = HashMap::new();
        assert!(!tx.verify(&empty));

        let mut prev_outputs = HashMap::new();
        prev_outputs.insert(outpoint, prev_output);
        assert!(tx.verify(&prev_outputs));
    }

    #[test]
    fn test_sign_input_out_of_range() {
        let key = PrivateKey::generate();
        let mut tx = Transaction::new(vec![], vec![TransactionOutput::new(1, "recipient")]);

        assert!(matches!(
            tx.sign_input(0, &key, ""),
            Err(TransactionError::InputIndexOutOfRange(0))
        ));
    }

    #[test]
    fn test_values_and_fee() {
        let key = PrivateKey::generate();
        let (prev_output, outpoint) = funded_input(&key, 1000);

        let tx = Transaction::new(
            vec![TransactionInput::new(outpoint.txid.clone(), outpoint.vout)],
            vec![
                TransactionOutput::new(700, "recipient"),
                TransactionOutput::new(250, "change"),
            ],
        );

        let mut prev_outputs = HashMap::new();
        prev_outputs.insert(outpoint, prev_output);

        assert_eq!(tx.input_value(&prev_outputs), 1000);
        assert_eq!(tx.output_value(), 950);
        assert_eq!(tx.fee(&prev_outputs), 50);
    }

    #[test]
    fn test_coinbase_shape() {
        let tx = Transaction::coinbase("miner", 50 * GUIDOS_PER_COIN, 7);

        assert!(tx.is_coinbase());
        assert_eq!(tx.inputs[0].prev_tx_id, NULL_HASH);
        assert_eq!(tx.inputs[0].prev_output_index, COINBASE_OUTPUT_INDEX);
        assert_eq!(tx.inputs[0].signature_script, "coinbase_block_7");
        assert_eq!(tx.output_value(), 50 * GUIDOS_PER_COIN);
    }

    #[test]
    fn test_coinbase_ids_unique_per_height() {
        let tx1 = Transaction::coinbase("miner", 50 * GUIDOS_PER_COIN, 1);
        let tx2 = Transaction::coinbase("miner", 50 * GUIDOS_PER_COIN, 2);
        assert_ne!(tx1.id, tx2.id);
    }

    #[test]
    fn test_ordinary_transaction_is_not_coinbase() {
        let tx = Transaction::new(
            vec![TransactionInput::new("a".repeat(64), 0)],
            vec![TransactionOutput::new(1, "recipient")],
        );
        assert!(!tx.is_coinbase());
    }
}
