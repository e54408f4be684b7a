//! Wallet implementation
//!
//! Key custody, coin selection and transaction creation, plus a manager for
//! named wallets persisted as a single JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    Blockchain, LedgerError, Outpoint, Transaction, TransactionError, TransactionInput,
    TransactionOutput,
};
use crate::crypto::{KeyError, Network, PrivateKey};

/// Default transaction fee: 0.00001 coin
pub const DEFAULT_FEE: u64 = 1000;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("unknown wallet: {0}")]
    UnknownWallet(String),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("ledger rejected transaction: {0}")]
    Ledger(#[from] LedgerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted wallet record
#[derive(Debug, Serialize, Deserialize)]
struct WalletRecord {
    private_key: String,
    public_key: String,
    address: String,
    wif: String,
}

/// A wallet: one private key and its derived address
pub struct Wallet {
    private_key: PrivateKey,
    address: String,
}

impl Wallet {
    /// Create a wallet with a fresh key
    pub fn new() -> Self {
        Self::from_key(PrivateKey::generate())
    }

    fn from_key(private_key: PrivateKey) -> Self {
        let address = private_key.public_key().to_address(true, Network::Mainnet);
        Self {
            private_key,
            address,
        }
    }

    /// Import a wallet from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, WalletError> {
        Ok(Self::from_key(PrivateKey::from_hex(hex_key)?))
    }

    /// Import a wallet from a wallet-import-format string
    pub fn from_wif(wif: &str) -> Result<Self, WalletError> {
        Ok(Self::from_key(PrivateKey::from_wif(wif)?))
    }

    /// The wallet's address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The wallet's public key as hex (compressed)
    pub fn public_key(&self) -> String {
        self.private_key.public_key().to_hex(true)
    }

    /// The wallet's private key as hex. Keep this secret.
    pub fn private_key(&self) -> String {
        self.private_key.to_hex()
    }

    /// The wallet's private key in wallet import format
    pub fn wif(&self) -> String {
        self.private_key.to_wif(true, Network::Mainnet)
    }

    /// Spendable balance according to the ledger, in guidos
    pub fn balance(&self, ledger: &Blockchain) -> u64 {
        ledger.balance_of(&self.address)
    }

    /// Unspent outputs owned by this wallet
    pub fn utxos(&self, ledger: &Blockchain) -> Vec<(Outpoint, TransactionOutput)> {
        ledger.utxos_for_address(&self.address)
    }

    /// Create and sign a payment.
    ///
    /// Selects outputs first come first served until `amount + fee` is
    /// covered, pays the recipient, and returns any excess to this wallet
    /// as a change output.
    pub fn create_transaction(
        &self,
        ledger: &Blockchain,
        recipient: &str,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, WalletError> {
        let required = amount + fee;

        let mut selected = Vec::new();
        let mut total = 0u64;
        for (outpoint, output) in self.utxos(ledger) {
            total += output.amount;
            selected.push((outpoint, output));
            if total >= required {
                break;
            }
        }

        if total < required {
            return Err(WalletError::InsufficientFunds {
                have: total,
                need: required,
            });
        }

        let inputs = selected
            .iter()
            .map(|(outpoint, _)| TransactionInput::new(outpoint.txid.clone(), outpoint.vout))
            .collect();

        let mut outputs = vec![TransactionOutput::new(amount, recipient)];
        let change = total - required;
        if change > 0 {
            outputs.push(TransactionOutput::new(change, self.address.clone()));
        }

        let mut tx = Transaction::new(inputs, outputs);
        for (index, (_, prev_output)) in selected.iter().enumerate() {
            tx.sign_input(index, &self.private_key, &prev_output.pubkey_script)?;
        }

        log::info!(
            "transaction {} created: {} guidos to {} (fee {})",
            tx.id,
            amount,
            recipient,
            fee
        );
        Ok(tx)
    }

    /// Create a payment and submit it to the ledger's pending pool
    pub fn send(
        &self,
        ledger: &mut Blockchain,
        recipient: &str,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, WalletError> {
        let tx = self.create_transaction(ledger, recipient, amount, fee)?;
        ledger.add_transaction(tx.clone())?;
        Ok(tx)
    }

    fn to_record(&self) -> WalletRecord {
        WalletRecord {
            private_key: self.private_key(),
            public_key: self.public_key(),
            address: self.address.clone(),
            wif: self.wif(),
        }
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager for named wallets, persisted as one JSON file mapping each name
/// to its wallet record
#[derive(Default)]
pub struct WalletManager {
    wallets: BTreeMap<String, Wallet>,
}

impl WalletManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new wallet under the given name, replacing any previous one
    pub fn create_wallet(&mut self, name: &str) -> &Wallet {
        let wallet = Wallet::new();
        log::info!("created wallet '{}': {}", name, wallet.address());
        self.wallets.insert(name.to_string(), wallet);
        &self.wallets[name]
    }

    /// Add an existing wallet under the given name
    pub fn add_wallet(&mut self, name: &str, wallet: Wallet) {
        self.wallets.insert(name.to_string(), wallet);
    }

    /// Look up a wallet by name
    pub fn get_wallet(&self, name: &str) -> Result<&Wallet, WalletError> {
        self.wallets
            .get(name)
            .ok_or_else(|| WalletError::UnknownWallet(name.to_string()))
    }

    /// Wallet names and addresses, sorted by name
    pub fn list_wallets(&self) -> Vec<(&str, &str)> {
        self.wallets
            .iter()
            .map(|(name, wallet)| (name.as_str(), wallet.address()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Save every wallet to a single JSON file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let records: BTreeMap<&String, WalletRecord> = self
            .wallets
            .iter()
            .map(|(name, wallet)| (name, wallet.to_record()))
            .collect();

        let json = serde_json::to_string_pretty(&records)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load wallets from a JSON file written by [`save`](Self::save)
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let records: BTreeMap<String, WalletRecord> = serde_json::from_str(&json)?;

        let mut manager = Self::new();
        for (name, record) in records {
            let wallet = Wallet::from_private_key_hex(&record.private_key)?;
            manager.wallets.insert(name, wallet);
        }

        log::info!("loaded {} wallets from {}", manager.len(), path.display());
        Ok(manager)
    }
}
