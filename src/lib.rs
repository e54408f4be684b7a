//! Guidocoin: a UTXO ledger engine in Rust
//!
//! This crate models a cryptocurrency's state: accounts exist only
//! implicitly as unspent outputs, transactions move value by consuming and
//! producing outputs, and blocks group transactions under a proof-of-work
//! commitment that chains to prior history. It provides:
//! - SHA-256/RIPEMD-160 hashing and Base58Check address encoding
//! - ECDSA signatures on secp256k1 with WIF import/export
//! - A UTXO transaction model with a canonical signing form
//! - Merkle-committed blocks with proof-of-work mining
//! - A ledger state machine enforcing double-spend freedom
//! - Wallets, JSON persistence and a read-mostly status API
//!
//! # Example
//!
//! ```rust
//! use guidocoin::core::Blockchain;
//! use guidocoin::wallet::Wallet;
//!
//! let miner = Wallet::new();
//! let recipient = Wallet::new();
//!
//! // Low difficulty so the example mines instantly
//! let mut ledger = Blockchain::new(2, 50 * guidocoin::core::GUIDOS_PER_COIN);
//! ledger.create_genesis_block(miner.address()).unwrap();
//!
//! // Pay 1 coin, then mine the pending pool into a block
//! miner.send(&mut ledger, recipient.address(), 100_000_000, 1000).unwrap();
//! ledger.mine_pending_transactions(miner.address()).unwrap();
//!
//! assert_eq!(ledger.balance_of(recipient.address()), 100_000_000);
//! assert!(ledger.validate_chain());
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use self::api::{create_router, ApiState};
pub use self::core::{
    Block, Blockchain, LedgerError, Outpoint, Transaction, TransactionInput, TransactionOutput,
    DEFAULT_BLOCK_REWARD, DEFAULT_DIFFICULTY, GUIDOS_PER_COIN,
};
pub use self::crypto::{Network, PrivateKey, PublicKey};
pub use self::storage::{Storage, StorageConfig};
pub use self::wallet::{Wallet, WalletManager};
