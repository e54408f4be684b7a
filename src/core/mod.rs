//! Core ledger components
//!
//! The fundamental building blocks:
//! - Transactions (UTXO model with canonical signing form)
//! - Blocks (merkle commitment and proof of work)
//! - The ledger state machine (chain, pending pool, UTXO and spent sets)

pub mod block;
pub mod blockchain;
pub mod transaction;

pub use block::{Block, DEFAULT_DIFFICULTY};
pub use blockchain::{Blockchain, LedgerError, DEFAULT_BLOCK_REWARD, HALVING_INTERVAL};
pub use transaction::{
    Outpoint, Transaction, TransactionError, TransactionInput, TransactionOutput,
    COINBASE_OUTPUT_INDEX, GUIDOS_PER_COIN, SEQUENCE_FINAL, TX_VERSION,
};
