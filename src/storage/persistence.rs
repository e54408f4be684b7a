//! Ledger persistence layer
//!
//! Saves and loads the chain file. The persisted form carries the chain,
//! the pending pool, the difficulty and the reward; the UTXO and spent sets
//! are rebuilt by replaying the chain on load.

use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::Blockchain;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("chain file not found at {0}")]
    NotFound(PathBuf),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub chain_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".guidocoin"),
            chain_file: "blockchain.json".to_string(),
        }
    }
}

/// Ledger storage manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a storage manager, creating the data directory if needed
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Create with the default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StorageConfig::default())
    }

    fn chain_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.chain_file)
    }

    /// Save the ledger to disk, via a temp file and an atomic rename
    pub fn save(&self, ledger: &Blockchain) -> Result<(), StorageError> {
        let path = self.chain_path();
        let temp_path = path.with_extension("tmp");

        let file = fs::File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, ledger)?;

        fs::rename(&temp_path, &path)?;
        log::debug!("ledger saved to {}", path.display());
        Ok(())
    }

    /// Load the ledger from disk and rebuild the UTXO and spent sets by
    /// replaying the chain
    pub fn load(&self) -> Result<Blockchain, StorageError> {
        let path = self.chain_path();
        if !path.exists() {
            return Err(StorageError::NotFound(path));
        }

        load_from_file(&path)
    }

    /// Whether a saved chain file exists
    pub fn exists(&self) -> bool {
        self.chain_path().exists()
    }

    /// Delete the saved chain file
    pub fn delete(&self) -> Result<(), StorageError> {
        let path = self.chain_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Save a ledger to a specific file path
pub fn save_to_file(ledger: &Blockchain, path: &Path) -> Result<(), StorageError> {
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, ledger)?;
    Ok(())
}

/// Load a ledger from a specific file path
pub fn load_from_file(path: &Path) -> Result<Blockchain, StorageError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut ledger: Blockchain = serde_json::from_reader(reader)?;
    ledger.rebuild_state();

    log::info!(
        "ledger loaded from {} ({} blocks)",
        path.display(),
        ledger.chain.len()
    );
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GUIDOS_PER_COIN;
    use crate::wallet::Wallet;

    const TEST_DIFFICULTY: u32 = 2;

    fn storage_in(dir: &Path) -> Storage {
        Storage::new(StorageConfig {
            data_dir: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage_in(temp_dir.path());

        let miner = Wallet::new();
        let mut ledger = Blockchain::new(TEST_DIFFICULTY, 50 * GUIDOS_PER_COIN);
        ledger.create_genesis_block(miner.address()).unwrap();
        ledger.mine_pending_transactions(miner.address()).unwrap();

        storage.save(&ledger).unwrap();
        assert!(storage.exists());

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.chain.len(), ledger.chain.len());
        assert_eq!(loaded.difficulty, ledger.difficulty);
        assert_eq!(loaded.block_reward, ledger.block_reward);
        assert_eq!(loaded.balance_of(miner.address()), ledger.balance_of(miner.address()));
        assert!(loaded.validate_chain());
    }

    #[test]
    fn test_load_replays_spends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage_in(temp_dir.path());

        let miner = Wallet::new();
        let recipient = Wallet::new();
        let mut ledger = Blockchain::new(TEST_DIFFICULTY, 50 * GUIDOS_PER_COIN);
        ledger.create_genesis_block(miner.address()).unwrap();
        miner
            .send(&mut ledger, recipient.address(), GUIDOS_PER_COIN, 0)
            .unwrap();
        ledger.mine_pending_transactions(miner.address()).unwrap();

        storage.save(&ledger).unwrap();
        let loaded = storage.load().unwrap();

        // Outputs consumed before the save must still be spent after the
        // load, not resurrected as spendable
        assert_eq!(loaded.spent_outputs, ledger.spent_outputs);
        assert_eq!(loaded.utxo, ledger.utxo);
        assert_eq!(loaded.balance_of(miner.address()), ledger.balance_of(miner.address()));
    }

    #[test]
    fn test_pending_pool_round_trips() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage_in(temp_dir.path());

        let miner = Wallet::new();
        let recipient = Wallet::new();
        let mut ledger = Blockchain::new(TEST_DIFFICULTY, 50 * GUIDOS_PER_COIN);
        ledger.create_genesis_block(miner.address()).unwrap();
        miner
            .send(&mut ledger, recipient.address(), GUIDOS_PER_COIN, 0)
            .unwrap();

        storage.save(&ledger).unwrap();
        let loaded = storage.load().unwrap();

        assert_eq!(loaded.pending_transactions.len(), 1);
        assert_eq!(
            loaded.pending_transactions[0].id,
            ledger.pending_transactions[0].id
        );
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = storage_in(temp_dir.path());

        assert!(!storage.exists());
        assert!(matches!(storage.load(), Err(StorageError::NotFound(_))));
    }
}
