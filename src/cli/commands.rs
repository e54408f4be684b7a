//! CLI commands
//!
//! Implements the command handlers for the guidocoin binary.

use std::path::PathBuf;

use crate::core::{Blockchain, GUIDOS_PER_COIN};
use crate::storage::{Storage, StorageConfig};
use crate::wallet::WalletManager;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const WALLETS_FILE: &str = "wallets.json";

fn coins(guidos: u64) -> f64 {
    guidos as f64 / GUIDOS_PER_COIN as f64
}

/// Application state: the ledger, the named wallets and their storage
pub struct AppState {
    pub ledger: Blockchain,
    pub wallets: WalletManager,
    pub storage: Storage,
    wallets_path: PathBuf,
}

impl AppState {
    /// Load state from the data directory
    pub fn open(data_dir: PathBuf) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        })?;

        let ledger = if storage.exists() {
            storage.load()?
        } else {
            Blockchain::with_defaults()
        };

        let wallets_path = data_dir.join(WALLETS_FILE);
        let wallets = if wallets_path.exists() {
            WalletManager::load(&wallets_path)?
        } else {
            WalletManager::new()
        };

        Ok(Self {
            ledger,
            wallets,
            storage,
            wallets_path,
        })
    }

    /// Persist the ledger and the wallets
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.ledger)?;
        self.wallets.save(&self.wallets_path)?;
        Ok(())
    }
}

/// Initialize a new ledger and mine its genesis block
pub fn cmd_init(state: &mut AppState, difficulty: u32, reward: u64, miner: &str) -> CliResult<()> {
    if !state.ledger.chain.is_empty() {
        println!("Ledger already initialized ({} blocks)", state.ledger.chain.len());
        return Ok(());
    }

    state.ledger = Blockchain::new(difficulty, reward);

    if state.wallets.get_wallet(miner).is_err() {
        state.wallets.create_wallet(miner);
    }
    let miner_address = state.wallets.get_wallet(miner)?.address().to_string();

    println!("Mining genesis block (difficulty {difficulty})...");
    let genesis = state.ledger.create_genesis_block(&miner_address)?;

    println!("Ledger initialized");
    println!("  Genesis hash: {}", genesis.hash);
    println!("  Reward: {} coins to wallet '{}'", coins(reward), miner);

    state.save()
}

/// Create a new named wallet
pub fn cmd_wallet_new(state: &mut AppState, name: &str) -> CliResult<()> {
    if state.wallets.get_wallet(name).is_ok() {
        println!("Wallet '{name}' already exists");
        return Ok(());
    }

    let wallet = state.wallets.create_wallet(name);
    println!("Created wallet '{name}'");
    println!("  Address: {}", wallet.address());

    state.save()
}

/// List wallets with balances
pub fn cmd_wallet_list(state: &AppState) -> CliResult<()> {
    if state.wallets.is_empty() {
        println!("No wallets. Create one with: guidocoin wallet new <name>");
        return Ok(());
    }

    println!("Wallets:");
    for (name, address) in state.wallets.list_wallets() {
        let balance = state.ledger.balance_of(address);
        println!("  {} | {} | {:.8} coins", name, address, coins(balance));
    }

    Ok(())
}

/// Show one wallet's keys and balance
pub fn cmd_wallet_show(state: &AppState, name: &str) -> CliResult<()> {
    let wallet = state.wallets.get_wallet(name)?;

    println!("Wallet '{name}'");
    println!("  Address:     {}", wallet.address());
    println!("  Public key:  {}", wallet.public_key());
    println!("  WIF:         {}", wallet.wif());
    println!(
        "  Balance:     {:.8} coins",
        coins(state.ledger.balance_of(wallet.address()))
    );

    Ok(())
}

/// Send guidos from a named wallet to an address
pub fn cmd_send(
    state: &mut AppState,
    from: &str,
    to: &str,
    amount: u64,
    fee: u64,
) -> CliResult<()> {
    let wallet = state.wallets.get_wallet(from)?;
    let tx = wallet.send(&mut state.ledger, to, amount, fee)?;

    println!("Transaction {} added to the pending pool", tx.id);
    println!("  {} -> {}: {:.8} coins (fee {:.8})", from, to, coins(amount), coins(fee));
    println!("  It will be included in the next mined block.");

    state.save()
}

/// Mine pending transactions into new blocks
pub fn cmd_mine(state: &mut AppState, miner: &str, count: u32) -> CliResult<()> {
    let miner_address = state.wallets.get_wallet(miner)?.address().to_string();

    for _ in 0..count {
        let pending = state.ledger.pending_transactions.len();
        println!(
            "Mining block {} with {} pending transaction(s)...",
            state.ledger.chain.len(),
            pending
        );

        let block = state.ledger.mine_pending_transactions(&miner_address)?;
        println!("  Block {} mined: {}", block.index, block.hash);

        state.save()?;
    }

    println!(
        "Balance of '{}': {:.8} coins",
        miner,
        coins(state.ledger.balance_of(&miner_address))
    );
    Ok(())
}

/// Show a balance by address
pub fn cmd_balance(state: &AppState, address: &str) -> CliResult<()> {
    let balance = state.ledger.balance_of(address);
    let utxos = state.ledger.utxos_for_address(address);

    println!("Balance for {address}");
    println!("  Total: {:.8} coins ({} guidos)", coins(balance), balance);
    println!("  UTXOs: {}", utxos.len());

    Ok(())
}

/// Display the chain, newest blocks first
pub fn cmd_chain_show(state: &AppState, count: usize) -> CliResult<()> {
    println!(
        "Chain: {} blocks, difficulty {}, {} pending",
        state.ledger.chain.len(),
        state.ledger.difficulty,
        state.ledger.pending_transactions.len()
    );

    for block in state.ledger.chain.iter().rev().take(count) {
        println!("  #{} | {} | {} tx", block.index, block.hash, block.transactions.len());
        for tx in &block.transactions {
            let kind = if tx.is_coinbase() { "coinbase" } else { "transfer" };
            println!(
                "      {} | {} | {:.8} coins",
                &tx.id[..16.min(tx.id.len())],
                kind,
                coins(tx.output_value())
            );
        }
    }

    Ok(())
}

/// Validate the chain structure
pub fn cmd_validate(state: &AppState) -> CliResult<()> {
    if state.ledger.validate_chain() {
        println!("Chain is valid ({} blocks)", state.ledger.chain.len());
    } else {
        println!("Chain validation FAILED; see the log for the failing block");
    }

    Ok(())
}

/// Show the pending pool
pub fn cmd_mempool(state: &AppState) -> CliResult<()> {
    let pending = &state.ledger.pending_transactions;
    println!("Pending transactions: {}", pending.len());

    for tx in pending {
        println!(
            "  {} | {} in, {} out | {:.8} coins",
            tx.id,
            tx.inputs.len(),
            tx.outputs.len(),
            coins(tx.output_value())
        );
    }

    Ok(())
}
