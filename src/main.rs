//! Guidocoin CLI application
//!
//! A command-line interface for the ledger: wallets, payments, mining and
//! the status server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use guidocoin::api::{create_router, ApiState};
use guidocoin::cli::{self, AppState};
use guidocoin::core::{DEFAULT_BLOCK_REWARD, DEFAULT_DIFFICULTY};
use guidocoin::wallet::DEFAULT_FEE;

#[derive(Parser)]
#[command(name = "guidocoin")]
#[command(version = "0.1.0")]
#[command(about = "A UTXO ledger engine with proof-of-work mining", long_about = None)]
struct Cli {
    /// Data directory for the chain and wallet files
    #[arg(short, long, default_value = ".guidocoin")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger and mine its genesis block
    Init {
        /// Mining difficulty (leading zero hex characters)
        #[arg(short, long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: u32,

        /// Initial block reward in guidos
        #[arg(short, long, default_value_t = DEFAULT_BLOCK_REWARD)]
        reward: u64,

        /// Wallet name receiving the genesis reward (created if missing)
        #[arg(short, long, default_value = "miner")]
        miner: String,
    },

    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Send guidos from a named wallet to an address
    Send {
        /// Sender's wallet name
        #[arg(short, long)]
        from: String,

        /// Recipient's address
        #[arg(short, long)]
        to: String,

        /// Amount in guidos
        #[arg(short, long)]
        amount: u64,

        /// Fee in guidos
        #[arg(long, default_value_t = DEFAULT_FEE)]
        fee: u64,
    },

    /// Mine pending transactions into new blocks
    Mine {
        /// Wallet name receiving the rewards
        #[arg(short, long, default_value = "miner")]
        wallet: String,

        /// Number of blocks to mine
        #[arg(short, long, default_value = "1")]
        count: u32,
    },

    /// Show the balance of an address
    Balance {
        /// Address to query
        address: String,
    },

    /// Display recent blocks
    Chain {
        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Validate the chain structure
    Validate,

    /// Show the pending pool
    Mempool,

    /// Run the status API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new named wallet
    New {
        /// Wallet name
        name: String,
    },

    /// List all wallets with balances
    List,

    /// Show a wallet's keys and balance
    Show {
        /// Wallet name
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut state = AppState::open(cli.data_dir)?;

    match cli.command {
        Commands::Init {
            difficulty,
            reward,
            miner,
        } => cli::cmd_init(&mut state, difficulty, reward, &miner),

        Commands::Wallet { action } => match action {
            WalletCommands::New { name } => cli::cmd_wallet_new(&mut state, &name),
            WalletCommands::List => cli::cmd_wallet_list(&state),
            WalletCommands::Show { name } => cli::cmd_wallet_show(&state, &name),
        },

        Commands::Send {
            from,
            to,
            amount,
            fee,
        } => cli::cmd_send(&mut state, &from, &to, amount, fee),

        Commands::Mine { wallet, count } => cli::cmd_mine(&mut state, &wallet, count),

        Commands::Balance { address } => cli::cmd_balance(&state, &address),

        Commands::Chain { count } => cli::cmd_chain_show(&state, count),

        Commands::Validate => cli::cmd_validate(&state),

        Commands::Mempool => cli::cmd_mempool(&state),

        Commands::Serve { port } => serve(state, port),
    }
}

/// Run the status API server until interrupted
fn serve(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let api_state = ApiState::new(state.ledger);
    let router = create_router(api_state);

    println!("Status server listening on http://{addr}");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    })?;

    Ok(())
}
