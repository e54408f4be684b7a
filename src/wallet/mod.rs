pub mod wallet;

pub use wallet::{Wallet, WalletError, WalletManager, DEFAULT_FEE};
