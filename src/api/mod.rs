//! Status API module
//!
//! A read-mostly HTTP view of the ledger for visualization and scripting.
//!
//! # Endpoints
//!
//! - `GET /health` - liveness check
//! - `GET /api/chain` - ledger summary
//! - `GET /api/chain/blocks` - list blocks, newest first
//! - `GET /api/chain/blocks/{height}` - block by height
//! - `GET /api/chain/validate` - structural chain validation
//! - `GET /api/mempool` - pending transactions
//! - `GET /api/transactions/{id}` - transaction lookup
//! - `GET /api/balance/{address}` - balance and UTXO count
//! - `POST /api/mine` - mine the pending pool into a new block

pub mod handlers;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
