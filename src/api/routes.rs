//! Status API routes configuration

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::handlers::{self, ApiState};

/// Create the status API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Permissive CORS so a local visualization page can poll the endpoints
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Chain
        .route("/api/chain", get(handlers::get_chain_info))
        .route("/api/chain/blocks", get(handlers::get_blocks))
        .route(
            "/api/chain/blocks/{height}",
            get(handlers::get_block_by_height),
        )
        .route("/api/chain/validate", get(handlers::validate_chain))
        // Mining
        .route("/api/mine", post(handlers::mine_block))
        // Transactions
        .route("/api/transactions/{id}", get(handlers::get_transaction))
        .route("/api/mempool", get(handlers::get_mempool))
        // Balances
        .route("/api/balance/{address}", get(handlers::get_balance))
        .with_state(state)
        .layer(cors)
}
