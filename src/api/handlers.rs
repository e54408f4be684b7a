//! Status API handlers
//!
//! Read-mostly views over a shared ledger. The one mutating endpoint,
//! `POST /api/mine`, holds the write lock across mining and commit so a
//! competing request cannot validate against a stale UTXO snapshot.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::{Blockchain, Transaction};

/// Shared application state, passed explicitly to every handler
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<RwLock<Blockchain>>,
}

impl ApiState {
    pub fn new(ledger: Blockchain) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ChainInfo {
    pub height: u64,
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub difficulty: u32,
    pub block_reward: u64,
    pub pending_transactions: usize,
    pub utxo_count: usize,
    pub latest_hash: Option<String>,
}

#[derive(Serialize)]
pub struct BlockInfo {
    pub index: u64,
    pub hash: String,
    pub previous_hash: String,
    pub merkle_root: String,
    pub timestamp: i64,
    pub nonce: u64,
    pub difficulty: u32,
    pub transactions: Vec<TransactionInfo>,
}

#[derive(Serialize)]
pub struct TransactionInfo {
    pub tx_id: String,
    pub is_coinbase: bool,
    pub inputs: usize,
    pub outputs: usize,
    pub total_output: u64,
}

impl From<&Transaction> for TransactionInfo {
    fn from(tx: &Transaction) -> Self {
        Self {
            tx_id: tx.id.clone(),
            is_coinbase: tx.is_coinbase(),
            inputs: tx.inputs.len(),
            outputs: tx.outputs.len(),
            total_output: tx.output_value(),
        }
    }
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: u64,
    pub utxo_count: usize,
}

#[derive(Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub blocks_checked: usize,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub block: BlockInfo,
    pub reward: u64,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Deserialize)]
pub struct MineRequest {
    pub miner_address: String,
}

fn block_info(block: &crate::core::Block) -> BlockInfo {
    BlockInfo {
        index: block.index,
        hash: block.hash.clone(),
        previous_hash: block.previous_hash.clone(),
        merkle_root: block.merkle_root.clone(),
        timestamp: block.timestamp,
        nonce: block.nonce,
        difficulty: block.difficulty,
        transactions: block.transactions.iter().map(TransactionInfo::from).collect(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/chain - ledger summary
pub async fn get_chain_info(State(state): State<ApiState>) -> Json<ChainInfo> {
    let ledger = state.ledger.read().await;

    let total_transactions = ledger
        .chain
        .iter()
        .map(|block| block.transactions.len())
        .sum();

    Json(ChainInfo {
        height: ledger.height(),
        total_blocks: ledger.chain.len(),
        total_transactions,
        difficulty: ledger.difficulty,
        block_reward: ledger.block_reward,
        pending_transactions: ledger.pending_transactions.len(),
        utxo_count: ledger.utxo.len(),
        latest_hash: ledger.latest_block().map(|block| block.hash.clone()),
    })
}

/// GET /api/chain/blocks - all blocks, newest first
pub async fn get_blocks(State(state): State<ApiState>) -> Json<Vec<BlockInfo>> {
    let ledger = state.ledger.read().await;
    Json(ledger.chain.iter().rev().map(block_info).collect())
}

/// GET /api/chain/blocks/{height}
pub async fn get_block_by_height(
    State(state): State<ApiState>,
    Path(height): Path<u64>,
) -> Result<Json<BlockInfo>, (StatusCode, Json<ApiError>)> {
    let ledger = state.ledger.read().await;

    ledger
        .block_by_index(height)
        .map(|block| Json(block_info(block)))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError {
                    error: format!("no block at height {height}"),
                }),
            )
        })
}

/// GET /api/chain/validate
pub async fn validate_chain(State(state): State<ApiState>) -> Json<ValidationResponse> {
    let ledger = state.ledger.read().await;

    Json(ValidationResponse {
        valid: ledger.validate_chain(),
        blocks_checked: ledger.chain.len(),
    })
}

/// GET /api/mempool - pending transactions
pub async fn get_mempool(State(state): State<ApiState>) -> Json<Vec<TransactionInfo>> {
    let ledger = state.ledger.read().await;
    Json(
        ledger
            .pending_transactions
            .iter()
            .map(TransactionInfo::from)
            .collect(),
    )
}

/// GET /api/transactions/{id}
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<TransactionInfo>, (StatusCode, Json<ApiError>)> {
    let ledger = state.ledger.read().await;

    ledger
        .find_transaction(&id)
        .map(|tx| Json(TransactionInfo::from(tx)))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError {
                    error: format!("unknown transaction {id}"),
                }),
            )
        })
}

/// GET /api/balance/{address}
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let ledger = state.ledger.read().await;

    Json(BalanceResponse {
        balance: ledger.balance_of(&address),
        utxo_count: ledger.utxos_for_address(&address).len(),
        address,
    })
}

/// POST /api/mine - mine the pending pool into a new block
pub async fn mine_block(
    State(state): State<ApiState>,
    Json(request): Json<MineRequest>,
) -> Result<Json<MineResponse>, (StatusCode, Json<ApiError>)> {
    // Write lock held across mining and commit: both run against the same
    // UTXO snapshot
    let mut ledger = state.ledger.write().await;

    match ledger.mine_pending_transactions(&request.miner_address) {
        Ok(block) => {
            let reward = ledger.block_reward_at(block.index);
            Ok(Json(MineResponse {
                block: block_info(&block),
                reward,
            }))
        }
        Err(err) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ApiError {
                error: err.to_string(),
            }),
        )),
    }
}
