use serde::{Deserialize, Serialize};

use crate::models::player::UserStatsView;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaucetView {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub total_coins: i64,
    pub remaining_coins: i64,
    pub is_active: bool,
    pub contract_address: Option<String>,
}

// Request/Response types for the game HTTP API

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineRequest {
    pub faucet_id: i64,
    pub user_address: String,
    pub mine_amount: u64, // base units
    pub player_lat: f64,
    pub player_lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineResponse {
    pub success: bool,
    pub pending_amount: u64,
    pub pending_amount_formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQuery {
    pub faucet_id: i64,
    pub user_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingResponse {
    pub faucet_id: i64,
    pub user_address: String,
    pub pending_amount: u64,
    pub pending_amount_formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPendingRequest {
    pub faucet_id: i64,
    pub user_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearPendingResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub faucet_id: i64,
    pub user_address: String,
    pub claimed_amount: u64, // advisory; the server settles the pending balance
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub success: bool,
    pub claim_ref: String,
    pub tx_hash: Option<String>,
    pub claimed_amount: u64,
    pub claimed_amount_formatted: String,
    pub remaining_coins: i64,
    pub user_stats: UserStatsView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub faucet_id: i64,
    pub contract_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub remaining_coins: i64,
    pub total_coins: i64,
    pub contract_balance: u64,
    pub contract_balance_formatted: String,
    pub is_active: bool,
}
