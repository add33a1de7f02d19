use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatsView {
    pub total_collected: u64,
    pub total_mines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub address: String,
    pub total_collected: i64,
    pub total_collected_formatted: String,
    pub total_mines: i64,
    pub first_connected_at: i64,
    pub last_seen_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u64,
    pub address: String,
    pub total_collected: i64,
    pub total_mines: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub claim_ref: String,
    pub user_address: String,
    pub faucet_id: i64,
    pub faucet_name: Option<String>,
    pub amount: i64,
    pub tx_hash: Option<String>,
    pub settled_at: i64,
}

// Request types for the user HTTP API

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureUserRequest {
    pub user_address: String,
}
