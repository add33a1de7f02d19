//! Leaderboard and activity feed handlers.
//!
//! Rankings come from lifetime player totals; the activity feed is the tail
//! of the settled claim audit trail. Both are cached briefly since they sit
//! on the game's hot path.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};

use crate::entities::claim_settlement::{self, STATUS_SETTLED};
use crate::entities::faucet;
use crate::entities::player;
use crate::models::player::{ActivityEntry, LeaderboardEntry};
use crate::state::AppState;

use super::HttpError;

/// Default number of leaderboard rows
pub const DEFAULT_LEADERBOARD_LIMIT: u64 = 50;

/// Default number of activity entries
pub const DEFAULT_ACTIVITY_LIMIT: u64 = 20;

/// Hard cap on rows returned by ranking and activity queries
pub const MAX_LIST_LIMIT: u64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/activity", get(recent_activity))
}

/// List query parameters
#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub entries: Vec<ActivityEntry>,
    pub limit: u64,
}

/// Rank players by lifetime collected value
async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<LeaderboardResponse>, HttpError> {
    if query.limit == Some(0) {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Limit must be positive".to_string(),
        ));
    }
    let limit = effective_limit(query.limit, DEFAULT_LEADERBOARD_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let cache_key = format!("top::{limit}::{offset}");
    if let Some(cached) = state.cache.leaderboards.get(&cache_key).await {
        return Ok(Json(LeaderboardResponse {
            entries: (*cached).clone(),
            limit,
            offset,
        }));
    }

    // Ties resolve by address so pagination stays stable.
    let rows = player::Entity::find()
        .filter(player::Column::TotalCollected.gt(0))
        .order_by_desc(player::Column::TotalCollected)
        .order_by_asc(player::Column::Address)
        .limit(limit)
        .offset(offset)
        .all(state.database.as_ref())
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let entries: Vec<LeaderboardEntry> = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardEntry {
            rank: offset + index as u64 + 1,
            address: row.address,
            total_collected: row.total_collected,
            total_mines: row.total_mines,
        })
        .collect();

    state
        .cache
        .leaderboards
        .insert(cache_key, Arc::new(entries.clone()))
        .await;

    Ok(Json(LeaderboardResponse {
        entries,
        limit,
        offset,
    }))
}

/// Most recent settled claims across all faucets
async fn recent_activity(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ActivityResponse>, HttpError> {
    if query.limit == Some(0) {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Limit must be positive".to_string(),
        ));
    }
    let limit = effective_limit(query.limit, DEFAULT_ACTIVITY_LIMIT);

    let cache_key = format!("recent::{limit}");
    if let Some(cached) = state.cache.activity.get(&cache_key).await {
        return Ok(Json(ActivityResponse {
            entries: (*cached).clone(),
            limit,
        }));
    }

    let rows = claim_settlement::Entity::find()
        .filter(claim_settlement::Column::Status.eq(STATUS_SETTLED))
        .find_also_related(faucet::Entity)
        .order_by_desc(claim_settlement::Column::SettledAt)
        .limit(limit)
        .all(state.database.as_ref())
        .await
        .map_err(|err| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    let entries: Vec<ActivityEntry> = rows
        .into_iter()
        .map(|(row, site)| ActivityEntry {
            claim_ref: row.claim_ref,
            user_address: row.user_address,
            faucet_id: row.faucet_id,
            faucet_name: site.map(|s| s.name),
            amount: row.settled_amount.unwrap_or(0),
            tx_hash: row.tx_hash,
            settled_at: row.settled_at.map_or(0, |at| at.timestamp()),
        })
        .collect();

    state
        .cache
        .activity
        .insert(cache_key, Arc::new(entries.clone()))
        .await;

    Ok(Json(ActivityResponse { entries, limit }))
}

/// Clamp an optional limit to the list cap
fn effective_limit(requested: Option<u64>, default: u64) -> u64 {
    requested.unwrap_or(default).min(MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default_and_clamp() {
        assert_eq!(effective_limit(None, DEFAULT_LEADERBOARD_LIMIT), 50);
        assert_eq!(effective_limit(Some(7), DEFAULT_LEADERBOARD_LIMIT), 7);
        assert_eq!(effective_limit(Some(1_000), DEFAULT_LEADERBOARD_LIMIT), 100);
        assert_eq!(effective_limit(None, DEFAULT_ACTIVITY_LIMIT), 20);
    }
}
