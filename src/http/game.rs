//! Game HTTP handlers for location-based mining.
//!
//! This module provides the player-facing endpoints:
//! - Faucet discovery around a position
//! - Mine grants accruing into the pending ledger
//! - Claim settlement against the faucet contract
//! - Pending balance queries and abandonment
//! - Supply re-sync from ground truth
//! - Player profile bootstrap and lookup

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;

use crate::entities::{faucet, player};
use crate::geo;
use crate::models::game::{
    ClaimRequest, ClaimResponse, ClearPendingRequest, ClearPendingResponse, FaucetView,
    MineRequest, MineResponse, PendingQuery, PendingResponse, SyncRequest, SyncResponse,
};
use crate::models::player::{EnsureUserRequest, PlayerView, UserStatsView};
use crate::state::AppState;
use crate::wallet::{format_mon, sanitize_player_address};

use super::HttpError;

/// Default half-side of the faucet discovery window, in degrees (~10 km)
pub const DEFAULT_DISCOVERY_WINDOW_DEGREES: f64 = 0.09;

/// Hard cap on the discovery window half-side, in degrees
pub const MAX_DISCOVERY_WINDOW_DEGREES: f64 = 1.0;

/// Kilometers per degree of latitude, used to widen the discovery window
pub const KILOMETERS_PER_DEGREE: f64 = 111.0;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/faucets", get(list_faucets))
        .route("/faucets/mine", post(mine).delete(clear_pending))
        .route("/faucets/pending", get(get_pending))
        .route("/faucets/claim", post(claim))
        .route("/faucets/sync", post(sync_faucet))
        .route("/user", post(ensure_user))
        .route("/user/{address}", get(get_user))
}

/// Discovery query parameters
#[derive(Debug, Deserialize, Default)]
pub struct FaucetDiscoveryQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
}

/// List active faucets, optionally windowed around a position
async fn list_faucets(
    State(state): State<AppState>,
    Query(query): Query<FaucetDiscoveryQuery>,
) -> Result<Json<Vec<FaucetView>>, HttpError> {
    let mut select = faucet::Entity::find().filter(faucet::Column::IsActive.eq(true));

    if let (Some(lat), Some(lng)) = (query.lat, query.lng) {
        if !geo::valid_coordinates(lat, lng) {
            return Err(HttpError::new(
                StatusCode::BAD_REQUEST,
                "Coordinates are out of range".to_string(),
            ));
        }
        let window = discovery_window_degrees(query.radius_km);
        select = select
            .filter(faucet::Column::Lat.between(lat - window, lat + window))
            .filter(faucet::Column::Lng.between(lng - window, lng + window));
    }

    let sites = select
        .order_by_asc(faucet::Column::Id)
        .all(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(sites.into_iter().map(faucet_view).collect()))
}

/// Admit a mine grant into the pending ledger
async fn mine(
    State(state): State<AppState>,
    Json(request): Json<MineRequest>,
) -> Result<Json<MineResponse>, HttpError> {
    let grant = state
        .engine
        .mine(
            request.faucet_id,
            &request.user_address,
            request.mine_amount,
            request.player_lat,
            request.player_lng,
        )
        .await?;

    Ok(Json(MineResponse {
        success: true,
        pending_amount: grant.pending_amount,
        pending_amount_formatted: format_mon(grant.pending_amount),
    }))
}

/// Read the unclaimed balance for one player at one faucet
async fn get_pending(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<PendingResponse>, HttpError> {
    let pending_amount = state
        .engine
        .pending(query.faucet_id, &query.user_address)
        .await?;

    Ok(Json(PendingResponse {
        faucet_id: query.faucet_id,
        user_address: query.user_address.trim().to_ascii_lowercase(),
        pending_amount,
        pending_amount_formatted: format_mon(pending_amount),
    }))
}

/// Abandon accrued value without settlement
async fn clear_pending(
    State(state): State<AppState>,
    Json(request): Json<ClearPendingRequest>,
) -> Result<Json<ClearPendingResponse>, HttpError> {
    state
        .engine
        .clear_pending(request.faucet_id, &request.user_address)
        .await?;
    Ok(Json(ClearPendingResponse { ok: true }))
}

/// Settle the pending balance against the faucet contract
async fn claim(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, HttpError> {
    let receipt = state
        .engine
        .claim(request.faucet_id, &request.user_address, request.claimed_amount)
        .await?;

    // Settled value moves rankings, so cached views are stale
    state.cache.leaderboards.invalidate_all();
    state.cache.activity.invalidate_all();

    Ok(Json(ClaimResponse {
        success: true,
        claim_ref: receipt.claim_ref,
        tx_hash: receipt.tx_hash,
        claimed_amount: receipt.claimed_amount,
        claimed_amount_formatted: format_mon(receipt.claimed_amount),
        remaining_coins: receipt.remaining_coins,
        user_stats: UserStatsView {
            total_collected: receipt.total_collected,
            total_mines: receipt.total_mines,
        },
    }))
}

/// Recompute a faucet's supply from its contract balance
async fn sync_faucet(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, HttpError> {
    let report = state
        .engine
        .force_sync(request.faucet_id, &request.contract_address)
        .await?;

    Ok(Json(SyncResponse {
        success: true,
        remaining_coins: report.remaining_coins,
        total_coins: report.total_coins,
        contract_balance: report.contract_balance,
        contract_balance_formatted: format_mon(report.contract_balance),
        is_active: report.is_active,
    }))
}

/// Create the player profile on first connect, or touch `last_seen_at`
async fn ensure_user(
    State(state): State<AppState>,
    Json(request): Json<EnsureUserRequest>,
) -> Result<Json<PlayerView>, HttpError> {
    let account = sanitize_player_address(&request.user_address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let now = Utc::now().fixed_offset();
    let record = player::ActiveModel {
        address: Set(account),
        total_collected: Set(0),
        total_mines: Set(0),
        first_connected_at: Set(now),
        last_seen_at: Set(now),
    };
    let row = player::Entity::insert(record)
        .on_conflict(
            OnConflict::column(player::Column::Address)
                .value(player::Column::LastSeenAt, now)
                .to_owned(),
        )
        .exec_with_returning(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(player_view(row)))
}

/// Look up a player profile
async fn get_user(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<PlayerView>, HttpError> {
    let account = sanitize_player_address(&address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let row = player::Entity::find_by_id(account.clone())
        .one(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| {
            HttpError::new(
                StatusCode::NOT_FOUND,
                format!("Player {account} has no profile"),
            )
        })?;

    Ok(Json(player_view(row)))
}

/// Half-side of the discovery window for an optional radius in kilometers
fn discovery_window_degrees(radius_km: Option<f64>) -> f64 {
    let requested = match radius_km {
        Some(km) if km.is_finite() && km > 0.0 => km / KILOMETERS_PER_DEGREE,
        _ => DEFAULT_DISCOVERY_WINDOW_DEGREES,
    };
    requested.min(MAX_DISCOVERY_WINDOW_DEGREES)
}

fn faucet_view(site: faucet::Model) -> FaucetView {
    FaucetView {
        id: site.id,
        lat: site.lat,
        lng: site.lng,
        total_coins: site.total_coins,
        remaining_coins: site.remaining_coins,
        is_active: site.is_active,
        contract_address: site.contract_address,
        name: site.name,
    }
}

fn player_view(row: player::Model) -> PlayerView {
    PlayerView {
        total_collected: row.total_collected,
        total_collected_formatted: format_mon(row.total_collected.max(0) as u64),
        total_mines: row.total_mines,
        first_connected_at: row.first_connected_at.timestamp(),
        last_seen_at: row.last_seen_at.timestamp(),
        address: row.address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_window_defaults_to_ten_kilometers() {
        assert_eq!(discovery_window_degrees(None), 0.09);
        assert_eq!(discovery_window_degrees(Some(0.0)), 0.09);
        assert_eq!(discovery_window_degrees(Some(-5.0)), 0.09);
        assert_eq!(discovery_window_degrees(Some(f64::NAN)), 0.09);
    }

    #[test]
    fn discovery_window_scales_with_radius() {
        let window = discovery_window_degrees(Some(11.1));
        assert!((window - 0.1).abs() < 1e-9, "11.1km should be ~0.1 degrees");
    }

    #[test]
    fn discovery_window_is_capped() {
        assert_eq!(discovery_window_degrees(Some(111.0)), 1.0);
        assert_eq!(discovery_window_degrees(Some(5_000.0)), 1.0);
    }
}
