//! Administrative faucet management.
//!
//! Site operators create faucets, bind them to funding contracts, and retire
//! them. Retirement never deletes the row; settlements keep referencing it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, QueryOrder, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::faucet;
use crate::geo;
use crate::state::AppState;
use crate::wallet::sanitize_contract_address;

use super::HttpError;

/// Longest accepted faucet name
pub const MAX_FAUCET_NAME_LEN: usize = 128;

/// Most coins a single faucet can be funded with
pub const MAX_FAUCET_COINS: i64 = 1_000_000;

/// Most faucets one bulk request may create
pub const MAX_BULK_FAUCETS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/faucets", get(list_all_faucets).post(create_faucet))
        .route("/faucets/bulk", post(bulk_create))
        .route("/faucets/{id}/contract", put(set_contract))
        .route("/faucets/{id}", delete(deactivate_faucet))
}

/// Request body for faucet creation
#[derive(Debug, Deserialize)]
pub struct CreateFaucetRequest {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Optional supply in coins (defaults to the configured faucet supply)
    pub total_coins: Option<i64>,
    /// Optional funding contract to bind at creation
    pub contract_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub faucets: Vec<CreateFaucetRequest>,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateResponse {
    pub created: u64,
    pub faucets: Vec<AdminFaucetView>,
}

#[derive(Debug, Deserialize)]
pub struct SetContractRequest {
    pub contract_address: String,
}

/// Faucet as operators see it, including retirement state
#[derive(Debug, Serialize)]
pub struct AdminFaucetView {
    pub id: i64,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub total_coins: i64,
    pub remaining_coins: i64,
    pub is_active: bool,
    pub disabled: bool,
    pub contract_address: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// List every faucet, active or not
async fn list_all_faucets(
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminFaucetView>>, HttpError> {
    let sites = faucet::Entity::find()
        .order_by_desc(faucet::Column::CreatedAt)
        .all(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(sites.into_iter().map(admin_view).collect()))
}

/// Create a single faucet
async fn create_faucet(
    State(state): State<AppState>,
    Json(request): Json<CreateFaucetRequest>,
) -> Result<Json<AdminFaucetView>, HttpError> {
    let record = build_faucet_record(&request, state.engine.game().default_faucet_coins)?;
    let row = faucet::Entity::insert(record)
        .exec_with_returning(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!("Faucet created: '{}' at ({}, {})", row.name, row.lat, row.lng);
    Ok(Json(admin_view(row)))
}

/// Create a batch of faucets atomically
async fn bulk_create(
    State(state): State<AppState>,
    Json(request): Json<BulkCreateRequest>,
) -> Result<Json<BulkCreateResponse>, HttpError> {
    if request.faucets.is_empty() {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Bulk request must contain at least one faucet".to_string(),
        ));
    }
    if request.faucets.len() > MAX_BULK_FAUCETS {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Bulk request exceeds the {MAX_BULK_FAUCETS} faucet limit"),
        ));
    }

    let default_coins = state.engine.game().default_faucet_coins;
    let mut records = Vec::with_capacity(request.faucets.len());
    for item in &request.faucets {
        records.push(build_faucet_record(item, default_coins)?);
    }

    let txn = state
        .database
        .begin()
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let mut created = Vec::with_capacity(records.len());
    for record in records {
        let row = faucet::Entity::insert(record)
            .exec_with_returning(&txn)
            .await
            .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        created.push(admin_view(row));
    }
    txn.commit()
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!("Bulk faucet create: {} site(s)", created.len());
    Ok(Json(BulkCreateResponse {
        created: created.len() as u64,
        faucets: created,
    }))
}

/// Bind or replace the funding contract for a faucet
async fn set_contract(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SetContractRequest>,
) -> Result<Json<AdminFaucetView>, HttpError> {
    let address = sanitize_contract_address(&request.contract_address)
        .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

    let site = load_site(&state, id).await?;
    let mut record = site.into_active_model();
    record.contract_address = Set(Some(address.clone()));
    record.updated_at = Set(Utc::now().fixed_offset());
    let row = record
        .update(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!("Faucet {} bound to contract {address}", row.id);
    Ok(Json(admin_view(row)))
}

/// Retire a faucet without deleting its history
async fn deactivate_faucet(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AdminFaucetView>, HttpError> {
    let site = load_site(&state, id).await?;
    let mut record = site.into_active_model();
    record.disabled = Set(true);
    record.is_active = Set(false);
    record.updated_at = Set(Utc::now().fixed_offset());
    let row = record
        .update(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!("Faucet {} deactivated", row.id);
    Ok(Json(admin_view(row)))
}

fn build_faucet_record(
    request: &CreateFaucetRequest,
    default_coins: i64,
) -> Result<faucet::ActiveModel, HttpError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Faucet name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_FAUCET_NAME_LEN {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Faucet name exceeds {MAX_FAUCET_NAME_LEN} characters"),
        ));
    }
    if !geo::valid_coordinates(request.lat, request.lng) {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Faucet coordinates are out of range".to_string(),
        ));
    }
    let total = request.total_coins.unwrap_or(default_coins);
    if total <= 0 || total > MAX_FAUCET_COINS {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            format!("Faucet supply must be between 1 and {MAX_FAUCET_COINS} coins"),
        ));
    }
    let contract_address = match &request.contract_address {
        Some(address) => Some(
            sanitize_contract_address(address)
                .map_err(|err| HttpError::new(StatusCode::BAD_REQUEST, err.to_string()))?,
        ),
        None => None,
    };

    let now = Utc::now().fixed_offset();
    Ok(faucet::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        name: Set(name.to_string()),
        lat: Set(request.lat),
        lng: Set(request.lng),
        total_coins: Set(total),
        remaining_coins: Set(total),
        is_active: Set(true),
        disabled: Set(false),
        contract_address: Set(contract_address),
        created_at: Set(now),
        updated_at: Set(now),
    })
}

async fn load_site(state: &AppState, id: i64) -> Result<faucet::Model, HttpError> {
    if id <= 0 {
        return Err(HttpError::new(
            StatusCode::BAD_REQUEST,
            "Faucet id must be positive".to_string(),
        ));
    }
    faucet::Entity::find_by_id(id)
        .one(&state.database)
        .await
        .map_err(|e| HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| HttpError::new(StatusCode::NOT_FOUND, format!("Faucet {id} does not exist")))
}

fn admin_view(site: faucet::Model) -> AdminFaucetView {
    AdminFaucetView {
        id: site.id,
        lat: site.lat,
        lng: site.lng,
        total_coins: site.total_coins,
        remaining_coins: site.remaining_coins,
        is_active: site.is_active,
        disabled: site.disabled,
        contract_address: site.contract_address,
        created_at: site.created_at.timestamp(),
        updated_at: site.updated_at.timestamp(),
        name: site.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, lat: f64, lng: f64, total: Option<i64>) -> CreateFaucetRequest {
        CreateFaucetRequest {
            name: name.to_string(),
            lat,
            lng,
            total_coins: total,
            contract_address: None,
        }
    }

    #[test]
    fn valid_faucet_passes_validation() {
        let built = build_faucet_record(&request("Central Park", 40.785, -73.968, None), 100);
        assert!(built.is_ok(), "Well-formed faucet should build");
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(build_faucet_record(&request("   ", 40.0, -73.0, None), 100).is_err());
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(build_faucet_record(&request("North", 91.0, 0.0, None), 100).is_err());
        assert!(build_faucet_record(&request("East", 0.0, 181.0, None), 100).is_err());
    }

    #[test]
    fn supply_bounds_are_enforced() {
        assert!(build_faucet_record(&request("Empty", 0.0, 0.0, Some(0)), 100).is_err());
        assert!(build_faucet_record(&request("Huge", 0.0, 0.0, Some(MAX_FAUCET_COINS + 1)), 100).is_err());
        assert!(build_faucet_record(&request("Funded", 0.0, 0.0, Some(500)), 100).is_ok());
    }
}
