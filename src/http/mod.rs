use std::sync::atomic::Ordering as AtomicOrdering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::engine::EngineError;
use crate::state::AppState;

mod admin;
mod game;
mod players;

pub fn router(state: AppState) -> Router {
    assert!(
        state.start_time.elapsed() < Duration::from_secs(86_400),
        "Application uptime exceeds 24 hours before router creation"
    );

    // Configure CORS for browser clients
    let cors = CorsLayer::new()
        // Allow requests from any origin (for development)
        // In production, restrict to specific domains
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let game_router = game::router().with_state(state.clone());
    let admin_router = admin::router().with_state(state.clone());
    let players_router = players::router().with_state(state.clone());
    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/game", game_router)
        .nest("/admin", admin_router)
        .merge(players_router)
        .layer(cors)
        .with_state(state)
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let uptime = state.start_time.elapsed().as_secs();
    assert!(
        uptime <= 31_536_000,
        "Uptime exceeds one year without restart"
    );
    let response = HealthResponse {
        status: "live",
        uptime_seconds: uptime,
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let last_sync = state.last_sync_unix.load(AtomicOrdering::SeqCst);
    assert!(last_sync <= i64::MAX as u64, "Last sync time exceeds bounds");
    assert!(last_sync < 4_102_444_800, "Last sync time sanity exceeded");

    let rpc_timeout_ms =
        u64::try_from(state.rpc.timeout().as_millis()).expect("RPC timeout exceeds u64 bounds");

    let response = ReadyResponse {
        status: "ready",
        last_supply_sync_unix: last_sync,
        rpc_timeout_ms,
        cache_entries: CacheSummary {
            leaderboards: state.cache.leaderboards.entry_count(),
            activity: state.cache.activity.entry_count(),
            unit_values: state.cache.unit_values.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    last_supply_sync_unix: u64,
    rpc_timeout_ms: u64,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    leaderboards: u64,
    activity: u64,
    unit_values: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: String) -> Self {
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self { status, message }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        info!("HTTP error: {}", self.message);
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<EngineError> for HttpError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::FaucetNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::AdmissionDenied(_) => StatusCode::FORBIDDEN,
            EngineError::LedgerUnavailable(_) => StatusCode::BAD_GATEWAY,
            EngineError::ClaimRejected(_) => StatusCode::CONFLICT,
            EngineError::SettlementUnknown { .. } => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Database(db_err) => {
                error!("Database failure: {db_err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        HttpError::new(status, err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_http_statuses() {
        let cases = vec![
            (
                EngineError::Validation("bad input".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::FaucetNotFound(7), StatusCode::NOT_FOUND),
            (
                EngineError::AdmissionDenied("out of range".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                EngineError::LedgerUnavailable("connection refused".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                EngineError::ClaimRejected("cooldown active".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::SettlementUnknown {
                    claim_ref: "ref".to_string(),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, expected) in cases {
            let mapped = HttpError::from(err);
            assert_eq!(mapped.status, expected, "Wrong status for {}", mapped.message);
        }
    }
}
