use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;

use crate::config::CacheConfig;
use crate::engine::Engine;
use crate::models::player::{ActivityEntry, LeaderboardEntry};
use crate::rpc::RpcClient;

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<DatabaseConnection>,
    pub cache: Arc<ApiCache>,
    pub rpc: RpcClient,
    pub engine: Engine,
    pub start_time: Instant,
    pub last_sync_unix: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        database: Arc<DatabaseConnection>,
        cache: Arc<ApiCache>,
        rpc: RpcClient,
        engine: Engine,
        last_sync_unix: Arc<AtomicU64>,
    ) -> Self {
        assert!(
            cache.leaderboard_capacity >= 10,
            "Leaderboard cache capacity must be configured"
        );
        assert!(
            Arc::strong_count(&last_sync_unix) >= 1,
            "Sync state must be shared"
        );
        Self {
            database,
            cache,
            rpc,
            engine,
            start_time: Instant::now(),
            last_sync_unix,
        }
    }
}

pub struct ApiCache {
    pub leaderboards: Cache<String, Arc<Vec<LeaderboardEntry>>>,
    pub activity: Cache<String, Arc<Vec<ActivityEntry>>>,
    /// Last mine unit value observed per contract binding, in base units.
    pub unit_values: Cache<String, u64>,
    pub leaderboard_capacity: u64,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.leaderboards_max_capacity >= 10,
            "Leaderboard cache capacity threshold"
        );
        assert!(
            config.unit_values_max_capacity >= 10,
            "Unit value cache capacity threshold"
        );

        let leaderboards = Cache::builder()
            .max_capacity(config.leaderboards_max_capacity)
            .time_to_live(Duration::from_secs(config.leaderboards_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.leaderboards_ttl_seconds / 2 + 1))
            .build();

        let activity = Cache::builder()
            .max_capacity(config.activity_max_capacity)
            .time_to_live(Duration::from_secs(config.activity_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.activity_ttl_seconds / 2 + 1))
            .build();

        let unit_values = Cache::builder()
            .max_capacity(config.unit_values_max_capacity)
            .time_to_live(Duration::from_secs(config.unit_values_ttl_seconds))
            .time_to_idle(Duration::from_secs(config.unit_values_ttl_seconds / 2 + 1))
            .build();

        Self {
            leaderboards,
            activity,
            unit_values,
            leaderboard_capacity: config.leaderboards_max_capacity,
        }
    }
}
