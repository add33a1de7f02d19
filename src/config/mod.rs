use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub game: GameConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("MONAGO_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("MONAGO_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        self.game.ensure_bounds()?;
        self.sync.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub request_timeout_ms: Option<u64>,
    /// Shared manager contract; when set, unbound faucets settle through it
    pub manager_address: Option<String>,
    pub confirmation_timeout_ms: Option<u64>,
    pub confirmation_poll_ms: Option<u64>,
}

impl ChainConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(3_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    /// Budget for waiting on a claim outcome before reporting it unknown.
    pub fn confirmation_timeout(&self) -> Duration {
        let millis = self.confirmation_timeout_ms.unwrap_or(15_000);
        assert!(millis >= 1_000, "Confirmation budget must be at least 1s");
        assert!(
            millis <= 120_000,
            "Confirmation budget cannot exceed 2 minutes"
        );
        Duration::from_millis(millis)
    }

    pub fn confirmation_poll(&self) -> Duration {
        let millis = self.confirmation_poll_ms.unwrap_or(1_000);
        assert!(millis >= 100, "Confirmation poll must be at least 100ms");
        assert!(millis <= 10_000, "Confirmation poll cannot exceed 10s");
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    #[serde(default = "GameConfig::default_mining_radius_meters")]
    pub mining_radius_meters: f64,
    /// Fallback mine unit value in base units, used when the ledger read
    /// degrades and nothing is cached
    #[serde(default = "GameConfig::default_mine_unit_value")]
    pub default_mine_unit_value: u64,
    /// Upper bound on a single mine grant in base units
    #[serde(default = "GameConfig::default_max_mine_amount")]
    pub max_mine_amount: u64,
    /// Supply assigned to faucets created without an explicit total, in coins
    #[serde(default = "GameConfig::default_faucet_coins")]
    pub default_faucet_coins: i64,
}

impl GameConfig {
    pub fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.mining_radius_meters.is_finite() && self.mining_radius_meters > 0.0,
            "Mining radius must be positive"
        );
        assert!(
            self.mining_radius_meters <= 10_000.0,
            "Mining radius exceeds defensive limit"
        );
        assert!(
            self.default_mine_unit_value > 0,
            "Default mine unit value must be positive"
        );
        assert!(
            self.max_mine_amount >= self.default_mine_unit_value,
            "Max mine amount must cover at least one unit"
        );
        assert!(
            self.default_faucet_coins > 0 && self.default_faucet_coins <= 1_000_000,
            "Default faucet supply out of bounds"
        );
        Ok(())
    }

    const fn default_mining_radius_meters() -> f64 {
        50.0
    }

    // 0.01 MON
    const fn default_mine_unit_value() -> u64 {
        10_000_000
    }

    // 1 MON
    const fn default_max_mine_amount() -> u64 {
        1_000_000_000
    }

    const fn default_faucet_coins() -> i64 {
        100
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    pub batch_size: u64,
    /// Age a `submitted` settlement must reach before the worker re-polls it
    #[serde(default = "SyncConfig::default_settlement_grace_ms")]
    pub settlement_grace_ms: u64,
    /// Verdict-less re-polls a settlement may consume before it is parked
    /// for manual reconciliation
    #[serde(default = "SyncConfig::default_settlement_max_polls")]
    pub settlement_max_polls: u32,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        assert!(
            self.poll_interval_ms >= 100,
            "Poll interval must be >= 100ms"
        );
        assert!(
            self.poll_interval_ms <= 600_000,
            "Poll interval must be <= 10 minutes"
        );
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settlement_grace(&self) -> Duration {
        assert!(
            self.settlement_grace_ms >= 1_000,
            "Settlement grace must be >= 1s"
        );
        Duration::from_millis(self.settlement_grace_ms)
    }

    pub fn ensure_bounds(&self) -> Result<()> {
        assert!(self.batch_size > 0, "Batch size must be positive");
        assert!(self.batch_size <= 512, "Batch size exceeds defensive limit");
        assert!(
            self.settlement_grace_ms >= 1_000,
            "Settlement grace below minimum"
        );
        assert!(
            self.settlement_grace_ms <= 3_600_000,
            "Settlement grace exceeds one hour"
        );
        assert!(
            self.settlement_max_polls > 0,
            "Settlement poll cap must be positive"
        );
        assert!(
            self.settlement_max_polls <= 10_000,
            "Settlement poll cap exceeds defensive limit"
        );
        Ok(())
    }

    const fn default_settlement_grace_ms() -> u64 {
        30_000
    }

    const fn default_settlement_max_polls() -> u32 {
        20
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub leaderboards_max_capacity: u64,
    pub leaderboards_ttl_seconds: u64,
    pub activity_max_capacity: u64,
    pub activity_ttl_seconds: u64,
    pub unit_values_max_capacity: u64,
    pub unit_values_ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.leaderboards_max_capacity >= 10,
            "Leaderboard cache capacity must be at least 10"
        );
        assert!(
            self.leaderboards_ttl_seconds <= 3_600,
            "Leaderboard cache TTL cannot exceed one hour"
        );
        assert!(
            self.activity_max_capacity >= 10,
            "Activity cache capacity must be at least 10"
        );
        assert!(
            self.activity_ttl_seconds <= 3_600,
            "Activity cache TTL cannot exceed one hour"
        );
        assert!(
            self.unit_values_max_capacity >= 10,
            "Unit value cache capacity must be at least 10"
        );
        assert!(
            self.unit_values_ttl_seconds <= 86_400,
            "Unit value cache TTL cannot exceed one day"
        );
        Ok(())
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
