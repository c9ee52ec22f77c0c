//! Configuration management for the SocialRank engine
//!
//! Strongly-typed configuration with validation, environment variable parsing
//! and defaults matching the reference deployment.
//!
//! # Example
//! ```no_run
//! use socialrank::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Snapshot key: {}", config.persistence.snapshot_key);
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Hard upper bound on per-user history length
pub const HISTORY_CAP: usize = 100;

/// Default key of the persisted snapshot blob
pub const DEFAULT_SNAPSHOT_KEY: &str = "social_algorithm_data";

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Ranking engine tuning
    pub engine: EngineConfig,
    /// Background task intervals
    pub scheduler: SchedulerConfig,
    /// Snapshot storage
    pub persistence: PersistenceConfig,
    /// API server configuration
    pub api: ApiConfig,
}

/// Ranking engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum history entries per user (never above [`HISTORY_CAP`])
    pub history_cap: usize,
    /// Maximum interest tags kept per user
    pub max_interests: usize,
    /// Time for a content's recency score to halve
    pub recency_half_life: Duration,
    /// Users idle longer than this are dropped by the optimizer
    pub inactive_user_after: Duration,
    /// Content whose recency decays below this is dropped by the optimizer
    pub min_recency: f64,
    /// Seed for the diversity exploration term
    pub diversity_seed: u64,
    /// Upper bound on tracked content records
    pub max_content: usize,
    /// Feed composition slower than this is logged as a warning
    pub slow_feed_threshold: Duration,
}

/// Periodic task configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Full optimizer sweep interval
    pub optimize_interval: Duration,
    /// Snapshot save interval
    pub persist_interval: Duration,
    /// Derived-metric refresh interval
    pub refresh_interval: Duration,
}

/// Snapshot backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Files under a local directory
    File,
    /// Process memory only (tests, ephemeral deployments)
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "disk" => Ok(StoreBackend::File),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(Error::InvalidConfig {
                key: "RANK_STORE_BACKEND",
                message: format!("Unknown backend '{}', expected file or memory", other).into(),
            }),
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub backend: StoreBackend,
    /// Directory for the file backend
    pub dir: PathBuf,
    /// Key the snapshot blob is stored under
    pub snapshot_key: String,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_cap: HISTORY_CAP,
            max_interests: 50,
            recency_half_life: Duration::from_secs(72 * 3600),
            inactive_user_after: Duration::from_secs(30 * 24 * 3600),
            min_recency: 0.1,
            diversity_seed: 0,
            max_content: 100_000,
            slow_feed_threshold: Duration::from_millis(50),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            optimize_interval: Duration::from_secs(300),
            persist_interval: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            dir: PathBuf::from("./data"),
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine, a broken one is not
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(Error::config_with_source("failed to load .env file", e));
            }
        }

        let config = Self {
            engine: EngineConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
            persistence: PersistenceConfig::from_env()?,
            api: ApiConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;

        if engine.history_cap == 0 || engine.history_cap > HISTORY_CAP {
            return Err(Error::InvalidConfig {
                key: "RANK_HISTORY_CAP",
                message: format!("history cap must be within 1..={}", HISTORY_CAP).into(),
            });
        }

        if engine.recency_half_life.is_zero() {
            return Err(Error::InvalidConfig {
                key: "RANK_RECENCY_HALF_LIFE_HOURS",
                message: "half-life must be positive".into(),
            });
        }

        if !(0.0..1.0).contains(&engine.min_recency) {
            return Err(Error::InvalidConfig {
                key: "RANK_MIN_RECENCY",
                message: "minimum recency must be within [0, 1)".into(),
            });
        }

        if engine.max_content == 0 {
            return Err(Error::InvalidConfig {
                key: "RANK_MAX_CONTENT",
                message: "content cap must be positive".into(),
            });
        }

        for (key, interval) in [
            ("RANK_OPTIMIZE_SECS", self.scheduler.optimize_interval),
            ("RANK_PERSIST_SECS", self.scheduler.persist_interval),
            ("RANK_REFRESH_SECS", self.scheduler.refresh_interval),
        ] {
            if interval.is_zero() {
                return Err(Error::InvalidConfig {
                    key,
                    message: "interval must be positive".into(),
                });
            }
        }

        if self.persistence.snapshot_key.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "RANK_SNAPSHOT_KEY",
                message: "snapshot key cannot be empty".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Engine:");
        info!("    History cap: {}", self.engine.history_cap);
        info!(
            "    Recency half-life: {}h",
            self.engine.recency_half_life.as_secs() / 3600
        );
        info!("    Diversity seed: {}", self.engine.diversity_seed);
        info!("  Scheduler:");
        info!(
            "    Optimize/persist/refresh: {:?}/{:?}/{:?}",
            self.scheduler.optimize_interval,
            self.scheduler.persist_interval,
            self.scheduler.refresh_interval
        );
        info!("  Persistence:");
        info!("    Backend: {:?}", self.persistence.backend);
        if self.persistence.backend == StoreBackend::File {
            info!("    Directory: {}", self.persistence.dir.display());
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
    }
}

impl EngineConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            history_cap: get_env_parsed_or("RANK_HISTORY_CAP", defaults.history_cap)?,
            max_interests: get_env_parsed_or("RANK_MAX_INTERESTS", defaults.max_interests)?,
            recency_half_life: get_env_duration_or("RANK_RECENCY_HALF_LIFE_HOURS", 72, 3600)?,
            inactive_user_after: get_env_duration_or("RANK_INACTIVE_USER_DAYS", 30, 24 * 3600)?,
            min_recency: get_env_parsed_or("RANK_MIN_RECENCY", defaults.min_recency)?,
            diversity_seed: get_env_parsed_or("RANK_DIVERSITY_SEED", defaults.diversity_seed)?,
            max_content: get_env_parsed_or("RANK_MAX_CONTENT", defaults.max_content)?,
            slow_feed_threshold: Duration::from_millis(get_env_parsed_or(
                "RANK_SLOW_FEED_MS",
                50,
            )?),
        })
    }
}

impl SchedulerConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            optimize_interval: get_env_duration_or("RANK_OPTIMIZE_SECS", 300, 1)?,
            persist_interval: get_env_duration_or("RANK_PERSIST_SECS", 60, 1)?,
            refresh_interval: get_env_duration_or("RANK_REFRESH_SECS", 30, 1)?,
        })
    }
}

impl PersistenceConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            backend: get_env_or("RANK_STORE_BACKEND", "file").parse()?,
            dir: PathBuf::from(get_env_or("RANK_STORE_DIR", "./data")),
            snapshot_key: get_env_or("RANK_SNAPSHOT_KEY", DEFAULT_SNAPSHOT_KEY),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            port: get_env_parsed_or("API_PORT", 8080)?,
            host: get_env_or("API_HOST", "0.0.0.0"),
            cors_enabled: get_env_parsed_or("API_CORS_ENABLED", true)?,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
/// A set but unparsable value is a configuration error.
fn get_env_parsed_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
            key,
            message: format!("Invalid value '{}': {}", value, e).into(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a whole-unit environment variable into a duration of `value * unit_secs`
/// seconds. Values whose product overflows are rejected.
fn get_env_duration_or(key: &'static str, default: u64, unit_secs: u64) -> Result<Duration> {
    let value = get_env_parsed_or(key, default)?;
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::InvalidConfig {
            key,
            message: format!("Value {} is too large", value).into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.history_cap, 100);
        assert_eq!(config.persistence.snapshot_key, "social_algorithm_data");
        assert_eq!(config.scheduler.optimize_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_history_cap_above_limit_rejected() {
        let mut config = Config::default();
        config.engine.history_cap = 101;
        match config.validate() {
            Err(Error::InvalidConfig { key, .. }) => assert_eq!(key, "RANK_HISTORY_CAP"),
            other => panic!("expected invalid config, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_half_life_rejected() {
        let mut config = Config::default();
        config.engine.recency_half_life = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_values_are_parsed_strictly() {
        std::env::set_var("RANK_TEST_UNITS", "48");
        assert_eq!(
            get_env_duration_or("RANK_TEST_UNITS", 72, 3600).unwrap(),
            Duration::from_secs(48 * 3600)
        );

        std::env::set_var("RANK_TEST_UNITS", u64::MAX.to_string());
        match get_env_duration_or("RANK_TEST_UNITS", 72, 3600) {
            Err(Error::InvalidConfig { key, .. }) => assert_eq!(key, "RANK_TEST_UNITS"),
            other => panic!("expected invalid config, got {:?}", other),
        }

        std::env::set_var("RANK_TEST_UNITS", "soon");
        assert!(get_env_duration_or("RANK_TEST_UNITS", 72, 3600).is_err());
        assert!(get_env_parsed_or::<usize>("RANK_TEST_UNITS", 50).is_err());
        std::env::remove_var("RANK_TEST_UNITS");

        assert_eq!(
            get_env_duration_or("RANK_TEST_UNITS", 30, 24 * 3600).unwrap(),
            Duration::from_secs(30 * 24 * 3600)
        );
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("file".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("s3".parse::<StoreBackend>().is_err());
    }
}
