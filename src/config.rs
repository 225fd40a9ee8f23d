use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// HTTP port for REST, WebSocket and SSE
    pub port: u16,
    /// Allowed CORS origins; empty means any
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Capacity of the WebSocket/SSE broadcast channels
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_broadcast_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL, or "memory://" for the in-process store
    pub url: String,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Run embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// REST endpoint of the blockchain-data provider
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Token contract addresses to snapshot, paired with their symbol
    #[serde(default)]
    pub tracked_tokens: Vec<TrackedToken>,
    /// Symbols to fetch USD prices for
    #[serde(default)]
    pub price_symbols: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TrackedToken {
    pub address: String,
    pub symbol: String,
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.codex.io/v1".to_string(),
            api_key: String::new(),
            tracked_tokens: Vec::new(),
            price_symbols: Vec::new(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OAuthConfig {
    #[serde(default)]
    pub discord: Option<OAuthClientConfig>,
    #[serde(default)]
    pub twitter: Option<OAuthClientConfig>,
    /// Seconds an issued state token stays valid (default: 600)
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
}

fn default_state_ttl() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Disable all scheduled jobs (API-only instance)
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub holders_interval_secs: u64,
    pub prices_interval_secs: u64,
    pub signals_interval_secs: u64,
    /// Upper bound on a single job run
    pub job_timeout_secs: u64,
    /// Transfer window used for spike detection
    pub spike_window_secs: u64,
    /// Percent increase in transfers that counts as a spike (e.g., 50.0)
    pub spike_threshold_pct: f64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            holders_interval_secs: 300,
            prices_interval_secs: 60,
            signals_interval_secs: 3600,
            job_timeout_secs: 120,
            spike_window_secs: 900,
            spike_threshold_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Maximum restarts inside the window before giving up
    pub max_restarts: u32,
    pub restart_window_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Random jitter applied to each backoff (0.0 - 1.0)
    pub jitter_pct: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_window_secs: 300,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            jitter_pct: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("database.url", "postgres://localhost/gorillionaire")?
            .set_default("database.max_connections", 5)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GORILLIONAIRE_ENV")
                        .unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GORILLIONAIRE_DATABASE__URL, etc.)
            .add_source(
                Environment::with_prefix("GORILLIONAIRE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration for local runs and tests: memory store, jobs off
    pub fn in_memory() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
                cors_origins: Vec::new(),
                broadcast_capacity: default_broadcast_capacity(),
            },
            database: DatabaseConfig {
                url: "memory://".to_string(),
                max_connections: 1,
                run_migrations: false,
            },
            blockchain: BlockchainConfig::default(),
            llm: LlmConfig::default(),
            oauth: OAuthConfig {
                discord: None,
                twitter: None,
                state_ttl_secs: default_state_ttl(),
            },
            jobs: JobsConfig {
                enabled: false,
                ..JobsConfig::default()
            },
            supervisor: SupervisorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }

        if self.server.broadcast_capacity == 0 {
            errors.push("server.broadcast_capacity must be positive".to_string());
        }

        if self.database.url.trim().is_empty() {
            errors.push("database.url is required".to_string());
        }

        if self.jobs.enabled {
            for (name, secs) in [
                ("holders_interval_secs", self.jobs.holders_interval_secs),
                ("prices_interval_secs", self.jobs.prices_interval_secs),
                ("signals_interval_secs", self.jobs.signals_interval_secs),
                ("job_timeout_secs", self.jobs.job_timeout_secs),
                ("spike_window_secs", self.jobs.spike_window_secs),
            ] {
                if secs == 0 {
                    errors.push(format!("jobs.{name} must be positive"));
                }
            }
            if self.jobs.spike_threshold_pct <= 0.0 {
                errors.push("jobs.spike_threshold_pct must be positive".to_string());
            }
            for token in &self.blockchain.tracked_tokens {
                if crate::domain::normalize_address(&token.address).is_err() {
                    errors.push(format!(
                        "blockchain.tracked_tokens: invalid address {}",
                        token.address
                    ));
                }
            }
        }

        if self.supervisor.initial_backoff_ms == 0 {
            errors.push("supervisor.initial_backoff_ms must be positive".to_string());
        }

        if self.supervisor.max_backoff_ms < self.supervisor.initial_backoff_ms {
            errors.push(
                "supervisor.max_backoff_ms should be at least initial_backoff_ms".to_string(),
            );
        }

        if !(0.0..=1.0).contains(&self.supervisor.jitter_pct) {
            errors.push("supervisor.jitter_pct must be between 0 and 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_config_is_valid() {
        let config = AppConfig::in_memory();
        assert!(config.database.is_memory());
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "127.0.0.1:4000");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::in_memory();
        config.jobs.enabled = true;
        config.jobs.prices_interval_secs = 0;
        config.supervisor.jitter_pct = 1.5;
        config.blockchain.tracked_tokens.push(TrackedToken {
            address: "not-an-address".to_string(),
            symbol: "GORI".to_string(),
        });

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("prices_interval_secs")));
        assert!(errors.iter().any(|e| e.contains("jitter_pct")));
        assert!(errors.iter().any(|e| e.contains("not-an-address")));
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("does/not/exist").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.jobs.prices_interval_secs, 60);
        assert_eq!(config.supervisor.max_restarts, 5);
    }

    #[test]
    fn test_shipped_default_toml_is_valid() {
        let config = AppConfig::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.oauth.state_ttl_secs, 600);
        assert!(config.blockchain.price_symbols.contains(&"MON".to_string()));
    }
}
