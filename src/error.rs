use thiserror::Error;

/// Main error type for the Gorillionaire backend
#[derive(Error, Debug)]
pub enum GorillionaireError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream error from {service}: {message}")]
    Upstream { service: String, message: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Request errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("OAuth state rejected: {0}")]
    OAuthState(String),

    #[error("Service not configured: {0}")]
    NotConfigured(String),

    // Job / supervision errors
    #[error("Timed out after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Restart attempts exhausted: {attempts} within {window_secs}s")]
    RestartsExhausted { attempts: u32, window_secs: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GorillionaireError
pub type Result<T> = std::result::Result<T, GorillionaireError>;

impl GorillionaireError {
    pub fn upstream(service: &str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// True for errors caused by the caller rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidAddress(_)
                | Self::NotFound(_)
                | Self::Conflict(_)
                | Self::Auth(_)
                | Self::OAuthState(_)
        )
    }
}
