use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};

use crate::api::error::ApiError;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn parse_boolish(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

pub fn admin_token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison over the sha256 digests
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

/// Admin token settings for the write endpoints (badge creation, V2 access)
#[derive(Debug, Clone)]
pub struct AdminAuth {
    token: Option<String>,
    required: bool,
}

impl AdminAuth {
    pub fn new(token: Option<String>, required: bool) -> Self {
        Self {
            token: token
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            required,
        }
    }

    /// `GORILLIONAIRE_API_ADMIN_TOKEN` and `GORILLIONAIRE_API_ADMIN_AUTH_REQUIRED`
    /// (defaults to required)
    pub fn from_env() -> Self {
        let required = match std::env::var("GORILLIONAIRE_API_ADMIN_AUTH_REQUIRED") {
            Ok(raw) => parse_boolish(&raw),
            Err(_) => true,
        };
        Self::new(std::env::var("GORILLIONAIRE_API_ADMIN_TOKEN").ok(), required)
    }

    /// Short fingerprint for logs; never log the token itself
    pub fn fingerprint(&self) -> Option<String> {
        self.token
            .as_deref()
            .map(|t| admin_token_fingerprint(t)[..12].to_string())
    }

    pub fn ensure_authorized(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        if self.token.is_none() && !self.required {
            return Ok(());
        }
        let Some(expected) = self.token.as_deref() else {
            return Err(ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "admin auth is required but GORILLIONAIRE_API_ADMIN_TOKEN is not configured",
            ));
        };

        let token = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .or_else(|| {
                headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(extract_bearer_token)
            });

        if token.is_some_and(|v| tokens_match(v, expected)) {
            return Ok(());
        }

        Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "admin auth failed (missing/invalid token)",
        ))
    }
}
