//! OAuth state-token registry
//!
//! Each authorize request gets a random `state` bound to the provider and the
//! wallet that started the flow, plus a PKCE verifier. A state can be
//! consumed exactly once and only before it expires.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use crate::domain::SocialProvider;
use crate::error::{GorillionaireError, Result};

const STATE_LEN: usize = 32;
const VERIFIER_LEN: usize = 64;

/// What a valid state resolves to on the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub provider: SocialProvider,
    pub user_address: String,
    pub code_verifier: String,
    pub expires_at: DateTime<Utc>,
}

pub struct OAuthStateRegistry {
    ttl: Duration,
    pending: DashMap<String, PendingAuthorization>,
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl OAuthStateRegistry {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            pending: DashMap::new(),
        }
    }

    /// Issue a new state token; returns (state, code_verifier)
    pub fn issue(&self, provider: SocialProvider, user_address: &str) -> (String, String) {
        self.purge_expired();

        let state = random_token(STATE_LEN);
        let code_verifier = random_token(VERIFIER_LEN);
        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                provider,
                user_address: user_address.to_string(),
                code_verifier: code_verifier.clone(),
                expires_at: Utc::now() + self.ttl,
            },
        );

        debug!("Issued {} OAuth state for {}", provider, user_address);
        (state, code_verifier)
    }

    /// Consume a state token. The token is removed whether or not it is valid
    /// for this provider, so a leaked state cannot be replayed elsewhere.
    pub fn consume(&self, provider: SocialProvider, state: &str) -> Result<PendingAuthorization> {
        let (_, pending) = self
            .pending
            .remove(state)
            .ok_or_else(|| GorillionaireError::OAuthState("unknown or already used state".into()))?;

        if pending.expires_at <= Utc::now() {
            return Err(GorillionaireError::OAuthState("state expired".into()));
        }

        if pending.provider != provider {
            return Err(GorillionaireError::OAuthState(format!(
                "state was issued for {}",
                pending.provider
            )));
        }

        Ok(pending)
    }

    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.pending.retain(|_, p| p.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
