//! OAuth 2.0 authorization-code clients for Discord and Twitter
//!
//! Only the consumer side is implemented: building the authorize URL,
//! exchanging the code for an access token, and reading the user's profile.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::OAuthClientConfig;
use crate::domain::SocialProvider;
use crate::error::{GorillionaireError, Result};

/// Identity returned by a provider after a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub external_id: String,
    pub username: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> SocialProvider;

    /// URL the user is redirected to; `state` must come back on the callback.
    /// Providers that use PKCE derive the challenge from `code_verifier`.
    fn authorize_url(&self, state: &str, code_verifier: &str) -> Result<String>;

    /// Exchange the callback code and fetch the profile
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<OAuthProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

struct ProviderEndpoints {
    authorize: &'static str,
    token: &'static str,
    profile: &'static str,
    scope: &'static str,
}

static DISCORD: ProviderEndpoints = ProviderEndpoints {
    authorize: "https://discord.com/oauth2/authorize",
    token: "https://discord.com/api/oauth2/token",
    profile: "https://discord.com/api/users/@me",
    scope: "identify",
};

static TWITTER: ProviderEndpoints = ProviderEndpoints {
    authorize: "https://twitter.com/i/oauth2/authorize",
    token: "https://api.twitter.com/2/oauth2/token",
    profile: "https://api.twitter.com/2/users/me",
    scope: "users.read tweet.read",
};

/// S256 PKCE challenge for a code verifier
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// HTTP OAuth client parameterised by provider
pub struct HttpOAuthClient {
    provider: SocialProvider,
    config: OAuthClientConfig,
    endpoints: &'static ProviderEndpoints,
    http: Client,
}

impl HttpOAuthClient {
    pub fn new(provider: SocialProvider, config: OAuthClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GorillionaireError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let endpoints = match provider {
            SocialProvider::Discord => &DISCORD,
            SocialProvider::Twitter => &TWITTER,
        };

        Ok(Self {
            provider,
            config,
            endpoints,
            http,
        })
    }

    async fn fetch_token(&self, code: &str, code_verifier: &str) -> Result<String> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("client_id", self.config.client_id.clone()),
        ];
        if self.provider == SocialProvider::Twitter {
            form.push(("code_verifier", code_verifier.to_string()));
        }

        let response = self
            .http
            .post(self.endpoints.token)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("{} token exchange failed ({}): {}", self.provider, status, body);
            return Err(GorillionaireError::upstream(
                self.provider.as_str(),
                format!("token exchange returned {}", status),
            ));
        }

        Ok(response.json::<TokenResponse>().await?.access_token)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile> {
        let response = self
            .http
            .get(self.endpoints.profile)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GorillionaireError::upstream(
                self.provider.as_str(),
                format!("profile request returned {}", status),
            ));
        }

        let body: serde_json::Value = response.json().await?;
        parse_profile(self.provider, &body)
    }
}

/// Discord returns the user object at the top level, Twitter under `data`
fn parse_profile(provider: SocialProvider, body: &serde_json::Value) -> Result<OAuthProfile> {
    let user = match provider {
        SocialProvider::Discord => body,
        SocialProvider::Twitter => &body["data"],
    };

    let external_id = user["id"].as_str().map(str::to_string);
    let username = user["username"].as_str().map(str::to_string);

    match (external_id, username) {
        (Some(external_id), Some(username)) => Ok(OAuthProfile {
            external_id,
            username,
        }),
        _ => Err(GorillionaireError::upstream(
            provider.as_str(),
            "profile response missing id/username",
        )),
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthClient {
    fn provider(&self) -> SocialProvider {
        self.provider
    }

    fn authorize_url(&self, state: &str, code_verifier: &str) -> Result<String> {
        let mut url = Url::parse(self.endpoints.authorize)
            .map_err(|e| GorillionaireError::Internal(format!("bad authorize url: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("scope", self.endpoints.scope)
                .append_pair("state", state);
            if self.provider == SocialProvider::Twitter {
                query
                    .append_pair("code_challenge", &pkce_challenge(code_verifier))
                    .append_pair("code_challenge_method", "S256");
            }
        }

        Ok(url.to_string())
    }

    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<OAuthProfile> {
        let token = self.fetch_token(code, code_verifier).await?;
        let profile = self.fetch_profile(&token).await?;
        debug!(
            "{} profile resolved: {} ({})",
            self.provider, profile.username, profile.external_id
        );
        Ok(profile)
    }
}
