use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;

use super::dto::TokenResponse;
use crate::error::{CleanerError, CleanerResult};
use crate::helpers::config::{CleanerConfig, GRAPH_SCOPE};

// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_EXPIRES_IN: u64 = 3600;

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Client-credentials token source for Microsoft Graph.
pub struct ClientSecretCredential {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    token: Mutex<Option<AccessToken>>,
}

impl ClientSecretCredential {
    pub fn new(http: Client, config: &CleanerConfig) -> Self {
        Self {
            http,
            token_url: build_token_url(&config.authority_host, &config.tenant_id),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: GRAPH_SCOPE.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Returns a cached token, requesting a new one when it is missing or
    /// about to expire.
    pub async fn access_token(&self) -> CleanerResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + EXPIRY_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> CleanerResult<AccessToken> {
        log::debug!("Requesting Graph access token from {}", self.token_url);

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self.http.post(&self.token_url).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CleanerError::Auth(format!(
                "token request failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CleanerError::Auth(format!("invalid token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(CleanerError::Auth(
                "token response missing access_token".to_string(),
            ));
        }

        Ok(AccessToken {
            value: token.access_token,
            expires_at: token_expiry(Instant::now(), token.expires_in),
        })
    }
}

fn token_expiry(issued_at: Instant, expires_in: Option<u64>) -> Instant {
    let lifetime = expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
    issued_at
        .checked_add(Duration::from_secs(lifetime))
        .unwrap_or(issued_at + Duration::from_secs(DEFAULT_EXPIRES_IN))
}

pub fn build_token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        urlencoding::encode(tenant_id)
    )
}
