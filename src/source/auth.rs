//! OAuth 2.0 token handling — thin collaborator for the Gmail source.
//!
//! Loads a previously authorized token from `token_file`, refreshes it
//! against the token endpoint when expired, and writes the refreshed token
//! back. Interactive authorization is out of scope: when the refresh token
//! itself is rejected the run aborts and the token must be re-provisioned
//! manually, same as the cron-driven deployment expects.

use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CredentialError;

/// Token cached on disk, in the authorized-user JSON layout the OAuth
/// tooling writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    refresh_token: String,
    token_uri: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// An access token within a minute of expiring counts as expired.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry > now + ChronoDuration::seconds(60),
            None => false,
        }
    }
}

/// Successful token-endpoint refresh response.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Downloaded OAuth client secrets file; the client id/secret pair lives
/// under an `installed` (desktop app) or `web` key.
#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: Option<ClientPair>,
    web: Option<ClientPair>,
}

#[derive(Debug, Deserialize)]
struct ClientPair {
    client_id: String,
    client_secret: String,
}

/// Provides a valid access token for the Gmail API.
///
/// The token is read from disk once per run and then served from memory;
/// the lock makes refresh single-flight, so concurrent dispatch callers
/// wait for one refresh and one file write instead of racing their own.
pub struct TokenProvider {
    token_file: PathBuf,
    credentials_file: PathBuf,
    client: reqwest::Client,
    cached: tokio::sync::Mutex<Option<StoredToken>>,
}

impl TokenProvider {
    pub fn new(token_file: PathBuf, credentials_file: PathBuf) -> Self {
        Self {
            token_file,
            credentials_file,
            client: reqwest::Client::new(),
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Return a usable access token, refreshing and persisting when the
    /// cached one has expired.
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        let mut token = match cached.take() {
            Some(token) => token,
            None => self.load()?,
        };

        if token.is_fresh(Utc::now()) {
            debug!("cached gmail token still valid");
            let access = token.token.clone();
            *cached = Some(token);
            return Ok(access);
        }

        debug!("gmail token expired, refreshing");
        let (client_id, client_secret) = self.client_pair(&token)?;
        let refreshed = self
            .client
            .post(&token.token_uri)
            .form(&[
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", token.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        if !refreshed.status().is_success() {
            let status = refreshed.status();
            let body = refreshed.text().await.unwrap_or_default();
            return Err(CredentialError::RefreshFailed(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let response: RefreshResponse = refreshed
            .json()
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        token.token = response.access_token;
        token.expiry = Some(Utc::now() + ChronoDuration::seconds(response.expires_in));
        if let Some(refresh_token) = response.refresh_token {
            token.refresh_token = refresh_token;
        }
        self.persist(&token)?;
        debug!("gmail token refreshed");
        let access = token.token.clone();
        *cached = Some(token);
        Ok(access)
    }

    /// Client id/secret from the token itself, else from the downloaded
    /// client secrets file.
    fn client_pair(&self, token: &StoredToken) -> Result<(String, String), CredentialError> {
        if let (Some(id), Some(secret)) = (&token.client_id, &token.client_secret) {
            return Ok((id.clone(), secret.clone()));
        }

        let unreadable = |reason: String| CredentialError::CredentialsUnreadable {
            path: self.credentials_file.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(&self.credentials_file)
            .map_err(|e| unreadable(e.to_string()))?;
        let secrets: ClientSecrets =
            serde_json::from_str(&raw).map_err(|e| unreadable(e.to_string()))?;
        let pair = secrets
            .installed
            .or(secrets.web)
            .ok_or_else(|| unreadable("no installed or web client section".to_string()))?;
        Ok((pair.client_id, pair.client_secret))
    }

    fn load(&self) -> Result<StoredToken, CredentialError> {
        let raw = std::fs::read_to_string(&self.token_file).map_err(|e| {
            CredentialError::TokenUnreadable {
                path: self.token_file.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        serde_json::from_str(&raw).map_err(|e| CredentialError::TokenUnreadable {
            path: self.token_file.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn persist(&self, token: &StoredToken) -> Result<(), CredentialError> {
        let raw = serde_json::to_string_pretty(token).map_err(|e| {
            CredentialError::PersistFailed {
                path: self.token_file.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        std::fs::write(&self.token_file, raw).map_err(|e| CredentialError::PersistFailed {
            path: self.token_file.display().to_string(),
            reason: e.to_string(),
        })
    }
}
