//! Token acquisition and single-flight refresh.
//!
//! [`TokenManager`] owns the [`CredentialStore`] of one client and is its only
//! writer. It exchanges account credentials for an initial [`Credential`],
//! hands out access tokens, and renews them shortly before they expire.
//!
//! # Single-flight refresh
//!
//! Refreshes are serialized by an async gate. Every caller records the number
//! of completed refreshes before it queues on the gate; once inside, a changed
//! count means another caller finished a refresh while this one waited, and
//! the recorded outcome of that refresh is returned instead of starting a new
//! one. Reads of a still-valid token never touch the gate.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use groheblue_core::{Endpoints, ReqwestTransport, Secret, SystemClock, TokenManager, DEFAULT_BASE_URL};
//!
//! let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(30))?);
//! let manager = TokenManager::new(transport, Endpoints::new(DEFAULT_BASE_URL)?, Arc::new(SystemClock));
//!
//! manager.acquire("user@example.com", &Secret::new("password")).await?;
//! let token = manager.current_token().await?;
//! println!("Authorization: {}", token.authorization_header());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use url::Url;

use crate::clock::Clock;
use crate::store::{CredentialStore, Secret};
use crate::token::{AccessToken, Credential, TokenError, TokenResponse};
use crate::transport::{ApiRequest, Endpoints, Transport};

/// Acquires, caches and refreshes the credential of one account.
pub struct TokenManager {
    store: CredentialStore,
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    clock: Arc<dyn Clock>,
    /// Outcome of the most recent refresh; held while a refresh is running.
    refresh_gate: Mutex<Option<Result<Credential, TokenError>>>,
    completed_refreshes: AtomicU64,
}

impl TokenManager {
    /// Create a manager with an empty credential store.
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: CredentialStore::new(),
            transport,
            endpoints,
            clock,
            refresh_gate: Mutex::new(None),
            completed_refreshes: AtomicU64::new(0),
        }
    }

    /// Exchange account credentials for an initial credential.
    ///
    /// Any failure (rejection, unreachable server, malformed body) is reported
    /// as [`TokenError::InitializationFailed`]. Calling this again later
    /// re-authenticates after a refresh token has been rejected.
    pub async fn acquire(&self, email: &str, password: &Secret) -> Result<Credential, TokenError> {
        let mut gate = self.refresh_gate.lock().await;

        let body = json!({
            "username": email,
            "password": password.expose(),
        });

        let credential = self
            .exchange(self.endpoints.login(), body)
            .await
            .map_err(|e| {
                tracing::error!("Could not get initial tokens: {}", e);
                TokenError::InitializationFailed {
                    message: e.to_string(),
                }
            })?;

        self.store.install(credential.clone());
        *gate = Some(Ok(credential.clone()));
        self.completed_refreshes.fetch_add(1, Ordering::AcqRel);

        tracing::info!(expires_at = %credential.expires_at(), "Acquired initial credential");
        Ok(credential)
    }

    /// Return a valid access token, refreshing first if the current one expired.
    ///
    /// Concurrent callers that observe expiry share a single refresh.
    pub async fn current_token(&self) -> Result<AccessToken, TokenError> {
        let observed = self.completed_refreshes.load(Ordering::Acquire);
        let credential = self.store.snapshot().ok_or(TokenError::NotInitialized)?;

        if !credential.is_expired_at(self.clock.now()) {
            tracing::debug!("Using cached access token");
            return Ok(credential.access_token().clone());
        }

        tracing::info!(expires_at = %credential.expires_at(), "Access token expired, refreshing");
        let refreshed = self.refresh_single_flight(observed).await?;
        Ok(refreshed.access_token().clone())
    }

    /// Exchange the current refresh token for a new credential.
    ///
    /// Joins a refresh that is already running instead of starting another.
    /// On failure the installed credential is left untouched.
    pub async fn refresh(&self) -> Result<Credential, TokenError> {
        let observed = self.completed_refreshes.load(Ordering::Acquire);
        self.refresh_single_flight(observed).await
    }

    /// Refresh after the server answered 401 for `rejected`.
    ///
    /// If the installed token already differs from `rejected`, someone else
    /// renewed it in the meantime and the installed token is returned as is.
    pub async fn refresh_rejected(&self, rejected: &AccessToken) -> Result<AccessToken, TokenError> {
        let observed = self.completed_refreshes.load(Ordering::Acquire);
        let credential = self.store.snapshot().ok_or(TokenError::NotInitialized)?;

        if credential.access_token() != rejected {
            tracing::debug!("Rejected token already replaced");
            return Ok(credential.access_token().clone());
        }

        tracing::info!("Access token rejected by server, refreshing");
        let refreshed = self.refresh_single_flight(observed).await?;
        Ok(refreshed.access_token().clone())
    }

    /// The installed credential, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.store.snapshot()
    }

    /// Expiry of the installed credential, safety margin included.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.store.snapshot().map(|credential| credential.expires_at())
    }

    /// Whether a credential has been acquired.
    pub fn is_initialized(&self) -> bool {
        !self.store.is_empty()
    }

    async fn refresh_single_flight(&self, observed: u64) -> Result<Credential, TokenError> {
        let mut gate = self.refresh_gate.lock().await;

        if self.completed_refreshes.load(Ordering::Acquire) != observed {
            if let Some(outcome) = gate.as_ref() {
                tracing::debug!("Joined refresh completed while waiting");
                return outcome.clone();
            }
        }

        let outcome = self.exchange_refresh_token().await;
        match &outcome {
            Ok(credential) => {
                self.store.install(credential.clone());
                tracing::info!(expires_at = %credential.expires_at(), "Refreshed tokens");
            }
            Err(e) => tracing::error!("Failed to refresh tokens: {}", e),
        }

        *gate = Some(outcome.clone());
        self.completed_refreshes.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn exchange_refresh_token(&self) -> Result<Credential, TokenError> {
        let current = self.store.snapshot().ok_or(TokenError::NotInitialized)?;
        let body = json!({ "refresh_token": current.refresh_token().expose() });
        self.exchange(self.endpoints.refresh(), body).await
    }

    /// POST to a token endpoint and build a credential from the answer.
    async fn exchange(&self, url: Url, body: serde_json::Value) -> Result<Credential, TokenError> {
        let response = self
            .transport
            .execute(ApiRequest::post_json(url, body))
            .await
            .map_err(|e| TokenError::Network {
                message: e.to_string(),
            })?;

        match response.status {
            200..=299 => {}
            status if status >= 500 => return Err(TokenError::Server { status }),
            status => {
                return Err(TokenError::Rejected {
                    status,
                    message: response.body_excerpt(),
                });
            }
        }

        let payload: TokenResponse = response.json().map_err(|e| TokenError::InvalidResponse {
            message: e.to_string(),
        })?;

        payload.into_credential(self.clock.now())
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &self.store)
            .field("endpoints", &self.endpoints)
            .field(
                "completed_refreshes",
                &self.completed_refreshes.load(Ordering::Relaxed),
            )
            .finish()
    }
}
