//! Token types for the GROHE cloud API.
//!
//! This module provides:
//! - [`AccessToken`] - The bearer token attached to API requests
//! - [`Credential`] - Access token, refresh token and expiry as one unit
//! - [`TokenError`] - Failures while acquiring or refreshing tokens

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::store::Secret;

/// Seconds subtracted from the server-reported lifetime.
///
/// Tokens are renewed this long before the server would reject them, so a
/// request is never built with a token that expires while in flight.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// Error type for token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The initial exchange of account credentials failed.
    ///
    /// The owning client cannot operate without a first credential.
    #[error("initial credential acquisition failed: {message}")]
    InitializationFailed { message: String },

    /// The server refused the refresh token.
    ///
    /// Only a fresh acquisition with account credentials can recover.
    #[error("token refresh rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The token endpoint answered with a server error.
    #[error("token endpoint returned server error {status}")]
    Server { status: u16 },

    /// The token endpoint could not be reached.
    #[error("network error: {message}")]
    Network { message: String },

    /// The token endpoint answered with a body we could not use.
    #[error("invalid token response: {message}")]
    InvalidResponse { message: String },

    /// No credential has been acquired yet.
    #[error("no credential has been acquired")]
    NotInitialized,
}

impl TokenError {
    /// Whether retrying the same exchange later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Server { .. })
    }
}

/// Bearer token attached to API requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(Secret);

impl AccessToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token))
    }

    /// Expose the raw token. Never log the result.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.0.expose())
    }
}

/// Access token, refresh token and expiry instant.
///
/// The fields are private and only set together by [`Credential::issue`]:
/// a stale token is never paired with a fresh expiry or the other way round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: AccessToken,
    refresh_token: Secret,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential issued at `issued_at` for a server lifetime of `lifetime`.
    ///
    /// The expiry is `issued_at + lifetime - 60s`. Returns `None` if that
    /// instant is outside the representable date range.
    pub fn issue(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Option<Self> {
        let expires_at = issued_at
            .checked_add_signed(lifetime)?
            .checked_sub_signed(Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS))?;

        Some(Self {
            access_token: AccessToken::new(access_token),
            refresh_token: Secret::new(refresh_token),
            issued_at,
            expires_at,
        })
    }

    /// The bearer token.
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// The token used to obtain the next credential.
    pub fn refresh_token(&self) -> &Secret {
        &self.refresh_token
    }

    /// When this credential was issued.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When this credential must be renewed.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the credential must be renewed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Body returned by both the login and the refresh endpoint.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    refresh_token: String,
    access_token_expires_in: i64,
}

impl TokenResponse {
    pub(crate) fn into_credential(self, issued_at: DateTime<Utc>) -> Result<Credential, TokenError> {
        if self.access_token_expires_in <= 0 {
            return Err(TokenError::InvalidResponse {
                message: format!(
                    "non-positive access_token_expires_in: {}",
                    self.access_token_expires_in
                ),
            });
        }

        let expires_in = self.access_token_expires_in;
        let out_of_range = || TokenError::InvalidResponse {
            message: format!("access_token_expires_in out of range: {expires_in}"),
        };

        let lifetime = Duration::try_seconds(expires_in).ok_or_else(out_of_range)?;
        Credential::issue(self.access_token, self.refresh_token, issued_at, lifetime)
            .ok_or_else(out_of_range)
    }
}
