//! Credential storage.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialStore`] - The single in-memory slot holding the current [`Credential`]
//!
//! Credentials are never written to disk; a store lives exactly as long as the
//! client that owns it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::token::Credential;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the backing memory is zeroed when the secret is dropped.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Holds the current credential of one client instance.
///
/// Reads take a shared lock and clone the credential out, so callers never
/// hold the lock across an `.await`. Writes replace the whole credential in
/// one step: tokens and expiry are never observed half-updated.
#[derive(Default)]
pub struct CredentialStore {
    slot: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone out the current credential, if one has been installed.
    pub fn snapshot(&self) -> Option<Credential> {
        self.slot.read().clone()
    }

    /// Install a new credential, returning the one it replaced.
    pub fn install(&self, credential: Credential) -> Option<Credential> {
        self.slot.write().replace(credential)
    }

    /// Whether no credential has been installed yet.
    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let expires_at = self.slot.read().as_ref().map(Credential::expires_at);
        f.debug_struct("CredentialStore")
            .field("expires_at", &expires_at)
            .finish()
    }
}
