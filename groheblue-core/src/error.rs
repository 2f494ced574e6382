//! Top-level error types for GroheBlue.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dashboard::DashboardError;
use crate::dispatcher::{DispatchError, FetchError};
use crate::model::ApplianceId;
use crate::token::TokenError;
use crate::transport::TransportError;

/// Top-level error type encompassing all GroheBlue errors.
#[derive(Debug, Error)]
pub enum GroheError {
    /// Error from token acquisition or refresh.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Error from command dispatch.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Error from dashboard retrieval.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error from a dashboard projection.
    #[error("dashboard error: {0}")]
    Dashboard(#[from] DashboardError),

    /// The HTTP client could not be created.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The appliance is neither configured nor listed in the dashboard.
    #[error("unknown appliance: {appliance_id}")]
    UnknownAppliance { appliance_id: ApplianceId },

    /// The account has no appliances.
    #[error("no appliance found for this account")]
    NoAppliance,
}
