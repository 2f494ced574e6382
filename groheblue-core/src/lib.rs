//! # GroheBlue Core
//!
//! Client library for GROHE Blue water dispensers connected to the GROHE
//! cloud.
//!
//! This crate provides:
//! - Token acquisition with single-flight refresh ahead of expiry
//! - Typed appliance commands with validation before anything is sent
//! - Command dispatch with bounded retries and one re-authentication on 401
//! - Dashboard retrieval, appliance discovery and a periodic poller
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use groheblue_core::{ClientConfig, GroheClient, Secret};
//!
//! # async fn example() -> Result<(), groheblue_core::GroheError> {
//! let config = ClientConfig::new("user@example.com", Secret::new("password"));
//! let client = GroheClient::connect(&config).await?;
//!
//! for device in client.devices().await? {
//!     println!("{} in {}", device.appliance_id, device.room);
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod model;
pub mod store;
pub mod token;
pub mod transport;
pub mod token_manager;
pub mod command;
pub mod dashboard;
pub mod dispatcher;
pub mod config;
pub mod client;
pub mod poller;
pub mod error;

// Re-export commonly used types at crate root
pub use model::{
    ApplianceId,
    RoomPath,
};

pub use store::{
    Secret,
    CredentialStore,
};

pub use token::{
    AccessToken,
    Credential,
    TokenError,
    EXPIRY_SAFETY_MARGIN_SECS,
};

pub use clock::{
    Clock,
    SystemClock,
    ManualClock,
};

pub use transport::{
    ApiRequest,
    ApiResponse,
    Endpoints,
    Method,
    ReqwestTransport,
    Transport,
    TransportError,
    DEFAULT_BASE_URL,
};

pub use token_manager::TokenManager;

pub use command::{
    ApplianceCommand,
    CommandAction,
    CommandEnvelope,
    CommandFlags,
    MaintenanceAction,
    TapType,
    ValidationError,
    AMOUNT_STEP_ML,
    MAX_AMOUNT_ML,
};

pub use dashboard::{
    ApplianceReading,
    ApplianceState,
    ApplianceSummary,
    DashboardError,
    DashboardSnapshot,
    FilterType,
    Measurement,
};

pub use dispatcher::{
    classify,
    CommandDispatcher,
    DispatchError,
    DispatchReport,
    DispatchState,
    FailureReason,
    FetchError,
    ResponseClass,
    RetryPolicy,
};

pub use config::{
    default_config_path,
    ClientConfig,
    ConfigError,
    DeviceConfig,
    RetryConfig,
};

pub use client::GroheClient;

pub use poller::{
    DashboardPoller,
    PollerHandle,
    SnapshotReceiver,
    DEFAULT_POLL_INTERVAL,
};

pub use error::GroheError;
