//! High-level client for one account.
//!
//! [`GroheClient`] wires a [`TokenManager`] and a [`CommandDispatcher`] to a
//! shared transport and resolves which room an appliance lives in, either
//! from the configured `[device]` or from the dashboard.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), groheblue_core::GroheError> {
//! use groheblue_core::{ClientConfig, CommandAction, GroheClient, Secret, TapType};
//!
//! let config = ClientConfig::new("user@example.com", Secret::new("password"));
//! let client = GroheClient::connect(&config).await?;
//!
//! let appliance = client.default_appliance().await?;
//! let delivered = client
//!     .dispatch_command(&appliance, CommandAction::Dispense { tap_type: TapType::Sparkling, amount_ml: 250 })
//!     .await?;
//! println!("delivered: {delivered}");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::command::{ApplianceCommand, CommandAction};
use crate::config::ClientConfig;
use crate::dashboard::{ApplianceReading, ApplianceSummary, DashboardSnapshot};
use crate::dispatcher::{CommandDispatcher, DispatchError, DispatchReport, FetchError};
use crate::error::GroheError;
use crate::model::{ApplianceId, RoomPath};
use crate::token::{AccessToken, Credential};
use crate::token_manager::TokenManager;
use crate::transport::{ReqwestTransport, Transport};

/// An authenticated session with the GROHE cloud.
pub struct GroheClient {
    config: ClientConfig,
    tokens: Arc<TokenManager>,
    dispatcher: CommandDispatcher,
    /// Rooms learned from dashboard fetches.
    rooms: RwLock<HashMap<ApplianceId, RoomPath>>,
}

impl GroheClient {
    /// Create a client over HTTP and acquire the initial credential.
    pub async fn connect(config: &ClientConfig) -> Result<Self, GroheError> {
        let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
        Self::connect_with(config, transport, Arc::new(SystemClock)).await
    }

    /// Create a client over `transport` and acquire the initial credential.
    ///
    /// Fails with [`TokenError::InitializationFailed`](crate::TokenError::InitializationFailed)
    /// if the account credentials are not accepted.
    pub async fn connect_with(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GroheError> {
        config.validate()?;
        let endpoints = config.endpoints()?;

        let tokens = Arc::new(TokenManager::new(transport.clone(), endpoints.clone(), clock));
        tokens.acquire(&config.email, config.password()?).await?;

        let dispatcher = CommandDispatcher::new(tokens.clone(), transport, endpoints, config.retry_policy());

        tracing::info!(email = %config.email, "Connected to GROHE cloud");
        Ok(Self {
            config: config.clone(),
            tokens,
            dispatcher,
            rooms: RwLock::new(HashMap::new()),
        })
    }

    /// The configuration this client was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The token manager shared with the dispatcher.
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// The underlying command dispatcher.
    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// A valid access token, refreshed if needed.
    pub async fn get_access_token(&self) -> Result<AccessToken, GroheError> {
        Ok(self.tokens.current_token().await?)
    }

    /// Log in again with the account credentials.
    ///
    /// Needed once the refresh token itself has been rejected.
    pub async fn reauthenticate(&self) -> Result<Credential, GroheError> {
        let credential = self
            .tokens
            .acquire(&self.config.email, self.config.password()?)
            .await?;
        Ok(credential)
    }

    /// Fetch the dashboard and remember the rooms of every listed appliance.
    pub async fn fetch_dashboard(&self) -> Result<DashboardSnapshot, FetchError> {
        let snapshot = self.dispatcher.fetch_dashboard().await?;
        self.remember_rooms(&snapshot);
        Ok(snapshot)
    }

    /// Appliances registered to the account.
    pub async fn devices(&self) -> Result<Vec<ApplianceSummary>, GroheError> {
        Ok(self.fetch_dashboard().await?.appliances())
    }

    /// Current measurements and state of one appliance.
    pub async fn reading(&self, appliance_id: &ApplianceId) -> Result<ApplianceReading, GroheError> {
        Ok(self.fetch_dashboard().await?.reading(appliance_id)?)
    }

    /// The configured appliance, or the first one in the dashboard.
    pub async fn default_appliance(&self) -> Result<ApplianceId, GroheError> {
        if let Some(device) = &self.config.device {
            return Ok(device.appliance_id.clone());
        }

        self.devices()
            .await?
            .into_iter()
            .next()
            .map(|summary| summary.appliance_id)
            .ok_or(GroheError::NoAppliance)
    }

    /// Send `action` to `appliance_id` and report whether it was delivered.
    pub async fn dispatch_command(
        &self,
        appliance_id: &ApplianceId,
        action: CommandAction,
    ) -> Result<bool, GroheError> {
        let report = self
            .dispatch(&ApplianceCommand::new(appliance_id.clone(), action))
            .await?;
        Ok(report.is_success())
    }

    /// Send `command` and report how the dispatch ended.
    ///
    /// The command is validated before any room lookup, so a malformed
    /// command never causes network traffic.
    pub async fn dispatch(&self, command: &ApplianceCommand) -> Result<DispatchReport, GroheError> {
        command.validate().map_err(DispatchError::from)?;
        let room = self.room_for(command.appliance_id()).await?;
        Ok(self.dispatcher.dispatch(&room, command).await?)
    }

    /// Like [`dispatch`](Self::dispatch), abandoning retries after `deadline`.
    pub async fn dispatch_with_deadline(
        &self,
        command: &ApplianceCommand,
        deadline: Instant,
    ) -> Result<DispatchReport, GroheError> {
        command.validate().map_err(DispatchError::from)?;
        let room = self.room_for(command.appliance_id()).await?;
        Ok(self
            .dispatcher
            .dispatch_with_deadline(&room, command, deadline)
            .await?)
    }

    /// Room of `appliance_id`, fetching the dashboard if it is not yet known.
    pub async fn room_for(&self, appliance_id: &ApplianceId) -> Result<RoomPath, GroheError> {
        if let Some(device) = &self.config.device {
            if &device.appliance_id == appliance_id {
                return Ok(device.room());
            }
        }

        if let Some(room) = self.rooms.read().get(appliance_id) {
            return Ok(room.clone());
        }

        tracing::debug!(%appliance_id, "Looking up appliance room in dashboard");
        self.fetch_dashboard()
            .await?
            .locate(appliance_id)
            .map(|summary| summary.room)
            .ok_or_else(|| GroheError::UnknownAppliance {
                appliance_id: appliance_id.clone(),
            })
    }

    fn remember_rooms(&self, snapshot: &DashboardSnapshot) {
        let appliances = snapshot.appliances();
        let mut rooms = self.rooms.write();
        for summary in appliances {
            rooms.insert(summary.appliance_id, summary.room);
        }
    }
}

impl std::fmt::Debug for GroheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroheClient")
            .field("email", &self.config.email)
            .field("tokens", &self.tokens)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
