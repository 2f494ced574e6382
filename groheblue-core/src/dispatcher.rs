//! Command dispatch and dashboard retrieval.
//!
//! [`CommandDispatcher`] sends appliance commands with a bounded retry loop:
//!
//! ```text
//! PENDING -> SENT -> SUCCESS
//!                 -> SERVER_ERROR -> WAIT -> SENT
//!                 -> AUTH_ERROR -> REFRESH -> SENT   (once per dispatch)
//!                 -> CLIENT_ERROR -> FAILED
//!                 -> EXHAUSTED -> FAILED
//! ```
//!
//! Status handling goes through the pure [`classify`] function. Every retried
//! attempt after a server or transport error is preceded by exactly one
//! fixed delay; the 401 path retries immediately after the token refresh.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::command::{ApplianceCommand, ValidationError};
use crate::dashboard::DashboardSnapshot;
use crate::model::RoomPath;
use crate::token::TokenError;
use crate::token_manager::TokenManager;
use crate::transport::{ApiRequest, Endpoints, Transport, TransportError};

/// Default number of send attempts per dispatch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wait before retrying after a server or transport error.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Error type for dispatch calls.
///
/// Exhausted retries and rejected commands are not errors; they are reported
/// through [`DispatchReport`].
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The command was malformed and nothing was sent.
    #[error("invalid command: {0}")]
    Validation(#[from] ValidationError),

    /// No usable access token could be obtained.
    #[error("credential unavailable: {0}")]
    Token(#[from] TokenError),

    /// The command body could not be encoded.
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Error type for dashboard retrieval.
///
/// Polling callers treat any of these as "no data this cycle".
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("dashboard request failed: {0}")]
    Transport(#[from] TransportError),

    /// The server answered with a non-2xx status.
    #[error("dashboard request returned status {status}")]
    Status { status: u16 },

    /// The body was not valid JSON.
    #[error("dashboard response could not be decoded: {message}")]
    Decode { message: String },

    /// No usable access token could be obtained.
    #[error("credential unavailable: {0}")]
    Token(#[from] TokenError),
}

/// How many times to send a command and how long to wait between sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total send attempts, including the first.
    pub max_attempts: u32,

    /// Wait before an attempt that follows a server or transport error.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// What to do after a response with a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx: done.
    Success,
    /// 5xx (or no response at all): wait, then send again.
    RetryAfterDelay,
    /// 401: refresh the token, then send again.
    RetryAfterReauth,
    /// Anything else: a retry cannot fix it.
    TerminalFailure,
}

/// Map an HTTP status to the dispatcher's next step.
pub fn classify(status: u16) -> ResponseClass {
    match status {
        200..=299 => ResponseClass::Success,
        401 => ResponseClass::RetryAfterReauth,
        s if s >= 500 => ResponseClass::RetryAfterDelay,
        _ => ResponseClass::TerminalFailure,
    }
}

/// Why a dispatch ended without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The server refused the command with a non-retryable status.
    Rejected { status: u16 },
    /// The server answered 401 again after the token was refreshed, or on
    /// the last attempt.
    Unauthorized,
    /// Every attempt ended in a server or transport error.
    Exhausted,
    /// The caller's deadline passed between attempts.
    DeadlineExceeded,
}

/// Terminal state of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// The appliance accepted the command.
    Success,
    /// The command was not delivered.
    Failed(FailureReason),
}

/// Outcome of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Terminal state.
    pub state: DispatchState,

    /// Number of sends performed.
    pub attempts: u32,

    /// Whether the token was refreshed after a 401.
    pub reauthenticated: bool,
}

impl DispatchReport {
    /// Whether the command was delivered.
    pub fn is_success(&self) -> bool {
        self.state == DispatchState::Success
    }
}

/// Retry bookkeeping scoped to one dispatch call.
#[derive(Debug, Default)]
struct RetryAttempt {
    attempts: u32,
    reauthenticated: bool,
    waited: Duration,
}

impl RetryAttempt {
    fn report(&self, state: DispatchState) -> DispatchReport {
        DispatchReport {
            state,
            attempts: self.attempts,
            reauthenticated: self.reauthenticated,
        }
    }
}

/// Sends commands and dashboard queries with the current access token.
pub struct CommandDispatcher {
    tokens: Arc<TokenManager>,
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    policy: RetryPolicy,
}

impl CommandDispatcher {
    /// Create a dispatcher sharing `tokens` with other components.
    pub fn new(
        tokens: Arc<TokenManager>,
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            tokens,
            transport,
            endpoints,
            policy,
        }
    }

    /// The retry policy in effect.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `command` and report only whether it was delivered.
    ///
    /// Exhausted retries and rejected commands return `Ok(false)`.
    pub async fn dispatch_command(
        &self,
        room: &RoomPath,
        command: &ApplianceCommand,
    ) -> Result<bool, DispatchError> {
        self.dispatch(room, command)
            .await
            .map(|report| report.is_success())
    }

    /// Send `command` and report how the dispatch ended.
    pub async fn dispatch(
        &self,
        room: &RoomPath,
        command: &ApplianceCommand,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch_until(room, command, None).await
    }

    /// Like [`dispatch`](Self::dispatch), but give up between attempts once
    /// `deadline` has passed.
    pub async fn dispatch_with_deadline(
        &self,
        room: &RoomPath,
        command: &ApplianceCommand,
        deadline: Instant,
    ) -> Result<DispatchReport, DispatchError> {
        self.dispatch_until(room, command, Some(deadline)).await
    }

    async fn dispatch_until(
        &self,
        room: &RoomPath,
        command: &ApplianceCommand,
        deadline: Option<Instant>,
    ) -> Result<DispatchReport, DispatchError> {
        command.validate()?;

        let url = self.endpoints.command(room, command.appliance_id());
        let body = serde_json::to_value(command.envelope())?;

        let span = tracing::info_span!(
            "dispatch",
            dispatch_id = %Uuid::new_v4(),
            appliance_id = %command.appliance_id(),
            action = %command.action(),
        );

        async move {
            let mut retry = RetryAttempt::default();

            while retry.attempts < self.policy.max_attempts {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    tracing::warn!(attempts = retry.attempts, "Deadline passed, abandoning command");
                    return Ok(retry.report(DispatchState::Failed(FailureReason::DeadlineExceeded)));
                }

                retry.attempts += 1;
                let attempt = retry.attempts;

                let token = match self.tokens.current_token().await {
                    Ok(token) => token,
                    Err(e) if e.is_transient() => {
                        tracing::warn!(attempt, "Could not obtain access token: {}", e);
                        self.wait_before_retry(&mut retry, deadline).await;
                        continue;
                    }
                    Err(e) => return Err(DispatchError::from(e)),
                };

                let request = ApiRequest::post_json(url.clone(), body.clone()).with_bearer(token.clone());
                let (class, status) = match self.transport.execute(request).await {
                    Ok(response) => (classify(response.status), Some(response.status)),
                    Err(e) => {
                        tracing::warn!(attempt, "Request failed: {}", e);
                        (ResponseClass::RetryAfterDelay, None)
                    }
                };

                match class {
                    ResponseClass::Success => {
                        tracing::info!(attempt, status, "Command accepted");
                        return Ok(retry.report(DispatchState::Success));
                    }
                    ResponseClass::TerminalFailure => {
                        let status = status.unwrap_or_default();
                        tracing::error!(attempt, status, "Command rejected");
                        return Ok(retry.report(DispatchState::Failed(FailureReason::Rejected {
                            status,
                        })));
                    }
                    ResponseClass::RetryAfterReauth if retry.reauthenticated => {
                        tracing::error!(attempt, "Unauthorized after refreshing tokens");
                        return Ok(retry.report(DispatchState::Failed(FailureReason::Unauthorized)));
                    }
                    // No send can follow a refresh on the last attempt.
                    ResponseClass::RetryAfterReauth if attempt >= self.policy.max_attempts => {
                        tracing::error!(attempt, "Unauthorized on the last attempt");
                        return Ok(retry.report(DispatchState::Failed(FailureReason::Unauthorized)));
                    }
                    ResponseClass::RetryAfterReauth => {
                        tracing::info!(attempt, "Refreshing tokens and trying again");
                        match self.tokens.refresh_rejected(&token).await {
                            Ok(_) => retry.reauthenticated = true,
                            Err(e) if e.is_transient() => {
                                tracing::warn!(attempt, "Token refresh failed: {}", e);
                                self.wait_before_retry(&mut retry, deadline).await;
                            }
                            Err(e) => return Err(DispatchError::from(e)),
                        }
                    }
                    ResponseClass::RetryAfterDelay => {
                        if let Some(status) = status {
                            tracing::warn!(attempt, status, "Server error");
                        }
                        self.wait_before_retry(&mut retry, deadline).await;
                    }
                }
            }

            tracing::error!(
                attempts = retry.attempts,
                waited_ms = retry.waited.as_millis() as u64,
                "Failed to execute command, retries exhausted"
            );
            Ok(retry.report(DispatchState::Failed(FailureReason::Exhausted)))
        }
        .instrument(span)
        .await
    }

    /// Sleep for the retry delay unless the attempt budget is spent.
    ///
    /// The sleep is cut short at `deadline`.
    async fn wait_before_retry(&self, retry: &mut RetryAttempt, deadline: Option<Instant>) {
        if retry.attempts >= self.policy.max_attempts {
            return;
        }

        let started = Instant::now();
        let wake = started + self.policy.delay;
        let wake = deadline.map_or(wake, |d| wake.min(d));

        tracing::info!(delay_ms = self.policy.delay.as_millis() as u64, "Retrying after delay");
        tokio::time::sleep_until(wake).await;
        retry.waited += started.elapsed();
    }

    /// Fetch the full account state with a single GET.
    ///
    /// Failures come back as [`FetchError`] values; nothing here retries.
    pub async fn fetch_dashboard(&self) -> Result<DashboardSnapshot, FetchError> {
        let token = self.tokens.current_token().await?;
        let request = ApiRequest::get(self.endpoints.dashboard()).with_bearer(token);

        let response = self.transport.execute(request).await.inspect_err(|e| {
            tracing::error!("Request error occurred: {}", e);
        })?;

        if !response.is_success() {
            tracing::error!(status = response.status, "HTTP error occurred: {}", response.body_excerpt());
            return Err(FetchError::Status {
                status: response.status,
            });
        }

        let snapshot = DashboardSnapshot::from_json(&response.body).map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })?;

        tracing::info!("Appliance information retrieved successfully");
        Ok(snapshot)
    }
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("endpoints", &self.endpoints)
            .field("policy", &self.policy)
            .finish()
    }
}
