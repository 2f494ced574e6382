//! Shared fixtures for integration tests against a mock GROHE cloud.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use groheblue_core::{
    ApiRequest, ApiResponse, ClientConfig, Endpoints, ManualClock, ReqwestTransport, RetryConfig,
    Secret, TokenManager, Transport, TransportError, DEFAULT_BASE_URL,
};
use parking_lot::Mutex;
use serde_json::json;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "hunter2";
pub const COMMAND_PATH: &str = "/v3/iot/locations/loc/rooms/room/appliances/app-1/command";

pub fn base_url(server: &MockServer) -> String {
    format!("{}/v3/iot/", server.uri())
}

pub fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints::new(&base_url(server)).unwrap()
}

pub fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(Duration::from_secs(5)).unwrap())
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
}

pub fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "access_token_expires_in": 3600,
        "token_type": "bearer"
    })
}

/// Accept the account credentials once with tokens `a1`/`r1`.
pub async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v3/iot/oidc/login"))
        .and(body_json(json!({ "username": EMAIL, "password": PASSWORD })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a1", "r1")))
        .expect(1)
        .named("login")
        .mount(server)
        .await;
}

/// Exchange `r1` for `a2`/`r2`, exactly `times` times.
pub async fn mount_refresh(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v3/iot/oidc/refresh"))
        .and(body_json(json!({ "refresh_token": "r1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("a2", "r2")))
        .expect(times)
        .named("refresh")
        .mount(server)
        .await;
}

/// A token manager that already holds `a1`.
pub async fn acquired_manager(server: &MockServer, clock: Arc<ManualClock>) -> Arc<TokenManager> {
    mount_login(server).await;
    let manager = TokenManager::new(transport(), endpoints(server), clock);
    manager.acquire(EMAIL, &Secret::new(PASSWORD)).await.unwrap();
    Arc::new(manager)
}

pub fn client_config(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::new(EMAIL, Secret::new(PASSWORD));
    config.base_url = base_url(server);
    config.retry = RetryConfig {
        max_attempts: 3,
        delay_secs: 0,
    };
    config
}

pub fn dashboard_body() -> serde_json::Value {
    json!({
        "locations": [{
            "id": 48434,
            "name": "Home",
            "rooms": [{
                "id": 82374,
                "name": "Kitchen",
                "appliances": [{
                    "appliance_id": "app-1",
                    "name": "GROHE Blue",
                    "serial_number": "SN-001",
                    "version": "01.08.Z11.0400.0104",
                    "data_latest": {
                        "measurement": {
                            "remaining_co2": 64,
                            "remaining_filter": 87
                        }
                    },
                    "state": { "co2_empty": false, "filter_empty": false },
                    "params": { "filter_type": 2 }
                }]
            }]
        }]
    })
}

/// Answers requests with scripted responses, in order, without any network.
///
/// Used by tests that run with paused tokio time.
pub struct ScriptedTransport {
    responses: Mutex<Vec<Result<ApiResponse, TransportError>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(mut responses: Vec<Result<ApiResponse, TransportError>>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Paths of every request received so far.
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request);
        self.responses.lock().pop().unwrap_or(Err(TransportError::Request {
            message: "script exhausted".into(),
        }))
    }
}

pub fn status(status: u16) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse {
        status,
        body: String::new(),
    })
}

pub fn tokens(access: &str, refresh: &str) -> Result<ApiResponse, TransportError> {
    Ok(ApiResponse {
        status: 200,
        body: token_body(access, refresh).to_string(),
    })
}

/// A token manager over `transport` that already consumed its first (login) response.
pub async fn scripted_manager(transport: Arc<ScriptedTransport>) -> Arc<TokenManager> {
    let manager = TokenManager::new(transport, Endpoints::new(DEFAULT_BASE_URL).unwrap(), clock());
    manager.acquire(EMAIL, &Secret::new(PASSWORD)).await.unwrap();
    Arc::new(manager)
}
