//! HTTP transport seam.
//!
//! Requests and responses are plain values: a response is an explicit
//! `{ status, body }` pair and status handling is left to the caller, so no
//! control flow depends on the HTTP client raising errors for non-2xx codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::model::{ApplianceId, RoomPath};
use crate::token::AccessToken;

/// Default API root of the GROHE cloud.
pub const DEFAULT_BASE_URL: &str = "https://idp2-apigw.cloud.grohe.com/v3/iot/";

/// Error type for transport failures.
///
/// These are failures to get any HTTP response at all; an HTTP error status
/// is a successful [`ApiResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// No connection could be established.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// Any other failure while sending the request or reading the body.
    #[error("request failed: {message}")]
    Request { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout { message }
        } else if err.is_connect() {
            Self::Connect { message }
        } else {
            Self::Request { message }
        }
    }
}

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// A request to the cloud API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,

    /// Absolute request URL.
    pub url: Url,

    /// Bearer token for the `Authorization` header.
    pub bearer: Option<AccessToken>,

    /// JSON body.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// A `GET` request without a body.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            bearer: None,
            body: None,
        }
    }

    /// A `POST` request with a JSON body.
    pub fn post_json(url: Url, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url,
            bearer: None,
            body: Some(body),
        }
    }

    /// Attach a bearer token.
    pub fn with_bearer(mut self, token: AccessToken) -> Self {
        self.bearer = Some(token);
        self
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,

    /// Raw response body.
    pub body: String,
}

impl ApiResponse {
    /// Whether the status is in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// The body shortened for log and error messages.
    pub fn body_excerpt(&self) -> String {
        const MAX: usize = 200;
        match self.body.char_indices().nth(MAX) {
            Some((idx, _)) => format!("{}...", &self.body[..idx]),
            None => self.body.clone(),
        }
    }
}

/// Sends [`ApiRequest`]s.
///
/// Implemented by [`ReqwestTransport`] for real traffic; tests may provide
/// their own implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return whatever status the server answered with.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url),
            Method::Post => self.client.post(request.url),
        };

        builder = builder.header(CONTENT_TYPE, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, token.authorization_header());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ApiResponse { status, body })
    }
}

/// URLs of the cloud API, derived from one base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parse `base`. A missing trailing slash is added.
    pub fn new(base: &str) -> Result<Self, url::ParseError> {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        let base = Url::parse(&base)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }

        Ok(Self { base })
    }

    /// The base URL.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Exchanges account credentials for tokens.
    pub fn login(&self) -> Url {
        self.join(&["oidc", "login"])
    }

    /// Exchanges a refresh token for new tokens.
    pub fn refresh(&self) -> Url {
        self.join(&["oidc", "refresh"])
    }

    /// Full account state.
    pub fn dashboard(&self) -> Url {
        self.join(&["dashboard"])
    }

    /// Command endpoint of one appliance.
    pub fn command(&self, room: &RoomPath, appliance_id: &ApplianceId) -> Url {
        self.join(&[
            "locations",
            &room.location_id,
            "rooms",
            &room.room_id,
            "appliances",
            appliance_id.as_str(),
            "command",
        ])
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Cannot fail: `new` rejects cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = Endpoints::new(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            endpoints.dashboard().as_str(),
            "https://idp2-apigw.cloud.grohe.com/v3/iot/dashboard"
        );
        assert_eq!(
            endpoints.refresh().as_str(),
            "https://idp2-apigw.cloud.grohe.com/v3/iot/oidc/refresh"
        );
    }

    #[test]
    fn test_command_url() {
        let endpoints = Endpoints::new("https://example.com/v3/iot").unwrap();
        let url = endpoints.command(&RoomPath::new("loc", "room"), &ApplianceId::new("app"));
        assert_eq!(
            url.as_str(),
            "https://example.com/v3/iot/locations/loc/rooms/room/appliances/app/command"
        );
    }

    #[test]
    fn test_endpoints_reject_non_base_urls() {
        assert!(Endpoints::new("mailto:someone@example.com").is_err());
        assert!(Endpoints::new("not a url").is_err());
    }

    #[test]
    fn test_response_classification_helpers() {
        let ok = ApiResponse { status: 204, body: String::new() };
        let err = ApiResponse { status: 404, body: "x".repeat(500) };
        assert!(ok.is_success());
        assert!(!err.is_success());
        assert_eq!(err.body_excerpt().len(), 203);
    }
}
