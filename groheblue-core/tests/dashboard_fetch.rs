//! Integration tests for dashboard retrieval and polling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use groheblue_core::{
    ApplianceId, CommandDispatcher, DashboardPoller, FetchError, FilterType, GroheClient,
    ReqwestTransport, RetryPolicy, RoomPath, TokenManager, TransportError,
};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn dispatcher(server: &MockServer, tokens: Arc<TokenManager>) -> CommandDispatcher {
    CommandDispatcher::new(tokens, transport(), endpoints(server), RetryPolicy::default())
}

async fn mount_dashboard(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/v3/iot/dashboard"))
        .and(header("Authorization", "Bearer a1"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_dashboard_returns_snapshot() {
    let server = MockServer::start().await;
    let tokens = acquired_manager(&server, clock()).await;
    mount_dashboard(&server, ResponseTemplate::new(200).set_body_json(dashboard_body())).await;

    let snapshot = dispatcher(&server, tokens).fetch_dashboard().await.unwrap();

    let appliances = snapshot.appliances();
    assert_eq!(appliances.len(), 1);
    assert_eq!(appliances[0].room, RoomPath::new("48434", "82374"));

    let reading = snapshot.reading(&ApplianceId::new("app-1")).unwrap();
    assert_eq!(reading.measurement.remaining_filter, Some(87.0));
    assert_eq!(reading.filter_type, Some(FilterType::ActiveCarbon));
}

#[tokio::test]
async fn test_fetch_dashboard_http_error() {
    let server = MockServer::start().await;
    let tokens = acquired_manager(&server, clock()).await;
    mount_dashboard(&server, ResponseTemplate::new(500)).await;

    let result = dispatcher(&server, tokens).fetch_dashboard().await;

    assert!(matches!(result, Err(FetchError::Status { status: 500 })));
}

#[tokio::test]
async fn test_fetch_dashboard_timeout_is_an_error_value() {
    let server = MockServer::start().await;
    let tokens = acquired_manager(&server, clock()).await;
    mount_dashboard(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(dashboard_body())
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let transport = Arc::new(ReqwestTransport::new(Duration::from_millis(100)).unwrap());
    let dispatcher = CommandDispatcher::new(tokens, transport, endpoints(&server), RetryPolicy::default());
    let result = dispatcher.fetch_dashboard().await;

    assert!(matches!(
        result,
        Err(FetchError::Transport(TransportError::Timeout { .. }))
    ));
}

#[tokio::test]
async fn test_fetch_dashboard_invalid_body() {
    let server = MockServer::start().await;
    let tokens = acquired_manager(&server, clock()).await;
    mount_dashboard(&server, ResponseTemplate::new(200).set_body_string("<html>")).await;

    let result = dispatcher(&server, tokens).fetch_dashboard().await;

    assert!(matches!(result, Err(FetchError::Decode { .. })));
}

#[tokio::test]
async fn test_poller_publishes_and_keeps_last_snapshot() {
    let server = MockServer::start().await;
    mount_login(&server).await;

    Mock::given(method("GET"))
        .and(path("/v3/iot/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dashboard_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/iot/dashboard"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = GroheClient::connect_with(&client_config(&server), transport(), clock())
        .await
        .unwrap();
    let handle = DashboardPoller::new(Arc::new(client), Duration::from_millis(20)).spawn();

    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(Option::is_some))
        .await
        .unwrap()
        .unwrap();

    // Later cycles fail and must not clear the published snapshot.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let latest = handle.latest().unwrap();
    assert_eq!(latest.appliances().len(), 1);

    handle.stop().await;
}
