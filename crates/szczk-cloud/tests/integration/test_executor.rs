//! Integration tests for the resilient request executor
//!
//! Verifies the single refresh-and-retry on 401/403, the bounded retry under
//! persistent rejection, pass-through of other failures and cancellation.

use std::time::Duration;

use reqwest::StatusCode;
use szczk_cloud::{SzczkDriver, SzczkError};
use szczk_core::ports::{DriverError, StorageDriver};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

// ============================================================================
// Authorization rejection
// ============================================================================

#[tokio::test]
async fn test_persistent_401_refreshes_once_and_fails() {
    let (server, driver) = common::setup_driver().await;
    common::mount_refresh(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token invalid"))
        .expect(2)
        .mount(&server)
        .await;

    let err = driver
        .list(None, &CancellationToken::new())
        .await
        .unwrap_err();

    match common::backend_source(&err) {
        SzczkError::AuthRejected { status, body } => {
            assert_eq!(*status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, "token invalid");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_401_then_success_retries_with_new_token() {
    let (server, driver) = common::setup_driver().await;
    common::mount_refresh(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .and(header("authorization", bearer(common::ACCESS_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list_files"))
        .and(header("authorization", bearer(common::REFRESHED_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::entry("1", "doc.txt", 10, false)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let objects = driver.list(None, &CancellationToken::new()).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(
        driver.client().tokens().access_token().as_deref(),
        Some(common::REFRESHED_TOKEN)
    );

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_403_is_treated_as_rejection() {
    let (server, driver) = common::setup_driver().await;
    common::mount_refresh(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/delete_item"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let root = driver.root().clone();
    let err = driver
        .remove(&root, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        common::backend_source(&err),
        SzczkError::AuthRejected { status, .. } if *status == StatusCode::FORBIDDEN
    ));

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_failed_refresh_is_surfaced_without_reauthenticating() {
    // setup_driver expects exactly one /authenticate call
    let (server, driver) = common::setup_driver().await;

    Mock::given(method("POST"))
        .and(path("/refresh_token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = driver
        .list(None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        common::backend_source(&err),
        SzczkError::Refresh { .. }
    ));

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_refresh() {
    let (server, driver) = common::setup_driver().await;
    common::mount_refresh(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .and(header("authorization", bearer(common::ACCESS_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list_files"))
        .and(header("authorization", bearer(common::REFRESHED_TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (a, b, c) = tokio::join!(
        driver.list(None, &cancel),
        driver.list(None, &cancel),
        driver.list(None, &cancel)
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    driver.shutdown().await.unwrap();
    server.verify().await;
}

// ============================================================================
// Other failures
// ============================================================================

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let (server, driver) = common::setup_driver().await;
    common::mount_refresh(&server, 0).await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let err = driver
        .list(None, &CancellationToken::new())
        .await
        .unwrap_err();
    match &err {
        DriverError::Backend { op, target, .. } => {
            assert_eq!(*op, "list");
            assert_eq!(target, "/");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(matches!(
        common::backend_source(&err),
        SzczkError::Remote { status, body } if *status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom"
    ));

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let (server, driver) = common::setup_driver().await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = driver
        .list(None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        common::backend_source(&err),
        SzczkError::InvalidResponse(_)
    ));

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    let mut config = common::driver_config(&server);
    // nothing listens on the discard port
    config.base_url = "http://127.0.0.1:9".to_string();

    let driver = SzczkDriver::init(&config, &CancellationToken::new())
        .await
        .unwrap();
    let err = driver
        .list(None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        common::backend_source(&err),
        SzczkError::Transport(_)
    ));

    driver.shutdown().await.unwrap();
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_caller_cancellation_aborts_in_flight_request() {
    let (server, driver) = common::setup_driver().await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "files": [] }))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), driver.list(None, &cancel))
        .await
        .expect("cancelled request did not return");
    assert!(matches!(result, Err(DriverError::Cancelled)));

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_aborts_in_flight_request() {
    let (server, driver) = common::setup_driver().await;

    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let (result, shutdown) = tokio::join!(driver.list(None, &cancel), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        driver.shutdown().await
    });

    assert!(matches!(result, Err(DriverError::Cancelled)));
    shutdown.unwrap();
}
