//! Integration tests for the three-phase upload protocol
//!
//! Verifies phase ordering, that finalize never runs after a failed transfer
//! and that progress completes only after finalize succeeds.

use std::io::Write;

use reqwest::StatusCode;
use serde_json::json;
use szczk_cloud::{SzczkError, UploadPhase};
use szczk_core::ports::{FileStream, StorageDriver};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{body_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

const UPLOAD_PATH: &str = "/upload/session-1";

async fn mount_first_upload(server: &MockServer, file_name: &str, file_size: u64) {
    Mock::given(method("POST"))
        .and(path("/first_upload"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_json(json!({
            "parent_folder_id": "root",
            "file_name": file_name,
            "file_size": file_size
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": format!("{}{}", server.uri(), UPLOAD_PATH),
            "upload_token": "tok-1"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_transfer(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(body_string_contains("name=\"file\""))
        .respond_with(ResponseTemplate::new(status))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_ok_upload(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("POST"))
        .and(path("/ok_upload"))
        .and(body_json(json!({ "upload_token": "tok-1" })))
        .respond_with(ResponseTemplate::new(status))
        .expect(times)
        .mount(server)
        .await;
}

fn upload_phase(err: &szczk_core::ports::DriverError) -> UploadPhase {
    match common::backend_source(err) {
        SzczkError::Upload { phase, .. } => *phase,
        other => panic!("expected an upload error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_put_runs_all_phases_and_reports_completion() {
    let (server, driver) = common::setup_driver().await;
    mount_first_upload(&server, "hello.txt", 11).await;
    mount_transfer(&server, 200, 1).await;
    mount_ok_upload(&server, 200, 1).await;

    let (progress, calls) = common::recording_progress();
    let root = driver.root().clone();
    driver
        .put(
            &root,
            FileStream::from_bytes("hello.txt", b"hello world".to_vec()),
            Some(progress),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![(11, 11)]);

    // the transfer carries the bytes and no bearer token
    let requests = server.received_requests().await.unwrap();
    let transfer = requests
        .iter()
        .find(|r| r.url.path() == UPLOAD_PATH)
        .expect("no transfer request");
    assert!(String::from_utf8_lossy(&transfer.body).contains("hello world"));
    assert!(String::from_utf8_lossy(&transfer.body).contains("filename=\"hello.txt\""));
    assert!(!transfer.headers.contains_key("authorization"));

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_put_streams_local_file() {
    let (server, driver) = common::setup_driver().await;

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&[7u8; 4096]).unwrap();
    tmp.flush().unwrap();
    let file = FileStream::open(tmp.path()).await.unwrap();
    let file_name = file.name().to_string();

    mount_first_upload(&server, &file_name, 4096).await;
    mount_transfer(&server, 201, 1).await;
    mount_ok_upload(&server, 200, 1).await;

    let root = driver.root().clone();
    driver
        .put(&root, file, None, &CancellationToken::new())
        .await
        .unwrap();

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_failed_transfer_never_finalizes() {
    let (server, driver) = common::setup_driver().await;
    mount_first_upload(&server, "a.bin", 3).await;
    mount_transfer(&server, 500, 1).await;
    mount_ok_upload(&server, 200, 0).await;

    let (progress, calls) = common::recording_progress();
    let root = driver.root().clone();
    let err = driver
        .put(
            &root,
            FileStream::from_bytes("a.bin", vec![1, 2, 3]),
            Some(progress),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(upload_phase(&err), UploadPhase::Transfer);
    assert!(calls.lock().unwrap().is_empty());

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_failed_finalize_fails_put() {
    let (server, driver) = common::setup_driver().await;
    mount_first_upload(&server, "a.bin", 3).await;
    mount_transfer(&server, 200, 1).await;
    mount_ok_upload(&server, 500, 1).await;

    let (progress, calls) = common::recording_progress();
    let root = driver.root().clone();
    let err = driver
        .put(
            &root,
            FileStream::from_bytes("a.bin", vec![1, 2, 3]),
            Some(progress),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(upload_phase(&err), UploadPhase::Finalize);
    match common::backend_source(&err) {
        SzczkError::Upload { source, .. } => assert!(matches!(
            **source,
            SzczkError::Remote { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        )),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(calls.lock().unwrap().is_empty());

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_failed_negotiate_sends_no_bytes() {
    let (server, driver) = common::setup_driver().await;
    Mock::given(method("POST"))
        .and(path("/first_upload"))
        .respond_with(ResponseTemplate::new(400).set_body_string("quota exceeded"))
        .expect(1)
        .mount(&server)
        .await;
    mount_transfer(&server, 200, 0).await;
    mount_ok_upload(&server, 200, 0).await;

    let root = driver.root().clone();
    let err = driver
        .put(
            &root,
            FileStream::from_bytes("a.bin", vec![1]),
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(upload_phase(&err), UploadPhase::Negotiate);
    assert_eq!(err.to_string(), "put failed for /a.bin");

    driver.shutdown().await.unwrap();
    server.verify().await;
}
