//! Integration tests for listing, path resolution and download links

use chrono::{TimeZone, Utc};
use szczk_core::domain::newtypes::{RemoteId, RemotePath};
use szczk_core::ports::{DriverError, Object, StorageDriver};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, ResponseTemplate,
};

use crate::common;

fn path_of(s: &str) -> RemotePath {
    RemotePath::new(s.to_string()).unwrap()
}

// ============================================================================
// List
// ============================================================================

#[tokio::test]
async fn test_list_root_synthesises_paths() {
    let (server, driver) = common::setup_driver().await;
    common::mount_list(&server, "root", vec![common::entry("1", "doc.txt", 10, false)]).await;

    let objects = driver.list(None, &CancellationToken::new()).await.unwrap();

    assert_eq!(objects.len(), 1);
    let doc = &objects[0];
    assert_eq!(doc.id.as_str(), "1");
    assert_eq!(doc.name, "doc.txt");
    assert_eq!(doc.path.as_str(), "/doc.txt");
    assert_eq!(doc.size, 10);
    assert!(!doc.is_folder);
    assert_eq!(
        doc.modified,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_subfolder_uses_folder_id_and_path() {
    let (server, driver) = common::setup_driver().await;
    common::mount_list(&server, "f-9", vec![common::entry("2", "b.txt", 3, false)]).await;

    let folder = Object {
        id: RemoteId::new("f-9".to_string()).unwrap(),
        name: "docs".to_string(),
        path: path_of("/docs"),
        size: 0,
        is_folder: true,
        modified: None,
    };
    let objects = driver
        .list(Some(&folder), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(objects[0].path.as_str(), "/docs/b.txt");
    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_keeps_entries_with_bad_timestamps() {
    let (server, driver) = common::setup_driver().await;
    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                {"id": "1", "name": "a.txt", "size": 1, "is_folder": false, "modified_at": "garbage"},
                {"id": "2", "name": "b.txt", "size": 2, "is_folder": false, "modified_at": "2024-03-01T08:00:00Z"},
                {"id": "3", "name": "bad/name", "size": 0, "is_folder": false}
            ]
        })))
        .mount(&server)
        .await;

    let objects = driver.list(None, &CancellationToken::new()).await.unwrap();

    let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert!(objects[0].modified.is_none());
    assert!(objects[1].modified.is_some());

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_list_keeps_entries_with_non_string_timestamps() {
    let (server, driver) = common::setup_driver().await;
    Mock::given(method("GET"))
        .and(path("/list_files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                {"id": "1", "name": "a.txt", "size": 1, "is_folder": false, "modified_at": 1704067200},
                {"id": "2", "name": "b.txt", "size": 2, "is_folder": false, "modified_at": "2024-03-01T08:00:00Z"}
            ]
        })))
        .mount(&server)
        .await;

    let objects = driver.list(None, &CancellationToken::new()).await.unwrap();

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].name, "a.txt");
    assert!(objects[0].modified.is_none());
    assert_eq!(
        objects[1].modified,
        Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
    );

    driver.shutdown().await.unwrap();
}

// ============================================================================
// Get (path resolution)
// ============================================================================

#[tokio::test]
async fn test_get_resolves_exact_child_of_parent() {
    let (server, driver) = common::setup_driver().await;
    common::mount_list(&server, "root", vec![common::entry("p-1", "parent", 0, true)]).await;
    common::mount_list(
        &server,
        "p-1",
        vec![
            common::entry("a-1", "a.txt", 5, false),
            common::entry("b-1", "b.txt", 6, false),
        ],
    )
    .await;

    let cancel = CancellationToken::new();
    let found = driver.get(&path_of("/parent/a.txt"), &cancel).await.unwrap();
    assert_eq!(found.id.as_str(), "a-1");
    assert_eq!(found.name, "a.txt");
    assert_eq!(found.path.as_str(), "/parent/a.txt");

    let missing = driver.get(&path_of("/parent/c.txt"), &cancel).await;
    match missing {
        Err(DriverError::NotFound(p)) => assert_eq!(p, "/parent/c.txt"),
        other => panic!("expected NotFound, got {other:?}"),
    }

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_get_root_issues_no_request() {
    let (server, driver) = common::setup_driver().await;

    let root = driver
        .get(&RemotePath::root(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(root.is_folder);
    assert_eq!(root.id.as_str(), "root");
    assert!(common::non_auth_requests(&server).await.is_empty());

    driver.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_get_through_file_is_not_found() {
    let (server, driver) = common::setup_driver().await;
    Mock::given(method("GET"))
        .and(path("/list_files"))
        .and(query_param("folder_id", "root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::entry("f-1", "file.txt", 1, false)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = driver
        .get(&path_of("/file.txt/inner"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(DriverError::NotFound(_))));

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_get_missing_intermediate_folder() {
    let (server, driver) = common::setup_driver().await;
    common::mount_list(&server, "root", vec![common::entry("p-1", "parent", 0, true)]).await;

    let result = driver
        .get(&path_of("/other/a.txt"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(DriverError::NotFound(_))));

    driver.shutdown().await.unwrap();
}

// ============================================================================
// Link
// ============================================================================

#[tokio::test]
async fn test_link_returns_url_and_length() {
    let (server, driver) = common::setup_driver().await;
    Mock::given(method("GET"))
        .and(path("/get_download_url"))
        .and(query_param("file_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": "https://cdn.example.com/dl/1?sig=abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let file = Object {
        id: RemoteId::new("1".to_string()).unwrap(),
        name: "doc.txt".to_string(),
        path: path_of("/doc.txt"),
        size: 10,
        is_folder: false,
        modified: None,
    };
    let link = driver.link(&file, &CancellationToken::new()).await.unwrap();

    assert_eq!(link.url, "https://cdn.example.com/dl/1?sig=abc");
    assert_eq!(link.content_length, Some(10));

    driver.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_link_on_folder_is_not_a_file_without_request() {
    let (server, driver) = common::setup_driver().await;

    let folder = driver.root().clone();
    let result = driver.link(&folder, &CancellationToken::new()).await;

    assert!(matches!(result, Err(DriverError::NotAFile(_))));
    assert!(common::non_auth_requests(&server).await.is_empty());

    driver.shutdown().await.unwrap();
}

// ============================================================================
// MakeDir
// ============================================================================

#[tokio::test]
async fn test_make_dir_is_not_supported_without_request() {
    let (server, driver) = common::setup_driver().await;
    let cancel = CancellationToken::new();
    let root = driver.root().clone();

    for name in ["new", "", "a/b"] {
        let result = driver.make_dir(&root, name, &cancel).await;
        assert!(matches!(result, Err(DriverError::NotSupported(_))));
    }
    assert!(common::non_auth_requests(&server).await.is_empty());

    driver.shutdown().await.unwrap();
}
