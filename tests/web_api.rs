use std::fs;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use backup_center::app_state::AppState;
use backup_center::archive_store_sled::ArchiveStoreSled;
use backup_center::config::BackupCenterConfig;
use backup_center::dump_generator::{DumpArtifacts, DumpGenerator, DumpRequest};
use backup_center::engine::ArchiveEngine;
use backup_center::errors::{BackupError, BackupResult};
use backup_center::web::build_router;

struct FixedDump;

impl DumpGenerator for FixedDump {
    fn generate(&self, request: &DumpRequest) -> BackupResult<DumpArtifacts> {
        let db = request.target_dir.join("x-erp_example_com-database.sql.gz");
        fs::write(&db, b"-- dump\n").map_err(|e| BackupError::io("fixed dump", e))?;
        Ok(DumpArtifacts {
            db: Some(db),
            ..Default::default()
        })
    }
}

fn app() -> (TempDir, axum::Router) {
    let temp = TempDir::new().unwrap();
    let config = BackupCenterConfig::new("erp.example.com", temp.path().join("bench"));
    fs::create_dir_all(config.private_root()).unwrap();
    let store = ArchiveStoreSled::new(&config.catalog_path()).unwrap();
    let engine = ArchiveEngine::new(config, Arc::new(store), Arc::new(FixedDump)).unwrap();
    (temp, build_router(Arc::new(AppState::new(engine))))
}

fn request(method: &str, uri: &str, loa: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(loa) = loa {
        builder = builder.header("x-user-id", "Administrator").header("x-loa", loa);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const CREATE: &str = "/api/method/backup_center.create_backup";
const LIST: &str = "/api/method/backup_center.list_archives";
const DOWNLOAD: &str = "/api/method/backup_center.download_archive_file";

#[tokio::test]
async fn healthz_needs_no_identity() {
    let (_temp, app) = app();
    let response = app.oneshot(request("GET", "/healthz", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn anonymous_and_unprivileged_callers_are_refused() {
    let (_temp, app) = app();

    let response = app
        .clone()
        .oneshot(request("GET", LIST, None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(request("GET", LIST, Some("operator"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn create_list_and_download() {
    let (_temp, app) = app();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            CREATE,
            Some("System Manager"),
            Some(serde_json::json!({ "label": "nightly", "include_files": 0, "bundle": "1" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = json_body(response).await;
    assert_eq!(created["title"], "nightly");
    assert_eq!(created["source"], "Manual");
    let db_path = created["files"]["db"]["path"].as_str().unwrap().to_string();
    assert!(created["files"]["bundle"]["path"].as_str().unwrap().ends_with("_bundle.zip"));
    assert!(created["files"]["public"]["path"].is_null());

    let response = app
        .clone()
        .oneshot(request("GET", LIST, Some("root"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = json_body(response).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["db_file_path"], db_path.as_str());

    let uri = format!("{DOWNLOAD}?path={}", urlencoding::encode(&db_path));
    let response = app
        .oneshot(request("GET", &uri, Some("root"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains("database.sql.gz"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"-- dump\n");
}

#[tokio::test]
async fn download_outside_private_root_is_a_bad_request() {
    let (_temp, app) = app();
    let uri = format!(
        "{DOWNLOAD}?path={}",
        urlencoding::encode("/private/../../etc/passwd")
    );
    let response = app
        .oneshot(request("GET", &uri, Some("root"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(!body["error"].as_str().unwrap().contains("/etc"));
}

#[tokio::test]
async fn restoring_an_unknown_archive_is_not_found() {
    let (_temp, app) = app();
    let response = app
        .oneshot(request(
            "POST",
            "/api/method/backup_center.restore_from_archive",
            Some("root"),
            Some(serde_json::json!({ "archive_name": "ARCH-missing" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_source_is_rejected() {
    let (_temp, app) = app();
    let response = app
        .oneshot(request(
            "POST",
            CREATE,
            Some("root"),
            Some(serde_json::json!({ "source": "Nightly" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
