//! RPC surface. Every route except `/healthz` needs a [`CurrentUser`];
//! engine calls are blocking filesystem and process work, so handlers move
//! them onto the blocking pool.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Deserializer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api_errors::AppError;
use crate::app_state::AppState;
use crate::archive_builder::{BackupCreated, BackupOptions};
use crate::archive_record::ArchiveSource;
use crate::catalog::ArchiveListing;
use crate::errors::BackupResult;
use crate::restore_launcher::{RestoreStarted, UploadedFiles};
use crate::restore_script::RestoreCredentials;
use crate::security::CurrentUser;

pub const METHOD_PREFIX: &str = "/api/method/backup_center.";

#[derive(Debug, Default, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub include_files: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub bundle: Option<bool>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct RestoreArchiveRequest {
    pub archive_name: String,
    #[serde(flatten)]
    pub credentials: RestoreCredentials,
}

#[derive(Debug, Deserialize)]
pub struct RestoreUploadRequest {
    #[serde(flatten)]
    pub files: UploadedFiles,
    #[serde(flatten)]
    pub credentials: RestoreCredentials,
}

/// Accepts `true`, `1`, `"1"`, `"true"`, `"yes"` (and their negatives).
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.as_f64().unwrap_or(0.0) != 0.0)),
        Some(serde_json::Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(D::Error::custom(format!("invalid flag value '{other}'"))),
        },
        Some(other) => Err(D::Error::custom(format!("invalid flag value {other}"))),
    }
}

fn method(name: &str) -> String {
    format!("{METHOD_PREFIX}{name}")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&method("create_backup"), post(create_backup))
        .route(&method("list_archives"), get(list_archives))
        .route(&method("download_archive_file"), get(download_archive_file))
        .route(&method("restore_from_archive"), post(restore_from_archive))
        .route(&method("restore_from_upload"), post(restore_from_upload))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `listen` and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, listen: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "backup center listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> BackupResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal(format!("worker task failed: {e}")))?
        .map_err(AppError::from)
}

async fn create_backup(
    State(st): State<Arc<AppState>>,
    user: CurrentUser,
    body: Option<Json<CreateBackupRequest>>,
) -> Result<Json<BackupCreated>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let defaults = BackupOptions::default();
    let source = match req.source.as_deref() {
        Some(raw) => ArchiveSource::from_str(raw).map_err(AppError::from)?,
        None => defaults.source,
    };
    let options = BackupOptions {
        label: req.label,
        include_files: req.include_files.unwrap_or(defaults.include_files),
        bundle: req.bundle.unwrap_or(defaults.bundle),
        source,
    };
    let ctx = user.context();
    let created = run_blocking(move || st.engine.create_backup(&ctx, options)).await?;
    Ok(Json(created))
}

async fn list_archives(
    State(st): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<ArchiveListing>>, AppError> {
    let ctx = user.context();
    let listing = run_blocking(move || st.engine.list_archives(&ctx)).await?;
    Ok(Json(listing))
}

async fn download_archive_file(
    State(st): State<Arc<AppState>>,
    user: CurrentUser,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let ctx = user.context();
    let file = run_blocking(move || st.engine.download_archive_file(&ctx, &query.path)).await?;
    let bytes = tokio::fs::read(&file.path)
        .await
        .map_err(|e| AppError::internal(format!("reading archive file failed: {e}")))?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.file_name.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn restore_from_archive(
    State(st): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<RestoreArchiveRequest>,
) -> Result<Json<RestoreStarted>, AppError> {
    let ctx = user.context();
    let started = run_blocking(move || {
        st.engine
            .restore_from_archive(&ctx, &req.archive_name, req.credentials)
    })
    .await?;
    Ok(Json(started))
}

async fn restore_from_upload(
    State(st): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<RestoreUploadRequest>,
) -> Result<Json<RestoreStarted>, AppError> {
    let ctx = user.context();
    let started =
        run_blocking(move || st.engine.restore_from_upload(&ctx, &req.files, req.credentials))
            .await?;
    Ok(Json(started))
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
