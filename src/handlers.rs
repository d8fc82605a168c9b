//! Request handlers for the REST API.

use crate::error::TableportError;
use crate::server::AppState;
use crate::tables::{TableInsertRequest, TableQueryParams, TableResponse};
use crate::volumes::VolumePath;
use axum::Json;
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

/// GET / - service banner
pub async fn root() -> Json<Value> {
    Json(json!({
        "app": "tableport",
        "version": env!("CARGO_PKG_VERSION"),
        "message": "REST gateway for Unity Catalog tables",
        "docs": [
            "/api/v1/healthcheck",
            "/api/v1/table",
            "/api/v1/statements/{statement_id}/result",
            "/api/v1/download",
        ],
    }))
}

/// GET /api/v1/healthcheck - liveness only; never touches the warehouse
pub async fn healthcheck() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/v1/table
pub async fn read_table(
    State(state): State<AppState>,
    params: Result<Query<TableQueryParams>, QueryRejection>,
) -> Result<Json<TableResponse>, TableportError> {
    let Query(params) = params.map_err(|e| {
        TableportError::validation(format!("Invalid query parameters: {}", e.body_text()))
    })?;
    let response = state.tables.read(params).await?;
    Ok(Json(response))
}

/// POST /api/v1/table
pub async fn insert_table(
    State(state): State<AppState>,
    body: Result<Json<TableInsertRequest>, JsonRejection>,
) -> Result<Json<TableResponse>, TableportError> {
    let Json(request) = body.map_err(|e| {
        TableportError::validation(format!("Invalid request body: {}", e.body_text()))
    })?;
    let response = state.tables.insert(request).await?;
    Ok(Json(response))
}

/// GET /api/v1/statements/{statement_id}/result
pub async fn statement_result(
    State(state): State<AppState>,
    Path(statement_id): Path<String>,
) -> Result<Json<TableResponse>, TableportError> {
    let response = state.tables.statement_result(&statement_id).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub file_path: Option<String>,
}

/// GET /api/v1/download?file_path=/Volumes/...
///
/// Streams the file body through without buffering it.
pub async fn download(
    State(state): State<AppState>,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, TableportError> {
    let Query(params) = params.map_err(|e| {
        TableportError::validation(format!("Invalid query parameters: {}", e.body_text()))
    })?;
    let path = VolumePath::parse(params.file_path.as_deref().unwrap_or_default())?;

    let workspace = state.workspace.as_ref().ok_or_else(|| {
        TableportError::config("Databricks workspace not configured")
            .with_detail("setting", "databricks_host")
    })?;

    tracing::info!(file = path.as_str(), "downloading volume file");
    let upstream = workspace.download(&path).await?;

    let content_length = upstream.headers().get(header::CONTENT_LENGTH).cloned();

    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Some(length) = content_length {
        headers.insert(header::CONTENT_LENGTH, length);
    }
    if let Ok(disposition) = HeaderValue::from_str(&content_disposition(path.file_name())) {
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

/// `attachment; filename="..."` with quotes and control characters removed from the name.
///
/// Non-ASCII names get an `_`-substituted fallback plus an RFC 5987 `filename*`
/// parameter, so the header value stays ASCII.
pub fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
        .collect();
    if safe.is_ascii() {
        return format!("attachment; filename=\"{}\"", safe);
    }

    let fallback: String = safe
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        encode_ext_value(&safe)
    )
}

/// Percent-encode everything outside the RFC 5987 `attr-char` set.
fn encode_ext_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}
