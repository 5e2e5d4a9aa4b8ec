//! Axum routes: build a target on request, then serve it with `ETag`- and
//! `Last-Modified`-based caching. Error mapping follows the engine's
//! taxonomy directly — `BadRequest` -> 400, `UnknownTarget` -> 404,
//! everything else -> 500.

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use kake_core::{BuildContext, Engine, KakeError, TargetPath};
use std::sync::Arc;
use std::time::SystemTime;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub struct HttpState {
    pub engine: Engine,
    pub mount_prefix: String,
}

pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/{*path}", get(serve_handler).head(serve_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "healthy" }))
}

async fn serve_handler(
    AxumPath(path): AxumPath<String>,
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
) -> Response {
    let mount = state.mount_prefix.trim_matches('/');
    let relative = if mount.is_empty() {
        path.as_str()
    } else {
        match path.strip_prefix(mount).map(|s| s.trim_start_matches('/')) {
            Some(rest) => rest,
            None => return error_response(&KakeError::bad_request(format!("path outside mount: /{path}"))),
        }
    };
    let target = TargetPath::new(relative);

    if let Err(err) = state.engine.build(&target, &BuildContext::new()).await {
        error!(target = %target, error = %err, "build failed for request");
        return error_response(&err);
    }

    let etag = state.engine.content_hash(&target);
    if let Some(etag) = &etag {
        if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
            if if_none_match.trim_matches('"') == etag {
                return StatusCode::NOT_MODIFIED.into_response();
            }
        }
    }

    let file_path = state.engine.resolve_path(&target);
    let last_modified = match tokio::fs::metadata(&file_path).await.and_then(|m| m.modified()) {
        Ok(time) => Some(time),
        Err(e) => return error_response(&KakeError::build_failed("serve", target, None, e.to_string())),
    };
    if let Some(last_modified) = last_modified {
        if let Some(since) = headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date)
        {
            // HTTP-dates only have second resolution.
            if truncate_to_secs(last_modified) <= truncate_to_secs(since) {
                return StatusCode::NOT_MODIFIED.into_response();
            }
        }
    }

    let bytes = match tokio::fs::read(&file_path).await {
        Ok(bytes) => bytes,
        Err(e) => return error_response(&KakeError::build_failed("serve", target, None, e.to_string())),
    };

    let mime = mime_guess_from_path(&file_path);
    let mut response = (
        [(header::CONTENT_TYPE, mime)],
        bytes,
    )
        .into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(
            header::ETAG,
            format!("\"{etag}\"")
                .parse::<axum::http::HeaderValue>()
                .expect("hex digest is valid header value"),
        );
    }
    if let Some(last_modified) = last_modified {
        response.headers_mut().insert(
            header::LAST_MODIFIED,
            format_http_date(last_modified)
                .parse::<axum::http::HeaderValue>()
                .expect("formatted HTTP-date is valid header value"),
        );
    }
    info!(target = %relative, "served");
    response
}

fn format_http_date(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&Utc)))
}

fn truncate_to_secs(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn mime_guess_from_path(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn error_response(err: &KakeError) -> Response {
    let status = match err {
        KakeError::BadRequest(_) => StatusCode::BAD_REQUEST,
        KakeError::UnknownTarget(_) => StatusCode::NOT_FOUND,
        KakeError::BuildFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Body::from(err.to_string())).into_response()
}
