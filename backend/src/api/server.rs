//! HTTP server for the import unifier.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                                  |
//! |--------|-------------------|----------------------------------------------|
//! | GET    | `/health`         | Health check                                 |
//! | POST   | `/api/unificar`   | Upload files, download the unified `.xlsx`   |
//! | POST   | `/api/preview`    | Upload files, get the unified rows as JSON   |
//! | GET    | `/api/logs`       | SSE stream for real-time logs                |
//!
//! Both upload routes take a multipart body with one or more `files` parts.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, PreviewResponse};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::normalize::pipeline::{UnifiedReport, Unifier, UnifyOptions, Upload, DEFAULT_REPORT_NAME};
use crate::normalize::rules::RuleBook;
use crate::report::report_to_xlsx_bytes;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Upload size cap for one request.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

static BATCH_ID_HEADER: HeaderName = HeaderName::from_static("x-batch-id");
static SKIPPED_HEADER: HeaderName = HeaderName::from_static("x-skipped-files");

/// Shared, read-only server state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub rules: Arc<RuleBook>,
    pub options: UnifyOptions,
}

impl AppState {
    pub fn new(rules: RuleBook) -> Self {
        Self {
            rules: Arc::new(rules),
            options: UnifyOptions::default(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

/// Build the router; split from [`start_server`] so tests can drive it.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            header::CONTENT_TYPE,
            header::CONTENT_DISPOSITION,
            BATCH_ID_HEADER.clone(),
            SKIPPED_HEADER.clone(),
        ]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/unificar", post(unify_xlsx))
        .route("/api/preview", post(preview))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, rules: RuleBook) -> ServerResult<()> {
    let app = router(AppState::new(rules));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Import unifier running on http://localhost:{}", port);
    println!("   POST /api/unificar - Upload files, download {}", DEFAULT_REPORT_NAME);
    println!("   POST /api/preview  - Upload files, JSON summary");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Internal(format!("cannot bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(())
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<Value> {
    let countries: Vec<&str> = state.rules.countries.iter().map(|c| c.code.as_str()).collect();
    Json(json!({
        "status": "ok",
        "service": "importaciones",
        "version": env!("CARGO_PKG_VERSION"),
        "countries": countries,
        "endpoints": {
            "unify": "POST /api/unificar",
            "preview": "POST /api/preview",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers drop entries rather than the connection
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Unify the uploaded files and return the report as an xlsx attachment.
async fn unify_xlsx(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let batch_id = Uuid::new_v4();
    let report = run_batch(&state, batch_id, multipart)
        .await
        .map_err(|e| api_error(batch_id, e))?;

    let bytes = report_to_xlsx_bytes(&report)
        .map_err(|e| api_error(batch_id, ServerError::Internal(e.to_string())))?;

    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", DEFAULT_REPORT_NAME),
        ),
        (BATCH_ID_HEADER.clone(), batch_id.to_string()),
        (SKIPPED_HEADER.clone(), report.skipped.len().to_string()),
    ];

    Ok((headers, bytes).into_response())
}

/// Unify the uploaded files and return a JSON summary.
async fn preview(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PreviewResponse>, ApiError> {
    let batch_id = Uuid::new_v4();
    let report = run_batch(&state, batch_id, multipart)
        .await
        .map_err(|e| api_error(batch_id, e))?;
    Ok(Json(PreviewResponse::new(batch_id, &report)))
}

async fn run_batch(state: &AppState, batch_id: Uuid, multipart: Multipart) -> ServerResult<UnifiedReport> {
    let uploads = collect_uploads(multipart).await?;
    if uploads.is_empty() {
        return Err(ServerError::BadRequest("No files provided".to_string()));
    }

    log_info(format!("📦 Batch {}: {} files", batch_id, uploads.len()));

    let rules = Arc::clone(&state.rules);
    let options = state.options.clone();
    let report = tokio::task::spawn_blocking(move || {
        Unifier::new(&rules).with_options(options).unify_uploads(uploads)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("batch task failed: {}", e)))?;

    report.map_err(|e| {
        log_error(format!("Batch {} failed: {}", batch_id, e));
        ServerError::from(e)
    })
}

/// Read every file part of the multipart body.
///
/// Parts named `files` (or `file`) are taken; other parts are ignored.
async fn collect_uploads(mut multipart: Multipart) -> ServerResult<Vec<Upload>> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "files" && name != "file" {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?
            .to_vec();

        uploads.push(Upload { filename, bytes });
    }

    Ok(uploads)
}

/// Status and JSON body for a failed batch.
fn api_error(batch_id: Uuid, error: ServerError) -> ApiError {
    match error {
        ServerError::Pipeline(PipelineError::EmptyBatchResult { skipped }) => {
            let message = format!("No files processed ({} skipped)", skipped.len());
            (StatusCode::BAD_REQUEST, Json(error_response(batch_id, &message, &skipped)))
        }
        ServerError::BadRequest(message) => {
            (StatusCode::BAD_REQUEST, Json(error_response(batch_id, &message, &[])))
        }
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(batch_id, &other.to_string(), &[])),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::pipeline::SkippedFile;

    #[test]
    fn test_router_builds() {
        let _ = router(AppState::new(RuleBook::builtin()));
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health(State(AppState::new(RuleBook::builtin()))).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["countries"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn test_api_error_keeps_batch_id() {
        let batch_id = Uuid::new_v4();
        let skipped = vec![SkippedFile {
            filename: "detalle_XX_1.csv".into(),
            reason: "Unsupported country code 'XX'".into(),
        }];

        let (status, Json(body)) = api_error(
            batch_id,
            ServerError::from(PipelineError::EmptyBatchResult { skipped }),
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["batchId"], batch_id.to_string());
        assert_eq!(body["metadata"]["skipped"][0]["filename"], "detalle_XX_1.csv");

        let (status, Json(body)) = api_error(batch_id, ServerError::BadRequest("No files provided".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No files provided");
        assert_eq!(body["batchId"], batch_id.to_string());

        let (status, _) = api_error(batch_id, ServerError::Internal("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
