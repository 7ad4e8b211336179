//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Upload-and-ask HTML page |
//! | `POST` | `/upload` | Multipart upload, one or more `file` fields |
//! | `POST` | `/ask` | JSON `{"question": "..."}` |
//! | `GET`  | `/health` | Status, version and indexed chunk count |
//!
//! # Error Contract
//!
//! Errors keep the field the page reads on success (`message` for uploads,
//! `answer` for questions) and add a machine-readable `code`:
//!
//! ```json
//! { "answer": "Please upload a PDF first.", "code": "no_index" }
//! ```
//!
//! Codes: `bad_request` (400), `no_index` (400), `payload_too_large` (413),
//! `upstream_error` (500), `internal` (500). Server-side failures carry an `Error: ` prefix.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::QaError;
use crate::llm::create_chat_model;
use crate::service::{Answer, QaService, UploadedFile};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Build the service from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_chat_model(&config.llm)?;
    let service = Arc::new(QaService::open(config.clone(), embedder, llm).await?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        embedding_model = service.config().embedding.model.as_deref().unwrap_or("default"),
        "docqa listening"
    );
    serve(listener, service).await
}

/// Serve the routes for `service` on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, service: Arc<QaService>) -> anyhow::Result<()> {
    axum::serve(listener, router(service)).await?;
    Ok(())
}

pub fn router(service: Arc<QaService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = service.config().server.max_upload_bytes;

    Router::new()
        .route("/", get(handle_home))
        .route("/upload", post(handle_upload))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// ============ Error response ============

/// Which JSON field carries the error text.
#[derive(Clone, Copy)]
enum Route {
    Upload,
    Ask,
}

/// A [`QaError`] rendered in the shape of the route it came from.
struct RouteError {
    route: Route,
    error: QaError,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::error!(code = self.error.code(), error = %self.error, "request failed");
        }
        let field = match self.route {
            Route::Upload => "message",
            Route::Ask => "answer",
        };
        let body = serde_json::json!({
            field: self.error.client_message(),
            "code": self.error.code(),
        });
        (status, Json(body)).into_response()
    }
}

fn upload_error(error: QaError) -> RouteError {
    RouteError {
        route: Route::Upload,
        error,
    }
}

fn ask_error(error: QaError) -> RouteError {
    RouteError {
        route: Route::Ask,
        error,
    }
}

// ============ GET / ============

async fn handle_home() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    indexed_chunks: usize,
}

async fn handle_health(State(service): State<Arc<QaService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexed_chunks: service.indexed_chunks().await,
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filenames: Vec<String>,
    chunks: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<String>,
}

/// Handler for `POST /upload`.
///
/// Collects every multipart field named `file`. A body that is not
/// multipart at all is treated like one without a `file` field.
async fn handle_upload(
    State(service): State<Arc<QaService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, RouteError> {
    let mut files = Vec::new();

    if let Ok(mut multipart) = multipart {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(&service, e))?
        {
            if field.name() != Some("file") {
                continue;
            }
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| multipart_error(&service, e))?;
            files.push(UploadedFile {
                filename,
                bytes: bytes.to_vec(),
            });
        }
    }

    let report = service.ingest(files).await.map_err(upload_error)?;
    Ok(Json(UploadResponse {
        message: "Files processed and index saved!".to_string(),
        filenames: report.filenames,
        chunks: report.chunks,
        skipped: report.skipped,
    }))
}

/// Body-limit failures become 413; anything else is a malformed upload.
fn multipart_error(service: &QaService, e: MultipartError) -> RouteError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return upload_error(QaError::TooLarge(format!(
            "Upload exceeds the {} byte limit",
            service.config().server.max_upload_bytes
        )));
    }
    upload_error(QaError::invalid(format!("Malformed upload: {}", e.body_text())))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: String,
}

async fn handle_ask(
    State(service): State<Arc<QaService>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, RouteError> {
    let Json(req) = body.map_err(|rejection| {
        ask_error(QaError::invalid(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    })?;

    let answer = service.ask(&req.question).await.map_err(ask_error)?;
    Ok(Json(answer))
}
