//! HTTP service: upload a PDF, get an audit report back.
//!
//! | Method | Path         | Body                         | Response         |
//! |--------|--------------|------------------------------|------------------|
//! | GET    | `/`          | —                            | service descriptor |
//! | GET    | `/health`    | —                            | liveness + model readiness |
//! | POST   | `/api/audit` | multipart, field `file`      | [`UploadResponse`] |
//!
//! Every failure of `/api/audit` is still an [`UploadResponse`], with
//! `status = "error"`: 400 when the upload is at fault, 500 otherwise.

use crate::audit::audit_source;
use crate::auditor::Auditor;
use crate::error::AuditError;
use crate::output::UploadResponse;
use crate::pipeline::input::PdfSource;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Default upload cap: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Listener and request-handling settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Audits allowed to run at once; further uploads wait.
    pub max_concurrent_audits: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_audits: 1,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no model provider could be configured at startup; the
    /// server still answers `/health` so the problem is visible.
    auditor: Option<Arc<Auditor>>,
    limiter: Arc<Semaphore>,
}

impl AppState {
    pub fn new(auditor: Option<Arc<Auditor>>, max_concurrent_audits: usize) -> Self {
        Self {
            auditor,
            limiter: Arc::new(Semaphore::new(max_concurrent_audits.max(1))),
        }
    }

    pub fn model_ready(&self) -> bool {
        self.auditor.is_some()
    }
}

/// An `/api/audit` failure, rendered as an error [`UploadResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        if e.is_client_error() {
            Self::new(StatusCode::BAD_REQUEST, e.to_string())
        } else {
            Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Audit failed".into(),
                details: Some(e.to_string()),
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(UploadResponse::error(self.message, self.details))).into_response()
    }
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/audit", post(upload_and_audit))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &ServerConfig, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(
        "PaperLens listening on http://{} (model ready: {})",
        listener.local_addr()?,
        state.model_ready()
    );
    axum::serve(listener, router(state, config.max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "PaperLens",
        "description": "Multimodal contradiction detector for research papers",
        "endpoints": {
            "GET /health": "Health check",
            "POST /api/audit": "Upload PDF and run contradiction detection"
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "PaperLens",
        "model_ready": state.model_ready()
    }))
}

async fn upload_and_audit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let Some(auditor) = state.auditor.clone() else {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Model API not initialized. Check GOOGLE_API_KEY.",
        ));
    };

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        upload = Some((name, content_type, bytes.to_vec()));
        break;
    }

    let Some((name, content_type, bytes)) = upload else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "No file uploaded. Send the PDF in a multipart field named 'file'.",
        ));
    };
    info!(
        "Received '{}' ({} bytes, content_type={:?})",
        name,
        bytes.len(),
        content_type
    );

    let source = PdfSource::from_upload(name, content_type.as_deref(), bytes).map_err(|e| {
        warn!("Upload rejected: {}", e);
        ApiError::from(e)
    })?;

    let _permit = state
        .limiter
        .acquire()
        .await
        .map_err(|e| ApiError::from(AuditError::Internal(e.to_string())))?;

    match audit_source(&auditor, source).await {
        Ok(report) => Ok(Json(UploadResponse::success(report))),
        Err(e) => {
            error!("Audit failed: {}", e);
            Err(ApiError::from(e))
        }
    }
}
