//! HTTP boundary: one multipart upload endpoint in front of the pipeline.

use crate::config::ServerConfig;
use crate::error::{Result, SalesAnalysisError};
use crate::llm::TextGenerator;
use crate::pipeline::SalesAnalysisProcessor;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;

/// Multipart field carrying the spreadsheet.
pub const UPLOAD_FIELD: &str = "file";

/// A pipeline error on its way out as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub SalesAnalysisError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.root() {
            SalesAnalysisError::InputError(_) => StatusCode::BAD_REQUEST,
            SalesAnalysisError::ParseError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ if self.0.is_upstream() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SalesAnalysisError> for ApiError {
    fn from(err: SalesAnalysisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn build_router<G>(processor: Arc<SalesAnalysisProcessor<G>>, config: &ServerConfig) -> Router
where
    G: TextGenerator + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze::<G>))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(processor)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn analyze<G>(
    State(processor): State<Arc<SalesAnalysisProcessor<G>>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, ApiError>
where
    G: TextGenerator + 'static,
{
    let multipart = multipart.map_err(|rejection| {
        SalesAnalysisError::InputError(format!("Invalid upload: {}", rejection.body_text()))
    })?;
    let bytes = read_upload(multipart).await?;
    info!("Received spreadsheet upload ({} bytes)", bytes.len());

    let analysis = processor.analyze_workbook(&bytes).await?;
    Ok((StatusCode::OK, Json(analysis)).into_response())
}

/// Bytes of the `file` field; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SalesAnalysisError::InputError(format!("Invalid upload: {}", e)))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field.bytes().await.map_err(|e| {
                SalesAnalysisError::InputError(format!("Could not read uploaded file: {}", e))
            })?;
            return Ok(data.to_vec());
        }
    }

    Err(SalesAnalysisError::InputError(
        "No spreadsheet file provided".to_string(),
    ))
}

/// Binds `config.bind_addr` and serves until the process receives Ctrl-C.
pub async fn serve<G>(processor: SalesAnalysisProcessor<G>, config: ServerConfig) -> Result<()>
where
    G: TextGenerator + 'static,
{
    let app = build_router(Arc::new(processor), &config);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}
