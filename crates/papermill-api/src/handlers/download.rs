//! Artifact downloads.
//!
//! Serves Output artifacts as attachments. The store resolves the
//! reference, so traversal never reaches the filesystem and nothing
//! outside Output is ever served.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use tokio_util::io::ReaderStream;

use papermill_core::error::{AppError, ErrorKind};
use papermill_store::store::mime_from_name;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /download/{name} — flat output artifact.
pub async fn download_flat(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    serve(&state, None, &name).await
}

/// GET /download/{dir}/{name} — batch member artifact.
pub async fn download_nested(
    State(state): State<AppState>,
    Path((dir, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    serve(&state, Some(&dir), &name).await
}

async fn serve(state: &AppState, dir: Option<&str>, name: &str) -> Result<Response, ApiError> {
    let path = state.store.resolve_download(dir, name).await?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::StorageRead,
            format!("Failed to open download: {name}"),
            e,
        )
    })?;
    let size = file
        .metadata()
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::StorageRead,
                format!("Failed to stat download: {name}"),
                e,
            )
        })?
        .len();

    let content_type =
        mime_from_name(name).unwrap_or_else(|| "application/octet-stream".to_string());
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )
        .body(body)
        .map_err(|e| {
            ApiError(AppError::with_source(
                ErrorKind::Internal,
                "Failed to build download response",
                e,
            ))
        })
}
