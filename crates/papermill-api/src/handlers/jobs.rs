//! Job submission.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Multipart, Path, State};

use papermill_core::error::AppError;
use papermill_jobs::{OperationKind, SubmitAck, UploadedFile};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/jobs/{kind} — submit one operation request.
///
/// Multipart parts carrying a filename are uploads; everything else is a
/// flat option field. The response is always the submission acknowledgment:
/// validation failures come back as an error ack, not an HTTP error, so the
/// client can correlate them with the published error event.
pub async fn submit_job(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<SubmitAck>, ApiError> {
    let kind: OperationKind = kind
        .parse()
        .map_err(|_| AppError::not_found(format!("Unknown operation: {kind}")))?;

    let mut uploads = Vec::new();
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed multipart request: {e}")))?
    {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(format!("Upload could not be read: {e}")))?;
            uploads.push(UploadedFile {
                name: file_name,
                data,
            });
        } else {
            let name = field.name().unwrap_or_default().to_string();
            let value = field
                .text()
                .await
                .map_err(|e| AppError::validation(format!("Field could not be read: {e}")))?;
            if !name.is_empty() {
                fields.insert(name, value);
            }
        }
    }

    Ok(Json(state.dispatcher.submit(kind, uploads, fields).await))
}
