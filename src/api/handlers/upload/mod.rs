pub mod intake;
pub mod types;

use crate::AppState;
use crate::api::error::AppError;
use crate::models::UploadOutcome;
use crate::services::temp_storage::CleanupGuard;
use crate::services::upload_tracker::UploadStatus;
use crate::utils::validation::validate_upload_request;
use axum::{
    Json,
    extract::{Multipart, Path, State},
};
use types::UploadResponse;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = types::UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Files uploaded to a new Drive folder", body = UploadResponse),
        (status = 400, description = "Transport or validation failure", body = types::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = types::ErrorResponse),
        (status = 500, description = "Remote backend failure", body = types::ErrorResponse)
    ),
    tag = "upload"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let upload = state.tracker.begin();
    let upload_id = upload.id();

    // Every staged file is removed on the async paths below; the guard only
    // acts if this future is dropped first.
    let staged = CleanupGuard::default();
    let result = process_upload(&state, &mut multipart, &staged).await;
    staged.disarm();

    match result {
        Ok(outcome) => {
            upload.complete(&outcome.folder.id);
            Ok(Json(UploadResponse::new(upload_id, outcome)))
        }
        Err(err) => {
            upload.fail(err.public_message());

            // Drain the rest of the body so the client sees the error response
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(err)
        }
    }
}

async fn process_upload(
    state: &AppState,
    multipart: &mut Multipart,
    staged: &CleanupGuard,
) -> Result<UploadOutcome, AppError> {
    let received =
        intake::receive_upload(multipart, &state.temp_storage, &state.config, staged).await?;
    tracing::info!(
        "Received {} image(s) and {} audio file(s)",
        received.images.len(),
        received.audio.len()
    );

    let request = match validate_upload_request(&received, &state.config.validation) {
        Ok(request) => request,
        Err(e) => {
            state.temp_storage.remove_all(&received.staged_paths()).await;
            return Err(e.into());
        }
    };

    state.upload_service.process(request).await
}

#[utoipa::path(
    get,
    path = "/api/upload/status/{upload_id}",
    params(
        ("upload_id" = String, Path, description = "Id returned by the upload endpoint")
    ),
    responses(
        (status = 200, description = "Tracked upload state", body = UploadStatus),
        (status = 404, description = "Upload not found", body = types::ErrorResponse)
    ),
    tag = "upload"
)]
pub async fn upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadStatus>, AppError> {
    Uuid::parse_str(&upload_id)
        .ok()
        .and_then(|id| state.tracker.get(&id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Upload not found".to_string()))
}
