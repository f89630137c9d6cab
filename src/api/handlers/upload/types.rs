use crate::models::{RemoteFile, RemoteFolder, UploadOutcome};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub upload_id: Uuid,
    pub folder_details: RemoteFolder,
    pub files: Vec<RemoteFile>,
}

impl UploadResponse {
    pub fn new(upload_id: Uuid, outcome: UploadOutcome) -> Self {
        Self {
            success: true,
            message: "Files uploaded successfully".to_string(),
            upload_id,
            folder_details: outcome.folder,
            files: outcome.files,
        }
    }
}

/// Multipart form accepted by `POST /api/upload`. Documentation only.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadForm {
    /// Image files, sent as `images` or `images[]`
    #[schema(value_type = Vec<String>, format = Binary)]
    pub images: Vec<Vec<u8>>,
    /// Optional voice note
    #[schema(value_type = Option<String>, format = Binary)]
    pub audio: Option<Vec<u8>>,
}

/// Body of every non-2xx response. Documentation only.
#[allow(dead_code)]
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
