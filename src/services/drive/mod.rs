use crate::models::{RemoteFile, RemoteFolder};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::Path;

pub mod google_drive;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/m4a"),
    ("mp4", "video/mp4"),
    ("ogg", "audio/ogg"),
    ("webm", "audio/webm"),
];

/// Remote backend that durably stores uploaded files under folders.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Provider identifier (e.g., "google_drive")
    fn provider_id(&self) -> &'static str;

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteFolder>;

    /// Uploads a local file into `folder_id` under `remote_name`.
    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        folder_id: &str,
    ) -> Result<RemoteFile>;

    /// Lists the non-trashed files directly inside a folder
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>>;

    async fn file_exists(&self, file_id: &str) -> Result<bool>;

    /// Creates a folder named after the current local date and time.
    async fn create_timestamped_folder(&self, parent_id: Option<&str>) -> Result<RemoteFolder> {
        let name = folder_timestamp(Local::now());
        let folder = self.create_folder(&name, parent_id).await?;
        tracing::info!("Created folder: {} with ID: {}", folder.name, folder.id);
        Ok(folder)
    }
}

/// Human readable folder name, e.g. "Apr 28, 2025 - 13:47".
pub fn folder_timestamp(now: DateTime<Local>) -> String {
    now.format("%b %-d, %Y - %H:%M").to_string()
}

/// Content type for an upload, resolved from the file extension.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let Some(ext) = Path::new(file_name).extension().and_then(|e| e.to_str()) else {
        return DEFAULT_MIME_TYPE;
    };
    let ext = ext.to_lowercase();
    MIME_TYPES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME_TYPE)
}
