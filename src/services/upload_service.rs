use crate::api::error::AppError;
use crate::models::{Payload, RemoteFile, UploadOutcome, UploadRequest};
use crate::services::drive::RemoteStorage;
use crate::services::temp_storage::{CleanupGuard, TempStorage};
use anyhow::Context;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;

/// Drives one validated request through the remote backend: folder creation,
/// concurrent image uploads, the voice note, and temp file cleanup.
pub struct UploadService {
    storage: Arc<dyn RemoteStorage>,
    temp_storage: Arc<TempStorage>,
    parent_folder_id: Option<String>,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn RemoteStorage>,
        temp_storage: Arc<TempStorage>,
        parent_folder_id: Option<String>,
    ) -> Self {
        Self {
            storage,
            temp_storage,
            parent_folder_id,
        }
    }

    pub fn image_name(position: usize, payload: &Payload) -> String {
        format!("image{}{}", position, payload.extension())
    }

    pub fn voice_note_name(payload: &Payload) -> String {
        format!("voice-note{}", payload.extension())
    }

    /// Every temp file of `request` is gone once this returns, or once the
    /// returned future is dropped.
    pub async fn process(&self, request: UploadRequest) -> Result<UploadOutcome, AppError> {
        let staged = CleanupGuard::tracking(request.temp_paths());

        let folder = match self
            .storage
            .create_timestamped_folder(self.parent_folder_id.as_deref())
            .await
        {
            Ok(folder) => folder,
            Err(e) => {
                self.temp_storage.remove_all(&request.temp_paths()).await;
                staged.disarm();
                return Err(AppError::Anyhow(e.context("Failed to create upload folder")));
            }
        };

        // All images go out together; the group is drained completely so every
        // sibling gets to delete its own temp file before a failure is reported.
        let mut uploads: FuturesUnordered<_> = request
            .images
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                let remote_name = Self::image_name(index + 1, payload);
                let folder_id = folder.id.as_str();
                let staged = &staged;
                async move {
                    let result = self
                        .upload_payload(payload, &remote_name, folder_id, staged)
                        .await;
                    (index, result)
                }
            })
            .collect();

        let mut uploaded: Vec<Option<RemoteFile>> = vec![None; request.images.len()];
        let mut first_error: Option<anyhow::Error> = None;

        while let Some((index, result)) = uploads.next().await {
            match result {
                Ok(file) => uploaded[index] = Some(file),
                Err(e) => {
                    tracing::error!("Image upload {} failed: {:#}", index + 1, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        drop(uploads);

        if let Some(e) = first_error {
            if let Some(audio) = &request.audio {
                self.temp_storage.remove(&audio.temp_path).await;
                staged.release(&audio.temp_path);
            }
            return Err(AppError::Anyhow(e));
        }

        let mut files: Vec<RemoteFile> = uploaded.into_iter().flatten().collect();

        if let Some(audio) = &request.audio {
            let remote_name = Self::voice_note_name(audio);
            let file = self
                .upload_payload(audio, &remote_name, &folder.id, &staged)
                .await
                .map_err(AppError::Anyhow)?;
            files.push(file);
        }

        tracing::info!(
            "Uploaded {} file(s) into folder {} ({})",
            files.len(),
            folder.name,
            folder.id
        );

        Ok(UploadOutcome { folder, files })
    }

    /// Uploads one payload, then deletes its temp file whatever the outcome.
    async fn upload_payload(
        &self,
        payload: &Payload,
        remote_name: &str,
        folder_id: &str,
        staged: &CleanupGuard,
    ) -> anyhow::Result<RemoteFile> {
        let result = self
            .storage
            .upload_file(&payload.temp_path, remote_name, folder_id)
            .await
            .with_context(|| format!("Error uploading {}", remote_name));

        self.temp_storage.remove(&payload.temp_path).await;
        staged.release(&payload.temp_path);
        result
    }
}
