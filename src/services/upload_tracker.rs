use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// How long finished entries stay queryable.
const RETENTION_HOURS: i64 = 24;

pub const CANCELLED_MESSAGE: &str = "Upload cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub upload_id: Uuid,
    pub status: UploadState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Handle to a pending upload entry.
///
/// Dropping it without calling `complete` or `fail` marks the entry failed, so
/// a request abandoned mid-flight never stays pending.
#[must_use = "an unsettled upload is marked cancelled when dropped"]
pub struct PendingUpload {
    tracker: UploadTracker,
    upload_id: Uuid,
    settled: bool,
}

impl PendingUpload {
    pub fn id(&self) -> Uuid {
        self.upload_id
    }

    pub fn complete(mut self, folder_id: &str) {
        self.settled = true;
        self.tracker.complete(self.upload_id, folder_id);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.settled = true;
        self.tracker.fail(self.upload_id, message);
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Upload {} abandoned before completion", self.upload_id);
            self.tracker.fail(self.upload_id, CANCELLED_MESSAGE);
        }
    }
}

/// In-memory job-status store for upload requests. Lost on restart.
#[derive(Clone, Default)]
pub struct UploadTracker {
    entries: Arc<DashMap<Uuid, UploadStatus>>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new upload as pending.
    pub fn begin(&self) -> PendingUpload {
        self.prune(Utc::now() - Duration::hours(RETENTION_HOURS));

        let upload_id = Uuid::new_v4();
        self.entries.insert(
            upload_id,
            UploadStatus {
                upload_id,
                status: UploadState::Pending,
                message: "Upload in progress".to_string(),
                folder_id: None,
                updated_at: Utc::now(),
            },
        );
        PendingUpload {
            tracker: self.clone(),
            upload_id,
            settled: false,
        }
    }

    pub fn complete(&self, upload_id: Uuid, folder_id: &str) {
        self.update(upload_id, |entry| {
            entry.status = UploadState::Completed;
            entry.message = "Upload completed successfully".to_string();
            entry.folder_id = Some(folder_id.to_string());
        });
    }

    pub fn fail(&self, upload_id: Uuid, message: impl Into<String>) {
        let message = message.into();
        self.update(upload_id, |entry| {
            entry.status = UploadState::Failed;
            entry.message = message;
        });
    }

    pub fn get(&self, upload_id: &Uuid) -> Option<UploadStatus> {
        self.entries.get(upload_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update(&self, upload_id: Uuid, apply: impl FnOnce(&mut UploadStatus)) {
        if let Some(mut entry) = self.entries.get_mut(&upload_id) {
            apply(&mut entry);
            entry.updated_at = Utc::now();
        } else {
            tracing::warn!("Status update for unknown upload {}", upload_id);
        }
    }

    /// Drops entries last touched before `cutoff`, pending ones included.
    fn prune(&self, cutoff: DateTime<Utc>) {
        self.entries.retain(|_, entry| entry.updated_at >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let tracker = UploadTracker::new();
        let upload = tracker.begin();
        let id = upload.id();
        assert_eq!(tracker.get(&id).unwrap().status, UploadState::Pending);

        upload.complete("folder-1");
        let status = tracker.get(&id).unwrap();
        assert_eq!(status.status, UploadState::Completed);
        assert_eq!(status.folder_id.as_deref(), Some("folder-1"));
    }

    #[test]
    fn test_fail_records_message() {
        let tracker = UploadTracker::new();
        let upload = tracker.begin();
        let id = upload.id();
        upload.fail("Invalid image file type(s)");

        let status = tracker.get(&id).unwrap();
        assert_eq!(status.status, UploadState::Failed);
        assert_eq!(status.message, "Invalid image file type(s)");
    }

    #[test]
    fn test_unknown_id() {
        let tracker = UploadTracker::new();
        assert!(tracker.get(&Uuid::new_v4()).is_none());
        tracker.complete(Uuid::new_v4(), "ignored");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_prune_keeps_recent_entries() {
        let tracker = UploadTracker::new();
        let upload = tracker.begin();
        let id = upload.id();
        upload.complete("folder");

        tracker.prune(Utc::now() - Duration::hours(RETENTION_HOURS));
        assert!(tracker.get(&id).is_some());
    }

    #[test]
    fn test_prune_drops_stale_pending_entries() {
        let tracker = UploadTracker::new();
        let stuck = tracker.begin();
        let done = tracker.begin();
        let (stuck_id, done_id) = (stuck.id(), done.id());
        done.complete("folder");

        tracker.prune(Utc::now() + Duration::seconds(1));
        assert!(tracker.get(&stuck_id).is_none());
        assert!(tracker.get(&done_id).is_none());
        assert!(tracker.is_empty());
        drop(stuck);
    }

    #[test]
    fn test_dropped_upload_is_marked_cancelled() {
        let tracker = UploadTracker::new();
        let upload = tracker.begin();
        let id = upload.id();
        drop(upload);

        let status = tracker.get(&id).unwrap();
        assert_eq!(status.status, UploadState::Failed);
        assert_eq!(status.message, CANCELLED_MESSAGE);
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let tracker = UploadTracker::new();
        let upload = tracker.begin();
        let id = upload.id();
        let value = serde_json::to_value(tracker.get(&id).unwrap()).unwrap();
        assert_eq!(value["uploadId"], id.to_string());
        assert_eq!(value["status"], "pending");
        assert!(value.get("folderId").is_none());
    }
}
