use crate::utils::validation::sanitize_filename;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Which multipart field a file arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileField {
    Images,
    Audio,
}

impl FileField {
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "images" | "images[]" => Some(Self::Images),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Audio => "audio",
        }
    }
}

/// A file as the transport layer saw it, before the validation gate.
///
/// `original_name` is the filename exactly as the client sent it. `temp_path` is
/// `None` when the declared media type was refused at accept time and the bytes
/// were never written to disk.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub field: FileField,
    pub original_name: String,
    pub media_type: String,
    pub size: u64,
    pub temp_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ReceivedUpload {
    pub images: Vec<ReceivedFile>,
    pub audio: Vec<ReceivedFile>,
}

impl ReceivedUpload {
    pub fn push(&mut self, file: ReceivedFile) {
        match file.field {
            FileField::Images => self.images.push(file),
            FileField::Audio => self.audio.push(file),
        }
    }

    pub fn file_count(&self) -> usize {
        self.images.len() + self.audio.len()
    }

    pub fn count_for(&self, field: FileField) -> usize {
        match field {
            FileField::Images => self.images.len(),
            FileField::Audio => self.audio.len(),
        }
    }

    /// Every path staged on disk for this request.
    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.images
            .iter()
            .chain(self.audio.iter())
            .filter_map(|f| f.temp_path.clone())
            .collect()
    }
}

/// One accepted uploaded file staged in temporary storage.
#[derive(Debug, Clone)]
pub struct Payload {
    pub original_name: String,
    pub media_type: String,
    pub size: u64,
    pub temp_path: PathBuf,
}

impl Payload {
    /// Extension of the sanitized original name including the dot, or an empty string.
    pub fn extension(&self) -> String {
        extension_of(&sanitize_filename(&self.original_name))
    }
}

pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// Validated request handed to the upload orchestrator.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub images: Vec<Payload>,
    pub audio: Option<Payload>,
}

impl UploadRequest {
    pub fn temp_paths(&self) -> Vec<PathBuf> {
        self.images
            .iter()
            .chain(self.audio.iter())
            .map(|p| p.temp_path.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub link: String,
    #[serde(skip)]
    pub folder_id: String,
}

/// Result of a fully processed upload: the folder plus files in upload order.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub folder: RemoteFolder,
    pub files: Vec<RemoteFile>,
}
