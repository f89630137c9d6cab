#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use drive_upload_backend::config::AppConfig;
use drive_upload_backend::models::{RemoteFile, RemoteFolder};
use drive_upload_backend::services::drive::RemoteStorage;
use drive_upload_backend::{AppState, create_app};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// In-memory stand-in for Google Drive.
#[derive(Default)]
pub struct MockDrive {
    pub folders: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
    pub fail_uploads: bool,
    pub hang_uploads: bool,
}

impl MockDrive {
    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Default::default()
        }
    }

    /// Uploads never finish, like a backend that stopped answering.
    pub fn hanging() -> Self {
        Self {
            hang_uploads: true,
            ..Default::default()
        }
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteStorage for MockDrive {
    fn provider_id(&self) -> &'static str {
        "mock"
    }

    async fn create_folder(
        &self,
        name: &str,
        _parent_id: Option<&str>,
    ) -> anyhow::Result<RemoteFolder> {
        let mut folders = self.folders.lock().unwrap();
        folders.push(name.to_string());
        let id = format!("folder-{}", folders.len());
        Ok(RemoteFolder {
            link: format!("https://drive.google.com/drive/folders/{}", id),
            id,
            name: name.to_string(),
        })
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        folder_id: &str,
    ) -> anyhow::Result<RemoteFile> {
        tokio::fs::metadata(local_path).await?;
        if self.hang_uploads {
            futures::future::pending::<()>().await;
        }
        if self.fail_uploads {
            return Err(anyhow!("drive unavailable"));
        }
        self.uploads.lock().unwrap().push(remote_name.to_string());
        let id = format!("file-{}", remote_name);
        Ok(RemoteFile {
            link: format!("https://drive.google.com/file/d/{}/view", id),
            id,
            name: remote_name.to_string(),
            folder_id: folder_id.to_string(),
        })
    }

    async fn list_files(&self, _folder_id: &str) -> anyhow::Result<Vec<RemoteFile>> {
        Ok(vec![])
    }

    async fn file_exists(&self, _file_id: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}

pub struct TestApp {
    pub router: Router,
    pub drive: Arc<MockDrive>,
    pub temp_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(MockDrive::default(), |_| {})
    }

    pub fn with(drive: MockDrive, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.upload.temp_dir = temp_dir.path().join("uploads");
        configure(&mut config);

        let drive = Arc::new(drive);
        let state = AppState::new(config, drive.clone());
        Self {
            router: create_app(state),
            drive,
            temp_dir,
        }
    }

    /// Files left behind in the staging directory.
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path().join("uploads"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub struct Part<'a> {
    pub field: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: &'a str,
    pub data: Vec<u8>,
}

pub fn file(field: &'static str, file_name: &'static str, content_type: &'static str) -> Part<'static> {
    Part {
        field,
        file_name: Some(file_name),
        content_type,
        data: format!("fake bytes of {}", file_name).into_bytes(),
    }
}

pub fn text(field: &'static str, value: &str) -> Part<'static> {
    Part {
        field,
        file_name: None,
        content_type: "text/plain",
        data: value.as_bytes().to_vec(),
    }
}

pub fn jpegs(count: usize) -> Vec<Part<'static>> {
    const NAMES: [&str; 10] = [
        "IMG_001.jpg",
        "IMG_002.jpg",
        "IMG_003.jpg",
        "IMG_004.jpg",
        "IMG_005.jpg",
        "IMG_006.jpg",
        "IMG_007.jpg",
        "IMG_008.jpg",
        "IMG_009.jpg",
        "IMG_010.jpg",
    ];
    NAMES[..count]
        .iter()
        .map(|name| file("images[]", *name, "image/jpeg"))
        .collect()
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    part.field, file_name, part.content_type
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.field)
                    .as_bytes(),
            ),
        }
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(parts: &[Part]) -> Request<Body> {
    upload_request_via(parts, "203.0.113.10")
}

/// Upload request carrying the given `X-Forwarded-For` chain.
pub fn upload_request_via(parts: &[Part], forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
