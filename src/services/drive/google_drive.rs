use super::{FOLDER_MIME_TYPE, RemoteStorage, mime_type_for};
use crate::models::{RemoteFile, RemoteFolder};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, future, stream};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const FILE_FIELDS: &str = "id, name, webViewLink";
const MULTIPART_BOUNDARY: &str = "drive-upload-backend-boundary";

/// The subset of a Google service account key file this adapter needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Invalid Google service account JSON")
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
        Self::from_json(&raw)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Drive v3 file resource, restricted to the requested fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

pub struct GoogleDriveProvider {
    http: reqwest::Client,
    key: ServiceAccountKey,
    token: Mutex<Option<CachedToken>>,
    api_base: String,
    upload_base: String,
}

impl GoogleDriveProvider {
    pub fn new(key: ServiceAccountKey) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client for Google Drive")?;

        Ok(Self::with_client(key, http))
    }

    pub fn with_client(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self {
            http,
            key,
            token: Mutex::new(None),
            api_base: DRIVE_API.to_string(),
            upload_base: DRIVE_UPLOAD_API.to_string(),
        }
    }

    /// Points the adapter at other Drive v3 metadata and upload roots.
    pub fn with_endpoints(
        mut self,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into();
        self.upload_base = upload_base.into();
        self
    }

    /// Returns a cached access token, exchanging a fresh JWT assertion when the
    /// cached one expires within a minute.
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Utc::now() + Duration::seconds(60)
        {
            return Ok(token.access_token.clone());
        }

        let assertion = self.signed_assertion(Utc::now())?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("Token request failed")?;

        let response = error_for_status(response, "token exchange").await?;
        let body: TokenResponse = response.json().await?;

        let token = CachedToken {
            access_token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        };
        let access_token = token.access_token.clone();
        *cached = Some(token);
        tracing::debug!("Obtained Google Drive access token for {}", self.key.client_email);
        Ok(access_token)
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPE,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Invalid service account private key")?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("Failed to sign service account assertion")
    }
}

#[async_trait]
impl RemoteStorage for GoogleDriveProvider {
    fn provider_id(&self) -> &'static str {
        "google_drive"
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> Result<RemoteFolder> {
        let token = self.access_token().await?;
        let parents: Vec<&str> = parent_id.into_iter().collect();

        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": parents,
            }))
            .send()
            .await
            .context("Folder creation request failed")?;

        let folder: DriveFile = error_for_status(response, "create folder")
            .await?
            .json()
            .await?;

        Ok(RemoteFolder {
            id: folder.id,
            name: folder.name,
            link: folder.web_view_link.unwrap_or_default(),
        })
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
        folder_id: &str,
    ) -> Result<RemoteFile> {
        let file = tokio::fs::File::open(local_path)
            .await
            .with_context(|| format!("Failed to open staged file {}", local_path.display()))?;
        let file_len = file
            .metadata()
            .await
            .with_context(|| format!("Failed to stat staged file {}", local_path.display()))?
            .len();
        let mime_type = mime_type_for(remote_name);
        let metadata = json!({
            "name": remote_name,
            "parents": [folder_id],
        });
        let (head, tail) = multipart_related_framing(&metadata, mime_type);
        let content_length = (head.len() + tail.len()) as u64 + file_len;

        // Metadata part, then the file straight from disk, then the closing boundary.
        let body = stream::once(future::ready(Ok::<_, std::io::Error>(Bytes::from(head))))
            .chain(ReaderStream::new(file))
            .chain(stream::once(future::ready(Ok(Bytes::from(tail)))));

        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .header(reqwest::header::CONTENT_LENGTH, content_length)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await
            .with_context(|| format!("Upload request for {} failed", remote_name))?;

        let file: DriveFile = error_for_status(response, "upload file")
            .await?
            .json()
            .await?;

        tracing::info!("Uploaded {} to Google Drive with ID: {}", remote_name, file.id);

        Ok(RemoteFile {
            id: file.id,
            name: file.name,
            link: file.web_view_link.unwrap_or_default(),
            folder_id: folder_id.to_string(),
        })
    }

    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let token = self.access_token().await?;
        let query = format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'"));

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name, mimeType, webViewLink)"),
            ])
            .send()
            .await
            .context("List files request failed")?;

        let list: DriveFileList = error_for_status(response, "list files")
            .await?
            .json()
            .await?;

        Ok(list
            .files
            .into_iter()
            .map(|f| RemoteFile {
                id: f.id,
                name: f.name,
                link: f.web_view_link.unwrap_or_default(),
                folder_id: folder_id.to_string(),
            })
            .collect())
    }

    async fn file_exists(&self, file_id: &str) -> Result<bool> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(token)
            .query(&[("fields", "id, name")])
            .send()
            .await
            .context("File lookup request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let file: DriveFile = error_for_status(response, "get file").await?.json().await?;
        Ok(!file.id.is_empty())
    }
}

/// Turns a non-2xx Drive response into an error carrying the response body.
async fn error_for_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("Google Drive {} failed ({}): {}", action, status, body))
}

/// Framing of a `multipart/related` body: everything before the media bytes
/// (boundary, JSON metadata part, media part header) and everything after.
fn multipart_related_framing(metadata: &serde_json::Value, mime_type: &str) -> (String, String) {
    let head = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {mime}\r\n\r\n",
        b = MULTIPART_BOUNDARY,
        meta = metadata,
        mime = mime_type,
    );
    let tail = format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY);
    (head, tail)
}
