use crate::config::DriveConfig;
use crate::services::drive::RemoteStorage;
use crate::services::drive::google_drive::{GoogleDriveProvider, ServiceAccountKey};
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::info;

/// Builds the Google Drive adapter from inline service-account JSON, falling
/// back to a credentials file.
pub async fn setup_remote_storage(config: &DriveConfig) -> Result<Arc<dyn RemoteStorage>> {
    let key = if let Some(raw) = &config.service_account_json {
        info!("☁️  Google Drive: using service account from environment");
        ServiceAccountKey::from_json(raw)?
    } else if let Some(path) = &config.credentials_file {
        info!("☁️  Google Drive: using credentials file {}", path.display());
        ServiceAccountKey::from_file(path).await?
    } else {
        bail!("Google Drive credentials missing: set GOOGLE_SERVICE_ACCOUNT or GOOGLE_CREDENTIALS");
    };

    info!(
        "☁️  Google Drive account: {} (parent folder: {})",
        key.client_email,
        config.parent_folder_id.as_deref().unwrap_or("root")
    );

    let provider = GoogleDriveProvider::new(key).context("Failed to set up Google Drive")?;
    Ok(Arc::new(provider))
}
