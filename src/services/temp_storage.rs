use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("file exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("temp storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Removes every tracked path when dropped.
///
/// Async cleanup never runs when a request future is dropped mid-flight, so
/// staged files are registered here and unlinked synchronously on drop.
/// Paths already removed are skipped; call `release` or `disarm` once the
/// async path has dealt with them.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupGuard {
    pub fn tracking(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: Mutex::new(paths.into_iter().collect()),
        }
    }

    pub fn track(&self, path: PathBuf) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.push(path);
        }
    }

    pub fn release(&self, path: &Path) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.retain(|p| p != path);
        }
    }

    pub fn disarm(&self) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.paths.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let paths = match self.paths.get_mut() {
            Ok(paths) => std::mem::take(paths),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed abandoned temp file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove temp file {}: {}", path.display(), e),
            }
        }
    }
}

/// Local staging area for payloads between multipart intake and remote upload.
pub struct TempStorage {
    dir: PathBuf,
}

impl TempStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }

    /// Unique staging name: `<field>-<millis>-<random><ext>`.
    fn staging_path(&self, prefix: &str, extension: &str) -> PathBuf {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        self.dir.join(format!(
            "{}-{}-{}{}",
            prefix,
            Utc::now().timestamp_millis(),
            suffix,
            extension
        ))
    }

    /// Streams a payload to disk, aborting once it grows past `max_size`.
    ///
    /// A partially written file is removed before any error is returned, and
    /// also when the returned future is dropped before completing.
    pub async fn stage<S, E>(
        &self,
        prefix: &str,
        extension: &str,
        stream: S,
        max_size: u64,
    ) -> Result<StagedFile, StageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        self.ensure_dir().await?;
        let path = self.staging_path(prefix, extension);
        let guard = CleanupGuard::tracking([path.clone()]);
        let mut file = fs::File::create(&path).await?;
        let mut size: u64 = 0;

        let result: Result<(), StageError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| StageError::Stream(e.to_string()))?;
                size += chunk.len() as u64;
                if size > max_size {
                    return Err(StageError::TooLarge { limit: max_size });
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        drop(file);

        match result {
            Ok(()) => {
                guard.disarm();
                tracing::debug!("Staged {} bytes at {}", size, path.display());
                Ok(StagedFile { path, size })
            }
            Err(e) => {
                self.remove(&path).await;
                guard.disarm();
                Err(e)
            }
        }
    }

    /// Consumes a payload without writing it, still enforcing `max_size`.
    pub async fn discard_stream<S, E>(stream: S, max_size: u64) -> Result<u64, StageError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        let mut size: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StageError::Stream(e.to_string()))?;
            size += chunk.len() as u64;
            if size > max_size {
                return Err(StageError::TooLarge { limit: max_size });
            }
        }
        Ok(size)
    }

    /// Deletes a staged payload. Missing files are fine; other failures are logged.
    pub async fn remove(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed temp file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove temp file {}: {}", path.display(), e),
        }
    }

    pub async fn remove_all(&self, paths: &[PathBuf]) {
        for path in paths {
            self.remove(path).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, String>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(*p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_stage_writes_payload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path());

        let staged = storage
            .stage("images", ".jpg", chunks(&[b"hello ", b"world"]), 1024)
            .await
            .unwrap();

        assert_eq!(staged.size, 11);
        let name = staged.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("images-"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(fs::read(&staged.path).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_stage_rejects_oversized_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path());

        let err = storage
            .stage("audio", ".wav", chunks(&[b"0123456789", b"abc"]), 10)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, StageError::TooLarge { limit: 10 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stage_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path().join("nested/uploads"));

        let staged = storage
            .stage("images", "", chunks(&[b"x"]), 10)
            .await
            .unwrap();
        assert!(staged.path.exists());
    }

    #[tokio::test]
    async fn test_discard_stream_counts_bytes() {
        assert_eq!(
            TempStorage::discard_stream(chunks(&[b"abc", b"de"]), 10)
                .await
                .unwrap(),
            5
        );
        assert!(
            TempStorage::discard_stream(chunks(&[b"abcdef"]), 3)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_abandoned_stage_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path());
        let stalled = chunks(&[b"first chunk"]).chain(stream::pending());

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            storage.stage("images", ".jpg", stalled, 1024),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_guard_removes_tracked_files_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.jpg");
        let dropped = dir.path().join("dropped.jpg");
        std::fs::write(&kept, b"k").unwrap();
        std::fs::write(&dropped, b"d").unwrap();

        let guard = CleanupGuard::tracking([kept.clone(), dropped.clone()]);
        guard.track(dir.path().join("never-written.jpg"));
        guard.release(&kept);
        assert_eq!(guard.len(), 2);
        drop(guard);

        assert!(kept.exists());
        assert!(!dropped.exists());
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let storage = TempStorage::new(dir.path());
        storage.remove(&dir.path().join("gone.jpg")).await;
    }
}
