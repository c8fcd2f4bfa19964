//! Storage gateway for the upload and result directories.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::StorageConfig;
use crate::types::{AppError, AppResult};

/// A processed image in the result directory.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    pub filename: String,
    pub size: u64,
    /// Creation time, RFC 3339.
    pub created: String,
    pub content_type: String,
}

/// Manages the upload and result directories: validates and persists
/// uploads, enumerates processed results.
#[derive(Debug, Clone)]
pub struct MediaStore {
    upload_dir: PathBuf,
    result_dir: PathBuf,
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl MediaStore {
    pub fn new(cfg: &StorageConfig) -> Self {
        Self {
            upload_dir: cfg.upload_dir.clone(),
            result_dir: cfg.result_dir.clone(),
            max_file_size: cfg.max_file_size,
            allowed_extensions: cfg.allowed_extensions.clone(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Validates and writes an uploaded file, returning the stored path.
    ///
    /// The filename is sanitized before writing (spaces replaced with
    /// underscores, extension preserved exactly once). Nothing is written
    /// when validation fails.
    pub async fn save_upload(&self, filename: &str, data: Bytes) -> AppResult<PathBuf> {
        self.validate_extension(filename)?;
        if data.len() as u64 > self.max_file_size {
            return Err(AppError::TooLarge(format!(
                "upload of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_file_size
            )));
        }

        let safe_name = sanitize_filename(filename);
        let path = self.upload_dir.join(safe_name);

        debug!(path = %path.display(), size = data.len(), "storing upload");
        match tokio::fs::write(&path, &data).await {
            Ok(()) => Ok(path),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.upload_dir).await?;
                tokio::fs::write(&path, &data).await?;
                Ok(path)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Enumerates processed images in the result directory. A missing
    /// directory yields an empty list, not an error.
    pub async fn list_results(&self) -> AppResult<Vec<ResultEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.result_dir).await {
            Ok(dir) => dir,
            Err(ref e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(other) => return Err(other.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || !self.extension_allowed(&path) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let content_type = mime_guess::from_path(&path)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string();
            entries.push(ResultEntry {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                created: created.to_rfc3339(),
                content_type,
            });
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    fn validate_extension(&self, filename: &str) -> AppResult<()> {
        if filename.trim().is_empty() {
            return Err(AppError::Validation("no file provided".to_string()));
        }
        let ext = Path::new(filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !self.allowed_extensions.contains(&ext) {
            return Err(AppError::Validation(format!(
                "file type {} not allowed, allowed types: {}",
                if ext.is_empty() { "<none>" } else { &ext },
                self.allowed_extensions.join(", ")
            )));
        }
        Ok(())
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .map(|ext| self.allowed_extensions.contains(&ext))
            .unwrap_or(false)
    }
}

/// Replaces spaces with underscores, keeping the extension exactly once.
fn sanitize_filename(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}.{}", stem.replace(' ', "_"), ext.to_string_lossy()),
        None => stem.replace(' ', "_"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> MediaStore {
        MediaStore::new(&StorageConfig {
            upload_dir: tmp.path().join("uploads"),
            result_dir: tmp.path().join("results"),
            max_file_size: 1024,
            allowed_extensions: vec![
                ".jpg".into(),
                ".jpeg".into(),
                ".png".into(),
                ".bmp".into(),
                ".tiff".into(),
            ],
        })
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my cat photo.png"), "my_cat_photo.png");
        assert_eq!(sanitize_filename("plain.jpg"), "plain.jpg");
        // Only the final extension is treated as the extension.
        assert_eq!(sanitize_filename("a b.c d.png"), "a_b.c_d.png");
    }

    #[tokio::test]
    async fn test_save_upload_writes_sanitized_name() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let path = store
            .save_upload("my cat.png", Bytes::from_static(b"png bytes"))
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "my_cat.png");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png bytes");
    }

    #[tokio::test]
    async fn test_disallowed_extension_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let err = store
            .save_upload("doc.pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        // Upload dir was never created, so nothing can have been written.
        assert!(!store.upload_dir().exists());
    }

    #[tokio::test]
    async fn test_extension_match_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let path = store
            .save_upload("SHOUTY.JPG", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "SHOUTY.JPG");
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let big = Bytes::from(vec![0u8; 2048]);
        let err = store.save_upload("big.png", big).await.unwrap_err();
        assert!(matches!(err, AppError::TooLarge(_)));
        assert!(!store.upload_dir().exists());
    }

    #[tokio::test]
    async fn test_list_results_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        assert!(store.list_results().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_results_filters_and_reports_size() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        tokio::fs::create_dir_all(store.result_dir()).await.unwrap();
        tokio::fs::write(store.result_dir().join("contour_abc.jpg"), vec![1u8; 321])
            .await
            .unwrap();
        tokio::fs::write(store.result_dir().join("notes.txt"), b"skip me")
            .await
            .unwrap();

        let entries = store.list_results().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "contour_abc.jpg");
        assert_eq!(entries[0].size, 321);
        assert_eq!(entries[0].content_type, "image/jpeg");
    }
}
