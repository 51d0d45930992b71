//! Uploaded paper documents
//!
//! PDFs are validated before anything is persisted and stored under the
//! configured upload directory with a generated file name. Papers keep the
//! storage-relative name; downloads go through the API.

mod pdf;

#[cfg(any(test, feature = "test-util"))]
pub use pdf::sample_pdf;
pub use pdf::validate_pdf;

use crate::errors::{AppError, Result};
use std::path::{Component, Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Filesystem store for uploaded PDFs
#[derive(Debug, Clone)]
pub struct DocumentStorage {
    root: PathBuf,
}

impl DocumentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a PDF and return its storage-relative name
    pub async fn save_pdf(&self, bytes: &[u8]) -> Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let name = format!("{}.pdf", Uuid::new_v4());
        tokio::fs::write(self.root.join(&name), bytes).await?;

        info!(document = %name, size = bytes.len(), "Stored paper document");
        Ok(name)
    }

    /// Read back a stored document
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound {
                resource_type: "document".to_string(),
                id: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Only plain relative names inside the root are accepted
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if name.is_empty() || !plain {
            return Err(AppError::NotFound {
                resource_type: "document".to_string(),
                id: name.to_string(),
            });
        }

        Ok(self.root.join(relative))
    }
}
