//! Path-checked file operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::policy::PathAuthority;

/// Read, write and delete-tree operations gated by a [`PathAuthority`].
///
/// Each operation resolves its input first and then acts on the resolved
/// path. A failed check returns [`GatewayError::AccessDenied`] before any
/// storage is touched.
#[derive(Clone, Debug)]
pub struct FileOperations {
    authority: Arc<PathAuthority>,
}

impl FileOperations {
    /// Create file operations over the given authority.
    pub fn new(authority: Arc<PathAuthority>) -> Self {
        Self { authority }
    }

    /// The authority used for every check.
    pub fn authority(&self) -> &Arc<PathAuthority> {
        &self.authority
    }

    /// Read a file as UTF-8 text.
    pub async fn read(&self, path: impl AsRef<Path>) -> Result<String, GatewayError> {
        let resolved = self.authority.resolve_authorized(path.as_ref())?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| GatewayError::io(format!("Error reading {}", resolved.display()), e))
    }

    /// Write `content` to a file, creating parent directories as needed.
    ///
    /// Returns the resolved path that was written.
    pub async fn write(
        &self,
        path: impl AsRef<Path>,
        content: &str,
    ) -> Result<PathBuf, GatewayError> {
        let resolved = self.authority.resolve_authorized(path.as_ref())?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GatewayError::io(format!("Error creating {}", parent.display()), e)
            })?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| GatewayError::io(format!("Error writing {}", resolved.display()), e))?;
        tracing::debug!(path = %resolved.display(), bytes = content.len(), "file written");
        Ok(resolved)
    }

    /// Recursively delete a directory and everything in it.
    ///
    /// Not transactional: a failure part way through leaves a partially
    /// removed tree. Deleting a path that does not exist is an error.
    pub async fn delete_tree(&self, path: impl AsRef<Path>) -> Result<PathBuf, GatewayError> {
        let resolved = self.authority.resolve_authorized(path.as_ref())?;
        tokio::fs::remove_dir_all(&resolved)
            .await
            .map_err(|e| GatewayError::io(format!("Error deleting {}", resolved.display()), e))?;
        tracing::info!(path = %resolved.display(), "folder deleted");
        Ok(resolved)
    }
}
