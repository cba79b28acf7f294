//! Disposable per-request workspace directories

use crate::error::SandboxError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Unique sandbox identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(pub uuid::Uuid);

impl SandboxId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A workspace owned by exactly one request.
///
/// Deliberately not `Clone`: [`SandboxManager::destroy`] consumes it, so a
/// sandbox can be destroyed only once.
#[derive(Debug)]
pub struct Sandbox {
    id: SandboxId,
    root: PathBuf,
    created_at: DateTime<Utc>,
}

impl Sandbox {
    pub fn id(&self) -> SandboxId {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Allocates and destroys sandboxes under a common root.
#[derive(Debug, Clone)]
pub struct SandboxManager {
    root: PathBuf,
}

impl SandboxManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, uniquely named directory.
    ///
    /// The directory name combines a sanitized `request_id` with a random
    /// UUID, so ids are never reused even for repeated request ids.
    pub async fn create(&self, request_id: &str) -> Result<Sandbox, SandboxError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| SandboxError::Unwritable {
                path: self.root.clone(),
                source,
            })?;
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| SandboxError::io(&self.root, e))?;

        let id = SandboxId::new();
        let prefix = sanitize(request_id);
        let dir_name = if prefix.is_empty() {
            id.to_string()
        } else {
            format!("{prefix}-{id}")
        };
        let path = root.join(dir_name);

        // create_dir (not create_dir_all) so an existing directory is an error
        tokio::fs::create_dir(&path)
            .await
            .map_err(|source| SandboxError::Unwritable {
                path: path.clone(),
                source,
            })?;

        info!(sandbox_id = %id, path = %path.display(), "Sandbox created");
        Ok(Sandbox {
            id,
            root: path,
            created_at: Utc::now(),
        })
    }

    /// Recursively remove a sandbox. Failures are logged, never raised.
    ///
    /// Returns whether the directory is gone afterwards.
    pub async fn destroy(&self, sandbox: Sandbox) -> bool {
        let Sandbox { id, root, .. } = sandbox;
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {
                debug!(sandbox_id = %id, "Sandbox destroyed");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(sandbox_id = %id, path = %root.display(), "Sandbox already gone");
                true
            }
            Err(e) => {
                warn!(
                    sandbox_id = %id,
                    path = %root.display(),
                    error = %e,
                    "Failed to destroy sandbox"
                );
                false
            }
        }
    }
}

fn sanitize(request_id: &str) -> String {
    request_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(48)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_create_and_destroy() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path().join("sandboxes"));

        let sandbox = manager.create("project-42").await.unwrap();
        let path = sandbox.root().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("project-42-"));

        assert!(manager.destroy(sandbox).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_ids_unique_for_same_request() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let a = manager.create("same").await.unwrap();
        let b = manager.create("same").await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.root(), b.root());
        manager.destroy(a).await;
        manager.destroy(b).await;
    }

    #[tokio::test]
    async fn test_request_id_is_sanitized() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let sandbox = manager.create("../../etc/passwd").await.unwrap();
        assert!(sandbox.root().starts_with(tmp.path().canonicalize().unwrap()));
        manager.destroy(sandbox).await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_destroy_missing_dir_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SandboxManager::new(tmp.path());
        let sandbox = manager.create("gone").await.unwrap();
        std::fs::remove_dir_all(sandbox.root()).unwrap();
        assert!(manager.destroy(sandbox).await);
        assert!(logs_contain("Sandbox already gone"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwritable_root() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();
        let manager = SandboxManager::new(blocker.join("sandboxes"));
        let err = manager.create("x").await.unwrap_err();
        assert!(matches!(err, SandboxError::Unwritable { .. }));
    }
}
