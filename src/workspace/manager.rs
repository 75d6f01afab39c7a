use std::path::{Path, PathBuf};

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};

/// Lifecycle of a workspace within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Acquired,
    Populated,
    InstructionsWritten,
    Running,
    Released,
}

/// An exclusively owned scratch directory for a single run.
///
/// Dropping a workspace that was never released removes it synchronously,
/// so an abandoned run cannot leak a checkout.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    state: WorkspaceState,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    pub(crate) fn advance(&mut self, state: WorkspaceState) {
        tracing::debug!(
            workspace = %self.path.display(),
            from = ?self.state,
            to = ?state,
            "Workspace state change"
        );
        self.state = state;
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.state == WorkspaceState::Released {
            return;
        }
        tracing::warn!(
            workspace = %self.path.display(),
            state = ?self.state,
            "Workspace dropped without release, removing"
        );
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    workspace = %self.path.display(),
                    error = %e,
                    "Failed to remove abandoned workspace"
                );
            }
        }
    }
}

/// Allocates and removes per-run workspace directories.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
    prefix: String,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config
                .base_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            prefix: config.prefix.clone(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create a fresh, uniquely named, owner-only directory.
    pub async fn acquire(&self) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;

        let base_dir = self.base_dir.clone();
        let prefix = self.prefix.clone();

        let path = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            // The random suffix makes concurrent acquisitions collision-free;
            // creation fails rather than reusing an existing name.
            let dir = tempfile::Builder::new()
                .prefix(&prefix)
                .keep(true)
                .tempdir_in(&base_dir)
                .map_err(|e| AppError::Workspace(format!("Failed to allocate workspace: {e}")))?;
            let path = dir.path().to_path_buf();
            restrict_to_owner(&path)?;
            Ok(path)
        })
        .await
        .map_err(|e| AppError::Workspace(format!("Acquire task panicked: {e}")))??;

        tracing::info!(workspace = %path.display(), "Workspace acquired");

        Ok(Workspace {
            path,
            state: WorkspaceState::Acquired,
        })
    }

    /// Remove the workspace tree.
    ///
    /// Releasing twice, or releasing a directory that is already gone, only
    /// logs a warning. Returns whether anything was removed.
    pub async fn release(&self, workspace: &mut Workspace) -> bool {
        if workspace.state == WorkspaceState::Released {
            tracing::warn!(
                workspace = %workspace.path.display(),
                "Workspace already released"
            );
            return false;
        }

        let removed = match tokio::fs::remove_dir_all(&workspace.path).await {
            Ok(()) => {
                tracing::info!(workspace = %workspace.path.display(), "Workspace released");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    workspace = %workspace.path.display(),
                    "Workspace directory was already gone"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    workspace = %workspace.path.display(),
                    error = %AppError::Workspace(e.to_string()),
                    "Failed to cleanup workspace"
                );
                false
            }
        };

        workspace.advance(WorkspaceState::Released);
        removed
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| AppError::Workspace(format!("Failed to restrict workspace: {e}")))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}
