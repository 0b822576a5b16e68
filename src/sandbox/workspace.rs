//! Scratch directory for one isolated execution

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

/// Temporary directory that is removed when dropped
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh, empty workspace
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("grader-")
            .tempdir()
            .context("Failed to create workspace directory")?;
        debug!("Created workspace at {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file into the workspace and return its full path
    pub async fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}
