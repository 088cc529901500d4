//! Repository cloning

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::classify::GitTree;
use crate::error::{Result, SourceError};

/// Clones a repository branch into a local directory
#[async_trait]
pub trait RepositoryCloner: Send + Sync {
    /// Shallow-clone `tree.clone_url` at `tree.branch` into `dest`
    async fn clone_branch(&self, tree: &GitTree, dest: &Path) -> Result<()>;
}

/// Clones with the `git` binary
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl RepositoryCloner for GitCli {
    async fn clone_branch(&self, tree: &GitTree, dest: &Path) -> Result<()> {
        let failed = |message: String| SourceError::CloneFailed {
            url: tree.clone_url.clone(),
            branch: tree.branch.clone(),
            message,
        };

        tracing::debug!(url = %tree.clone_url, branch = %tree.branch, "cloning repository");

        let output = tokio::process::Command::new(&self.binary)
            .args(["clone", "--quiet", "--depth", "1", "--branch"])
            .arg(&tree.branch)
            .arg("--")
            .arg(&tree.clone_url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| failed(format!("failed to run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(stderr.trim().to_string()));
        }

        Ok(())
    }
}
