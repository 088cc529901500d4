//! Materialization of classified CRD sources into local directories
//!
//! Every source gets its own directory `<root>/<index>`, numbered in input
//! order, so sources never collide.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::archive::{self, Identification};
use crate::classify::{GitTree, SchemaSource, SourceKind};
use crate::error::{Result, SourceError};
use crate::git::{GitCli, RepositoryCloner};
use crate::http::HttpClient;

/// File name used when a raw source URL has no usable last segment
const FALLBACK_RAW_NAME: &str = "source.yaml";

/// Local copy of one CRD source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedSchemaDir {
    pub index: usize,
    pub path: PathBuf,
    pub locator: String,
}

/// Fetches CRD sources into numbered directories under a root
pub struct SchemaMaterializer {
    root: PathBuf,
    client: HttpClient,
    cloner: Arc<dyn RepositoryCloner>,
}

impl SchemaMaterializer {
    pub fn new(root: impl Into<PathBuf>, client: HttpClient) -> Self {
        Self {
            root: root.into(),
            client,
            cloner: Arc::new(GitCli::default()),
        }
    }

    pub fn with_cloner(mut self, cloner: Arc<dyn RepositoryCloner>) -> Self {
        self.cloner = cloner;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materialize every source in order. The first failure aborts the set.
    pub async fn materialize(&self, sources: &[SchemaSource]) -> Result<Vec<MaterializedSchemaDir>> {
        let mut dirs = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            dirs.push(self.materialize_one(index, source).await?);
        }
        info!(count = dirs.len(), root = %self.root.display(), "materialized CRD sources");
        Ok(dirs)
    }

    pub async fn materialize_one(
        &self,
        index: usize,
        source: &SchemaSource,
    ) -> Result<MaterializedSchemaDir> {
        let dest = self.root.join(index.to_string());
        if tokio::fs::try_exists(&dest).await? {
            tokio::fs::remove_dir_all(&dest).await?;
        }
        tokio::fs::create_dir_all(&self.root).await?;

        debug!(index, source = %source, dest = %dest.display(), "materializing");

        match &source.kind {
            SourceKind::Repository(tree) => self.from_repository(tree, &source.locator, &dest).await?,
            SourceKind::Archive => self.from_archive(&source.locator, &dest).await?,
            SourceKind::RawFile => self.from_raw_file(&source.locator, &dest).await?,
        }

        Ok(MaterializedSchemaDir {
            index,
            path: dest,
            locator: source.locator.clone(),
        })
    }

    async fn from_repository(&self, tree: &GitTree, locator: &str, dest: &Path) -> Result<()> {
        let checkout = self.root.join(format!(".clone-{}", dest_name(dest)));
        if tokio::fs::try_exists(&checkout).await? {
            tokio::fs::remove_dir_all(&checkout).await?;
        }

        let result = self.project_subdir(tree, locator, &checkout, dest).await;
        if tokio::fs::try_exists(&checkout).await.unwrap_or(false) {
            let _ = tokio::fs::remove_dir_all(&checkout).await;
        }
        result
    }

    async fn project_subdir(
        &self,
        tree: &GitTree,
        locator: &str,
        checkout: &Path,
        dest: &Path,
    ) -> Result<()> {
        self.cloner.clone_branch(tree, checkout).await?;

        let projected = if tree.subdir.is_empty() {
            checkout.to_path_buf()
        } else {
            checkout.join(&tree.subdir)
        };

        let is_dir = tokio::fs::metadata(&projected)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(SourceError::SubdirNotFound {
                url: locator.to_string(),
                subdir: tree.subdir.clone(),
            });
        }

        tokio::fs::rename(&projected, dest).await?;

        // the whole checkout was projected, git metadata included
        let metadata = dest.join(".git");
        if tokio::fs::try_exists(&metadata).await? {
            tokio::fs::remove_dir_all(&metadata).await?;
        }
        Ok(())
    }

    async fn from_archive(&self, locator: &str, dest: &Path) -> Result<()> {
        let data = self.client.get_bytes(locator).await?;

        let extraction = |message: String| SourceError::Extraction {
            url: locator.to_string(),
            message,
        };

        let format = match archive::identify(&data, true) {
            Ok(Identification::Archive(format)) => format,
            Ok(Identification::Unsupported(format)) => {
                return Err(SourceError::UnsupportedArchive {
                    url: locator.to_string(),
                    format: format.to_string(),
                });
            }
            Ok(Identification::NoMatch) => {
                return Err(extraction("content is no longer an archive".to_string()));
            }
            Err(e) => return Err(extraction(e.to_string())),
        };

        let target = dest.to_path_buf();
        let files = tokio::task::spawn_blocking(move || archive::unpack(&data, format, &target))
            .await
            .map_err(|e| extraction(e.to_string()))?
            .map_err(|e| extraction(e.to_string()))?;

        debug!(source = locator, files = files.len(), "unpacked archive");
        Ok(())
    }

    async fn from_raw_file(&self, locator: &str, dest: &Path) -> Result<()> {
        let name = raw_file_name(locator)?;
        let data = self.client.get_bytes(locator).await?;

        tokio::fs::create_dir_all(dest).await?;
        tokio::fs::write(dest.join(&name), data).await?;
        Ok(())
    }
}

fn dest_name(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Base name of the URL path, used as the raw file's name
fn raw_file_name(locator: &str) -> Result<String> {
    let url = Url::parse(locator).map_err(|e| SourceError::InvalidUrl {
        url: locator.to_string(),
        reason: e.to_string(),
    })?;

    let name = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .filter(|s| *s != "." && *s != "..")
        .unwrap_or(FALLBACK_RAW_NAME);

    Ok(name.to_string())
}
