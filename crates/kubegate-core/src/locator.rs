//! Manifest discovery
//!
//! [`ManifestLocator`] walks a manifests root depth-first and yields the files
//! to validate. Directories matching an exclusion rule are pruned before they
//! are descended into, so nothing below an excluded tree is ever returned.
//!
//! Exclusion rules are `glob` patterns where `*` may cross `/`, in the spirit
//! of `find -path`. Each candidate is tested in three spellings: the path
//! relative to the root (`infra/terraform`), the same with a `./` prefix
//! (`./infra/terraform`) and its base name (`terraform`). `*/terraform/*`
//! therefore drops every file below any `terraform` directory that is not
//! the root itself, `./terraform` prunes only the top-level one, and
//! `.pre-commit-config.yaml` drops that file wherever it lives.

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{CoreError, Result};

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// What kind of files the locator looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocateMode {
    /// Every `*.yaml` / `*.yml` file
    #[default]
    Plain,
    /// Every `kustomization.yaml` / `kustomization.yml` file
    Kustomize,
}

impl LocateMode {
    /// Base-name patterns a file must match to be returned
    pub fn inclusion_patterns(self) -> &'static [&'static str] {
        match self {
            LocateMode::Plain => &["*.yaml", "*.yml"],
            LocateMode::Kustomize => &["kustomization.yaml", "kustomization.yml"],
        }
    }

    fn processing_mode(self) -> ProcessingMode {
        match self {
            LocateMode::Plain => ProcessingMode::Plain,
            LocateMode::Kustomize => ProcessingMode::KustomizationRoot,
        }
    }
}

/// How a located file is turned into validator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    /// The file itself is the document to validate
    Plain,
    /// The directory holding the file is a kustomize build input
    KustomizationRoot,
}

/// A file returned by the locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFile {
    /// Path as found by the walk (rooted at the locator root)
    pub path: PathBuf,
    /// Path relative to the locator root
    pub relative: PathBuf,
    pub mode: ProcessingMode,
}

impl ManifestFile {
    /// What downstream processing consumes: the file for plain manifests,
    /// its containing directory for kustomization roots.
    pub fn source(&self) -> &Path {
        match self.mode {
            ProcessingMode::Plain => &self.path,
            ProcessingMode::KustomizationRoot => self.path.parent().unwrap_or(Path::new(".")),
        }
    }
}

/// Compiled exclusion patterns, ORed together
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    patterns: Vec<Pattern>,
}

impl ExclusionRules {
    /// Compile a set of exclusion patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let raw = raw.as_ref().trim();
                let normalized = raw.trim_end_matches('/');
                Pattern::new(normalized).map_err(|e| CoreError::InvalidPattern {
                    pattern: raw.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a root-relative path is excluded
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }

        let rel = slash_path(relative);
        let dotted = format!("./{}", rel);
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.patterns.iter().any(|p| {
            p.matches_with(&rel, PATH_MATCH)
                || p.matches_with(&dotted, PATH_MATCH)
                || (!name.is_empty() && p.matches_with(&name, NAME_MATCH))
        })
    }
}

/// Walks a manifests root for files to validate
#[derive(Debug, Clone)]
pub struct ManifestLocator {
    root: PathBuf,
    mode: LocateMode,
    exclusions: ExclusionRules,
    inclusions: Vec<Pattern>,
}

impl ManifestLocator {
    pub fn new(root: impl Into<PathBuf>, mode: LocateMode, exclusions: ExclusionRules) -> Self {
        let inclusions = mode
            .inclusion_patterns()
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        Self {
            root: root.into(),
            mode,
            exclusions,
            inclusions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> LocateMode {
        self.mode
    }

    /// Walk the tree.
    ///
    /// The walk is lazy and sorted by file name at every level, so two calls
    /// over an unchanged tree yield the same sequence. Each call starts a new
    /// walk.
    pub fn locate(&self) -> Result<impl Iterator<Item = Result<ManifestFile>> + '_> {
        if !self.root.is_dir() {
            return Err(CoreError::ManifestsNotFound {
                path: self.root.display().to_string(),
            });
        }

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_pruned(entry));

        Ok(walker.filter_map(move |entry| match entry {
            Ok(entry) => self.to_manifest(&entry).map(Ok),
            Err(e) => Some(Err(CoreError::Walk {
                path: e
                    .path()
                    .unwrap_or(self.root.as_path())
                    .display()
                    .to_string(),
                message: e.to_string(),
            })),
        }))
    }

    /// Collect the whole walk, failing on the first error
    pub fn collect(&self) -> Result<Vec<ManifestFile>> {
        self.locate()?.collect()
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn is_pruned(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let excluded = self.exclusions.is_excluded(self.relative(entry.path()));
        if excluded {
            tracing::debug!(path = %entry.path().display(), "excluded");
        }
        excluded
    }

    fn to_manifest(&self, entry: &DirEntry) -> Option<ManifestFile> {
        if !entry.file_type().is_file() {
            return None;
        }

        let name = entry.file_name().to_string_lossy();
        if !self.inclusions.iter().any(|p| p.matches_with(&name, NAME_MATCH)) {
            return None;
        }

        Some(ManifestFile {
            path: entry.path().to_path_buf(),
            relative: self.relative(entry.path()).to_path_buf(),
            mode: self.mode.processing_mode(),
        })
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
