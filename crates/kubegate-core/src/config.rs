//! Run configuration
//!
//! A run is fully described by [`RunConfig`]. It can be loaded from a YAML
//! file (by default `.kubegate.yaml` in the working directory) and is then
//! overlaid with command line flags by the CLI.
//!
//! ```yaml
//! manifests: ./clusters
//! kustomize: true
//! flux: true
//! exclude:
//!   - "*/terraform/*"
//!   - ".pre-commit-config.yaml"
//! crds:
//!   - https://github.com/fluxcd/flux2/releases/latest/download/crd-schemas.tar.gz
//! env:
//!   - cluster_name:staging
//! timeout: 10m
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::convert::ConvertOptions;
use crate::error::{CoreError, Result};
use crate::locator::ExclusionRules;

/// Config file looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = ".kubegate.yaml";

/// Validator release used when none is configured
pub const DEFAULT_KUBECONFORM_VERSION: &str = "v0.6.7";

/// Flux release used when none is configured
pub const DEFAULT_FLUX_VERSION: &str = "2.5.1";

/// Everything needed to run one validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Root directory walked for manifests
    #[serde(default = "default_manifests")]
    pub manifests: PathBuf,

    /// Validate kustomization roots instead of plain YAML files
    #[serde(default)]
    pub kustomize: bool,

    /// Pipe kustomize output through `flux envsubst`
    #[serde(default)]
    pub flux: bool,

    /// Fall back to the community CRD catalog for unknown kinds
    #[serde(default)]
    pub catalog: bool,

    /// Exclusion globs, matched against paths relative to `manifests`
    #[serde(default)]
    pub exclude: Vec<String>,

    /// CRD source locations (repository tree, archive or single file URLs)
    #[serde(default)]
    pub crds: Vec<String>,

    /// Substitution variables in `key:value` form
    #[serde(default)]
    pub env: Vec<String>,

    /// kubeconform release to install
    #[serde(default = "default_kubeconform_version")]
    pub kubeconform_version: String,

    /// flux release to install when `flux` is enabled
    #[serde(default = "default_flux_version")]
    pub flux_version: String,

    /// Flags forwarded to the validator
    #[serde(default)]
    pub validator: ValidatorOptions,

    /// CRD conversion settings
    #[serde(default)]
    pub conversion: ConvertOptions,

    /// Explicit tool binaries, bypassing installation and PATH lookup
    #[serde(default)]
    pub tools: ToolPaths,

    /// Abort the whole run after this long (e.g. "10m")
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

fn default_manifests() -> PathBuf {
    PathBuf::from(".")
}

fn default_kubeconform_version() -> String {
    DEFAULT_KUBECONFORM_VERSION.to_string()
}

fn default_flux_version() -> String {
    DEFAULT_FLUX_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            manifests: default_manifests(),
            kustomize: false,
            flux: false,
            catalog: false,
            exclude: Vec::new(),
            crds: Vec::new(),
            env: Vec::new(),
            kubeconform_version: default_kubeconform_version(),
            flux_version: default_flux_version(),
            validator: ValidatorOptions::default(),
            conversion: ConvertOptions::default(),
            tools: ToolPaths::default(),
            timeout: None,
        }
    }
}

impl RunConfig {
    /// Parse a config from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load `.kubegate.yaml` from `dir` if present, defaults otherwise
    pub fn discover(dir: &Path) -> Result<Self> {
        let path = dir.join(DEFAULT_CONFIG_FILE);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading config file");
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check every input that can be rejected before any fetch or process
    /// spawn happens.
    pub fn validate(&self) -> Result<()> {
        self.env_vars()?;
        self.exclusion_rules()?;
        check_version("kubeconform", &self.kubeconform_version)?;
        if self.flux {
            check_version("flux", &self.flux_version)?;
        }
        self.conversion.check()?;
        Ok(())
    }

    /// Parsed substitution variables
    pub fn env_vars(&self) -> Result<Vec<EnvVar>> {
        self.env.iter().map(|e| e.parse()).collect()
    }

    /// Compiled exclusion rules
    pub fn exclusion_rules(&self) -> Result<ExclusionRules> {
        ExclusionRules::new(&self.exclude)
    }
}

/// Split a comma separated exclusion string into patterns.
///
/// Whitespace inside entries is removed and empty entries are dropped, so
/// `"./terraform, .gitignore,"` yields `["./terraform", ".gitignore"]`.
pub fn parse_exclusions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.chars().filter(|c| !c.is_whitespace()).collect::<String>())
        .filter(|p| !p.is_empty())
        .collect()
}

fn check_version(tool: &str, version: &str) -> Result<()> {
    let bare = version.strip_prefix('v').unwrap_or(version);
    semver::Version::parse(bare)
        .map(|_| ())
        .map_err(|e| CoreError::InvalidVersion {
            tool: tool.to_string(),
            version: version.to_string(),
            message: e.to_string(),
        })
}

/// Flags forwarded to the validator binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorOptions {
    /// Reject unknown fields (default: true)
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Treat resources without any schema as valid (default: true)
    #[serde(default = "default_true")]
    pub ignore_missing_schemas: bool,

    /// Kubernetes version for the built-in schema catalog
    #[serde(default)]
    pub kubernetes_version: Option<String>,

    /// Kinds the validator skips entirely
    #[serde(default)]
    pub skip_kinds: Vec<String>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            strict: true,
            ignore_missing_schemas: true,
            kubernetes_version: None,
            skip_kinds: Vec::new(),
        }
    }
}

/// Explicit tool locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPaths {
    #[serde(default)]
    pub kubeconform: Option<PathBuf>,
    #[serde(default)]
    pub kustomize: Option<PathBuf>,
    #[serde(default)]
    pub flux: Option<PathBuf>,
}

/// A `key:value` substitution variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

impl FromStr for EnvVar {
    type Err = CoreError;

    fn from_str(entry: &str) -> Result<Self> {
        let parts: Vec<&str> = entry.split(':').collect();
        match parts.as_slice() {
            [key, value] if !key.is_empty() => Ok(Self {
                key: (*key).to_string(),
                value: (*value).to_string(),
            }),
            _ => Err(CoreError::InvalidEnvVar {
                entry: entry.to_string(),
            }),
        }
    }
}

impl fmt::Display for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}
