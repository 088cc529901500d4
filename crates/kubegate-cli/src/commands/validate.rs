//! Validate command - the full pipeline

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use kubegate_core::RunConfig;
use kubegate_runner::{ToolBinaries, resolve_binaries};
use kubegate_sources::{HttpClient, ToolInstaller, default_cache_dir};

use super::{DiscoveryArgs, WorkDir, block_on, parse_duration};
use crate::display::{ConsoleObserver, print_summary};
use crate::error::{CliError, Result};

#[derive(Args, Debug, Default)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Pipe kustomize output through `flux envsubst`
    #[arg(long, env = "KUBEGATE_FLUX")]
    pub flux: bool,

    /// Fall back to the community CRD catalog for unknown kinds
    #[arg(long, env = "KUBEGATE_CATALOG")]
    pub catalog: bool,

    /// CRD source: repository tree URL, archive URL or raw file URL
    #[arg(long = "crd", value_name = "URL", env = "KUBEGATE_CRDS", value_delimiter = ',')]
    pub crds: Vec<String>,

    /// Substitution variable for flux envsubst, as key:value
    #[arg(long = "env", value_name = "KEY:VALUE", env = "KUBEGATE_ENV", value_delimiter = ',')]
    pub env: Vec<String>,

    /// Validator release to download
    #[arg(long, env = "KUBEGATE_KUBECONFORM_VERSION")]
    pub kubeconform_version: Option<String>,

    /// Flux release to download
    #[arg(long, env = "KUBEGATE_FLUX_VERSION")]
    pub flux_version: Option<String>,

    /// Kubernetes version of the built-in schemas
    #[arg(long, env = "KUBEGATE_KUBERNETES_VERSION")]
    pub kubernetes_version: Option<String>,

    /// Kinds to skip entirely
    #[arg(long = "skip", value_name = "KIND", value_delimiter = ',')]
    pub skip_kinds: Vec<String>,

    /// Fail on resources no schema can be found for
    #[arg(long)]
    pub fail_on_missing_schemas: bool,

    /// Use this validator binary instead of downloading one
    #[arg(long, value_name = "PATH", env = "KUBEGATE_KUBECONFORM_BIN")]
    pub kubeconform_bin: Option<PathBuf>,

    /// Use this kustomize binary instead of the one on PATH
    #[arg(long, value_name = "PATH", env = "KUBEGATE_KUSTOMIZE_BIN")]
    pub kustomize_bin: Option<PathBuf>,

    /// Use this flux binary instead of downloading one
    #[arg(long, value_name = "PATH", env = "KUBEGATE_FLUX_BIN")]
    pub flux_bin: Option<PathBuf>,

    /// Abort the run after this long (e.g. 90s, 10m)
    #[arg(long, value_parser = parse_duration, env = "KUBEGATE_TIMEOUT")]
    pub timeout: Option<Duration>,

    /// Keep CRD sources and converted schemas in this directory
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

impl ValidateArgs {
    /// Config file overlaid with every flag
    pub fn load_config(&self) -> Result<RunConfig> {
        let mut config = self.discovery.load_config()?;

        if self.flux {
            config.flux = true;
        }
        if self.catalog {
            config.catalog = true;
        }
        if !self.crds.is_empty() {
            config.crds = self.crds.clone();
        }
        if !self.env.is_empty() {
            config.env = self.env.clone();
        }
        if let Some(version) = &self.kubeconform_version {
            config.kubeconform_version = version.clone();
        }
        if let Some(version) = &self.flux_version {
            config.flux_version = version.clone();
        }
        if let Some(version) = &self.kubernetes_version {
            config.validator.kubernetes_version = Some(version.clone());
        }
        if !self.skip_kinds.is_empty() {
            config.validator.skip_kinds = self.skip_kinds.clone();
        }
        if self.fail_on_missing_schemas {
            config.validator.ignore_missing_schemas = false;
        }
        if self.kubeconform_bin.is_some() {
            config.tools.kubeconform = self.kubeconform_bin.clone();
        }
        if self.kustomize_bin.is_some() {
            config.tools.kustomize = self.kustomize_bin.clone();
        }
        if self.flux_bin.is_some() {
            config.tools.flux = self.flux_bin.clone();
        }
        if self.timeout.is_some() {
            config.timeout = self.timeout;
        }

        Ok(config)
    }
}

pub fn run(args: &ValidateArgs) -> Result<()> {
    let config = args.load_config()?;
    config.validate()?;

    if !config.manifests.is_dir() {
        return Err(CliError::Io {
            message: format!("manifests directory not found: {}", config.manifests.display()),
        });
    }
    if config.flux && !config.kustomize {
        tracing::warn!("--flux only applies together with --kustomize");
    }

    let work_dir = WorkDir::create(args.work_dir.as_deref())?;

    let report = block_on(config.timeout, async {
        let client = HttpClient::new()?;
        let installer = ToolInstaller::new(default_cache_dir(), client.clone());
        let binaries: ToolBinaries = resolve_binaries(&config, &installer).await?;
        tracing::debug!(?binaries, "resolved tools");

        let mut observer = ConsoleObserver;
        let report = kubegate_runner::run(
            &config,
            client,
            work_dir.path(),
            binaries.into_toolset(),
            &mut observer,
        )
        .await?;
        Ok::<_, CliError>(report.into_result()?)
    })?;

    print_summary(&report);
    Ok(())
}
