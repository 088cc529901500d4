//! CLI commands

pub mod locate;
pub mod schemas;
pub mod validate;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use kubegate_core::{RunConfig, parse_exclusions};
use kubegate_runner::RunnerError;

use crate::error::{CliError, Result};

/// Flags shared by every command that walks a manifests tree
#[derive(Args, Debug, Default)]
pub struct DiscoveryArgs {
    /// Root directory of the manifests
    pub dir: Option<PathBuf>,

    /// Config file (default: .kubegate.yaml in the working directory, if present)
    #[arg(short, long, env = "KUBEGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Validate kustomization roots instead of plain YAML files
    #[arg(long, env = "KUBEGATE_KUSTOMIZE")]
    pub kustomize: bool,

    /// Comma separated exclusion globs, matched against paths relative to the root
    #[arg(long, env = "KUBEGATE_EXCLUDE")]
    pub exclude: Option<String>,
}

impl DiscoveryArgs {
    /// Load the config file and overlay these flags on top
    pub fn load_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load_from(path).map_err(|e| CliError::Config {
                message: format!("{}: {}", path.display(), e),
                help: None,
            })?,
            None => RunConfig::discover(Path::new("."))?,
        };

        if let Some(dir) = &self.dir {
            config.manifests = dir.clone();
        }
        if self.kustomize {
            config.kustomize = true;
        }
        if let Some(exclude) = &self.exclude {
            config.exclude = parse_exclusions(exclude);
        }

        Ok(config)
    }
}

/// Parse a human readable duration such as `90s` or `10m`
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

/// Run `future` to completion on a fresh runtime, racing it against Ctrl-C
/// and the optional timeout. Whatever loses the race is dropped, which
/// kills any child process it had spawned.
pub fn block_on<F, T>(timeout: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("failed to start runtime: {}", e)))?;

    rt.block_on(async {
        let deadline = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = future => result,
            _ = tokio::signal::ctrl_c() => Err(RunnerError::Cancelled.into()),
            _ = deadline => Err(RunnerError::Timeout(timeout.unwrap_or_default()).into()),
        }
    })
}

/// Scratch directory for one run, removed on drop
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Use `path` when given (and keep it), otherwise a fresh temp directory
    pub fn create(path: Option<&Path>) -> Result<Self> {
        let (path, keep) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (
                std::env::temp_dir().join(format!("kubegate-{}", std::process::id())),
                false,
            ),
        };
        std::fs::create_dir_all(&path)?;
        tracing::debug!(path = %path.display(), "work directory");
        Ok(Self { path, keep })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("ci.yaml");
        std::fs::write(
            &config_path,
            "manifests: ./clusters\nexclude:\n  - \"*/terraform/*\"\ncatalog: true\n",
        )
        .unwrap();

        let args = DiscoveryArgs {
            dir: Some(PathBuf::from("./apps")),
            config: Some(config_path),
            kustomize: true,
            exclude: Some("./terraform, .pre-commit-config.yaml,".to_string()),
        };
        let config = args.load_config().unwrap();

        assert_eq!(config.manifests, PathBuf::from("./apps"));
        assert!(config.kustomize);
        assert!(config.catalog);
        assert_eq!(config.exclude, vec!["./terraform", ".pre-commit-config.yaml"]);
    }

    #[test]
    fn test_missing_config_file() {
        let args = DiscoveryArgs {
            config: Some(PathBuf::from("/nonexistent/kubegate.yaml")),
            ..Default::default()
        };
        let err = args.load_config().unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_timeout_interrupts() {
        let result: Result<()> = block_on(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        assert!(matches!(result, Err(CliError::Interrupted { .. })));
    }
}
