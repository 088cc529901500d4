//! External tools the orchestrator drives
//!
//! Each tool is a trait so runs can be exercised with fakes. The process
//! backed implementations spawn with `kill_on_drop`, so dropping a pending
//! call stops the child.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use kubegate_core::EnvVar;

use crate::error::{Result, RunnerError};

/// What one tool invocation printed and how it exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr, for reporting
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }

    fn from_process(tool: &str, output: std::process::Output) -> Self {
        let out = Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(tool, status = ?output.status.code(), "tool finished");
        out
    }
}

/// Input handed to the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorInput {
    /// A manifest file read by the validator itself
    File(PathBuf),
    /// A multi-document stream piped to the validator's stdin
    Stream(Vec<u8>),
}

/// The schema validator
#[async_trait]
pub trait ManifestValidator: Send + Sync {
    /// Validate `input`; `args` are the flags built from options and schema locations
    async fn validate(&self, input: ValidatorInput, args: &[String]) -> Result<ToolOutput>;
}

/// Builds a kustomize overlay directory into one manifest stream
#[async_trait]
pub trait KustomizeBuilder: Send + Sync {
    async fn build(&self, dir: &Path) -> Result<ToolOutput>;
}

/// Substitutes `${var}` placeholders in a manifest stream
#[async_trait]
pub trait EnvSubstituter: Send + Sync {
    async fn substitute(&self, stream: &[u8], env: &[EnvVar]) -> Result<ToolOutput>;
}

fn spawn_error(tool: &str, binary: &Path, e: std::io::Error) -> RunnerError {
    RunnerError::Tool {
        tool: tool.to_string(),
        message: format!("{}: {}", binary.display(), e),
    }
}

/// Run a prepared command, feeding `stdin` when given
async fn run(tool: &str, binary: &Path, mut command: Command, stdin: Option<&[u8]>) -> Result<ToolOutput> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| spawn_error(tool, binary, e))?;

    // stdin is written while stdout is being read
    let writer = match (stdin, child.stdin.take()) {
        (Some(data), Some(mut pipe)) => {
            let data = data.to_vec();
            Some(tokio::spawn(async move { pipe.write_all(&data).await }))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| spawn_error(tool, binary, e))?;

    if let Some(writer) = writer {
        // a child exiting early closes its stdin; the exit status tells the story
        if let Ok(Err(e)) = writer.await {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(spawn_error(tool, binary, e));
            }
        }
    }

    Ok(ToolOutput::from_process(tool, output))
}

/// `kubeconform` subprocess
#[derive(Debug, Clone)]
pub struct Kubeconform {
    binary: PathBuf,
}

impl Kubeconform {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ManifestValidator for Kubeconform {
    async fn validate(&self, input: ValidatorInput, args: &[String]) -> Result<ToolOutput> {
        let mut command = Command::new(&self.binary);
        command.args(args);

        match input {
            ValidatorInput::File(path) => {
                command.arg(path);
                run("kubeconform", &self.binary, command, None).await
            }
            ValidatorInput::Stream(data) => {
                command.arg("-");
                run("kubeconform", &self.binary, command, Some(&data)).await
            }
        }
    }
}

/// `kustomize build` subprocess
#[derive(Debug, Clone)]
pub struct Kustomize {
    binary: PathBuf,
}

impl Kustomize {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for Kustomize {
    fn default() -> Self {
        Self::new("kustomize")
    }
}

#[async_trait]
impl KustomizeBuilder for Kustomize {
    async fn build(&self, dir: &Path) -> Result<ToolOutput> {
        let mut command = Command::new(&self.binary);
        command.arg("build").arg(dir);
        run("kustomize", &self.binary, command, None).await
    }
}

/// `flux envsubst` subprocess; variables are passed as process environment
#[derive(Debug, Clone)]
pub struct FluxEnvsubst {
    binary: PathBuf,
}

impl FluxEnvsubst {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl EnvSubstituter for FluxEnvsubst {
    async fn substitute(&self, stream: &[u8], env: &[EnvVar]) -> Result<ToolOutput> {
        let mut command = Command::new(&self.binary);
        command.arg("envsubst");
        command.envs(env.iter().map(|v| (v.key.as_str(), v.value.as_str())));
        run("flux", &self.binary, command, Some(stream)).await
    }
}

/// The three tools a run may need
pub struct Toolset {
    pub validator: Box<dyn ManifestValidator>,
    pub kustomize: Box<dyn KustomizeBuilder>,
    pub envsubst: Option<Box<dyn EnvSubstituter>>,
}

impl Toolset {
    /// Process-backed tools at the given paths
    pub fn processes(kubeconform: PathBuf, kustomize: PathBuf, flux: Option<PathBuf>) -> Self {
        Self {
            validator: Box::new(Kubeconform::new(kubeconform)),
            kustomize: Box::new(Kustomize::new(kustomize)),
            envsubst: flux.map(|f| Box::new(FluxEnvsubst::new(f)) as Box<dyn EnvSubstituter>),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_validator_stream_goes_to_stdin() {
        let temp = TempDir::new().unwrap();
        // echo args, then stdin
        let bin = script(temp.path(), "kubeconform", r#"echo "$@"; cat"#);

        let out = Kubeconform::new(bin)
            .validate(
                ValidatorInput::Stream(b"kind: Pod\n".to_vec()),
                &["-summary".to_string()],
            )
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.stdout, "-summary -\nkind: Pod\n");
    }

    #[tokio::test]
    async fn test_exit_status_is_reported() {
        let temp = TempDir::new().unwrap();
        let bin = script(temp.path(), "kustomize", "echo 'bad overlay' >&2; exit 1");

        let out = Kustomize::new(bin).build(temp.path()).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.combined(), "bad overlay");
    }

    #[tokio::test]
    async fn test_envsubst_receives_variables() {
        let temp = TempDir::new().unwrap();
        let bin = script(temp.path(), "flux", r#"read line; echo "$line $cluster""#);

        let env = vec![EnvVar {
            key: "cluster".to_string(),
            value: "staging".to_string(),
        }];
        let out = FluxEnvsubst::new(bin)
            .substitute(b"name:\n", &env)
            .await
            .unwrap();
        assert_eq!(out.stdout, "name: staging\n");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = Kustomize::new("/nonexistent/kustomize")
            .build(Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Tool { .. }));
    }
}
