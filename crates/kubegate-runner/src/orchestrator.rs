//! Validation orchestration
//!
//! Files are processed one at a time in locator order. Each file runs
//! through a small state machine (build, substitute, validate) whose shape
//! depends on its processing mode, and the first failing file ends the run.

use std::path::PathBuf;

use kubegate_core::{CoreError, EnvVar, ManifestFile, ProcessingMode, ValidatorOptions};
use tracing::{debug, info};

use crate::error::{Result, RunnerError};
use crate::schema::{SchemaLocation, validator_args};
use crate::tools::{ToolOutput, Toolset, ValidatorInput};

/// Result of validating one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub path: PathBuf,
    pub outcome: Outcome,
    pub message: String,
}

impl ValidationVerdict {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub verdicts: Vec<ValidationVerdict>,
    /// Tool output of every processed file, concatenated verbatim
    pub output: String,
}

impl RunReport {
    /// True iff every processed file passed
    pub fn is_success(&self) -> bool {
        self.verdicts.iter().all(ValidationVerdict::is_success)
    }

    pub fn failure(&self) -> Option<&ValidationVerdict> {
        self.verdicts.iter().find(|v| !v.is_success())
    }

    /// Turn a failed report into `RunnerError::ValidationFailed`
    pub fn into_result(self) -> Result<Self> {
        match self.failure() {
            Some(failed) => Err(RunnerError::ValidationFailed {
                path: failed.path.clone(),
                message: failed.message.clone(),
            }),
            None => Ok(self),
        }
    }
}

/// Receives progress while a run is going
pub trait RunObserver: Send {
    fn file_started(&mut self, _file: &ManifestFile) {}

    /// Verbatim output of the tool that decided a file's verdict
    fn tool_output(&mut self, _file: &ManifestFile, _output: &str) {}

    fn verdict(&mut self, _verdict: &ValidationVerdict) {}
}

/// Observer that ignores everything
pub struct Silent;

impl RunObserver for Silent {}

/// How a file is turned into validator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// The file goes straight to the validator
    Direct,
    /// `kustomize build` output is piped to the validator
    Kustomize,
    /// `kustomize build | flux envsubst` is piped to the validator
    KustomizeEnvsubst,
}

/// One state of a file's pipeline
enum Step {
    Build(PathBuf),
    Substitute(Vec<u8>),
    Validate(ValidatorInput),
    Done(Outcome, ToolOutput),
}

pub struct ValidationOrchestrator {
    tools: Toolset,
    args: Vec<String>,
    flux_env: Option<Vec<EnvVar>>,
}

impl ValidationOrchestrator {
    pub fn new(tools: Toolset, options: &ValidatorOptions, locations: &[SchemaLocation]) -> Self {
        Self {
            tools,
            args: validator_args(options, locations),
            flux_env: None,
        }
    }

    /// Substitute `env` into kustomize output before validation
    pub fn with_flux(mut self, env: Vec<EnvVar>) -> Self {
        self.flux_env = Some(env);
        self
    }

    /// Arguments every validator call gets
    pub fn validator_args(&self) -> &[String] {
        &self.args
    }

    pub fn pipeline_for(&self, file: &ManifestFile) -> Pipeline {
        match (file.mode, self.flux_env.is_some()) {
            (ProcessingMode::Plain, _) => Pipeline::Direct,
            (ProcessingMode::KustomizationRoot, false) => Pipeline::Kustomize,
            (ProcessingMode::KustomizationRoot, true) => Pipeline::KustomizeEnvsubst,
        }
    }

    /// Validate files in order, stopping at the first failure.
    ///
    /// Locator errors end the run as errors; a failing file ends it with a
    /// report whose last verdict is the failure.
    pub async fn run<I>(&self, files: I, observer: &mut dyn RunObserver) -> Result<RunReport>
    where
        I: IntoIterator<Item = std::result::Result<ManifestFile, CoreError>>,
    {
        let mut report = RunReport::default();

        for file in files {
            let file = file?;
            observer.file_started(&file);

            let (verdict, output) = self.validate_file(&file).await?;
            if !output.is_empty() {
                observer.tool_output(&file, &output);
                report.output.push_str(&output);
                if !output.ends_with('\n') {
                    report.output.push('\n');
                }
            }
            observer.verdict(&verdict);

            let failed = !verdict.is_success();
            report.verdicts.push(verdict);
            if failed {
                info!(path = %file.path.display(), "validation failed, stopping");
                break;
            }
        }

        info!(
            files = report.verdicts.len(),
            success = report.is_success(),
            "run finished"
        );
        Ok(report)
    }

    /// Run one file through its pipeline. Returns the verdict and the
    /// output of the tool that produced it.
    pub async fn validate_file(&self, file: &ManifestFile) -> Result<(ValidationVerdict, String)> {
        let pipeline = self.pipeline_for(file);
        debug!(path = %file.path.display(), ?pipeline, "processing");

        let mut step = match pipeline {
            Pipeline::Direct => Step::Validate(ValidatorInput::File(file.path.clone())),
            Pipeline::Kustomize | Pipeline::KustomizeEnvsubst => {
                Step::Build(file.source().to_path_buf())
            }
        };

        let (outcome, output) = loop {
            step = match step {
                Step::Build(dir) => {
                    let built = self.tools.kustomize.build(&dir).await?;
                    match (built.success, pipeline) {
                        (false, _) => Step::Done(Outcome::Failure, built),
                        (true, Pipeline::KustomizeEnvsubst) => {
                            Step::Substitute(built.stdout.into_bytes())
                        }
                        (true, _) => Step::Validate(ValidatorInput::Stream(built.stdout.into_bytes())),
                    }
                }
                Step::Substitute(stream) => {
                    let substituted = self.substitute(&stream).await?;
                    if substituted.success {
                        Step::Validate(ValidatorInput::Stream(substituted.stdout.into_bytes()))
                    } else {
                        Step::Done(Outcome::Failure, substituted)
                    }
                }
                Step::Validate(input) => {
                    let validated = self.tools.validator.validate(input, &self.args).await?;
                    let outcome = if validated.success {
                        Outcome::Success
                    } else {
                        Outcome::Failure
                    };
                    Step::Done(outcome, validated)
                }
                Step::Done(outcome, output) => break (outcome, output),
            };
        };

        let verdict = ValidationVerdict {
            path: file.path.clone(),
            outcome,
            message: output.combined(),
        };
        let text = match outcome {
            Outcome::Success => output.stdout,
            Outcome::Failure => output.combined(),
        };
        Ok((verdict, text))
    }

    async fn substitute(&self, stream: &[u8]) -> Result<ToolOutput> {
        let envsubst = self
            .tools
            .envsubst
            .as_ref()
            .ok_or_else(|| RunnerError::Tool {
                tool: "flux".to_string(),
                message: "flux substitution requested but no flux binary configured".to_string(),
            })?;
        let env = self.flux_env.as_deref().unwrap_or_default();
        envsubst.substitute(stream, env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EnvSubstituter, KustomizeBuilder, ManifestValidator};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<String>>>;

    /// Fails any input containing `invalid`
    struct FakeValidator {
        calls: Calls,
    }

    #[async_trait]
    impl ManifestValidator for FakeValidator {
        async fn validate(&self, input: ValidatorInput, _args: &[String]) -> Result<ToolOutput> {
            let content = match &input {
                ValidatorInput::File(path) => {
                    self.calls.lock().unwrap().push(format!("validate {}", path.display()));
                    std::fs::read_to_string(path).unwrap_or_default()
                }
                ValidatorInput::Stream(data) => {
                    let text = String::from_utf8_lossy(data).into_owned();
                    self.calls.lock().unwrap().push(format!("validate - {}", text.trim()));
                    text
                }
            };
            if content.contains("invalid") {
                Ok(ToolOutput::failed(
                    "Summary: 1 resource found - Valid: 0, Invalid: 1\n",
                    "",
                ))
            } else {
                Ok(ToolOutput::ok(
                    "Summary: 1 resource found - Valid: 1, Invalid: 0\n",
                ))
            }
        }
    }

    /// Emits `built <dir name>`, or the contents of a `build.out` file in the dir
    struct FakeKustomize {
        calls: Calls,
    }

    #[async_trait]
    impl KustomizeBuilder for FakeKustomize {
        async fn build(&self, dir: &Path) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push(format!("build {}", dir.display()));
            if dir.ends_with("broken") {
                return Ok(ToolOutput::failed("", "Error: accumulating resources"));
            }
            let stream = std::fs::read_to_string(dir.join("build.out"))
                .unwrap_or_else(|_| "kind: ConfigMap\n".to_string());
            Ok(ToolOutput::ok(stream))
        }
    }

    struct FakeEnvsubst {
        calls: Calls,
    }

    #[async_trait]
    impl EnvSubstituter for FakeEnvsubst {
        async fn substitute(&self, stream: &[u8], env: &[EnvVar]) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push("envsubst".to_string());
            let mut text = String::from_utf8_lossy(stream).into_owned();
            for var in env {
                text = text.replace(&format!("${{{}}}", var.key), &var.value);
            }
            Ok(ToolOutput::ok(text))
        }
    }

    fn toolset(calls: &Calls) -> Toolset {
        Toolset {
            validator: Box::new(FakeValidator {
                calls: calls.clone(),
            }),
            kustomize: Box::new(FakeKustomize {
                calls: calls.clone(),
            }),
            envsubst: Some(Box::new(FakeEnvsubst {
                calls: calls.clone(),
            })),
        }
    }

    fn orchestrator(calls: &Calls) -> ValidationOrchestrator {
        ValidationOrchestrator::new(
            toolset(calls),
            &ValidatorOptions::default(),
            &[SchemaLocation::Default],
        )
    }

    fn plain(path: &Path) -> std::result::Result<ManifestFile, CoreError> {
        Ok(ManifestFile {
            path: path.to_path_buf(),
            relative: path.to_path_buf(),
            mode: ProcessingMode::Plain,
        })
    }

    fn kustomization(dir: &Path) -> std::result::Result<ManifestFile, CoreError> {
        Ok(ManifestFile {
            path: dir.join("kustomization.yaml"),
            relative: dir.join("kustomization.yaml"),
            mode: ProcessingMode::KustomizationRoot,
        })
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<PathBuf>,
        outputs: Vec<String>,
    }

    impl RunObserver for Recorder {
        fn file_started(&mut self, file: &ManifestFile) {
            self.started.push(file.path.clone());
        }

        fn tool_output(&mut self, _file: &ManifestFile, output: &str) {
            self.outputs.push(output.to_string());
        }
    }

    #[tokio::test]
    async fn test_plain_files_pass() {
        let temp = tempfile::TempDir::new().unwrap();
        let manifest = temp.path().join("deployment.yaml");
        std::fs::write(&manifest, "kind: Pod\n").unwrap();

        let calls = Calls::default();
        let mut recorder = Recorder::default();
        let report = orchestrator(&calls)
            .run(vec![plain(&manifest)], &mut recorder)
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(
            report.output,
            "Summary: 1 resource found - Valid: 1, Invalid: 0\n"
        );
        assert_eq!(recorder.started, vec![manifest.clone()]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![format!("validate {}", manifest.display())]
        );
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_run() {
        let temp = tempfile::TempDir::new().unwrap();
        let prod = temp.path().join("overlays/prod");
        let staging = temp.path().join("overlays/staging");
        std::fs::create_dir_all(&prod).unwrap();
        std::fs::write(prod.join("build.out"), "replicas: invalid\n").unwrap();

        let calls = Calls::default();
        let mut recorder = Recorder::default();
        let report = orchestrator(&calls)
            .run(vec![kustomization(&prod), kustomization(&staging)], &mut recorder)
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.failure().unwrap().path, prod.join("kustomization.yaml"));
        assert_eq!(recorder.started.len(), 1);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], format!("build {}", prod.display()));
        assert_eq!(calls[1], "validate - replicas: invalid");

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, RunnerError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn test_flux_substitution_runs_between_build_and_validate() {
        let temp = tempfile::TempDir::new().unwrap();
        let cluster = temp.path().join("clusters/staging");
        std::fs::create_dir_all(&cluster).unwrap();
        std::fs::write(cluster.join("build.out"), "name: ${cluster_name}\n").unwrap();

        let calls = Calls::default();
        let orchestrator = orchestrator(&calls).with_flux(vec![EnvVar {
            key: "cluster_name".to_string(),
            value: "staging".to_string(),
        }]);

        let file = kustomization(&cluster).unwrap();
        assert_eq!(orchestrator.pipeline_for(&file), Pipeline::KustomizeEnvsubst);

        let report = orchestrator.run(vec![Ok(file)], &mut Silent).await.unwrap();
        assert!(report.is_success());

        let calls = calls.lock().unwrap();
        assert_eq!(calls[1], "envsubst");
        assert_eq!(calls[2], "validate - name: staging");
    }

    #[test]
    fn test_flux_does_not_apply_to_plain_files() {
        let calls = Calls::default();
        let orchestrator = orchestrator(&calls).with_flux(Vec::new());
        let file = plain(Path::new("app/deployment.yaml")).unwrap();
        assert_eq!(orchestrator.pipeline_for(&file), Pipeline::Direct);
    }

    #[tokio::test]
    async fn test_kustomize_build_failure_is_a_failed_verdict() {
        let temp = tempfile::TempDir::new().unwrap();
        let broken = temp.path().join("broken");

        let calls = Calls::default();
        let mut recorder = Recorder::default();
        let report = orchestrator(&calls)
            .run(vec![kustomization(&broken)], &mut recorder)
            .await
            .unwrap();

        let failure = report.failure().unwrap();
        assert!(failure.message.contains("accumulating resources"));
        assert_eq!(recorder.outputs, vec!["Error: accumulating resources".to_string()]);
        // the validator never ran
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_locator_error_aborts() {
        let calls = Calls::default();
        let files = vec![Err(CoreError::ManifestsNotFound {
            path: "missing".to_string(),
        })];
        let err = orchestrator(&calls).run(files, &mut Silent).await.unwrap_err();
        assert!(matches!(err, RunnerError::Core(_)));
    }

    #[tokio::test]
    async fn test_missing_envsubst_tool() {
        let calls = Calls::default();
        let mut tools = toolset(&calls);
        tools.envsubst = None;
        let orchestrator = ValidationOrchestrator::new(
            tools,
            &ValidatorOptions::default(),
            &[SchemaLocation::Default],
        )
        .with_flux(Vec::new());

        let temp = tempfile::TempDir::new().unwrap();
        let err = orchestrator
            .run(vec![kustomization(temp.path())], &mut Silent)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Tool { .. }));
    }
}
