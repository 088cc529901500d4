//! End-to-end wiring of a run: CRD sources to schemas, tool resolution and
//! manifest validation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kubegate_core::{
    ConvertOptions, CrdConverter, LocateMode, ManifestLocator, RunConfig, SchemaDirectory,
};
use kubegate_sources::{
    HttpClient, Platform, RepositoryCloner, SchemaMaterializer, SchemaSource, SourceClassifier,
    ToolInstaller, ToolRelease,
};
use tracing::info;

use crate::error::Result;
use crate::orchestrator::{RunObserver, RunReport, ValidationOrchestrator};
use crate::schema::schema_locations;
use crate::tools::Toolset;

/// Directory (under the work dir) CRD sources are materialized into
const SOURCES_DIR: &str = "crds";
/// Directory (under the work dir) converted schemas are written to
const SCHEMAS_DIR: &str = "schemas";

/// Classifies, materializes and converts CRD sources into one schema directory
pub struct SchemaBuilder {
    classifier: SourceClassifier,
    materializer: SchemaMaterializer,
    converter: CrdConverter,
}

impl SchemaBuilder {
    /// Sources are materialized under `<work_dir>/crds`
    pub fn new(client: HttpClient, work_dir: &Path, options: ConvertOptions) -> Self {
        Self {
            classifier: SourceClassifier::new(client.clone()),
            materializer: SchemaMaterializer::new(work_dir.join(SOURCES_DIR), client),
            converter: CrdConverter::new(options),
        }
    }

    pub fn with_cloner(mut self, cloner: Arc<dyn RepositoryCloner>) -> Self {
        self.materializer = self.materializer.with_cloner(cloner);
        self
    }

    /// Classify every locator. Any failure aborts before anything is fetched
    /// for materialization.
    pub async fn classify(&self, locators: &[String]) -> Result<Vec<SchemaSource>> {
        let mut sources = Vec::with_capacity(locators.len());
        for locator in locators {
            sources.push(self.classifier.classify(locator).await?);
        }
        Ok(sources)
    }

    /// Build the pooled schema directory at `output`.
    ///
    /// No locators at all gives an empty directory. Files already in
    /// `output` are left alone; schemas of the same name are overwritten.
    pub async fn build(&self, locators: &[String], output: &Path) -> Result<SchemaDirectory> {
        let sources = self.classify(locators).await?;
        let dirs = self.materializer.materialize(&sources).await?;
        let roots: Vec<PathBuf> = dirs.into_iter().map(|d| d.path).collect();
        Ok(self.converter.convert(&roots, output)?)
    }
}

/// Binaries a run will call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinaries {
    pub kubeconform: PathBuf,
    pub kustomize: PathBuf,
    pub flux: Option<PathBuf>,
}

impl ToolBinaries {
    pub fn into_toolset(self) -> Toolset {
        Toolset::processes(self.kubeconform, self.kustomize, self.flux)
    }
}

/// Resolve tool binaries: explicit paths win, released tools are installed
/// (or taken from the cache) otherwise. Flux is only needed for kustomize
/// runs with substitution.
pub async fn resolve_binaries(config: &RunConfig, installer: &ToolInstaller) -> Result<ToolBinaries> {
    let platform = Platform::current();

    let kubeconform = match &config.tools.kubeconform {
        Some(path) => path.clone(),
        None => {
            let release = ToolRelease::kubeconform(&config.kubeconform_version, &platform)?;
            installer.install(&release).await?
        }
    };

    let kustomize = config
        .tools
        .kustomize
        .clone()
        .unwrap_or_else(|| PathBuf::from("kustomize"));

    let flux = if config.kustomize && config.flux {
        match &config.tools.flux {
            Some(path) => Some(path.clone()),
            None => {
                let release = ToolRelease::flux(&config.flux_version, &platform)?;
                Some(installer.install(&release).await?)
            }
        }
    } else {
        None
    };

    Ok(ToolBinaries {
        kubeconform,
        kustomize,
        flux,
    })
}

/// Locator for the configured root and mode
pub fn locator(config: &RunConfig) -> Result<ManifestLocator> {
    let mode = if config.kustomize {
        LocateMode::Kustomize
    } else {
        LocateMode::Plain
    };
    Ok(ManifestLocator::new(
        &config.manifests,
        mode,
        config.exclusion_rules()?,
    ))
}

/// Run the whole pipeline for a validated config
pub async fn run(
    config: &RunConfig,
    client: HttpClient,
    work_dir: &Path,
    tools: Toolset,
    observer: &mut dyn RunObserver,
) -> Result<RunReport> {
    config.validate()?;
    let env = config.env_vars()?;

    // schemas left by an earlier run in a reused work dir must not count
    let schema_dir = work_dir.join(SCHEMAS_DIR);
    if tokio::fs::try_exists(&schema_dir).await? {
        tokio::fs::remove_dir_all(&schema_dir).await?;
    }

    let schemas = SchemaBuilder::new(client, work_dir, config.conversion.clone())
        .build(&config.crds, &schema_dir)
        .await?;
    let locations = schema_locations(Some(&schemas), config.catalog);
    info!(locations = locations.len(), "schema locations ready");

    let mut orchestrator = ValidationOrchestrator::new(tools, &config.validator, &locations);
    if config.kustomize && config.flux {
        orchestrator = orchestrator.with_flux(env);
    }

    let locator = locator(config)?;
    orchestrator.run(locator.locate()?, observer).await
}
