//! kubegate runner
//!
//! Drives a validation run: builds the schema-location list, picks a
//! pipeline per manifest file (direct, kustomize, kustomize + flux envsubst)
//! and calls the external tools through injectable traits.

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod schema;
pub mod tools;

pub use error::{Result, RunnerError};
pub use orchestrator::{
    Outcome, Pipeline, RunObserver, RunReport, Silent, ValidationOrchestrator, ValidationVerdict,
};
pub use pipeline::{SchemaBuilder, ToolBinaries, locator, resolve_binaries, run};
pub use schema::{CRD_CATALOG_TEMPLATE, SchemaLocation, schema_locations, validator_args};
pub use tools::{
    EnvSubstituter, FluxEnvsubst, Kubeconform, Kustomize, KustomizeBuilder, ManifestValidator,
    ToolOutput, Toolset, ValidatorInput,
};
