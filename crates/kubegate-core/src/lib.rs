//! kubegate core - building blocks of the manifest validation pipeline
//!
//! This crate holds the parts of kubegate that need neither the network nor
//! external tools:
//! - `RunConfig`: everything a validation run is driven by
//! - `ManifestLocator`: discovery of manifests or kustomization roots
//! - `CrdParser`: extraction of kind/version schemas from CRD documents
//! - `CrdConverter`: CRD to per-kind/per-version JSON Schema conversion

pub mod config;
pub mod convert;
pub mod crd;
pub mod error;
pub mod locator;

pub use config::{
    DEFAULT_CONFIG_FILE, DEFAULT_FLUX_VERSION, DEFAULT_KUBECONFORM_VERSION, EnvVar, RunConfig,
    ToolPaths, ValidatorOptions, parse_exclusions,
};
pub use convert::{ConvertOptions, ConvertedSchema, CrdConverter, SchemaDirectory, to_json_schema};
pub use crd::{CRD_KIND, CrdDocument, CrdParser, CrdVersion};
pub use error::{CoreError, Result};
pub use locator::{ExclusionRules, LocateMode, ManifestFile, ManifestLocator, ProcessingMode};
