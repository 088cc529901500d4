//! CRD sources for kubegate
//!
//! Turns CRD source locators into local directories of CRD documents:
//! - `SourceClassifier`: repository tree, archive or raw file
//! - `SchemaMaterializer`: clone, unpack or download into `<root>/<index>`
//! - `ToolInstaller`: verified, cached downloads of the validator and Flux releases

pub mod archive;
pub mod classify;
pub mod error;
pub mod git;
pub mod http;
pub mod materialize;
pub mod toolchain;

pub use archive::{ArchiveFormat, Identification};
pub use classify::{DEFAULT_GIT_HOST, GitTree, SchemaSource, SourceClassifier, SourceKind};
pub use error::{ErrorKind, Result, SourceError};
pub use git::{GitCli, RepositoryCloner};
pub use http::HttpClient;
pub use materialize::{MaterializedSchemaDir, SchemaMaterializer};
pub use toolchain::{Platform, Tool, ToolInstaller, ToolRelease, default_cache_dir};
