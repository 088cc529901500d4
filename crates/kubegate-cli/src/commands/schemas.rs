//! Schemas command - convert CRD sources without validating anything

use std::path::PathBuf;

use clap::Args;
use console::style;
use kubegate_core::RunConfig;
use kubegate_runner::SchemaBuilder;
use kubegate_sources::HttpClient;

use super::{WorkDir, block_on};
use crate::error::{CliError, Result};

#[derive(Args, Debug)]
pub struct SchemasArgs {
    /// CRD source: repository tree URL, archive URL or raw file URL
    #[arg(long = "crd", value_name = "URL", env = "KUBEGATE_CRDS", value_delimiter = ',')]
    pub crds: Vec<String>,

    /// Directory the JSON schemas are written to (existing files are kept)
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Config file providing CRD sources and conversion options
    #[arg(short, long, env = "KUBEGATE_CONFIG")]
    pub config: Option<PathBuf>,
}

pub fn run(args: &SchemasArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load_from(path)?,
        None => RunConfig::default(),
    };
    if !args.crds.is_empty() {
        config.crds = args.crds.clone();
    }
    config.validate()?;

    if config.crds.is_empty() {
        return Err(CliError::Config {
            message: "no CRD sources given".to_string(),
            help: Some("pass one or more --crd <URL>".to_string()),
        });
    }

    let work_dir = WorkDir::create(None)?;

    let schemas = block_on(config.timeout, async {
        let builder = SchemaBuilder::new(HttpClient::new()?, work_dir.path(), config.conversion.clone());
        Ok::<_, CliError>(builder.build(&config.crds, &args.output).await?)
    })?;

    for schema in schemas.schemas() {
        println!(
            "  {} {} {} → {}",
            style("✓").green(),
            schema.kind,
            schema.version,
            schema.path.display()
        );
    }
    println!();
    println!(
        "{} {} schema(s) written to {}",
        style("✓").green().bold(),
        schemas.schemas().len(),
        args.output.display()
    );
    Ok(())
}
