//! kubegate CLI - validate Kubernetes manifests against built-in and CRD schemas

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::DiscoveryArgs;
use commands::schemas::SchemasArgs;
use commands::validate::ValidateArgs;

#[derive(Parser)]
#[command(name = "kubegate")]
#[command(version)]
#[command(about = "Validate Kubernetes manifests, kustomize overlays and CRD-backed resources", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every manifest (or kustomization) under a directory
    Validate(ValidateArgs),

    /// Convert CRD sources into JSON schemas
    Schemas(SchemasArgs),

    /// List the files a validate run would process
    Locate(DiscoveryArgs),
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match &cli.command {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Schemas(args) => commands::schemas::run(args),
        Commands::Locate(args) => commands::locate::run(args),
    };

    let code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
