//! Locate command - list the files a validate run would process

use console::style;
use kubegate_core::ProcessingMode;

use super::DiscoveryArgs;
use crate::error::Result;

pub fn run(args: &DiscoveryArgs) -> Result<()> {
    let config = args.load_config()?;
    let locator = kubegate_runner::locator(&config)?;

    let mut count = 0;
    for file in locator.locate()? {
        let file = file?;
        let marker = match file.mode {
            ProcessingMode::Plain => "",
            ProcessingMode::KustomizationRoot => " (kustomization)",
        };
        println!("{}{}", file.path.display(), style(marker).dim());
        count += 1;
    }

    tracing::info!(count, "located manifests");
    Ok(())
}
