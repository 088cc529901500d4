//! Terminal output
//!
//! Progress lines and tool output go to stdout; logs go to stderr.

use console::style;

use kubegate_core::{ManifestFile, ProcessingMode};
use kubegate_runner::{RunObserver, RunReport, ValidationVerdict};

/// Prints progress as files are validated
#[derive(Debug, Default)]
pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn file_started(&mut self, file: &ManifestFile) {
        let label = match file.mode {
            ProcessingMode::Plain => "Processing file:",
            ProcessingMode::KustomizationRoot => "Processing kustomization file:",
        };
        println!("{} {}", style(label).bold(), file.path.display());
    }

    fn tool_output(&mut self, _file: &ManifestFile, output: &str) {
        if output.is_empty() {
            return;
        }
        print!("{}", output);
        if !output.ends_with('\n') {
            println!();
        }
    }

    fn verdict(&mut self, verdict: &ValidationVerdict) {
        if verdict.is_success() {
            println!(
                "{} Validation successful for {}",
                style("✓").green(),
                verdict.path.display()
            );
        } else {
            println!(
                "{} Validation failed for {}",
                style("✗").red().bold(),
                verdict.path.display()
            );
        }
    }
}

/// Final line of a successful run
pub fn print_summary(report: &RunReport) {
    println!();
    if report.verdicts.is_empty() {
        println!("{} No manifests found", style("⚠").yellow());
    } else {
        println!(
            "{} {} file(s) validated",
            style("✓").green().bold(),
            report.verdicts.len()
        );
    }
}
