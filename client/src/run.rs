//! Whole-run entry point: one session, every file in order, output to
//! stdout.

use std::path::PathBuf;

use anyhow::Result;

use crate::report;
use crate::session::Session;
use crate::types::{DiagnosticsMode, FileReport, RunSummary, SessionConfig};

/// Spawn the configured server, check every file in the order given, print
/// each file's diagnostics, and shut the server down.
///
/// The handshake runs even when `files` is empty. Diagnostics are the
/// product, not a failure — only spawn errors, unreadable files, RPC
/// failures, and missed deadlines abort the run.
pub async fn run(config: SessionConfig, files: &[PathBuf]) -> Result<RunSummary> {
    let mode = config.mode;
    let mut session = Session::start(config).await?;
    let mut summary = RunSummary::default();

    for file in files {
        let file_report = session.check_file(file).await?;
        print_report(&file_report, mode);
        summary.absorb(&file_report);
    }

    session.shutdown().await?;
    Ok(summary)
}

/// Print one file's results: push runs log the published URI and the
/// one-line form, pull runs show the pretty block followed by the
/// one-line form.
fn print_report(file_report: &FileReport, mode: DiagnosticsMode) {
    println!("{}", file_report.path.display());
    match mode {
        DiagnosticsMode::Push => {
            println!("{}", file_report.uri);
            for diagnostic in &file_report.diagnostics {
                println!("{}", report::simple(&file_report.path, diagnostic));
            }
        }
        DiagnosticsMode::Pull => {
            for diagnostic in &file_report.diagnostics {
                println!(
                    "{}",
                    report::pretty(&file_report.path, diagnostic, &file_report.text)
                );
                println!("{}", report::simple(&file_report.path, diagnostic));
                println!();
            }
        }
    }
}
