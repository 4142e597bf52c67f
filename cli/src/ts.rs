//! TypeScript front end: `typescript-language-server` over stdio,
//! pull-model diagnostics.
//!
//! Every argument is a file path; diagnostics for each go to stdout in the
//! order given. Logs and the server's own stderr go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use lspcheck_client::{DiagnosticsMode, RunSummary, SessionConfig, run};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    match check(&files).await {
        Ok(summary) => {
            tracing::info!(
                files = summary.files,
                diagnostics = summary.diagnostics,
                errors = summary.errors,
                "run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn check(files: &[PathBuf]) -> Result<RunSummary> {
    let workspace_root = std::env::current_dir()?;

    let mut config = SessionConfig::new(
        "typescript-language-server",
        DiagnosticsMode::Pull,
        workspace_root,
    );
    config.args = vec!["--stdio".into()];

    run(config, files).await
}
