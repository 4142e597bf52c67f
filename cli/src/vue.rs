//! Vue front end: `vue-language-server` over stdio, push-model diagnostics.
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
    // The server's embedded TypeScript checker loads from the workspace's
    // own node_modules, the same copy an editor integration would find.
    let tsdk = workspace_root.join("node_modules/typescript/lib");

    let mut config = SessionConfig::new(
        "vue-language-server",
        DiagnosticsMode::Push,
        workspace_root,
    );
    config.args = vec!["--stdio".into()];
    config.initialization_options = Some(serde_json::json!({
        "typescript": { "tsdk": tsdk.display().to_string() }
    }));

    run(config, files).await
}
