//! Session orchestration: spawn the server, run the LSP handshake, cycle
//! through files, shut down.
//!
//! The lifecycle is strictly sequential — one request or wait outstanding
//! at a time, one document open at a time. A file's cycle is
//! open → diagnose → close, and the next file's cycle starts only after the
//! close notification is on the wire. The single concurrent activity is the
//! child's stderr drain, which runs for the whole session so a chatty
//! server can never wedge itself on a full pipe.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::endpoint::Endpoint;
use crate::protocol::{
    self, Diagnostic, LogMessageParams, PublishDiagnosticsParams, PullDiagnosticsReport,
};
use crate::types::{DiagnosticsMode, FileReport, SessionConfig, language_id_for};

/// How long a server gets to exit after the farewell handshake.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// An initialized LSP session against one language server.
///
/// Holding a `Session` is proof the handshake succeeded.
pub struct Session {
    endpoint: Endpoint,
    child: Option<Child>,
    /// Live subscription to `publishDiagnostics`, push mode only.
    diagnostics_rx: Option<mpsc::Receiver<serde_json::Value>>,
    config: SessionConfig,
}

impl Session {
    /// Spawn the configured server and perform the initialization handshake.
    ///
    /// The executable is resolved on PATH first so a missing binary fails
    /// with a precise error instead of a raw spawn failure.
    pub async fn start(config: SessionConfig) -> Result<Self> {
        let resolved = which::which(&config.command)
            .with_context(|| format!("{} not found in PATH", config.command))?;

        let mut child = Command::new(&resolved)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", config.command))?;

        let stdout = child.stdout.take().context("child has no stdout pipe")?;
        let stdin = child.stdin.take().context("child has no stdin pipe")?;
        let stderr = child.stderr.take().context("child has no stderr pipe")?;

        // Drain the child's stderr onto ours for the whole run. Independent
        // of the request flow in both directions.
        tokio::spawn(async move {
            let mut stderr = stderr;
            let mut sink = tokio::io::stderr();
            if let Err(e) = tokio::io::copy(&mut stderr, &mut sink).await {
                tracing::debug!("server stderr forwarding stopped: {e}");
            }
        });

        let endpoint = Endpoint::new(stdout, stdin, config.request_timeout);
        Self::handshake(endpoint, config, Some(child)).await
    }

    /// Run a session over an already-connected endpoint.
    ///
    /// For transports that are not a child process — an in-memory pipe in
    /// tests, or a server something else spawned.
    pub async fn attach(endpoint: Endpoint, config: SessionConfig) -> Result<Self> {
        Self::handshake(endpoint, config, None).await
    }

    async fn handshake(
        mut endpoint: Endpoint,
        config: SessionConfig,
        child: Option<Child>,
    ) -> Result<Self> {
        let mut server_log = endpoint.subscribe("window/logMessage").await;
        tokio::spawn(async move {
            while let Some(params) = server_log.recv().await {
                log_server_message(params);
            }
        });

        // Subscribed before any document opens, so no publication is missed.
        let diagnostics_rx = match config.mode {
            DiagnosticsMode::Push => {
                Some(endpoint.subscribe("textDocument/publishDiagnostics").await)
            }
            DiagnosticsMode::Pull => None,
        };

        let workspace_root =
            std::path::absolute(&config.workspace_root).context("resolving workspace root")?;
        let root_uri = protocol::path_to_file_uri(&workspace_root)?;

        endpoint
            .request(
                "initialize",
                Some(protocol::initialize_params(
                    config.mode,
                    root_uri.as_str(),
                    config.initialization_options.as_ref(),
                )),
            )
            .await
            .context("initialize handshake")?;

        if config.mode == DiagnosticsMode::Pull {
            endpoint
                .notify("initialized", Some(serde_json::json!({})))
                .await?;
        }

        Ok(Self {
            endpoint,
            child,
            diagnostics_rx,
            config,
        })
    }

    /// Run one file's open → diagnose → close cycle.
    ///
    /// The document's content is captured once, before `didOpen`, and the
    /// diagnostics returned are the ones the server attributes to exactly
    /// that content. An unreadable file is fatal — there is nothing to
    /// diagnose without its text.
    pub async fn check_file(&mut self, path: &Path) -> Result<FileReport> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let absolute =
            std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))?;
        let uri = protocol::path_to_file_uri(&absolute)?.to_string();
        let language_id = language_id_for(path);

        if let Some(rx) = &mut self.diagnostics_rx {
            // Publications buffered from before this cycle describe older
            // documents; they must not satisfy this file's wait.
            while rx.try_recv().is_ok() {}
        }

        self.endpoint
            .notify(
                "textDocument/didOpen",
                Some(protocol::did_open_params(&uri, language_id, &text)),
            )
            .await?;

        let diagnostics = match self.config.mode {
            DiagnosticsMode::Push => self.await_published(&uri).await?,
            DiagnosticsMode::Pull => self.pull_diagnostics(&uri).await?,
        };

        self.endpoint
            .notify("textDocument/didClose", Some(protocol::did_close_params(&uri)))
            .await?;

        Ok(FileReport {
            path: path.to_path_buf(),
            uri,
            text,
            diagnostics,
        })
    }

    /// Wait for the server to publish diagnostics for the document just
    /// opened, skipping publications that name any other document.
    async fn await_published(&mut self, uri: &str) -> Result<Vec<Diagnostic>> {
        let Some(rx) = self.diagnostics_rx.as_mut() else {
            bail!("publish subscription missing in push mode");
        };

        let deadline = tokio::time::Instant::now() + self.config.diagnostics_timeout;
        loop {
            let params = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .map_err(|_| anyhow!("timed out waiting for diagnostics for {uri}"))?
                .ok_or_else(|| {
                    anyhow!("connection closed while waiting for diagnostics for {uri}")
                })?;

            let published: PublishDiagnosticsParams =
                serde_json::from_value(params).context("decoding publishDiagnostics")?;
            if protocol::same_document(&published.uri, uri) {
                return Ok(published.diagnostics);
            }
            tracing::debug!(uri = %published.uri, "skipping diagnostics for another document");
        }
    }

    async fn pull_diagnostics(&mut self, uri: &str) -> Result<Vec<Diagnostic>> {
        let result = self
            .endpoint
            .request(
                "textDocument/diagnostic",
                Some(protocol::diagnostic_params(uri)),
            )
            .await?;
        let report: PullDiagnosticsReport =
            serde_json::from_value(result).context("decoding diagnostic report")?;
        Ok(report.items)
    }

    /// Say goodbye properly: `shutdown` request, `exit` notification, then
    /// a bounded wait for the child before killing it.
    pub async fn shutdown(mut self) -> Result<()> {
        match self.endpoint.request("shutdown", None).await {
            Ok(_) => {
                if let Err(e) = self.endpoint.notify("exit", None).await {
                    tracing::debug!("exit notification not delivered: {e:#}");
                }
            }
            Err(e) => tracing::warn!("shutdown request failed: {e:#}"),
        }
        self.endpoint.close().await;

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "language server exited"),
                Ok(Err(e)) => tracing::warn!("waiting for the language server failed: {e}"),
                Err(_) => {
                    tracing::debug!("language server still running after exit, killing");
                    let _ = child.kill().await;
                }
            }
        }
        Ok(())
    }
}

fn log_server_message(params: serde_json::Value) {
    match serde_json::from_value::<LogMessageParams>(params) {
        Ok(entry) => match entry.level {
            1 => tracing::error!("[server] {}", entry.message),
            2 => tracing::warn!("[server] {}", entry.message),
            3 => tracing::info!("[server] {}", entry.message),
            _ => tracing::debug!("[server] {}", entry.message),
        },
        Err(e) => tracing::trace!("unreadable window/logMessage: {e}"),
    }
}
