//! Public configuration and result types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::Diagnostic;

/// How the session obtains diagnostics for an opened document.
///
/// Fixed per server binary, never switched within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticsMode {
    /// Wait for the server's `textDocument/publishDiagnostics` notification.
    Push,
    /// Ask with a `textDocument/diagnostic` request.
    Pull,
}

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

impl Severity {
    /// Map the LSP wire value (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// The mapping is total: any value outside the defined range reads as
    /// a hint rather than failing the whole report.
    #[must_use]
    pub fn from_lsp(value: i64) -> Self {
        match value {
            1 => Self::Error,
            2 => Self::Warning,
            3 => Self::Information,
            _ => Self::Hint,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// Configuration for one diagnostics run against one language server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server executable, resolved on PATH before spawning.
    pub command: String,
    /// Arguments passed to the server (typically `--stdio`).
    pub args: Vec<String>,
    /// Push or pull diagnostics, fixed for the run.
    pub mode: DiagnosticsMode,
    /// Workspace root announced in the handshake. Must be absolute.
    pub workspace_root: PathBuf,
    /// Server-specific `initializationOptions`, passed through verbatim.
    pub initialization_options: Option<serde_json::Value>,
    /// Deadline for any single request/response exchange.
    pub request_timeout: Duration,
    /// Deadline for a published-diagnostics wait after `didOpen`.
    pub diagnostics_timeout: Duration,
}

impl SessionConfig {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(120);

    #[must_use]
    pub fn new(
        command: impl Into<String>,
        mode: DiagnosticsMode,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            mode,
            workspace_root,
            initialization_options: None,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            diagnostics_timeout: Self::DEFAULT_DIAGNOSTICS_TIMEOUT,
        }
    }
}

/// LSP language identifier derived from a file's extension.
///
/// `.vue` files are Vue single-file components; everything else is handed
/// to the server as TypeScript.
#[must_use]
pub fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("vue") => "vue",
        _ => "typescript",
    }
}

/// Everything collected for one input file: identity, content at open time,
/// and the diagnostics the server attributed to that content.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub uri: String,
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Totals for a completed run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub files: usize,
    pub diagnostics: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn absorb(&mut self, report: &FileReport) {
        self.files += 1;
        self.diagnostics += report.diagnostics.len();
        self.errors += report
            .diagnostics
            .iter()
            .filter(|d| d.severity().is_error())
            .count();
    }
}
