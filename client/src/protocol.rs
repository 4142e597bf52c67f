//! Wire-level message shapes for the LSP conversation.
//!
//! Payloads the session reads are explicit serde types rather than raw JSON
//! lookups, so a malformed server reply fails loudly at the boundary instead
//! of propagating `null`s into the output.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{DiagnosticsMode, Severity};

#[derive(Debug, thiserror::Error)]
#[error("path has no file URI form: {}", path.display())]
pub struct UriError {
    path: PathBuf,
}

/// Outgoing JSON-RPC request. Ids are assigned by the endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Outgoing JSON-RPC notification (no id, no response).
#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// A zero-based line/character offset into a document.
///
/// Both fields default so that partial positions some servers emit (an `end`
/// carrying only a `character`) still decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub character: u32,
}

/// A half-open span between two positions.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Range {
    #[serde(default)]
    pub start: Position,
    #[serde(default)]
    pub end: Position,
}

/// A diagnostic code, which LSP allows as either a number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticCode {
    Number(i64),
    Text(String),
}

/// One issue a server reported against a document.
#[derive(Debug, Clone, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub range: Range,
    severity: Option<i64>,
    #[serde(default)]
    pub code: Option<DiagnosticCode>,
    #[serde(default)]
    pub source: Option<String>,
    pub message: String,
}

impl Diagnostic {
    /// Severity with the wire value resolved: 1–4 map to the four levels,
    /// anything unrecognized reads as a hint, and an absent value reads as
    /// an error (the interpretation is left to clients).
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity.map_or(Severity::Error, Severity::from_lsp)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        range: Range,
        severity: Option<i64>,
        code: Option<DiagnosticCode>,
        message: &str,
    ) -> Self {
        Self {
            range,
            severity,
            code,
            source: None,
            message: message.to_string(),
        }
    }
}

/// Payload of a `textDocument/publishDiagnostics` server notification.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// Response body of a `textDocument/diagnostic` request.
///
/// Only the full report's `items` matter here; an absent or empty list
/// means the document is clean.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PullDiagnosticsReport {
    #[serde(default)]
    pub items: Vec<Diagnostic>,
}

/// Payload of a `window/logMessage` server notification.
#[derive(Debug, Deserialize)]
pub(crate) struct LogMessageParams {
    #[serde(rename = "type", default)]
    pub level: i64,
    #[serde(default)]
    pub message: String,
}

pub(crate) fn initialize_params(
    mode: DiagnosticsMode,
    root_uri: &str,
    initialization_options: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut capabilities = serde_json::json!({
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": false,
                "willSave": false,
                "willSaveWaitUntil": false,
                "didSave": false
            },
            "publishDiagnostics": {
                "relatedInformation": false
            }
        }
    });
    if mode == DiagnosticsMode::Pull {
        capabilities["textDocument"]["diagnostic"] = serde_json::json!({
            "dynamicRegistration": false
        });
    }

    let mut params = serde_json::json!({
        "processId": std::process::id(),
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "rootUri": root_uri,
        "capabilities": capabilities,
        "workspaceFolders": [{
            "uri": root_uri,
            "name": "workspace"
        }]
    });
    if let Some(options) = initialization_options {
        params["initializationOptions"] = options.clone();
    }
    params
}

pub(crate) fn did_open_params(uri: &str, language_id: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": 1,
            "text": text
        }
    })
}

pub(crate) fn did_close_params(uri: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri
        }
    })
}

pub(crate) fn diagnostic_params(uri: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri
        }
    })
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url, UriError> {
    url::Url::from_file_path(path).map_err(|()| UriError {
        path: path.to_path_buf(),
    })
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}

/// Whether two document URIs name the same file.
///
/// Servers re-encode URIs they echo back (percent-encoding, drive-letter
/// case), so compare the decoded paths when both sides parse.
pub(crate) fn same_document(left: &str, right: &str) -> bool {
    match (file_uri_to_path(left), file_uri_to_path(right)) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}
