//! Batch diagnostics over the Language Server Protocol.
//!
//! Spawns a language server, opens each requested file, collects the
//! diagnostics the server attributes to it — pushed via
//! `publishDiagnostics` or pulled via `textDocument/diagnostic` — and
//! renders them for the terminal.

pub mod codec;
pub mod report;
pub mod types;

pub(crate) mod protocol;

mod endpoint;
mod run;
mod session;

pub use endpoint::Endpoint;
pub use protocol::{Diagnostic, DiagnosticCode, Position, Range, UriError};
pub use run::run;
pub use session::Session;
pub use types::{
    DiagnosticsMode, FileReport, RunSummary, SessionConfig, Severity, language_id_for,
};
