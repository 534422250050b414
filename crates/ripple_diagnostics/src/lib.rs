//! Diagnostic creation, severity management, and terminal rendering.
//!
//! Incremental-build problems (cache corruption, configuration mismatch, round
//! limit, unit compile failures) are reported as structured [`Diagnostic`]s
//! rather than hard errors. The thread-safe [`DiagnosticSink`] accumulates them
//! during a build, including from parallel compile batches.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use renderer::{DiagnosticRenderer, JsonRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
