//! Diagnostic codes emitted by the engine.

use ripple_diagnostics::{Category, DiagnosticCode};

/// A unit failed to compile.
pub const UNIT_COMPILE_FAILURE: DiagnosticCode = DiagnosticCode::new(Category::Error, 1);

/// Two units declared the same declaration during a full rebuild.
pub const DUPLICATE_DECLARATION: DiagnosticCode = DiagnosticCode::new(Category::Warning, 1);

/// The build history could not be read.
pub const CACHE_CORRUPTION: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 1);

/// The configuration hash differs from the one the history was built with.
pub const CONFIGURATION_MISMATCH: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 2);

/// Propagation did not reach a fixpoint within the round cap.
pub const ROUND_LIMIT_EXCEEDED: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 3);

/// A change the summaries cannot express.
pub const STRUCTURAL_CHANGE: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 4);

/// Incremental compilation is switched off.
pub const INCREMENTAL_DISABLED: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 5);

/// No build history exists yet.
pub const NO_HISTORY: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 6);

/// The history was written by another cache layout or toolchain.
pub const CACHE_VERSION_MISMATCH: DiagnosticCode = DiagnosticCode::new(Category::Incremental, 7);
