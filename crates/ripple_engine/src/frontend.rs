//! The boundary to the external compiler front-end.

use ripple_cache::{Declaration, InlineUsage, LookupKey, UnitRecord};
use ripple_common::{ContentHash, UnitId};

/// What the front-end reports for a unit it compiled successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    /// Fingerprint of the source that was compiled.
    pub fingerprint: ContentHash,
    /// Externally visible declarations of the unit.
    pub declarations: Vec<Declaration>,
    /// The emitted output. Only its hash is retained.
    pub output: Vec<u8>,
    /// Inline bodies embedded into the output.
    pub inline_usages: Vec<InlineUsage>,
    /// Every lookup performed during analysis, resolved or not.
    pub lookups: Vec<LookupKey>,
}

impl CompileOutput {
    /// Hash of the emitted output.
    pub fn output_hash(&self) -> ContentHash {
        ContentHash::from_bytes(&self.output)
    }

    /// Converts into the record committed to the stores.
    pub fn into_record(self, unit: UnitId) -> UnitRecord {
        let output_hash = self.output_hash();
        UnitRecord {
            unit,
            fingerprint: self.fingerprint,
            output_hash,
            declarations: self.declarations,
            lookups: self.lookups,
            inline_usages: self.inline_usages,
        }
    }
}

/// Outcome of compiling one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    /// The unit compiled.
    Success(CompileOutput),
    /// The unit has errors. It stays dirty and is retried on the next build.
    Failure {
        /// Front-end messages describing the failure.
        diagnostics: Vec<String>,
    },
}

impl CompileResult {
    /// Returns `true` for [`CompileResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Success(_))
    }
}

/// An infrastructure failure of the front-end (not a compile error).
#[derive(Debug, Clone, thiserror::Error)]
#[error("front-end failed on {unit}: {message}")]
pub struct FrontendError {
    /// The unit being compiled when the failure occurred.
    pub unit: UnitId,
    /// Description of the failure.
    pub message: String,
}

impl FrontendError {
    /// Creates a front-end error.
    pub fn new(unit: UnitId, message: impl Into<String>) -> Self {
        Self {
            unit,
            message: message.into(),
        }
    }
}

/// Compiles single units on behalf of the engine.
///
/// Units of one batch may be compiled concurrently, so implementations must
/// be `Sync`.
pub trait Frontend: Sync {
    /// Compiles `unit` against the current sources.
    fn compile(&self, unit: &UnitId) -> Result<CompileResult, FrontendError>;
}

impl<F: Frontend + ?Sized> Frontend for &F {
    fn compile(&self, unit: &UnitId) -> Result<CompileResult, FrontendError> {
        (**self).compile(unit)
    }
}
