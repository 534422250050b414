//! Dirty-set propagation and the round controller.
//!
//! Given the units a host reports as changed, the engine decides which other
//! units must be recompiled so that every output is consistent with the
//! sources. It compiles changed units through a [`Frontend`], diffs their new
//! declarations against the recorded ones, follows the lookup index and the
//! inline cache to the units that consumed what changed, and repeats until
//! no new units are discovered. Whenever the persisted summaries cannot be
//! trusted the controller falls back to a full rebuild.

#![warn(missing_docs)]

pub mod codes;
pub mod controller;
pub mod differ;
pub mod dirty;
pub mod error;
pub mod frontend;
pub mod propagator;

pub use controller::{
    BuildOptions, BuildOutcome, BuildReport, BuildRequest, CancelFlag, RebuildCause,
    RoundController,
};
pub use differ::{diff, InlineChange, SignatureDelta};
pub use dirty::{DirtyReason, DirtySet};
pub use error::BuildError;
pub use frontend::{CompileOutput, CompileResult, Frontend, FrontendError};
pub use propagator::{AbortReason, Propagator, PropagatorState, RoundSummary};
