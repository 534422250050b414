//! Errors that end a build without a usable result.

use ripple_cache::CacheError;
use ripple_common::InternalError;

use crate::frontend::FrontendError;

/// A build failure the engine cannot degrade into more work.
///
/// Unit compile failures and untrustworthy caches are reported as
/// diagnostics instead; only a broken front-end, a history that cannot be
/// written, or an engine bug end up here.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The front-end reported an infrastructure failure.
    #[error(transparent)]
    Frontend(#[from] FrontendError),

    /// The build history could not be written or invalidated.
    #[error("failed to update build history: {0}")]
    History(#[from] CacheError),

    /// An engine invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_common::UnitId;

    #[test]
    fn frontend_error_is_transparent() {
        let err: BuildError = FrontendError::new(UnitId::from("a.kt"), "daemon crashed").into();
        assert_eq!(err.to_string(), "front-end failed on a.kt: daemon crashed");
    }

    #[test]
    fn history_error_is_wrapped() {
        let err: BuildError = CacheError::Serialization {
            reason: "disk full".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("failed to update build history"));
    }
}
