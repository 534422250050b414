//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur while reading or writing the build history.
///
/// Any error returned while *loading* means the persisted state cannot be
/// trusted; the round controller reacts by invalidating the history and
/// running a full rebuild. Errors while *writing* are returned to the host.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The history record could not be parsed as valid JSON.
    #[error("failed to parse build history: {reason}")]
    HistoryParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// A table file has an invalid or missing header.
    #[error("invalid table header in {path}: {reason}")]
    InvalidHeader {
        /// The table file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The table file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The table format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The table file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The actual format version found in the file.
        actual: u32,
    },

    /// The history was written by a different cache schema.
    #[error("cache version mismatch: expected {expected}, got {actual}")]
    CacheVersionMismatch {
        /// The cache version this build understands.
        expected: String,
        /// The cache version recorded in the history.
        actual: String,
    },

    /// The history was written by a different toolchain version.
    #[error("toolchain mismatch: cache written by {actual}, current toolchain is {expected}")]
    ToolchainMismatch {
        /// The current toolchain version.
        expected: String,
        /// The toolchain version recorded in the cache.
        actual: String,
    },

    /// The tables decode but disagree with the history record.
    #[error("inconsistent build history: {reason}")]
    Inconsistent {
        /// Description of the inconsistency.
        reason: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    /// Returns `true` for errors caused by a cache written by another
    /// toolchain or schema, as opposed to damaged files.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(
            self,
            CacheError::VersionMismatch { .. }
                | CacheError::CacheVersionMismatch { .. }
                | CacheError::ToolchainMismatch { .. }
        )
    }
}
