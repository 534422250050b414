//! Composite version of the on-disk cache layout.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::TABLE_FORMAT_VERSION;

/// Version of the store schemas. Increment when the meaning of a persisted
/// store changes even if its table encoding does not.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// The schema and table format versions a cache was written with.
///
/// Persisted as a single integer (`schema * 1000 + table_format`) in the
/// history record; any difference from [`CacheVersion::current`] makes the
/// whole history unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct CacheVersion {
    /// Store schema version.
    pub schema: u32,
    /// Table format version.
    pub table_format: u32,
}

impl CacheVersion {
    /// The version this build reads and writes.
    pub fn current() -> Self {
        Self {
            schema: CACHE_SCHEMA_VERSION,
            table_format: TABLE_FORMAT_VERSION,
        }
    }

    /// The packed integer form.
    pub fn as_u32(self) -> u32 {
        self.schema * 1000 + self.table_format
    }

    /// Returns `true` if a cache with this version can be read by this build.
    pub fn is_compatible(self) -> bool {
        self == Self::current()
    }
}

impl From<u32> for CacheVersion {
    fn from(value: u32) -> Self {
        Self {
            schema: value / 1000,
            table_format: value % 1000,
        }
    }
}

impl From<CacheVersion> for u32 {
    fn from(version: CacheVersion) -> Self {
        version.as_u32()
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table_format)
    }
}
