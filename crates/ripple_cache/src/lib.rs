//! Persisted summaries for incremental recompilation.
//!
//! This crate holds the three stores the dirty-set propagator consults:
//! the [`SignatureStore`] (per-unit externally visible declarations), the
//! [`LookupIndex`] (who looked up which name in which scope), and the
//! [`InlineCache`] (who embedded which inline body). [`BuildHistory`] persists
//! them as checksummed tables next to a JSON history record and commits new
//! snapshots with write-to-temp-then-rename.

#![warn(missing_docs)]

pub mod changes;
pub mod decl;
pub mod error;
pub mod history;
pub mod inline;
pub mod lookup;
pub mod signature;
pub mod stores;
pub mod table;
pub mod version;

pub use changes::{hash_file, ChangeKind, ChangeSet, ChangedUnit};
pub use decl::{DeclKind, Declaration, DeclarationId, LookupKey, Visibility};
pub use error::CacheError;
pub use history::{BuildHistory, HistoryRecord, Snapshot};
pub use inline::{InlineCache, InlineEntry, InlineUsage};
pub use lookup::{LookupIndex, LookupUpdate};
pub use signature::{ClassHierarchy, SignatureStore, UnitSignatures};
pub use stores::{Stores, UnitRecord};
pub use version::CacheVersion;
