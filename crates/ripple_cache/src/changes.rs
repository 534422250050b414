//! Host-reported unit changes and fingerprint-based change detection.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use ripple_common::{ContentHash, UnitId};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::signature::SignatureStore;

/// How a unit changed since the last build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The unit is new to the project.
    Added,
    /// The unit's source changed.
    Modified,
    /// The unit was deleted.
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        })
    }
}

/// One changed unit reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedUnit {
    /// The unit.
    pub unit: UnitId,
    /// What happened to it.
    pub kind: ChangeKind,
}

impl ChangedUnit {
    /// A unit that was added.
    pub fn added(unit: impl Into<UnitId>) -> Self {
        Self {
            unit: unit.into(),
            kind: ChangeKind::Added,
        }
    }

    /// A unit whose source was modified.
    pub fn modified(unit: impl Into<UnitId>) -> Self {
        Self {
            unit: unit.into(),
            kind: ChangeKind::Modified,
        }
    }

    /// A unit that was removed.
    pub fn removed(unit: impl Into<UnitId>) -> Self {
        Self {
            unit: unit.into(),
            kind: ChangeKind::Removed,
        }
    }
}

/// Result of comparing current unit fingerprints against the signature store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Units the store has never seen.
    pub added: Vec<UnitId>,
    /// Units whose fingerprint differs from the recorded one.
    pub modified: Vec<UnitId>,
    /// Units in the store but not in the current set.
    pub removed: Vec<UnitId>,
    /// Units whose fingerprint matches.
    pub unchanged: Vec<UnitId>,
}

impl ChangeSet {
    /// Categorizes every unit in `current` against the store. All lists are
    /// sorted.
    pub fn detect(current: &BTreeMap<UnitId, ContentHash>, store: &SignatureStore) -> Self {
        let mut set = ChangeSet::default();
        for (unit, fingerprint) in current {
            match store.signatures_for(unit) {
                Some(sigs) if sigs.fingerprint == *fingerprint => set.unchanged.push(unit.clone()),
                Some(_) => set.modified.push(unit.clone()),
                None => set.added.push(unit.clone()),
            }
        }
        set.removed = store
            .units()
            .filter(|unit| !current.contains_key(*unit))
            .cloned()
            .collect();
        set
    }

    /// Returns `true` if nothing was added, modified, or removed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Number of units that need compiling (added + modified).
    pub fn dirty_count(&self) -> usize {
        self.added.len() + self.modified.len()
    }

    /// Flattens into the host change list.
    pub fn into_changes(self) -> Vec<ChangedUnit> {
        let added = self.added.into_iter().map(ChangedUnit::added);
        let modified = self.modified.into_iter().map(ChangedUnit::modified);
        let removed = self.removed.into_iter().map(ChangedUnit::removed);
        added.chain(modified).chain(removed).collect()
    }
}

/// Computes the XXH3-128 content hash of a file.
pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
    let content = std::fs::read(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(ContentHash::from_bytes(&content))
}
