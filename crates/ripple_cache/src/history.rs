//! Versioned, transactional persistence of the summary stores.
//!
//! Layout under the cache directory:
//!
//! ```text
//! history.json              the current HistoryRecord
//! gen-<N>/signatures.tbl    SignatureStore
//! gen-<N>/lookups.tbl       LookupIndex
//! gen-<N>/inline.tbl        InlineCache
//! ```
//!
//! A commit writes the tables into `gen-<N>.tmp`, renames the directory to
//! `gen-<N>`, then atomically replaces `history.json`. Until the record is
//! replaced the previous generation stays current, so an interrupted commit
//! leaves the old history intact.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ripple_common::{ContentHash, UnitId};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::inline::InlineCache;
use crate::lookup::LookupIndex;
use crate::signature::SignatureStore;
use crate::stores::Stores;
use crate::table::{read_table, write_atomic, write_table};
use crate::version::CacheVersion;

/// Name of the history record within the cache directory.
const HISTORY_FILE: &str = "history.json";

/// Prefix of generation directories.
const GENERATION_PREFIX: &str = "gen-";

const SIGNATURES_TABLE: &str = "signatures.tbl";
const LOOKUPS_TABLE: &str = "lookups.tbl";
const INLINE_TABLE: &str = "inline.tbl";

/// The JSON record describing the current generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Cache layout version that wrote the history.
    pub cache_version: CacheVersion,
    /// Toolchain version that wrote the history.
    pub toolchain_version: String,
    /// Monotonic generation number, starting at 1.
    pub generation: u64,
    /// Configuration hash of the build that produced this generation.
    pub configuration_hash: ContentHash,
    /// Units whose last compile failed.
    pub pending: BTreeSet<UnitId>,
    /// Number of units in the signature table.
    pub unit_count: usize,
    /// Directory holding this generation's tables, relative to the cache dir.
    pub tables_dir: String,
}

/// An immutable copy of everything a build needs from the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Generation number of this snapshot.
    pub generation: u64,
    /// Configuration hash the stores were produced under.
    pub configuration_hash: ContentHash,
    /// Units that failed and must be re-seeded.
    pub pending: BTreeSet<UnitId>,
    /// The three stores.
    pub stores: Stores,
}

/// Reads, commits, and invalidates the build history in one cache directory.
#[derive(Debug, Clone)]
pub struct BuildHistory {
    cache_dir: PathBuf,
    toolchain_version: String,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl BuildHistory {
    /// Creates a handle for the history stored in `cache_dir`.
    pub fn new(cache_dir: &Path, toolchain_version: &str) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            toolchain_version: toolchain_version.to_string(),
        }
    }

    /// The cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The toolchain version used to validate tables.
    pub fn toolchain_version(&self) -> &str {
        &self.toolchain_version
    }

    /// Reads the history record without loading any tables.
    ///
    /// Returns `Ok(None)` when no history has been committed.
    pub fn record(&self) -> Result<Option<HistoryRecord>, CacheError> {
        let path = self.cache_dir.join(HISTORY_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::HistoryParse {
                reason: e.to_string(),
            })
    }

    /// Loads the last committed snapshot.
    ///
    /// Returns `Ok(None)` when no history exists. Any version mismatch,
    /// damaged table, or disagreement between the record and the tables is
    /// an error; the caller is expected to invalidate and rebuild.
    pub fn load(&self) -> Result<Option<Snapshot>, CacheError> {
        let Some(record) = self.record()? else {
            return Ok(None);
        };

        if !record.cache_version.is_compatible() {
            return Err(CacheError::CacheVersionMismatch {
                expected: CacheVersion::current().to_string(),
                actual: record.cache_version.to_string(),
            });
        }
        if record.toolchain_version != self.toolchain_version {
            return Err(CacheError::ToolchainMismatch {
                expected: self.toolchain_version.clone(),
                actual: record.toolchain_version,
            });
        }
        if !is_generation_dir_name(&record.tables_dir) {
            return Err(CacheError::Inconsistent {
                reason: format!("invalid table directory '{}'", record.tables_dir),
            });
        }

        let dir = self.cache_dir.join(&record.tables_dir);
        let signatures: SignatureStore =
            read_table(&dir.join(SIGNATURES_TABLE), &self.toolchain_version)?;
        let lookups: LookupIndex = read_table(&dir.join(LOOKUPS_TABLE), &self.toolchain_version)?;
        let inline: InlineCache = read_table(&dir.join(INLINE_TABLE), &self.toolchain_version)?;

        if signatures.len() != record.unit_count {
            return Err(CacheError::Inconsistent {
                reason: format!(
                    "history records {} units but signature table holds {}",
                    record.unit_count,
                    signatures.len()
                ),
            });
        }

        tracing::debug!(
            generation = record.generation,
            units = record.unit_count,
            "loaded build history"
        );

        Ok(Some(Snapshot {
            generation: record.generation,
            configuration_hash: record.configuration_hash,
            pending: record.pending,
            stores: Stores {
                signatures,
                lookups,
                inline,
            },
        }))
    }

    /// Commits `snapshot` as the current history.
    ///
    /// Older generation directories are removed once the new record is in
    /// place.
    pub fn commit(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(io_error(&self.cache_dir))?;

        let dir_name = format!("{GENERATION_PREFIX}{}", snapshot.generation);
        let final_dir = self.cache_dir.join(&dir_name);
        let tmp_dir = self.cache_dir.join(format!("{dir_name}.tmp"));

        remove_dir_if_exists(&tmp_dir)?;
        std::fs::create_dir_all(&tmp_dir).map_err(io_error(&tmp_dir))?;

        let stores = &snapshot.stores;
        write_table(
            &tmp_dir.join(SIGNATURES_TABLE),
            &stores.signatures,
            &self.toolchain_version,
        )?;
        write_table(
            &tmp_dir.join(LOOKUPS_TABLE),
            &stores.lookups,
            &self.toolchain_version,
        )?;
        write_table(
            &tmp_dir.join(INLINE_TABLE),
            &stores.inline,
            &self.toolchain_version,
        )?;

        remove_dir_if_exists(&final_dir)?;
        std::fs::rename(&tmp_dir, &final_dir).map_err(io_error(&final_dir))?;

        let record = HistoryRecord {
            cache_version: CacheVersion::current(),
            toolchain_version: self.toolchain_version.clone(),
            generation: snapshot.generation,
            configuration_hash: snapshot.configuration_hash,
            pending: snapshot.pending.clone(),
            unit_count: stores.signatures.len(),
            tables_dir: dir_name.clone(),
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        write_atomic(&self.cache_dir.join(HISTORY_FILE), json.as_bytes())?;

        let removed = self.remove_generations(Some(&dir_name))?;
        tracing::debug!(
            generation = snapshot.generation,
            units = record.unit_count,
            stale_generations = removed,
            "committed build history"
        );
        Ok(())
    }

    /// Deletes the history record and every generation directory.
    pub fn invalidate(&self) -> Result<(), CacheError> {
        let path = self.cache_dir.join(HISTORY_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&path)(e)),
        }
        let removed = self.remove_generations(None)?;
        tracing::info!(
            cache_dir = %self.cache_dir.display(),
            generations = removed,
            "invalidated build history"
        );
        Ok(())
    }

    /// Removes generation directories other than `keep`, returning how many
    /// were removed.
    fn remove_generations(&self, keep: Option<&str>) -> Result<usize, CacheError> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(&self.cache_dir)(e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(io_error(&self.cache_dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(GENERATION_PREFIX) || Some(name) == keep {
                continue;
            }
            remove_dir_if_exists(&entry.path())?;
            removed += 1;
        }
        Ok(removed)
    }
}

fn is_generation_dir_name(name: &str) -> bool {
    name.strip_prefix(GENERATION_PREFIX)
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), CacheError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(dir)(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{Declaration, LookupKey};
    use crate::stores::UnitRecord;

    fn h(text: &str) -> ContentHash {
        ContentHash::from_bytes(text.as_bytes())
    }

    fn sample_snapshot(generation: u64) -> Snapshot {
        let mut stores = Stores::new();
        stores.commit_unit(UnitRecord {
            unit: UnitId::from("a.kt"),
            fingerprint: h("a source"),
            output_hash: h("a output"),
            declarations: vec![
                Declaration::function("pkg", "f", "()", h("(): Int")),
                Declaration::inline_function("pkg", "g", "()", h("(): Unit"), h("body")),
            ],
            lookups: vec![LookupKey::new("pkg", "missing")],
            inline_usages: Vec::new(),
        });
        Snapshot {
            generation,
            configuration_hash: h("config"),
            pending: BTreeSet::from([UnitId::from("broken.kt")]),
            stores,
        }
    }

    #[test]
    fn empty_directory_has_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        assert!(history.record().unwrap().is_none());
        assert!(history.load().unwrap().is_none());
    }

    #[test]
    fn commit_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        let snapshot = sample_snapshot(1);
        history.commit(&snapshot).unwrap();

        let loaded = history.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let record = history.record().unwrap().unwrap();
        assert_eq!(record.generation, 1);
        assert_eq!(record.unit_count, 1);
        assert_eq!(record.tables_dir, "gen-1");
        assert!(dir.path().join("gen-1").join("lookups.tbl").exists());
    }

    #[test]
    fn new_generation_replaces_old() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(1)).unwrap();
        history.commit(&sample_snapshot(2)).unwrap();

        assert!(!dir.path().join("gen-1").exists());
        assert!(dir.path().join("gen-2").exists());
        assert_eq!(history.load().unwrap().unwrap().generation, 2);
    }

    #[test]
    fn interrupted_commit_keeps_previous_generation() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(1)).unwrap();

        // A crash after writing tables but before replacing the record.
        std::fs::create_dir_all(dir.path().join("gen-2.tmp")).unwrap();
        std::fs::write(dir.path().join("gen-2.tmp").join("signatures.tbl"), b"partial").unwrap();

        assert_eq!(history.load().unwrap().unwrap().generation, 1);
    }

    #[test]
    fn corrupt_record_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("history.json"), "not valid json {{{").unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        assert!(matches!(
            history.load(),
            Err(CacheError::HistoryParse { .. })
        ));
    }

    #[test]
    fn damaged_table_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(1)).unwrap();

        let table = dir.path().join("gen-1").join("inline.tbl");
        let mut raw = std::fs::read(&table).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        std::fs::write(&table, raw).unwrap();

        let err = history.load().unwrap_err();
        assert!(matches!(err, CacheError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_table_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(1)).unwrap();
        std::fs::remove_file(dir.path().join("gen-1").join("signatures.tbl")).unwrap();
        assert!(matches!(history.load(), Err(CacheError::Io { .. })));
    }

    #[test]
    fn other_toolchain_is_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        BuildHistory::new(dir.path(), "1.0.0")
            .commit(&sample_snapshot(1))
            .unwrap();
        let err = BuildHistory::new(dir.path(), "2.0.0").load().unwrap_err();
        assert!(err.is_version_mismatch());
    }

    #[test]
    fn other_cache_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(1)).unwrap();

        let mut record = history.record().unwrap().unwrap();
        record.cache_version = CacheVersion::from(999_001);
        std::fs::write(
            dir.path().join("history.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            history.load(),
            Err(CacheError::CacheVersionMismatch { .. })
        ));
    }

    #[test]
    fn unit_count_disagreement_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(1)).unwrap();

        let mut record = history.record().unwrap().unwrap();
        record.unit_count = 5;
        std::fs::write(
            dir.path().join("history.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            history.load(),
            Err(CacheError::Inconsistent { .. })
        ));
    }

    #[test]
    fn invalidate_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let history = BuildHistory::new(dir.path(), "1.0.0");
        history.commit(&sample_snapshot(3)).unwrap();
        history.invalidate().unwrap();

        assert!(history.load().unwrap().is_none());
        assert!(!dir.path().join("gen-3").exists());
        // Invalidating twice is harmless.
        history.invalidate().unwrap();
    }

    #[test]
    fn generation_dir_names() {
        assert!(is_generation_dir_name("gen-12"));
        assert!(!is_generation_dir_name("gen-"));
        assert!(!is_generation_dir_name("gen-1.tmp"));
        assert!(!is_generation_dir_name("../etc"));
    }
}
