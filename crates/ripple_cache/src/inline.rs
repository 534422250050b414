//! Tracks which units embedded which inline function bodies.
//!
//! A caller that inlined a function carries a copy of its body in its own
//! output, so it is stale whenever the body changes even if the signature
//! does not. Each caller remembers the body hash it embedded; a caller is
//! affected when that hash differs from the current one.

use std::collections::{BTreeMap, BTreeSet};

use ripple_common::{ContentHash, UnitId};
use serde::{Deserialize, Serialize};

use crate::decl::DeclarationId;

/// One inline call site reported by the front-end for a compiled unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineUsage {
    /// The inline function that was embedded.
    pub declaration: DeclarationId,
    /// The body hash that was embedded.
    pub body_hash: ContentHash,
}

impl InlineUsage {
    /// Creates a usage record.
    pub fn new(declaration: DeclarationId, body_hash: ContentHash) -> Self {
        Self {
            declaration,
            body_hash,
        }
    }
}

/// Cached state for one inline function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineEntry {
    /// Body hash recorded from the owner's last successful compile, if the
    /// owner has been compiled.
    pub body_hash: Option<ContentHash>,
    /// Callers and the body hash each of them embedded.
    pub callers: BTreeMap<UnitId, ContentHash>,
}

/// Inline body hashes and their callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineCache {
    entries: BTreeMap<DeclarationId, InlineEntry>,
    by_caller: BTreeMap<UnitId, BTreeSet<DeclarationId>>,
}

impl InlineCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current body hash of an inline function.
    pub fn record_body(&mut self, id: DeclarationId, body_hash: ContentHash) {
        self.entries.entry(id).or_default().body_hash = Some(body_hash);
    }

    /// Returns the recorded body hash of an inline function.
    pub fn body_hash(&self, id: &DeclarationId) -> Option<ContentHash> {
        self.entries.get(id).and_then(|entry| entry.body_hash)
    }

    /// Records that `caller` embedded `body_hash` of `id`.
    pub fn record_inline_usage(
        &mut self,
        id: DeclarationId,
        body_hash: ContentHash,
        caller: UnitId,
    ) {
        self.by_caller
            .entry(caller.clone())
            .or_default()
            .insert(id.clone());
        self.entries
            .entry(id)
            .or_default()
            .callers
            .insert(caller, body_hash);
    }

    /// Replaces every usage recorded for `caller`.
    pub fn replace_usages(
        &mut self,
        caller: &UnitId,
        usages: impl IntoIterator<Item = InlineUsage>,
    ) {
        self.remove_caller(caller);
        for usage in usages {
            self.record_inline_usage(usage.declaration, usage.body_hash, caller.clone());
        }
    }

    /// Returns the callers of `id` whose embedded body differs from `new_body`.
    pub fn callers_of(&self, id: &DeclarationId, new_body: ContentHash) -> BTreeSet<UnitId> {
        self.entries
            .get(id)
            .map(|entry| {
                entry
                    .callers
                    .iter()
                    .filter(|(_, embedded)| **embedded != new_body)
                    .map(|(caller, _)| caller.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns every caller of `id`, regardless of the body it embedded.
    pub fn all_callers(&self, id: &DeclarationId) -> BTreeSet<UnitId> {
        self.entries
            .get(id)
            .map(|entry| entry.callers.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops an inline function that no longer exists, returning its callers.
    pub fn remove_declaration(&mut self, id: &DeclarationId) -> BTreeSet<UnitId> {
        let Some(entry) = self.entries.remove(id) else {
            return BTreeSet::new();
        };
        for caller in entry.callers.keys() {
            if let Some(ids) = self.by_caller.get_mut(caller) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_caller.remove(caller);
                }
            }
        }
        entry.callers.into_keys().collect()
    }

    /// Drops every usage recorded for `caller`.
    pub fn remove_caller(&mut self, caller: &UnitId) {
        let Some(ids) = self.by_caller.remove(caller) else {
            return;
        };
        for id in ids {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.callers.remove(caller);
                if entry.callers.is_empty() && entry.body_hash.is_none() {
                    self.entries.remove(&id);
                }
            }
        }
    }

    /// Number of tracked inline functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_caller.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(text: &str) -> ContentHash {
        ContentHash::from_bytes(text.as_bytes())
    }

    fn g() -> DeclarationId {
        DeclarationId::new("pkg", "g", "()")
    }

    #[test]
    fn callers_with_stale_body_are_affected() {
        let mut cache = InlineCache::new();
        cache.record_body(g(), h("v1"));
        cache.record_inline_usage(g(), h("v1"), UnitId::from("c.kt"));
        cache.record_inline_usage(g(), h("v2"), UnitId::from("d.kt"));

        let affected = cache.callers_of(&g(), h("v2"));
        assert_eq!(affected, BTreeSet::from([UnitId::from("c.kt")]));
        assert!(cache.callers_of(&g(), h("v1")).contains(&UnitId::from("d.kt")));
    }

    #[test]
    fn unchanged_body_affects_nobody() {
        let mut cache = InlineCache::new();
        cache.record_body(g(), h("v1"));
        cache.record_inline_usage(g(), h("v1"), UnitId::from("c.kt"));
        assert!(cache.callers_of(&g(), h("v1")).is_empty());
    }

    #[test]
    fn replace_usages_forgets_old_call_sites() {
        let mut cache = InlineCache::new();
        let other = DeclarationId::new("pkg", "k", "()");
        let caller = UnitId::from("c.kt");
        cache.record_body(g(), h("v1"));
        cache.record_inline_usage(g(), h("v1"), caller.clone());

        cache.replace_usages(&caller, [InlineUsage::new(other.clone(), h("k1"))]);

        assert!(cache.all_callers(&g()).is_empty());
        assert_eq!(cache.all_callers(&other), BTreeSet::from([caller]));
        assert_eq!(cache.body_hash(&g()), Some(h("v1")));
    }

    #[test]
    fn remove_declaration_returns_callers() {
        let mut cache = InlineCache::new();
        cache.record_body(g(), h("v1"));
        cache.record_inline_usage(g(), h("v1"), UnitId::from("c.kt"));

        let callers = cache.remove_declaration(&g());
        assert_eq!(callers, BTreeSet::from([UnitId::from("c.kt")]));
        assert!(cache.is_empty());
        assert!(cache.remove_declaration(&g()).is_empty());
    }

    #[test]
    fn orphaned_usage_entries_are_dropped() {
        let mut cache = InlineCache::new();
        let caller = UnitId::from("c.kt");
        cache.record_inline_usage(g(), h("v1"), caller.clone());
        cache.remove_caller(&caller);
        assert!(cache.is_empty());
    }
}
