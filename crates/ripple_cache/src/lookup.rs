//! Reverse index from lookup keys to the units that performed them.
//!
//! Every name a unit resolved (or failed to resolve) during its last
//! successful compile is recorded here. Failed lookups are what make adding
//! a new declaration sound: a unit that once searched for `(pkg, f)` and
//! found nothing must recompile when `pkg.f` appears.

use std::collections::{BTreeMap, BTreeSet};

use ripple_common::UnitId;
use serde::{Deserialize, Serialize};

use crate::decl::LookupKey;

/// Keys gained and lost by a unit when its lookup set was replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupUpdate {
    /// Keys the unit now looks up but did not before.
    pub added: Vec<LookupKey>,
    /// Keys the unit no longer looks up.
    pub removed: Vec<LookupKey>,
}

/// Maps each [`LookupKey`] to the set of units that looked it up.
///
/// A forward `unit → keys` map is kept alongside so that replacing or
/// removing a unit's lookups touches only the keys it had.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupIndex {
    dependents: BTreeMap<LookupKey, BTreeSet<UnitId>>,
    by_unit: BTreeMap<UnitId, BTreeSet<LookupKey>>,
}

impl LookupIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a single lookup of `key` by `unit`. Idempotent.
    pub fn record_lookup(&mut self, key: LookupKey, unit: UnitId) {
        self.by_unit
            .entry(unit.clone())
            .or_default()
            .insert(key.clone());
        self.dependents.entry(key).or_default().insert(unit);
    }

    /// Replaces the complete lookup set of `unit`.
    ///
    /// Keys the unit no longer performs are removed from the index, and keys
    /// left with no dependents are dropped entirely.
    pub fn record_lookups(
        &mut self,
        unit: &UnitId,
        keys: impl IntoIterator<Item = LookupKey>,
    ) -> LookupUpdate {
        let new_keys: BTreeSet<LookupKey> = keys.into_iter().collect();
        let old_keys = self.by_unit.remove(unit).unwrap_or_default();

        let removed: Vec<LookupKey> = old_keys.difference(&new_keys).cloned().collect();
        let added: Vec<LookupKey> = new_keys.difference(&old_keys).cloned().collect();

        for key in &removed {
            self.unlink(key, unit);
        }
        for key in &added {
            self.dependents
                .entry(key.clone())
                .or_default()
                .insert(unit.clone());
        }
        if !new_keys.is_empty() {
            self.by_unit.insert(unit.clone(), new_keys);
        }

        LookupUpdate { added, removed }
    }

    /// Iterates over the units that looked up `key`, in order.
    pub fn dependents_of<'a>(&'a self, key: &LookupKey) -> impl Iterator<Item = &'a UnitId> + 'a {
        self.dependents.get(key).into_iter().flatten()
    }

    /// Returns every unit that looked up any name in `scope`.
    pub fn dependents_in_scope(&self, scope: &str) -> BTreeSet<UnitId> {
        let start = LookupKey::new(scope, "");
        self.dependents
            .range(start..)
            .take_while(|(key, _)| key.scope == scope)
            .flat_map(|(_, units)| units.iter().cloned())
            .collect()
    }

    /// Returns the keys `unit` looked up in its last successful compile.
    pub fn lookups_of(&self, unit: &UnitId) -> impl Iterator<Item = &LookupKey> {
        self.by_unit.get(unit).into_iter().flatten()
    }

    /// Drops every lookup made by `unit`.
    pub fn remove_unit(&mut self, unit: &UnitId) {
        if let Some(keys) = self.by_unit.remove(unit) {
            for key in &keys {
                self.unlink(key, unit);
            }
        }
    }

    /// Number of distinct keys with at least one dependent.
    pub fn key_count(&self) -> usize {
        self.dependents.len()
    }

    /// Number of units with recorded lookups.
    pub fn unit_count(&self) -> usize {
        self.by_unit.len()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.dependents.clear();
        self.by_unit.clear();
    }

    fn unlink(&mut self, key: &LookupKey, unit: &UnitId) {
        if let Some(units) = self.dependents.get_mut(key) {
            units.remove(unit);
            if units.is_empty() {
                self.dependents.remove(key);
            }
        }
    }
}
