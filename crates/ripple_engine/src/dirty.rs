//! The set of units that must be recompiled in the current build.

use std::collections::BTreeMap;
use std::fmt;

use ripple_cache::{ChangeKind, DeclarationId, LookupKey};
use ripple_common::UnitId;

/// Why a unit became dirty. Only the first reason is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirtyReason {
    /// Reported by the host.
    Changed(ChangeKind),
    /// Failed to compile in a previous build.
    Pending,
    /// Looked up a name whose resolution changed.
    Lookup(LookupKey),
    /// Looked up something in a class member scope that changed.
    ScopeMember(String),
    /// Embedded a stale copy of an inline function.
    Inline(DeclarationId),
    /// Part of a full rebuild.
    FullRebuild,
}

impl fmt::Display for DirtyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirtyReason::Changed(kind) => write!(f, "{kind}"),
            DirtyReason::Pending => f.write_str("pending from previous build"),
            DirtyReason::Lookup(key) => write!(f, "lookup of {key}"),
            DirtyReason::ScopeMember(scope) => write!(f, "member of {scope}"),
            DirtyReason::Inline(id) => write!(f, "inlines {id}"),
            DirtyReason::FullRebuild => f.write_str("full rebuild"),
        }
    }
}

/// Units marked dirty during one build, with the reason each was first
/// marked.
///
/// The set only grows within a build.
#[derive(Debug, Clone, Default)]
pub struct DirtySet {
    units: BTreeMap<UnitId, DirtyReason>,
}

impl DirtySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `unit` dirty. Returns `true` if it was not dirty before.
    pub fn insert(&mut self, unit: UnitId, reason: DirtyReason) -> bool {
        match self.units.entry(unit) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(reason);
                true
            }
        }
    }

    /// Returns `true` if `unit` is dirty.
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.units.contains_key(unit)
    }

    /// The reason `unit` was first marked dirty.
    pub fn reason_of(&self, unit: &UnitId) -> Option<&DirtyReason> {
        self.units.get(unit)
    }

    /// Iterates over dirty units in order.
    pub fn units(&self) -> impl Iterator<Item = &UnitId> {
        self.units.keys()
    }

    /// Iterates over dirty units and their reasons in order.
    pub fn iter(&self) -> impl Iterator<Item = (&UnitId, &DirtyReason)> {
        self.units.iter()
    }

    /// Number of dirty units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if nothing is dirty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
