//! Per-unit store of externally visible declaration signatures.

use std::collections::{BTreeMap, BTreeSet};

use ripple_common::{ContentHash, UnitId};
use serde::{Deserialize, Serialize};

use crate::decl::{DeclKind, Declaration, DeclarationId};

/// Everything recorded for one unit after its last successful compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSignatures {
    /// Content fingerprint of the source that was compiled.
    pub fingerprint: ContentHash,
    /// Hash of the emitted output.
    pub output_hash: ContentHash,
    /// Declarations keyed by their stable identity.
    pub declarations: BTreeMap<DeclarationId, Declaration>,
}

impl UnitSignatures {
    /// Builds a signature set. Later duplicates of the same identity replace
    /// earlier ones.
    pub fn new(
        fingerprint: ContentHash,
        output_hash: ContentHash,
        declarations: impl IntoIterator<Item = Declaration>,
    ) -> Self {
        Self {
            fingerprint,
            output_hash,
            declarations: declarations
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
        }
    }

    /// Looks up a declaration by identity.
    pub fn get(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.declarations.get(id)
    }

    /// Iterates over the declarations in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }
}

/// Store of the last recorded [`UnitSignatures`] of every unit.
///
/// Maintains a declaration → owner index alongside, which is rebuilt from the
/// unit table on deserialization and never persisted separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<UnitId, UnitSignatures>",
    into = "BTreeMap<UnitId, UnitSignatures>"
)]
pub struct SignatureStore {
    units: BTreeMap<UnitId, UnitSignatures>,
    owners: BTreeMap<DeclarationId, UnitId>,
}

impl SignatureStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the signature set of `unit`, returning the previous one.
    pub fn record_signatures(
        &mut self,
        unit: UnitId,
        signatures: UnitSignatures,
    ) -> Option<UnitSignatures> {
        let previous = self.detach(&unit);
        for id in signatures.declarations.keys() {
            self.owners.insert(id.clone(), unit.clone());
        }
        self.units.insert(unit, signatures);
        previous
    }

    /// Returns the last recorded signatures of `unit`, or `None` if the unit
    /// has never compiled successfully.
    pub fn signatures_for(&self, unit: &UnitId) -> Option<&UnitSignatures> {
        self.units.get(unit)
    }

    /// Tombstones `unit`, returning its last recorded signatures.
    pub fn remove(&mut self, unit: &UnitId) -> Option<UnitSignatures> {
        self.detach(unit)
    }

    /// Returns the unit that owns a declaration.
    pub fn owner_of(&self, id: &DeclarationId) -> Option<&UnitId> {
        self.owners.get(id)
    }

    /// Returns `true` if the unit has recorded signatures.
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.units.contains_key(unit)
    }

    /// Iterates over all known units in order.
    pub fn units(&self) -> impl Iterator<Item = &UnitId> {
        self.units.keys()
    }

    /// Returns the source fingerprint of every known unit.
    pub fn fingerprints(&self) -> BTreeMap<UnitId, ContentHash> {
        self.units
            .iter()
            .map(|(unit, sigs)| (unit.clone(), sigs.fingerprint))
            .collect()
    }

    /// Number of units with recorded signatures.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if no unit is recorded.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Removes every unit.
    pub fn clear(&mut self) {
        self.units.clear();
        self.owners.clear();
    }

    /// Builds the supertype → subclass index over all recorded classes.
    pub fn hierarchy(&self) -> ClassHierarchy {
        let mut subclasses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for decl in self.units.values().flat_map(UnitSignatures::iter) {
            if decl.kind != DeclKind::Class {
                continue;
            }
            let own_scope = decl.id.qualified_name();
            for supertype in &decl.supertypes {
                subclasses
                    .entry(supertype.clone())
                    .or_default()
                    .insert(own_scope.clone());
            }
        }
        ClassHierarchy { subclasses }
    }

    fn detach(&mut self, unit: &UnitId) -> Option<UnitSignatures> {
        let previous = self.units.remove(unit)?;
        for id in previous.declarations.keys() {
            if self.owners.get(id) == Some(unit) {
                self.owners.remove(id);
            }
        }
        Some(previous)
    }
}

impl From<BTreeMap<UnitId, UnitSignatures>> for SignatureStore {
    fn from(units: BTreeMap<UnitId, UnitSignatures>) -> Self {
        let mut store = SignatureStore::new();
        for (unit, signatures) in units {
            store.record_signatures(unit, signatures);
        }
        store
    }
}

impl From<SignatureStore> for BTreeMap<UnitId, UnitSignatures> {
    fn from(store: SignatureStore) -> Self {
        store.units
    }
}

/// Subclass relation between class member scopes, derived from the recorded
/// supertypes.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    subclasses: BTreeMap<String, BTreeSet<String>>,
}

impl ClassHierarchy {
    /// Returns the member scopes of all transitive subclasses of `scope`,
    /// excluding `scope` itself.
    pub fn subtypes_of(&self, scope: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![scope.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.subclasses.get(&current) {
                for child in children {
                    if child != scope && found.insert(child.clone()) {
                        stack.push(child.clone());
                    }
                }
            }
        }
        found
    }
}
