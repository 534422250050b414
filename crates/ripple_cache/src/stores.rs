//! The three summary stores, committed together per unit.

use std::collections::BTreeSet;

use ripple_common::{ContentHash, UnitId};
use serde::{Deserialize, Serialize};

use crate::decl::{Declaration, DeclarationId, LookupKey};
use crate::inline::{InlineCache, InlineUsage};
use crate::lookup::LookupIndex;
use crate::signature::{SignatureStore, UnitSignatures};

/// Everything the front-end reported for one successfully compiled unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    /// The unit that was compiled.
    pub unit: UnitId,
    /// Fingerprint of the compiled source.
    pub fingerprint: ContentHash,
    /// Hash of the emitted output.
    pub output_hash: ContentHash,
    /// Externally visible declarations.
    pub declarations: Vec<Declaration>,
    /// Every lookup performed, including failed ones.
    pub lookups: Vec<LookupKey>,
    /// Inline bodies embedded into this unit's output.
    pub inline_usages: Vec<InlineUsage>,
}

/// Signature store, lookup index, and inline cache.
///
/// Mutations go through [`Stores::commit_unit`] and [`Stores::tombstone`],
/// which keep the three stores consistent with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stores {
    /// Per-unit declarations.
    pub signatures: SignatureStore,
    /// Per-key dependents.
    pub lookups: LookupIndex,
    /// Inline bodies and their callers.
    pub inline: InlineCache,
}

impl Stores {
    /// Creates empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything recorded for `record.unit` with the new record.
    ///
    /// Returns the unit's previous signatures.
    pub fn commit_unit(&mut self, record: UnitRecord) -> Option<UnitSignatures> {
        let UnitRecord {
            unit,
            fingerprint,
            output_hash,
            declarations,
            lookups,
            inline_usages,
        } = record;

        let new_inline: BTreeSet<DeclarationId> = declarations
            .iter()
            .filter(|d| d.is_inline())
            .map(|d| d.id.clone())
            .collect();
        for decl in &declarations {
            if let (true, Some(body)) = (decl.is_inline(), decl.inline_body) {
                self.inline.record_body(decl.id.clone(), body);
            }
        }

        let previous = self.signatures.record_signatures(
            unit.clone(),
            UnitSignatures::new(fingerprint, output_hash, declarations),
        );
        if let Some(old) = &previous {
            for decl in old.iter().filter(|d| d.is_inline()) {
                if !new_inline.contains(&decl.id) && !self.owned_elsewhere(&decl.id, &unit) {
                    self.inline.remove_declaration(&decl.id);
                }
            }
        }

        self.lookups.record_lookups(&unit, lookups);
        self.inline.replace_usages(&unit, inline_usages);
        previous
    }

    /// Removes `unit` from all three stores, returning its last signatures.
    ///
    /// Dependents of the unit's declarations must be computed before calling
    /// this, since the owner's entries are gone afterwards.
    pub fn tombstone(&mut self, unit: &UnitId) -> Option<UnitSignatures> {
        let previous = self.signatures.remove(unit);
        if let Some(old) = &previous {
            for decl in old.iter().filter(|d| d.is_inline()) {
                if !self.owned_elsewhere(&decl.id, unit) {
                    self.inline.remove_declaration(&decl.id);
                }
            }
        }
        self.lookups.remove_unit(unit);
        self.inline.remove_caller(unit);
        previous
    }

    /// Empties all three stores.
    pub fn clear(&mut self) {
        self.signatures.clear();
        self.lookups.clear();
        self.inline.clear();
    }

    fn owned_elsewhere(&self, id: &DeclarationId, unit: &UnitId) -> bool {
        self.signatures
            .owner_of(id)
            .is_some_and(|owner| owner != unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(text: &str) -> ContentHash {
        ContentHash::from_bytes(text.as_bytes())
    }

    fn record(unit: &str, declarations: Vec<Declaration>, lookups: Vec<LookupKey>) -> UnitRecord {
        UnitRecord {
            unit: UnitId::from(unit),
            fingerprint: h(unit),
            output_hash: h("out"),
            declarations,
            lookups,
            inline_usages: Vec::new(),
        }
    }

    #[test]
    fn commit_populates_all_stores() {
        let mut stores = Stores::new();
        let g = Declaration::inline_function("pkg", "g", "()", h("sig"), h("body"));
        let mut rec = record("a.kt", vec![g.clone()], vec![LookupKey::new("pkg", "x")]);
        rec.inline_usages
            .push(InlineUsage::new(DeclarationId::new("pkg", "k", "()"), h("k")));

        assert!(stores.commit_unit(rec).is_none());
        assert!(stores.signatures.contains(&UnitId::from("a.kt")));
        assert_eq!(stores.inline.body_hash(&g.id), Some(h("body")));
        assert_eq!(stores.lookups.key_count(), 1);
        assert_eq!(
            stores
                .inline
                .all_callers(&DeclarationId::new("pkg", "k", "()"))
                .len(),
            1
        );
    }

    #[test]
    fn inline_demoted_to_regular_function_is_dropped() {
        let mut stores = Stores::new();
        let g = Declaration::inline_function("pkg", "g", "()", h("sig"), h("body"));
        stores.commit_unit(record("a.kt", vec![g.clone()], vec![]));

        let plain = Declaration::function("pkg", "g", "()", h("sig"));
        stores.commit_unit(record("a.kt", vec![plain], vec![]));
        assert!(stores.inline.body_hash(&g.id).is_none());
    }

    #[test]
    fn tombstone_clears_unit_everywhere() {
        let mut stores = Stores::new();
        let g = Declaration::inline_function("pkg", "g", "()", h("sig"), h("body"));
        let mut rec = record("a.kt", vec![g.clone()], vec![LookupKey::new("pkg", "x")]);
        rec.inline_usages.push(InlineUsage::new(g.id.clone(), h("body")));
        stores.commit_unit(rec);

        let previous = stores.tombstone(&UnitId::from("a.kt")).unwrap();
        assert_eq!(previous.declarations.len(), 1);
        assert!(stores.signatures.is_empty());
        assert_eq!(stores.lookups.key_count(), 0);
        assert!(stores.inline.is_empty());
    }

    #[test]
    fn moved_inline_function_survives_old_owner() {
        let mut stores = Stores::new();
        let g = Declaration::inline_function("pkg", "g", "()", h("sig"), h("body"));
        stores.commit_unit(record("a.kt", vec![g.clone()], vec![]));
        stores.commit_unit(record("b.kt", vec![g.clone()], vec![]));
        stores.tombstone(&UnitId::from("a.kt"));
        assert_eq!(stores.inline.body_hash(&g.id), Some(h("body")));
    }
}
