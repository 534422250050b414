//! Compares a unit's new declarations with its recorded signatures.

use std::collections::{BTreeMap, BTreeSet};

use ripple_cache::{Declaration, DeclarationId, LookupKey, UnitSignatures};
use ripple_common::ContentHash;

/// How an inline function changed in a way that affects its callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineChange {
    /// The body hash is now `new_body`.
    Body {
        /// The inline function.
        id: DeclarationId,
        /// Its current body hash.
        new_body: ContentHash,
    },
    /// The function is no longer inline or no longer exists here.
    Gone {
        /// The former inline function.
        id: DeclarationId,
    },
}

/// Declarations added, removed, and changed by one compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureDelta {
    /// Declarations that did not exist before.
    pub added: Vec<Declaration>,
    /// Declarations that no longer exist.
    pub removed: Vec<Declaration>,
    /// `(old, new)` pairs with the same identity that differ.
    pub changed: Vec<(Declaration, Declaration)>,
}

/// Diffs `new` against `old`. A unit without recorded signatures reports
/// every declaration as added.
pub fn diff(old: Option<&UnitSignatures>, new: &[Declaration]) -> SignatureDelta {
    let new_by_id: BTreeMap<&DeclarationId, &Declaration> =
        new.iter().map(|decl| (&decl.id, decl)).collect();
    let mut delta = SignatureDelta::default();

    if let Some(old) = old {
        for (id, old_decl) in &old.declarations {
            match new_by_id.get(id) {
                None => delta.removed.push(old_decl.clone()),
                Some(new_decl) if *new_decl != old_decl => {
                    delta.changed.push((old_decl.clone(), (*new_decl).clone()));
                }
                Some(_) => {}
            }
        }
    }
    for (id, decl) in &new_by_id {
        if old.map_or(true, |o| !o.declarations.contains_key(*id)) {
            delta.added.push((*decl).clone());
        }
    }
    delta
}

impl SignatureDelta {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Lookup keys whose resolution may differ after this change.
    ///
    /// A change confined to an inline body does not alter resolution and is
    /// handled through [`SignatureDelta::inline_changes`] instead.
    pub fn affected_keys(&self) -> BTreeSet<LookupKey> {
        let mut keys: BTreeSet<LookupKey> = self
            .added
            .iter()
            .chain(&self.removed)
            .map(Declaration::lookup_key)
            .collect();
        for (old, new) in &self.changed {
            if !old.differs_only_in_body(new) {
                keys.insert(new.lookup_key());
            }
        }
        keys
    }

    /// Member scopes of classes that appeared, disappeared, or changed shape.
    pub fn class_scopes(&self) -> BTreeSet<String> {
        let mut scopes: BTreeSet<String> = self
            .added
            .iter()
            .chain(&self.removed)
            .filter_map(Declaration::member_scope)
            .collect();
        for (old, new) in &self.changed {
            scopes.extend(old.member_scope());
            scopes.extend(new.member_scope());
        }
        scopes
    }

    /// Inline functions whose callers may hold a stale copy.
    pub fn inline_changes(&self) -> Vec<InlineChange> {
        let mut changes: Vec<InlineChange> = self
            .removed
            .iter()
            .filter(|decl| decl.is_inline())
            .map(|decl| InlineChange::Gone {
                id: decl.id.clone(),
            })
            .collect();
        for (old, new) in &self.changed {
            match (new.is_inline(), new.inline_body) {
                (true, Some(body)) => changes.push(InlineChange::Body {
                    id: new.id.clone(),
                    new_body: body,
                }),
                _ if old.is_inline() => changes.push(InlineChange::Gone {
                    id: old.id.clone(),
                }),
                _ => {}
            }
        }
        changes
    }
}
