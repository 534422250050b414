//! The dirty-set propagator state machine.
//!
//! ```text
//! Idle --seed--> Seeding --> Expanding --absorb--> Expanding ... --> Fixpoint --finish--> Done
//!                                 \                                      
//!                                  `--> Aborted (round cap, structural change)
//! ```
//!
//! Each round the controller compiles the current batch and hands the
//! results to [`Propagator::absorb`]. All deltas of a round are computed
//! against the stores as they were at the start of the round; the successful
//! outputs are committed afterwards, so no unit of a round observes another
//! unit's half-applied changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ripple_cache::{ChangeKind, ChangedUnit, ClassHierarchy, DeclarationId, LookupKey, Stores};
use ripple_common::{InternalError, RippleResult, UnitId};

use crate::differ::{diff, InlineChange, SignatureDelta};
use crate::dirty::{DirtyReason, DirtySet};
use crate::frontend::{CompileOutput, CompileResult};

/// Why propagation gave up and demanded a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// No fixpoint within the configured number of rounds.
    RoundLimitExceeded {
        /// The round cap.
        limit: u32,
    },
    /// The configuration hash differs from the history's.
    ConfigurationMismatch,
    /// The build history could not be read.
    CacheCorruption(String),
    /// The build history was written by another cache layout or toolchain.
    CacheVersionMismatch(String),
    /// A change the summaries cannot express, such as one declaration
    /// claimed by two live units.
    StructuralChange(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::RoundLimitExceeded { limit } => {
                write!(f, "no fixpoint within {limit} rounds")
            }
            AbortReason::ConfigurationMismatch => {
                f.write_str("configuration changed since the last build")
            }
            AbortReason::CacheCorruption(reason) => write!(f, "build history is corrupt: {reason}"),
            AbortReason::CacheVersionMismatch(reason) => {
                write!(f, "build history is incompatible: {reason}")
            }
            AbortReason::StructuralChange(reason) => write!(f, "structural change: {reason}"),
        }
    }
}

/// Propagator lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagatorState {
    /// Created, not yet seeded.
    Idle,
    /// Computing the initial dirty set.
    Seeding,
    /// A batch is waiting to be compiled.
    Expanding,
    /// The last round discovered nothing new.
    Fixpoint,
    /// Fixpoint reached and the history committed.
    Done,
    /// Propagation cannot continue; a full rebuild is required.
    Aborted(AbortReason),
}

/// What one call to [`Propagator::absorb`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    /// 1-based round number.
    pub round: u32,
    /// Units compiled successfully and committed.
    pub compiled: Vec<UnitId>,
    /// Units that failed to compile.
    pub failed: Vec<UnitId>,
    /// The next batch, empty at fixpoint or on abort.
    pub next: Vec<UnitId>,
}

/// Units affected by a delta, each with the first reason found.
#[derive(Default)]
struct Affected(BTreeMap<UnitId, DirtyReason>);

impl Affected {
    fn mark<'a>(&mut self, units: impl IntoIterator<Item = &'a UnitId>, reason: &DirtyReason) {
        for unit in units {
            if !self.0.contains_key(unit) {
                self.0.insert(unit.clone(), reason.clone());
            }
        }
    }

    /// Records every unit whose last compile consumed something `delta`
    /// changed.
    fn collect(&mut self, delta: &SignatureDelta, stores: &Stores, hierarchy: &ClassHierarchy) {
        for key in delta.affected_keys() {
            let reason = DirtyReason::Lookup(key.clone());
            self.mark(stores.lookups.dependents_of(&key), &reason);
            // Members are also resolved through the scopes of subclasses.
            for sub in hierarchy.subtypes_of(&key.scope) {
                let inherited = LookupKey::new(sub, key.name.clone());
                self.mark(stores.lookups.dependents_of(&inherited), &reason);
            }
        }
        for scope in delta.class_scopes() {
            let reason = DirtyReason::ScopeMember(scope.clone());
            self.mark(&stores.lookups.dependents_in_scope(&scope), &reason);
            for sub in hierarchy.subtypes_of(&scope) {
                self.mark(&stores.lookups.dependents_in_scope(&sub), &reason);
            }
        }
        for change in delta.inline_changes() {
            let (id, callers) = match change {
                InlineChange::Body { id, new_body } => {
                    let callers = stores.inline.callers_of(&id, new_body);
                    (id, callers)
                }
                InlineChange::Gone { id } => {
                    let callers = stores.inline.all_callers(&id);
                    (id, callers)
                }
            };
            self.mark(&callers, &DirtyReason::Inline(id));
        }
    }
}

/// Drives one build's dirty set from the host's changes to a fixpoint.
#[derive(Debug)]
pub struct Propagator {
    state: PropagatorState,
    project: BTreeSet<UnitId>,
    max_rounds: u32,
    round: u32,
    dirty: DirtySet,
    batch: Vec<UnitId>,
    rounds: Vec<Vec<UnitId>>,
    compiled: BTreeSet<UnitId>,
    failed: BTreeSet<UnitId>,
    removed: BTreeSet<UnitId>,
}

impl Propagator {
    /// Creates an idle propagator over the units currently in the project.
    pub fn new(project: impl IntoIterator<Item = UnitId>, max_rounds: u32) -> Self {
        Self {
            state: PropagatorState::Idle,
            project: project.into_iter().collect(),
            max_rounds,
            round: 0,
            dirty: DirtySet::new(),
            batch: Vec::new(),
            rounds: Vec::new(),
            compiled: BTreeSet::new(),
            failed: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Computes the initial dirty set and returns the first batch.
    ///
    /// Removed units are tombstoned in all stores after the units that
    /// consumed their declarations have been collected. Units that failed
    /// in the previous build (`pending`) are re-seeded.
    pub fn seed(
        &mut self,
        changes: &[ChangedUnit],
        pending: &BTreeSet<UnitId>,
        stores: &mut Stores,
    ) -> RippleResult<Vec<UnitId>> {
        self.expect_state(&PropagatorState::Idle, "seed")?;
        self.state = PropagatorState::Seeding;

        let hierarchy = stores.signatures.hierarchy();
        let mut affected = Affected::default();

        let removed: BTreeSet<UnitId> = changes
            .iter()
            .filter(|change| change.kind == ChangeKind::Removed)
            .map(|change| change.unit.clone())
            .collect();
        for unit in &removed {
            if let Some(old) = stores.signatures.signatures_for(unit) {
                affected.collect(&diff(Some(old), &[]), stores, &hierarchy);
            }
        }
        for unit in &removed {
            if stores.tombstone(unit).is_some() {
                tracing::debug!(unit = %unit, "tombstoned removed unit");
            }
            self.project.remove(unit);
        }
        self.removed = removed;

        for change in changes {
            if change.kind != ChangeKind::Removed && !self.removed.contains(&change.unit) {
                self.project.insert(change.unit.clone());
                self.dirty
                    .insert(change.unit.clone(), DirtyReason::Changed(change.kind));
            }
        }
        for unit in pending {
            if self.project.contains(unit) {
                self.dirty.insert(unit.clone(), DirtyReason::Pending);
            }
        }
        for (unit, reason) in affected.0 {
            if self.project.contains(&unit) {
                self.dirty.insert(unit, reason);
            }
        }

        self.batch = self.dirty.units().cloned().collect();
        tracing::debug!(
            dirty = self.batch.len(),
            removed = self.removed.len(),
            "seeded dirty set"
        );
        self.state = if self.batch.is_empty() {
            PropagatorState::Fixpoint
        } else {
            PropagatorState::Expanding
        };
        Ok(self.batch.clone())
    }

    /// Absorbs the compile results of the current batch and computes the
    /// next one.
    pub fn absorb(
        &mut self,
        mut results: Vec<(UnitId, CompileResult)>,
        stores: &mut Stores,
    ) -> RippleResult<RoundSummary> {
        self.expect_state(&PropagatorState::Expanding, "absorb")?;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        self.round += 1;

        let mut outputs: Vec<(UnitId, CompileOutput)> = Vec::new();
        let mut failed = Vec::new();
        for (unit, result) in results {
            match result {
                CompileResult::Success(output) => outputs.push((unit, output)),
                CompileResult::Failure { .. } => failed.push(unit),
            }
        }
        let round_units: BTreeSet<UnitId> = outputs
            .iter()
            .map(|(unit, _)| unit.clone())
            .chain(failed.iter().cloned())
            .collect();
        self.rounds.push(round_units.iter().cloned().collect());
        self.failed.extend(failed.iter().cloned());

        if let Some(conflict) = ownership_conflict(&outputs, stores) {
            tracing::warn!(round = self.round, %conflict, "aborting propagation");
            self.state = PropagatorState::Aborted(AbortReason::StructuralChange(conflict));
            return Ok(RoundSummary {
                round: self.round,
                compiled: Vec::new(),
                failed,
                next: Vec::new(),
            });
        }

        // Read phase: every delta is computed against the pre-round state.
        let hierarchy = stores.signatures.hierarchy();
        let mut affected = Affected::default();
        for (unit, output) in &outputs {
            let delta = diff(stores.signatures.signatures_for(unit), &output.declarations);
            if !delta.is_empty() {
                tracing::debug!(
                    unit = %unit,
                    added = delta.added.len(),
                    removed = delta.removed.len(),
                    changed = delta.changed.len(),
                    "signature delta"
                );
            }
            affected.collect(&delta, stores, &hierarchy);
        }

        // Commit phase.
        let mut compiled = Vec::with_capacity(outputs.len());
        for (unit, output) in outputs {
            stores.commit_unit(output.into_record(unit.clone()));
            self.compiled.insert(unit.clone());
            compiled.push(unit);
        }

        let mut next = Vec::new();
        for (unit, reason) in affected.0 {
            if !self.project.contains(&unit)
                || round_units.contains(&unit)
                || self.failed.contains(&unit)
            {
                continue;
            }
            self.dirty.insert(unit.clone(), reason);
            next.push(unit);
        }

        tracing::debug!(
            round = self.round,
            compiled = compiled.len(),
            failed = failed.len(),
            discovered = next.len(),
            "round complete"
        );

        if next.is_empty() {
            self.state = PropagatorState::Fixpoint;
        } else if self.round >= self.max_rounds {
            self.state = PropagatorState::Aborted(AbortReason::RoundLimitExceeded {
                limit: self.max_rounds,
            });
            next.clear();
        } else {
            self.batch = next.clone();
        }
        Ok(RoundSummary {
            round: self.round,
            compiled,
            failed,
            next,
        })
    }

    /// Moves from `Fixpoint` to `Done` once the history is committed.
    pub fn finish(&mut self) -> RippleResult<()> {
        self.expect_state(&PropagatorState::Fixpoint, "finish")?;
        self.state = PropagatorState::Done;
        Ok(())
    }

    /// Aborts propagation from any state.
    pub fn abort(&mut self, reason: AbortReason) {
        self.state = PropagatorState::Aborted(reason);
    }

    /// Current state.
    pub fn state(&self) -> &PropagatorState {
        &self.state
    }

    /// Number of rounds absorbed so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// The batch waiting to be compiled.
    pub fn batch(&self) -> &[UnitId] {
        &self.batch
    }

    /// Units compiled in each absorbed round.
    pub fn rounds(&self) -> &[Vec<UnitId>] {
        &self.rounds
    }

    /// Every unit marked dirty in this build.
    pub fn dirty(&self) -> &DirtySet {
        &self.dirty
    }

    /// Units compiled successfully in this build.
    pub fn compiled(&self) -> &BTreeSet<UnitId> {
        &self.compiled
    }

    /// Units whose compile failed in this build.
    pub fn failed(&self) -> &BTreeSet<UnitId> {
        &self.failed
    }

    /// Units removed from the project in this build.
    pub fn removed(&self) -> &BTreeSet<UnitId> {
        &self.removed
    }

    fn expect_state(&self, expected: &PropagatorState, operation: &str) -> RippleResult<()> {
        if &self.state == expected {
            Ok(())
        } else {
            Err(InternalError::new(format!(
                "cannot {operation} in state {:?}",
                self.state
            )))
        }
    }
}

/// Finds a declaration claimed by two live units.
///
/// The stores record one owner per declaration, so a declaration that is
/// declared by two units in this round, or whose recorded owner was not
/// recompiled alongside the new claimant, cannot be represented.
fn ownership_conflict(outputs: &[(UnitId, CompileOutput)], stores: &Stores) -> Option<String> {
    let round: BTreeSet<&UnitId> = outputs.iter().map(|(unit, _)| unit).collect();
    let mut claims: BTreeMap<&DeclarationId, &UnitId> = BTreeMap::new();
    for (unit, output) in outputs {
        for decl in &output.declarations {
            if let Some(other) = claims.insert(&decl.id, unit) {
                if other != unit {
                    return Some(format!("{} declared by both {other} and {unit}", decl.id));
                }
            }
            if let Some(owner) = stores.signatures.owner_of(&decl.id) {
                if owner != unit && !round.contains(owner) {
                    return Some(format!(
                        "{} declared by {unit} but still owned by {owner}",
                        decl.id
                    ));
                }
            }
        }
    }
    None
}
