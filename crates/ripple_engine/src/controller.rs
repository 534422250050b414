//! The round controller: loads the history, drives the propagator through
//! compile rounds, and falls back to a full rebuild when the incremental
//! state cannot be trusted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use ripple_cache::{BuildHistory, ChangeKind, ChangedUnit, DeclarationId, SignatureStore, Snapshot, Stores};
use ripple_common::{ContentHash, InternalError, UnitId};
use ripple_config::ProjectConfig;
use ripple_diagnostics::{Diagnostic, DiagnosticSink};

use crate::codes;
use crate::error::BuildError;
use crate::frontend::{CompileResult, Frontend, FrontendError};
use crate::propagator::{AbortReason, Propagator, PropagatorState};

/// Settings that control one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Use the build history. When `false` every build is a full rebuild.
    pub incremental: bool,
    /// Maximum number of compile rounds before giving up.
    pub max_rounds: u32,
    /// Compile the units of a batch concurrently.
    pub parallel: bool,
    /// Hash of every setting that affects compiler output.
    pub configuration_hash: ContentHash,
}

impl BuildOptions {
    /// Derives build options from a project configuration.
    pub fn from_config(config: &ProjectConfig) -> Self {
        Self {
            incremental: config.incremental.enabled,
            max_rounds: config.incremental.max_rounds,
            parallel: config.incremental.parallel,
            configuration_hash: config.configuration_hash(),
        }
    }
}

/// What the host asks the engine to build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Every unit currently in the project.
    pub units: Vec<UnitId>,
    /// Units the host knows changed since the last build.
    pub changes: Vec<ChangedUnit>,
}

/// Shared flag for cancelling a build between rounds.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Final result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Incremental propagation reached a fixpoint. Units that failed along
    /// the way are listed in the report and retried on the next build.
    Fixpoint,
    /// Every unit was recompiled.
    FullRebuild,
    /// Units failed to compile and none compiled, so the build made no
    /// progress. The failures are retried on the next build.
    Failed,
    /// The build was cancelled and nothing was committed or discarded; the
    /// previous history is still current.
    Cancelled,
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildOutcome::Fixpoint => "fixpoint",
            BuildOutcome::FullRebuild => "full rebuild",
            BuildOutcome::Failed => "failed",
            BuildOutcome::Cancelled => "cancelled",
        })
    }
}

/// Why a build compiled every unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildCause {
    /// There was no build history.
    NoHistory,
    /// Incremental compilation is switched off.
    IncrementalDisabled,
    /// Incremental propagation was aborted.
    Aborted(AbortReason),
}

impl fmt::Display for RebuildCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildCause::NoHistory => f.write_str("no build history"),
            RebuildCause::IncrementalDisabled => f.write_str("incremental compilation disabled"),
            RebuildCause::Aborted(reason) => write!(f, "{reason}"),
        }
    }
}

/// Everything a host needs to know about a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// How the build ended.
    pub outcome: BuildOutcome,
    /// Every unit handed to the front-end, sorted.
    pub recompiled: Vec<UnitId>,
    /// Units compiled in each round, in round order.
    pub rounds: Vec<Vec<UnitId>>,
    /// Units that failed to compile, sorted.
    pub failed: Vec<UnitId>,
    /// Units removed from the project, sorted.
    pub removed: Vec<UnitId>,
    /// Propagator state when the build ended.
    pub final_state: PropagatorState,
    /// Set when every unit was recompiled.
    pub rebuild_cause: Option<RebuildCause>,
    /// Generation of the committed history, `None` if nothing was committed.
    pub generation: Option<u64>,
    /// Diagnostics emitted during the build.
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    /// Returns `true` if the build finished and every unit compiled.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && matches!(
                self.outcome,
                BuildOutcome::Fixpoint | BuildOutcome::FullRebuild
            )
    }
}

/// Drives incremental builds of one project.
pub struct RoundController<F> {
    frontend: F,
    history: BuildHistory,
    options: BuildOptions,
    cancel: CancelFlag,
}

impl<F: Frontend> RoundController<F> {
    /// Creates a controller compiling through `frontend` and persisting to
    /// `history`.
    pub fn new(frontend: F, history: BuildHistory, options: BuildOptions) -> Self {
        Self {
            frontend,
            history,
            options,
            cancel: CancelFlag::new(),
        }
    }

    /// Uses `cancel` to observe cancellation requests.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle to this controller's cancellation flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// The build history this controller reads and commits.
    pub fn history(&self) -> &BuildHistory {
        &self.history
    }

    /// The build options.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Runs one build.
    ///
    /// Returns `Err` only when the front-end fails as infrastructure, the
    /// history cannot be written, or an engine invariant breaks. Everything
    /// else is reported through the returned [`BuildReport`].
    pub fn run_build(&self, request: &BuildRequest) -> Result<BuildReport, BuildError> {
        let sink = DiagnosticSink::new();
        tracing::info!(
            units = request.units.len(),
            changes = request.changes.len(),
            incremental = self.options.incremental,
            "starting build"
        );

        let mut report = if !self.options.incremental {
            sink.emit(Diagnostic::note(
                codes::INCREMENTAL_DISABLED,
                "incremental compilation is disabled, compiling every unit",
            ));
            let base = self.previous_generation();
            self.full_rebuild(request, RebuildCause::IncrementalDisabled, base, &sink)?
        } else {
            match self.history.load() {
                Ok(Some(snapshot))
                    if snapshot.configuration_hash == self.options.configuration_hash =>
                {
                    self.incremental(request, snapshot, &sink)?
                }
                Ok(Some(snapshot)) => {
                    self.abort_and_rebuild(
                        request,
                        AbortReason::ConfigurationMismatch,
                        snapshot.generation,
                        &sink,
                    )?
                }
                Ok(None) => {
                    sink.emit(Diagnostic::note(
                        codes::NO_HISTORY,
                        "no build history found, compiling every unit",
                    ));
                    self.full_rebuild(request, RebuildCause::NoHistory, 0, &sink)?
                }
                Err(err) => {
                    let reason = if err.is_version_mismatch() {
                        AbortReason::CacheVersionMismatch(err.to_string())
                    } else {
                        AbortReason::CacheCorruption(err.to_string())
                    };
                    self.abort_and_rebuild(request, reason, 0, &sink)?
                }
            }
        };

        report.diagnostics = sink.take_all();
        tracing::info!(
            outcome = %report.outcome,
            recompiled = report.recompiled.len(),
            rounds = report.rounds.len(),
            failed = report.failed.len(),
            "build finished"
        );
        Ok(report)
    }

    fn incremental(
        &self,
        request: &BuildRequest,
        snapshot: Snapshot,
        sink: &DiagnosticSink,
    ) -> Result<BuildReport, BuildError> {
        let Snapshot {
            generation,
            pending,
            mut stores,
            ..
        } = snapshot;
        let (project, changes) = reconcile(request, &stores.signatures, &pending);

        let mut propagator = Propagator::new(project, self.options.max_rounds);
        let mut batch = propagator.seed(&changes, &pending, &mut stores)?;

        while *propagator.state() == PropagatorState::Expanding {
            if self.cancel.is_cancelled() {
                return Ok(cancelled_report(&propagator));
            }
            tracing::debug!(
                round = propagator.round() + 1,
                units = batch.len(),
                "compiling batch"
            );
            let results = self.compile_batch(&batch)?;
            if self.cancel.is_cancelled() {
                return Ok(cancelled_report(&propagator));
            }
            report_failures(&results, sink);
            batch = propagator.absorb(results, &mut stores)?.next;
        }

        match propagator.state().clone() {
            PropagatorState::Fixpoint => {
                let failed = propagator.failed().clone();
                let next_generation = generation + 1;
                self.history.commit(&Snapshot {
                    generation: next_generation,
                    configuration_hash: self.options.configuration_hash,
                    pending: failed.clone(),
                    stores,
                })?;
                propagator.finish()?;

                let rounds = propagator.rounds().to_vec();
                Ok(BuildReport {
                    outcome: settled_outcome(
                        BuildOutcome::Fixpoint,
                        !propagator.compiled().is_empty(),
                        &failed,
                    ),
                    recompiled: flatten_rounds(&rounds),
                    rounds,
                    failed: failed.into_iter().collect(),
                    removed: propagator.removed().iter().cloned().collect(),
                    final_state: propagator.state().clone(),
                    rebuild_cause: None,
                    generation: Some(next_generation),
                    diagnostics: Vec::new(),
                })
            }
            PropagatorState::Aborted(reason) => {
                self.abort_and_rebuild(request, reason, generation, sink)
            }
            state => Err(InternalError::new(format!(
                "propagation stopped in unexpected state {state:?}"
            ))
            .into()),
        }
    }

    fn abort_and_rebuild(
        &self,
        request: &BuildRequest,
        reason: AbortReason,
        base_generation: u64,
        sink: &DiagnosticSink,
    ) -> Result<BuildReport, BuildError> {
        tracing::warn!(%reason, "discarding incremental state");
        sink.emit(abort_diagnostic(&reason));
        self.full_rebuild(request, RebuildCause::Aborted(reason), base_generation, sink)
    }

    fn full_rebuild(
        &self,
        request: &BuildRequest,
        cause: RebuildCause,
        base_generation: u64,
        sink: &DiagnosticSink,
    ) -> Result<BuildReport, BuildError> {
        tracing::info!(%cause, "running full rebuild");
        let (project, removed) = split_project(request);
        let units: Vec<UnitId> = project.into_iter().collect();
        let final_state = match &cause {
            RebuildCause::Aborted(reason) => PropagatorState::Aborted(reason.clone()),
            _ => PropagatorState::Done,
        };
        let rounds = if units.is_empty() {
            Vec::new()
        } else {
            vec![units.clone()]
        };
        let cancelled = |rounds: Vec<Vec<UnitId>>| BuildReport {
            outcome: BuildOutcome::Cancelled,
            recompiled: flatten_rounds(&rounds),
            rounds,
            failed: Vec::new(),
            removed: removed.clone(),
            final_state: final_state.clone(),
            rebuild_cause: Some(cause.clone()),
            generation: None,
            diagnostics: Vec::new(),
        };

        if self.cancel.is_cancelled() {
            return Ok(cancelled(Vec::new()));
        }
        let results = self.compile_batch(&units)?;
        if self.cancel.is_cancelled() {
            return Ok(cancelled(rounds));
        }
        report_failures(&results, sink);
        if matches!(cause, RebuildCause::Aborted(_)) {
            self.history.invalidate()?;
        }

        let mut stores = Stores::new();
        let mut owners: BTreeMap<DeclarationId, UnitId> = BTreeMap::new();
        let mut failed = BTreeSet::new();
        for (unit, result) in results {
            match result {
                CompileResult::Success(output) => {
                    for decl in &output.declarations {
                        if let Some(previous) = owners.insert(decl.id.clone(), unit.clone()) {
                            if previous != unit {
                                sink.emit(
                                    Diagnostic::warning(
                                        codes::DUPLICATE_DECLARATION,
                                        format!("{} is declared by both {previous} and {unit}", decl.id),
                                    )
                                    .with_unit(unit.clone()),
                                );
                            }
                        }
                    }
                    stores.commit_unit(output.into_record(unit));
                }
                CompileResult::Failure { .. } => {
                    failed.insert(unit);
                }
            }
        }

        let generation = base_generation + 1;
        self.history.commit(&Snapshot {
            generation,
            configuration_hash: self.options.configuration_hash,
            pending: failed.clone(),
            stores,
        })?;

        Ok(BuildReport {
            outcome: settled_outcome(BuildOutcome::FullRebuild, units.len() > failed.len(), &failed),
            recompiled: units,
            rounds,
            failed: failed.into_iter().collect(),
            removed,
            final_state,
            rebuild_cause: Some(cause),
            generation: Some(generation),
            diagnostics: Vec::new(),
        })
    }

    /// Compiles a batch, concurrently if enabled. Results keep batch order.
    fn compile_batch(&self, batch: &[UnitId]) -> Result<Vec<(UnitId, CompileResult)>, FrontendError> {
        let frontend = &self.frontend;
        let compile = |unit: &UnitId| frontend.compile(unit).map(|result| (unit.clone(), result));
        if self.options.parallel && batch.len() > 1 {
            batch.par_iter().map(compile).collect()
        } else {
            batch.iter().map(compile).collect()
        }
    }

    fn previous_generation(&self) -> u64 {
        match self.history.record() {
            Ok(record) => record.map_or(0, |record| record.generation),
            Err(err) => {
                tracing::warn!(%err, "unreadable build history, restarting generations");
                0
            }
        }
    }
}

/// `Failed` only when no unit could be compiled; otherwise the failures
/// stay pending and the build still counts as progress.
fn settled_outcome(
    done: BuildOutcome,
    progressed: bool,
    failed: &BTreeSet<UnitId>,
) -> BuildOutcome {
    if failed.is_empty() || progressed {
        done
    } else {
        BuildOutcome::Failed
    }
}

/// Splits the request into the live project and the explicitly removed
/// units.
fn split_project(request: &BuildRequest) -> (BTreeSet<UnitId>, Vec<UnitId>) {
    let removed: BTreeSet<UnitId> = request
        .changes
        .iter()
        .filter(|change| change.kind == ChangeKind::Removed)
        .map(|change| change.unit.clone())
        .collect();
    let project = request
        .units
        .iter()
        .chain(
            request
                .changes
                .iter()
                .filter(|change| change.kind != ChangeKind::Removed)
                .map(|change| &change.unit),
        )
        .filter(|unit| !removed.contains(*unit))
        .cloned()
        .collect();
    (project, removed.into_iter().collect())
}

/// Completes the host's change list against the recorded state.
///
/// Recorded units missing from the project are removed; project units the
/// store has never seen (and that are not pending) are added.
fn reconcile(
    request: &BuildRequest,
    signatures: &SignatureStore,
    pending: &BTreeSet<UnitId>,
) -> (BTreeSet<UnitId>, Vec<ChangedUnit>) {
    let (project, _) = split_project(request);
    let reported: BTreeSet<&UnitId> = request.changes.iter().map(|change| &change.unit).collect();
    let mut changes = request.changes.clone();

    for unit in signatures.units() {
        if !project.contains(unit) && !reported.contains(unit) {
            tracing::debug!(unit = %unit, "recorded unit missing from project");
            changes.push(ChangedUnit::removed(unit.clone()));
        }
    }
    for unit in &project {
        if !signatures.contains(unit) && !reported.contains(unit) && !pending.contains(unit) {
            tracing::debug!(unit = %unit, "unrecorded unit in project");
            changes.push(ChangedUnit::added(unit.clone()));
        }
    }
    (project, changes)
}

fn report_failures(results: &[(UnitId, CompileResult)], sink: &DiagnosticSink) {
    for (unit, result) in results {
        if let CompileResult::Failure { diagnostics } = result {
            let diag = diagnostics.iter().fold(
                Diagnostic::error(codes::UNIT_COMPILE_FAILURE, format!("failed to compile {unit}"))
                    .with_unit(unit.clone()),
                |diag, message| diag.with_note(message.clone()),
            );
            sink.emit(diag);
        }
    }
}

fn abort_diagnostic(reason: &AbortReason) -> Diagnostic {
    let code = match reason {
        AbortReason::RoundLimitExceeded { .. } => codes::ROUND_LIMIT_EXCEEDED,
        AbortReason::ConfigurationMismatch => codes::CONFIGURATION_MISMATCH,
        AbortReason::CacheCorruption(_) => codes::CACHE_CORRUPTION,
        AbortReason::CacheVersionMismatch(_) => codes::CACHE_VERSION_MISMATCH,
        AbortReason::StructuralChange(_) => codes::STRUCTURAL_CHANGE,
    };
    Diagnostic::warning(code, reason.to_string())
        .with_help("the build history was discarded and every unit is recompiled")
}

fn cancelled_report(propagator: &Propagator) -> BuildReport {
    let rounds = propagator.rounds().to_vec();
    BuildReport {
        outcome: BuildOutcome::Cancelled,
        recompiled: flatten_rounds(&rounds),
        rounds,
        failed: propagator.failed().iter().cloned().collect(),
        removed: propagator.removed().iter().cloned().collect(),
        final_state: propagator.state().clone(),
        rebuild_cause: None,
        generation: None,
        diagnostics: Vec::new(),
    }
}

fn flatten_rounds(rounds: &[Vec<UnitId>]) -> Vec<UnitId> {
    rounds
        .iter()
        .flatten()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_project_drops_removed_units() {
        let request = BuildRequest {
            units: vec![UnitId::from("a.kt"), UnitId::from("c.kt")],
            changes: vec![
                ChangedUnit::removed("c.kt"),
                ChangedUnit::added("n.kt"),
            ],
        };
        let (project, removed) = split_project(&request);
        assert_eq!(
            project,
            BTreeSet::from([UnitId::from("a.kt"), UnitId::from("n.kt")])
        );
        assert_eq!(removed, vec![UnitId::from("c.kt")]);
    }

    #[test]
    fn failed_only_without_progress() {
        let none = BTreeSet::new();
        let some = BTreeSet::from([UnitId::from("b.kt")]);
        assert_eq!(settled_outcome(BuildOutcome::Fixpoint, true, &none), BuildOutcome::Fixpoint);
        assert_eq!(settled_outcome(BuildOutcome::Fixpoint, true, &some), BuildOutcome::Fixpoint);
        assert_eq!(settled_outcome(BuildOutcome::FullRebuild, false, &some), BuildOutcome::Failed);
        assert_eq!(settled_outcome(BuildOutcome::Fixpoint, false, &none), BuildOutcome::Fixpoint);
    }

    #[test]
    fn reconcile_infers_implicit_changes() {
        use ripple_cache::UnitSignatures;
        let mut signatures = SignatureStore::new();
        for unit in ["a.kt", "gone.kt"] {
            signatures.record_signatures(
                UnitId::from(unit),
                UnitSignatures::new(ContentHash::from_bytes(b"s"), ContentHash::from_bytes(b"o"), Vec::new()),
            );
        }
        let request = BuildRequest {
            units: vec![UnitId::from("a.kt"), UnitId::from("new.kt"), UnitId::from("broken.kt")],
            changes: Vec::new(),
        };
        let pending = BTreeSet::from([UnitId::from("broken.kt")]);
        let (_, changes) = reconcile(&request, &signatures, &pending);
        assert_eq!(
            changes,
            vec![ChangedUnit::removed("gone.kt"), ChangedUnit::added("new.kt")]
        );
    }

    #[test]
    fn options_from_config() {
        let config = ripple_config::load_config_from_str(
            "[project]\nname = \"demo\"\n\n[incremental]\nmax_rounds = 8\nparallel = true\n",
        )
        .unwrap();
        let options = BuildOptions::from_config(&config);
        assert!(options.incremental);
        assert!(options.parallel);
        assert_eq!(options.max_rounds, 8);
        assert_eq!(options.configuration_hash, config.configuration_hash());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(!flag.is_cancelled());
        handle.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn abort_diagnostics_use_incremental_codes() {
        let diag = abort_diagnostic(&AbortReason::RoundLimitExceeded { limit: 4 });
        assert_eq!(diag.code.to_string(), "I003");
        assert!(diag.message.contains("4 rounds"));
    }
}
