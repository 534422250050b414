//! `ripple build`: one incremental build driven by a summary file.

use ripple_cache::{ChangeSet, ChangedUnit, SignatureStore};
use ripple_common::UnitId;
use ripple_diagnostics::{DiagnosticRenderer, Severity, TerminalRenderer};
use ripple_engine::{BuildOptions, BuildReport, BuildRequest, RoundController};

use crate::project::{open_history, resolve_project_root};
use crate::summary::ReplayFrontend;
use crate::{BuildArgs, GlobalArgs, ReportFormat};

/// Runs the `ripple build` command.
///
/// Returns exit code 0 when the build succeeded, 1 when units failed or the
/// build was cancelled.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = ripple_config::load_config(&project_dir)?;
    let frontend = ReplayFrontend::load(&args.summaries, &project_dir)?;
    let history = open_history(&project_dir, &config);

    if !global.quiet && args.format == ReportFormat::Text {
        eprintln!(
            "   Building {} ({} units)",
            config.project.name,
            frontend.units().len()
        );
    }

    let changes = if args.has_explicit_changes() {
        args.changes()
    } else {
        // A history that fails to load is reported by the build itself.
        let recorded = match history.load() {
            Ok(Some(snapshot)) => snapshot.stores.signatures,
            _ => SignatureStore::new(),
        };
        let detected = ChangeSet::detect(&frontend.fingerprints(), &recorded);
        tracing::debug!(
            added = detected.added.len(),
            modified = detected.modified.len(),
            removed = detected.removed.len(),
            "detected changes"
        );
        detected.into_changes()
    };

    let request = BuildRequest {
        units: frontend.units(),
        changes,
    };
    let controller = RoundController::new(frontend, history, BuildOptions::from_config(&config));
    let report = controller.run_build(&request)?;

    match args.format {
        ReportFormat::Text => render_text(&report, global),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report_json(&report))?),
    }

    Ok(if report.is_success() { 0 } else { 1 })
}

impl BuildArgs {
    fn has_explicit_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }

    fn changes(&self) -> Vec<ChangedUnit> {
        let added = self.added.iter().map(|u| ChangedUnit::added(u.as_str()));
        let modified = self.modified.iter().map(|u| ChangedUnit::modified(u.as_str()));
        let removed = self.removed.iter().map(|u| ChangedUnit::removed(u.as_str()));
        added.chain(modified).chain(removed).collect()
    }
}

fn render_text(report: &BuildReport, global: &GlobalArgs) {
    let renderer = TerminalRenderer::new(global.color);
    for diag in &report.diagnostics {
        if global.quiet && diag.severity != Severity::Error {
            continue;
        }
        eprint!("{}", renderer.render(diag));
    }
    if global.quiet {
        return;
    }

    for (index, round) in report.rounds.iter().enumerate() {
        eprintln!("   Round {} {}", index + 1, join_units(round));
    }
    if !report.removed.is_empty() {
        eprintln!("   Removed {}", join_units(&report.removed));
    }
    if let Some(cause) = &report.rebuild_cause {
        eprintln!("   Full rebuild: {cause}");
    }
    match report.generation {
        Some(generation) => eprintln!(
            "   {} ({} recompiled, generation {generation})",
            report.outcome,
            report.recompiled.len()
        ),
        None => eprintln!("   {} (history unchanged)", report.outcome),
    }
}

fn join_units(units: &[UnitId]) -> String {
    units
        .iter()
        .map(UnitId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Machine-readable form of a build report.
pub fn report_json(report: &BuildReport) -> serde_json::Value {
    serde_json::json!({
        "outcome": report.outcome.to_string(),
        "rounds": report.rounds,
        "recompiled": report.recompiled,
        "failed": report.failed,
        "removed": report.removed,
        "rebuild_cause": report.rebuild_cause.as_ref().map(ToString::to_string),
        "generation": report.generation,
        "diagnostics": report.diagnostics,
    })
}
