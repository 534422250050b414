//! `ripple status`, `ripple invalidate`, and `ripple dependents`: read-only
//! views of the build history, plus the one command that discards it.

use ripple_cache::{BuildHistory, LookupKey};
use ripple_config::ProjectConfig;

use crate::project::{open_history, resolve_project_root};
use crate::{DependentsArgs, GlobalArgs};

/// Runs the `ripple status` command.
pub fn status(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = ripple_config::load_config(&project_dir)?;
    let history = open_history(&project_dir, &config);
    for line in status_lines(&history, &config)? {
        println!("{line}");
    }
    Ok(0)
}

/// Describes the committed history, one line per fact.
pub fn status_lines(
    history: &BuildHistory,
    config: &ProjectConfig,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let Some(record) = history.record()? else {
        return Ok(vec![format!(
            "no build history in {}",
            history.cache_dir().display()
        )]);
    };

    let current = config.configuration_hash();
    let mut lines = vec![
        format!("generation:    {}", record.generation),
        format!("cache version: {}", record.cache_version),
        format!("toolchain:     {}", record.toolchain_version),
        format!(
            "configuration: {}{}",
            record.configuration_hash,
            if record.configuration_hash == current {
                ""
            } else {
                " (stale, next build recompiles everything)"
            }
        ),
        format!("units:         {}", record.unit_count),
    ];
    if record.pending.is_empty() {
        lines.push("pending:       none".to_string());
    } else {
        lines.push(format!("pending:       {}", record.pending.len()));
        lines.extend(record.pending.iter().map(|unit| format!("  {unit}")));
    }
    Ok(lines)
}

/// Runs the `ripple invalidate` command.
pub fn invalidate(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = ripple_config::load_config(&project_dir)?;
    let history = open_history(&project_dir, &config);
    history.invalidate()?;
    if !global.quiet {
        eprintln!(
            "   Removed build history in {}",
            history.cache_dir().display()
        );
    }
    Ok(0)
}

/// Runs the `ripple dependents` command.
pub fn dependents(
    args: &DependentsArgs,
    global: &GlobalArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = resolve_project_root(global)?;
    let config = ripple_config::load_config(&project_dir)?;
    let history = open_history(&project_dir, &config);
    match dependent_units(&history, &args.scope, args.name.as_deref())? {
        Some(units) => {
            for unit in units {
                println!("{unit}");
            }
            Ok(0)
        }
        None => {
            eprintln!("error: no build history; run `ripple build` first");
            Ok(1)
        }
    }
}

/// Units that looked up `name` in `scope`, or anything in `scope` when no
/// name is given. `None` without a history.
pub fn dependent_units(
    history: &BuildHistory,
    scope: &str,
    name: Option<&str>,
) -> Result<Option<Vec<String>>, Box<dyn std::error::Error>> {
    let Some(snapshot) = history.load()? else {
        return Ok(None);
    };
    let lookups = &snapshot.stores.lookups;
    let units = match name {
        Some(name) => lookups
            .dependents_of(&LookupKey::new(scope, name))
            .map(ToString::to_string)
            .collect(),
        None => lookups
            .dependents_in_scope(scope)
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    Ok(Some(units))
}
