//! A scripted in-memory front-end for scenario tests.
//!
//! Each unit is described by a [`Source`]: the declarations it defines, the
//! names it looks up, and the inline functions it calls. Compiling a unit
//! resolves its lookups against the *current* sources of the whole project,
//! so the emitted output changes exactly when something the unit consumes
//! changes. That makes a unit left stale by the engine visible as an output
//! hash that differs from a full rebuild.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use ripple_cache::{BuildHistory, Declaration, DeclarationId, InlineUsage, LookupKey, Stores};
use ripple_common::{ContentHash, ContentHasher, UnitId};
use ripple_engine::{
    BuildOptions, BuildReport, BuildRequest, CancelFlag, CompileOutput, CompileResult, Frontend,
    FrontendError, RoundController,
};

pub const TOOLCHAIN: &str = "1.9.0";

pub fn h(text: &str) -> ContentHash {
    ContentHash::from_str_content(text)
}

pub fn u(name: &str) -> UnitId {
    UnitId::from(name)
}

/// Source of one unit in the model project.
#[derive(Debug, Clone, Default)]
pub struct Source {
    /// Free text that only affects the fingerprint (comments, formatting).
    pub text: String,
    pub declarations: Vec<Declaration>,
    pub lookups: Vec<LookupKey>,
    /// Inline functions whose bodies are copied into this unit.
    pub inline_calls: Vec<DeclarationId>,
    pub broken: bool,
}

impl Source {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declares(mut self, decl: Declaration) -> Self {
        self.declarations.push(decl);
        self
    }

    pub fn looks_up(mut self, scope: &str, name: &str) -> Self {
        self.lookups.push(LookupKey::new(scope, name));
        self
    }

    pub fn inlines(mut self, id: DeclarationId) -> Self {
        self.inline_calls.push(id);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// The model project and a log of every compile request.
#[derive(Default)]
pub struct Project {
    sources: Mutex<BTreeMap<UnitId, Source>>,
    log: Mutex<Vec<UnitId>>,
    crash_on: Mutex<Option<UnitId>>,
    cancel_after: Mutex<Option<(UnitId, CancelFlag)>>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, unit: &str, source: Source) {
        self.sources.lock().unwrap().insert(u(unit), source);
    }

    pub fn remove(&self, unit: &str) {
        self.sources.lock().unwrap().remove(&u(unit));
    }

    pub fn units(&self) -> Vec<UnitId> {
        self.sources.lock().unwrap().keys().cloned().collect()
    }

    /// Makes compiling `unit` an infrastructure failure.
    pub fn crash_on(&self, unit: &str) {
        *self.crash_on.lock().unwrap() = Some(u(unit));
    }

    /// Requests cancellation while `unit` is being compiled.
    pub fn cancel_while_compiling(&self, unit: &str, flag: CancelFlag) {
        *self.cancel_after.lock().unwrap() = Some((u(unit), flag));
    }

    /// Returns and clears the compile log, sorted.
    pub fn take_log(&self) -> Vec<UnitId> {
        let mut log = std::mem::take(&mut *self.log.lock().unwrap());
        log.sort();
        log
    }

    /// Resolves `key` like a member lookup: declarations in the scope
    /// itself, otherwise whatever the scope's class inherits.
    fn resolve(sources: &BTreeMap<UnitId, Source>, key: &LookupKey) -> Vec<String> {
        Self::resolve_in(sources, key, &mut BTreeSet::new())
    }

    fn resolve_in(
        sources: &BTreeMap<UnitId, Source>,
        key: &LookupKey,
        seen: &mut BTreeSet<String>,
    ) -> Vec<String> {
        let declarations = || sources.values().flat_map(|src| &src.declarations);
        let mut found: Vec<String> = declarations()
            .filter(|decl| decl.lookup_key() == *key)
            .map(|decl| format!("{}:{}:{:?}", decl.id, decl.signature, decl.visibility))
            .collect();
        if found.is_empty() && seen.insert(key.scope.clone()) {
            let supertypes: Vec<String> = declarations()
                .filter(|decl| decl.member_scope().as_deref() == Some(key.scope.as_str()))
                .flat_map(|decl| decl.supertypes.iter().cloned())
                .collect();
            for supertype in supertypes {
                let inherited = LookupKey::new(supertype, key.name.clone());
                found.extend(Self::resolve_in(sources, &inherited, seen));
            }
        }
        found.sort();
        found
    }

    fn inline_body(sources: &BTreeMap<UnitId, Source>, id: &DeclarationId) -> Option<ContentHash> {
        sources
            .values()
            .flat_map(|src| &src.declarations)
            .find(|decl| decl.id == *id && decl.is_inline())
            .and_then(|decl| decl.inline_body)
    }
}

impl Frontend for Project {
    fn compile(&self, unit: &UnitId) -> Result<CompileResult, FrontendError> {
        self.log.lock().unwrap().push(unit.clone());
        if let Some((target, flag)) = &*self.cancel_after.lock().unwrap() {
            if target == unit {
                flag.cancel();
            }
        }
        if self.crash_on.lock().unwrap().as_ref() == Some(unit) {
            return Err(FrontendError::new(unit.clone(), "compiler daemon crashed"));
        }

        let sources = self.sources.lock().unwrap();
        let Some(src) = sources.get(unit) else {
            return Err(FrontendError::new(unit.clone(), "no such unit"));
        };
        if src.broken {
            return Ok(CompileResult::Failure {
                diagnostics: vec![format!("{unit}: syntax error")],
            });
        }

        let mut out = ContentHasher::new();
        out.str(unit.as_str());
        for decl in &src.declarations {
            out.str(&decl.id.to_string()).hash(&decl.signature);
            if let Some(body) = decl.inline_body {
                out.hash(&body);
            }
        }

        let mut lookups: BTreeSet<LookupKey> = src.lookups.iter().cloned().collect();
        for key in &src.lookups {
            out.str(&key.to_string());
            for resolved in Self::resolve(&sources, key) {
                out.str(&resolved);
            }
        }

        let mut inline_usages = Vec::new();
        for id in &src.inline_calls {
            lookups.insert(id.lookup_key());
            out.str(&id.to_string());
            match Self::inline_body(&sources, id) {
                Some(body) => {
                    out.hash(&body);
                    inline_usages.push(InlineUsage::new(id.clone(), body));
                }
                None => {
                    out.str("unresolved");
                }
            }
        }

        Ok(CompileResult::Success(CompileOutput {
            fingerprint: h(&format!("{src:?}")),
            declarations: src.declarations.clone(),
            output: out.finish().as_bytes().to_vec(),
            inline_usages,
            lookups: lookups.into_iter().collect(),
        }))
    }
}

pub fn options(incremental: bool) -> BuildOptions {
    let config = ripple_config::load_config_from_str(&format!(
        "[project]\nname = \"scenario\"\n\n[incremental]\nenabled = {incremental}\n\n[compiler]\nversion = \"{TOOLCHAIN}\"\n"
    ))
    .unwrap();
    BuildOptions::from_config(&config)
}

pub fn history(dir: &Path) -> BuildHistory {
    BuildHistory::new(dir, TOOLCHAIN)
}

pub fn request(project: &Project, changes: Vec<ripple_cache::ChangedUnit>) -> BuildRequest {
    BuildRequest {
        units: project.units(),
        changes,
    }
}

/// Runs one build with the given options and clears the compile log.
pub fn build_with(
    project: &Project,
    dir: &Path,
    options: BuildOptions,
    changes: Vec<ripple_cache::ChangedUnit>,
) -> BuildReport {
    let controller = RoundController::new(project, history(dir), options);
    let report = controller.run_build(&request(project, changes)).unwrap();
    project.take_log();
    report
}

/// Runs one incremental build.
pub fn build(project: &Project, dir: &Path, changes: Vec<ripple_cache::ChangedUnit>) -> BuildReport {
    build_with(project, dir, options(true), changes)
}

/// The stores committed in `dir`.
pub fn committed_stores(dir: &Path) -> Stores {
    history(dir).load().unwrap().unwrap().stores
}

/// The stores a from-scratch build of the current sources would commit.
pub fn full_rebuild_stores(project: &Project) -> Stores {
    let dir = tempfile::tempdir().unwrap();
    let report = build(project, dir.path(), Vec::new());
    assert!(report.rebuild_cause.is_some());
    committed_stores(dir.path())
}
