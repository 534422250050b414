//! The replay front-end: compiles units by reading pre-recorded summaries.
//!
//! A summary file maps each unit to what the real front-end reported for it
//! the last time it ran:
//!
//! ```json
//! {
//!   "units": {
//!     "src/A.kt": {
//!       "declarations": [
//!         { "kind": "function", "scope": "pkg", "name": "f", "shape": "()", "signature": "(): Int" }
//!       ],
//!       "lookups": [ { "scope": "pkg", "name": "g" } ],
//!       "inline_usages": [ { "scope": "pkg", "name": "g", "shape": "()", "body": "v1" } ],
//!       "output": "A.class"
//!     },
//!     "src/B.kt": { "failure": ["unresolved reference: f"] }
//!   }
//! }
//! ```
//!
//! Textual signatures and bodies are hashed with XXH3. A unit's fingerprint
//! is the hash of its source file when one exists next to the project root,
//! otherwise the hash of its summary entry.

use std::collections::BTreeMap;
use std::path::Path;

use ripple_cache::{
    hash_file, DeclKind, Declaration, DeclarationId, InlineUsage, LookupKey, Visibility,
};
use ripple_common::{ContentHash, UnitId};
use ripple_engine::{CompileOutput, CompileResult, Frontend, FrontendError};
use serde::{Deserialize, Serialize};

/// The on-disk summary file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SummaryFile {
    /// Summaries keyed by unit path.
    #[serde(default)]
    pub units: BTreeMap<String, UnitSummary>,
}

/// What the front-end reported for one unit.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UnitSummary {
    /// Declarations the unit defines.
    pub declarations: Vec<DeclSummary>,
    /// Name lookups performed while analyzing the unit.
    pub lookups: Vec<LookupSummary>,
    /// Inline bodies copied into the unit.
    pub inline_usages: Vec<InlineSummary>,
    /// Emitted output, hashed into the output hash.
    pub output: String,
    /// Front-end messages if the unit failed to compile.
    pub failure: Option<Vec<String>>,
}

/// One declaration in a summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeclSummary {
    /// Declaration kind, e.g. `"inline_function"`.
    pub kind: DeclKind,
    /// Enclosing package or class.
    pub scope: String,
    /// Simple name.
    pub name: String,
    /// Overload shape; empty for non-functions.
    #[serde(default)]
    pub shape: String,
    /// Textual signature.
    pub signature: String,
    /// Visibility modifier, `"public"` when absent.
    #[serde(default)]
    pub visibility: Visibility,
    /// Body text, inline functions only.
    #[serde(default)]
    pub body: Option<String>,
    /// Direct supertypes, classes only.
    #[serde(default)]
    pub supertypes: Vec<String>,
}

/// One lookup in a summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LookupSummary {
    /// Scope searched.
    pub scope: String,
    /// Name searched for.
    pub name: String,
}

/// One inline usage in a summary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InlineSummary {
    /// Scope of the inline function.
    pub scope: String,
    /// Its name.
    pub name: String,
    /// Its overload shape.
    #[serde(default)]
    pub shape: String,
    /// Body text the unit embedded.
    pub body: String,
}

impl DeclSummary {
    fn to_declaration(&self) -> Declaration {
        let mut decl = Declaration::new(
            self.kind,
            DeclarationId::new(&self.scope, &self.name, &self.shape),
            ContentHash::from_str_content(&self.signature),
        )
        .with_visibility(self.visibility)
        .with_supertypes(self.supertypes.iter().cloned());
        if self.kind.is_inline() {
            decl.inline_body = Some(ContentHash::from_str_content(
                self.body.as_deref().unwrap_or_default(),
            ));
        }
        decl
    }
}

/// A [`Frontend`] that answers from a [`SummaryFile`].
#[derive(Debug, Default)]
pub struct ReplayFrontend {
    units: BTreeMap<UnitId, (ContentHash, UnitSummary)>,
}

impl ReplayFrontend {
    /// Reads a summary file, fingerprinting each unit against `project_dir`.
    pub fn load(path: &Path, project_dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let file: SummaryFile = serde_json::from_str(&content)
            .map_err(|e| format!("invalid summary file {}: {e}", path.display()))?;
        Self::from_summaries(file, project_dir)
    }

    /// Builds the front-end from parsed summaries.
    pub fn from_summaries(
        file: SummaryFile,
        project_dir: &Path,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut units = BTreeMap::new();
        for (name, summary) in file.units {
            let source = project_dir.join(&name);
            let fingerprint = if source.is_file() {
                hash_file(&source)?
            } else {
                ContentHash::from_str_content(&serde_json::to_string(&summary)?)
            };
            units.insert(UnitId::new(name), (fingerprint, summary));
        }
        Ok(Self { units })
    }

    /// Every unit in the summary file, sorted.
    pub fn units(&self) -> Vec<UnitId> {
        self.units.keys().cloned().collect()
    }

    /// The current fingerprint of every unit.
    pub fn fingerprints(&self) -> BTreeMap<UnitId, ContentHash> {
        self.units
            .iter()
            .map(|(unit, (fingerprint, _))| (unit.clone(), *fingerprint))
            .collect()
    }
}

impl Frontend for ReplayFrontend {
    fn compile(&self, unit: &UnitId) -> Result<CompileResult, FrontendError> {
        let Some((fingerprint, summary)) = self.units.get(unit) else {
            return Err(FrontendError::new(unit.clone(), "no summary recorded"));
        };
        tracing::debug!(unit = %unit, "replaying summary");

        if let Some(diagnostics) = &summary.failure {
            return Ok(CompileResult::Failure {
                diagnostics: diagnostics.clone(),
            });
        }

        Ok(CompileResult::Success(CompileOutput {
            fingerprint: *fingerprint,
            declarations: summary
                .declarations
                .iter()
                .map(DeclSummary::to_declaration)
                .collect(),
            output: summary.output.clone().into_bytes(),
            inline_usages: summary
                .inline_usages
                .iter()
                .map(|usage| {
                    InlineUsage::new(
                        DeclarationId::new(&usage.scope, &usage.name, &usage.shape),
                        ContentHash::from_str_content(&usage.body),
                    )
                })
                .collect(),
            lookups: summary
                .lookups
                .iter()
                .map(|lookup| LookupKey::new(&lookup.scope, &lookup.name))
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SUMMARY: &str = r#"{
        "units": {
            "src/A.kt": {
                "declarations": [
                    { "kind": "function", "scope": "pkg", "name": "f", "shape": "()", "signature": "(): Int" },
                    { "kind": "inline_function", "scope": "pkg", "name": "g", "shape": "()", "signature": "(): Unit", "body": "v1", "visibility": "internal" }
                ],
                "output": "A.class"
            },
            "src/B.kt": {
                "lookups": [ { "scope": "pkg", "name": "f" } ],
                "inline_usages": [ { "scope": "pkg", "name": "g", "shape": "()", "body": "v1" } ]
            },
            "src/C.kt": { "failure": ["unresolved reference: h"] }
        }
    }"#;

    fn frontend(dir: &Path) -> ReplayFrontend {
        ReplayFrontend::from_summaries(serde_json::from_str(SUMMARY).unwrap(), dir).unwrap()
    }

    #[test]
    fn replays_declarations() {
        let tmp = TempDir::new().unwrap();
        let result = frontend(tmp.path()).compile(&UnitId::new("src/A.kt")).unwrap();
        let CompileResult::Success(output) = result else {
            panic!("expected success");
        };
        assert_eq!(output.declarations.len(), 2);
        let inline = &output.declarations[1];
        assert_eq!(inline.kind, DeclKind::InlineFunction);
        assert_eq!(inline.visibility, Visibility::Internal);
        assert_eq!(inline.inline_body, Some(ContentHash::from_str_content("v1")));
        assert_eq!(output.output, b"A.class");
    }

    #[test]
    fn replays_lookups_and_inline_usages() {
        let tmp = TempDir::new().unwrap();
        let result = frontend(tmp.path()).compile(&UnitId::new("src/B.kt")).unwrap();
        let CompileResult::Success(output) = result else {
            panic!("expected success");
        };
        assert_eq!(output.lookups, vec![LookupKey::new("pkg", "f")]);
        assert_eq!(output.inline_usages.len(), 1);
        assert_eq!(
            output.inline_usages[0].body_hash,
            ContentHash::from_str_content("v1")
        );
    }

    #[test]
    fn replays_failures() {
        let tmp = TempDir::new().unwrap();
        let result = frontend(tmp.path()).compile(&UnitId::new("src/C.kt")).unwrap();
        match result {
            CompileResult::Failure { diagnostics } => {
                assert_eq!(diagnostics, vec!["unresolved reference: h".to_string()]);
            }
            CompileResult::Success(_) => panic!("expected failure"),
        }
    }

    #[test]
    fn unknown_unit_is_infrastructure_error() {
        let tmp = TempDir::new().unwrap();
        let err = frontend(tmp.path())
            .compile(&UnitId::new("src/Z.kt"))
            .unwrap_err();
        assert!(err.to_string().contains("src/Z.kt"));
    }

    #[test]
    fn fingerprint_prefers_source_file() {
        let tmp = TempDir::new().unwrap();
        let before = frontend(tmp.path()).fingerprints();

        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/A.kt"), "fun f() = 1").unwrap();
        let after = frontend(tmp.path()).fingerprints();

        let a = UnitId::new("src/A.kt");
        assert_ne!(before[&a], after[&a]);
        assert_eq!(after[&a], ContentHash::from_str_content("fun f() = 1"));
        assert_eq!(before[&UnitId::new("src/B.kt")], after[&UnitId::new("src/B.kt")]);
    }

    #[test]
    fn every_kind_and_visibility_parses() {
        let decl: DeclSummary = serde_json::from_str(
            r#"{ "kind": "class", "scope": "pkg", "name": "C", "signature": "class C", "visibility": "private", "supertypes": ["pkg.Base"] }"#,
        )
        .unwrap();
        let decl = decl.to_declaration();
        assert_eq!(decl.kind, DeclKind::Class);
        assert_eq!(decl.visibility, Visibility::Private);
        assert_eq!(decl.supertypes, vec!["pkg.Base".to_string()]);

        for (text, kind) in [
            ("function", DeclKind::Function),
            ("property", DeclKind::Property),
            ("inline_function", DeclKind::InlineFunction),
        ] {
            let json = format!(r#"{{ "kind": "{text}", "scope": "pkg", "name": "x", "signature": "s" }}"#);
            let decl: DeclSummary = serde_json::from_str(&json).unwrap();
            assert_eq!(decl.kind, kind);
            assert_eq!(decl.visibility, Visibility::Public);
        }
    }

    #[test]
    fn units_are_sorted() {
        let tmp = TempDir::new().unwrap();
        let units = frontend(tmp.path()).units();
        assert_eq!(
            units,
            vec![
                UnitId::new("src/A.kt"),
                UnitId::new("src/B.kt"),
                UnitId::new("src/C.kt")
            ]
        );
    }
}
