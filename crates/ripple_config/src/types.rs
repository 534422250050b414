//! Configuration types deserialized from `ripple.toml`.

use ripple_common::{ContentHash, ContentHasher};
use serde::Deserialize;

/// Default cap on propagation rounds before falling back to a full rebuild.
pub const DEFAULT_MAX_ROUNDS: u32 = 64;

/// Default cache directory, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".ripple-cache";

/// The top-level project configuration parsed from `ripple.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Incremental compilation settings.
    #[serde(default)]
    pub incremental: IncrementalConfig,
    /// Compiler toolchain settings.
    #[serde(default)]
    pub compiler: CompilerConfig,
}

/// Core project metadata.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
}

/// The `[incremental]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct IncrementalConfig {
    /// Whether incremental compilation is enabled. When disabled every build
    /// recompiles all units.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of compile rounds before the build is aborted to a
    /// full rebuild.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Compile the units of one round in parallel.
    #[serde(default)]
    pub parallel: bool,
    /// Directory holding the build history, relative to the project root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel: false,
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
        }
    }
}

/// The `[compiler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    /// Toolchain version. Caches written by another version are discarded.
    #[serde(default = "default_compiler_version")]
    pub version: String,
    /// Arguments passed to every front-end invocation.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            version: default_compiler_version(),
            args: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Hashes every setting that changes what the front-end would emit.
    ///
    /// The incremental flag is part of the hash, so toggling it between two
    /// builds invalidates the history.
    pub fn configuration_hash(&self) -> ContentHash {
        let mut hasher = ContentHasher::new();
        hasher
            .flag(self.incremental.enabled)
            .str(&self.compiler.version)
            .u64(self.compiler.args.len() as u64);
        for arg in &self.compiler.args {
            hasher.str(arg);
        }
        hasher.finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_compiler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
