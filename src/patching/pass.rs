//! The patch pass trait and the data passes exchange with the orchestrator.

use std::{
    ops::AddAssign,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    metadata::{AssemblyResolver, Module},
    patching::{cache, config::PatcherConfig},
    Result,
};

/// A patch pass applied to a whole module.
///
/// Passes are stateless between runs: everything derived from a module (resolved helper
/// members, memoized accessor tokens, scratch locals) is built inside [`Patcher::patch`] and
/// dropped when it returns.
///
/// # Errors
///
/// An `Err` from [`Patcher::patch`] aborts the pass for this assembly. Failures limited to a
/// single method are handled inside the pass and show up in [`PatchReport::failed_methods`].
pub trait Patcher {
    /// Unique name for logging, cache file names and reports.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the pass over `module`.
    ///
    /// # Errors
    ///
    /// Returns resolution errors, cache errors and any error that invalidates the pass for the
    /// whole assembly.
    fn patch(&self, module: &mut Module, env: &PatchEnvironment<'_>) -> Result<PatchReport>;
}

/// Counters of one pass over one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    /// Methods whose body was changed
    pub methods_patched: usize,
    /// Instruction patterns replaced
    pub replaced: usize,
    /// Matches left untouched because their shape is not supported
    pub missed: usize,
    /// Methods skipped after a method scoped error
    pub failed_methods: usize,
    /// Whether the pass replayed a patch cache instead of scanning
    pub from_cache: bool,
    /// Wall clock time of the pass in milliseconds
    pub elapsed_ms: u64,
}

impl PatchReport {
    /// Returns `true` if the pass changed the module.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.methods_patched > 0
    }
}

impl AddAssign for PatchReport {
    fn add_assign(&mut self, other: Self) {
        self.methods_patched += other.methods_patched;
        self.replaced += other.replaced;
        self.missed += other.missed;
        self.failed_methods += other.failed_methods;
        self.from_cache |= other.from_cache;
        self.elapsed_ms += other.elapsed_ms;
    }
}

/// What a pass may consult besides the module it patches.
#[derive(Debug, Clone, Copy)]
pub struct PatchEnvironment<'a> {
    /// Run configuration
    pub config: &'a PatcherConfig,
    /// Helper modules members are resolved from
    pub resolver: &'a AssemblyResolver,
    /// The assembly file the module was read from, used for cache fingerprints
    pub target_path: Option<&'a Path>,
}

impl<'a> PatchEnvironment<'a> {
    /// Creates an environment without a target file, which disables the patch cache.
    #[must_use]
    pub fn new(config: &'a PatcherConfig, resolver: &'a AssemblyResolver) -> Self {
        PatchEnvironment {
            config,
            resolver,
            target_path: None,
        }
    }

    /// Sets the assembly file the module was read from.
    #[must_use]
    pub fn with_target_path(mut self, path: &'a Path) -> Self {
        self.target_path = Some(path);
        self
    }

    /// Fingerprint of the current target, `None` if the cache can not be used.
    #[must_use]
    pub fn fingerprint(&self) -> Option<String> {
        let target = self.target_path?;
        match cache::fingerprint(&self.config.tool_version, target) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                log::warn!("Patch cache disabled, can not fingerprint {}: {e}", target.display());
                None
            }
        }
    }

    /// Cache file and fingerprint for `patcher` on `module`, if caching is possible.
    #[must_use]
    pub fn cache_location(&self, patcher: &str, module: &Module) -> Option<(PathBuf, String)> {
        let path = self.config.cache_file(patcher, &module.name)?;
        let fingerprint = self.fingerprint()?;
        Some((path, fingerprint))
    }
}
