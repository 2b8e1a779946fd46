//! Configuration of a patch run.

use std::path::{Path, PathBuf};

/// Settings shared by every pass of a patch run.
///
/// Pass specific settings (which type is tracked, which members are redirected) live on the
/// passes themselves; this struct only holds what the orchestrator and the patch cache need.
///
/// # Examples
///
/// ```rust
/// use cilpatch::patching::PatcherConfig;
///
/// let config = PatcherConfig::new()
///     .with_cache_dir("cache/cilpatch")
///     .with_write_patched_modules(true);
/// assert!(config.use_patch_cache);
/// assert!(config.cache_dir.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct PatcherConfig {
    /// Version string mixed into every cache fingerprint (default: the crate version).
    pub tool_version: String,

    /// Directory holding patch caches and dumped modules. Without it nothing is persisted.
    pub cache_dir: Option<PathBuf>,

    /// Dump every patched module as JSON into `cache_dir` for inspection (default: false).
    pub write_patched_modules: bool,

    /// Replay recorded patches instead of scanning whole modules (default: true).
    pub use_patch_cache: bool,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            cache_dir: None,
            write_patched_modules: false,
            use_patch_cache: true,
        }
    }
}

impl PatcherConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tool version used in cache fingerprints.
    #[must_use]
    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    /// Sets the directory for patch caches and dumped modules.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Enables or disables dumping patched modules.
    #[must_use]
    pub fn with_write_patched_modules(mut self, enable: bool) -> Self {
        self.write_patched_modules = enable;
        self
    }

    /// Enables or disables the patch cache.
    #[must_use]
    pub fn with_patch_cache(mut self, enable: bool) -> Self {
        self.use_patch_cache = enable;
        self
    }

    /// Path of the cache file of `patcher` for the assembly `assembly`, if caching is on.
    #[must_use]
    pub fn cache_file(&self, patcher: &str, assembly: &str) -> Option<PathBuf> {
        if !self.use_patch_cache {
            return None;
        }
        self.cache_dir
            .as_deref()
            .map(|dir| dir.join(format!("{patcher}_{assembly}_cache.txt")))
    }

    /// Path a patched module called `module` is dumped to, if dumping is on.
    #[must_use]
    pub fn dump_file(&self, module: &str) -> Option<PathBuf> {
        if !self.write_patched_modules {
            return None;
        }
        self.cache_dir
            .as_deref()
            .map(|dir| dir.join(format!("patched_{module}.json")))
    }

    /// The cache directory, if one is configured.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_file_requires_dir_and_toggle() {
        let config = PatcherConfig::default();
        assert!(config.cache_file("FieldAccess", "Game").is_none());

        let config = config.with_cache_dir("/tmp/cp");
        assert_eq!(
            config.cache_file("FieldAccess", "Game"),
            Some(PathBuf::from("/tmp/cp/FieldAccess_Game_cache.txt"))
        );

        let config = config.with_patch_cache(false);
        assert!(config.cache_file("FieldAccess", "Game").is_none());
    }

    #[test]
    fn dump_file_follows_toggle() {
        let config = PatcherConfig::new().with_cache_dir("out");
        assert!(config.dump_file("Game").is_none());
        let config = config.with_write_patched_modules(true);
        assert_eq!(config.dump_file("Game"), Some(PathBuf::from("out/patched_Game.json")));
        assert_eq!(config.tool_version, env!("CARGO_PKG_VERSION"));
    }
}
