//! Maps target assemblies to the passes that patch them.

use std::{collections::BTreeMap, fmt, fs};

use crate::{
    metadata::Module,
    patching::{
        accessor_bodies::AccessorForwardingPatcher,
        call_redirect::CallRedirectPatcher,
        field_access::FieldAccessPatcher,
        pass::{PatchEnvironment, PatchReport, Patcher},
        reflective_getter::ReflectiveGetterPatcher,
        type_lookup_guard::TypeLookupGuardPatcher,
    },
    Result,
};

/// Ordered passes per target assembly file name.
///
/// Passes registered for the same assembly run in registration order on the same module.
///
/// # Examples
///
/// ```rust
/// use cilpatch::patching::{CallRedirectPatcher, PatcherRegistry};
///
/// let registry = PatcherRegistry::new()
///     .with("Game.dll", CallRedirectPatcher::get_types())
///     .with("Game.dll", CallRedirectPatcher::assignable_from());
/// assert_eq!(registry.patchers_for("Game.dll").len(), 2);
/// assert!(registry.patchers_for("Other.dll").is_empty());
/// ```
#[derive(Default)]
pub struct PatcherRegistry {
    targets: BTreeMap<String, Vec<Box<dyn Patcher>>>,
}

impl fmt::Debug for PatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (assembly, patchers) in &self.targets {
            let names: Vec<&str> = patchers.iter().map(|p| p.name()).collect();
            map.entry(assembly, &names);
        }
        map.finish()
    }
}

impl PatcherRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The passes for the game's assemblies.
    ///
    /// | Assembly                       | Passes                                    |
    /// |--------------------------------|-------------------------------------------|
    /// | `TeamCherry.NestedFadeGroup.dll` | `GetTypes`                              |
    /// | `PlayMaker.dll`                | `GetTypes`, `TypeLookupGuard`             |
    /// | `Assembly-CSharp.dll`          | `AccessorForwarding`, `FieldAccess`       |
    /// | `TeamCherry.SharedUtils.dll`   | `ReflectiveGetter`                        |
    /// | `Newtonsoft.Json.dll`          | `TypeAssignableFrom`                      |
    #[must_use]
    pub fn standard() -> Self {
        PatcherRegistry::new()
            .with("TeamCherry.NestedFadeGroup.dll", CallRedirectPatcher::get_types())
            .with("PlayMaker.dll", CallRedirectPatcher::get_types())
            .with("PlayMaker.dll", TypeLookupGuardPatcher::default())
            .with("Assembly-CSharp.dll", AccessorForwardingPatcher::default())
            .with("Assembly-CSharp.dll", FieldAccessPatcher::default())
            .with("TeamCherry.SharedUtils.dll", ReflectiveGetterPatcher::new())
            .with("Newtonsoft.Json.dll", CallRedirectPatcher::assignable_from())
    }

    /// Appends `patcher` to the passes of `assembly`.
    pub fn register(&mut self, assembly: impl Into<String>, patcher: impl Patcher + 'static) {
        self.targets
            .entry(assembly.into())
            .or_default()
            .push(Box::new(patcher));
    }

    /// Builder form of [`PatcherRegistry::register`].
    #[must_use]
    pub fn with(mut self, assembly: impl Into<String>, patcher: impl Patcher + 'static) -> Self {
        self.register(assembly, patcher);
        self
    }

    /// Assembly file names with at least one pass, in name order.
    pub fn target_assemblies(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// The passes of `assembly`, in execution order.
    #[must_use]
    pub fn patchers_for(&self, assembly: &str) -> &[Box<dyn Patcher>] {
        self.targets.get(assembly).map_or(&[][..], Vec::as_slice)
    }

    /// Runs every pass registered for `module`'s file name.
    ///
    /// Returns one report per pass that ran. If `write_patched_modules` is enabled and anything
    /// changed, the module is written to the cache directory afterwards.
    ///
    /// # Errors
    ///
    /// Stops at the first pass that fails and returns its error. Passes that ran before keep
    /// their changes.
    pub fn patch(
        &self,
        module: &mut Module,
        env: &PatchEnvironment<'_>,
    ) -> Result<Vec<(&'static str, PatchReport)>> {
        let file_name = module.file_name();
        let patchers = self.patchers_for(&file_name);
        if patchers.is_empty() {
            log::debug!("No patchers registered for {file_name}");
            return Ok(Vec::new());
        }

        let names: Vec<&str> = patchers.iter().map(|p| p.name()).collect();
        log::info!("Patching {file_name} with [{}]", names.join(", "));

        let mut reports = Vec::with_capacity(patchers.len());
        for patcher in patchers {
            log::debug!("Running {}: {}", patcher.name(), patcher.description());
            let report = patcher.patch(module, env).inspect_err(|e| {
                log::error!("{} failed on {file_name}: {e}", patcher.name());
            })?;
            reports.push((patcher.name(), report));
        }

        if reports.iter().any(|(_, report)| report.changed()) {
            dump(module, env);
        }
        Ok(reports)
    }
}

fn dump(module: &Module, env: &PatchEnvironment<'_>) {
    let Some(path) = env.config.dump_file(&module.name) else {
        return;
    };
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .map_err(crate::Error::from)
        .and_then(|()| module.save(&path));
    match written {
        Ok(()) => log::info!("Wrote patched {} to {}", module.name, path.display()),
        Err(e) => log::warn!("Failed to write patched {} to {}: {e}", module.name, path.display()),
    }
}
