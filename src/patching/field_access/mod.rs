//! Redirects field accesses of a tracked type through by-name accessors.
//!
//! Game code reads and writes the fields of its save data type directly. Mods want to observe
//! and override those values, which is only possible when every access goes through a method.
//! This pass rewrites every `ldfld`, `stfld` and supported `ldflda` of a tracked field, in any
//! method of the module, into a call of the matching accessor with the field name as key:
//!
//! - a typed accessor declared on the tracked type (`GetInt`, `SetBool`, ...) when one exists
//!   for the field type, called with `callvirt`
//! - otherwise an instantiation of the generic extension accessors (`GetVariable<T>`,
//!   `SetVariable<T>`), called with `call`
//!
//! Scanning a large module is slow, so after a full scan the pass records the methods it
//! changed in a [`crate::patching::PatchCache`]. As long as the target assembly and the tool
//! version do not change, later runs only revisit the recorded methods.

mod accessors;
mod rule;

use std::{collections::HashMap, time::Instant};

use crate::{
    metadata::{MethodDef, Module, Token},
    patching::{
        cache::PatchCache,
        pass::{PatchEnvironment, PatchReport, Patcher},
        rewriter::{rewrite_method, rewrite_methods},
    },
    Error, Result,
};

use self::rule::FieldAccessRule;

/// What [`FieldAccessPatcher`] tracks and where its generic accessors live.
///
/// The defaults describe the game's save data type `PlayerData` and the accessors of
/// `TeamCherry.SharedUtils`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccessConfig {
    /// Full name of the type whose fields are tracked
    pub tracked_type: String,
    /// Methods of the tracked type that keep direct access. Constructors always do.
    pub excluded_methods: Vec<String>,
    /// Suffixes of the typed `Get*` / `Set*` accessors on the tracked type
    pub accessor_suffixes: Vec<String>,
    /// Module declaring the generic accessors
    pub generic_accessor_module: String,
    /// Full name of the type declaring the generic accessors
    pub generic_accessor_type: String,
    /// Name of the generic getter, taking the object and the field name
    pub generic_getter: String,
    /// Name of the generic setter, taking the object, the field name and the value
    pub generic_setter: String,
}

impl Default for FieldAccessConfig {
    fn default() -> Self {
        FieldAccessConfig::new("PlayerData")
    }
}

impl FieldAccessConfig {
    /// Tracks `tracked_type` with the standard accessors.
    #[must_use]
    pub fn new(tracked_type: impl Into<String>) -> Self {
        FieldAccessConfig {
            tracked_type: tracked_type.into(),
            excluded_methods: ["SetupNewPlayerData", "SetupExistingPlayerData", "OnUpdatedVariable"]
                .into_iter()
                .map(String::from)
                .collect(),
            accessor_suffixes: ["Bool", "String", "Float", "Int", "Vector3"]
                .into_iter()
                .map(String::from)
                .collect(),
            generic_accessor_module: "TeamCherry.SharedUtils".to_string(),
            generic_accessor_type: "TeamCherry.SharedUtils.VariableExtensions".to_string(),
            generic_getter: "GetVariable".to_string(),
            generic_setter: "SetVariable".to_string(),
        }
    }

    /// Adds a method of the tracked type that keeps direct field access.
    #[must_use]
    pub fn with_excluded_method(mut self, name: impl Into<String>) -> Self {
        self.excluded_methods.push(name.into());
        self
    }

    /// Returns `true` if `method` of type `type_name` must not be rewritten.
    #[must_use]
    pub fn is_excluded(&self, type_name: &str, method: &MethodDef) -> bool {
        type_name == self.tracked_type
            && (method.is_constructor() || self.excluded_methods.contains(&method.name))
    }
}

/// The field access pass; see the [module documentation](self).
#[derive(Debug, Clone, Default)]
pub struct FieldAccessPatcher {
    config: FieldAccessConfig,
}

impl FieldAccessPatcher {
    /// Creates the pass for `config`.
    #[must_use]
    pub fn new(config: FieldAccessConfig) -> Self {
        FieldAccessPatcher { config }
    }

    /// The configuration of this pass.
    #[must_use]
    pub fn config(&self) -> &FieldAccessConfig {
        &self.config
    }

    /// Methods to scan: every method with a body of every non interface type, minus the
    /// exclusions, paired with the full name of the declaring type.
    fn candidates(&self, module: &Module) -> Vec<(String, Token)> {
        let mut candidates = Vec::new();
        for ty in module.all_types().filter(|ty| !ty.is_interface()) {
            let type_name = module.type_full_name(ty);
            for method in ty.methods.iter().filter_map(|token| module.method_def(*token)) {
                if method.has_body() && !self.config.is_excluded(&type_name, method) {
                    candidates.push((type_name.clone(), method.token));
                }
            }
        }
        candidates
    }

    fn scan(
        &self,
        module: &mut Module,
        rule: &mut FieldAccessRule,
        fingerprint: &str,
    ) -> Result<(PatchReport, PatchCache)> {
        let candidates = self.candidates(module);
        let owners: HashMap<Token, String> = candidates
            .iter()
            .map(|(type_name, token)| (*token, type_name.clone()))
            .collect();
        let tokens: Vec<Token> = candidates.iter().map(|(_, token)| *token).collect();
        log::debug!("Scanning {} methods of {}", tokens.len(), module.name);

        let mut report = PatchReport::default();
        let patched = rewrite_methods(module, &tokens, rule, &mut report)?;

        let mut cache = PatchCache::new(fingerprint);
        for token in patched {
            if let (Some(type_name), Some(method)) = (owners.get(&token), module.method_def(token)) {
                cache.add(type_name.clone(), module.method_full_name(method));
            }
        }
        Ok((report, cache))
    }

    fn replay(
        &self,
        module: &mut Module,
        rule: &mut FieldAccessRule,
        cache: &PatchCache,
    ) -> Result<PatchReport> {
        let mut report = PatchReport {
            from_cache: true,
            ..PatchReport::default()
        };

        for (type_name, methods) in cache.types() {
            let by_name: HashMap<String, Token> = module
                .find_type(type_name)
                .map(|ty| {
                    ty.methods
                        .iter()
                        .filter_map(|token| module.method_def(*token))
                        .map(|method| (module.method_full_name(method), method.token))
                        .collect()
                })
                .unwrap_or_default();

            for method_name in methods {
                let replay_error = || Error::CacheReplay {
                    type_name: type_name.to_string(),
                    method: method_name.clone(),
                };

                let token = by_name.get(method_name).copied().ok_or_else(replay_error)?;
                let (method, references) = module
                    .method_and_references_mut(token)
                    .ok_or_else(replay_error)?;
                let stats = rewrite_method(method, references, rule).map_err(|e| {
                    log::error!("Replaying {method_name} failed: {e}");
                    replay_error()
                })?;
                if stats.replaced == 0 {
                    return Err(replay_error());
                }

                report.methods_patched += 1;
                report.replaced += stats.replaced;
                report.missed += stats.missed;
            }
        }
        Ok(report)
    }
}

impl Patcher for FieldAccessPatcher {
    fn name(&self) -> &'static str {
        "FieldAccess"
    }

    fn description(&self) -> &'static str {
        "Routes reads and writes of tracked fields through by-name accessors"
    }

    fn patch(&self, module: &mut Module, env: &PatchEnvironment<'_>) -> Result<PatchReport> {
        let started = Instant::now();
        let mut rule = FieldAccessRule::new(module, &self.config, env.resolver)?;

        let location = env.cache_location(self.name(), module);
        let cached = match &location {
            Some((path, fingerprint)) => PatchCache::load(path, fingerprint)?,
            None => None,
        };

        let mut report = match cached {
            Some(cache) => {
                log::debug!("Replaying {} cached methods", cache.len());
                self.replay(module, &mut rule, &cache)?
            }
            None => {
                let fingerprint = location.as_ref().map_or("", |(_, fp)| fp.as_str());
                let (report, cache) = self.scan(module, &mut rule, fingerprint)?;
                if let Some((path, _)) = &location {
                    match cache.save(path) {
                        Ok(()) => log::debug!("Recorded {} methods in {}", cache.len(), path.display()),
                        Err(e) => log::warn!("Failed to write patch cache {}: {e}", path.display()),
                    }
                }
                report
            }
        };

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Patched {} accesses to {} fields in {} ms{}",
            report.replaced,
            rule.tracked_fields(),
            report.elapsed_ms,
            if report.from_cache { " (cached)" } else { "" }
        );
        log::info!("Missed {} accesses", report.missed);
        if report.failed_methods > 0 {
            log::warn!("{} methods could not be patched", report.failed_methods);
        }
        Ok(report)
    }
}
