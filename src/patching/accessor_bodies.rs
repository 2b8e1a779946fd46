//! Replaces the typed accessors of the tracked type with forwarders to a backend.
//!
//! After the field access pass every read and write of a tracked field goes through the typed
//! accessors (`GetInt`, `SetBool`, ...). Their original bodies look the field up by reflection
//! on every call. This pass swaps each body for a call of a static method with the same
//! arguments on a backend type that caches the lookups:
//!
//! ```text
//! ldarg.0
//! ldarg.1
//! ldarg.2          // setters only
//! call Backend::SetInt(object, string, int32)
//! ret
//! ```

use crate::{
    assembly::{Instruction, InstructionList, OpCode},
    metadata::{MethodQuery, Module, Token},
    patching::{
        pass::{PatchEnvironment, PatchReport, Patcher},
        rewriter::edit_method,
    },
    Error, Result,
};

/// Pass forwarding the typed accessors of one type to a static backend.
#[derive(Debug, Clone)]
pub struct AccessorForwardingPatcher {
    tracked_type: String,
    accessors: Vec<String>,
    backend_module: String,
    backend_type: String,
}

impl Default for AccessorForwardingPatcher {
    fn default() -> Self {
        AccessorForwardingPatcher::new(
            "PlayerData",
            "SilksongPrepatcher",
            "SilksongPrepatcher.PlayerData.PDCache",
        )
    }
}

impl AccessorForwardingPatcher {
    /// Forwards the standard accessors of `tracked_type` to `backend_type` in `backend_module`.
    #[must_use]
    pub fn new(
        tracked_type: impl Into<String>,
        backend_module: impl Into<String>,
        backend_type: impl Into<String>,
    ) -> Self {
        let accessors = ["Get", "Set"]
            .into_iter()
            .flat_map(|prefix| {
                ["Bool", "Int", "String", "Float"]
                    .into_iter()
                    .map(move |suffix| format!("{prefix}{suffix}"))
            })
            .collect();

        AccessorForwardingPatcher {
            tracked_type: tracked_type.into(),
            accessors,
            backend_module: backend_module.into(),
            backend_type: backend_type.into(),
        }
    }

    /// Names of the accessors this pass forwards.
    #[must_use]
    pub fn accessors(&self) -> &[String] {
        &self.accessors
    }

    fn find_accessor(&self, module: &Module, name: &str) -> Option<Token> {
        let ty = module.find_type(&self.tracked_type)?;
        ty.methods
            .iter()
            .copied()
            .find(|token| module.method_def(*token).is_some_and(|m| m.name == name && m.has_body()))
    }

    fn forward(&self, module: &mut Module, token: Token, env: &PatchEnvironment<'_>) -> Result<()> {
        let (name, argument_count) = module
            .method_def(token)
            .map(|method| (method.name.clone(), method.signature.argument_count()))
            .ok_or_else(|| Error::DanglingReference(token.to_string()))?;

        let query = MethodQuery::new(&self.backend_type, &name)
            .parameter_count(argument_count)
            .is_static(true);
        let backend = env
            .resolver
            .import_method(&mut module.references, &self.backend_module, &query)?;

        let (method, references) = module
            .method_and_references_mut(token)
            .ok_or_else(|| Error::DanglingReference(token.to_string()))?;

        edit_method(method, references, |body, _| {
            let mut instructions = InstructionList::new();
            for index in 0..argument_count {
                let index = u16::try_from(index).map_err(|_| malformed_error!("Too many arguments"))?;
                instructions.push(Instruction::ldarg(index))?;
            }
            instructions.push(Instruction::call(backend))?;
            instructions.push(Instruction::simple(OpCode::Ret))?;

            body.instructions = instructions;
            body.locals.clear();
            body.exception_handlers.clear();
            body.init_locals = false;
            Ok(true)
        })?;
        Ok(())
    }
}

impl Patcher for AccessorForwardingPatcher {
    fn name(&self) -> &'static str {
        "AccessorForwarding"
    }

    fn description(&self) -> &'static str {
        "Forwards the typed accessors of the tracked type to a caching backend"
    }

    fn patch(&self, module: &mut Module, env: &PatchEnvironment<'_>) -> Result<PatchReport> {
        if module.find_type(&self.tracked_type).is_none() {
            return Err(Error::TypeNotFound(self.tracked_type.clone()));
        }

        let mut report = PatchReport::default();
        for name in &self.accessors {
            let Some(token) = self.find_accessor(module, name) else {
                log::error!("Failed to forward {}::{name}: no such method", self.tracked_type);
                report.missed += 1;
                continue;
            };

            match self.forward(module, token, env) {
                Ok(()) => {
                    log::debug!("Forwarded {}::{name} to {}", self.tracked_type, self.backend_type);
                    report.methods_patched += 1;
                    report.replaced += 1;
                }
                Err(e) if e.is_method_scoped() => {
                    log::warn!("Failed to forward {}::{name}: {e}", self.tracked_type);
                    report.failed_methods += 1;
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Forwarded {} accessors of {}",
            report.methods_patched,
            self.tracked_type
        );
        Ok(report)
    }
}
