//! Redirects calls of one method to a static replacement.

use crate::{
    assembly::{InstrId, Instruction, OpCode},
    metadata::{MethodQuery, MethodRef, Module, ReferenceTable, Token, TypeSig},
    patching::{
        pass::{PatchEnvironment, PatchReport, Patcher},
        rewriter::{rewrite_methods, Replacement, RewriteContext, RewriteRule},
    },
    Result,
};

/// Helper module shipping the safe replacements.
pub const HELPER_MODULE: &str = "SilksongPrepatcher";

/// Type in [`HELPER_MODULE`] declaring the redirect targets.
pub const HELPER_TYPE: &str = "SilksongPrepatcher.Utils.AssemblyExtensions";

/// Rewrites `call`/`callvirt` of `type::member` into `call replacement`.
///
/// The replacement takes the original receiver as its first argument, so a call site only
/// qualifies if both methods pop the same number of values and agree on returning a value.
/// Other call sites are misses.
pub struct CallRedirect {
    target_type: String,
    target_member: String,
    replacement: Token,
    replacement_ref: MethodRef,
}

impl CallRedirect {
    /// Creates the rule; `replacement` must already be imported into the target module.
    pub fn new(
        target_type: impl Into<String>,
        target_member: impl Into<String>,
        replacement: Token,
        references: &ReferenceTable,
    ) -> Result<Self> {
        Ok(CallRedirect {
            target_type: target_type.into(),
            target_member: target_member.into(),
            replacement,
            replacement_ref: references.method(replacement)?.clone(),
        })
    }

    fn targets(&self, method: &MethodRef) -> bool {
        method.name == self.target_member && method.declaring_type.full_name() == self.target_type
    }
}

impl RewriteRule for CallRedirect {
    fn name(&self) -> &'static str {
        "CallRedirect"
    }

    fn matches(&self, instruction: &Instruction, references: &ReferenceTable) -> bool {
        matches!(instruction.opcode, OpCode::Call | OpCode::Callvirt)
            && instruction
                .token()
                .and_then(|token| references.method(token).ok())
                .is_some_and(|method| self.targets(method))
    }

    fn rewrite(
        &mut self,
        site: InstrId,
        ctx: &mut RewriteContext<'_>,
    ) -> Result<Option<Replacement>> {
        let Some(token) = ctx.instruction(site)?.token() else {
            return Ok(None);
        };
        let original = ctx.references.method(token)?;
        if original.pops() != self.replacement_ref.pops()
            || original.return_type().is_void() != self.replacement_ref.return_type().is_void()
        {
            log::warn!(
                "Not redirecting {original}: {} has a different shape",
                self.replacement_ref
            );
            return Ok(None);
        }
        Ok(Some(Replacement::new(vec![Instruction::call(self.replacement)])))
    }
}

/// Pass redirecting every call of one method, in every method of a module.
#[derive(Debug, Clone)]
pub struct CallRedirectPatcher {
    name: &'static str,
    description: &'static str,
    target_type: String,
    target_member: String,
    replacement_module: String,
    replacement: MethodQuery,
}

impl CallRedirectPatcher {
    /// Redirects calls of `target_type::target_member` to the method `replacement` resolves to
    /// in `replacement_module`.
    #[must_use]
    pub fn new(
        name: &'static str,
        target_type: impl Into<String>,
        target_member: impl Into<String>,
        replacement_module: impl Into<String>,
        replacement: MethodQuery,
    ) -> Self {
        CallRedirectPatcher {
            name,
            description: "Redirects calls of one method to a static replacement",
            target_type: target_type.into(),
            target_member: target_member.into(),
            replacement_module: replacement_module.into(),
            replacement,
        }
    }

    /// Sets the description shown in listings.
    #[must_use]
    pub fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// `Assembly.GetTypes()` throws when one type of the assembly fails to load. The
    /// replacement returns the types that did load and skips hook assemblies entirely.
    #[must_use]
    pub fn get_types() -> Self {
        CallRedirectPatcher::new(
            "GetTypes",
            "System.Reflection.Assembly",
            "GetTypes",
            HELPER_MODULE,
            MethodQuery::new(HELPER_TYPE, "GetTypesSafelyIgnoreMMHook")
                .parameter_types(vec![TypeSig::Class("System.Reflection.Assembly".into())])
                .is_static(true),
        )
        .with_description("Makes type enumeration tolerate assemblies that fail to load")
    }

    /// `Type.IsAssignableFrom` throws for some types the JSON serializer probes; the
    /// replacement answers `false` instead.
    #[must_use]
    pub fn assignable_from() -> Self {
        CallRedirectPatcher::new(
            "TypeAssignableFrom",
            "System.Type",
            "IsAssignableFrom",
            HELPER_MODULE,
            MethodQuery::new(HELPER_TYPE, "TypeAssignableFromSafe")
                .parameter_types(vec![
                    TypeSig::Class("System.Type".into()),
                    TypeSig::Class("System.Type".into()),
                ])
                .is_static(true),
        )
        .with_description("Makes assignability probes tolerate types that fail to load")
    }
}

impl Patcher for CallRedirectPatcher {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn patch(&self, module: &mut Module, env: &PatchEnvironment<'_>) -> Result<PatchReport> {
        let replacement = env.resolver.import_method(
            &mut module.references,
            &self.replacement_module,
            &self.replacement,
        )?;
        let mut rule = CallRedirect::new(
            &self.target_type,
            &self.target_member,
            replacement,
            &module.references,
        )?;

        let methods: Vec<Token> = module
            .all_methods()
            .filter(|method| method.has_body())
            .map(|method| method.token)
            .collect();

        let mut report = PatchReport::default();
        for token in rewrite_methods(module, &methods, &mut rule, &mut report)? {
            log::info!(
                "{}: patching {}",
                self.name,
                crate::patching::rewriter::describe_method(module, token)
            );
        }
        log::info!(
            "{}: redirected {} calls in {} methods",
            self.name,
            report.replaced,
            report.methods_patched
        );
        Ok(report)
    }
}
