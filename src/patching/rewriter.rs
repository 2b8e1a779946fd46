//! The instruction stream rewriter.
//!
//! A [`RewriteRule`] decides which instructions it wants to replace and builds the replacement
//! for each of them. [`rewrite_method`] drives a rule over one method body:
//!
//! 1. The body is expanded into its explicit editing form.
//! 2. The instructions present at that point are visited from last to first. Instructions
//!    inserted while rewriting are never offered to the rule.
//! 3. For every match the first instruction of the replacement overwrites the matched
//!    instruction in place, keeping its identity, and the rest is inserted right after it.
//!    Branches and exception handlers that pointed at the matched instruction now point at the
//!    entry of the replacement.
//! 4. If anything was replaced the body is compacted, which also re-verifies the stack.
//!
//! Any error restores the body exactly as it was, so a method is either fully rewritten or
//! left alone.

use std::collections::HashMap;

use crate::{
    assembly::{compact, expand, InstrId, Instruction, MethodBody},
    metadata::{MethodDef, Module, ReferenceTable, Token, TypeSig},
    patching::pass::PatchReport,
    Error, Result,
};

/// Instructions that replace one matched instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    /// Replacement sequence; the first entry overwrites the matched instruction
    pub sequence: Vec<Instruction>,
    /// Instructions inserted after the instruction that follows `sequence`
    pub after_next: Vec<Instruction>,
}

impl Replacement {
    /// A plain replacement sequence.
    #[must_use]
    pub fn new(sequence: Vec<Instruction>) -> Self {
        Replacement {
            sequence,
            after_next: Vec::new(),
        }
    }

    /// Adds instructions to run after the instruction following the replaced one, for
    /// rewrites that wrap an existing instruction.
    #[must_use]
    pub fn with_trailer(mut self, after_next: Vec<Instruction>) -> Self {
        self.after_next = after_next;
        self
    }
}

/// Scratch locals allocated while rewriting one method, one per value type.
///
/// A fresh set is created for every method; indices are only meaningful in the body they were
/// allocated in.
#[derive(Debug, Default)]
pub struct ScratchLocals {
    locals: HashMap<TypeSig, u16>,
}

impl ScratchLocals {
    /// Returns the scratch local for `local_type`, declaring it in `body` on first use.
    ///
    /// # Errors
    ///
    /// Fails if the body can not take another local.
    pub fn get_or_add(&mut self, body: &mut MethodBody, local_type: &TypeSig) -> Result<u16> {
        if let Some(index) = self.locals.get(local_type) {
            return Ok(*index);
        }
        let index = body.add_local(local_type.clone())?;
        self.locals.insert(local_type.clone(), index);
        Ok(index)
    }

    /// Number of scratch locals declared so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Returns `true` if no scratch local was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }
}

/// Mutable state a rule may use while building a replacement.
pub struct RewriteContext<'a> {
    /// The body being rewritten, in expanded form
    pub body: &'a mut MethodBody,
    /// The module's reference table, for importing operands
    pub references: &'a mut ReferenceTable,
    /// Scratch locals of the current method
    pub scratch: &'a mut ScratchLocals,
}

impl RewriteContext<'_> {
    /// The scratch local for values of `local_type`.
    ///
    /// # Errors
    ///
    /// Fails if the body can not take another local.
    pub fn scratch_local(&mut self, local_type: &TypeSig) -> Result<u16> {
        self.scratch.get_or_add(self.body, local_type)
    }

    /// The instruction behind `id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DanglingReference`] if `id` is not part of the body.
    pub fn instruction(&self, id: InstrId) -> Result<&Instruction> {
        self.body
            .instructions
            .get(id)
            .ok_or_else(|| Error::DanglingReference(format!("instruction #{}", id.index())))
    }
}

/// A pattern and its replacement.
pub trait RewriteRule {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Returns `true` if `instruction` is a candidate for this rule.
    fn matches(&self, instruction: &Instruction, references: &ReferenceTable) -> bool;

    /// Builds the replacement for the matched instruction `site`.
    ///
    /// Returning `Ok(None)` counts the site as a miss and leaves it untouched.
    ///
    /// # Errors
    ///
    /// Any error aborts the rewrite of the current method.
    fn rewrite(
        &mut self,
        site: InstrId,
        ctx: &mut RewriteContext<'_>,
    ) -> Result<Option<Replacement>>;
}

/// Outcome of rewriting one method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Matches that were replaced
    pub replaced: usize,
    /// Matches the rule declined to replace
    pub missed: usize,
}

/// Runs `edit` on the expanded body of `method` and compacts the result.
///
/// `edit` returns whether it changed the body. Unchanged bodies and failed edits are restored
/// to their original encoding. Methods without a body are reported as unchanged.
///
/// # Errors
///
/// Returns the error of `edit`, [`expand`] or [`compact`]; the body is restored in that case.
pub fn edit_method<F>(method: &mut MethodDef, references: &mut ReferenceTable, edit: F) -> Result<bool>
where
    F: FnOnce(&mut MethodBody, &mut ReferenceTable) -> Result<bool>,
{
    let return_type = method.signature.return_type.clone();
    let Some(body) = method.body.as_mut() else {
        return Ok(false);
    };

    let snapshot = body.clone();
    match edit_body(body, references, &return_type, edit) {
        Ok(true) => Ok(true),
        Ok(false) => {
            *body = snapshot;
            Ok(false)
        }
        Err(e) => {
            *body = snapshot;
            Err(e)
        }
    }
}

fn edit_body<F>(
    body: &mut MethodBody,
    references: &mut ReferenceTable,
    return_type: &TypeSig,
    edit: F,
) -> Result<bool>
where
    F: FnOnce(&mut MethodBody, &mut ReferenceTable) -> Result<bool>,
{
    expand(body)?;
    let changed = edit(body, references)?;
    if changed {
        compact(body, references, return_type)?;
    }
    Ok(changed)
}

/// Applies `rule` to every instruction of `method`.
///
/// # Errors
///
/// Returns the first error of the rule, the normalizer or the stack analysis. The method is
/// left unmodified in that case.
pub fn rewrite_method(
    method: &mut MethodDef,
    references: &mut ReferenceTable,
    rule: &mut dyn RewriteRule,
) -> Result<RewriteStats> {
    let mut stats = RewriteStats::default();
    edit_method(method, references, |body, references| {
        stats = rewrite_body(body, references, rule)?;
        Ok(stats.replaced > 0)
    })?;
    Ok(stats)
}

fn rewrite_body(
    body: &mut MethodBody,
    references: &mut ReferenceTable,
    rule: &mut dyn RewriteRule,
) -> Result<RewriteStats> {
    let mut scratch = ScratchLocals::default();
    let mut stats = RewriteStats::default();

    for site in body.instructions.ids().into_iter().rev() {
        let matched = body
            .instructions
            .get(site)
            .is_some_and(|instruction| rule.matches(instruction, references));
        if !matched {
            continue;
        }

        let mut ctx = RewriteContext {
            body: &mut *body,
            references: &mut *references,
            scratch: &mut scratch,
        };
        match rule.rewrite(site, &mut ctx)? {
            Some(replacement) => {
                apply_replacement(body, site, replacement)?;
                stats.replaced += 1;
            }
            None => stats.missed += 1,
        }
    }

    Ok(stats)
}

/// Overwrites `site` with the head of `replacement` and links the rest in after it.
///
/// # Errors
///
/// Fails on an empty replacement, a detached `site` or a trailer with nothing to follow.
pub fn apply_replacement(
    body: &mut MethodBody,
    site: InstrId,
    replacement: Replacement,
) -> Result<()> {
    let Replacement {
        sequence,
        after_next,
    } = replacement;
    let mut sequence = sequence.into_iter();

    let head = sequence
        .next()
        .ok_or_else(|| malformed_error!("Empty replacement sequence"))?;
    let target = body.instructions.get_mut(site).ok_or_else(|| {
        Error::DanglingReference(format!("rewrite site #{} is not in the body", site.index()))
    })?;
    target.opcode = head.opcode;
    target.operand = head.operand;

    let mut anchor = site;
    for instruction in sequence {
        anchor = body.instructions.insert_after(anchor, instruction)?;
    }

    if !after_next.is_empty() {
        let mut anchor = body
            .instructions
            .next(anchor)
            .ok_or_else(|| malformed_error!("No instruction follows the replaced sequence"))?;
        for instruction in after_next {
            anchor = body.instructions.insert_after(anchor, instruction)?;
        }
    }

    Ok(())
}

/// Full name of the method behind `token`, for log messages.
pub(crate) fn describe_method(module: &Module, token: Token) -> String {
    module
        .method_def(token)
        .map_or_else(|| token.to_string(), |method| module.method_full_name(method))
}

/// Rewrites each of `methods` with `rule`, accumulating into `report`.
///
/// Method scoped failures are logged and counted; the method keeps its original body. Any
/// other error is returned.
pub(crate) fn rewrite_methods(
    module: &mut Module,
    methods: &[Token],
    rule: &mut dyn RewriteRule,
    report: &mut PatchReport,
) -> Result<Vec<Token>> {
    let mut patched = Vec::new();
    for &token in methods {
        let Some((method, references)) = module.method_and_references_mut(token) else {
            continue;
        };

        match rewrite_method(method, references, rule) {
            Ok(stats) => {
                report.replaced += stats.replaced;
                report.missed += stats.missed;
                if stats.replaced > 0 {
                    report.methods_patched += 1;
                    patched.push(token);
                    log::debug!(
                        "{}: rewrote {} sites in {}",
                        rule.name(),
                        stats.replaced,
                        describe_method(module, token)
                    );
                }
            }
            Err(e) if e.is_method_scoped() => {
                report.failed_methods += 1;
                log::warn!(
                    "{}: leaving {} unpatched: {e}",
                    rule.name(),
                    describe_method(module, token)
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{ExceptionHandler, OpCode, Operand},
        metadata::{MethodAttributes, MethodSig, Module, TypeAttributes},
        test::{Machine, Value},
    };

    /// Replaces `ldc.i4 7` by `ldc.i4 3; ldc.i4 4; add`.
    struct SplitSeven;

    impl RewriteRule for SplitSeven {
        fn name(&self) -> &'static str {
            "SplitSeven"
        }

        fn matches(&self, instruction: &Instruction, _references: &ReferenceTable) -> bool {
            instruction.opcode == OpCode::LdcI4
                && instruction.operand == Operand::Immediate(crate::assembly::Immediate::Int32(7))
        }

        fn rewrite(
            &mut self,
            _site: InstrId,
            _ctx: &mut RewriteContext<'_>,
        ) -> Result<Option<Replacement>> {
            Ok(Some(Replacement::new(vec![
                Instruction::ldc_i4(3),
                Instruction::ldc_i4(4),
                Instruction::simple(OpCode::Add),
            ])))
        }
    }

    /// Matches every `ldc.i4`, declines all of them.
    struct DeclineAll;

    impl RewriteRule for DeclineAll {
        fn name(&self) -> &'static str {
            "DeclineAll"
        }

        fn matches(&self, instruction: &Instruction, _references: &ReferenceTable) -> bool {
            instruction.opcode == OpCode::LdcI4
        }

        fn rewrite(
            &mut self,
            _site: InstrId,
            _ctx: &mut RewriteContext<'_>,
        ) -> Result<Option<Replacement>> {
            Ok(None)
        }
    }

    /// Matches every `ldc.i4` and turns it into an unbalanced sequence.
    struct BreakStack;

    impl RewriteRule for BreakStack {
        fn name(&self) -> &'static str {
            "BreakStack"
        }

        fn matches(&self, instruction: &Instruction, _references: &ReferenceTable) -> bool {
            instruction.opcode == OpCode::LdcI4
        }

        fn rewrite(
            &mut self,
            _site: InstrId,
            _ctx: &mut RewriteContext<'_>,
        ) -> Result<Option<Replacement>> {
            Ok(Some(Replacement::new(vec![Instruction::simple(OpCode::Pop)])))
        }
    }

    fn method_with(body: MethodBody, return_type: TypeSig) -> (Module, Token) {
        let mut module = Module::new("Test");
        let ty = module.add_type("", "T", TypeAttributes::PUBLIC);
        let token = module
            .add_method(
                ty,
                "M",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSig::static_method(return_type, vec![TypeSig::I4]),
                Some(body),
            )
            .unwrap();
        (module, token)
    }

    /// `return arg0 != 0 ? 7 : 1;` with both arms joining on a shared `ret`.
    fn branchy_body() -> MethodBody {
        let mut body = MethodBody::from_instructions([
            Instruction::simple(OpCode::Ldarg0),
            Instruction::ldc_i4(1),
            Instruction::ldc_i4(7),
            Instruction::simple(OpCode::Ret),
        ]);
        let ids = body.instructions.ids();
        body.instructions
            .insert_after(ids[0], Instruction::branch(OpCode::BrtrueS, ids[2]))
            .unwrap();
        body.instructions
            .insert_after(ids[1], Instruction::branch(OpCode::BrS, ids[3]))
            .unwrap();
        body
    }

    fn run(module: &Module, token: Token, arg: i32) -> Value {
        let body = module.method_def(token).unwrap().body.as_ref().unwrap();
        Machine::new()
            .run(body, &module.references, vec![Value::Int(i64::from(arg))])
            .unwrap()
            .unwrap()
    }

    #[test]
    fn head_keeps_identity_of_branch_target() {
        let (mut module, token) = method_with(branchy_body(), TypeSig::I4);
        assert_eq!(run(&module, token, 1), Value::Int(7));
        assert_eq!(run(&module, token, 0), Value::Int(1));

        let target = module.method_def(token).unwrap().body.as_ref().unwrap().instructions.ids()[4];
        let (method, references) = module.method_and_references_mut(token).unwrap();
        let stats = rewrite_method(method, references, &mut SplitSeven).unwrap();
        assert_eq!(stats, RewriteStats { replaced: 1, missed: 0 });

        let body = module.method_def(token).unwrap().body.as_ref().unwrap();
        assert_eq!(body.instructions.len(), 8);
        assert_eq!(body.instructions.get(target).unwrap().opcode, OpCode::LdcI43);
        assert_eq!(body.max_stack, 2);
        assert!(body.validate().is_ok());

        assert_eq!(run(&module, token, 1), Value::Int(7));
        assert_eq!(run(&module, token, 0), Value::Int(1));
    }

    #[test]
    fn inserted_instructions_are_not_revisited() {
        // A rule matching its own output would loop forever without the id snapshot.
        struct Grow;
        impl RewriteRule for Grow {
            fn name(&self) -> &'static str {
                "Grow"
            }
            fn matches(&self, instruction: &Instruction, _references: &ReferenceTable) -> bool {
                instruction.opcode == OpCode::LdcI4
            }
            fn rewrite(
                &mut self,
                _site: InstrId,
                _ctx: &mut RewriteContext<'_>,
            ) -> Result<Option<Replacement>> {
                Ok(Some(Replacement::new(vec![
                    Instruction::ldc_i4(1),
                    Instruction::ldc_i4(0),
                    Instruction::simple(OpCode::Add),
                ])))
            }
        }

        let (mut module, token) = method_with(
            MethodBody::from_instructions([
                Instruction::ldc_i4(5),
                Instruction::ldc_i4(6),
                Instruction::simple(OpCode::Add),
                Instruction::simple(OpCode::Ret),
            ]),
            TypeSig::I4,
        );
        let (method, references) = module.method_and_references_mut(token).unwrap();
        let stats = rewrite_method(method, references, &mut Grow).unwrap();
        assert_eq!(stats.replaced, 2);
        assert_eq!(method.body.as_ref().unwrap().instructions.len(), 8);
    }

    #[test]
    fn handler_boundaries_survive() {
        let mut body = MethodBody::from_instructions([
            Instruction::ldc_i4(7),
            Instruction::simple(OpCode::Pop),
            Instruction::simple(OpCode::Pop),
            Instruction::simple(OpCode::Ret),
        ]);
        let ids = body.instructions.ids();
        let leave_try = body
            .instructions
            .insert_after(ids[1], Instruction::branch(OpCode::LeaveS, ids[3]))
            .unwrap();
        let leave_handler = body
            .instructions
            .insert_after(ids[2], Instruction::branch(OpCode::LeaveS, ids[3]))
            .unwrap();
        body.exception_handlers.push(ExceptionHandler::catch(
            TypeSig::Class("System.Exception".into()),
            ids[0],
            Some(ids[2]),
            ids[2],
            Some(ids[3]),
        ));
        let (mut module, token) = method_with(body, TypeSig::Void);
        assert!(leave_try != leave_handler);

        let (method, references) = module.method_and_references_mut(token).unwrap();
        rewrite_method(method, references, &mut SplitSeven).unwrap();
        let body = method.body.as_ref().unwrap();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_start, ids[0]);
        assert_eq!(body.instructions.first(), Some(ids[0]));
        assert_eq!(body.instructions.position(ids[2]), Some(5));
        assert!(body.validate().is_ok());
    }

    #[test]
    fn misses_leave_encoding_untouched() {
        let (mut module, token) = method_with(branchy_body(), TypeSig::I4);
        let before = module.method_def(token).unwrap().body.clone().unwrap();

        let (method, references) = module.method_and_references_mut(token).unwrap();
        let stats = rewrite_method(method, references, &mut DeclineAll).unwrap();
        assert_eq!(stats, RewriteStats { replaced: 0, missed: 2 });

        let after = method.body.as_ref().unwrap();
        let opcodes = |body: &MethodBody| -> Vec<OpCode> {
            body.instructions.iter().map(|(_, i)| i.opcode).collect()
        };
        assert_eq!(opcodes(after), opcodes(&before));
        assert_eq!(after.instructions.get(after.instructions.ids()[1]).unwrap().opcode, OpCode::BrtrueS);
    }

    #[test]
    fn failed_rewrite_restores_method() {
        let (mut module, token) = method_with(branchy_body(), TypeSig::I4);
        let before = module.method_def(token).unwrap().body.clone().unwrap();

        let (method, references) = module.method_and_references_mut(token).unwrap();
        let err = rewrite_method(method, references, &mut BreakStack).unwrap_err();
        assert!(err.is_method_scoped());

        let after = method.body.as_ref().unwrap();
        assert_eq!(after.instructions.ids(), before.instructions.ids());
        assert_eq!(
            after.instructions.iter().map(|(_, i)| i.clone()).collect::<Vec<_>>(),
            before.instructions.iter().map(|(_, i)| i.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn trailer_goes_after_following_instruction() {
        let mut body = MethodBody::from_instructions([
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ]);
        let ids = body.instructions.ids();
        let replacement = Replacement::new(vec![Instruction::ldc_i4(1), Instruction::ldc_i4(2)])
            .with_trailer(vec![Instruction::simple(OpCode::Pop), Instruction::simple(OpCode::Pop)]);
        body.instructions
            .insert_before(ids[1], Instruction::simple(OpCode::Dup))
            .unwrap();

        apply_replacement(&mut body, ids[0], replacement).unwrap();
        let opcodes: Vec<OpCode> = body.instructions.iter().map(|(_, i)| i.opcode).collect();
        assert_eq!(
            opcodes,
            [OpCode::LdcI4, OpCode::LdcI4, OpCode::Dup, OpCode::Pop, OpCode::Pop, OpCode::Ret]
        );

        let mut body = MethodBody::from_instructions([Instruction::simple(OpCode::Nop)]);
        let only = body.instructions.ids()[0];
        let dangling = Replacement::new(vec![Instruction::simple(OpCode::Nop)])
            .with_trailer(vec![Instruction::simple(OpCode::Nop)]);
        assert!(apply_replacement(&mut body, only, dangling).is_err());
        assert!(apply_replacement(&mut body, only, Replacement::new(vec![])).is_err());
    }

    #[test]
    fn scratch_locals_are_shared_per_type() {
        let mut body = MethodBody::default();
        body.add_local(TypeSig::Object).unwrap();
        let mut scratch = ScratchLocals::default();
        assert_eq!(scratch.get_or_add(&mut body, &TypeSig::I4).unwrap(), 1);
        assert_eq!(scratch.get_or_add(&mut body, &TypeSig::String).unwrap(), 2);
        assert_eq!(scratch.get_or_add(&mut body, &TypeSig::I4).unwrap(), 1);
        assert_eq!(scratch.len(), 2);
        assert_eq!(body.locals.len(), 3);
    }
}
