//! Integration tests for call redirection and the pass registry.

mod common;

use cilpatch::{
    metadata::TypeAttributes,
    patching::{CallRedirectPatcher, HELPER_TYPE},
    prelude::*,
};
use common::{listing, safe_helpers_module, with_token, PUBLIC_STATIC};

/// A `Loader` type enumerating the types of an assembly through both call forms.
fn loader_module() -> Module {
    let mut module = Module::new("NestedFadeGroup");
    let loader = module.add_type("Fade", "Loader", TypeAttributes::PUBLIC);
    let get_types = module.references.import(MethodRef::new(
        TypeSig::Class("System.Reflection.Assembly".into()),
        "GetTypes",
        MethodSig::instance_method(
            TypeSig::SzArray(Box::new(TypeSig::Class("System.Type".into()))),
            vec![],
        ),
    ));
    module
        .add_method(
            loader,
            "Scan",
            PUBLIC_STATIC,
            MethodSig::static_method(
                TypeSig::Void,
                vec![TypeSig::Class("System.Reflection.Assembly".into())],
            ),
            Some(MethodBody::from_instructions([
                Instruction::simple(OpCode::Ldarg0),
                with_token(OpCode::Callvirt, get_types),
                Instruction::simple(OpCode::Pop),
                Instruction::simple(OpCode::Ldarg0),
                with_token(OpCode::Call, get_types),
                Instruction::simple(OpCode::Pop),
                Instruction::simple(OpCode::Ret),
            ])),
        )
        .unwrap();
    module
}

#[test]
fn every_call_form_is_redirected() -> Result<()> {
    let mut module = loader_module();
    let config = PatcherConfig::new();
    let resolver = AssemblyResolver::new().with_module(safe_helpers_module());
    let env = PatchEnvironment::new(&config, &resolver);

    let report = CallRedirectPatcher::get_types().patch(&mut module, &env)?;
    assert_eq!(report.methods_patched, 1);
    assert_eq!(report.replaced, 2);
    assert_eq!(
        listing(&module, "Scan"),
        [
            "ldarg.0",
            "call GetTypesSafelyIgnoreMMHook",
            "pop",
            "ldarg.0",
            "call GetTypesSafelyIgnoreMMHook",
            "pop",
            "ret",
        ]
    );
    Ok(())
}

#[test]
fn redirect_is_idempotent() -> Result<()> {
    let mut module = loader_module();
    let config = PatcherConfig::new();
    let resolver = AssemblyResolver::new().with_module(safe_helpers_module());
    let env = PatchEnvironment::new(&config, &resolver);
    let patcher = CallRedirectPatcher::get_types();

    patcher.patch(&mut module, &env)?;
    let after_first = serde_json::to_string(&module)?;
    let references = module.references.len();

    let report = patcher.patch(&mut module, &env)?;
    assert!(!report.changed());
    assert_eq!(report.replaced, 0);
    assert_eq!(module.references.len(), references);
    assert_eq!(serde_json::to_string(&module)?, after_first);
    Ok(())
}

#[test]
fn missing_helper_type_aborts() {
    let mut module = loader_module();
    let config = PatcherConfig::new();
    let mut helpers = Module::new("SilksongPrepatcher");
    helpers.add_type("Other", "Place", TypeAttributes::PUBLIC);
    let resolver = AssemblyResolver::new().with_module(helpers);

    let result = CallRedirectPatcher::get_types().patch(&mut module, &PatchEnvironment::new(&config, &resolver));
    assert!(matches!(result, Err(Error::TypeNotFound(name)) if name == HELPER_TYPE));
    assert_eq!(listing(&module, "Scan")[1], "callvirt GetTypes");
}

#[test]
fn registry_runs_passes_and_dumps_module() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PatcherConfig::new()
        .with_cache_dir(dir.path().join("cache"))
        .with_write_patched_modules(true);
    let resolver = AssemblyResolver::new().with_module(safe_helpers_module());
    let env = PatchEnvironment::new(&config, &resolver);

    let registry = PatcherRegistry::new()
        .with("NestedFadeGroup.dll", CallRedirectPatcher::get_types())
        .with("NestedFadeGroup.dll", CallRedirectPatcher::assignable_from());

    let mut module = loader_module();
    let reports = registry.patch(&mut module, &env)?;
    let names: Vec<&str> = reports.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, ["GetTypes", "TypeAssignableFrom"]);
    assert!(reports[0].1.changed());
    assert!(!reports[1].1.changed());

    let dump = config.dump_file("NestedFadeGroup").unwrap();
    let reloaded = Module::load(&dump)?;
    assert_eq!(listing(&reloaded, "Scan"), listing(&module, "Scan"));
    Ok(())
}

#[test]
fn registry_ignores_unregistered_modules() -> Result<()> {
    let config = PatcherConfig::new();
    let resolver = AssemblyResolver::new();
    let env = PatchEnvironment::new(&config, &resolver);

    let mut module = loader_module();
    let before = serde_json::to_string(&module)?;
    let reports = PatcherRegistry::new().patch(&mut module, &env)?;
    assert!(reports.is_empty());
    assert_eq!(serde_json::to_string(&module)?, before);
    Ok(())
}
