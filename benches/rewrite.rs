//! Benchmarks for body normalization and the field access pass.
//!
//! Tests rewrite performance on synthetic modules:
//! - Expanding and compacting a long method body
//! - A full field access scan over many methods
//! - Replaying the same patches from a patch cache

extern crate cilpatch;

use cilpatch::{
    metadata::{FieldAttributes, MethodAttributes, TypeAttributes},
    patching::{FieldAccessConfig, FieldAccessPatcher},
    prelude::*,
};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

const STATIC: MethodAttributes = MethodAttributes::PUBLIC.union(MethodAttributes::STATIC);

/// Body reading and writing `field` `count` times, with a backward branch over all of it.
fn access_body(field: Token, count: usize) -> MethodBody {
    let mut body = MethodBody::default();
    let head = body.instructions.push(Instruction::simple(OpCode::Nop)).unwrap();
    for _ in 0..count {
        for instruction in [
            Instruction::simple(OpCode::Ldarg0),
            Instruction::simple(OpCode::Ldarg0),
            Instruction::new(OpCode::Ldfld, Operand::Token(field)),
            Instruction::ldc_i4(1),
            Instruction::simple(OpCode::Add),
            Instruction::new(OpCode::Stfld, Operand::Token(field)),
        ] {
            body.instructions.push(instruction).unwrap();
        }
    }
    body.instructions.push(Instruction::simple(OpCode::Ldarg0)).unwrap();
    body.instructions.push(Instruction::branch(OpCode::Brtrue, head)).unwrap();
    body.instructions.push(Instruction::simple(OpCode::Ret)).unwrap();
    body
}

/// `methods` static methods on `Game`, each touching the public field of `Data`.
fn game_module(methods: usize, accesses: usize) -> Module {
    let mut module = Module::new("Assembly-CSharp");
    let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
    let score = module
        .add_field(data, "score", TypeSig::I4, FieldAttributes::PUBLIC)
        .unwrap();
    let reference = module.field_ref(module.field_def(score).unwrap());
    let score = module.references.import(reference);

    let game = module.add_type("", "Game", TypeAttributes::PUBLIC);
    for i in 0..methods {
        module
            .add_method(
                game,
                format!("Update{i}"),
                STATIC,
                MethodSig::static_method(TypeSig::Void, vec![TypeSig::Class("Data".into())]),
                Some(access_body(score, accesses)),
            )
            .unwrap();
    }
    module
}

fn accessor_module() -> Module {
    let mut module = Module::new("TeamCherry.SharedUtils");
    let ext = module.add_type("TeamCherry.SharedUtils", "VariableExtensions", TypeAttributes::PUBLIC);
    module
        .add_method(
            ext,
            "GetVariable",
            STATIC,
            MethodSig::static_method(TypeSig::MVar(0), vec![TypeSig::Object, TypeSig::String])
                .with_generic_parameters(1),
            None,
        )
        .unwrap();
    module
        .add_method(
            ext,
            "SetVariable",
            STATIC,
            MethodSig::static_method(
                TypeSig::Void,
                vec![TypeSig::Object, TypeSig::String, TypeSig::MVar(0)],
            )
            .with_generic_parameters(1),
            None,
        )
        .unwrap();
    module
}

fn bench_expand_compact(c: &mut Criterion) {
    let module = game_module(1, 500);
    let body = module.methods[0].body.clone().unwrap();

    c.bench_function("normalize_expand_compact_3000", |b| {
        b.iter_batched(
            || body.clone(),
            |mut body| {
                expand(&mut body).unwrap();
                compact(&mut body, &module.references, &TypeSig::Void).unwrap();
                black_box(body)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_field_access_scan(c: &mut Criterion) {
    let module = game_module(200, 20);
    let config = PatcherConfig::new();
    let resolver = AssemblyResolver::new().with_module(accessor_module());
    let patcher = FieldAccessPatcher::new(FieldAccessConfig::new("Data"));

    c.bench_function("field_access_scan_200_methods", |b| {
        b.iter_batched(
            || module.clone(),
            |mut module| {
                let env = PatchEnvironment::new(&config, &resolver);
                black_box(patcher.patch(&mut module, &env).unwrap())
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_field_access_replay(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("Assembly-CSharp.dll");
    std::fs::write(&target, b"MZ").unwrap();

    let mut module = game_module(200, 20);
    // Noise the cache has to skip over.
    let game = module.find_type("Game").unwrap().token;
    for i in 0..2000 {
        module
            .add_method(
                game,
                format!("Idle{i}"),
                STATIC,
                MethodSig::static_method(TypeSig::Void, vec![]),
                Some(MethodBody::from_instructions([Instruction::simple(OpCode::Ret)])),
            )
            .unwrap();
    }

    let config = PatcherConfig::new().with_cache_dir(dir.path());
    let resolver = AssemblyResolver::new().with_module(accessor_module());
    let patcher = FieldAccessPatcher::new(FieldAccessConfig::new("Data"));
    let env = PatchEnvironment::new(&config, &resolver).with_target_path(&target);
    patcher.patch(&mut module.clone(), &env).unwrap();

    c.bench_function("field_access_replay_200_of_2200", |b| {
        b.iter_batched(
            || module.clone(),
            |mut module| black_box(patcher.patch(&mut module, &env).unwrap()),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_expand_compact,
    bench_field_access_scan,
    bench_field_access_replay
);
criterion_main!(benches);
