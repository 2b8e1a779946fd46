//! Shared module builders for the integration tests.

#![allow(dead_code)]

use cilpatch::{
    assembly::{Instruction, MethodBody, OpCode, Operand},
    metadata::{FieldAttributes, MethodAttributes, MethodSig, Module, Token, TypeAttributes, TypeSig},
    patching::{HELPER_MODULE, HELPER_TYPE},
};

pub const PUBLIC_STATIC: MethodAttributes = MethodAttributes::PUBLIC.union(MethodAttributes::STATIC);

/// Imports a field of `module` and returns the operand token.
pub fn field_token(module: &mut Module, field: Token) -> Token {
    let reference = module.field_ref(module.field_def(field).unwrap());
    module.references.import(reference)
}

/// Imports a method of `module` and returns the operand token.
pub fn method_token(module: &mut Module, method: Token) -> Token {
    let reference = module.method_ref(module.method_def(method).unwrap());
    module.references.import(reference)
}

pub fn with_token(opcode: OpCode, token: Token) -> Instruction {
    Instruction::new(opcode, Operand::Token(token))
}

/// Renders a body as `mnemonic operand` lines, members by simple name.
pub fn listing(module: &Module, method: &str) -> Vec<String> {
    let method = module
        .all_methods()
        .find(|m| m.name == method)
        .unwrap_or_else(|| panic!("no method {method}"));
    let body = method.body.as_ref().unwrap();
    body.instructions
        .iter()
        .map(|(_, instruction)| {
            let mnemonic = instruction.opcode.mnemonic();
            if let Some(value) = instruction.string() {
                format!("{mnemonic} \"{value}\"")
            } else if let Some(token) = instruction.token() {
                match module.references.get(token) {
                    Ok(member) => format!("{mnemonic} {}", member.name()),
                    Err(_) => format!("{mnemonic} {token}"),
                }
            } else {
                mnemonic.to_string()
            }
        })
        .collect()
}

/// The save data module: `Data` with a public `score` and a private `secretSeed`, and a
/// `Game` type whose `Tick` reads both and stores the sum back into `score`.
pub fn save_data_module() -> Module {
    let mut module = Module::new("Assembly-CSharp");
    let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
    let score = module
        .add_field(data, "score", TypeSig::I4, FieldAttributes::PUBLIC)
        .unwrap();
    let seed = module
        .add_field(data, "secretSeed", TypeSig::I4, FieldAttributes::PRIVATE)
        .unwrap();
    let game = module.add_type("", "Game", TypeAttributes::PUBLIC);

    let score = field_token(&mut module, score);
    let seed = field_token(&mut module, seed);
    let body = MethodBody::from_instructions([
        Instruction::simple(OpCode::Ldarg0),
        Instruction::simple(OpCode::Ldarg0),
        with_token(OpCode::Ldfld, score),
        Instruction::simple(OpCode::Ldarg0),
        with_token(OpCode::Ldfld, seed),
        Instruction::simple(OpCode::Add),
        with_token(OpCode::Stfld, score),
        Instruction::simple(OpCode::Ret),
    ]);
    module
        .add_method(
            game,
            "Tick",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::Void, vec![TypeSig::Class("Data".into())]),
            Some(body),
        )
        .unwrap();
    module
}

/// The generic `GetVariable<T>` / `SetVariable<T>` accessors.
pub fn accessor_module() -> Module {
    let mut module = Module::new("TeamCherry.SharedUtils");
    let ext = module.add_type(
        "TeamCherry.SharedUtils",
        "VariableExtensions",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    );
    module
        .add_method(
            ext,
            "GetVariable",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::MVar(0), vec![TypeSig::Object, TypeSig::String])
                .with_generic_parameters(1),
            None,
        )
        .unwrap();
    module
        .add_method(
            ext,
            "SetVariable",
            PUBLIC_STATIC,
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

/// The safe replacements for `Assembly.GetTypes` and `Type.IsAssignableFrom`.
pub fn safe_helpers_module() -> Module {
    let mut module = Module::new(HELPER_MODULE);
    let (namespace, name) = HELPER_TYPE.rsplit_once('.').unwrap();
    let ext = module.add_type(namespace, name, TypeAttributes::PUBLIC);
    let assembly = TypeSig::Class("System.Reflection.Assembly".into());
    let ty = TypeSig::Class("System.Type".into());
    module
        .add_method(
            ext,
            "GetTypesSafelyIgnoreMMHook",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::SzArray(Box::new(ty.clone())), vec![assembly]),
            None,
        )
        .unwrap();
    module
        .add_method(
            ext,
            "TypeAssignableFromSafe",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::Boolean, vec![ty.clone(), ty]),
            None,
        )
        .unwrap();
    module
}
