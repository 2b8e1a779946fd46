//! Small hand-built modules mirroring the shapes the passes look for.

use crate::{
    assembly::{Instruction, MethodBody, OpCode, Operand},
    metadata::{
        FieldAttributes, MethodAttributes, MethodRef, MethodSig, Module, Token, TypeAttributes,
        TypeSig,
    },
};

const PUBLIC_STATIC: MethodAttributes = MethodAttributes::PUBLIC.union(MethodAttributes::STATIC);

fn class(name: &str) -> TypeSig {
    TypeSig::Class(name.to_string())
}

fn body(instructions: impl IntoIterator<Item = Instruction>) -> Option<MethodBody> {
    Some(MethodBody::from_instructions(instructions))
}

fn op(opcode: OpCode) -> Instruction {
    Instruction::simple(opcode)
}

fn with_token(opcode: OpCode, token: Token) -> Instruction {
    Instruction::new(opcode, Operand::Token(token))
}

fn import_method(module: &mut Module, token: Token) -> Token {
    let reference = module.method_def(token).map(|m| module.method_ref(m)).unwrap();
    module.references.import(reference)
}

fn import_field(module: &mut Module, token: Token) -> Token {
    let reference = module.field_def(token).map(|f| module.field_ref(f)).unwrap();
    module.references.import(reference)
}

// Helper function to create the game module with its save data type `Data`
//
// `Data` has three tracked fields (score, money, name), a private and a transient one, and
// typed accessors for int and string. `Game` holds static methods touching the fields in every
// supported and unsupported way.
pub fn data_module() -> Module {
    let mut module = Module::new("Assembly-CSharp");
    let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
    let game = module.add_type("", "Game", TypeAttributes::PUBLIC);
    let helpers = module.add_type("", "Helpers", TypeAttributes::PUBLIC);
    let data_sig = class("Data");

    let score = module
        .add_field(data, "score", TypeSig::I4, FieldAttributes::PUBLIC)
        .unwrap();
    let seed = module
        .add_field(data, "secretSeed", TypeSig::I4, FieldAttributes::PRIVATE)
        .unwrap();
    let money = module
        .add_field(data, "money", TypeSig::I8, FieldAttributes::PUBLIC)
        .unwrap();
    module
        .add_field(data, "name", TypeSig::String, FieldAttributes::PUBLIC)
        .unwrap();
    module
        .add_field(
            data,
            "cache",
            TypeSig::Object,
            FieldAttributes::PUBLIC | FieldAttributes::NOT_SERIALIZED,
        )
        .unwrap();

    let score = import_field(&mut module, score);
    let seed = import_field(&mut module, seed);
    let money = import_field(&mut module, money);

    let accessors = [
        ("GetInt", MethodSig::instance_method(TypeSig::I4, vec![TypeSig::String]), vec![op(OpCode::LdcI40), op(OpCode::Ret)]),
        ("SetInt", MethodSig::instance_method(TypeSig::Void, vec![TypeSig::String, TypeSig::I4]), vec![op(OpCode::Ret)]),
        ("GetString", MethodSig::instance_method(TypeSig::String, vec![TypeSig::String]), vec![op(OpCode::Ldnull), op(OpCode::Ret)]),
        ("SetString", MethodSig::instance_method(TypeSig::Void, vec![TypeSig::String, TypeSig::String]), vec![op(OpCode::Ret)]),
    ];
    for (name, signature, instructions) in accessors {
        module
            .add_method(data, name, MethodAttributes::PUBLIC, signature, body(instructions))
            .unwrap();
    }

    let reset_score = || {
        vec![
            op(OpCode::Ldarg0),
            op(OpCode::LdcI40),
            with_token(OpCode::Stfld, score),
            op(OpCode::Ret),
        ]
    };
    module
        .add_method(
            data,
            "SetupNewPlayerData",
            MethodAttributes::PUBLIC,
            MethodSig::instance_method(TypeSig::Void, vec![]),
            body(reset_score()),
        )
        .unwrap();
    module
        .add_method(
            data,
            ".ctor",
            MethodAttributes::PUBLIC
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            MethodSig::instance_method(TypeSig::Void, vec![]),
            body(reset_score()),
        )
        .unwrap();

    let bump = module
        .add_method(
            helpers,
            "Bump",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::Void, vec![TypeSig::I4.by_ref()]),
            body([op(OpCode::Ret)]),
        )
        .unwrap();
    let bump = import_method(&mut module, bump);

    let load = |field| vec![op(OpCode::Ldarg0), with_token(OpCode::Ldfld, field), op(OpCode::Ret)];
    let methods = [
        ("ReadScore", TypeSig::I4, vec![data_sig.clone()], load(score)),
        (
            "WriteScore",
            TypeSig::Void,
            vec![data_sig.clone(), TypeSig::I4],
            vec![
                op(OpCode::Ldarg0),
                op(OpCode::Ldarg1),
                with_token(OpCode::Stfld, score),
                op(OpCode::Ret),
            ],
        ),
        ("ReadMoney", TypeSig::I8, vec![data_sig.clone()], load(money)),
        ("ReadSeed", TypeSig::I4, vec![data_sig.clone()], load(seed)),
        (
            "BumpScore",
            TypeSig::Void,
            vec![data_sig.clone()],
            vec![
                op(OpCode::Ldarg0),
                with_token(OpCode::Ldflda, score),
                Instruction::call(bump),
                op(OpCode::Ret),
            ],
        ),
        (
            "ScoreAddress",
            TypeSig::Void,
            vec![data_sig],
            vec![
                op(OpCode::Ldarg0),
                with_token(OpCode::Ldflda, score),
                op(OpCode::Pop),
                op(OpCode::Ret),
            ],
        ),
    ];
    for (name, return_type, parameters, instructions) in methods {
        module
            .add_method(
                game,
                name,
                PUBLIC_STATIC,
                MethodSig::static_method(return_type, parameters),
                body(instructions),
            )
            .unwrap();
    }
    module
}

// Helper function to create the shared utils module with the generic accessors
pub fn helper_module() -> Module {
    let mut module = Module::new("TeamCherry.SharedUtils");
    let extensions = module.add_type(
        "TeamCherry.SharedUtils",
        "VariableExtensions",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    );

    module
        .add_method(
            extensions,
            "GetVariable",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::MVar(0), vec![TypeSig::Object, TypeSig::String])
                .with_generic_parameters(1),
            body([op(OpCode::Ldnull), op(OpCode::Ret)]),
        )
        .unwrap();
    module
        .add_method(
            extensions,
            "SetVariable",
            PUBLIC_STATIC,
            MethodSig::static_method(
                TypeSig::Void,
                vec![TypeSig::Object, TypeSig::String, TypeSig::MVar(0)],
            )
            .with_generic_parameters(1),
            body([op(OpCode::Ret)]),
        )
        .unwrap();

    let get_value = module.references.import(MethodRef::new(
        class("System.Reflection.FieldInfo"),
        "GetValue",
        MethodSig::instance_method(TypeSig::Object, vec![TypeSig::Object]),
    ));
    let selector = TypeSig::GenericInst {
        base: Box::new(class("System.Func`2")),
        args: vec![class("System.Reflection.FieldInfo"), TypeSig::Boolean],
    };

    // Reduced to the reflective read: the field loop and the selector call are left out.
    let mut get_variables = MethodBody::from_instructions([
        op(OpCode::Ldnull),
        op(OpCode::Stloc0),
        op(OpCode::Ldloc1),
        op(OpCode::Ldarg0),
        Instruction::callvirt(get_value),
        Instruction::new(OpCode::UnboxAny, Operand::Type(TypeSig::MVar(0))),
        op(OpCode::Pop),
        op(OpCode::Ldloc0),
        op(OpCode::Ret),
    ]);
    get_variables.locals = vec![TypeSig::Object, class("System.Reflection.FieldInfo")];
    module
        .add_method(
            extensions,
            "GetVariables",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::Object, vec![TypeSig::Object, selector])
                .with_generic_parameters(1),
            Some(get_variables),
        )
        .unwrap();
    module
}

// Helper function to create the prepatcher's helper module
pub fn prepatcher_module() -> Module {
    let mut module = Module::new("SilksongPrepatcher");
    let extensions = module.add_type(
        "SilksongPrepatcher.Utils",
        "AssemblyExtensions",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    );
    module
        .add_method(
            extensions,
            "GetTypesSafelyIgnoreMMHook",
            PUBLIC_STATIC,
            MethodSig::static_method(
                TypeSig::SzArray(Box::new(class("System.Type"))),
                vec![class("System.Reflection.Assembly")],
            ),
            body([op(OpCode::Ldnull), op(OpCode::Ret)]),
        )
        .unwrap();
    module
        .add_method(
            extensions,
            "TypeAssignableFromSafe",
            PUBLIC_STATIC,
            MethodSig::static_method(
                TypeSig::Boolean,
                vec![class("System.Type"), class("System.Type")],
            ),
            body([op(OpCode::LdcI40), op(OpCode::Ret)]),
        )
        .unwrap();

    let cache = module.add_type(
        "SilksongPrepatcher.PlayerData",
        "PDCache",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    );
    for (suffix, value) in [
        ("Bool", TypeSig::Boolean),
        ("Int", TypeSig::I4),
        ("String", TypeSig::String),
        ("Float", TypeSig::R4),
    ] {
        module
            .add_method(
                cache,
                format!("Get{suffix}"),
                PUBLIC_STATIC,
                MethodSig::static_method(value.clone(), vec![TypeSig::Object, TypeSig::String]),
                None,
            )
            .unwrap();
        module
            .add_method(
                cache,
                format!("Set{suffix}"),
                PUBLIC_STATIC,
                MethodSig::static_method(
                    TypeSig::Void,
                    vec![TypeSig::Object, TypeSig::String, value],
                ),
                None,
            )
            .unwrap();
    }
    module
}

// Helper function to create the FSM runtime module
pub fn playmaker_module() -> Module {
    let mut module = Module::new("PlayMaker");
    let utils = module.add_type(
        "HutongGames.PlayMaker",
        "ReflectionUtils",
        TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT | TypeAttributes::SEALED,
    );
    let type_sig = class("System.Type");
    let assembly_sig = class("System.Reflection.Assembly");

    let lookup = module
        .add_field(
            utils,
            "typeLookup",
            TypeSig::GenericInst {
                base: Box::new(class("System.Collections.Generic.Dictionary`2")),
                args: vec![TypeSig::String, type_sig.clone()],
            },
            FieldAttributes::PRIVATE | FieldAttributes::STATIC,
        )
        .unwrap();
    let lookup = import_field(&mut module, lookup);

    let get_types = module.references.import(MethodRef::new(
        assembly_sig.clone(),
        "GetTypes",
        MethodSig::instance_method(TypeSig::SzArray(Box::new(type_sig.clone())), vec![]),
    ));
    let is_assignable_from = module.references.import(MethodRef::new(
        type_sig.clone(),
        "IsAssignableFrom",
        MethodSig::instance_method(TypeSig::Boolean, vec![type_sig.clone()]),
    ));

    module
        .add_method(
            utils,
            ".cctor",
            MethodAttributes::PRIVATE
                | MethodAttributes::STATIC
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RT_SPECIAL_NAME,
            MethodSig::static_method(TypeSig::Void, vec![]),
            body([
                op(OpCode::Ldnull),
                with_token(OpCode::Stsfld, lookup),
                op(OpCode::Ret),
            ]),
        )
        .unwrap();
    module
        .add_method(
            utils,
            "GetGlobalType",
            PUBLIC_STATIC,
            MethodSig::static_method(type_sig.clone(), vec![TypeSig::String]),
            body([op(OpCode::Ldarg0), op(OpCode::Ret)]),
        )
        .unwrap();
    module
        .add_method(
            utils,
            "FindAllTypes",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::Void, vec![assembly_sig]),
            body([
                op(OpCode::Ldarg0),
                Instruction::callvirt(get_types),
                op(OpCode::Pop),
                op(OpCode::Ldarg0),
                Instruction::call(get_types),
                op(OpCode::Pop),
                op(OpCode::Ret),
            ]),
        )
        .unwrap();
    module
        .add_method(
            utils,
            "CanConvert",
            PUBLIC_STATIC,
            MethodSig::static_method(TypeSig::Boolean, vec![type_sig.clone(), type_sig]),
            body([
                op(OpCode::Ldarg0),
                op(OpCode::Ldarg1),
                Instruction::callvirt(is_assignable_from),
                op(OpCode::Ret),
            ]),
        )
        .unwrap();
    module
}
