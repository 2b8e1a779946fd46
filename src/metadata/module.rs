//! In-memory module model: type, field and method definitions plus the reference table.
//!
//! A [`Module`] is the unit a patch pass works on. It stands in for a parsed assembly: types
//! own fields, methods and nested types by token, methods own their editable
//! [`MethodBody`], and every member operand inside a body points into the module's
//! [`ReferenceTable`]. Modules round-trip through JSON with [`Module::load`] and
//! [`Module::save`].

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    assembly::MethodBody,
    metadata::{
        members::{FieldRef, MethodRef},
        references::ReferenceTable,
        signatures::{MethodSig, TypeSig},
        token::{TableId, Token},
    },
    Error, Result,
};

bitflags! {
    /// Flags of a type definition (ECMA-335 II.23.1.15).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TypeAttributes: u32 {
        /// Visibility mask
        const VISIBILITY_MASK = 0x0000_0007;
        /// Public top-level type
        const PUBLIC = 0x0000_0001;
        /// Public nested type
        const NESTED_PUBLIC = 0x0000_0002;
        /// Interface definition
        const INTERFACE = 0x0000_0020;
        /// Abstract type
        const ABSTRACT = 0x0000_0080;
        /// Sealed type
        const SEALED = 0x0000_0100;
    }
}

bitflags! {
    /// Flags of a field definition (ECMA-335 II.23.1.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FieldAttributes: u16 {
        /// Member access mask
        const FIELD_ACCESS_MASK = 0x0007;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only
        const FAMILY = 0x0004;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Static field
        const STATIC = 0x0010;
        /// Field can only be initialized
        const INIT_ONLY = 0x0020;
        /// Field is not serialized when the type is remoted
        const NOT_SERIALIZED = 0x0080;
    }
}

bitflags! {
    /// Flags of a method definition (ECMA-335 II.23.1.10).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MethodAttributes: u16 {
        /// Member access mask
        const MEMBER_ACCESS_MASK = 0x0007;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
        /// Static method
        const STATIC = 0x0010;
        /// Virtual method
        const VIRTUAL = 0x0040;
        /// Abstract method
        const ABSTRACT = 0x0400;
        /// Method name is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding
        const RT_SPECIAL_NAME = 0x1000;
    }
}

/// Custom attribute marking a field as not persisted.
pub const NON_SERIALIZED_ATTRIBUTE: &str = "System.NonSerializedAttribute";

/// A type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    /// `TypeDef` token of this type
    pub token: Token,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Type flags
    pub flags: TypeAttributes,
    /// Enclosing type of a nested type
    pub enclosing: Option<Token>,
    /// Nested types in declaration order
    pub nested_types: Vec<Token>,
    /// Fields in declaration order
    pub fields: Vec<Token>,
    /// Methods in declaration order
    pub methods: Vec<Token>,
}

impl TypeDef {
    /// Returns `true` for interface definitions.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// Returns `true` for nested types.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }
}

/// A field definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// `Field` token of this field
    pub token: Token,
    /// Declaring type
    pub declaring_type: Token,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
    /// Field flags
    pub flags: FieldAttributes,
    /// Full names of the custom attribute types applied to the field
    #[serde(default)]
    pub custom_attributes: Vec<String>,
}

impl FieldDef {
    /// Returns `true` if only the declaring type can access the field.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.flags.bits() & FieldAttributes::FIELD_ACCESS_MASK.bits()
            == FieldAttributes::PRIVATE.bits()
    }

    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }

    /// Returns `true` if the field is flagged or attributed as not persisted.
    #[must_use]
    pub fn is_not_serialized(&self) -> bool {
        self.flags.contains(FieldAttributes::NOT_SERIALIZED)
            || self
                .custom_attributes
                .iter()
                .any(|attribute| attribute == NON_SERIALIZED_ATTRIBUTE)
    }
}

/// A method definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    /// `MethodDef` token of this method
    pub token: Token,
    /// Declaring type
    pub declaring_type: Token,
    /// Method name
    pub name: String,
    /// Method flags
    pub flags: MethodAttributes,
    /// Method signature
    pub signature: MethodSig,
    /// Method body, `None` for abstract, extern and runtime methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Returns `true` for instance and type constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Returns `true` if the method has IL code.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// One module: its definitions and its table of imported references.
///
/// # Examples
///
/// ```rust
/// use cilpatch::metadata::{MethodAttributes, MethodSig, Module, TypeAttributes, TypeSig};
///
/// let mut module = Module::new("Game");
/// let data = module.add_type("Game", "Data", TypeAttributes::PUBLIC);
/// let tick = module.add_method(
///     data,
///     "Tick",
///     MethodAttributes::PUBLIC,
///     MethodSig::instance_method(TypeSig::Void, vec![]),
///     None,
/// )?;
///
/// let tick = module.method_def(tick).unwrap();
/// assert_eq!(module.method_full_name(tick), "System.Void Game.Data::Tick()");
/// # Ok::<(), cilpatch::Error>(())
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    /// Assembly name without extension, e.g. `Assembly-CSharp`
    pub name: String,
    /// Type definitions, indexed by token row
    pub types: Vec<TypeDef>,
    /// Field definitions, indexed by token row
    pub fields: Vec<FieldDef>,
    /// Method definitions, indexed by token row
    pub methods: Vec<MethodDef>,
    /// Imported member references
    pub references: ReferenceTable,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The file name of the assembly this module was read from.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.dll", self.name)
    }

    /// Reads a module from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] or [`crate::Error::Json`].
    pub fn load(path: &Path) -> Result<Module> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Writes the module to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::FileError`] or [`crate::Error::Json`].
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Adds a top-level type.
    pub fn add_type(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        flags: TypeAttributes,
    ) -> Token {
        let token = Token::from_index(TableId::TypeDef, self.types.len());
        self.types.push(TypeDef {
            token,
            namespace: namespace.into(),
            name: name.into(),
            flags,
            enclosing: None,
            nested_types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        });
        token
    }

    /// Adds a type nested in `enclosing`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if `enclosing` is not a type of this module.
    pub fn add_nested_type(
        &mut self,
        enclosing: Token,
        name: impl Into<String>,
        flags: TypeAttributes,
    ) -> Result<Token> {
        let token = Token::from_index(TableId::TypeDef, self.types.len());
        self.type_def_mut(enclosing)?.nested_types.push(token);
        self.types.push(TypeDef {
            token,
            namespace: String::new(),
            name: name.into(),
            flags,
            enclosing: Some(enclosing),
            nested_types: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        });
        Ok(token)
    }

    /// Adds a field to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if `owner` is not a type of this module.
    pub fn add_field(
        &mut self,
        owner: Token,
        name: impl Into<String>,
        field_type: TypeSig,
        flags: FieldAttributes,
    ) -> Result<Token> {
        let token = Token::from_index(TableId::Field, self.fields.len());
        self.type_def_mut(owner)?.fields.push(token);
        self.fields.push(FieldDef {
            token,
            declaring_type: owner,
            name: name.into(),
            field_type,
            flags,
            custom_attributes: Vec::new(),
        });
        Ok(token)
    }

    /// Adds a method to `owner`.
    ///
    /// The `has_this` bit of `signature` is derived from the `STATIC` flag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if `owner` is not a type of this module.
    pub fn add_method(
        &mut self,
        owner: Token,
        name: impl Into<String>,
        flags: MethodAttributes,
        mut signature: MethodSig,
        body: Option<MethodBody>,
    ) -> Result<Token> {
        let token = Token::from_index(TableId::MethodDef, self.methods.len());
        self.type_def_mut(owner)?.methods.push(token);
        signature.has_this = !flags.contains(MethodAttributes::STATIC);
        self.methods.push(MethodDef {
            token,
            declaring_type: owner,
            name: name.into(),
            flags,
            signature,
            body,
        });
        Ok(token)
    }

    fn index_of(token: Token, table: TableId) -> Option<usize> {
        if token.is_table(table) {
            token.index()
        } else {
            None
        }
    }

    /// The type behind `token`.
    #[must_use]
    pub fn type_def(&self, token: Token) -> Option<&TypeDef> {
        Self::index_of(token, TableId::TypeDef).and_then(|index| self.types.get(index))
    }

    fn type_def_mut(&mut self, token: Token) -> Result<&mut TypeDef> {
        Self::index_of(token, TableId::TypeDef)
            .and_then(|index| self.types.get_mut(index))
            .ok_or_else(|| Error::TypeNotFound(token.to_string()))
    }

    /// The field behind `token`.
    #[must_use]
    pub fn field_def(&self, token: Token) -> Option<&FieldDef> {
        Self::index_of(token, TableId::Field).and_then(|index| self.fields.get(index))
    }

    /// Mutable access to the field behind `token`.
    pub fn field_def_mut(&mut self, token: Token) -> Option<&mut FieldDef> {
        Self::index_of(token, TableId::Field).and_then(|index| self.fields.get_mut(index))
    }

    /// The method behind `token`.
    #[must_use]
    pub fn method_def(&self, token: Token) -> Option<&MethodDef> {
        Self::index_of(token, TableId::MethodDef).and_then(|index| self.methods.get(index))
    }

    /// Mutable access to the method behind `token`.
    pub fn method_def_mut(&mut self, token: Token) -> Option<&mut MethodDef> {
        Self::index_of(token, TableId::MethodDef).and_then(|index| self.methods.get_mut(index))
    }

    /// Splits the borrow of a method and the reference table, so a body can be edited while
    /// new references are imported.
    pub fn method_and_references_mut(
        &mut self,
        token: Token,
    ) -> Option<(&mut MethodDef, &mut ReferenceTable)> {
        let index = Self::index_of(token, TableId::MethodDef)?;
        let method = self.methods.get_mut(index)?;
        Some((method, &mut self.references))
    }

    /// Types that are not nested in another type, in declaration order.
    pub fn top_level_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter().filter(|ty| !ty.is_nested())
    }

    /// The full name of a type, `Ns.Outer/Inner` for nested types.
    #[must_use]
    pub fn type_full_name(&self, ty: &TypeDef) -> String {
        match ty.enclosing.and_then(|enclosing| self.type_def(enclosing)) {
            Some(enclosing) => format!("{}/{}", self.type_full_name(enclosing), ty.name),
            None if ty.namespace.is_empty() => ty.name.clone(),
            None => format!("{}.{}", ty.namespace, ty.name),
        }
    }

    /// Looks up a type by full name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<&TypeDef> {
        self.types
            .iter()
            .find(|ty| self.type_full_name(ty) == full_name)
    }

    /// The signature form of a type defined here.
    #[must_use]
    pub fn type_sig(&self, ty: &TypeDef) -> TypeSig {
        TypeSig::Class(self.type_full_name(ty))
    }

    fn declaring_type_sig(&self, token: Token) -> TypeSig {
        match self.type_def(token) {
            Some(ty) => self.type_sig(ty),
            None => TypeSig::Class(token.to_string()),
        }
    }

    /// Full name of a method, `System.Void Ns.Type::Name(System.String)`.
    #[must_use]
    pub fn method_full_name(&self, method: &MethodDef) -> String {
        self.method_ref(method).full_name()
    }

    /// A reference describing `method`, usable as a call operand once imported.
    #[must_use]
    pub fn method_ref(&self, method: &MethodDef) -> MethodRef {
        MethodRef::new(
            self.declaring_type_sig(method.declaring_type),
            method.name.clone(),
            method.signature.clone(),
        )
    }

    /// A reference describing `field`, usable as a field operand once imported.
    #[must_use]
    pub fn field_ref(&self, field: &FieldDef) -> FieldRef {
        FieldRef::new(
            self.declaring_type_sig(field.declaring_type),
            field.name.clone(),
            field.field_type.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_type_names() {
        let mut module = Module::new("Game");
        let outer = module.add_type("Game.UI", "Menu", TypeAttributes::PUBLIC);
        let inner = module
            .add_nested_type(outer, "Entry", TypeAttributes::NESTED_PUBLIC)
            .unwrap();
        let innermost = module
            .add_nested_type(inner, "State", TypeAttributes::NESTED_PUBLIC)
            .unwrap();

        let ty = module.type_def(innermost).unwrap();
        assert_eq!(module.type_full_name(ty), "Game.UI.Menu/Entry/State");
        assert_eq!(module.find_type("Game.UI.Menu/Entry").map(|t| t.token), Some(inner));
        assert_eq!(module.top_level_types().count(), 1);
        assert!(module
            .add_nested_type(Token::from_parts(TableId::TypeDef, 40), "X", TypeAttributes::empty())
            .is_err());
    }

    #[test]
    fn field_exclusion_flags() {
        let mut module = Module::new("Game");
        let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
        let public = module
            .add_field(data, "score", TypeSig::I4, FieldAttributes::PUBLIC)
            .unwrap();
        let private = module
            .add_field(data, "secretSeed", TypeSig::I4, FieldAttributes::PRIVATE)
            .unwrap();
        let transient = module
            .add_field(data, "cache", TypeSig::Object, FieldAttributes::PUBLIC)
            .unwrap();
        module
            .field_def_mut(transient)
            .unwrap()
            .custom_attributes
            .push(NON_SERIALIZED_ATTRIBUTE.to_string());

        assert!(!module.field_def(public).unwrap().is_private());
        assert!(module.field_def(private).unwrap().is_private());
        assert!(module.field_def(transient).unwrap().is_not_serialized());
        assert_eq!(
            module.field_ref(module.field_def(public).unwrap()).full_name(),
            "System.Int32 Data::score"
        );
    }

    #[test]
    fn static_flag_drives_has_this() {
        let mut module = Module::new("Game");
        let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
        let method = module
            .add_method(
                data,
                "Create",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSig::instance_method(TypeSig::Class("Data".into()), vec![]),
                None,
            )
            .unwrap();
        let method = module.method_def(method).unwrap();
        assert!(!method.signature.has_this);
        assert!(!method.has_body());
        assert_eq!(module.method_full_name(method), "Data Data::Create()");
    }

    #[test]
    fn json_round_trip() {
        let mut module = Module::new("Game");
        let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
        module
            .add_field(data, "score", TypeSig::I4, FieldAttributes::PUBLIC)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Game.json");
        module.save(&path).unwrap();

        let loaded = Module::load(&path).unwrap();
        assert_eq!(loaded.name, "Game");
        assert_eq!(loaded.fields.len(), 1);
        assert_eq!(loaded.file_name(), "Game.dll");
    }

    #[test]
    fn load_rejects_cyclic_body() {
        use crate::assembly::{Instruction, OpCode};

        let mut module = Module::new("Game");
        let data = module.add_type("", "Data", TypeAttributes::PUBLIC);
        let body = MethodBody::from_instructions([
            Instruction::simple(OpCode::Nop),
            Instruction::simple(OpCode::Ret),
        ]);
        module
            .add_method(
                data,
                "Tick",
                MethodAttributes::PUBLIC | MethodAttributes::STATIC,
                MethodSig::static_method(TypeSig::Void, vec![]),
                Some(body),
            )
            .unwrap();

        let mut json = serde_json::to_value(&module).unwrap();
        json["methods"][0]["body"]["instructions"]["nodes"][1]["next"] = 0.into();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Game.json");
        std::fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(Module::load(&path), Err(Error::Json(_))));
    }
}
