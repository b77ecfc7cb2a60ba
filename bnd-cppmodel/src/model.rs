//! Declaration model: what the builder hands to the downstream mapping stage.
//!
//! These types are independent of the XML schema. Structs and interfaces are
//! shared (`Rc`) because the same built object can be reached from several
//! places: a top-level declaration, a base of another type, or a sibling
//! registration of a nested aggregate.

use std::rc::Rc;

use bitflags::bitflags;
use serde::Serialize;
use uguid::Guid;

/// Root container: one bucket per logical header unit.
#[derive(Debug, Default, Serialize)]
pub struct Module {
    pub name: String,
    pub includes: Vec<Include>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            includes: Vec::new(),
        }
    }

    /// Find an include by name, ignoring ASCII case.
    pub fn find_include(&self, name: &str) -> Option<&Include> {
        self.includes
            .iter()
            .find(|inc| inc.name.eq_ignore_ascii_case(name))
    }

    /// Index of the include named `name`, creating it on first use.
    pub fn include_index(&mut self, name: &str) -> usize {
        match self
            .includes
            .iter()
            .position(|inc| inc.name.eq_ignore_ascii_case(name))
        {
            Some(pos) => pos,
            None => {
                self.includes.push(Include::new(name));
                self.includes.len() - 1
            }
        }
    }
}

/// Declarations originating from one logical header.
#[derive(Debug, Default, Serialize)]
pub struct Include {
    pub name: String,
    pub decls: Vec<Decl>,
}

impl Include {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decls: Vec::new(),
        }
    }

    pub fn add(&mut self, decl: Decl) {
        self.decls.push(decl);
    }

    pub fn structs(&self) -> impl Iterator<Item = &Rc<Struct>> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Struct(s) => Some(s),
            _ => None,
        })
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Rc<Interface>> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Interface(i) => Some(i),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &Callable> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Enum(e) => Some(e),
            _ => None,
        })
    }

    pub fn constants(&self) -> impl Iterator<Item = &Constant> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Constant(c) => Some(c),
            _ => None,
        })
    }

    pub fn guids(&self) -> impl Iterator<Item = &GuidConstant> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Guid(g) => Some(g),
            _ => None,
        })
    }

    /// Preprocessor macros collected for this header.
    pub fn macros(&self) -> impl Iterator<Item = &Define> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Define(m) => Some(m),
            _ => None,
        })
    }
}

/// A top-level declaration in an [`Include`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Decl {
    Function(Callable),
    Interface(Rc<Interface>),
    Struct(Rc<Struct>),
    Enum(Enum),
    Constant(Constant),
    Guid(GuidConstant),
    Define(Define),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Function(f) => &f.name,
            Decl::Interface(i) => &i.name,
            Decl::Struct(s) => &s.name,
            Decl::Enum(e) => &e.name,
            Decl::Constant(c) => &c.name,
            Decl::Guid(g) => &g.name,
            Decl::Define(d) => &d.name,
        }
    }
}

/// A resolved type: terminal name plus the decorations collected on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeRef {
    /// Fundamental, user-declared or bound type name.
    pub name: String,
    /// One `*` per indirection level.
    pub pointer: String,
    /// Array extents, outermost first. Empty for non-arrays.
    pub array_dims: Vec<u32>,
    pub is_reference: bool,
    pub is_const: bool,
}

impl TypeRef {
    pub fn is_array(&self) -> bool {
        !self.array_dims.is_empty()
    }

    pub fn pointer_depth(&self) -> usize {
        self.pointer.len()
    }
}

/// Calling convention declared through an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallConv {
    StdCall,
    CDecl,
    ThisCall,
}

bitflags! {
    /// Direction and shape of a parameter, decoded from SAL annotations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ParamAttribute: u8 {
        const IN = 1 << 0;
        const OUT = 1 << 1;
        const IN_OUT = 1 << 2;
        const OPTIONAL = 1 << 3;
        const BUFFER = 1 << 4;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub ty: TypeRef,
    pub attribute: ParamAttribute,
}

/// A free function, or the signature part of a method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Callable {
    pub name: String,
    pub calling_convention: Option<CallConv>,
    pub params: Vec<Parameter>,
    pub return_value: TypeRef,
}

/// A virtual method of an interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Method {
    #[serde(flatten)]
    pub callable: Callable,
    /// Vtable slot in declaration order.
    pub offset: u32,
    /// Vtable slot after the MSVC overload grouping.
    pub abi_offset: u32,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.callable.name
    }
}

/// A COM-style interface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interface {
    pub name: String,
    pub base: Option<String>,
    /// The `uuid` annotation as written, braces stripped. Kept even when it
    /// does not parse into `guid`.
    pub uuid: Option<String>,
    pub guid: Option<Guid>,
    pub methods: Vec<Method>,
    /// Inherited plus own slots, used when this interface is itself a base.
    pub total_method_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    /// Element position inside the aggregate, not a byte offset.
    pub offset: u32,
    pub is_bitfield: bool,
    /// Bit width when `is_bitfield` is set.
    pub bit_offset: u32,
}

/// A struct or union.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Struct {
    pub name: String,
    pub is_union: bool,
    pub base: Option<String>,
    pub fields: Vec<Field>,
}

/// Storage size class of an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnumWidth {
    Byte,
    Short,
    Int,
    Long,
}

impl EnumWidth {
    pub fn from_bits(bits: u64) -> Self {
        match bits {
            8 => EnumWidth::Byte,
            16 => EnumWidth::Short,
            64 => EnumWidth::Long,
            _ => EnumWidth::Int,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumItem {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enum {
    pub name: String,
    pub underlying: Option<EnumWidth>,
    pub items: Vec<EnumItem>,
}

/// A typed constant from an initialized variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constant {
    pub name: String,
    pub type_name: String,
    pub value: String,
}

/// A GUID constant (`DEFINE_GUID`-style variable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuidConstant {
    pub name: String,
    pub guid: Guid,
}

/// A `#define` collected from preprocessor output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Define {
    pub name: String,
    pub value: String,
}
