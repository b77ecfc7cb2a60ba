//! Type resolution. Walks typedef/pointer/array/reference/cv chains down to a
//! fundamental or user type.

use std::collections::HashSet;

use tracing::error;

use crate::ast::{AstIndex, Node, NodeKind};
use crate::error::{ParseError, Result};
use crate::model::TypeRef;

/// Name given to every function type reached through a type chain.
pub const FUNCTION_POINTER_TYPE: &str = "__function__stdcall";

/// Resolves type ids against an index, stopping at bound typedefs.
pub struct TypeResolver<'a> {
    index: &'a AstIndex,
    bound_types: &'a HashSet<String>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(index: &'a AstIndex, bound_types: &'a HashSet<String>) -> Self {
        Self { index, bound_types }
    }

    /// Resolve `type_id` and record name and decorations into `ty`.
    pub fn resolve_into(&self, type_id: &str, ty: &mut TypeRef) -> Result<()> {
        let mut node = self.index.get(type_id)?;
        loop {
            match &node.kind {
                NodeKind::FundamentalType => {
                    ty.name = canonical_fundamental(node.name());
                    return Ok(());
                }
                NodeKind::Class | NodeKind::Struct | NodeKind::Union | NodeKind::Enumeration => {
                    ty.name = node.name().to_string();
                    return Ok(());
                }
                NodeKind::Typedef => {
                    if self.bound_types.contains(node.name()) {
                        ty.name = node.name().to_string();
                        return Ok(());
                    }
                }
                NodeKind::PointerType => ty.pointer.push('*'),
                NodeKind::ArrayType => ty.array_dims.push(array_extent(node)?),
                NodeKind::ReferenceType => ty.is_reference = true,
                NodeKind::CvQualifiedType => ty.is_const = true,
                NodeKind::FunctionType => {
                    ty.name = FUNCTION_POINTER_TYPE.to_string();
                    return Ok(());
                }
                other => return Err(unexpected(other, node)),
            }
            node = self.next(node)?;
        }
    }

    /// Resolve `type_id` to its terminal name only, ignoring decorations.
    pub fn resolve_name(&self, type_id: &str) -> Result<String> {
        let mut node = self.index.get(type_id)?;
        loop {
            match &node.kind {
                NodeKind::FundamentalType => return Ok(canonical_fundamental(node.name())),
                NodeKind::Class | NodeKind::Struct | NodeKind::Union | NodeKind::Enumeration => {
                    return Ok(node.name().to_string());
                }
                NodeKind::Typedef if self.bound_types.contains(node.name()) => {
                    return Ok(node.name().to_string());
                }
                NodeKind::Typedef
                | NodeKind::PointerType
                | NodeKind::ArrayType
                | NodeKind::ReferenceType
                | NodeKind::CvQualifiedType => {}
                NodeKind::FunctionType => return Ok(FUNCTION_POINTER_TYPE.to_string()),
                other => return Err(unexpected(other, node)),
            }
            node = self.next(node)?;
        }
    }

    fn next(&self, node: &Node) -> Result<&'a Node> {
        self.index.get(node.required("type")?)
    }
}

fn unexpected(kind: &NodeKind, node: &Node) -> ParseError {
    ParseError::UnexpectedKind {
        kind: kind.tag().to_string(),
        id: node.id().to_string(),
    }
}

/// Extent of one array dimension: the `max` index plus one.
fn array_extent(node: &Node) -> Result<u32> {
    let max = node.required("max")?;
    max.trim_end_matches(['u', 'U'])
        .parse::<u32>()
        .ok()
        .and_then(|m| m.checked_add(1))
        .ok_or_else(|| ParseError::InvalidNumber {
            attr: "max",
            value: max.to_string(),
            id: node.id().to_string(),
        })
}

/// Shorten a fundamental type spelling (`"long unsigned int"`) to its
/// canonical form (`"unsigned long"`).
///
/// | input                    | output               |
/// |--------------------------|----------------------|
/// | `short unsigned int`     | `unsigned short`     |
/// | `long long unsigned int` | `unsigned long long` |
/// | `long int`               | `long`               |
/// | `long double`            | `long double`        |
/// | `signed char`            | `char`               |
pub fn canonical_fundamental(type_name: &str) -> String {
    let mut is_unsigned = false;
    let mut base = "";
    let mut short_count = 0;
    let mut long_count = 0;

    for token in type_name.split(' ') {
        match token {
            "unsigned" => is_unsigned = true,
            "signed" => base = "int",
            "long" => long_count += 1,
            "short" => short_count += 1,
            "bool" | "void" | "char" | "double" | "int" | "float" | "wchar_t" => base = token,
            other => {
                error!(token = %other, type_name = %type_name, "unhandled fundamental type token");
            }
        }
    }

    if long_count == 1 {
        base = if base == "double" { "long double" } else { "long" };
    }
    if long_count == 2 {
        base = "long long";
    }
    if short_count == 1 {
        base = "short";
    }
    if is_unsigned {
        format!("unsigned {base}")
    } else {
        base.to_string()
    }
}
