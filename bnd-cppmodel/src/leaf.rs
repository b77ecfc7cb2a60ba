//! Enums, functions and initialized variables.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{trace, warn};
use uguid::Guid;

use crate::annotation;
use crate::ast::{NodeKind, NodeRef};
use crate::builder::ModelBuilder;
use crate::error::Result;
use crate::model::{
    Callable, Constant, Decl, Enum, EnumItem, EnumWidth, GuidConstant, ParamAttribute, Parameter,
    TypeRef,
};

/// Suffix the extension-header generator appends to enum item names.
pub const EXT_ENUM_ITEM_SUFFIX: &str = "__ext_enumitem__";
/// Suffix the extension-header generator appends to variable names.
pub const EXT_VARIABLE_SUFFIX: &str = "__ext_var__";

/// Variables of this type are GUID constants.
const GUID_TYPE: &str = "GUID";

/// `((TYPE)value)` → `value`, as CastXML prints casted initializers.
static CAST_INIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?:\(.+\))?(.+)\)").expect("valid cast regex"));

/// `1.F` is not a valid literal in most target languages.
static BARE_FLOAT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.F").expect("valid float regex"));

impl ModelBuilder<'_> {
    pub(crate) fn build_enum(&mut self, handle: NodeRef) -> Result<Enum> {
        let node = self.index.node(handle);

        let mut name = node.name().to_string();
        if name.is_empty() || name.starts_with('$') {
            let include = self.index.include_id(node.required("file")?)?;
            let counter = self
                .anonymous_enums
                .entry(include.to_ascii_lowercase())
                .or_insert(0);
            name = format!("{}_ENUM_{}", include.to_uppercase(), counter);
            *counter += 1;
        }

        let items = node
            .children()
            .iter()
            .map(|&c| self.index.node(c))
            .filter(|item| item.kind == NodeKind::EnumValue)
            .map(|item| EnumItem {
                name: strip_suffix(item.name(), EXT_ENUM_ITEM_SUFFIX).to_string(),
                value: item.attr("init").map(str::to_string),
            })
            .collect();

        let underlying = node
            .attr("size")
            .and_then(|s| s.parse::<u64>().ok())
            .map(EnumWidth::from_bits);

        Ok(Enum {
            name,
            underlying,
            items,
        })
    }

    /// Build a function or method signature.
    pub(crate) fn build_callable(&self, handle: NodeRef) -> Result<Callable> {
        let node = self.index.node(handle);
        let calling_convention =
            annotation::decode(node.attr("attributes")).and_then(|a| a.calling_convention);

        let mut params = Vec::new();
        for &child in node.children() {
            let arg = self.index.node(child);
            if arg.kind != NodeKind::Argument {
                continue;
            }
            let name = match arg.name() {
                "" => format!("arg{}", params.len()),
                n => n.to_string(),
            };
            let attribute = annotation::decode(arg.attr("attributes"))
                .map(|a| a.param)
                .unwrap_or(ParamAttribute::empty());
            let mut ty = TypeRef::default();
            self.resolver.resolve_into(arg.required("type")?, &mut ty)?;
            trace!(callable = %node.name(), param = %name, ty = ?ty, "  parameter");
            params.push(Parameter {
                name,
                ty,
                attribute,
            });
        }

        let mut return_value = TypeRef::default();
        self.resolver
            .resolve_into(node.required("returns")?, &mut return_value)?;

        Ok(Callable {
            name: node.name().to_string(),
            calling_convention,
            params,
            return_value,
        })
    }

    /// Build a constant or GUID from an initialized variable. Returns `None`
    /// for a GUID whose initializer cannot be parsed.
    pub(crate) fn build_variable(&self, handle: NodeRef) -> Result<Option<Decl>> {
        let node = self.index.node(handle);
        let name = strip_suffix(node.name(), EXT_VARIABLE_SUFFIX).to_string();
        let type_name = self.resolver.resolve_name(node.required("type")?)?;
        let init = node.attr("init").unwrap_or_default();

        if type_name == GUID_TYPE {
            return Ok(match parse_guid_literal(init) {
                Some(guid) => Some(Decl::Guid(GuidConstant { name, guid })),
                None => {
                    warn!(name = %name, init = %init, "GUID initializer not recognized");
                    None
                }
            });
        }

        Ok(Some(Decl::Constant(Constant {
            name,
            type_name,
            value: clean_initializer(init),
        })))
    }
}

fn strip_suffix<'s>(name: &'s str, suffix: &str) -> &'s str {
    name.strip_suffix(suffix).unwrap_or(name)
}

/// Drop one cast from an initializer and fix bare float suffixes.
pub fn clean_initializer(init: &str) -> String {
    let value = match CAST_INIT.captures(init).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => init,
    };
    BARE_FLOAT_SUFFIX.replace_all(value, ".0F").into_owned()
}

/// Parse a GUID initializer such as
/// `{-1135593225ul, 9184u, 18784u, {150u, 218u, 51u, 171u, 175u, 89u, 53u, 236u}}`.
///
/// Returns `None` unless the text is brace-delimited and holds exactly
/// eleven integer fields.
pub fn parse_guid_literal(text: &str) -> Option<Guid> {
    let text = text.trim();
    if !text.starts_with('{') || !text.ends_with('}') {
        return None;
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | 'u' | 'U' | 'l' | 'L' | ' '))
        .collect();
    let values = cleaned
        .split(',')
        .map(|field| field.parse::<i64>().ok())
        .collect::<Option<Vec<i64>>>()?;
    if values.len() != 11 {
        return None;
    }

    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&(values[0] as i32).to_le_bytes());
    bytes[4..6].copy_from_slice(&(values[1] as i16).to_le_bytes());
    bytes[6..8].copy_from_slice(&(values[2] as i16).to_le_bytes());
    for (dst, &v) in bytes[8..].iter_mut().zip(&values[3..]) {
        *dst = v as u8;
    }
    Some(Guid::from_bytes(bytes))
}
