//! Struct and union building.

use std::rc::Rc;

use tracing::trace;

use crate::ast::{Node, NodeKind, NodeRef};
use crate::builder::{ModelBuilder, base_ids};
use crate::error::{ParseError, Result};
use crate::model::{Decl, Field, Struct, TypeRef};

impl ModelBuilder<'_> {
    /// Build a struct or union, once per element.
    ///
    /// `parent` is the name of the enclosing aggregate for nested declarations;
    /// `inner_index` numbers the nested aggregates of that parent.
    pub(crate) fn build_struct(
        &mut self,
        handle: NodeRef,
        parent: Option<&str>,
        inner_index: u32,
    ) -> Result<Rc<Struct>> {
        if let Some(built) = self.structs.get(&handle) {
            return Ok(Rc::clone(built));
        }

        // Named nested aggregates wait here until the outermost one succeeds.
        let mark = self.pending_siblings.len();
        self.enter(handle)?;
        let result = self.build_struct_body(handle, parent, inner_index);
        self.leave(handle);

        let built = match result {
            Ok(built) => Rc::new(built),
            Err(e) => {
                self.pending_siblings.truncate(mark);
                return Err(e);
            }
        };
        self.structs.insert(handle, Rc::clone(&built));
        if parent.is_none() {
            let siblings: Vec<Decl> = self.pending_siblings.drain(mark..).collect();
            for sibling in siblings {
                self.register_in_current_include(sibling);
            }
        }
        Ok(built)
    }

    fn build_struct_body(
        &mut self,
        handle: NodeRef,
        parent: Option<&str>,
        inner_index: u32,
    ) -> Result<Struct> {
        let index = self.index;
        let node = index.node(handle);
        let name = struct_name(node.name(), parent, inner_index);
        let is_union = node.kind == NodeKind::Union;
        let base = self.struct_direct_base(node)?;

        let mut fields = Vec::new();
        let mut field_offset = 0u32;
        let mut inner_count = 0u32;

        for &child in node.children() {
            let field_node = index.node(child);
            if field_node.kind != NodeKind::Field {
                continue;
            }

            let mut field = self.build_field(field_node, field_offset)?;
            let mut keep = true;

            let type_handle = index.lookup(field_node.required("type")?)?;
            let type_node = index.node(type_handle);
            if is_aggregate(type_node) && type_node.attr("context") == Some(node.id()) {
                let nested = self.build_struct(type_handle, Some(&name), inner_count)?;
                inner_count += 1;

                if field_node.name().is_empty() {
                    // Anonymous member: its fields belong to this aggregate.
                    let mut last_offset = field_offset;
                    for sub in &nested.fields {
                        let mut sub = sub.clone();
                        sub.offset += field_offset;
                        last_offset = sub.offset;
                        fields.push(sub);
                    }
                    if !is_union {
                        field_offset = last_offset;
                    }
                    keep = false;
                } else {
                    field.ty.name = nested.name.clone();
                    self.pending_siblings.push(Decl::Struct(Rc::clone(&nested)));
                }
            }

            let mut advance = !is_union;
            if keep {
                // A bitfield holds the slot for whatever field comes next.
                if field.is_bitfield {
                    advance = false;
                }
                trace!(parent = %name, field = %field.name, offset = field.offset, "  field");
                fields.push(field);
            }
            if advance {
                field_offset += 1;
            }
        }

        Ok(Struct {
            name,
            is_union,
            base,
            fields,
        })
    }

    /// The recorded base is the last listed base that has no base of its own.
    fn struct_direct_base(&mut self, node: &Node) -> Result<Option<String>> {
        let mut base_name = None;
        for base_id in base_ids(node) {
            let base = self.build_struct(self.index.lookup(base_id)?, None, 0)?;
            if base.base.is_none() {
                base_name = Some(base.name.clone());
            }
        }
        Ok(base_name)
    }

    fn build_field(&self, node: &Node, offset: u32) -> Result<Field> {
        let name = match node.name() {
            "" => format!("field{offset}"),
            n => n.to_string(),
        };

        let (is_bitfield, bit_offset) = match node.attr("bits") {
            Some(bits) if is_bitfield(node) => {
                let width = bits.parse::<u32>().map_err(|_| ParseError::InvalidNumber {
                    attr: "bits",
                    value: bits.to_string(),
                    id: node.id().to_string(),
                })?;
                (true, width)
            }
            _ => (false, 0),
        };

        let mut ty = TypeRef::default();
        self.resolver.resolve_into(node.required("type")?, &mut ty)?;

        Ok(Field {
            name,
            ty,
            offset,
            is_bitfield,
            bit_offset,
        })
    }
}

fn is_bitfield(node: &Node) -> bool {
    node.attr("bits").is_some_and(|bits| !bits.is_empty())
}

fn is_aggregate(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Struct | NodeKind::Union | NodeKind::Class
    )
}

fn struct_name(declared: &str, parent: Option<&str>, inner_index: u32) -> String {
    match parent {
        None => declared.to_string(),
        Some(parent) if declared.is_empty() => format!("{parent}_INNER_{inner_index}"),
        Some(parent) => format!("{parent}_{declared}_INNER"),
    }
}
