//! Module assembly: walks the declarations of every in-scope header unit and
//! dispatches each one to the matching builder.
//!
//! [`ModelBuilder`] owns all per-parse state: the struct and interface caches,
//! the in-progress set used for cycle detection, and the anonymous-enum
//! counters. A fresh builder is created for every document.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::ast::{AstIndex, Node, NodeKind, NodeRef};
use crate::config::{Attachment, Scope};
use crate::error::{ParseError, Result};
use crate::model::{Decl, Interface, Module, Struct};
use crate::resolve::TypeResolver;

/// Prefix of compiler builtins CastXML reports as ordinary functions.
const BUILTIN_PREFIX: &str = "__builtin";

/// Build the declaration model of an indexed (and name-normalized) document
/// into `module`.
pub fn build_module(index: &AstIndex, scope: &Scope, module: Module) -> Result<Module> {
    let mut builder = ModelBuilder::new(index, scope, module);
    builder.build_all()?;
    Ok(builder.into_module())
}

/// Per-parse builder state.
pub struct ModelBuilder<'a> {
    pub(crate) index: &'a AstIndex,
    pub(crate) scope: &'a Scope,
    pub(crate) resolver: TypeResolver<'a>,
    pub(crate) module: Module,
    current_include: Option<usize>,
    pub(crate) structs: HashMap<NodeRef, Rc<Struct>>,
    pub(crate) interfaces: HashMap<NodeRef, Rc<Interface>>,
    in_progress: HashSet<NodeRef>,
    pub(crate) pending_siblings: Vec<Decl>,
    pub(crate) anonymous_enums: HashMap<String, u32>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(index: &'a AstIndex, scope: &'a Scope, module: Module) -> Self {
        Self {
            index,
            scope,
            resolver: TypeResolver::new(index, &scope.bound_types),
            module,
            current_include: None,
            structs: HashMap::new(),
            interfaces: HashMap::new(),
            in_progress: HashSet::new(),
            pending_siblings: Vec::new(),
            anonymous_enums: HashMap::new(),
        }
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    /// Build the struct or union with the given element id (memoized).
    pub fn struct_for(&mut self, id: &str) -> Result<Rc<Struct>> {
        let handle = self.index.lookup(id)?;
        self.build_struct(handle, None, 0)
    }

    /// Build the interface with the given element id (memoized).
    pub fn interface_for(&mut self, id: &str) -> Result<Rc<Interface>> {
        let handle = self.index.lookup(id)?;
        self.build_interface(handle)
    }

    /// Process every file of the document, one header unit at a time.
    pub fn build_all(&mut self) -> Result<()> {
        let index = self.index;
        let scope = self.scope;

        for (file_id, decls) in index.files() {
            let include_id = index.include_id(file_id)?;

            if !scope.is_processed(&include_id) {
                debug!(include = %include_id, "include not processed, skipping");
                continue;
            }
            let Some(attachment) = scope.attachment(&include_id) else {
                debug!(include = %include_id, "include not attached, skipping");
                continue;
            };

            let slot = self.module.include_index(&include_id);
            self.current_include = Some(slot);
            let before = self.module.includes[slot].decls.len();

            for &handle in decls {
                let node = index.node(handle);
                if !self.is_top_level(node) || node.has_attr("incomplete") {
                    continue;
                }
                let name = node.name();
                if let Attachment::Partial(types) = attachment
                    && !types.contains(name)
                {
                    debug!(
                        include = %include_id,
                        name = %name,
                        "declaration not attached, skipping"
                    );
                    continue;
                }
                if name.starts_with(BUILTIN_PREFIX) {
                    continue;
                }

                match self.build_element(handle) {
                    Ok(Some(decl)) => {
                        debug!(
                            include = %include_id,
                            name = %decl.name(),
                            kind = node.kind.tag(),
                            "extracted declaration"
                        );
                        self.module.includes[slot].add(decl);
                    }
                    Ok(None) => {}
                    Err(e) if !e.is_fatal() => {
                        warn!(include = %include_id, name = %name, err = %e, "skipping declaration");
                    }
                    Err(e) => return Err(e),
                }
            }

            info!(
                include = %include_id,
                decls = self.module.includes[slot].decls.len() - before,
                "include processed"
            );
        }

        self.current_include = None;
        Ok(())
    }

    /// Declarations whose lexical parent is a namespace. Anything else is a
    /// nested type and is reached through its enclosing aggregate instead.
    fn is_top_level(&self, node: &Node) -> bool {
        node.parent()
            .is_some_and(|p| self.index.node(p).kind == NodeKind::Namespace)
    }

    fn build_element(&mut self, handle: NodeRef) -> Result<Option<Decl>> {
        let index = self.index;
        let node = index.node(handle);
        let decl = match node.kind {
            NodeKind::Enumeration => Some(Decl::Enum(self.build_enum(handle)?)),
            NodeKind::Function if !node.has_attr("inline") => {
                Some(Decl::Function(self.build_callable(handle)?))
            }
            NodeKind::Class | NodeKind::Struct if node.has_attr("abstract") => {
                Some(Decl::Interface(self.build_interface(handle)?))
            }
            NodeKind::Class | NodeKind::Struct | NodeKind::Union => {
                Some(Decl::Struct(self.build_struct(handle, None, 0)?))
            }
            NodeKind::Variable if node.has_attr("init") => self.build_variable(handle)?,
            _ => None,
        };
        Ok(decl)
    }

    /// Add a declaration to the include currently being processed.
    pub(crate) fn register_in_current_include(&mut self, decl: Decl) {
        if let Some(slot) = self.current_include {
            self.module.includes[slot].add(decl);
        }
    }

    /// Whether a type will be represented in the bindings: declared in a
    /// processed include, or bound by name.
    pub(crate) fn is_type_bound(&self, node: &Node) -> Result<bool> {
        if let Some(file) = node.attr("file")
            && self.scope.is_processed(&self.index.include_id(file)?)
        {
            return Ok(true);
        }
        Ok(self.scope.bound_types.contains(node.name()))
    }

    /// Mark a node as being built; fails if it already is.
    pub(crate) fn enter(&mut self, handle: NodeRef) -> Result<()> {
        if !self.in_progress.insert(handle) {
            let node = self.index.node(handle);
            return Err(ParseError::CyclicReference {
                id: node.id().to_string(),
                name: node.name().to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self, handle: NodeRef) {
        self.in_progress.remove(&handle);
    }
}

/// Ids listed in a space-separated `bases` attribute.
pub(crate) fn base_ids(node: &Node) -> impl Iterator<Item = &str> {
    node.attr("bases")
        .unwrap_or_default()
        .split(' ')
        .filter(|id| !id.is_empty())
}
