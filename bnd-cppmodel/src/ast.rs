//! AST document: loads the CastXML/GCC-XML output into an indexed node arena.
//!
//! Every top-level element is indexed by its `id` and by its declaring `file`.
//! After loading, each element that names a lexical `context` is moved under
//! that context node, so a class owns its fields and methods as children.

use std::collections::HashMap;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use tracing::debug;

use crate::error::{ParseError, Result};

/// Handle of a node inside an [`AstIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(usize);

/// The element kinds of the CastXML schema this crate understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Namespace,
    Typedef,
    FundamentalType,
    PointerType,
    ArrayType,
    ReferenceType,
    CvQualifiedType,
    FunctionType,
    Function,
    Method,
    Argument,
    Class,
    Struct,
    Union,
    Enumeration,
    EnumValue,
    Field,
    Variable,
    File,
    /// Any other element (constructors, operators, `Ellipsis`, ...).
    Other(String),
}

impl NodeKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Namespace" => NodeKind::Namespace,
            "Typedef" => NodeKind::Typedef,
            "FundamentalType" => NodeKind::FundamentalType,
            "PointerType" => NodeKind::PointerType,
            "ArrayType" => NodeKind::ArrayType,
            "ReferenceType" => NodeKind::ReferenceType,
            "CvQualifiedType" => NodeKind::CvQualifiedType,
            "FunctionType" => NodeKind::FunctionType,
            "Function" => NodeKind::Function,
            "Method" => NodeKind::Method,
            "Argument" => NodeKind::Argument,
            "Class" => NodeKind::Class,
            "Struct" => NodeKind::Struct,
            "Union" => NodeKind::Union,
            "Enumeration" => NodeKind::Enumeration,
            "EnumValue" => NodeKind::EnumValue,
            "Field" => NodeKind::Field,
            "Variable" => NodeKind::Variable,
            "File" => NodeKind::File,
            other => NodeKind::Other(other.to_string()),
        }
    }

    /// The XML tag name for this kind.
    pub fn tag(&self) -> &str {
        match self {
            NodeKind::Namespace => "Namespace",
            NodeKind::Typedef => "Typedef",
            NodeKind::FundamentalType => "FundamentalType",
            NodeKind::PointerType => "PointerType",
            NodeKind::ArrayType => "ArrayType",
            NodeKind::ReferenceType => "ReferenceType",
            NodeKind::CvQualifiedType => "CvQualifiedType",
            NodeKind::FunctionType => "FunctionType",
            NodeKind::Function => "Function",
            NodeKind::Method => "Method",
            NodeKind::Argument => "Argument",
            NodeKind::Class => "Class",
            NodeKind::Struct => "Struct",
            NodeKind::Union => "Union",
            NodeKind::Enumeration => "Enumeration",
            NodeKind::EnumValue => "EnumValue",
            NodeKind::Field => "Field",
            NodeKind::Variable => "Variable",
            NodeKind::File => "File",
            NodeKind::Other(tag) => tag,
        }
    }
}

/// One element of the document.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    attrs: Vec<(String, String)>,
    children: Vec<NodeRef>,
    parent: Option<NodeRef>,
}

impl Node {
    fn new(kind: NodeKind, attrs: Vec<(String, String)>) -> Self {
        Self {
            kind,
            attrs,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// True when the attribute is present, whatever its value.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == name)
    }

    /// True when the attribute is present and not blank.
    pub fn flag(&self, name: &str) -> bool {
        self.attr(name).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn id(&self) -> &str {
        self.attr("id").unwrap_or_default()
    }

    /// The declared name, or `""` for anonymous elements.
    pub fn name(&self) -> &str {
        self.attr("name").unwrap_or_default()
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }

    /// The lexical parent after context reparenting.
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    /// Returns a required attribute or a [`ParseError::MissingAttribute`].
    pub fn required(&self, attr: &'static str) -> Result<&str> {
        self.attr(attr).ok_or_else(|| ParseError::MissingAttribute {
            attr,
            id: self.id().to_string(),
        })
    }
}

/// The indexed document: id → node, file → nodes, and the scoped tree.
#[derive(Debug)]
pub struct AstIndex {
    root_tag: String,
    root_attrs: Vec<(String, String)>,
    nodes: Vec<Node>,
    roots: Vec<NodeRef>,
    by_id: HashMap<String, NodeRef>,
    by_file: IndexMap<String, Vec<NodeRef>>,
}

impl AstIndex {
    /// Load a document and build the id/file indices and the context tree.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut index = Self::load(xml)?;
        index.reparent()?;
        debug!(
            nodes = index.by_id.len(),
            files = index.by_file.len(),
            "indexed AST document"
        );
        Ok(index)
    }

    fn load(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut index = AstIndex {
            root_tag: String::new(),
            root_attrs: Vec::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
            by_id: HashMap::new(),
            by_file: IndexMap::new(),
        };
        let mut open: Vec<NodeRef> = Vec::new();
        let mut in_root = false;

        loop {
            let event = reader.read_event().map_err(|e| {
                ParseError::Xml(format!("at byte {}: {e}", reader.buffer_position()))
            })?;
            match event {
                Event::Start(e) | Event::Empty(e) if !in_root => {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    if tag != "GCC_XML" && tag != "CastXML" {
                        return Err(ParseError::Xml(format!("unexpected root element <{tag}>")));
                    }
                    index.root_attrs = read_attributes(&e)?;
                    index.root_tag = tag;
                    in_root = true;
                }
                Event::Start(e) => {
                    let node = index.add_element(&e, open.last().copied())?;
                    open.push(node);
                }
                Event::Empty(e) => {
                    index.add_element(&e, open.last().copied())?;
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !in_root {
            return Err(ParseError::Xml("document has no root element".to_string()));
        }
        Ok(index)
    }

    fn add_element(&mut self, e: &BytesStart<'_>, owner: Option<NodeRef>) -> Result<NodeRef> {
        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let node = Node::new(NodeKind::from_tag(&tag), read_attributes(e)?);
        let handle = NodeRef(self.nodes.len());

        match owner {
            // Nested elements such as `Argument` or `EnumValue` stay with their owner.
            Some(owner) => {
                self.nodes.push(node);
                self.nodes[handle.0].parent = Some(owner);
                self.nodes[owner.0].children.push(handle);
            }
            None => {
                let id = node.required("id")?.to_string();
                if let Some(file) = node.attr("file") {
                    self.by_file.entry(file.to_string()).or_default().push(handle);
                }
                if self.by_id.insert(id.clone(), handle).is_some() {
                    return Err(ParseError::Xml(format!("duplicate element id {id}")));
                }
                self.nodes.push(node);
                self.roots.push(handle);
            }
        }
        Ok(handle)
    }

    /// Move every element carrying a `context` under the element it names.
    fn reparent(&mut self) -> Result<()> {
        let mut remaining = Vec::with_capacity(self.roots.len());
        for handle in std::mem::take(&mut self.roots) {
            let context = match self.nodes[handle.0].attr("context") {
                Some(ctx) => ctx.to_string(),
                None => {
                    remaining.push(handle);
                    continue;
                }
            };
            let parent = self.lookup(&context)?;
            self.nodes[handle.0].parent = Some(parent);
            self.nodes[parent.0].children.push(handle);
        }
        self.roots = remaining;
        Ok(())
    }

    pub fn node(&self, handle: NodeRef) -> &Node {
        &self.nodes[handle.0]
    }

    pub fn node_mut(&mut self, handle: NodeRef) -> &mut Node {
        &mut self.nodes[handle.0]
    }

    /// Resolve an element id. Every reference in a well-formed document resolves.
    pub fn lookup(&self, id: &str) -> Result<NodeRef> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| ParseError::UnknownId(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<&Node> {
        self.lookup(id).map(|h| self.node(h))
    }

    /// Top-level elements of the given kind, in document order.
    pub fn elements_of(&self, kind: NodeKind) -> Vec<NodeRef> {
        let mut found: Vec<NodeRef> = self
            .by_id
            .values()
            .copied()
            .filter(|h| self.nodes[h.0].kind == kind)
            .collect();
        found.sort();
        found
    }

    /// File ids in first-seen order, each with its declarations in file order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &[NodeRef])> {
        self.by_file.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// The header-unit id of a `File` element: its file name without
    /// directory and extension.
    pub fn include_id(&self, file_id: &str) -> Result<String> {
        Ok(file_stem(self.get(file_id)?.name()).to_string())
    }

    /// Re-serialize the (reparented, renamed) document for diagnostics.
    pub fn to_xml(&self) -> anyhow::Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", None, None)))?;

        let mut root = BytesStart::new(self.root_tag.as_str());
        for (k, v) in &self.root_attrs {
            root.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Start(root))?;
        for &handle in &self.roots {
            self.write_node(&mut writer, handle)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.root_tag.as_str())))?;

        Ok(String::from_utf8(writer.into_inner())?)
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, handle: NodeRef) -> anyhow::Result<()> {
        let node = self.node(handle);
        let mut start = BytesStart::new(node.kind.tag());
        for (k, v) in &node.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        if node.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for &child in &node.children {
            self.write_node(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(node.kind.tag())))?;
        Ok(())
    }
}

/// File name without directory and extension. Both separators are accepted
/// since the headers are usually Windows paths.
pub fn file_stem(path: &str) -> &str {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| ParseError::Xml(err.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}
