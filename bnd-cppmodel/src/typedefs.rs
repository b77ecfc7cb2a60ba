//! Typedef name normalization.
//!
//! Windows-style headers declare aggregates as `typedef struct tagFOO { .. } FOO;`
//! or `typedef struct _FOO { .. } FOO;`, and anonymous aggregates only get a
//! name through their typedef. The typedef name is the one bindings should
//! use, so it replaces the tag name on the aggregate itself.

use tracing::trace;

use crate::ast::{AstIndex, NodeKind};
use crate::error::Result;

/// Prefix of the conventional `tagFOO` aggregate tag.
const TAG_PREFIX: &str = "tag";

/// Rename anonymous or mangled struct/union/enum tags after the typedef that
/// aliases them. Must run before any type resolution.
///
/// When several typedefs alias the same tag, the last one in document order
/// wins.
pub fn normalize_tag_names(index: &mut AstIndex) -> Result<()> {
    // Eligibility is decided on the names as declared, before any renaming.
    let mut renames = Vec::new();
    for typedef in index.elements_of(NodeKind::Typedef) {
        let node = index.node(typedef);
        let target = index.lookup(node.required("type")?)?;

        let tag = index.node(target);
        if !matches!(
            tag.kind,
            NodeKind::Struct | NodeKind::Union | NodeKind::Enumeration
        ) {
            continue;
        }
        let tag_name = tag.name();
        if tag_name.is_empty() || tag_name.starts_with('_') || tag_name.starts_with(TAG_PREFIX) {
            renames.push((target, node.name().to_string()));
        }
    }

    for (target, alias) in renames {
        trace!(from = %index.node(target).name(), to = %alias, "renaming aggregate after typedef");
        index.node_mut(target).set_attr("name", &alias);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_prefixed_struct_takes_typedef_name() {
        let doc = r#"<GCC_XML>
  <Struct id="_1" name="tagFOO"/>
  <Typedef id="_2" name="FOO_T" type="_1"/>
  <Struct id="_3" name="Plain"/>
  <Typedef id="_4" name="PLAIN_ALIAS" type="_3"/>
  <Union id="_5"/>
  <Typedef id="_6" name="ANON_U" type="_5"/>
  <Enumeration id="_7" name="_KIND"/>
  <Typedef id="_8" name="KIND" type="_7"/>
</GCC_XML>"#;
        let mut index = AstIndex::from_xml(doc).unwrap();
        normalize_tag_names(&mut index).unwrap();

        assert_eq!(index.get("_1").unwrap().name(), "FOO_T");
        assert_eq!(index.get("_3").unwrap().name(), "Plain");
        assert_eq!(index.get("_5").unwrap().name(), "ANON_U");
        assert_eq!(index.get("_7").unwrap().name(), "KIND");
    }

    #[test]
    fn last_typedef_wins() {
        let doc = r#"<GCC_XML>
  <Struct id="_1" name="_S"/>
  <Typedef id="_2" name="FIRST" type="_1"/>
  <Typedef id="_3" name="SECOND" type="_1"/>
</GCC_XML>"#;
        let mut index = AstIndex::from_xml(doc).unwrap();
        normalize_tag_names(&mut index).unwrap();
        assert_eq!(index.get("_1").unwrap().name(), "SECOND");
    }
}
