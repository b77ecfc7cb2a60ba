//! COM interface building and vtable slot assignment.

use std::rc::Rc;

use tracing::{trace, warn};
use uguid::Guid;

use crate::annotation;
use crate::ast::{NodeKind, NodeRef};
use crate::builder::{ModelBuilder, base_ids};
use crate::error::Result;
use crate::model::{Interface, Method};

impl ModelBuilder<'_> {
    /// Build an interface, once per element.
    pub(crate) fn build_interface(&mut self, handle: NodeRef) -> Result<Rc<Interface>> {
        if let Some(built) = self.interfaces.get(&handle) {
            return Ok(Rc::clone(built));
        }

        self.enter(handle)?;
        let result = self.build_interface_body(handle);
        self.leave(handle);

        let built = Rc::new(result?);
        self.interfaces.insert(handle, Rc::clone(&built));
        Ok(built)
    }

    fn build_interface_body(&mut self, handle: NodeRef) -> Result<Interface> {
        let index = self.index;
        let node = index.node(handle);
        let name = node.name().to_string();

        // Slots of every base come first.
        let mut slot = 0u32;
        let mut base = None;
        for base_id in base_ids(node) {
            let base_handle = index.lookup(base_id)?;
            let parent = self.build_interface(base_handle)?;
            if base.is_none() && self.is_type_bound(index.node(base_handle))? {
                base = Some(parent.name.clone());
            }
            slot += parent.total_method_count;
        }

        let uuid = annotation::decode(node.attr("attributes")).and_then(|a| a.guid);
        let guid = uuid.as_deref().and_then(|g| match g.parse::<Guid>() {
            Ok(guid) => Some(guid),
            Err(_) => {
                warn!(interface = %name, uuid = %g, "interface uuid is not a GUID");
                None
            }
        });

        let first_slot = slot;
        let mut methods = Vec::new();
        for &child in node.children() {
            let method = index.node(child);
            // Only new pure virtuals open a slot; overrides reuse the parent's.
            if method.kind != NodeKind::Method
                || !method.flag("pure_virtual")
                || method.flag("overrides")
            {
                continue;
            }
            let callable = self.build_callable(child)?;
            trace!(interface = %name, method = %callable.name, offset = slot, "  method");
            methods.push(Method {
                callable,
                offset: slot,
                abi_offset: slot,
            });
            slot += 1;
        }

        assign_abi_offsets(&mut methods, first_slot);

        Ok(Interface {
            name,
            base,
            uuid,
            guid,
            methods,
            total_method_count: slot,
        })
    }
}

fn assign_abi_offsets(methods: &mut [Method], first_slot: u32) {
    let names: Vec<&str> = methods.iter().map(|m| m.name()).collect();
    let order = abi_slot_order(&names);
    for (slot, i) in (first_slot..).zip(order) {
        methods[i].abi_offset = slot;
    }
}

/// Method indices in the order MSVC lays them out in the vtable.
///
/// MSVC does not follow declaration order for overloads: it groups every
/// overload of a name at the position of the first one, newest declaration
/// first. CastXML reports declaration order, so the layout is recomputed here.
pub fn abi_slot_order(names: &[&str]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..names.len()).collect();
    let mut i = 0;
    while i < order.len() {
        let name = names[order[i]];
        let mut j = i + 1;
        while j < order.len() {
            if names[order[j]] == name {
                let overload = order.remove(j);
                let mut k = i;
                while k > 0 && names[order[k - 1]] == name {
                    k -= 1;
                }
                order.insert(k, overload);
                i += 1;
            }
            j += 1;
        }
        i += 1;
    }
    order
}
