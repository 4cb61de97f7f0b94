//! Per-call reference tables backing `$id`/`$ref` preservation
//!
//! Both tables live for a single top-level serialize or deserialize call and are
//! discarded on completion. Identity is the arena index ([`NodeId`]), never value
//! equality.

use std::collections::HashMap;

use crate::graph::{Graph, Node, NodeId};

use super::SerError;

/// Serialize-side table: node identity to emitted id
#[derive(Debug, Default)]
pub(crate) struct SerRefs {
    ids: HashMap<NodeId, String>,
    next_id: u64,
}

impl SerRefs {
    pub(crate) fn new() -> Self {
        SerRefs::default()
    }

    /// Id the node was already emitted under, if any
    pub(crate) fn get(&self, node: NodeId) -> Option<&str> {
        self.ids.get(&node).map(String::as_str)
    }

    /// Assigns the next fresh id to the node
    pub(crate) fn assign(&mut self, node: NodeId) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.ids.insert(node, id.clone());
        id
    }
}

/// A slot of a container node which still points at a placeholder
#[derive(Debug)]
pub(crate) enum Slot {
    Member(String),
    Item(usize),
}

#[derive(Debug)]
pub(crate) struct Fixup {
    pub(crate) container: NodeId,
    pub(crate) slot: Slot,
    pub(crate) id: String,
    pub(crate) path: String,
}

/// Deserialize-side table: parsed id to constructed node, plus pending forward references
#[derive(Debug, Default)]
pub(crate) struct DeRefs {
    nodes: HashMap<String, NodeId>,
    fixups: Vec<Fixup>,
}

impl DeRefs {
    pub(crate) fn new() -> Self {
        DeRefs::default()
    }

    /// Registers a constructed node under its parsed id
    ///
    /// Must be called before the node's members are populated so that
    /// self-referential graphs resolve.
    pub(crate) fn register(&mut self, id: String, node: NodeId) {
        self.nodes.insert(id, node);
    }

    pub(crate) fn resolve(&self, id: &str) -> Option<NodeId> {
        self.nodes.get(id).copied()
    }

    /// Records a forward reference to be patched once the referent exists
    pub(crate) fn add_fixup(&mut self, fixup: Fixup) {
        self.fixups.push(fixup);
    }

    /// Patches all forward references
    ///
    /// Fails with [`SerError::UnresolvedReference`] for ids which were never defined
    /// in this call.
    pub(crate) fn apply(self, graph: &mut Graph) -> Result<(), SerError> {
        for fixup in self.fixups {
            let target = match self.nodes.get(&fixup.id) {
                Some(&target) => target,
                None => {
                    return Err(SerError::UnresolvedReference {
                        id: fixup.id,
                        path: fixup.path,
                    });
                }
            };
            match (&fixup.slot, graph.node_mut(fixup.container)) {
                (Slot::Member(name), Node::Object { members, .. }) => {
                    members.insert(name.clone(), target);
                }
                (Slot::Item(index), Node::Array(items)) => {
                    items[*index] = target;
                }
                _ => unreachable!("fixup container changed its shape"),
            }
        }
        Ok(())
    }
}
