//! Deep copy of node subtrees, within one graph or across graphs.
//!
//! Phase one walks the source subtree and snapshots every node and
//! component under a fresh id, recording `old -> new`. Phase two inserts
//! the copies into the destination and rewrites `Ref` properties through
//! that table.

use std::collections::HashMap;

use tessera_common::ObjectId;

use crate::component::Component;
use crate::error::SceneError;
use crate::graph::{ComponentId, NodeData, NodeId, PrefabLink, SceneGraph};
use crate::reflect::Value;

/// How prefab links are assigned to the copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Cloning a template root links every copy to its template object,
    /// including a root that is itself an instance of another prefab.
    /// Cloning anything else carries the existing links over.
    #[default]
    Auto,
    /// Link every copy to `prefab`, using the source ids as origins. The
    /// copied root is not marked as an instance root.
    Prefab(ObjectId),
}

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub link: LinkMode,
    /// Destination parent; the destination root when `None`.
    pub parent: Option<NodeId>,
    /// Position among the parent's children; appended when `None`.
    pub position: Option<usize>,
    /// Extra `old -> new` entries for references leaving the cloned set.
    pub external: HashMap<ObjectId, ObjectId>,
}

#[derive(Debug, Clone)]
pub struct CloneOutcome {
    pub root: NodeId,
    /// Source id to copy id, for every node and component cloned.
    pub remap: HashMap<ObjectId, ObjectId>,
}

struct PlannedNode {
    new: NodeId,
    parent_old: Option<NodeId>,
    data: NodeData,
}

struct PlannedComponent {
    new: ComponentId,
    node_new: NodeId,
    link: Option<PrefabLink>,
    data: Box<dyn Component>,
}

pub(crate) struct ClonePlan {
    root_old: NodeId,
    nodes: Vec<PlannedNode>,
    components: Vec<PlannedComponent>,
    remap: HashMap<ObjectId, ObjectId>,
}

impl ClonePlan {
    pub(crate) fn build(
        src: &SceneGraph,
        source: NodeId,
        mode: LinkMode,
    ) -> Result<Self, SceneError> {
        let root_data = src.node(source).ok_or(SceneError::NodeNotFound(source))?;

        // Which prefab, if any, the copies get freshly linked to.
        let fresh_prefab = match mode {
            LinkMode::Prefab(prefab) => Some(prefab),
            // An instance root links to the prefab it is marked with.
            LinkMode::Auto => root_data
                .prefab
                .filter(|p| root_data.link.map(|l| l.prefab) != Some(*p)),
        };
        let link_for = |old: ObjectId, existing: Option<PrefabLink>| match fresh_prefab {
            Some(prefab) => Some(PrefabLink {
                prefab,
                origin: old,
            }),
            None => existing,
        };

        let mut plan = ClonePlan {
            root_old: source,
            nodes: Vec::new(),
            components: Vec::new(),
            remap: HashMap::new(),
        };

        for old in src.descendants(source) {
            let Some(data) = src.node(old) else {
                continue;
            };
            let new = ObjectId::new();
            plan.remap.insert(old, new);

            let mut copy = data.clone();
            copy.link = link_for(old, data.link);
            if old == source && mode == LinkMode::Auto {
                if let Some(prefab) = fresh_prefab {
                    copy.prefab = Some(prefab);
                }
            }
            plan.nodes.push(PlannedNode {
                new,
                parent_old: if old == source { None } else { data.parent },
                data: copy,
            });

            for component in data.components() {
                let Some(slot) = src.components.get(component) else {
                    continue;
                };
                let new_component = ObjectId::new();
                plan.remap.insert(*component, new_component);
                plan.components.push(PlannedComponent {
                    new: new_component,
                    node_new: new,
                    link: link_for(*component, slot.link),
                    data: slot.data.clone_box(),
                });
            }
        }
        Ok(plan)
    }

    pub(crate) fn apply(
        self,
        dst: &mut SceneGraph,
        parent: Option<NodeId>,
        position: Option<usize>,
        external: &HashMap<ObjectId, ObjectId>,
    ) -> Result<CloneOutcome, SceneError> {
        let parent = parent.unwrap_or(dst.root());
        if !dst.contains_node(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }

        let mut root = parent;
        for node in self.nodes {
            match node.parent_old.and_then(|p| self.remap.get(&p)) {
                Some(new_parent) => dst.insert_node(node.new, node.data, *new_parent, None),
                None => {
                    root = node.new;
                    dst.insert_node(node.new, node.data, parent, position);
                }
            }
        }

        let registry = dst.registry().clone();
        for mut component in self.components {
            for descriptor in registry.properties(component.data.type_name()) {
                if !Value::kind_holds_refs(descriptor.kind) {
                    continue;
                }
                let Some(value) = descriptor.get(component.data.as_ref()) else {
                    continue;
                };
                let remapped = value.map_refs(&|id| {
                    self.remap
                        .get(&id)
                        .or_else(|| external.get(&id))
                        .copied()
                        .or_else(|| dst.contains(id).then_some(id))
                });
                if remapped != value {
                    descriptor.set(component.data.as_mut(), &remapped);
                }
            }
            dst.insert_component(component.new, component.node_new, component.data, component.link);
        }

        tracing::debug!(
            source = %self.root_old.short(),
            copy = %root.short(),
            objects = self.remap.len(),
            "cloned subtree"
        );
        Ok(CloneOutcome {
            root,
            remap: self.remap,
        })
    }
}

impl SceneGraph {
    /// Deep copy `node` under `parent` (the root when `None`) inside this
    /// graph. References inside the copied subtree point at the copies.
    pub fn clone_node(&mut self, node: NodeId, parent: Option<NodeId>) -> Result<NodeId, SceneError> {
        let plan = ClonePlan::build(self, node, LinkMode::Auto)?;
        Ok(plan.apply(self, parent, None, &HashMap::new())?.root)
    }

    /// Deep copy `node` of another graph into this one.
    pub fn clone_from(
        &mut self,
        src: &SceneGraph,
        node: NodeId,
        options: CloneOptions,
    ) -> Result<CloneOutcome, SceneError> {
        let plan = ClonePlan::build(src, node, options.link)?;
        plan.apply(self, options.parent, options.position, &options.external)
    }
}
