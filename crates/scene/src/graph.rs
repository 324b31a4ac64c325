use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Mat4;
use serde::{Deserialize, Serialize};
use tessera_common::{HideFlags, Layers, ObjectId, Transform};

use crate::component::{Component, ComponentType, UpdateContext};
use crate::components::TransformComponent;
use crate::error::SceneError;
use crate::reflect::{PropertyMap, TypeRegistry, Value};

pub type NodeId = ObjectId;
pub type ComponentId = ObjectId;

/// Ties an instantiated object back to the template object it was cloned
/// from. `origin` is the template object's uuid inside the prefab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefabLink {
    pub prefab: ObjectId,
    pub origin: ObjectId,
}

/// Per-node data stored in the graph.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) is_static: bool,
    pub(crate) layers: Layers,
    pub(crate) hide_flags: HideFlags,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) components: Vec<ComponentId>,
    /// Set on a prefab template root and on every instance root.
    pub(crate) prefab: Option<ObjectId>,
    pub(crate) link: Option<PrefabLink>,
}

impl NodeData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            is_static: false,
            layers: Layers::default(),
            hide_flags: HideFlags::default(),
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            prefab: None,
            link: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn layers(&self) -> Layers {
        self.layers
    }

    pub fn hide_flags(&self) -> HideFlags {
        self.hide_flags
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn prefab(&self) -> Option<ObjectId> {
        self.prefab
    }

    pub fn link(&self) -> Option<PrefabLink> {
        self.link
    }
}

#[derive(Debug)]
pub(crate) struct ComponentSlot {
    pub(crate) node: NodeId,
    pub(crate) link: Option<PrefabLink>,
    pub(crate) data: Box<dyn Component>,
}

/// Event record produced by every structural mutation of the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    NodeCreated { id: NodeId, parent: NodeId },
    NodeRemoved { id: NodeId },
    Reparented {
        id: NodeId,
        old: Option<NodeId>,
        new: NodeId,
    },
    /// Emitted once per node whose enabled-in-hierarchy state flipped.
    HierarchyEnabledChanged { id: NodeId, enabled: bool },
    ComponentAdded {
        id: ComponentId,
        node: NodeId,
        type_name: &'static str,
    },
    ComponentRemoved {
        id: ComponentId,
        node: NodeId,
        type_name: &'static str,
    },
}

/// Node/component tree. The graph exclusively owns every node and
/// component; everything else refers to them by id.
///
/// Uses BTreeMap for deterministic iteration order. Child and component
/// order is the order of the owning vectors.
#[derive(Debug)]
pub struct SceneGraph {
    registry: Arc<TypeRegistry>,
    root: NodeId,
    pub(crate) nodes: BTreeMap<NodeId, NodeData>,
    pub(crate) components: BTreeMap<ComponentId, ComponentSlot>,
    events: Vec<SceneEvent>,
}

impl SceneGraph {
    /// Create a graph holding only its root node.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let root = ObjectId::new();
        let mut nodes = BTreeMap::new();
        nodes.insert(root, NodeData::new("Root"));
        Self {
            registry,
            root,
            nodes,
            components: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_component(&self, id: ComponentId) -> bool {
        self.components.contains_key(&id)
    }

    /// Whether any object (node or component) carries this uuid.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.contains_node(id) || self.contains_component(id)
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &NodeData)> {
        self.nodes.iter()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    // --- Structure ---

    /// Create an empty node under `parent` (the root when `None`).
    pub fn create_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SceneError> {
        let parent = parent.unwrap_or(self.root);
        if !self.nodes.contains_key(&parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        let id = ObjectId::new();
        self.insert_node(id, NodeData::new(name), parent, None);
        Ok(id)
    }

    /// Insert a fully built node. The caller guarantees `parent` exists.
    pub(crate) fn insert_node(
        &mut self,
        id: NodeId,
        mut data: NodeData,
        parent: NodeId,
        position: Option<usize>,
    ) {
        data.parent = Some(parent);
        data.children.clear();
        data.components.clear();
        if let Some(p) = self.nodes.get_mut(&parent) {
            let at = position.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(at, id);
        }
        self.nodes.insert(id, data);
        self.events.push(SceneEvent::NodeCreated { id, parent });
    }

    /// Move `node` under `new_parent` (the root when `None`) at `position`
    /// (appended when `None`). Detaching and attaching happen in one step.
    ///
    /// Re-parenting under the current parent is a no-op unless `force` is
    /// set, in which case the node is moved to `position`.
    pub fn set_parent(
        &mut self,
        node: NodeId,
        new_parent: Option<NodeId>,
        position: Option<usize>,
        force: bool,
    ) -> Result<(), SceneError> {
        if node == self.root {
            return Err(SceneError::RootImmutable);
        }
        let new_parent = new_parent.unwrap_or(self.root);
        let old_parent = self
            .nodes
            .get(&node)
            .ok_or(SceneError::NodeNotFound(node))?
            .parent;
        if !self.nodes.contains_key(&new_parent) {
            return Err(SceneError::NodeNotFound(new_parent));
        }
        if self.is_in_hierarchy(new_parent, node) {
            return Err(SceneError::CyclicParent {
                node,
                parent: new_parent,
            });
        }
        if old_parent == Some(new_parent) && !force {
            return Ok(());
        }

        let subtree = self.descendants(node);
        let before = self.effective_states(&subtree);

        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            old.children.retain(|c| *c != node);
        }
        if let Some(p) = self.nodes.get_mut(&new_parent) {
            let at = position.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(at, node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(new_parent);
        }
        self.events.push(SceneEvent::Reparented {
            id: node,
            old: old_parent,
            new: new_parent,
        });

        self.apply_enabled_transitions(&subtree, &before);
        Ok(())
    }

    /// Delete a node together with its subtree and every component on it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootImmutable);
        }
        let parent = self
            .nodes
            .get(&id)
            .ok_or(SceneError::NodeNotFound(id))?
            .parent;
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.retain(|c| *c != id);
        }
        for node in self.descendants(id) {
            if let Some(data) = self.nodes.remove(&node) {
                for component in data.components {
                    if let Some(slot) = self.components.remove(&component) {
                        self.events.push(SceneEvent::ComponentRemoved {
                            id: component,
                            node,
                            type_name: slot.data.type_name(),
                        });
                    }
                }
                self.events.push(SceneEvent::NodeRemoved { id: node });
            }
        }
        Ok(())
    }

    /// `node` and every node below it, depth-first pre-order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            let Some(data) = self.nodes.get(&n) else {
                continue;
            };
            out.push(n);
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    /// True when `ancestor` is `node` itself or one of its ancestors.
    pub fn is_in_hierarchy(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Owning node of `id`, whether it names a node or a component.
    pub fn find_by_uuid(&self, id: ObjectId) -> Option<NodeId> {
        if self.nodes.contains_key(&id) {
            return Some(id);
        }
        self.component_node(id)
    }

    /// First node in `root`'s subtree linked to the template object `origin`.
    pub fn find_by_origin(&self, root: NodeId, origin: ObjectId) -> Option<NodeId> {
        self.descendants(root).into_iter().find(|n| {
            self.nodes
                .get(n)
                .and_then(|d| d.link)
                .is_some_and(|l| l.origin == origin)
        })
    }

    // --- Node attributes ---

    pub fn set_name(&mut self, node: NodeId, name: impl Into<String>) -> Result<(), SceneError> {
        self.node_mut(node)?.name = name.into();
        Ok(())
    }

    pub fn set_static(&mut self, node: NodeId, flag: bool) -> Result<(), SceneError> {
        self.node_mut(node)?.is_static = flag;
        Ok(())
    }

    pub fn set_layers(&mut self, node: NodeId, layers: Layers) -> Result<(), SceneError> {
        self.node_mut(node)?.layers = layers;
        Ok(())
    }

    pub fn set_hide_flags(&mut self, node: NodeId, flags: HideFlags) -> Result<(), SceneError> {
        self.node_mut(node)?.hide_flags = flags;
        Ok(())
    }

    /// Mark `node` as the root of `prefab` (template or instance).
    pub fn set_prefab(&mut self, node: NodeId, prefab: Option<ObjectId>) -> Result<(), SceneError> {
        self.node_mut(node)?.prefab = prefab;
        Ok(())
    }

    pub(crate) fn set_link(&mut self, node: NodeId, link: Option<PrefabLink>) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.link = link;
        }
    }

    /// Whether the node was instantiated from a prefab.
    pub fn is_instance(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.link.is_some())
    }

    pub fn is_enabled(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.enabled)
    }

    /// True only if the node and every ancestor up to the root are enabled.
    pub fn is_enabled_in_hierarchy(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            match self.nodes.get(&n) {
                Some(data) if data.enabled => current = data.parent,
                _ => return false,
            }
        }
        true
    }

    /// Toggle a node. Every node of the subtree whose effective state flips
    /// gets exactly one `HierarchyEnabledChanged` event.
    pub fn set_enabled(&mut self, node: NodeId, enabled: bool) -> Result<(), SceneError> {
        if self.node_mut(node)?.enabled == enabled {
            return Ok(());
        }
        let subtree = self.descendants(node);
        let before = self.effective_states(&subtree);
        self.node_mut(node)?.enabled = enabled;
        self.apply_enabled_transitions(&subtree, &before);
        Ok(())
    }

    fn effective_states(&self, nodes: &[NodeId]) -> Vec<bool> {
        nodes
            .iter()
            .map(|n| self.is_enabled_in_hierarchy(*n))
            .collect()
    }

    fn apply_enabled_transitions(&mut self, nodes: &[NodeId], before: &[bool]) {
        for (node, was) in nodes.iter().zip(before) {
            let now = self.is_enabled_in_hierarchy(*node);
            if now == *was {
                continue;
            }
            self.events.push(SceneEvent::HierarchyEnabledChanged {
                id: *node,
                enabled: now,
            });
            let components = self
                .nodes
                .get(node)
                .map(|n| n.components.clone())
                .unwrap_or_default();
            for c in components {
                if let Some(slot) = self.components.get_mut(&c) {
                    slot.data.on_hierarchy_enabled(now);
                }
            }
        }
    }

    /// Generic node attributes as stored in documents.
    pub fn node_properties(&self, node: NodeId) -> PropertyMap {
        let mut props = PropertyMap::new();
        if let Some(n) = self.nodes.get(&node) {
            props.insert("name".into(), Value::String(n.name.clone()));
            props.insert("enabled".into(), Value::Bool(n.enabled));
            props.insert("static".into(), Value::Bool(n.is_static));
            props.insert("layers".into(), Value::Int(i64::from(n.layers.bits())));
            props.insert("hideFlags".into(), Value::Int(i64::from(n.hide_flags.bits())));
        }
        props
    }

    /// Apply document attributes, touching only values that differ.
    /// Returns true when anything changed.
    pub fn apply_node_properties(&mut self, node: NodeId, props: &PropertyMap) -> bool {
        let Some(current) = self.nodes.get(&node).cloned() else {
            return false;
        };
        let mut changed = false;
        if let Some(name) = props.get("name").and_then(Value::as_str) {
            if current.name != name {
                let _ = self.set_name(node, name);
                changed = true;
            }
        }
        if let Some(flag) = props.get("static").and_then(Value::as_bool) {
            if current.is_static != flag {
                let _ = self.set_static(node, flag);
                changed = true;
            }
        }
        if let Some(bits) = props.get("layers").and_then(Value::as_int) {
            let layers = Layers::from_bits_truncate(bits as u32);
            if current.layers != layers {
                let _ = self.set_layers(node, layers);
                changed = true;
            }
        }
        if let Some(bits) = props.get("hideFlags").and_then(Value::as_int) {
            let flags = HideFlags::from_bits_truncate(bits as u32);
            if current.hide_flags != flags {
                let _ = self.set_hide_flags(node, flags);
                changed = true;
            }
        }
        if let Some(flag) = props.get("enabled").and_then(Value::as_bool) {
            if current.enabled != flag {
                let _ = self.set_enabled(node, flag);
                changed = true;
            }
        }
        changed
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeData, SceneError> {
        self.nodes.get_mut(&node).ok_or(SceneError::NodeNotFound(node))
    }

    // --- Components ---

    /// Instantiate a registered component type by name and attach it.
    ///
    /// Fails with `UnknownType` before touching the graph. A node carries
    /// at most one `Transform`; asking for another returns the existing one.
    pub fn add_component(
        &mut self,
        node: NodeId,
        type_name: &str,
    ) -> Result<ComponentId, SceneError> {
        if !self.nodes.contains_key(&node) {
            return Err(SceneError::NodeNotFound(node));
        }
        if type_name == TransformComponent::TYPE_NAME {
            if let Some(existing) = self.component(node, type_name) {
                return Ok(existing);
            }
        }
        let data = self.registry.create(type_name)?;
        Ok(self.attach_boxed(node, data))
    }

    /// Attach an already constructed component.
    pub fn attach<T: Component>(
        &mut self,
        node: NodeId,
        component: T,
    ) -> Result<ComponentId, SceneError> {
        if !self.nodes.contains_key(&node) {
            return Err(SceneError::NodeNotFound(node));
        }
        Ok(self.attach_boxed(node, Box::new(component)))
    }

    /// Attach a component restored from elsewhere (a template, a
    /// document) under its prefab link. The attach hook is not run.
    pub fn attach_linked(
        &mut self,
        node: NodeId,
        data: Box<dyn Component>,
        link: Option<PrefabLink>,
    ) -> Result<ComponentId, SceneError> {
        if !self.nodes.contains_key(&node) {
            return Err(SceneError::NodeNotFound(node));
        }
        let id = ObjectId::new();
        self.insert_component(id, node, data, link);
        Ok(id)
    }

    fn attach_boxed(&mut self, node: NodeId, mut data: Box<dyn Component>) -> ComponentId {
        data.on_attached();
        let id = ObjectId::new();
        self.insert_component(id, node, data, None);
        id
    }

    /// Insert a component under a known id. The caller guarantees `node`
    /// exists.
    pub(crate) fn insert_component(
        &mut self,
        id: ComponentId,
        node: NodeId,
        data: Box<dyn Component>,
        link: Option<PrefabLink>,
    ) {
        let type_name = data.type_name();
        if let Some(n) = self.nodes.get_mut(&node) {
            n.components.push(id);
        }
        self.components.insert(id, ComponentSlot { node, link, data });
        self.events.push(SceneEvent::ComponentAdded {
            id,
            node,
            type_name,
        });
    }

    /// Detach and return a component. Anything still referring to it
    /// resolves to nothing from now on.
    pub fn remove_component(&mut self, id: ComponentId) -> Option<Box<dyn Component>> {
        let slot = self.components.remove(&id)?;
        if let Some(n) = self.nodes.get_mut(&slot.node) {
            n.components.retain(|c| *c != id);
        }
        self.events.push(SceneEvent::ComponentRemoved {
            id,
            node: slot.node,
            type_name: slot.data.type_name(),
        });
        Some(slot.data)
    }

    pub fn node_components(&self, node: NodeId) -> &[ComponentId] {
        self.nodes
            .get(&node)
            .map(|n| n.components.as_slice())
            .unwrap_or(&[])
    }

    /// First component of `type_name` on `node`.
    pub fn component(&self, node: NodeId, type_name: &str) -> Option<ComponentId> {
        self.node_components(node).iter().copied().find(|c| {
            self.components
                .get(c)
                .is_some_and(|s| s.data.type_name() == type_name)
        })
    }

    /// First component of `type_name` on `node` or anywhere below it.
    pub fn component_in_child(&self, node: NodeId, type_name: &str) -> Option<ComponentId> {
        self.descendants(node)
            .into_iter()
            .find_map(|n| self.component(n, type_name))
    }

    pub fn component_node(&self, id: ComponentId) -> Option<NodeId> {
        self.components.get(&id).map(|s| s.node)
    }

    pub fn component_link(&self, id: ComponentId) -> Option<PrefabLink> {
        self.components.get(&id).and_then(|s| s.link)
    }

    pub fn get_dyn(&self, id: ComponentId) -> Option<&dyn Component> {
        self.components.get(&id).map(|s| s.data.as_ref())
    }

    pub fn get_dyn_mut(&mut self, id: ComponentId) -> Option<&mut dyn Component> {
        self.components.get_mut(&id).map(|s| s.data.as_mut())
    }

    pub fn get<T: Component>(&self, id: ComponentId) -> Option<&T> {
        self.get_dyn(id).and_then(|c| c.downcast_ref::<T>())
    }

    pub fn get_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut T> {
        self.get_dyn_mut(id).and_then(|c| c.downcast_mut::<T>())
    }

    /// Iterate every component with its owning node, in id order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, NodeId, &dyn Component)> {
        self.components
            .iter()
            .map(|(id, slot)| (*id, slot.node, slot.data.as_ref()))
    }

    pub fn property(&self, component: ComponentId, name: &str) -> Option<Value> {
        let data = self.get_dyn(component)?;
        self.registry
            .properties(data.type_name())
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.get(data))
    }

    pub fn set_property(&mut self, component: ComponentId, name: &str, value: &Value) -> bool {
        let registry = Arc::clone(&self.registry);
        let Some(data) = self.get_dyn_mut(component) else {
            return false;
        };
        registry
            .properties(data.type_name())
            .iter()
            .find(|p| p.name == name)
            .is_some_and(|p| p.set(data, value))
    }

    pub fn component_properties(&self, component: ComponentId) -> PropertyMap {
        self.get_dyn(component)
            .map(|c| self.registry.read_all(c))
            .unwrap_or_default()
    }

    // --- Transforms ---

    /// The node's transform component, created on first access.
    pub fn transform(&mut self, node: NodeId) -> Result<ComponentId, SceneError> {
        if let Some(existing) = self.component(node, TransformComponent::TYPE_NAME) {
            return Ok(existing);
        }
        self.attach(node, TransformComponent::default())
    }

    /// Transform of the parent node of the component's owner.
    pub fn parent_transform(&self, component: ComponentId) -> Option<ComponentId> {
        let node = self.component_node(component)?;
        let parent = self.parent(node)?;
        self.component(parent, TransformComponent::TYPE_NAME)
    }

    /// Local transform; identity when the node has no transform component.
    pub fn local_transform(&self, node: NodeId) -> Transform {
        self.component(node, TransformComponent::TYPE_NAME)
            .and_then(|c| self.get::<TransformComponent>(c))
            .map(|t| t.local)
            .unwrap_or_default()
    }

    pub fn set_local_transform(&mut self, node: NodeId, local: Transform) -> Result<(), SceneError> {
        let id = self.transform(node)?;
        if let Some(t) = self.get_mut::<TransformComponent>(id) {
            t.local = local;
        }
        Ok(())
    }

    /// Model matrix composed from the root down to `node`.
    pub fn world_matrix(&self, node: NodeId) -> Mat4 {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            chain.push(n);
            current = self.parent(n);
        }
        chain
            .iter()
            .rev()
            .fold(Mat4::IDENTITY, |acc, n| acc * self.local_transform(*n).to_matrix())
    }

    // --- Frame update ---

    /// Run every updatable component on enabled-in-hierarchy nodes.
    pub fn update(&mut self, dt: f32) {
        let targets: Vec<(ComponentId, NodeId)> = self
            .components
            .iter()
            .filter(|(_, s)| s.data.is_updatable())
            .map(|(id, s)| (*id, s.node))
            .filter(|(_, node)| self.is_enabled_in_hierarchy(*node))
            .collect();
        for (id, node) in targets {
            let local = self.local_transform(node);
            let mut ctx = UpdateContext {
                dt,
                transform: local,
            };
            if let Some(slot) = self.components.get_mut(&id) {
                slot.data.update(&mut ctx);
            }
            if ctx.transform != local {
                let _ = self.set_local_transform(node, ctx.transform);
            }
        }
    }
}
