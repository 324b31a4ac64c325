//! Structured document form of a node subtree.
//!
//! A document is a flat, depth-first list of records
//! `[type, uuid, parent, properties, extra]`. Nodes use the `Node` type
//! name; components carry their owning node's uuid in the parent slot.

use std::cell::Cell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tessera_common::{HideFlags, Layers, ObjectId};

use crate::error::SceneError;
use crate::graph::{NodeData, NodeId, PrefabLink, SceneGraph};
use crate::reflect::{PropertyMap, Value};

/// Version stamped on every document written by this crate.
pub const DOCUMENT_VERSION: u32 = 4;

/// Record type name used for nodes.
pub const NODE_RECORD: &str = "Node";

const EXTRA_PREFAB: &str = "prefab";
const EXTRA_LINK_PREFAB: &str = "linkPrefab";
const EXTRA_LINK_ORIGIN: &str = "linkOrigin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub objects: Vec<ObjectRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            objects: Vec::new(),
        }
    }
}

impl Document {
    /// First record; the subtree root for documents produced by
    /// [`SceneGraph::to_document`].
    pub fn root_record(&self) -> Option<&ObjectRecord> {
        self.objects.first()
    }

    /// Store `resource` in the root record's parent slot, marking the
    /// document as the template of that prefab resource.
    pub fn inject_resource(&mut self, resource: ObjectId) -> bool {
        match self.objects.first_mut() {
            Some(root) => {
                root.parent = Some(resource);
                true
            }
            None => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.objects.iter().filter(|r| r.is_node()).count()
    }

    pub fn component_count(&self) -> usize {
        self.objects.len() - self.node_count()
    }
}

/// One node or component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordRepr", into = "RecordRepr")]
pub struct ObjectRecord {
    pub type_name: String,
    pub uuid: ObjectId,
    pub parent: Option<ObjectId>,
    pub properties: PropertyMap,
    pub extra: PropertyMap,
}

impl ObjectRecord {
    pub fn is_node(&self) -> bool {
        self.type_name == NODE_RECORD
    }

    fn link(&self) -> Option<PrefabLink> {
        let prefab = self.extra.get(EXTRA_LINK_PREFAB).and_then(Value::as_resource)?;
        let origin = self.extra.get(EXTRA_LINK_ORIGIN).and_then(Value::as_resource)?;
        Some(PrefabLink { prefab, origin })
    }
}

/// Positional wire form.
#[derive(Serialize, Deserialize)]
struct RecordRepr(String, ObjectId, Option<ObjectId>, PropertyMap, PropertyMap);

impl From<RecordRepr> for ObjectRecord {
    fn from(r: RecordRepr) -> Self {
        Self {
            type_name: r.0,
            uuid: r.1,
            parent: r.2,
            properties: r.3,
            extra: r.4,
        }
    }
}

impl From<ObjectRecord> for RecordRepr {
    fn from(r: ObjectRecord) -> Self {
        RecordRepr(r.type_name, r.uuid, r.parent, r.properties, r.extra)
    }
}

fn link_extra(extra: &mut PropertyMap, link: Option<PrefabLink>) {
    if let Some(link) = link {
        extra.insert(EXTRA_LINK_PREFAB.into(), Value::Resource(Some(link.prefab)));
        extra.insert(EXTRA_LINK_ORIGIN.into(), Value::Resource(Some(link.origin)));
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Reuse record uuids when they are free in the destination graph.
    pub keep_ids: bool,
    /// Parent for the document's root records; the graph root when `None`.
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    /// Nodes attached directly under the load parent, in document order.
    pub roots: Vec<NodeId>,
    /// Record uuid to live object id.
    pub remap: HashMap<ObjectId, ObjectId>,
    /// Records dropped because their type or owner was unknown.
    pub skipped: usize,
    /// References nulled because their target could not be found.
    pub unresolved: usize,
}

impl SceneGraph {
    /// Serialize `node` and its subtree, depth-first.
    pub fn to_document(&self, node: NodeId) -> Result<Document, SceneError> {
        if !self.contains_node(node) {
            return Err(SceneError::NodeNotFound(node));
        }
        let mut doc = Document::default();
        for id in self.descendants(node) {
            let Some(data) = self.node(id) else {
                continue;
            };
            let mut extra = PropertyMap::new();
            if let Some(prefab) = data.prefab() {
                extra.insert(EXTRA_PREFAB.into(), Value::Resource(Some(prefab)));
            }
            link_extra(&mut extra, data.link());
            doc.objects.push(ObjectRecord {
                type_name: NODE_RECORD.to_string(),
                uuid: id,
                parent: if id == node { None } else { data.parent() },
                properties: self.node_properties(id),
                extra,
            });

            for component in data.components() {
                let Some(c) = self.get_dyn(*component) else {
                    continue;
                };
                let mut extra = PropertyMap::new();
                link_extra(&mut extra, self.component_link(*component));
                doc.objects.push(ObjectRecord {
                    type_name: c.type_name().to_string(),
                    uuid: *component,
                    parent: Some(id),
                    properties: self.registry().read_all(c),
                    extra,
                });
            }
        }
        Ok(doc)
    }

    /// Build the objects of `doc` into this graph.
    ///
    /// Unknown record types are skipped. A reference leaving the document
    /// is kept when its target exists in this graph and nulled otherwise.
    /// Component attach hooks are not run.
    pub fn instantiate_document(
        &mut self,
        doc: &Document,
        options: &LoadOptions,
    ) -> Result<LoadOutcome, SceneError> {
        let load_parent = options.parent.unwrap_or(self.root());
        if !self.contains_node(load_parent) {
            return Err(SceneError::NodeNotFound(load_parent));
        }
        let mut out = LoadOutcome::default();
        let mut pending = Vec::new();

        for record in &doc.objects {
            let id = if options.keep_ids
                && !self.contains(record.uuid)
                && !out.remap.contains_key(&record.uuid)
            {
                record.uuid
            } else {
                ObjectId::new()
            };
            let owner = record.parent.and_then(|p| out.remap.get(&p).copied());

            if record.is_node() {
                let parent = match owner.filter(|p| self.contains_node(*p)) {
                    Some(p) => p,
                    None => {
                        out.roots.push(id);
                        load_parent
                    }
                };
                self.insert_node(id, node_data(record), parent, None);
                out.remap.insert(record.uuid, id);
                continue;
            }

            let Some(node) = owner.filter(|p| self.contains_node(*p)) else {
                tracing::warn!(
                    type_name = %record.type_name,
                    uuid = %record.uuid,
                    "component record without owning node, skipped"
                );
                out.skipped += 1;
                continue;
            };
            let mut component = match self.registry().create(&record.type_name) {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(uuid = %record.uuid, %err, "record skipped");
                    out.skipped += 1;
                    continue;
                }
            };
            self.registry().write_all(component.as_mut(), &record.properties);
            self.insert_component(id, node, component, record.link());
            out.remap.insert(record.uuid, id);
            pending.push((id, record));
        }

        // Second pass: references can now resolve against everything loaded.
        let unresolved = Cell::new(0usize);
        let registry = self.registry().clone();
        for (id, record) in pending {
            let Some(type_name) = self.get_dyn(id).map(|c| c.type_name()) else {
                continue;
            };
            for descriptor in registry.properties(type_name) {
                if !Value::kind_holds_refs(descriptor.kind) {
                    continue;
                }
                let Some(value) = record.properties.get(descriptor.name) else {
                    continue;
                };
                let resolved = value.map_refs(&|target| {
                    if let Some(new) = out.remap.get(&target) {
                        return Some(*new);
                    }
                    if self.contains(target) {
                        return Some(target);
                    }
                    tracing::warn!(
                        property = descriptor.name,
                        %target,
                        "unresolved reference dropped"
                    );
                    unresolved.set(unresolved.get() + 1);
                    None
                });
                if let Some(component) = self.get_dyn_mut(id) {
                    descriptor.set(component, &resolved);
                }
            }
        }
        out.unresolved = unresolved.get();

        tracing::debug!(
            objects = out.remap.len(),
            skipped = out.skipped,
            unresolved = out.unresolved,
            "document instantiated"
        );
        Ok(out)
    }
}

fn node_data(record: &ObjectRecord) -> NodeData {
    let props = &record.properties;
    let mut data = NodeData::new(props.get("name").and_then(Value::as_str).unwrap_or_default());
    if let Some(v) = props.get("enabled").and_then(Value::as_bool) {
        data.enabled = v;
    }
    if let Some(v) = props.get("static").and_then(Value::as_bool) {
        data.is_static = v;
    }
    if let Some(v) = props.get("layers").and_then(Value::as_int) {
        data.layers = Layers::from_bits_truncate(v as u32);
    }
    if let Some(v) = props.get("hideFlags").and_then(Value::as_int) {
        data.hide_flags = HideFlags::from_bits_truncate(v as u32);
    }
    data.prefab = record.extra.get(EXTRA_PREFAB).and_then(Value::as_resource);
    data.link = record.link();
    data
}
