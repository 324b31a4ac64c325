use std::collections::BTreeSet;
use std::sync::Arc;

use tessera_common::ObjectId;
use tessera_scene::{Document, LoadOptions, NodeId, SceneError, SceneGraph, TypeRegistry};

#[derive(Debug, thiserror::Error)]
pub enum PrefabError {
    #[error("prefab {0} is not loaded")]
    ResourceMissing(ObjectId),
    #[error("prefab {0} is still loading")]
    NotReady(ObjectId),
    #[error("document has no root node")]
    EmptyDocument,
    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefabState {
    Loading,
    Ready,
}

/// A template tree living in its own graph.
#[derive(Debug)]
pub struct Prefab {
    id: ObjectId,
    state: PrefabState,
    pinned: bool,
    template: SceneGraph,
    root: NodeId,
    /// Template object ids as of the last time the prefab became ready.
    known: BTreeSet<ObjectId>,
}

impl Prefab {
    pub(crate) fn from_document(
        id: ObjectId,
        registry: Arc<TypeRegistry>,
        doc: &Document,
    ) -> Result<Self, PrefabError> {
        let (template, root) = build_template(id, registry, doc)?;
        let mut prefab = Self {
            id,
            state: PrefabState::Ready,
            pinned: false,
            template,
            root,
            known: BTreeSet::new(),
        };
        prefab.known = prefab.template_ids();
        Ok(prefab)
    }

    /// Replace the template with the contents of `doc`. Object ids of the
    /// document are kept so links from existing instances stay valid.
    pub(crate) fn rebuild(&mut self, doc: &Document) -> Result<(), PrefabError> {
        let (template, root) = build_template(self.id, self.template.registry().clone(), doc)?;
        self.template = template;
        self.root = root;
        Ok(())
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn state(&self) -> PrefabState {
        self.state
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn template(&self) -> &SceneGraph {
        &self.template
    }

    pub(crate) fn template_mut(&mut self) -> &mut SceneGraph {
        &mut self.template
    }

    /// Root node of the template inside [`Prefab::template`].
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn known(&self) -> &BTreeSet<ObjectId> {
        &self.known
    }

    /// Document form with the prefab id injected as the root's parent.
    pub fn to_document(&self) -> Result<Document, PrefabError> {
        let mut doc = self.template.to_document(self.root)?;
        doc.inject_resource(self.id);
        Ok(doc)
    }

    pub(crate) fn set_loading(&mut self) {
        self.state = PrefabState::Loading;
        self.pinned = true;
    }

    pub(crate) fn set_ready(&mut self) {
        self.known = self.template_ids();
        self.state = PrefabState::Ready;
        self.pinned = false;
    }

    /// Every node and component id currently in the template tree.
    pub(crate) fn template_ids(&self) -> BTreeSet<ObjectId> {
        let mut ids = BTreeSet::new();
        for node in self.template.descendants(self.root) {
            ids.insert(node);
            ids.extend(self.template.node_components(node).iter().copied());
        }
        ids
    }
}

fn build_template(
    id: ObjectId,
    registry: Arc<TypeRegistry>,
    doc: &Document,
) -> Result<(SceneGraph, NodeId), PrefabError> {
    let mut template = SceneGraph::new(registry);
    let out = template.instantiate_document(
        doc,
        &LoadOptions {
            keep_ids: true,
            ..LoadOptions::default()
        },
    )?;
    let root = *out.roots.first().ok_or(PrefabError::EmptyDocument)?;
    if out.roots.len() > 1 {
        tracing::warn!(prefab = %id, roots = out.roots.len(), "prefab document has several roots, using the first");
    }
    template.set_prefab(root, Some(id))?;
    template.drain_events();
    Ok((template, root))
}
