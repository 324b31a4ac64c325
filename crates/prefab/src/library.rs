use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tessera_common::ObjectId;
use tessera_scene::{CloneOptions, Document, LinkMode, NodeId, SceneGraph, TypeRegistry};

use crate::prefab::{Prefab, PrefabError, PrefabState};
use crate::reconcile::{self, ReconcileReport};

/// Owns every loaded prefab, keyed by resource id.
#[derive(Debug)]
pub struct PrefabLibrary {
    registry: Arc<TypeRegistry>,
    prefabs: BTreeMap<ObjectId, Prefab>,
}

impl PrefabLibrary {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            prefabs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.prefabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefabs.is_empty()
    }

    pub fn contains(&self, prefab: ObjectId) -> bool {
        self.prefabs.contains_key(&prefab)
    }

    pub fn get(&self, prefab: ObjectId) -> Option<&Prefab> {
        self.prefabs.get(&prefab)
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.prefabs.keys().copied()
    }

    /// Turn the subtree at `node` into a new prefab. The template keeps the
    /// subtree's object ids; the source nodes are left as they are.
    pub fn create_from(&mut self, graph: &SceneGraph, node: NodeId) -> Result<ObjectId, PrefabError> {
        let doc = graph.to_document(node)?;
        self.insert(ObjectId::new(), &doc)
    }

    /// Load a prefab from its document. An injected resource id in the root
    /// record becomes the prefab id when it is free.
    pub fn load_document(&mut self, doc: &Document) -> Result<ObjectId, PrefabError> {
        let id = doc
            .root_record()
            .and_then(|r| r.parent)
            .filter(|id| !self.prefabs.contains_key(id))
            .unwrap_or_default();
        self.insert(id, doc)
    }

    fn insert(&mut self, id: ObjectId, doc: &Document) -> Result<ObjectId, PrefabError> {
        let prefab = Prefab::from_document(id, self.registry.clone(), doc)?;
        tracing::info!(
            prefab = %id,
            objects = prefab.known().len(),
            "prefab loaded"
        );
        self.prefabs.insert(id, prefab);
        Ok(id)
    }

    /// Editable template graph. Edits reach instances when the prefab next
    /// becomes ready.
    pub fn template_mut(&mut self, prefab: ObjectId) -> Option<&mut SceneGraph> {
        self.prefabs.get_mut(&prefab).map(Prefab::template_mut)
    }

    /// Clone the template into `world` under `parent`, linking every copy
    /// back to its template object. Links the template carries from other
    /// prefabs are replaced.
    pub fn try_instantiate(
        &self,
        prefab: ObjectId,
        world: &mut SceneGraph,
        parent: Option<NodeId>,
    ) -> Result<NodeId, PrefabError> {
        let p = self
            .prefabs
            .get(&prefab)
            .ok_or(PrefabError::ResourceMissing(prefab))?;
        if p.state() != PrefabState::Ready {
            return Err(PrefabError::NotReady(prefab));
        }
        let out = world.clone_from(
            p.template(),
            p.root(),
            CloneOptions {
                link: LinkMode::Prefab(prefab),
                parent,
                ..CloneOptions::default()
            },
        )?;
        world.set_prefab(out.root, Some(prefab))?;
        tracing::debug!(prefab = %prefab, instance = %out.root, "prefab instantiated");
        Ok(out.root)
    }

    /// Like [`PrefabLibrary::try_instantiate`], logging failures.
    pub fn instantiate(
        &self,
        prefab: ObjectId,
        world: &mut SceneGraph,
        parent: Option<NodeId>,
    ) -> Option<NodeId> {
        match self.try_instantiate(prefab, world, parent) {
            Ok(node) => Some(node),
            Err(err) => {
                tracing::warn!(prefab = %prefab, %err, "instantiate failed");
                None
            }
        }
    }

    /// Drive the prefab state machine.
    ///
    /// Entering `Loading` pins the prefab. Going from `Loading` to `Ready`
    /// reconciles every live instance in `world`, records the template ids
    /// and unpins. Repeating the current state does nothing.
    pub fn set_state(
        &mut self,
        prefab: ObjectId,
        state: PrefabState,
        world: &mut SceneGraph,
    ) -> Result<ReconcileReport, PrefabError> {
        let p = self
            .prefabs
            .get_mut(&prefab)
            .ok_or(PrefabError::ResourceMissing(prefab))?;
        match (p.state(), state) {
            (_, PrefabState::Loading) => {
                p.set_loading();
                Ok(ReconcileReport::default())
            }
            (PrefabState::Ready, PrefabState::Ready) => Ok(ReconcileReport::default()),
            (PrefabState::Loading, PrefabState::Ready) => {
                let report = reconcile::reconcile_all(p, world);
                p.set_ready();
                Ok(report)
            }
        }
    }

    /// Replace the template with `doc` and update every instance.
    pub fn reload(
        &mut self,
        prefab: ObjectId,
        doc: &Document,
        world: &mut SceneGraph,
    ) -> Result<ReconcileReport, PrefabError> {
        self.set_state(prefab, PrefabState::Loading, world)?;
        let rebuilt = match self.prefabs.get_mut(&prefab) {
            Some(p) => p.rebuild(doc),
            None => Err(PrefabError::ResourceMissing(prefab)),
        };
        // An unusable document leaves the old template in place.
        let report = self.set_state(prefab, PrefabState::Ready, world)?;
        rebuilt.map(|()| report)
    }

    /// Instance roots of `prefab` currently in `world`.
    pub fn live_instances(&self, prefab: ObjectId, world: &SceneGraph) -> Vec<NodeId> {
        reconcile::instances_of(world, prefab)
    }

    /// Drop every prefab that is not pinned and from which nothing in
    /// `world` derives. Returns the unloaded ids.
    pub fn unload_unused(&mut self, world: &SceneGraph) -> Vec<ObjectId> {
        let used: HashSet<ObjectId> = world
            .nodes()
            .filter_map(|(_, n)| n.link().map(|l| l.prefab))
            .chain(
                world
                    .components()
                    .filter_map(|(id, _, _)| world.component_link(id).map(|l| l.prefab)),
            )
            .collect();
        let unused: Vec<ObjectId> = self
            .prefabs
            .iter()
            .filter(|(id, p)| !p.is_pinned() && !used.contains(id))
            .map(|(id, _)| *id)
            .collect();
        for id in &unused {
            self.prefabs.remove(id);
            tracing::info!(prefab = %id, "prefab unloaded");
        }
        unused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use tessera_common::Transform;
    use tessera_scene::components::Camera;
    use tessera_scene::{
        Component, ComponentType, LoadOptions, Property, Value, ValueKind,
    };

    /// Points at another object of the same tree.
    #[derive(Debug, Clone, Default)]
    struct Aim {
        target: Option<ObjectId>,
    }

    impl Component for Aim {
        fn type_name(&self) -> &'static str {
            Self::TYPE_NAME
        }

        fn clone_box(&self) -> Box<dyn Component> {
            Box::new(self.clone())
        }
    }

    impl ComponentType for Aim {
        const TYPE_NAME: &'static str = "Aim";

        fn properties() -> Vec<Property<Self>> {
            vec![Property::new(
                "target",
                ValueKind::Ref,
                |c| Value::Ref(c.target),
                |c, v| match v {
                    Value::Ref(id) => {
                        c.target = *id;
                        true
                    }
                    _ => false,
                },
            )]
        }
    }

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::with_builtins();
        registry.register::<Aim>();
        Arc::new(registry)
    }

    struct Fixture {
        world: SceneGraph,
        library: PrefabLibrary,
        prefab: ObjectId,
        /// Template ids: root `a`, children `b` and `c`.
        a: NodeId,
        b: NodeId,
        c: NodeId,
    }

    /// `a` (Transform) with children `b` (Camera) and `c` (Aim -> b's camera).
    fn fixture() -> Fixture {
        let registry = registry();
        let mut world = SceneGraph::new(registry.clone());
        let a = world.create_node("a", None).unwrap();
        let b = world.create_node("b", Some(a)).unwrap();
        let c = world.create_node("c", Some(a)).unwrap();
        world.transform(a).unwrap();
        let cam = world.add_component(b, "Camera").unwrap();
        world.attach(c, Aim { target: Some(cam) }).unwrap();

        let mut library = PrefabLibrary::new(registry);
        let prefab = library.create_from(&world, a).unwrap();
        world.remove_node(a).unwrap();
        Fixture {
            world,
            library,
            prefab,
            a,
            b,
            c,
        }
    }

    fn child_named(world: &SceneGraph, parent: NodeId, name: &str) -> Option<NodeId> {
        world
            .children(parent)
            .iter()
            .copied()
            .find(|n| world.node(*n).is_some_and(|d| d.name() == name))
    }

    fn names(world: &SceneGraph, parent: NodeId) -> Vec<String> {
        world
            .children(parent)
            .iter()
            .filter_map(|n| world.node(*n).map(|d| d.name().to_string()))
            .collect()
    }

    fn aim_target(world: &SceneGraph, node: NodeId) -> Option<ObjectId> {
        let c = world.component(node, "Aim")?;
        world.get::<Aim>(c)?.target
    }

    /// Move the prefab through a reload cycle after `edit` changed the template.
    fn edit(fx: &mut Fixture, edit: impl FnOnce(&mut SceneGraph)) -> ReconcileReport {
        fx.library
            .set_state(fx.prefab, PrefabState::Loading, &mut fx.world)
            .unwrap();
        edit(fx.library.template_mut(fx.prefab).unwrap());
        fx.library
            .set_state(fx.prefab, PrefabState::Ready, &mut fx.world)
            .unwrap()
    }

    #[test]
    fn instantiate_links_every_object() {
        let mut fx = fixture();
        let inst = fx.library.try_instantiate(fx.prefab, &mut fx.world, None).unwrap();
        assert!(fx.world.is_instance(inst));
        assert_eq!(fx.world.node(inst).unwrap().prefab(), Some(fx.prefab));
        assert_eq!(fx.world.find_by_origin(inst, fx.b), child_named(&fx.world, inst, "b"));
        for node in fx.world.descendants(inst) {
            assert_eq!(fx.world.node(node).unwrap().link().unwrap().prefab, fx.prefab);
            for c in fx.world.node_components(node) {
                assert!(fx.world.component_link(*c).is_some());
            }
        }
        assert_eq!(fx.library.live_instances(fx.prefab, &fx.world), vec![inst]);
    }

    #[test]
    fn missing_prefab_is_resource_missing() {
        let mut fx = fixture();
        let ghost = ObjectId::new();
        assert!(matches!(
            fx.library.try_instantiate(ghost, &mut fx.world, None),
            Err(PrefabError::ResourceMissing(id)) if id == ghost
        ));
        assert_eq!(fx.library.instantiate(ghost, &mut fx.world, None), None);
    }

    #[test]
    fn loading_prefab_cannot_be_instantiated() {
        let mut fx = fixture();
        fx.library
            .set_state(fx.prefab, PrefabState::Loading, &mut fx.world)
            .unwrap();
        assert!(matches!(
            fx.library.try_instantiate(fx.prefab, &mut fx.world, None),
            Err(PrefabError::NotReady(_))
        ));
    }

    #[test]
    fn prefab_serialization_keeps_links() {
        let mut fx = fixture();
        let inst = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let doc = fx.world.to_document(inst).unwrap();

        let mut other = SceneGraph::new(registry());
        let out = other.instantiate_document(&doc, &LoadOptions::default()).unwrap();
        let root = out.roots[0];
        assert!(other.is_instance(root));
        assert_eq!(other.node(root).unwrap().prefab(), Some(fx.prefab));
        assert_eq!(other.node(root).unwrap().link().unwrap().origin, fx.a);
        assert_eq!(names(&other, root), ["b", "c"]);

        // the prefab document itself reloads under the same id
        let prefab_doc = fx.library.get(fx.prefab).unwrap().to_document().unwrap();
        let mut library = PrefabLibrary::new(registry());
        assert_eq!(library.load_document(&prefab_doc).unwrap(), fx.prefab);
    }

    #[test]
    fn nested_transform_edit_survives_round_trip() {
        let registry = registry();
        let mut world = SceneGraph::new(registry.clone());
        let root = world.create_node("Prefab", None).unwrap();
        let level1 = world.create_node("Level1", Some(root)).unwrap();
        let cam = world
            .attach(
                level1,
                Camera {
                    focal: 2.5,
                    ..Camera::default()
                },
            )
            .unwrap();
        assert!(world.get::<Camera>(cam).is_some());

        let mut library = PrefabLibrary::new(registry.clone());
        let prefab = library.create_from(&world, root).unwrap();
        let inst = library.instantiate(prefab, &mut world, None).unwrap();
        let nested = child_named(&world, inst, "Level1").unwrap();
        let moved = Vec3::new(1.0, 2.0, 3.0);
        world
            .set_local_transform(
                nested,
                Transform {
                    position: moved,
                    ..Transform::default()
                },
            )
            .unwrap();

        let doc = world.to_document(inst).unwrap();
        let mut other = SceneGraph::new(registry);
        let out = other.instantiate_document(&doc, &LoadOptions::default()).unwrap();
        let copy = out.roots[0];
        assert_eq!(other.node(copy).unwrap().name(), "Prefab");
        assert_eq!(other.node(copy).unwrap().prefab(), Some(prefab));
        let level1 = child_named(&other, copy, "Level1").unwrap();
        assert_eq!(other.local_transform(level1).position, moved);
        let cam = other.component(level1, "Camera").unwrap();
        assert_eq!(other.get::<Camera>(cam).unwrap().focal, 2.5);
    }

    #[test]
    fn prefab_built_from_an_instance_owns_its_copies() {
        let mut fx = fixture();
        let inner = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let outer = fx.library.create_from(&fx.world, inner).unwrap();
        let inst = fx.library.instantiate(outer, &mut fx.world, None).unwrap();

        assert_eq!(fx.world.node(inst).unwrap().prefab(), Some(outer));
        for node in fx.world.descendants(inst) {
            assert_eq!(fx.world.node(node).unwrap().link().unwrap().prefab, outer);
            for c in fx.world.node_components(node) {
                assert_eq!(fx.world.component_link(*c).unwrap().prefab, outer);
            }
        }
        assert_eq!(fx.library.live_instances(outer, &fx.world), vec![inst]);
        assert_eq!(fx.library.live_instances(fx.prefab, &fx.world), vec![inner]);

        let template_root = fx.library.get(outer).unwrap().root();
        fx.library
            .set_state(outer, PrefabState::Loading, &mut fx.world)
            .unwrap();
        let template = fx.library.template_mut(outer).unwrap();
        let b = child_named(template, template_root, "b").unwrap();
        template.set_name(b, "edited").unwrap();
        let report = fx
            .library
            .set_state(outer, PrefabState::Ready, &mut fx.world)
            .unwrap();
        assert_eq!(report.instances, 1);
        assert_eq!(names(&fx.world, inst), ["edited", "c"]);
        assert_eq!(names(&fx.world, inner), ["b", "c"]);

        // the outer instance keeps its prefab loaded on its own
        fx.world.remove_node(inner).unwrap();
        assert_eq!(fx.library.unload_unused(&fx.world), vec![fx.prefab]);
        assert!(fx.library.contains(outer));
        fx.world.remove_node(inst).unwrap();
        assert_eq!(fx.library.unload_unused(&fx.world), vec![outer]);
    }

    #[test]
    fn cross_reference_points_into_the_instance() {
        let mut fx = fixture();
        let first = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let second = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        for inst in [first, second] {
            let b = child_named(&fx.world, inst, "b").unwrap();
            let c = child_named(&fx.world, inst, "c").unwrap();
            let cam = fx.world.component(b, "Camera").unwrap();
            assert_eq!(aim_target(&fx.world, c), Some(cam));
        }

        // still correct after the template changes
        let b = fx.b;
        let report = edit(&mut fx, |t| {
            let cam = t.component(b, "Camera").unwrap();
            t.get_mut::<Camera>(cam).unwrap().fov = 30.0;
        });
        assert_eq!(report.refreshed_components, 2);
        for inst in [first, second] {
            let b = child_named(&fx.world, inst, "b").unwrap();
            let c = child_named(&fx.world, inst, "c").unwrap();
            let cam = fx.world.component(b, "Camera").unwrap();
            assert_eq!(fx.world.get::<Camera>(cam).unwrap().fov, 30.0);
            assert_eq!(aim_target(&fx.world, c), Some(cam));
        }
    }

    #[test]
    fn removed_template_component_leaves_instances() {
        let mut fx = fixture();
        let first = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let second = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();

        let b = fx.b;
        let report = edit(&mut fx, |t| {
            let cam = t.component(b, "Camera").unwrap();
            t.remove_component(cam);
        });
        assert_eq!(report.removed_components, 2);
        for inst in [first, second] {
            let b = child_named(&fx.world, inst, "b").unwrap();
            assert!(fx.world.component(b, "Camera").is_none());
            // the reference into the removed component is now dangling
            let c = child_named(&fx.world, inst, "c").unwrap();
            assert_eq!(aim_target(&fx.world, c), None);
        }

        // and stays removed through a document round trip
        let doc = fx.world.to_document(first).unwrap();
        let mut other = SceneGraph::new(registry());
        let out = other.instantiate_document(&doc, &LoadOptions::default()).unwrap();
        let b = child_named(&other, out.roots[0], "b").unwrap();
        assert!(other.component(b, "Camera").is_none());
    }

    #[test]
    fn template_edits_propagate_to_every_instance() {
        let mut fx = fixture();
        let instances: Vec<_> = (0..3)
            .map(|_| fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap())
            .collect();

        let (a, b, c) = (fx.a, fx.b, fx.c);
        let report = edit(&mut fx, |t| {
            t.remove_node(c).unwrap();
            t.set_name(b, "renamed").unwrap();
            let d = t.create_node("d", Some(a)).unwrap();
            t.add_component(d, "Light").unwrap();
            t.set_parent(d, Some(a), Some(0), true).unwrap();
        });

        assert_eq!(report.instances, 3);
        assert_eq!(report.removed_nodes, 3);
        assert_eq!(report.refreshed_nodes, 3);
        assert_eq!(report.added_nodes, 3);
        assert_eq!(report.added_components, 3);
        for inst in &instances {
            assert_eq!(names(&fx.world, *inst), ["d", "renamed"]);
            let d = child_named(&fx.world, *inst, "d").unwrap();
            assert!(fx.world.component(d, "Light").is_some());
            assert!(fx.world.node(d).unwrap().link().is_some());
            assert_eq!(fx.world.node(d).unwrap().prefab(), None);
        }
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut fx = fixture();
        fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let b = fx.b;
        let first = edit(&mut fx, |t| {
            t.set_name(b, "x").unwrap();
        });
        assert!(!first.is_empty());
        fx.world.drain_events();

        let second = edit(&mut fx, |_| {});
        assert!(second.is_empty());
        assert!(fx.world.drain_events().is_empty());

        // repeating Ready is a no-op too
        let again = fx
            .library
            .set_state(fx.prefab, PrefabState::Ready, &mut fx.world)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn instance_placement_survives_reconcile() {
        let mut fx = fixture();
        let inst = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let placed = Transform {
            position: Vec3::new(5.0, 0.0, -2.0),
            ..Transform::default()
        };
        fx.world.set_local_transform(inst, placed).unwrap();

        let b = fx.b;
        edit(&mut fx, |t| {
            t.set_name(b, "moved").unwrap();
        });
        assert_eq!(fx.world.local_transform(inst), placed);
    }

    #[test]
    fn divergent_branch_is_skipped() {
        let mut fx = fixture();
        let inst = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();
        let local_b = child_named(&fx.world, inst, "b").unwrap();
        fx.world.remove_node(local_b).unwrap();

        let (b, c) = (fx.b, fx.c);
        let report = edit(&mut fx, |t| {
            t.set_name(b, "b2").unwrap();
            t.set_name(c, "c2").unwrap();
        });
        assert_eq!(report.skipped, 1);
        assert_eq!(report.refreshed_nodes, 1);
        assert_eq!(names(&fx.world, inst), ["c2"]);
    }

    #[test]
    fn reload_from_document() {
        let mut fx = fixture();
        let inst = fx.library.instantiate(fx.prefab, &mut fx.world, None).unwrap();

        let mut doc = fx.library.get(fx.prefab).unwrap().to_document().unwrap();
        for record in doc.objects.iter_mut().filter(|r| r.uuid == fx.c) {
            record
                .properties
                .insert("name".into(), Value::String("from-disk".into()));
        }
        let report = fx.library.reload(fx.prefab, &doc, &mut fx.world).unwrap();
        assert_eq!(report.refreshed_nodes, 1);
        assert_eq!(names(&fx.world, inst), ["b", "from-disk"]);
        assert!(!fx.library.get(fx.prefab).unwrap().is_pinned());
    }

    #[test]
    fn unload_only_unused_and_unpinned() {
        let mut fx = fixture();
        let used = fx.prefab;
        fx.library.instantiate(used, &mut fx.world, None).unwrap();

        let mut scratch = SceneGraph::new(registry());
        let n = scratch.create_node("n", None).unwrap();
        let unused = fx.library.create_from(&scratch, n).unwrap();
        let pinned = fx.library.create_from(&scratch, n).unwrap();
        fx.library
            .set_state(pinned, PrefabState::Loading, &mut fx.world)
            .unwrap();

        assert_eq!(fx.library.unload_unused(&fx.world), vec![unused]);
        assert!(fx.library.contains(used));
        assert!(fx.library.contains(pinned));
        assert_eq!(fx.library.len(), 2);
    }
}
