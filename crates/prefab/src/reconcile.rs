//! Bringing live instances in line with an edited template.

use std::collections::{BTreeSet, HashMap, HashSet};

use tessera_common::ObjectId;
use tessera_scene::components::TransformComponent;
use tessera_scene::{
    CloneOptions, ComponentType, LinkMode, NodeId, PrefabLink, PropertyMap, SceneGraph,
};

use crate::prefab::Prefab;

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub instances: usize,
    pub refreshed_nodes: usize,
    pub refreshed_components: usize,
    pub added_nodes: usize,
    pub added_components: usize,
    pub removed_nodes: usize,
    pub removed_components: usize,
    /// Branches left alone because the instance no longer matched the template.
    pub skipped: usize,
}

impl ReconcileReport {
    /// Number of objects created, removed or modified.
    pub fn mutations(&self) -> usize {
        self.refreshed_nodes
            + self.refreshed_components
            + self.added_nodes
            + self.added_components
            + self.removed_nodes
            + self.removed_components
    }

    /// True when the pass left the world untouched.
    pub fn is_empty(&self) -> bool {
        self.mutations() == 0
    }

    pub(crate) fn merge(&mut self, other: ReconcileReport) {
        self.instances += other.instances;
        self.refreshed_nodes += other.refreshed_nodes;
        self.refreshed_components += other.refreshed_components;
        self.added_nodes += other.added_nodes;
        self.added_components += other.added_components;
        self.removed_nodes += other.removed_nodes;
        self.removed_components += other.removed_components;
        self.skipped += other.skipped;
    }
}

/// Instance roots of `prefab` in `world`.
pub(crate) fn instances_of(world: &SceneGraph, prefab: ObjectId) -> Vec<NodeId> {
    world
        .nodes()
        .filter(|(_, n)| {
            n.prefab() == Some(prefab) && n.link().is_some_and(|l| l.prefab == prefab)
        })
        .map(|(id, _)| *id)
        .collect()
}

/// Reconcile every instance of `prefab` in `world`.
pub(crate) fn reconcile_all(prefab: &Prefab, world: &mut SceneGraph) -> ReconcileReport {
    let _span = tracing::info_span!("reconcile", prefab = %prefab.id()).entered();
    let reconciler = Reconciler {
        prefab: prefab.id(),
        template: prefab.template(),
        template_root: prefab.root(),
        known: prefab.known(),
    };
    let mut report = ReconcileReport::default();
    for instance in instances_of(world, prefab.id()) {
        if world.contains_node(instance) {
            report.merge(reconciler.run(world, instance));
        }
    }
    tracing::info!(
        instances = report.instances,
        mutations = report.mutations(),
        skipped = report.skipped,
        "prefab instances reconciled"
    );
    report
}

struct Reconciler<'a> {
    prefab: ObjectId,
    template: &'a SceneGraph,
    template_root: NodeId,
    known: &'a BTreeSet<ObjectId>,
}

/// Template object id to live object id, for one instance.
type LiveMap = HashMap<ObjectId, ObjectId>;

impl Reconciler<'_> {
    fn run(&self, world: &mut SceneGraph, instance: NodeId) -> ReconcileReport {
        let mut report = ReconcileReport {
            instances: 1,
            ..ReconcileReport::default()
        };
        let mut live = self.collect_links(world, instance);

        self.remove_stale(world, instance, &mut live, &mut report);

        let mut handled: HashSet<NodeId> = HashSet::new();
        for t in self.template.descendants(self.template_root) {
            if handled.contains(&t) {
                continue;
            }
            match live.get(&t).copied() {
                Some(node) => {
                    if t != self.template_root
                        && world.apply_node_properties(node, &self.template.node_properties(t))
                    {
                        report.refreshed_nodes += 1;
                    }
                    self.sync_components(world, t, node, &mut live, &mut report);
                }
                None if self.known.contains(&t) => {
                    tracing::warn!(
                        instance = %instance,
                        origin = %t,
                        "instance diverged from template, branch skipped"
                    );
                    report.skipped += 1;
                    handled.extend(self.template.descendants(t));
                }
                None => {
                    self.add_subtree(world, t, &mut live, &mut report);
                    handled.extend(self.template.descendants(t));
                }
            }
        }
        report
    }

    fn collect_links(&self, world: &SceneGraph, instance: NodeId) -> LiveMap {
        let mut live = LiveMap::new();
        for node in world.descendants(instance) {
            if let Some(link) = world.node(node).and_then(|n| n.link()) {
                if link.prefab == self.prefab {
                    live.insert(link.origin, node);
                }
            }
            for component in world.node_components(node) {
                if let Some(link) = world.component_link(*component) {
                    if link.prefab == self.prefab {
                        live.insert(link.origin, *component);
                    }
                }
            }
        }
        live
    }

    /// Delete instance objects whose template object existed at the last
    /// load and is gone now.
    fn remove_stale(
        &self,
        world: &mut SceneGraph,
        instance: NodeId,
        live: &mut LiveMap,
        report: &mut ReconcileReport,
    ) {
        let (nodes, components): (Vec<ObjectId>, Vec<ObjectId>) = live
            .iter()
            .filter(|(origin, _)| self.known.contains(*origin) && !self.template.contains(**origin))
            .map(|(_, id)| *id)
            .filter(|id| *id != instance)
            .partition(|id| world.contains_node(*id));

        // Nodes first; components on removed nodes go with them.
        for id in nodes {
            if !world.contains_node(id) {
                continue;
            }
            let count = world.descendants(id).len();
            if world.remove_node(id).is_ok() {
                report.removed_nodes += count;
            }
        }
        for id in components {
            if world.remove_component(id).is_some() {
                report.removed_components += 1;
            }
        }
        live.retain(|_, id| world.contains(*id));
    }

    fn sync_components(
        &self,
        world: &mut SceneGraph,
        template_node: NodeId,
        node: NodeId,
        live: &mut LiveMap,
        report: &mut ReconcileReport,
    ) {
        for tc in self.template.node_components(template_node) {
            let Some(data) = self.template.get_dyn(*tc) else {
                continue;
            };
            match live.get(tc).copied() {
                Some(lc) => {
                    // The root transform places the instance; it belongs to the instance.
                    if template_node == self.template_root
                        && data.type_name() == TransformComponent::TYPE_NAME
                    {
                        continue;
                    }
                    let wanted = self.resolve(world, live, self.template.component_properties(*tc));
                    let current = world.component_properties(lc);
                    let mut changed = false;
                    for (key, value) in &wanted {
                        if current.get(key) != Some(value) {
                            changed |= world.set_property(lc, key, value);
                        }
                    }
                    if changed {
                        report.refreshed_components += 1;
                    }
                }
                None if self.known.contains(tc) => {
                    tracing::debug!(
                        node = %node,
                        origin = %tc,
                        "component removed from instance, not restored"
                    );
                }
                None => {
                    let mut copy = data.clone_box();
                    let props = self.resolve(world, live, self.template.component_properties(*tc));
                    world.registry().write_all(copy.as_mut(), &props);
                    let link = PrefabLink {
                        prefab: self.prefab,
                        origin: *tc,
                    };
                    match world.attach_linked(node, copy, Some(link)) {
                        Ok(id) => {
                            live.insert(*tc, id);
                            report.added_components += 1;
                        }
                        Err(err) => tracing::warn!(%err, origin = %tc, "could not add component"),
                    }
                }
            }
        }
    }

    /// Clone a template node that appeared since the last load into the
    /// instance, right after the counterpart of its previous sibling.
    fn add_subtree(
        &self,
        world: &mut SceneGraph,
        t: NodeId,
        live: &mut LiveMap,
        report: &mut ReconcileReport,
    ) {
        let Some(template_parent) = self.template.parent(t) else {
            return;
        };
        let Some(parent) = live.get(&template_parent).copied() else {
            tracing::debug!(origin = %t, "parent of new template node has no counterpart");
            return;
        };
        let position = self.insert_position(world, t, template_parent, parent, live);
        let options = CloneOptions {
            link: LinkMode::Prefab(self.prefab),
            parent: Some(parent),
            position,
            external: live.clone(),
        };
        match world.clone_from(self.template, t, options) {
            Ok(out) => {
                for (origin, id) in out.remap {
                    if world.contains_node(id) {
                        report.added_nodes += 1;
                    } else {
                        report.added_components += 1;
                    }
                    live.insert(origin, id);
                }
            }
            Err(err) => tracing::warn!(%err, origin = %t, "could not add template node"),
        }
    }

    fn insert_position(
        &self,
        world: &SceneGraph,
        t: NodeId,
        template_parent: NodeId,
        parent: NodeId,
        live: &LiveMap,
    ) -> Option<usize> {
        let siblings = self.template.children(template_parent);
        let index = siblings.iter().position(|c| *c == t)?;
        if index == 0 {
            return Some(0);
        }
        let previous = live.get(&siblings[index - 1])?;
        world
            .children(parent)
            .iter()
            .position(|c| c == previous)
            .map(|i| i + 1)
    }

    /// Point template-internal references at the instance's objects.
    fn resolve(&self, world: &SceneGraph, live: &LiveMap, props: PropertyMap) -> PropertyMap {
        props
            .into_iter()
            .map(|(key, value)| {
                let value = value.map_refs(&|id| {
                    live.get(&id)
                        .copied()
                        .or_else(|| world.contains(id).then_some(id))
                });
                (key, value)
            })
            .collect()
    }
}
