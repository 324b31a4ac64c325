//! Frame orchestration: gather, cull, run passes, composite.

use glam::{Mat4, Vec3, Vec4};
use tessera_common::{Aabb, Layers, ObjectId};
use tessera_scene::components::{Camera, builtin};
use tessera_scene::{ComponentId, NodeId, Renderable, SceneGraph};

use crate::command_buffer::{CommandBuffer, Rect, SubmitStats};
use crate::config::PipelineConfig;
use crate::frame::{BufferTable, CameraState, LightItem, RenderBuffer, RenderItem, WidgetItem};
use crate::frustum::frustum_culling;
use crate::gizmos::Gizmos;
use crate::passes::{
    FINAL_BUFFER, OpaquePass, PassContext, RenderPass, ShadowPass, TranslucentPass, UiPass,
};
use crate::resources::{RenderResources, internal};

/// What one call to [`PipelineContext::draw`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// No active camera; nothing was submitted.
    pub skipped_frame: bool,
    pub renderables: usize,
    pub visible: usize,
    pub lights: usize,
    pub widgets: usize,
    pub passes: usize,
    /// Renderables dropped because a referenced mesh or material is not loaded.
    pub missing_resources: usize,
    pub gizmo_lines: usize,
    pub submit: SubmitStats,
}

pub struct PipelineContext {
    config: PipelineConfig,
    passes: Vec<Box<dyn RenderPass>>,
    buffers: BufferTable,
    gizmos: Gizmos,
    camera: Option<ComponentId>,
    /// `None` presents to the screen.
    target: Option<ObjectId>,
    viewport: (u32, u32),
    ui_as_scene_view: bool,

    renderables: Vec<RenderItem>,
    lights: Vec<LightItem>,
    widgets: Vec<WidgetItem>,
    culled: Vec<RenderItem>,
    world_bound: Aabb,
    missing_resources: usize,
}

impl PipelineContext {
    /// Pipeline without passes.
    pub fn new(config: PipelineConfig) -> Self {
        let mut gizmos = Gizmos::new();
        gizmos.init();
        Self {
            buffers: BufferTable::new(config.max_texture),
            viewport: (config.width, config.height),
            config,
            passes: Vec::new(),
            gizmos,
            camera: None,
            target: None,
            ui_as_scene_view: false,
            renderables: Vec::new(),
            lights: Vec::new(),
            widgets: Vec::new(),
            culled: Vec::new(),
            world_bound: Aabb::EMPTY,
            missing_resources: 0,
        }
    }

    /// Pipeline with the built-in shadow, opaque, translucent and UI passes.
    pub fn with_default_passes(config: PipelineConfig) -> Self {
        let mut pipeline = Self::new(config);
        pipeline.insert_render_pass(Box::new(ShadowPass), None);
        pipeline.insert_render_pass(Box::new(OpaquePass), None);
        pipeline.insert_render_pass(Box::new(TranslucentPass), None);
        pipeline.insert_render_pass(Box::new(UiPass), None);
        pipeline
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // --- Passes ---

    /// Insert `pass` before the pass called `before`; appended when `before`
    /// is `None` or names no registered pass.
    pub fn insert_render_pass(&mut self, pass: Box<dyn RenderPass>, before: Option<&str>) {
        let index = before.and_then(|name| self.passes.iter().position(|p| p.name() == name));
        match index {
            Some(i) => self.passes.insert(i, pass),
            None => {
                if let Some(name) = before {
                    tracing::debug!(before = name, pass = pass.name(), "anchor pass not found, appending");
                }
                self.passes.push(pass);
            }
        }
    }

    pub fn remove_render_pass(&mut self, name: &str) -> Option<Box<dyn RenderPass>> {
        let index = self.passes.iter().position(|p| p.name() == name)?;
        Some(self.passes.remove(index))
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    // --- Camera and targets ---

    /// Render from this camera component while it stays enabled.
    pub fn set_camera(&mut self, camera: Option<ComponentId>) {
        self.camera = camera;
    }

    pub fn camera(&self) -> Option<ComponentId> {
        self.camera
    }

    /// Forget the current camera; the next frame picks the first enabled one.
    pub fn camera_reset(&mut self) {
        self.camera = None;
    }

    /// Where the final image goes: the screen (`None`) or an offscreen
    /// render target.
    pub fn set_target(&mut self, target: Option<ObjectId>) {
        self.target = target;
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.config.width = width;
        self.config.height = height;
        if self.buffers.get(FINAL_BUFFER).is_some() {
            self.buffers.ensure(FINAL_BUFFER, width, height);
        }
        for pass in &mut self.passes {
            pass.resize(width, height);
        }
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn set_max_texture(&mut self, max: u32) {
        self.config.max_texture = max;
        self.buffers.set_max_texture(max);
    }

    /// Intermediate buffers created so far, by name.
    pub fn render_textures(&self) -> Vec<(&str, RenderBuffer)> {
        self.buffers.iter().map(|(name, b)| (name, *b)).collect()
    }

    /// Draw widgets with the scene camera instead of a screen projection.
    pub fn show_ui_as_scene_view(&mut self, enabled: bool) {
        self.ui_as_scene_view = enabled;
    }

    pub fn ui_as_scene_view(&self) -> bool {
        self.ui_as_scene_view
    }

    /// Shared quad used for sprites, widgets and compositing.
    pub fn default_plane(&self) -> ObjectId {
        builtin::PLANE_MESH
    }

    pub fn gizmos_mut(&mut self) -> &mut Gizmos {
        &mut self.gizmos
    }

    // --- Frame data ---

    /// Union of every renderable tested during the last frame.
    pub fn world_bound(&self) -> Aabb {
        self.world_bound
    }

    pub fn renderables(&self) -> &[RenderItem] {
        &self.renderables
    }

    pub fn culled(&self) -> &[RenderItem] {
        &self.culled
    }

    pub fn lights(&self) -> &[LightItem] {
        &self.lights
    }

    pub fn widgets(&self) -> &[WidgetItem] {
        &self.widgets
    }

    /// Rebuild the renderable, light and widget lists from every component
    /// on an enabled-in-hierarchy node. Returns the number of renderables.
    pub fn analize_graph(&mut self, graph: &SceneGraph, resources: &RenderResources) -> usize {
        self.renderables.clear();
        self.lights.clear();
        self.widgets.clear();
        self.missing_resources = 0;

        for (id, node, component) in graph.components() {
            if !graph.is_enabled_in_hierarchy(node) {
                continue;
            }
            if let Some(renderable) = component.as_renderable() {
                let world = graph.world_matrix(node);
                let layers = graph.node(node).map(|n| n.layers()).unwrap_or_default();
                match resolve_item(id, node, renderable, world, layers, resources) {
                    Ok(item) => self.renderables.push(item),
                    Err(missing) => {
                        tracing::warn!(
                            component = %id,
                            resource = %missing,
                            "render resource missing, renderable skipped"
                        );
                        self.missing_resources += 1;
                    }
                }
            }
            if let Some(light) = component.as_light() {
                let world = graph.world_matrix(node);
                self.lights.push(LightItem {
                    component: id,
                    node,
                    desc: light.light_desc(),
                    position: world.transform_point3(Vec3::ZERO),
                    direction: world.transform_vector3(Vec3::NEG_Z).normalize_or_zero(),
                });
            }
            if let Some(widget) = component.as_widget() {
                self.widgets.push(WidgetItem {
                    component: id,
                    node,
                    desc: widget.widget_desc(),
                });
            }
        }
        tracing::debug!(
            renderables = self.renderables.len(),
            lights = self.lights.len(),
            widgets = self.widgets.len(),
            "graph analysed"
        );
        self.renderables.len()
    }

    fn active_camera(&self, graph: &SceneGraph) -> Option<(ComponentId, NodeId, Camera)> {
        let usable = |id: ComponentId| {
            let node = graph.component_node(id)?;
            let camera = graph.get::<Camera>(id)?;
            graph
                .is_enabled_in_hierarchy(node)
                .then(|| (id, node, camera.clone()))
        };
        if let Some(found) = self.camera.and_then(usable) {
            return Some(found);
        }
        graph
            .components()
            .filter(|(_, _, c)| c.is::<Camera>())
            .find_map(|(id, _, _)| usable(id))
    }

    /// Draw one frame into `cmd`. Without an enabled camera the frame is
    /// skipped and the pipeline keeps the state of the previous frame.
    pub fn draw(
        &mut self,
        graph: &SceneGraph,
        resources: &RenderResources,
        cmd: &mut dyn CommandBuffer,
    ) -> FrameStats {
        let _span = tracing::info_span!("frame").entered();
        let mut stats = FrameStats::default();

        let Some((camera_id, camera_node, camera)) = self.active_camera(graph) else {
            tracing::debug!("no active camera, frame skipped");
            stats.skipped_frame = true;
            return stats;
        };
        self.camera = Some(camera_id);
        let camera = CameraState::new(
            camera_id,
            camera_node,
            &camera,
            graph.world_matrix(camera_node),
            self.viewport,
        );

        stats.renderables = self.analize_graph(graph, resources);
        stats.missing_resources = self.missing_resources;
        stats.lights = self.lights.len();
        stats.widgets = self.widgets.len();

        let (culled, bound) = if self.config.frustum_culling {
            frustum_culling(
                &camera.corners,
                &self.renderables,
                self.config.thread_policy,
                self.config.parallel_threshold,
            )
        } else {
            let mut bound = Aabb::EMPTY;
            for item in &self.renderables {
                bound.encapsulate(&item.bounds);
            }
            (self.renderables.clone(), bound)
        };
        self.culled = culled;
        self.world_bound = bound;
        stats.visible = self.culled.len();

        if self.config.show_bounds {
            self.gizmos
                .wire_box(&self.world_bound, Vec4::new(1.0, 1.0, 0.0, 1.0));
        }

        cmd.begin();
        if self.passes.is_empty() {
            if self.config.clear_on_empty {
                cmd.set_render_target(self.target);
                cmd.clear_render_target(Some(camera.clear_color), Some(1.0));
            }
        } else {
            let mut ctx = PassContext {
                cmd: &mut *cmd,
                buffers: &mut self.buffers,
                resources,
                camera: &camera,
                culled: &self.culled,
                lights: &self.lights,
                widgets: &self.widgets,
                world_bound: self.world_bound,
                viewport: self.viewport,
                ui_as_scene_view: self.ui_as_scene_view,
                shadow_resolution: self.config.shadow_resolution,
            };
            for pass in &mut self.passes {
                let _pass_span = tracing::debug_span!("pass", name = pass.name()).entered();
                pass.draw(&mut ctx);
            }
            stats.passes = self.passes.len();
        }

        if !self.gizmos.is_empty() {
            let overlay = self.buffers.get(FINAL_BUFFER).map(|b| b.id).or(self.target);
            cmd.set_render_target(overlay);
            cmd.set_view_projection(camera.view, camera.projection);
            stats.gizmo_lines = self.gizmos.flush(&mut *cmd);
            cmd.reset_view_projection();
        }

        self.composite(resources, cmd);
        cmd.end();

        stats.submit = cmd.stats();
        tracing::debug!(
            visible = stats.visible,
            draw_calls = stats.submit.draw_calls,
            skipped = stats.submit.skipped,
            "frame submitted"
        );
        stats
    }

    /// Blit the `"final"` buffer onto the pipeline's target.
    fn composite(&self, resources: &RenderResources, cmd: &mut dyn CommandBuffer) {
        if self.buffers.get(FINAL_BUFFER).is_none() {
            return;
        }
        let (width, height) = match self.target.and_then(|t| resources.render_target(t)) {
            Some(target) => (target.width, target.height),
            None => {
                if let Some(t) = self.target {
                    tracing::warn!(target = %t, "render target missing, using viewport size");
                }
                self.viewport
            }
        };
        cmd.set_render_target(self.target);
        cmd.reset_view_projection();
        cmd.set_viewport(Rect::new(0, 0, width, height));
        cmd.clear_render_target(Some(self.config.clear_color), None);
        cmd.draw_mesh(
            Some(builtin::PLANE_MESH),
            Some(internal::BLIT_MATERIAL),
            0,
            Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0)),
            Layers::DEFAULT,
        );
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        self.gizmos.teardown();
    }
}

/// Resolve a renderable against loaded resources. On failure returns the
/// id that could not be found.
fn resolve_item(
    component: ComponentId,
    node: NodeId,
    renderable: &dyn Renderable,
    world: Mat4,
    layers: Layers,
    resources: &RenderResources,
) -> Result<RenderItem, ObjectId> {
    let desc = renderable.draw_desc();
    let mesh_bounds = match desc.mesh {
        Some(id) => Some(resources.mesh(id).ok_or(id)?.bounds),
        None => None,
    };
    let translucent = match desc.material {
        Some(id) => resources.material(id).ok_or(id)?.translucent,
        None => false,
    };
    let local = desc.local_bounds.or(mesh_bounds).unwrap_or(Aabb::EMPTY);
    Ok(RenderItem {
        component,
        node,
        mesh: desc.mesh,
        material: desc.material,
        sub_mesh: desc.sub_mesh,
        transform: world,
        bounds: local.transformed(&world),
        layers,
        priority: desc.priority,
        translucent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_buffer::{Command, RecordingCommandBuffer};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use tessera_common::Transform;
    use tessera_scene::components::{Light, MeshRender, Widget};
    use tessera_scene::{LightKind, ThreadPolicy, TypeRegistry};

    struct Scene {
        graph: SceneGraph,
        camera: ComponentId,
        camera_node: NodeId,
    }

    fn place(graph: &mut SceneGraph, node: NodeId, position: Vec3) {
        graph
            .set_local_transform(
                node,
                Transform {
                    position,
                    ..Transform::default()
                },
            )
            .unwrap();
    }

    /// Camera at z=10 looking down -Z.
    fn scene() -> Scene {
        let mut graph = SceneGraph::new(Arc::new(TypeRegistry::with_builtins()));
        let camera_node = graph.create_node("camera", None).unwrap();
        place(&mut graph, camera_node, Vec3::new(0.0, 0.0, 10.0));
        let camera = graph.attach(camera_node, Camera::default()).unwrap();
        Scene {
            graph,
            camera,
            camera_node,
        }
    }

    fn cube(graph: &mut SceneGraph, name: &str, position: Vec3) -> NodeId {
        let node = graph.create_node(name, None).unwrap();
        place(graph, node, position);
        graph
            .attach(
                node,
                MeshRender {
                    mesh: Some(builtin::CUBE_MESH),
                    material: Some(builtin::DEFAULT_MATERIAL),
                    sub_mesh: 0,
                },
            )
            .unwrap();
        node
    }

    struct Probe {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl RenderPass for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn draw(&mut self, ctx: &mut PassContext<'_>) {
            assert!(ctx.buffers.get("no-such-buffer").is_none());
            self.log.borrow_mut().push(self.name.to_string());
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.log.borrow_mut().push(format!("{}:{width}x{height}", self.name));
        }
    }

    fn probe(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Box<dyn RenderPass> {
        Box::new(Probe {
            name,
            log: log.clone(),
        })
    }

    #[test]
    fn missing_camera_skips_frame() {
        let mut graph = SceneGraph::new(Arc::new(TypeRegistry::with_builtins()));
        cube(&mut graph, "a", Vec3::ZERO);
        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&graph, &RenderResources::with_builtins(), &mut cmd);
        assert!(stats.skipped_frame);
        assert!(cmd.commands().is_empty());
        assert!(pipeline.renderables().is_empty());
    }

    #[test]
    fn culls_objects_outside_the_view() {
        let mut s = scene();
        cube(&mut s.graph, "front", Vec3::ZERO);
        cube(&mut s.graph, "behind", Vec3::new(0.0, 0.0, 30.0));
        cube(&mut s.graph, "far-left", Vec3::new(-500.0, 0.0, 0.0));
        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&s.graph, &RenderResources::with_builtins(), &mut cmd);

        assert!(!stats.skipped_frame);
        assert_eq!(stats.renderables, 3);
        assert_eq!(stats.visible, 1);
        assert_eq!(pipeline.camera(), Some(s.camera));
        // The world bound covers culled objects too.
        assert!(pipeline.world_bound().contains_point(Vec3::new(-500.0, 0.0, 0.0)));
        assert!(pipeline.world_bound().contains_point(Vec3::new(0.0, 0.0, 30.0)));
    }

    #[test]
    fn pool_culling_matches_main() {
        let mut s = scene();
        for i in 0..64 {
            cube(&mut s.graph, "c", Vec3::new(i as f32 * 4.0 - 128.0, 0.0, -(i as f32)));
        }
        let res = RenderResources::with_builtins();
        let mut main = PipelineContext::with_default_passes(PipelineConfig::default());
        let mut pool = PipelineContext::with_default_passes(PipelineConfig {
            thread_policy: ThreadPolicy::Pool,
            parallel_threshold: 8,
            ..PipelineConfig::default()
        });
        let mut cmd = RecordingCommandBuffer::new();
        main.draw(&s.graph, &res, &mut cmd);
        pool.draw(&s.graph, &res, &mut cmd);
        assert_eq!(main.culled(), pool.culled());
        assert_eq!(main.world_bound(), pool.world_bound());
    }

    #[test]
    fn shared_meshes_are_instanced() {
        let mut s = scene();
        for x in [-1.0, 0.0, 1.0] {
            cube(&mut s.graph, "c", Vec3::new(x, 0.0, 0.0));
        }
        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&s.graph, &RenderResources::with_builtins(), &mut cmd);

        let instanced: Vec<&Command> = cmd
            .commands()
            .iter()
            .filter(|c| matches!(c, Command::DrawMeshInstanced { .. }))
            .collect();
        assert_eq!(instanced.len(), 1);
        assert_eq!(stats.submit.instances, 4);
        assert_eq!(stats.submit.skipped, 0);
        // Last command draws the composite quad.
        assert!(matches!(
            cmd.commands().last(),
            Some(Command::DrawMesh { material, .. }) if *material == internal::BLIT_MATERIAL
        ));
    }

    #[test]
    fn passes_run_in_insertion_order() {
        let s = scene();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = PipelineContext::new(PipelineConfig::default());
        pipeline.insert_render_pass(probe("a", &log), None);
        pipeline.insert_render_pass(probe("c", &log), None);
        pipeline.insert_render_pass(probe("b", &log), Some("c"));
        pipeline.insert_render_pass(probe("d", &log), Some("unknown"));
        assert_eq!(pipeline.pass_names(), vec!["a", "b", "c", "d"]);

        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&s.graph, &RenderResources::with_builtins(), &mut cmd);
        assert_eq!(stats.passes, 4);
        assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);

        log.borrow_mut().clear();
        pipeline.resize(320, 200);
        assert_eq!(log.borrow().len(), 4);
        assert_eq!(log.borrow()[0], "a:320x200");
        assert!(pipeline.remove_render_pass("b").is_some());
        assert_eq!(pipeline.pass_names(), vec!["a", "c", "d"]);
    }

    #[test]
    fn empty_chain_clears_target() {
        let s = scene();
        let res = RenderResources::with_builtins();
        let mut pipeline = PipelineContext::new(PipelineConfig::default());
        let mut cmd = RecordingCommandBuffer::new();
        pipeline.draw(&s.graph, &res, &mut cmd);
        assert!(matches!(cmd.commands()[0], Command::SetRenderTarget(None)));
        assert!(matches!(cmd.commands()[1], Command::ClearRenderTarget { .. }));
        assert_eq!(cmd.commands().len(), 2);

        let mut quiet = PipelineContext::new(PipelineConfig {
            clear_on_empty: false,
            ..PipelineConfig::default()
        });
        quiet.draw(&s.graph, &res, &mut cmd);
        assert!(cmd.commands().is_empty());
    }

    #[test]
    fn disabled_nodes_and_missing_resources_are_left_out() {
        let mut s = scene();
        let hidden = cube(&mut s.graph, "hidden", Vec3::ZERO);
        s.graph.set_enabled(hidden, false).unwrap();
        let broken = s.graph.create_node("broken", None).unwrap();
        s.graph
            .attach(
                broken,
                MeshRender {
                    mesh: Some(ObjectId::new()),
                    material: None,
                    sub_mesh: 0,
                },
            )
            .unwrap();
        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&s.graph, &RenderResources::with_builtins(), &mut cmd);
        assert_eq!(stats.renderables, 0);
        assert_eq!(stats.missing_resources, 1);
    }

    #[test]
    fn disabled_camera_falls_back_or_skips() {
        let mut s = scene();
        let mut pipeline = PipelineContext::new(PipelineConfig::default());
        let res = RenderResources::with_builtins();
        let mut cmd = RecordingCommandBuffer::new();

        let other_node = s.graph.create_node("second", None).unwrap();
        let other = s.graph.attach(other_node, Camera::default()).unwrap();
        pipeline.set_camera(Some(other));
        pipeline.draw(&s.graph, &res, &mut cmd);
        assert_eq!(pipeline.camera(), Some(other));

        s.graph.set_enabled(other_node, false).unwrap();
        pipeline.draw(&s.graph, &res, &mut cmd);
        assert_eq!(pipeline.camera(), Some(s.camera));

        s.graph.set_enabled(s.camera_node, false).unwrap();
        pipeline.camera_reset();
        assert!(pipeline.draw(&s.graph, &res, &mut cmd).skipped_frame);
        assert_eq!(pipeline.camera(), None);
    }

    #[test]
    fn lights_and_widgets_are_collected() {
        let mut s = scene();
        cube(&mut s.graph, "ground", Vec3::ZERO);
        let sun = s.graph.create_node("sun", None).unwrap();
        s.graph
            .attach(
                sun,
                Light {
                    kind: LightKind::Directional,
                    casts_shadows: true,
                    ..Light::default()
                },
            )
            .unwrap();
        let hud = s.graph.create_node("hud", None).unwrap();
        s.graph.attach(hud, Widget::default()).unwrap();

        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&s.graph, &RenderResources::with_builtins(), &mut cmd);
        assert_eq!(stats.lights, 1);
        assert_eq!(stats.widgets, 1);
        assert!(pipeline.lights()[0].direction.abs_diff_eq(Vec3::NEG_Z, 1e-5));

        let names: Vec<&str> = pipeline.render_textures().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["final", "shadow"]);
        assert!(cmd.commands().iter().any(
            |c| matches!(c, Command::DrawMesh { layer, .. } if *layer == Layers::UI)
        ));
    }

    #[test]
    fn composite_goes_to_offscreen_target() {
        let mut s = scene();
        cube(&mut s.graph, "a", Vec3::ZERO);
        let mut res = RenderResources::with_builtins();
        let thumb = ObjectId::new();
        res.insert_render_target(
            thumb,
            crate::resources::RenderTarget {
                name: "thumbnail".into(),
                width: 128,
                height: 128,
            },
        );
        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
        pipeline.set_target(Some(thumb));
        pipeline.set_max_texture(256);
        let mut cmd = RecordingCommandBuffer::new();
        pipeline.draw(&s.graph, &res, &mut cmd);

        assert!(cmd
            .commands()
            .contains(&Command::SetRenderTarget(Some(thumb))));
        assert!(cmd
            .commands()
            .contains(&Command::SetViewport(Rect::new(0, 0, 128, 128))));
        let final_buffer = pipeline
            .render_textures()
            .into_iter()
            .find(|(n, _)| *n == FINAL_BUFFER)
            .map(|(_, b)| b)
            .unwrap();
        assert_eq!(final_buffer.width, 256);
    }

    #[test]
    fn bounds_gizmo_is_drawn() {
        let mut s = scene();
        cube(&mut s.graph, "a", Vec3::ZERO);
        let mut pipeline = PipelineContext::with_default_passes(PipelineConfig {
            show_bounds: true,
            ..PipelineConfig::default()
        });
        let mut cmd = RecordingCommandBuffer::new();
        let stats = pipeline.draw(&s.graph, &RenderResources::with_builtins(), &mut cmd);
        assert_eq!(stats.gizmo_lines, 12);
        assert!(pipeline.gizmos_mut().is_empty());
    }
}
