//! Render passes and the context they draw through.

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use tessera_common::{Aabb, Layers, ObjectId};
use tessera_scene::LightKind;
use tessera_scene::components::builtin;

use crate::command_buffer::{CommandBuffer, Rect};
use crate::frame::{BufferTable, CameraState, LightItem, RenderItem, WidgetItem};
use crate::resources::RenderResources;

/// Name of the buffer composited into the pipeline's target.
pub const FINAL_BUFFER: &str = "final";
pub const SHADOW_BUFFER: &str = "shadow";

/// Everything a pass may read or write during one frame.
pub struct PassContext<'a> {
    pub cmd: &'a mut dyn CommandBuffer,
    pub buffers: &'a mut BufferTable,
    pub resources: &'a RenderResources,
    pub camera: &'a CameraState,
    pub culled: &'a [RenderItem],
    pub lights: &'a [LightItem],
    pub widgets: &'a [WidgetItem],
    pub world_bound: Aabb,
    pub viewport: (u32, u32),
    pub ui_as_scene_view: bool,
    pub shadow_resolution: u32,
}

impl PassContext<'_> {
    pub fn draw_renderers(&mut self, layer: Layers, items: &[RenderItem]) -> usize {
        draw_renderers(&mut *self.cmd, layer, items)
    }

    /// Bind the shared colour buffer and the camera matrices.
    fn bind_final(&mut self) {
        let buffer = self
            .buffers
            .ensure(FINAL_BUFFER, self.viewport.0, self.viewport.1);
        self.cmd.set_render_target(Some(buffer.id));
        self.cmd
            .set_viewport(Rect::new(0, 0, buffer.width, buffer.height));
        self.cmd
            .set_view_projection(self.camera.view, self.camera.projection);
    }
}

/// A stage of the frame. Passes run in insertion order and share the
/// command buffer and buffer table.
pub trait RenderPass {
    fn name(&self) -> &str;

    fn draw(&mut self, ctx: &mut PassContext<'_>);

    /// Viewport changed.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Submit every item on `layer`, merging items that share mesh, material
/// and sub-mesh into one instanced draw. Batches keep the order in which
/// their first item appears. Returns the number of draw calls issued.
pub fn draw_renderers(cmd: &mut dyn CommandBuffer, layer: Layers, items: &[RenderItem]) -> usize {
    type Key = (Option<ObjectId>, Option<ObjectId>, u32);
    let mut order: Vec<Key> = Vec::new();
    let mut batches: HashMap<Key, Vec<Mat4>> = HashMap::new();
    for item in items.iter().filter(|i| i.layers.intersects(layer)) {
        let key = (item.mesh, item.material, item.sub_mesh);
        batches
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(item.transform);
    }
    for key in &order {
        let transforms = &batches[key];
        let (mesh, material, sub_mesh) = *key;
        if let [single] = transforms.as_slice() {
            cmd.draw_mesh(mesh, material, sub_mesh, *single, layer);
        } else {
            cmd.draw_mesh_instanced(mesh, material, sub_mesh, transforms, layer);
        }
    }
    order.len()
}

/// Depth from shadow-casting directional lights into the `"shadow"` buffer.
#[derive(Debug, Default)]
pub struct ShadowPass;

impl RenderPass for ShadowPass {
    fn name(&self) -> &str {
        "shadow"
    }

    fn draw(&mut self, ctx: &mut PassContext<'_>) {
        let casters: Vec<RenderItem> = ctx
            .culled
            .iter()
            .filter(|i| !i.translucent && i.layers.contains(Layers::SHADOWCAST))
            .copied()
            .collect();
        let lights: Vec<LightItem> = ctx
            .lights
            .iter()
            .filter(|l| l.desc.casts_shadows && l.desc.kind == LightKind::Directional)
            .copied()
            .collect();
        if casters.is_empty() || lights.is_empty() || !ctx.world_bound.is_valid() {
            return;
        }
        let size = ctx.shadow_resolution;
        let buffer = ctx.buffers.ensure(SHADOW_BUFFER, size, size);
        ctx.cmd.set_render_target(Some(buffer.id));
        ctx.cmd
            .set_viewport(Rect::new(0, 0, buffer.width, buffer.height));
        ctx.cmd.clear_render_target(None, Some(1.0));

        let center = ctx.world_bound.center();
        let radius = ctx.world_bound.extents().length().max(0.01);
        for light in lights {
            let dir = light.direction.try_normalize().unwrap_or(Vec3::NEG_Y);
            let up = if dir.abs().abs_diff_eq(Vec3::Y, 1e-3) {
                Vec3::Z
            } else {
                Vec3::Y
            };
            let view = Mat4::look_to_rh(center - dir * radius * 2.0, dir, up);
            let projection =
                Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0);
            ctx.cmd.set_view_projection(view, projection);
            ctx.draw_renderers(Layers::SHADOWCAST, &casters);
        }
        ctx.cmd.reset_view_projection();
    }
}

/// Opaque geometry into `"final"`, sorted by priority, batched.
#[derive(Debug, Default)]
pub struct OpaquePass;

impl RenderPass for OpaquePass {
    fn name(&self) -> &str {
        "opaque"
    }

    fn draw(&mut self, ctx: &mut PassContext<'_>) {
        ctx.bind_final();
        ctx.cmd
            .clear_render_target(Some(ctx.camera.clear_color), Some(1.0));
        let mut items: Vec<RenderItem> = ctx.culled.iter().filter(|i| !i.translucent).copied().collect();
        items.sort_by_key(|i| i.priority);
        ctx.draw_renderers(Layers::DEFAULT, &items);
    }
}

/// Translucent geometry, back to front; never batched since order matters.
#[derive(Debug, Default)]
pub struct TranslucentPass;

impl RenderPass for TranslucentPass {
    fn name(&self) -> &str {
        "translucent"
    }

    fn draw(&mut self, ctx: &mut PassContext<'_>) {
        let eye = ctx.camera.position;
        let mut items: Vec<RenderItem> = ctx
            .culled
            .iter()
            .filter(|i| i.translucent && i.layers.contains(Layers::TRANSLUCENT))
            .copied()
            .collect();
        if items.is_empty() {
            return;
        }
        let depth = |item: &RenderItem| {
            let center = if item.bounds.is_valid() {
                item.bounds.center()
            } else {
                item.transform.transform_point3(Vec3::ZERO)
            };
            center.distance_squared(eye)
        };
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(depth(b).total_cmp(&depth(a)))
        });
        ctx.bind_final();
        for item in &items {
            ctx.cmd.draw_mesh(
                item.mesh,
                item.material,
                item.sub_mesh,
                item.transform,
                Layers::TRANSLUCENT,
            );
        }
    }
}

/// Screen-space widgets, lowest depth first, clipped to the viewport.
#[derive(Debug, Default)]
pub struct UiPass;

impl RenderPass for UiPass {
    fn name(&self) -> &str {
        "ui"
    }

    fn draw(&mut self, ctx: &mut PassContext<'_>) {
        if ctx.widgets.is_empty() {
            return;
        }
        let mut widgets: Vec<WidgetItem> = ctx.widgets.to_vec();
        widgets.sort_by(|a, b| a.desc.depth.total_cmp(&b.desc.depth));

        ctx.bind_final();
        let (w, h) = ctx.viewport;
        if !ctx.ui_as_scene_view {
            let projection = Mat4::orthographic_rh(0.0, w as f32, h as f32, 0.0, -1.0, 1.0);
            ctx.cmd.set_view_projection(Mat4::IDENTITY, projection);
        }
        ctx.cmd.enable_scissor(Rect::new(0, 0, w, h));
        for widget in &widgets {
            let r = widget.desc.rect;
            let transform = Mat4::from_translation(Vec3::new(r.x + r.z * 0.5, r.y + r.w * 0.5, 0.0))
                * Mat4::from_scale(Vec3::new(r.z, r.w, 1.0));
            ctx.cmd.draw_mesh(
                Some(builtin::PLANE_MESH),
                Some(widget.desc.material.unwrap_or(builtin::SPRITE_MATERIAL)),
                0,
                transform,
                Layers::UI,
            );
        }
        ctx.cmd.disable_scissor();
        ctx.cmd.reset_view_projection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_buffer::{Command, RecordingCommandBuffer};

    fn item(mesh: ObjectId, material: ObjectId, x: f32) -> RenderItem {
        let transform = Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
        RenderItem {
            component: ObjectId::new(),
            node: ObjectId::new(),
            mesh: Some(mesh),
            material: Some(material),
            sub_mesh: 0,
            transform,
            bounds: Aabb::from_center_extents(Vec3::new(x, 0.0, 0.0), Vec3::splat(0.5)),
            layers: Layers::default(),
            priority: 0,
            translucent: false,
        }
    }

    #[test]
    fn batching_merges_shared_resources() {
        let (m1, m2, mat) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        let items = vec![
            item(m1, mat, 0.0),
            item(m2, mat, 1.0),
            item(m1, mat, 2.0),
            item(m1, mat, 3.0),
        ];
        let mut cmd = RecordingCommandBuffer::new();
        cmd.begin();
        let calls = draw_renderers(&mut cmd, Layers::DEFAULT, &items);
        cmd.end();

        assert_eq!(calls, 2);
        match &cmd.commands()[0] {
            Command::DrawMeshInstanced { mesh, transforms, .. } => {
                assert_eq!(*mesh, m1);
                assert_eq!(transforms.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(cmd.commands()[1], Command::DrawMesh { mesh, .. } if mesh == m2));
        assert_eq!(cmd.stats().instances, 4);
    }

    #[test]
    fn batching_filters_by_layer() {
        let mut ui_only = item(ObjectId::new(), ObjectId::new(), 0.0);
        ui_only.layers = Layers::UI;
        let mut cmd = RecordingCommandBuffer::new();
        cmd.begin();
        assert_eq!(draw_renderers(&mut cmd, Layers::DEFAULT, &[ui_only]), 0);
        cmd.end();
        assert!(cmd.commands().is_empty());
    }
}
