//! Per-frame data gathered from the scene graph.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3, Vec4};
use tessera_common::{Aabb, Layers, ObjectId};
use tessera_scene::components::Camera;
use tessera_scene::{ComponentId, LightDesc, NodeId, WidgetDesc};

use crate::frustum::{Bounded, frustum_corners};

/// One drawable, resolved against resources and placed in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderItem {
    pub component: ComponentId,
    pub node: NodeId,
    pub mesh: Option<ObjectId>,
    pub material: Option<ObjectId>,
    pub sub_mesh: u32,
    pub transform: Mat4,
    pub bounds: Aabb,
    pub layers: Layers,
    pub priority: i32,
    pub translucent: bool,
}

impl Bounded for RenderItem {
    fn world_bounds(&self) -> Aabb {
        self.bounds
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightItem {
    pub component: ComponentId,
    pub node: NodeId,
    pub desc: LightDesc,
    pub position: Vec3,
    /// Unit vector the light points along (node's -Z).
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetItem {
    pub component: ComponentId,
    pub node: NodeId,
    pub desc: WidgetDesc,
}

/// Camera matrices for the frame being drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub component: ComponentId,
    pub node: NodeId,
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub clear_color: Vec4,
    pub corners: [Vec3; 8],
}

impl CameraState {
    /// `world` is the camera node's model matrix; the view is its inverse.
    /// A non-zero `viewport` overrides the camera's own aspect ratio.
    pub fn new(
        component: ComponentId,
        node: NodeId,
        camera: &Camera,
        world: Mat4,
        viewport: (u32, u32),
    ) -> Self {
        let mut camera = camera.clone();
        if viewport.0 > 0 && viewport.1 > 0 {
            camera.aspect = viewport.0 as f32 / viewport.1 as f32;
        }
        let view = world.inverse();
        let projection = camera.projection_matrix();
        Self {
            component,
            node,
            view,
            projection,
            position: world.transform_point3(Vec3::ZERO),
            clear_color: camera.clear_color,
            corners: frustum_corners(projection * view),
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// An intermediate buffer owned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBuffer {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Named intermediate buffers shared by the passes of one pipeline.
#[derive(Debug, Clone)]
pub struct BufferTable {
    buffers: BTreeMap<String, RenderBuffer>,
    max_texture: u32,
}

impl BufferTable {
    pub fn new(max_texture: u32) -> Self {
        Self {
            buffers: BTreeMap::new(),
            max_texture: max_texture.max(1),
        }
    }

    /// Buffer `name` at the requested size (clamped to the texture limit),
    /// created on first use. Resizing keeps the id.
    pub fn ensure(&mut self, name: &str, width: u32, height: u32) -> RenderBuffer {
        let (width, height) = (
            width.clamp(1, self.max_texture),
            height.clamp(1, self.max_texture),
        );
        let entry = self.buffers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(name, width, height, "render buffer created");
            RenderBuffer {
                id: ObjectId::new(),
                width,
                height,
            }
        });
        entry.width = width;
        entry.height = height;
        *entry
    }

    pub fn get(&self, name: &str) -> Option<RenderBuffer> {
        self.buffers.get(name).copied()
    }

    /// Make `name` refer to the same buffer as `existing`. False when
    /// `existing` is unknown.
    pub fn alias(&mut self, name: &str, existing: &str) -> bool {
        match self.get(existing) {
            Some(buffer) => {
                self.buffers.insert(name.to_string(), buffer);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<RenderBuffer> {
        self.buffers.remove(name)
    }

    pub fn max_texture(&self) -> u32 {
        self.max_texture
    }

    /// Lower or raise the limit; existing buffers are clamped immediately.
    pub fn set_max_texture(&mut self, max: u32) {
        self.max_texture = max.max(1);
        for buffer in self.buffers.values_mut() {
            buffer.width = buffer.width.min(self.max_texture);
            buffer.height = buffer.height.min(self.max_texture);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RenderBuffer)> {
        self.buffers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_created_once_and_clamped() {
        let mut table = BufferTable::new(256);
        let a = table.ensure("final", 1024, 100);
        assert_eq!((a.width, a.height), (256, 100));
        let b = table.ensure("final", 64, 64);
        assert_eq!(a.id, b.id);
        assert_eq!(table.get("final").unwrap().width, 64);
        assert!(table.get("missing").is_none());
    }

    #[test]
    fn alias_shares_the_buffer() {
        let mut table = BufferTable::new(4096);
        let color = table.ensure("color", 8, 8);
        assert!(table.alias("final", "color"));
        assert_eq!(table.get("final").unwrap().id, color.id);
        assert!(!table.alias("x", "nope"));
    }

    #[test]
    fn lowering_the_limit_shrinks_buffers() {
        let mut table = BufferTable::new(4096);
        table.ensure("shadow", 2048, 2048);
        table.set_max_texture(512);
        assert_eq!(table.get("shadow").unwrap().width, 512);
    }

    #[test]
    fn camera_state_inverts_node_matrix() {
        let world = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        let state = CameraState::new(
            ObjectId::new(),
            ObjectId::new(),
            &Camera::default(),
            world,
            (200, 100),
        );
        assert!(state.position.abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));
        let p = state.view.transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
        // Far corners are wider than tall with a 2:1 viewport.
        let far = state.corners[7] - state.corners[4];
        assert!(far.x > far.y);
    }
}
