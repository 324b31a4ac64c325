//! GPU-side resource registry, keyed by the same ids components reference.
//!
//! Only metadata lives here: bounds for culling, blend mode for pass
//! selection, sizes for render targets. Backends own the actual buffers.

use std::collections::BTreeMap;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use tessera_common::{Aabb, ObjectId};
use tessera_scene::components::builtin;
use uuid::Uuid;

/// Ids of resources only the pipeline itself draws with.
pub mod internal {
    use super::*;

    pub const BLIT_MATERIAL: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0101));
    pub const GIZMO_MATERIAL: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0102));
    /// Unit segment from the origin to +X.
    pub const LINE_MESH: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0103));
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub bounds: Aabb,
    pub vertex_count: u32,
    pub index_count: u32,
    pub sub_meshes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    /// Translucent materials are drawn after opaque ones, back to front.
    pub translucent: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            base_color: Vec4::new(0.8, 0.8, 0.8, 1.0),
            translucent: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Texture {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Offscreen target, e.g. for thumbnails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderTarget {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Resource {
    Mesh(Mesh),
    Material(Material),
    Texture(Texture),
    RenderTarget(RenderTarget),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderResources {
    resources: BTreeMap<ObjectId, Resource>,
}

impl RenderResources {
    /// Empty registry; nothing resolves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with every built-in mesh and material.
    pub fn with_builtins() -> Self {
        let mut res = Self::new();
        let unit = Aabb::from_center_extents(Vec3::ZERO, Vec3::new(0.5, 0.5, 0.0));
        res.insert_mesh(
            builtin::PLANE_MESH,
            Mesh {
                name: "plane".into(),
                bounds: unit,
                vertex_count: 4,
                index_count: 6,
                sub_meshes: 1,
            },
        );
        res.insert_mesh(
            builtin::CUBE_MESH,
            Mesh {
                name: "cube".into(),
                bounds: Aabb::from_center_extents(Vec3::ZERO, Vec3::splat(0.5)),
                vertex_count: 24,
                index_count: 36,
                sub_meshes: 1,
            },
        );
        res.insert_mesh(
            internal::LINE_MESH,
            Mesh {
                name: "line".into(),
                bounds: Aabb::new(Vec3::ZERO, Vec3::X),
                vertex_count: 2,
                index_count: 2,
                sub_meshes: 1,
            },
        );
        res.insert_material(builtin::DEFAULT_MATERIAL, Material::default());
        res.insert_material(
            builtin::SPRITE_MATERIAL,
            Material {
                name: "sprite".into(),
                base_color: Vec4::ONE,
                translucent: true,
            },
        );
        res.insert_material(
            internal::BLIT_MATERIAL,
            Material {
                name: "blit".into(),
                base_color: Vec4::ONE,
                translucent: false,
            },
        );
        res.insert_material(
            internal::GIZMO_MATERIAL,
            Material {
                name: "gizmo".into(),
                base_color: Vec4::new(0.0, 1.0, 0.0, 1.0),
                translucent: true,
            },
        );
        res
    }

    pub fn insert_mesh(&mut self, id: ObjectId, mesh: Mesh) {
        self.resources.insert(id, Resource::Mesh(mesh));
    }

    pub fn insert_material(&mut self, id: ObjectId, material: Material) {
        self.resources.insert(id, Resource::Material(material));
    }

    pub fn insert_texture(&mut self, id: ObjectId, texture: Texture) {
        self.resources.insert(id, Resource::Texture(texture));
    }

    pub fn insert_render_target(&mut self, id: ObjectId, target: RenderTarget) {
        self.resources.insert(id, Resource::RenderTarget(target));
    }

    /// Register a mesh under a fresh id.
    pub fn add_mesh(&mut self, mesh: Mesh) -> ObjectId {
        let id = ObjectId::new();
        self.insert_mesh(id, mesh);
        id
    }

    pub fn add_material(&mut self, material: Material) -> ObjectId {
        let id = ObjectId::new();
        self.insert_material(id, material);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Resource> {
        self.resources.remove(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn mesh(&self, id: ObjectId) -> Option<&Mesh> {
        match self.resources.get(&id) {
            Some(Resource::Mesh(m)) => Some(m),
            _ => None,
        }
    }

    pub fn material(&self, id: ObjectId) -> Option<&Material> {
        match self.resources.get(&id) {
            Some(Resource::Material(m)) => Some(m),
            _ => None,
        }
    }

    pub fn texture(&self, id: ObjectId) -> Option<&Texture> {
        match self.resources.get(&id) {
            Some(Resource::Texture(t)) => Some(t),
            _ => None,
        }
    }

    pub fn render_target(&self, id: ObjectId) -> Option<&RenderTarget> {
        match self.resources.get(&id) {
            Some(Resource::RenderTarget(t)) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
