//! Built-in component types.

use glam::{Mat4, Quat, Vec3, Vec4};
use tessera_common::{ObjectId, Transform};
use uuid::Uuid;

use crate::component::{
    Component, ComponentType, DrawDesc, LightDesc, LightKind, LightSource, Renderable, UiWidget,
    UpdateContext, WidgetDesc, quad_bounds,
};
use crate::reflect::{Property, TypeRegistry, Value, ValueKind};

/// Well-known resource ids the render side registers at startup.
pub mod builtin {
    use super::*;

    pub const DEFAULT_MATERIAL: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0001));
    pub const SPRITE_MATERIAL: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0002));
    pub const PLANE_MESH: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0003));
    pub const CUBE_MESH: ObjectId =
        ObjectId(Uuid::from_u128(0x7e55_e4a0_0000_4000_8000_0000_0000_0004));
}

pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    registry.register::<TransformComponent>();
    registry.register::<Camera>();
    registry.register::<MeshRender>();
    registry.register::<SpriteRender>();
    registry.register::<Light>();
    registry.register::<Widget>();
    registry.register::<Rotator>();
}

fn set_f32(slot: &mut f32, v: &Value) -> bool {
    v.as_float().map(|x| *slot = x).is_some()
}

fn set_bool(slot: &mut bool, v: &Value) -> bool {
    v.as_bool().map(|x| *slot = x).is_some()
}

fn set_vec3(slot: &mut Vec3, v: &Value) -> bool {
    v.as_vec3().map(|x| *slot = x).is_some()
}

fn set_vec4(slot: &mut Vec4, v: &Value) -> bool {
    v.as_vec4().map(|x| *slot = x).is_some()
}

fn set_resource(slot: &mut Option<ObjectId>, v: &Value) -> bool {
    match v {
        Value::Resource(id) => {
            *slot = *id;
            true
        }
        _ => false,
    }
}

/// Local pose of a node. Every node has at most one.
#[derive(Debug, Clone, Default)]
pub struct TransformComponent {
    pub local: Transform,
}

impl Component for TransformComponent {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

impl ComponentType for TransformComponent {
    const TYPE_NAME: &'static str = "Transform";

    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new(
                "position",
                ValueKind::Vec3,
                |c| c.local.position.into(),
                |c, v| set_vec3(&mut c.local.position, v),
            ),
            Property::new(
                "quaternion",
                ValueKind::Quat,
                |c| c.local.rotation.into(),
                |c, v| v.as_quat().map(|q| c.local.rotation = q).is_some(),
            ),
            Property::new(
                "scale",
                ValueKind::Vec3,
                |c| c.local.scale.into(),
                |c, v| set_vec3(&mut c.local.scale, v),
            ),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub focal: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    pub orthographic: bool,
    pub ortho_size: f32,
    pub clear_color: Vec4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            focal: 1.0,
            fov: 45.0,
            near: 0.1,
            far: 1000.0,
            aspect: 1.0,
            orthographic: false,
            ortho_size: 1.0,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}

impl Camera {
    pub fn projection_matrix(&self) -> Mat4 {
        if self.orthographic {
            let h = self.ortho_size * 0.5;
            let w = h * self.aspect;
            Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
        } else {
            Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
        }
    }
}

impl Component for Camera {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

impl ComponentType for Camera {
    const TYPE_NAME: &'static str = "Camera";

    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new("focal", ValueKind::Float, |c| Value::Float(c.focal), |c, v| {
                set_f32(&mut c.focal, v)
            }),
            Property::new("fov", ValueKind::Float, |c| Value::Float(c.fov), |c, v| {
                set_f32(&mut c.fov, v)
            }),
            Property::new("near", ValueKind::Float, |c| Value::Float(c.near), |c, v| {
                set_f32(&mut c.near, v)
            }),
            Property::new("far", ValueKind::Float, |c| Value::Float(c.far), |c, v| {
                set_f32(&mut c.far, v)
            }),
            Property::new("ratio", ValueKind::Float, |c| Value::Float(c.aspect), |c, v| {
                set_f32(&mut c.aspect, v)
            }),
            Property::new(
                "orthographic",
                ValueKind::Bool,
                |c| Value::Bool(c.orthographic),
                |c, v| set_bool(&mut c.orthographic, v),
            ),
            Property::new(
                "size",
                ValueKind::Float,
                |c| Value::Float(c.ortho_size),
                |c, v| set_f32(&mut c.ortho_size, v),
            ),
            Property::new(
                "color",
                ValueKind::Vec4,
                |c| c.clear_color.into(),
                |c, v| set_vec4(&mut c.clear_color, v),
            ),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct MeshRender {
    pub mesh: Option<ObjectId>,
    pub material: Option<ObjectId>,
    pub sub_mesh: u32,
}

impl Component for MeshRender {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn on_attached(&mut self) {
        if self.material.is_none() {
            self.material = Some(builtin::DEFAULT_MATERIAL);
        }
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for MeshRender {
    fn draw_desc(&self) -> DrawDesc {
        DrawDesc {
            mesh: self.mesh,
            material: self.material,
            sub_mesh: self.sub_mesh,
            local_bounds: None,
            priority: 0,
        }
    }
}

impl ComponentType for MeshRender {
    const TYPE_NAME: &'static str = "MeshRender";

    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new(
                "mesh",
                ValueKind::Resource,
                |c| Value::Resource(c.mesh),
                |c, v| set_resource(&mut c.mesh, v),
            ),
            Property::new(
                "material",
                ValueKind::Resource,
                |c| Value::Resource(c.material),
                |c, v| set_resource(&mut c.material, v),
            ),
            Property::new(
                "subMesh",
                ValueKind::Int,
                |c| Value::Int(i64::from(c.sub_mesh)),
                |c, v| {
                    v.as_int()
                        .and_then(|i| u32::try_from(i).ok())
                        .map(|i| c.sub_mesh = i)
                        .is_some()
                },
            ),
        ]
    }
}

/// Textured quad drawn with the shared plane mesh.
#[derive(Debug, Clone)]
pub struct SpriteRender {
    pub texture: Option<ObjectId>,
    pub material: Option<ObjectId>,
    pub size: Vec3,
    pub color: Vec4,
    pub layer: i32,
}

impl Default for SpriteRender {
    fn default() -> Self {
        Self {
            texture: None,
            material: None,
            size: Vec3::new(1.0, 1.0, 0.0),
            color: Vec4::ONE,
            layer: 0,
        }
    }
}

impl Component for SpriteRender {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn on_attached(&mut self) {
        if self.material.is_none() {
            self.material = Some(builtin::SPRITE_MATERIAL);
        }
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for SpriteRender {
    fn draw_desc(&self) -> DrawDesc {
        DrawDesc {
            mesh: Some(builtin::PLANE_MESH),
            material: self.material,
            sub_mesh: 0,
            local_bounds: Some(quad_bounds(self.size)),
            priority: self.layer,
        }
    }
}

impl ComponentType for SpriteRender {
    const TYPE_NAME: &'static str = "SpriteRender";

    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new(
                "texture",
                ValueKind::Resource,
                |c| Value::Resource(c.texture),
                |c, v| set_resource(&mut c.texture, v),
            ),
            Property::new(
                "material",
                ValueKind::Resource,
                |c| Value::Resource(c.material),
                |c, v| set_resource(&mut c.material, v),
            ),
            Property::new("size", ValueKind::Vec3, |c| c.size.into(), |c, v| {
                set_vec3(&mut c.size, v)
            }),
            Property::new("color", ValueKind::Vec4, |c| c.color.into(), |c, v| {
                set_vec4(&mut c.color, v)
            }),
            Property::new(
                "layer",
                ValueKind::Int,
                |c| Value::Int(i64::from(c.layer)),
                |c, v| {
                    v.as_int()
                        .and_then(|i| i32::try_from(i).ok())
                        .map(|i| c.layer = i)
                        .is_some()
                },
            ),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec4,
    pub intensity: f32,
    pub range: f32,
    pub casts_shadows: bool,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            color: Vec4::ONE,
            intensity: 1.0,
            range: 10.0,
            casts_shadows: false,
        }
    }
}

impl Component for Light {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn as_light(&self) -> Option<&dyn LightSource> {
        Some(self)
    }
}

impl LightSource for Light {
    fn light_desc(&self) -> LightDesc {
        LightDesc {
            kind: self.kind,
            color: self.color,
            intensity: self.intensity,
            range: self.range,
            casts_shadows: self.casts_shadows,
        }
    }
}

impl ComponentType for Light {
    const TYPE_NAME: &'static str = "Light";

    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new(
                "type",
                ValueKind::Int,
                |c| Value::Int(c.kind.index()),
                |c, v| v.as_int().map(|i| c.kind = LightKind::from_index(i)).is_some(),
            ),
            Property::new("color", ValueKind::Vec4, |c| c.color.into(), |c, v| {
                set_vec4(&mut c.color, v)
            }),
            Property::new(
                "brightness",
                ValueKind::Float,
                |c| Value::Float(c.intensity),
                |c, v| set_f32(&mut c.intensity, v),
            ),
            Property::new("radius", ValueKind::Float, |c| Value::Float(c.range), |c, v| {
                set_f32(&mut c.range, v)
            }),
            Property::new(
                "castShadows",
                ValueKind::Bool,
                |c| Value::Bool(c.casts_shadows),
                |c, v| set_bool(&mut c.casts_shadows, v),
            ),
        ]
    }
}

/// Rectangle drawn by the UI pass.
#[derive(Debug, Clone)]
pub struct Widget {
    pub rect: Vec4,
    pub color: Vec4,
    pub texture: Option<ObjectId>,
    pub material: Option<ObjectId>,
    pub depth: f32,
}

impl Default for Widget {
    fn default() -> Self {
        Self {
            rect: Vec4::new(0.0, 0.0, 100.0, 100.0),
            color: Vec4::ONE,
            texture: None,
            material: None,
            depth: 0.0,
        }
    }
}

impl Component for Widget {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn on_attached(&mut self) {
        if self.material.is_none() {
            self.material = Some(builtin::SPRITE_MATERIAL);
        }
    }

    fn as_widget(&self) -> Option<&dyn UiWidget> {
        Some(self)
    }
}

impl UiWidget for Widget {
    fn widget_desc(&self) -> WidgetDesc {
        WidgetDesc {
            rect: self.rect,
            color: self.color,
            texture: self.texture,
            material: self.material,
            depth: self.depth,
        }
    }
}

impl ComponentType for Widget {
    const TYPE_NAME: &'static str = "Widget";

    fn properties() -> Vec<Property<Self>> {
        vec![
            Property::new("rect", ValueKind::Vec4, |c| c.rect.into(), |c, v| {
                set_vec4(&mut c.rect, v)
            }),
            Property::new("color", ValueKind::Vec4, |c| c.color.into(), |c, v| {
                set_vec4(&mut c.color, v)
            }),
            Property::new(
                "texture",
                ValueKind::Resource,
                |c| Value::Resource(c.texture),
                |c, v| set_resource(&mut c.texture, v),
            ),
            Property::new(
                "material",
                ValueKind::Resource,
                |c| Value::Resource(c.material),
                |c, v| set_resource(&mut c.material, v),
            ),
            Property::new("depth", ValueKind::Float, |c| Value::Float(c.depth), |c, v| {
                set_f32(&mut c.depth, v)
            }),
        ]
    }
}

/// Spins its node at a constant angular velocity (degrees per second).
#[derive(Debug, Clone, Default)]
pub struct Rotator {
    pub speed: Vec3,
}

impl Component for Rotator {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn is_updatable(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &mut UpdateContext) {
        let step = self.speed * ctx.dt;
        let delta = Quat::from_euler(
            glam::EulerRot::XYZ,
            step.x.to_radians(),
            step.y.to_radians(),
            step.z.to_radians(),
        );
        ctx.transform.rotation = (delta * ctx.transform.rotation).normalize();
    }
}

impl ComponentType for Rotator {
    const TYPE_NAME: &'static str = "Rotator";

    fn properties() -> Vec<Property<Self>> {
        vec![Property::new(
            "speed",
            ValueKind::Vec3,
            |c| c.speed.into(),
            |c, v| set_vec3(&mut c.speed, v),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_render_attach_hook_assigns_default_material() {
        let mut mesh = MeshRender::default();
        mesh.on_attached();
        assert_eq!(mesh.material, Some(builtin::DEFAULT_MATERIAL));

        let custom = ObjectId::new();
        let mut mesh = MeshRender {
            material: Some(custom),
            ..MeshRender::default()
        };
        mesh.on_attached();
        assert_eq!(mesh.material, Some(custom));
    }

    #[test]
    fn sprite_bounds_follow_size() {
        let sprite = SpriteRender {
            size: Vec3::new(4.0, 2.0, 0.0),
            ..SpriteRender::default()
        };
        let desc = sprite.draw_desc();
        let bounds = desc.local_bounds.unwrap();
        assert_eq!(bounds.extents(), Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(desc.mesh, Some(builtin::PLANE_MESH));
    }

    #[test]
    fn camera_projection_is_finite() {
        let cam = Camera::default();
        let p = cam.projection_matrix();
        assert!(p.is_finite());
        let ortho = Camera {
            orthographic: true,
            ..Camera::default()
        };
        assert!(ortho.projection_matrix().is_finite());
    }

    #[test]
    fn rotator_turns_transform() {
        let mut rotator = Rotator {
            speed: Vec3::new(0.0, 90.0, 0.0),
        };
        let mut ctx = UpdateContext {
            dt: 1.0,
            transform: Transform::default(),
        };
        rotator.update(&mut ctx);
        assert!(ctx.transform.rotation.angle_between(Quat::IDENTITY) > 1.0);
    }

    #[test]
    fn light_kind_survives_property_table() {
        let registry = TypeRegistry::with_builtins();
        let light: Box<dyn Component> = Box::new(Light {
            kind: LightKind::Spot,
            ..Light::default()
        });
        let props = registry.read_all(light.as_ref());
        let mut copy = registry.create("Light").unwrap();
        registry.write_all(copy.as_mut(), &props);
        assert_eq!(copy.downcast_ref::<Light>().unwrap().kind, LightKind::Spot);
    }
}
