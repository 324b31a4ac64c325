use std::any::Any;

use glam::{Vec3, Vec4};
use tessera_common::{Aabb, ObjectId, Transform};

use crate::reflect::Property;

/// Object-safe access to `Any` for every component.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behaviour attached to a node. Capabilities beyond plain data are
/// exposed through the `as_*` accessors; the defaults opt out.
pub trait Component: AsAny + Send + Sync + std::fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn clone_box(&self) -> Box<dyn Component>;

    /// Called once after `SceneGraph::add_component` attached the component.
    /// Not called for components restored by cloning or document loading.
    fn on_attached(&mut self) {}

    /// Called when the owning node's enabled-in-hierarchy state flips.
    fn on_hierarchy_enabled(&mut self, _enabled: bool) {}

    fn is_updatable(&self) -> bool {
        false
    }

    fn update(&mut self, _ctx: &mut UpdateContext) {}

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        None
    }

    fn as_light(&self) -> Option<&dyn LightSource> {
        None
    }

    fn as_widget(&self) -> Option<&dyn UiWidget> {
        None
    }
}

impl<'a> dyn Component + 'a {
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Static side of a component: its registered name and property table.
pub trait ComponentType: Component + Default + Clone {
    const TYPE_NAME: &'static str;

    fn properties() -> Vec<Property<Self>>;
}

/// Per-frame input handed to updatable components. `transform` is the
/// owning node's local transform and is written back after the call.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext {
    pub dt: f32,
    pub transform: Transform,
}

/// What a renderable wants drawn; resources are referenced by id and
/// resolved by the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawDesc {
    pub mesh: Option<ObjectId>,
    pub material: Option<ObjectId>,
    pub sub_mesh: u32,
    /// Local-space bounds when the component knows them itself; `None`
    /// defers to the mesh resource.
    pub local_bounds: Option<Aabb>,
    pub priority: i32,
}

pub trait Renderable {
    fn draw_desc(&self) -> DrawDesc;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => Self::Point,
            2 => Self::Spot,
            _ => Self::Directional,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Self::Directional => 0,
            Self::Point => 1,
            Self::Spot => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDesc {
    pub kind: LightKind,
    pub color: Vec4,
    pub intensity: f32,
    pub range: f32,
    pub casts_shadows: bool,
}

pub trait LightSource {
    fn light_desc(&self) -> LightDesc;
}

/// Screen-space UI element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetDesc {
    /// x, y, width, height in pixels.
    pub rect: Vec4,
    pub color: Vec4,
    pub texture: Option<ObjectId>,
    pub material: Option<ObjectId>,
    pub depth: f32,
}

pub trait UiWidget {
    fn widget_desc(&self) -> WidgetDesc;
}

/// Half-extent of a `size`-sized quad in the XY plane.
pub(crate) fn quad_bounds(size: Vec3) -> Aabb {
    Aabb::from_center_extents(Vec3::ZERO, Vec3::new(size.x * 0.5, size.y * 0.5, 0.0))
}
