//! Explicit property tables used in place of runtime reflection.
//!
//! Every component type lists its serializable properties once, at
//! registration time, as `(name, kind, getter, setter)` rows. Cloning,
//! document conversion and prefab reconciliation only ever talk to
//! components through these rows.

use std::collections::{BTreeMap, HashMap};

use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use tessera_common::ObjectId;

use crate::component::{Component, ComponentType};
use crate::error::SceneError;

/// Ordered property bag as stored in documents.
pub type PropertyMap = BTreeMap<String, Value>;

/// A tagged property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f32),
    String(String),
    Vec3([f32; 3]),
    Quat([f32; 4]),
    Vec4([f32; 4]),
    /// Weak reference to another object of the same graph (node or component).
    Ref(Option<ObjectId>),
    /// Link to an independently loadable resource (mesh, material, prefab...).
    Resource(Option<ObjectId>),
    List(Vec<Value>),
    Map(PropertyMap),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    Vec3,
    Quat,
    Vec4,
    Ref,
    Resource,
    List,
    Map,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Vec3(_) => ValueKind::Vec3,
            Self::Quat(_) => ValueKind::Quat,
            Self::Vec4(_) => ValueKind::Vec4,
            Self::Ref(_) => ValueKind::Ref,
            Self::Resource(_) => ValueKind::Resource,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Self::Vec3(v) => Some(Vec3::from_array(*v)),
            _ => None,
        }
    }

    pub fn as_quat(&self) -> Option<Quat> {
        match self {
            Self::Quat(v) => Some(Quat::from_array(*v)),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<Vec4> {
        match self {
            Self::Vec4(v) => Some(Vec4::from_array(*v)),
            _ => None,
        }
    }

    /// Target of a `Ref` value. `None` both for non-refs and for null refs.
    pub fn as_ref_id(&self) -> Option<ObjectId> {
        match self {
            Self::Ref(v) => *v,
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<ObjectId> {
        match self {
            Self::Resource(v) => *v,
            _ => None,
        }
    }

    /// Copy of the value with every `Ref` target, nested ones included,
    /// passed through `resolve`. A `None` from `resolve` nulls the reference.
    pub fn map_refs(&self, resolve: &dyn Fn(ObjectId) -> Option<ObjectId>) -> Value {
        match self {
            Self::Ref(Some(id)) => Self::Ref(resolve(*id)),
            Self::List(items) => Self::List(items.iter().map(|v| v.map_refs(resolve)).collect()),
            Self::Map(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.map_refs(resolve)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Whether this kind of value can hold references.
    pub fn kind_holds_refs(kind: ValueKind) -> bool {
        matches!(kind, ValueKind::Ref | ValueKind::List | ValueKind::Map)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v.to_array())
    }
}

impl From<Quat> for Value {
    fn from(v: Quat) -> Self {
        Self::Quat(v.to_array())
    }
}

impl From<Vec4> for Value {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v.to_array())
    }
}

/// One row of a component type's property table.
pub struct Property<T> {
    pub name: &'static str,
    pub kind: ValueKind,
    pub get: fn(&T) -> Value,
    /// Returns false when the value has the wrong shape; the component is
    /// left untouched in that case.
    pub set: fn(&mut T, &Value) -> bool,
}

impl<T> Property<T> {
    pub fn new(
        name: &'static str,
        kind: ValueKind,
        get: fn(&T) -> Value,
        set: fn(&mut T, &Value) -> bool,
    ) -> Self {
        Self {
            name,
            kind,
            get,
            set,
        }
    }
}

type Getter = Box<dyn Fn(&dyn Component) -> Option<Value> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Component, &Value) -> bool + Send + Sync>;

/// Type-erased property row, bound to a concrete component type at
/// registration.
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: ValueKind,
    get: Getter,
    set: Setter,
}

impl PropertyDescriptor {
    fn erase<T: ComponentType>(prop: Property<T>) -> Self {
        let get = prop.get;
        let set = prop.set;
        Self {
            name: prop.name,
            kind: prop.kind,
            get: Box::new(move |c: &dyn Component| c.downcast_ref::<T>().map(get)),
            set: Box::new(move |c: &mut dyn Component, v: &Value| {
                c.downcast_mut::<T>().is_some_and(|t| set(t, v))
            }),
        }
    }

    pub fn get(&self, component: &dyn Component) -> Option<Value> {
        (self.get)(component)
    }

    pub fn set(&self, component: &mut dyn Component, value: &Value) -> bool {
        (self.set)(component, value)
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Registration record for one component type.
#[derive(Debug)]
pub struct TypeInfo {
    pub name: &'static str,
    create: fn() -> Box<dyn Component>,
    pub properties: Vec<PropertyDescriptor>,
}

fn create_default<T: ComponentType>() -> Box<dyn Component> {
    Box::new(T::default())
}

/// Name-keyed table of every component type the graph can instantiate.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<&'static str, TypeInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the engine's built-in components.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::components::register_builtins(&mut registry);
        registry
    }

    /// Build the property table for `T` and make it creatable by name.
    /// Registering the same type twice replaces the earlier entry.
    pub fn register<T: ComponentType>(&mut self) {
        let info = TypeInfo {
            name: T::TYPE_NAME,
            create: create_default::<T>,
            properties: T::properties()
                .into_iter()
                .map(PropertyDescriptor::erase::<T>)
                .collect(),
        };
        self.types.insert(T::TYPE_NAME, info);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.types.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn info(&self, type_name: &str) -> Option<&TypeInfo> {
        self.types.get(type_name)
    }

    pub fn create(&self, type_name: &str) -> Result<Box<dyn Component>, SceneError> {
        self.types
            .get(type_name)
            .map(|info| (info.create)())
            .ok_or_else(|| SceneError::UnknownType(type_name.to_string()))
    }

    pub fn properties(&self, type_name: &str) -> &[PropertyDescriptor] {
        self.types
            .get(type_name)
            .map(|info| info.properties.as_slice())
            .unwrap_or(&[])
    }

    /// Snapshot every registered property of `component`.
    pub fn read_all(&self, component: &dyn Component) -> PropertyMap {
        self.properties(component.type_name())
            .iter()
            .filter_map(|p| p.get(component).map(|v| (p.name.to_string(), v)))
            .collect()
    }

    /// Apply every known key of `properties`; unknown keys are ignored.
    /// Returns the number of properties that were accepted.
    pub fn write_all(&self, component: &mut dyn Component, properties: &PropertyMap) -> usize {
        let mut applied = 0;
        for descriptor in self.properties(component.type_name()) {
            if let Some(value) = properties.get(descriptor.name) {
                if descriptor.set(component, value) {
                    applied += 1;
                } else {
                    tracing::debug!(
                        property = descriptor.name,
                        ?value,
                        "property rejected value of unexpected shape"
                    );
                }
            }
        }
        applied
    }
}
