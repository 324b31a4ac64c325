//! Scene graph: nodes, components, reflection tables, cloning and the
//! document form used by persistence and prefabs.

mod clone;
mod component;
pub mod components;
mod document;
mod error;
mod graph;
mod reflect;
mod system;

pub use clone::{CloneOptions, CloneOutcome, LinkMode};
pub use component::{
    AsAny, Component, ComponentType, DrawDesc, LightDesc, LightKind, LightSource, Renderable,
    UiWidget, UpdateContext, WidgetDesc,
};
pub use document::{
    DOCUMENT_VERSION, Document, LoadOptions, LoadOutcome, NODE_RECORD, ObjectRecord,
};
pub use error::SceneError;
pub use graph::{ComponentId, NodeData, NodeId, PrefabLink, SceneEvent, SceneGraph};
pub use reflect::{Property, PropertyDescriptor, PropertyMap, TypeInfo, TypeRegistry, Value, ValueKind};
pub use system::{Scheduler, System, ThreadPolicy};
