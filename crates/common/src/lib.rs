//! Shared types for the tessera workspace: object identity, transforms,
//! bounds and layer masks.

mod types;

pub use types::{Aabb, HideFlags, Layers, ObjectId, Transform};
