//! Render pipeline: gathers renderables from a scene graph, culls them
//! against the camera frustum and records passes into a backend-neutral
//! command buffer.
//!
//! # Invariants
//! - The pipeline never mutates the scene graph.
//! - A frame without an enabled camera submits nothing.
//! - Only culling runs off the calling thread; results are merged in order
//!   before any command is recorded.

mod command_buffer;
mod config;
mod frame;
mod frustum;
mod gizmos;
mod passes;
mod pipeline;
mod resources;
mod system;

pub use command_buffer::{Command, CommandBuffer, RecordingCommandBuffer, Rect, SubmitStats};
pub use config::{ConfigError, PipelineConfig};
pub use frame::{BufferTable, CameraState, LightItem, RenderBuffer, RenderItem, WidgetItem};
pub use frustum::{Bounded, Frustum, Plane, frustum_corners, frustum_culling};
pub use gizmos::{GizmoLine, Gizmos};
pub use passes::{
    FINAL_BUFFER, OpaquePass, PassContext, RenderPass, SHADOW_BUFFER, ShadowPass, TranslucentPass,
    UiPass, draw_renderers,
};
pub use pipeline::{FrameStats, PipelineContext};
pub use resources::{Material, Mesh, RenderResources, RenderTarget, Resource, Texture, internal};
pub use system::RenderSystem;
