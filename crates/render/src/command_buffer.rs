//! Backend-neutral command recording.

use glam::{Mat4, UVec3, Vec4};
use tessera_common::{Layers, ObjectId};

/// Scissor/viewport rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Everything a frame can ask of a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    DrawMesh {
        mesh: ObjectId,
        material: ObjectId,
        sub_mesh: u32,
        transform: Mat4,
        layer: Layers,
    },
    DrawMeshInstanced {
        mesh: ObjectId,
        material: ObjectId,
        sub_mesh: u32,
        transforms: Vec<Mat4>,
        layer: Layers,
    },
    /// `None` targets the screen.
    SetRenderTarget(Option<ObjectId>),
    SetViewProjection { view: Mat4, projection: Mat4 },
    ResetViewProjection,
    ClearRenderTarget {
        color: Option<Vec4>,
        depth: Option<f32>,
    },
    DispatchCompute { shader: ObjectId, groups: UVec3 },
    SetViewport(Rect),
    EnableScissor(Rect),
    DisableScissor,
}

/// Counters for one recorded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    pub commands: usize,
    pub draw_calls: usize,
    pub instanced_draws: usize,
    pub instances: usize,
    /// Calls dropped for a null mesh/material or for arriving outside
    /// `begin`/`end`.
    pub skipped: usize,
}

/// Command sink used by passes. Implementations never panic on bad input;
/// invalid calls are skipped and counted.
pub trait CommandBuffer {
    fn begin(&mut self);
    fn end(&mut self);

    fn draw_mesh(
        &mut self,
        mesh: Option<ObjectId>,
        material: Option<ObjectId>,
        sub_mesh: u32,
        transform: Mat4,
        layer: Layers,
    );

    fn draw_mesh_instanced(
        &mut self,
        mesh: Option<ObjectId>,
        material: Option<ObjectId>,
        sub_mesh: u32,
        transforms: &[Mat4],
        layer: Layers,
    );

    fn set_render_target(&mut self, target: Option<ObjectId>);
    fn set_view_projection(&mut self, view: Mat4, projection: Mat4);
    fn reset_view_projection(&mut self);
    fn clear_render_target(&mut self, color: Option<Vec4>, depth: Option<f32>);
    fn dispatch_compute(&mut self, shader: Option<ObjectId>, groups: UVec3);
    fn set_viewport(&mut self, rect: Rect);
    fn enable_scissor(&mut self, rect: Rect);
    fn disable_scissor(&mut self);

    fn stats(&self) -> SubmitStats;
}

/// Reference backend: keeps every accepted command in memory.
#[derive(Debug, Default)]
pub struct RecordingCommandBuffer {
    commands: Vec<Command>,
    recording: bool,
    stats: SubmitStats,
}

impl RecordingCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn push(&mut self, command: Command) {
        if !self.recording {
            self.skip("command outside begin/end");
            return;
        }
        self.stats.commands += 1;
        self.commands.push(command);
    }

    fn skip(&mut self, reason: &'static str) {
        self.stats.skipped += 1;
        tracing::debug!(reason, "backend submission skipped");
    }

    /// One line per command, for logs and the CLI.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            let line = match command {
                Command::DrawMesh { mesh, material, sub_mesh, .. } => format!(
                    "draw mesh={} material={} sub={sub_mesh}",
                    mesh.short(),
                    material.short()
                ),
                Command::DrawMeshInstanced {
                    mesh,
                    material,
                    transforms,
                    ..
                } => format!(
                    "draw_instanced mesh={} material={} count={}",
                    mesh.short(),
                    material.short(),
                    transforms.len()
                ),
                Command::SetRenderTarget(Some(t)) => format!("target {}", t.short()),
                Command::SetRenderTarget(None) => "target screen".to_string(),
                Command::SetViewProjection { .. } => "view_projection".to_string(),
                Command::ResetViewProjection => "reset_view_projection".to_string(),
                Command::ClearRenderTarget { color, depth } => {
                    format!("clear color={} depth={}", color.is_some(), depth.is_some())
                }
                Command::DispatchCompute { shader, groups } => {
                    format!("dispatch {} {groups}", shader.short())
                }
                Command::SetViewport(r) => {
                    format!("viewport {} {} {}x{}", r.x, r.y, r.width, r.height)
                }
                Command::EnableScissor(r) => {
                    format!("scissor {} {} {}x{}", r.x, r.y, r.width, r.height)
                }
                Command::DisableScissor => "scissor off".to_string(),
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

impl CommandBuffer for RecordingCommandBuffer {
    /// Starts a new frame; previous commands and counters are discarded.
    fn begin(&mut self) {
        self.commands.clear();
        self.stats = SubmitStats::default();
        self.recording = true;
    }

    fn end(&mut self) {
        self.recording = false;
    }

    fn draw_mesh(
        &mut self,
        mesh: Option<ObjectId>,
        material: Option<ObjectId>,
        sub_mesh: u32,
        transform: Mat4,
        layer: Layers,
    ) {
        let (Some(mesh), Some(material)) = (mesh, material) else {
            self.skip("draw without mesh or material");
            return;
        };
        if !self.recording {
            self.skip("command outside begin/end");
            return;
        }
        self.stats.draw_calls += 1;
        self.stats.instances += 1;
        self.push(Command::DrawMesh {
            mesh,
            material,
            sub_mesh,
            transform,
            layer,
        });
    }

    fn draw_mesh_instanced(
        &mut self,
        mesh: Option<ObjectId>,
        material: Option<ObjectId>,
        sub_mesh: u32,
        transforms: &[Mat4],
        layer: Layers,
    ) {
        let (Some(mesh), Some(material)) = (mesh, material) else {
            self.skip("draw without mesh or material");
            return;
        };
        if transforms.is_empty() {
            return;
        }
        if !self.recording {
            self.skip("command outside begin/end");
            return;
        }
        self.stats.draw_calls += 1;
        self.stats.instanced_draws += 1;
        self.stats.instances += transforms.len();
        self.push(Command::DrawMeshInstanced {
            mesh,
            material,
            sub_mesh,
            transforms: transforms.to_vec(),
            layer,
        });
    }

    fn set_render_target(&mut self, target: Option<ObjectId>) {
        self.push(Command::SetRenderTarget(target));
    }

    fn set_view_projection(&mut self, view: Mat4, projection: Mat4) {
        self.push(Command::SetViewProjection { view, projection });
    }

    fn reset_view_projection(&mut self) {
        self.push(Command::ResetViewProjection);
    }

    fn clear_render_target(&mut self, color: Option<Vec4>, depth: Option<f32>) {
        self.push(Command::ClearRenderTarget { color, depth });
    }

    fn dispatch_compute(&mut self, shader: Option<ObjectId>, groups: UVec3) {
        match shader {
            Some(shader) if groups.cmpgt(UVec3::ZERO).all() => {
                self.push(Command::DispatchCompute { shader, groups })
            }
            _ => self.skip("dispatch without shader or work groups"),
        }
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.push(Command::SetViewport(rect));
    }

    fn enable_scissor(&mut self, rect: Rect) {
        self.push(Command::EnableScissor(rect));
    }

    fn disable_scissor(&mut self) {
        self.push(Command::DisableScissor);
    }

    fn stats(&self) -> SubmitStats {
        self.stats
    }
}
