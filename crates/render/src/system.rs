use tessera_scene::{SceneGraph, System, ThreadPolicy};

use crate::command_buffer::{CommandBuffer, RecordingCommandBuffer};
use crate::config::PipelineConfig;
use crate::pipeline::{FrameStats, PipelineContext};
use crate::resources::RenderResources;

/// Draws one frame per scheduler tick into an owned command buffer.
pub struct RenderSystem<C: CommandBuffer = RecordingCommandBuffer> {
    pipeline: PipelineContext,
    resources: RenderResources,
    cmd: C,
    last: FrameStats,
    frames: u64,
}

impl RenderSystem<RecordingCommandBuffer> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_backend(config, RecordingCommandBuffer::new())
    }
}

impl<C: CommandBuffer> RenderSystem<C> {
    pub fn with_backend(config: PipelineConfig, cmd: C) -> Self {
        Self {
            pipeline: PipelineContext::with_default_passes(config),
            resources: RenderResources::with_builtins(),
            cmd,
            last: FrameStats::default(),
            frames: 0,
        }
    }

    pub fn pipeline(&self) -> &PipelineContext {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut PipelineContext {
        &mut self.pipeline
    }

    pub fn resources_mut(&mut self) -> &mut RenderResources {
        &mut self.resources
    }

    pub fn backend(&self) -> &C {
        &self.cmd
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last
    }

    /// Frames actually submitted; skipped frames are not counted.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl<C: CommandBuffer> System for RenderSystem<C> {
    fn name(&self) -> &str {
        "render"
    }

    fn update(&mut self, graph: &mut SceneGraph, _dt: f32) {
        self.last = self.pipeline.draw(graph, &self.resources, &mut self.cmd);
        if !self.last.skipped_frame {
            self.frames += 1;
        }
    }

    fn thread_policy(&self) -> ThreadPolicy {
        self.pipeline.config().thread_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use std::sync::Arc;
    use tessera_common::Transform;
    use tessera_scene::components::{Camera, MeshRender, Rotator, builtin};
    use tessera_scene::{Scheduler, TypeRegistry};

    #[test]
    fn scheduler_drives_frames() {
        let mut graph = SceneGraph::new(Arc::new(TypeRegistry::with_builtins()));
        let cam = graph.create_node("camera", None).unwrap();
        graph.attach(cam, Camera::default()).unwrap();
        let spinner = graph.create_node("spinner", None).unwrap();
        graph
            .set_local_transform(
                spinner,
                Transform {
                    position: Vec3::new(0.0, 0.0, -5.0),
                    ..Transform::default()
                },
            )
            .unwrap();
        graph
            .attach(
                spinner,
                MeshRender {
                    mesh: Some(builtin::CUBE_MESH),
                    ..MeshRender::default()
                },
            )
            .unwrap();
        graph
            .attach(
                spinner,
                Rotator {
                    speed: Vec3::new(0.0, 90.0, 0.0),
                },
            )
            .unwrap();

        let mut scheduler = Scheduler::new();
        scheduler.add(Box::new(RenderSystem::new(PipelineConfig::default())));
        for _ in 0..3 {
            scheduler.tick(&mut graph, 1.0 / 60.0);
        }
        assert_ne!(graph.local_transform(spinner).rotation, Quat::IDENTITY);
    }

    #[test]
    fn counts_only_submitted_frames() {
        let mut graph = SceneGraph::new(Arc::new(TypeRegistry::with_builtins()));
        let mut system = RenderSystem::new(PipelineConfig::default());
        assert!(system.init());
        system.update(&mut graph, 0.016);
        assert!(system.last_frame().skipped_frame);
        assert_eq!(system.frames(), 0);

        let cam = graph.create_node("camera", None).unwrap();
        graph.attach(cam, Camera::default()).unwrap();
        system.update(&mut graph, 0.016);
        assert_eq!(system.frames(), 1);
        assert!(system.backend().stats().commands > 0);
        assert_eq!(system.thread_policy(), ThreadPolicy::Main);
    }
}
