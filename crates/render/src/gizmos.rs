//! Debug line overlay drawn on top of the frame.

use glam::{Mat4, Quat, Vec3, Vec4};
use tessera_common::{Aabb, Layers};

use crate::command_buffer::CommandBuffer;
use crate::resources::internal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GizmoLine {
    pub from: Vec3,
    pub to: Vec3,
    pub color: Vec4,
}

/// Line cache owned by a pipeline. Lines queued while not initialised are
/// dropped.
#[derive(Debug, Default)]
pub struct Gizmos {
    lines: Vec<GizmoLine>,
    ready: bool,
}

impl Gizmos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self) {
        if !self.ready {
            self.lines.reserve(256);
            self.ready = true;
            tracing::debug!("gizmo cache initialised");
        }
    }

    pub fn teardown(&mut self) {
        if self.ready {
            self.lines = Vec::new();
            self.ready = false;
            tracing::debug!("gizmo cache released");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&mut self, from: Vec3, to: Vec3, color: Vec4) {
        if self.ready {
            self.lines.push(GizmoLine { from, to, color });
        }
    }

    /// The 12 edges of `aabb`. Invalid boxes add nothing.
    pub fn wire_box(&mut self, aabb: &Aabb, color: Vec4) {
        if !aabb.is_valid() {
            return;
        }
        let c = aabb.corners();
        #[rustfmt::skip]
        const EDGES: [(usize, usize); 12] = [
            (0, 1), (1, 3), (3, 2), (2, 0),
            (4, 5), (5, 7), (7, 6), (6, 4),
            (0, 4), (1, 5), (2, 6), (3, 7),
        ];
        for (a, b) in EDGES {
            self.line(c[a], c[b], color);
        }
    }

    /// Submit every queued line and empty the cache. Returns the number of
    /// lines drawn; zero-length lines are dropped.
    pub fn flush(&mut self, cmd: &mut dyn CommandBuffer) -> usize {
        let mut drawn = 0;
        for line in self.lines.drain(..) {
            let Some(transform) = line_transform(line.from, line.to) else {
                continue;
            };
            cmd.draw_mesh(
                Some(internal::LINE_MESH),
                Some(internal::GIZMO_MATERIAL),
                0,
                transform,
                Layers::DEFAULT,
            );
            drawn += 1;
        }
        drawn
    }
}

/// Maps the unit segment (origin to +X) onto `from..to`.
fn line_transform(from: Vec3, to: Vec3) -> Option<Mat4> {
    let delta = to - from;
    let length = delta.length();
    if length <= f32::EPSILON {
        return None;
    }
    let rotation = Quat::from_rotation_arc(Vec3::X, delta / length);
    Some(Mat4::from_scale_rotation_translation(
        Vec3::new(length, 1.0, 1.0),
        rotation,
        from,
    ))
}
