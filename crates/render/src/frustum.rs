//! View frustum extraction and box culling.

use glam::{Mat4, Vec3};
use rayon::prelude::*;
use tessera_common::Aabb;
use tessera_scene::ThreadPolicy;

/// Anything with a world-space box the culler can test.
pub trait Bounded {
    fn world_bounds(&self) -> Aabb;
}

impl Bounded for Aabb {
    fn world_bounds(&self) -> Aabb {
        *self
    }
}

/// Plane in `normal . p + d = 0` form; the inside is the positive side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    fn through(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let normal = (b - a).cross(c - a).normalize_or_zero();
        Self {
            normal,
            d: -normal.dot(a),
        }
    }

    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }

    fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            d: -self.d,
        }
    }
}

/// The 8 world-space corners of the volume `view_projection` maps onto the
/// clip cube (depth 0..1). Near face first: (-x,-y), (+x,-y), (-x,+y),
/// (+x,+y), then the far face in the same order.
pub fn frustum_corners(view_projection: Mat4) -> [Vec3; 8] {
    let inv = view_projection.inverse();
    let mut out = [Vec3::ZERO; 8];
    let mut i = 0;
    for z in [0.0, 1.0] {
        for y in [-1.0, 1.0] {
            for x in [-1.0, 1.0] {
                out[i] = inv.project_point3(Vec3::new(x, y, z));
                i += 1;
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Build the six planes from corners laid out as [`frustum_corners`]
    /// returns them. Each plane is oriented to face the volume's centre.
    pub fn from_corners(c: &[Vec3; 8]) -> Self {
        let mut planes = [
            Plane::through(c[0], c[1], c[2]), // near
            Plane::through(c[4], c[6], c[5]), // far
            Plane::through(c[0], c[2], c[4]), // left
            Plane::through(c[1], c[5], c[3]), // right
            Plane::through(c[0], c[4], c[1]), // bottom
            Plane::through(c[2], c[3], c[6]), // top
        ];
        let center = c.iter().copied().sum::<Vec3>() / 8.0;
        for plane in &mut planes {
            if plane.distance(center) < 0.0 {
                *plane = plane.flipped();
            }
        }
        Self { planes }
    }

    /// False only when the box lies entirely outside one plane. Boxes that
    /// straddle a plane are kept, and so are invalid (empty) boxes.
    pub fn intersects(&self, aabb: &Aabb) -> bool {
        if !aabb.is_valid() {
            return true;
        }
        self.planes.iter().all(|plane| {
            let n = plane.normal;
            let positive = Vec3::new(
                if n.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if n.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if n.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.distance(positive) >= 0.0
        })
    }
}

/// Keep the items whose bounds are inside or crossing the frustum, in their
/// original order, and return the union of every tested box.
///
/// With `ThreadPolicy::Pool` and more than `threshold` items the test is
/// split across the rayon pool; the chunks are merged back in order.
pub fn frustum_culling<T>(
    corners: &[Vec3; 8],
    items: &[T],
    policy: ThreadPolicy,
    threshold: usize,
) -> (Vec<T>, Aabb)
where
    T: Bounded + Clone + Send + Sync,
{
    let frustum = Frustum::from_corners(corners);
    if policy == ThreadPolicy::Pool && items.len() > threshold {
        let chunk = items.len().div_ceil(rayon::current_num_threads().max(1)).max(1);
        let parts: Vec<(Vec<T>, Aabb)> = items
            .par_chunks(chunk)
            .map(|part| cull_slice(&frustum, part))
            .collect();
        let mut visible = Vec::with_capacity(items.len());
        let mut bounds = Aabb::EMPTY;
        for (part, part_bounds) in parts {
            visible.extend(part);
            bounds.encapsulate(&part_bounds);
        }
        (visible, bounds)
    } else {
        cull_slice(&frustum, items)
    }
}

fn cull_slice<T: Bounded + Clone>(frustum: &Frustum, items: &[T]) -> (Vec<T>, Aabb) {
    let mut bounds = Aabb::EMPTY;
    let visible = items
        .iter()
        .filter(|item| {
            let b = item.world_bounds();
            bounds.encapsulate(&b);
            frustum.intersects(&b)
        })
        .cloned()
        .collect();
    (visible, bounds)
}
