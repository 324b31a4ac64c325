use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};
use tessera_common::{Aabb, Transform};
use tessera_render::{
    PipelineConfig, PipelineContext, RecordingCommandBuffer, RenderResources, frustum_corners,
    frustum_culling,
};
use tessera_scene::components::{Camera, MeshRender, builtin};
use tessera_scene::{SceneGraph, ThreadPolicy, TypeRegistry};

fn make_boxes(count: usize, spacing: f32) -> Vec<Aabb> {
    let side = (count as f32).sqrt().ceil() as usize;
    (0..count)
        .map(|i| {
            let x = (i % side) as f32 * spacing - side as f32 * spacing * 0.5;
            let z = -((i / side) as f32 * spacing);
            Aabb::from_center_extents(Vec3::new(x, 0.0, z), Vec3::splat(0.5))
        })
        .collect()
}

fn corners() -> [Vec3; 8] {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 5.0, 10.0), Vec3::new(0.0, 0.0, -50.0), Vec3::Y);
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 500.0);
    frustum_corners(proj * view)
}

fn bench_cull(count: usize, policy: ThreadPolicy, iterations: usize) {
    let boxes = make_boxes(count, 4.0);
    let corners = corners();

    let start = Instant::now();
    let mut visible = 0;
    for _ in 0..iterations {
        let (kept, _) = frustum_culling(black_box(&corners), black_box(&boxes), policy, 1024);
        visible = kept.len();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  cull {policy:?} ({count} boxes, {visible} visible, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_frame(count: usize, iterations: usize) {
    let mut graph = SceneGraph::new(Arc::new(TypeRegistry::with_builtins()));
    let camera = graph.create_node("camera", None).expect("camera node");
    graph.attach(camera, Camera::default()).expect("camera");
    for aabb in make_boxes(count, 4.0) {
        let node = graph.create_node("box", None).expect("node");
        graph
            .set_local_transform(
                node,
                Transform {
                    position: aabb.center(),
                    ..Transform::default()
                },
            )
            .expect("transform");
        graph
            .attach(
                node,
                MeshRender {
                    mesh: Some(builtin::CUBE_MESH),
                    ..MeshRender::default()
                },
            )
            .expect("mesh");
    }
    let resources = RenderResources::with_builtins();
    let mut pipeline = PipelineContext::with_default_passes(PipelineConfig::default());
    let mut cmd = RecordingCommandBuffer::new();

    let start = Instant::now();
    for _ in 0..iterations {
        let _ = black_box(pipeline.draw(black_box(&graph), &resources, &mut cmd));
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  full frame ({count} renderables, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn main() {
    println!("=== Frustum Culling Benchmarks ===\n");

    println!("Cull (main thread):");
    bench_cull(1_000, ThreadPolicy::Main, 1000);
    bench_cull(10_000, ThreadPolicy::Main, 100);
    bench_cull(100_000, ThreadPolicy::Main, 10);

    println!("\nCull (rayon pool):");
    bench_cull(1_000, ThreadPolicy::Pool, 1000);
    bench_cull(10_000, ThreadPolicy::Pool, 100);
    bench_cull(100_000, ThreadPolicy::Pool, 10);

    println!("\nPipeline frame:");
    bench_frame(1_000, 100);
    bench_frame(10_000, 10);

    println!("\n=== Done ===");
}
