//! Built-in scene used by `render` when no document is given.

use glam::{Quat, Vec3, Vec4};
use tessera_common::{Layers, Transform};
use tessera_prefab::PrefabLibrary;
use tessera_scene::components::{Camera, Light, MeshRender, Rotator, SpriteRender, Widget, builtin};
use tessera_scene::{LightKind, NodeId, SceneGraph};

pub struct Demo {
    pub camera: NodeId,
    pub instances: Vec<NodeId>,
}

fn at(position: Vec3) -> Transform {
    Transform {
        position,
        ..Transform::default()
    }
}

/// A camera, a sun, a ring of spinning pillar prefab instances, a sprite and
/// a HUD widget.
pub fn build(graph: &mut SceneGraph, library: &mut PrefabLibrary) -> anyhow::Result<Demo> {
    let camera = graph.create_node("camera", None)?;
    graph.set_local_transform(camera, at(Vec3::new(0.0, 4.0, 14.0)))?;
    graph.attach(
        camera,
        Camera {
            clear_color: Vec4::new(0.05, 0.05, 0.08, 1.0),
            ..Camera::default()
        },
    )?;

    let sun = graph.create_node("sun", None)?;
    graph.set_local_transform(
        sun,
        Transform {
            rotation: Quat::from_rotation_x(-60f32.to_radians()),
            ..Transform::default()
        },
    )?;
    graph.attach(
        sun,
        Light {
            kind: LightKind::Directional,
            casts_shadows: true,
            ..Light::default()
        },
    )?;

    let ground = graph.create_node("ground", None)?;
    graph.set_local_transform(
        ground,
        Transform {
            scale: Vec3::new(20.0, 0.1, 20.0),
            ..Transform::default()
        },
    )?;
    graph.attach(
        ground,
        MeshRender {
            mesh: Some(builtin::CUBE_MESH),
            ..MeshRender::default()
        },
    )?;

    // Template source: a pillar with a cap. It is turned into a prefab and
    // then removed; only instances stay in the world.
    let pillar = graph.create_node("pillar", None)?;
    graph.attach(
        pillar,
        MeshRender {
            mesh: Some(builtin::CUBE_MESH),
            ..MeshRender::default()
        },
    )?;
    graph.attach(
        pillar,
        Rotator {
            speed: Vec3::new(0.0, 45.0, 0.0),
        },
    )?;
    let cap = graph.create_node("cap", Some(pillar))?;
    graph.set_local_transform(cap, at(Vec3::new(0.0, 0.75, 0.0)))?;
    graph.attach(
        cap,
        MeshRender {
            mesh: Some(builtin::CUBE_MESH),
            ..MeshRender::default()
        },
    )?;
    let prefab = library.create_from(graph, pillar)?;
    graph.remove_node(pillar)?;

    let mut instances = Vec::new();
    for i in 0..6 {
        let angle = i as f32 / 6.0 * std::f32::consts::TAU;
        let instance = library.try_instantiate(prefab, graph, None)?;
        graph.set_local_transform(instance, at(Vec3::new(angle.cos() * 5.0, 0.5, angle.sin() * 5.0)))?;
        instances.push(instance);
    }

    let sprite = graph.create_node("sprite", None)?;
    graph.set_local_transform(sprite, at(Vec3::new(0.0, 2.0, 0.0)))?;
    graph.attach(sprite, SpriteRender::default())?;
    graph.set_layers(sprite, Layers::DEFAULT | Layers::TRANSLUCENT)?;

    let hud = graph.create_node("hud", None)?;
    graph.attach(
        hud,
        Widget {
            rect: Vec4::new(16.0, 16.0, 200.0, 40.0),
            depth: 1.0,
            ..Widget::default()
        },
    )?;

    Ok(Demo { camera, instances })
}
