use bevy::prelude::*;
use bevy_infinite_grid::{InfiniteGrid, InfiniteGridPlugin};
use jackdaw_snapping::{
    EditorEntity, SnappingPlugin, brush::Brush, ecs_scene::PlaceholderGeometry,
    selection::create_group,
};

fn main() -> AppExit {
    App::new()
        .add_plugins((DefaultPlugins, InfiniteGridPlugin, SnappingPlugin))
        .add_systems(Startup, spawn_test_scene)
        .run()
}

fn spawn_test_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        EditorEntity,
        Camera3d::default(),
        Transform::from_xyz(6.0, 6.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((EditorEntity, InfiniteGrid));

    // Builder ground plane, never snapped to
    commands.spawn((
        Name::new("Ground"),
        PlaceholderGeometry,
        Mesh3d(meshes.add(Plane3d::new(Vec3::Y, Vec2::splat(5.0)))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.3, 0.5, 0.3),
            ..default()
        })),
    ));

    commands.spawn((
        Name::new("Blue Cube"),
        Mesh3d(meshes.add(Cuboid::new(1.0, 1.0, 1.0))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.2, 0.3, 0.8),
            ..default()
        })),
        Transform::from_xyz(-1.5, 0.5, 0.0),
    ));

    commands.spawn((
        Name::new("Red Sphere"),
        Mesh3d(meshes.add(Sphere::new(0.5))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.8, 0.2, 0.2),
            ..default()
        })),
        Transform::from_xyz(1.5, 0.5, 0.0),
    ));

    // Solid geometry without a render mesh: snappable through its corners only
    commands.spawn((
        Name::new("Brush"),
        Brush::cuboid(Vec3::new(1.0, 0.25, 1.0)),
        Transform::from_xyz(0.0, 0.25, 3.0),
        Visibility::default(),
    ));

    let a = commands
        .spawn((
            Name::new("Crate A"),
            Mesh3d(meshes.add(Cuboid::new(0.5, 0.5, 0.5))),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: Color::srgb(0.9, 0.9, 0.2),
                ..default()
            })),
            Transform::from_xyz(-1.0, 0.25, -3.0),
        ))
        .id();
    let b = commands
        .spawn((
            Name::new("Crate B"),
            Mesh3d(meshes.add(Cuboid::new(0.5, 0.5, 0.5))),
            MeshMaterial3d(materials.add(StandardMaterial {
                base_color: Color::srgb(0.9, 0.5, 0.1),
                ..default()
            })),
            Transform::from_xyz(1.0, 0.25, -3.0),
        ))
        .id();
    create_group(&mut commands, &[a, b], true);

    commands.spawn((
        Name::new("Point Light"),
        PointLight {
            shadows_enabled: true,
            intensity: 2_000_000.0,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0),
    ));
}
