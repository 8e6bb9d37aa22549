//! Bevy-backed [`SnapScene`] and [`SnapView`].

use bevy::{
    camera::primitives::{Aabb, Frustum},
    ecs::{entity::EntityHashSet, system::SystemParam},
    math::{Affine3A, bounding::Aabb3d},
    mesh::skinning::SkinnedMesh,
    picking::mesh_picking::ray_cast::{MeshRayCast, MeshRayCastSettings, RayCastVisibility},
    prelude::*,
};

use crate::{
    EditorEntity,
    brush::BrushMeshCache,
    scene::{
        ComponentGeometry, GroupInfo, ObjectInfo, ObjectKind, SkinSection, SnapComponent,
        SnapScene, SnapView, aabb_from_min_max, transform_aabb,
    },
    selection::{GroupMember, ObjectGroup},
};

/// Builder geometry the editor keeps in the scene. Never a snap target.
#[derive(Component, Default, Reflect)]
#[reflect(Component, Default)]
pub struct PlaceholderGeometry;

/// Trigger or blocking volume. Pivot snapping skips these.
#[derive(Component, Default, Reflect)]
#[reflect(Component, Default)]
pub struct SnapVolume;

type ObjectData = (
    &'static GlobalTransform,
    Option<&'static Aabb>,
    Option<&'static InheritedVisibility>,
    Has<PlaceholderGeometry>,
    Has<SnapVolume>,
);

/// Every non-editor entity with a transform is a scene object. Its own
/// `Mesh3d` and brush geometry are its components.
#[derive(SystemParam)]
pub struct EcsSnapScene<'w, 's> {
    objects: Query<'w, 's, (Entity, ObjectData), (With<Transform>, Without<EditorEntity>)>,
    meshes: Query<'w, 's, (&'static Mesh3d, Has<SkinnedMesh>)>,
    brushes: Query<'w, 's, &'static BrushMeshCache>,
    children: Query<'w, 's, &'static Children>,
    members: Query<'w, 's, (Entity, &'static GroupMember)>,
    groups: Query<'w, 's, &'static ObjectGroup>,
    mesh_assets: Res<'w, Assets<Mesh>>,
}

impl SnapScene for EcsSnapScene<'_, '_> {
    fn objects(&self) -> Vec<Entity> {
        self.objects.iter().map(|(entity, _)| entity).collect()
    }

    fn object(&self, entity: Entity) -> Option<ObjectInfo> {
        let (_, (global, aabb, visibility, placeholder, volume)) = self.objects.get(entity).ok()?;
        let origin = global.translation();
        let world_from_local = global.affine();

        let bounds = if let Some(aabb) = aabb {
            let center = Vec3::from(aabb.center);
            let half = Vec3::from(aabb.half_extents);
            transform_aabb(center - half, center + half, &world_from_local)
        } else if let Some((min, max)) = self.brushes.get(entity).ok().and_then(|c| c.local_bounds()) {
            transform_aabb(min, max, &world_from_local)
        } else {
            aabb_from_min_max(origin, origin)
        };

        let kind = if placeholder {
            ObjectKind::Placeholder
        } else if volume {
            ObjectKind::Volume
        } else {
            ObjectKind::Regular
        };

        Some(ObjectInfo {
            origin,
            bounds,
            hidden: visibility.is_some_and(|v| !v.get()),
            kind,
        })
    }

    fn components(&self, entity: Entity) -> Vec<SnapComponent<'_>> {
        let Ok((_, (global, ..))) = self.objects.get(entity) else {
            return Vec::new();
        };
        let world_from_local = global.affine();
        let mut components = Vec::new();

        if let Ok((mesh, skinned)) = self.meshes.get(entity) {
            let geometry = match self.mesh_assets.get(&mesh.0) {
                Some(mesh) => mesh_geometry(mesh, skinned),
                None => ComponentGeometry::None,
            };
            components.push(SnapComponent {
                world_from_local,
                geometry,
            });
        }

        if let Ok(cache) = self.brushes.get(entity) {
            components.push(SnapComponent {
                world_from_local,
                geometry: ComponentGeometry::Brush {
                    vertices: &cache.vertices,
                    face_polygons: &cache.face_polygons,
                },
            });
        }

        components
    }

    fn children(&self, entity: Entity) -> Vec<Entity> {
        self.children
            .get(entity)
            .map(|children| children.to_vec())
            .unwrap_or_default()
    }

    fn group(&self, entity: Entity) -> Option<GroupInfo> {
        let (_, &GroupMember(group)) = self.members.get(entity).ok()?;
        let object_group = self.groups.get(group).ok()?;
        Some(GroupInfo {
            members: self
                .members
                .iter()
                .filter(|(_, member)| member.0 == group)
                .map(|(member, _)| member)
                .collect(),
            locked: object_group.locked,
        })
    }
}

fn mesh_geometry(mesh: &Mesh, skinned: bool) -> ComponentGeometry<'_> {
    let Some(positions) = mesh
        .attribute(Mesh::ATTRIBUTE_POSITION)
        .and_then(|values| values.as_float3())
    else {
        return ComponentGeometry::None;
    };
    let normals = mesh
        .attribute(Mesh::ATTRIBUTE_NORMAL)
        .and_then(|values| values.as_float3());

    if skinned {
        // The asset holds the bind pose, which is what skinned objects snap to
        ComponentGeometry::SkinnedMesh {
            sections: vec![SkinSection { positions, normals }],
        }
    } else {
        ComponentGeometry::TriangleMesh { positions, normals }
    }
}

/// The editor camera as seen by the snapping code.
pub struct CameraSnapView<'a> {
    camera: &'a Camera,
    transform: &'a GlobalTransform,
    frustum: Option<&'a Frustum>,
    perspective: bool,
    /// Scene objects under the pointer, nearest first.
    hits: Vec<Entity>,
}

impl<'a> CameraSnapView<'a> {
    /// `hits` are the objects under the pointer this frame, see [`pointer_hits`].
    pub fn new(
        camera: &'a Camera,
        transform: &'a GlobalTransform,
        projection: &Projection,
        frustum: Option<&'a Frustum>,
        hits: Vec<Entity>,
    ) -> Self {
        Self {
            camera,
            transform,
            frustum,
            perspective: !matches!(projection, Projection::Orthographic(_)),
            hits,
        }
    }
}

impl SnapView for CameraSnapView<'_> {
    fn world_to_screen(&self, world: Vec3) -> Option<Vec2> {
        self.camera.world_to_viewport(self.transform, world).ok()
    }

    fn viewport_size(&self) -> Vec2 {
        self.camera.logical_viewport_size().unwrap_or_default()
    }

    fn view_origin(&self) -> Vec3 {
        self.transform.translation()
    }

    fn is_perspective(&self) -> bool {
        self.perspective
    }

    fn intersects_frustum(&self, bounds: &Aabb3d) -> bool {
        let Some(frustum) = self.frustum else {
            return true;
        };
        let aabb = Aabb::from_min_max(bounds.min.into(), bounds.max.into());
        frustum.intersects_obb(&aabb, &Affine3A::IDENTITY, true, false)
    }

    /// The pick happened when the view was built, so `pointer` is already
    /// accounted for.
    fn pick(&self, _pointer: Vec2, ignore: &EntityHashSet) -> Option<Entity> {
        self.hits.iter().copied().find(|entity| !ignore.contains(entity))
    }
}

/// Scene objects hit by a ray through `pointer`, nearest first.
pub fn pointer_hits(
    ray_cast: &mut MeshRayCast,
    scene: &impl SnapScene,
    camera: &Camera,
    camera_transform: &GlobalTransform,
    pointer: Vec2,
) -> Vec<Entity> {
    let Ok(ray) = camera.viewport_to_world(camera_transform, pointer) else {
        return Vec::new();
    };
    let settings = MeshRayCastSettings::default().with_visibility(RayCastVisibility::Visible);
    ray_cast
        .cast_ray(ray, &settings)
        .iter()
        .map(|(entity, _)| *entity)
        .filter(|&entity| scene.is_alive(entity))
        .collect()
}
