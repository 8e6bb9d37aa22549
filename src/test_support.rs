//! In-memory scene and viewport doubles for the snapping tests.

use std::cell::Cell;

use bevy::{
    ecs::entity::{EntityHashMap, EntityHashSet},
    math::{
        Affine3A,
        bounding::{Aabb3d, IntersectsVolume},
    },
    prelude::*,
};

use crate::scene::{
    ComponentGeometry, GroupInfo, ObjectInfo, ObjectKind, SnapComponent, SnapScene, SnapView,
    aabb_from_min_max,
};

pub(crate) struct TestMesh {
    pub world_from_local: Affine3A,
    /// `None` models a mesh component whose asset is not set.
    pub positions: Option<Vec<[f32; 3]>>,
    pub normals: Option<Vec<[f32; 3]>>,
}

pub(crate) struct TestObject {
    pub origin: Vec3,
    pub bounds: Aabb3d,
    pub hidden: bool,
    pub kind: ObjectKind,
    pub meshes: Vec<TestMesh>,
    pub children: Vec<Entity>,
    pub group: Option<usize>,
}

impl TestObject {
    pub fn empty(origin: Vec3) -> Self {
        Self {
            origin,
            bounds: aabb_from_min_max(origin, origin),
            hidden: false,
            kind: ObjectKind::Regular,
            meshes: Vec::new(),
            children: Vec::new(),
            group: None,
        }
    }

    /// Axis-aligned cube mesh: eight corners with outward normals.
    pub fn cube(center: Vec3, half: f32) -> Self {
        let mut positions = Vec::with_capacity(8);
        let mut normals = Vec::with_capacity(8);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            positions.push((corner * half).to_array());
            normals.push(corner.normalize().to_array());
        }
        Self {
            bounds: aabb_from_min_max(center - Vec3::splat(half), center + Vec3::splat(half)),
            meshes: vec![TestMesh {
                world_from_local: Affine3A::from_translation(center),
                positions: Some(positions),
                normals: Some(normals),
            }],
            ..Self::empty(center)
        }
    }
}

pub(crate) struct TestScene {
    world: World,
    objects: EntityHashMap<TestObject>,
    order: Vec<Entity>,
    groups: Vec<GroupInfo>,
    /// Number of full scene scans, to assert on short circuits.
    pub scans: Cell<usize>,
}

impl TestScene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            objects: EntityHashMap::default(),
            order: Vec::new(),
            groups: Vec::new(),
            scans: Cell::new(0),
        }
    }

    pub fn spawn(&mut self, object: TestObject) -> Entity {
        let entity = self.world.spawn_empty().id();
        self.objects.insert(entity, object);
        self.order.push(entity);
        entity
    }

    pub fn spawn_cube(&mut self, center: Vec3, half: f32) -> Entity {
        self.spawn(TestObject::cube(center, half))
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.objects.remove(&entity);
        self.order.retain(|&e| e != entity);
    }

    pub fn get_mut(&mut self, entity: Entity) -> &mut TestObject {
        self.objects.get_mut(&entity).expect("object was spawned")
    }

    pub fn attach(&mut self, parent: Entity, child: Entity) {
        self.get_mut(parent).children.push(child);
    }

    pub fn make_group(&mut self, members: &[Entity], locked: bool) {
        let index = self.groups.len();
        self.groups.push(GroupInfo {
            members: members.to_vec(),
            locked,
        });
        for &member in members {
            self.get_mut(member).group = Some(index);
        }
    }
}

impl SnapScene for TestScene {
    fn objects(&self) -> Vec<Entity> {
        self.scans.set(self.scans.get() + 1);
        self.order.clone()
    }

    fn object(&self, entity: Entity) -> Option<ObjectInfo> {
        self.objects.get(&entity).map(|object| ObjectInfo {
            origin: object.origin,
            bounds: object.bounds,
            hidden: object.hidden,
            kind: object.kind,
        })
    }

    fn components(&self, entity: Entity) -> Vec<SnapComponent<'_>> {
        let Some(object) = self.objects.get(&entity) else {
            return Vec::new();
        };
        object
            .meshes
            .iter()
            .map(|mesh| SnapComponent {
                world_from_local: mesh.world_from_local,
                geometry: match &mesh.positions {
                    Some(positions) => ComponentGeometry::TriangleMesh {
                        positions,
                        normals: mesh.normals.as_deref(),
                    },
                    None => ComponentGeometry::None,
                },
            })
            .collect()
    }

    fn children(&self, entity: Entity) -> Vec<Entity> {
        self.objects
            .get(&entity)
            .map(|object| object.children.clone())
            .unwrap_or_default()
    }

    fn group(&self, entity: Entity) -> Option<GroupInfo> {
        let index = self.objects.get(&entity)?.group?;
        self.groups.get(index).cloned()
    }
}

pub(crate) const VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);

pub(crate) struct TestView {
    clip_from_world: Mat4,
    origin: Vec3,
    perspective: bool,
    pub picks: Vec<Entity>,
    pub frustum: Option<Aabb3d>,
}

impl TestView {
    pub fn perspective(eye: Vec3, target: Vec3) -> Self {
        let projection = Mat4::perspective_rh(
            60.0_f32.to_radians(),
            VIEWPORT.x / VIEWPORT.y,
            0.1,
            100_000.0,
        );
        Self {
            clip_from_world: projection * Mat4::look_at_rh(eye, target, Vec3::Y),
            origin: eye,
            perspective: true,
            picks: Vec::new(),
            frustum: None,
        }
    }

    /// Front view looking down -Z, `pixels_per_unit` screen pixels per world unit,
    /// with `center` in the middle of the viewport.
    pub fn front_ortho(center: Vec3, pixels_per_unit: f32) -> Self {
        let half = VIEWPORT * 0.5 / pixels_per_unit;
        let eye = center + Vec3::Z * 1000.0;
        let projection = Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, 0.1, 100_000.0);
        Self {
            clip_from_world: projection * Mat4::look_at_rh(eye, center, Vec3::Y),
            origin: eye,
            perspective: false,
            picks: Vec::new(),
            frustum: None,
        }
    }
}

impl SnapView for TestView {
    fn world_to_screen(&self, world: Vec3) -> Option<Vec2> {
        let clip = self.clip_from_world * world.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * VIEWPORT.x,
            (1.0 - ndc.y) * 0.5 * VIEWPORT.y,
        ))
    }

    fn viewport_size(&self) -> Vec2 {
        VIEWPORT
    }

    fn view_origin(&self) -> Vec3 {
        self.origin
    }

    fn is_perspective(&self) -> bool {
        self.perspective
    }

    fn intersects_frustum(&self, bounds: &Aabb3d) -> bool {
        self.frustum.is_none_or(|frustum| frustum.intersects(bounds))
    }

    fn pick(&self, _pointer: Vec2, ignore: &EntityHashSet) -> Option<Entity> {
        self.picks.iter().copied().find(|e| !ignore.contains(e))
    }
}
