//! Data model and collaborator seams shared by the snapping code.
//!
//! The snapping math never touches the ECS directly. It reads the scene through
//! [`SnapScene`] and the active viewport through [`SnapView`]; `ecs_scene` provides
//! the Bevy-backed implementations and the tests provide in-memory doubles.

use bevy::{
    ecs::entity::EntityHashSet,
    math::{Affine3A, Vec3A, bounding::Aabb3d},
    prelude::*,
};

/// Differences below this are treated as "no movement".
pub const NEARLY_ZERO: f32 = 1e-4;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// One candidate point produced by a vertex source. Equality is exact and only
/// meant for de-duplicating helpers, never for snapping decisions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SnapVertex {
    pub position: Vec3,
    pub normal: Vec3,
}

impl SnapVertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position, normal }
    }

    /// An origin fallback point carries no normal.
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Vec3::ZERO)
    }
}

/// Movement constraint of the active drag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum SnapAxis {
    X,
    Y,
    Z,
    #[default]
    Screen,
}

impl SnapAxis {
    /// World direction of a single-axis constraint.
    pub fn direction(self) -> Option<Vec3> {
        match self {
            SnapAxis::X => Some(Vec3::X),
            SnapAxis::Y => Some(Vec3::Y),
            SnapAxis::Z => Some(Vec3::Z),
            SnapAxis::Screen => None,
        }
    }

    pub fn is_screen(self) -> bool {
        self == SnapAxis::Screen
    }
}

/// Plane in Hessian normal form: `normal.dot(p) - offset` is the signed distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapPlane {
    pub normal: Vec3,
    pub offset: f32,
}

impl SnapPlane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            offset: normal.dot(point),
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

// ---------------------------------------------------------------------------
// Scene objects
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectKind {
    #[default]
    Regular,
    /// Default/builder geometry the editor keeps around. Never a snap target.
    Placeholder,
    /// Trigger or blocking volume. Skipped by pivot snapping.
    Volume,
}

/// Snapshot of the object state the collector needs, read once per query.
#[derive(Clone, Copy, Debug)]
pub struct ObjectInfo {
    pub origin: Vec3,
    pub bounds: Aabb3d,
    pub hidden: bool,
    pub kind: ObjectKind,
}

/// Membership of an object in a user group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupInfo {
    pub members: Vec<Entity>,
    pub locked: bool,
}

/// One renderable part of an object together with its local-to-world transform.
#[derive(Clone, Debug)]
pub struct SnapComponent<'a> {
    pub world_from_local: Affine3A,
    pub geometry: ComponentGeometry<'a>,
}

/// Raw vertex data of a component, borrowed for the length of one query.
#[derive(Clone, Debug, Default)]
pub enum ComponentGeometry<'a> {
    /// No mesh asset (unset handle, asset still loading, lights, empties).
    #[default]
    None,
    TriangleMesh {
        positions: &'a [[f32; 3]],
        normals: Option<&'a [[f32; 3]]>,
    },
    /// Rest-pose vertex data, one entry per mesh section.
    SkinnedMesh { sections: Vec<SkinSection<'a>> },
    /// Convex solid geometry: unique corners plus per-face polygons indexing them.
    Brush {
        vertices: &'a [Vec3],
        face_polygons: &'a [Vec<usize>],
    },
}

#[derive(Clone, Copy, Debug)]
pub struct SkinSection<'a> {
    pub positions: &'a [[f32; 3]],
    pub normals: Option<&'a [[f32; 3]]>,
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Read-only view of the scene being edited.
///
/// Handles are `Entity` values: they may refer to objects that were despawned
/// since they were captured, in which case lookups return `None`/empty.
pub trait SnapScene {
    /// Every object currently in the scene. Order is unspecified.
    fn objects(&self) -> Vec<Entity>;

    fn object(&self, entity: Entity) -> Option<ObjectInfo>;

    fn components(&self, entity: Entity) -> Vec<SnapComponent<'_>>;

    /// Direct children in the attachment hierarchy.
    fn children(&self, entity: Entity) -> Vec<Entity>;

    fn group(&self, entity: Entity) -> Option<GroupInfo>;

    fn is_alive(&self, entity: Entity) -> bool {
        self.object(entity).is_some()
    }

    /// Every descendant of `entity`, depth first.
    fn descendants(&self, entity: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut stack = self.children(entity);
        while let Some(child) = stack.pop() {
            if out.contains(&child) {
                continue;
            }
            stack.extend(self.children(child));
            out.push(child);
        }
        out
    }
}

/// The viewport the drag happens in.
pub trait SnapView {
    /// Viewport pixel coordinates (origin top-left) or `None` when behind the camera.
    fn world_to_screen(&self, world: Vec3) -> Option<Vec2>;

    fn viewport_size(&self) -> Vec2;

    /// Camera position in world space.
    fn view_origin(&self) -> Vec3;

    fn is_perspective(&self) -> bool;

    fn intersects_frustum(&self, bounds: &Aabb3d) -> bool;

    /// Object directly under the pointer, skipping anything in `ignore`.
    fn pick(&self, pointer: Vec2, ignore: &EntityHashSet) -> Option<Entity>;

    fn is_on_screen(&self, screen: Vec2) -> bool {
        let size = self.viewport_size();
        screen.x >= 0.0 && screen.y >= 0.0 && screen.x <= size.x && screen.y <= size.y
    }
}

// ---------------------------------------------------------------------------
// Box helpers
// ---------------------------------------------------------------------------

pub fn aabb_from_min_max(min: Vec3, max: Vec3) -> Aabb3d {
    Aabb3d {
        min: Vec3A::from(min.min(max)),
        max: Vec3A::from(min.max(max)),
    }
}

pub fn aabb_contains_point(aabb: &Aabb3d, point: Vec3) -> bool {
    let point = Vec3A::from(point);
    point.cmpge(aabb.min).all() && point.cmple(aabb.max).all()
}

/// World-space box enclosing a local box under an arbitrary affine transform.
pub fn transform_aabb(local_min: Vec3, local_max: Vec3, world_from_local: &Affine3A) -> Aabb3d {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for i in 0..8 {
        let corner = Vec3::new(
            if i & 1 == 0 { local_min.x } else { local_max.x },
            if i & 2 == 0 { local_min.y } else { local_max.y },
            if i & 4 == 0 { local_min.z } else { local_max.z },
        );
        let world = world_from_local.transform_point3(corner);
        min = min.min(world);
        max = max.max(world);
    }
    aabb_from_min_max(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_distance_is_signed_along_normal() {
        let plane = SnapPlane::from_point_normal(Vec3::new(5.0, 0.0, 0.0), Vec3::X * 3.0);
        assert_relative_eq!(plane.signed_distance(Vec3::new(7.0, 4.0, -2.0)), 2.0);
        assert_relative_eq!(plane.signed_distance(Vec3::new(1.0, 0.0, 0.0)), -4.0);
    }

    #[test]
    fn rotated_box_bounds_cover_all_corners() {
        let tf = Affine3A::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let bounds = transform_aabb(Vec3::splat(-1.0), Vec3::splat(1.0), &tf);
        let half_diag = 2.0_f32.sqrt();
        assert_relative_eq!(bounds.max.x, half_diag, epsilon = 1e-5);
        assert_relative_eq!(bounds.min.y, -half_diag, epsilon = 1e-5);
        assert_relative_eq!(bounds.max.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn box_point_containment_is_inclusive() {
        let bounds = aabb_from_min_max(Vec3::ZERO, Vec3::ONE);
        assert!(aabb_contains_point(&bounds, Vec3::ONE));
        assert!(!aabb_contains_point(&bounds, Vec3::new(1.01, 0.5, 0.5)));
    }
}
