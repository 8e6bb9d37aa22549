use bevy::prelude::*;
use jackdaw_geometry::{BrushFace, compute_brush_geometry, cuboid_faces};

pub struct BrushPlugin;

impl Plugin for BrushPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<Brush>()
            .add_systems(Update, rebuild_brush_caches);
    }
}

/// Convex solid described by its bounding planes, in local space. Serialized;
/// the corner geometry is derived into [`BrushMeshCache`].
#[derive(Component, Reflect, Clone, Debug, Default)]
#[reflect(Component, Default)]
pub struct Brush {
    pub faces: Vec<BrushFace>,
}

impl Brush {
    pub fn cuboid(half_extents: Vec3) -> Self {
        Self {
            faces: cuboid_faces(half_extents),
        }
    }
}

/// Cached computed geometry (NOT serialized, rebuilt from Brush).
#[derive(Component, Debug, Default)]
pub struct BrushMeshCache {
    pub vertices: Vec<Vec3>,
    /// Per-face: ordered vertex indices into `vertices`.
    pub face_polygons: Vec<Vec<usize>>,
}

impl BrushMeshCache {
    /// Local-space bounds of the corners, `None` for an empty brush.
    pub fn local_bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(min, max), &v| (min.min(v), max.max(v))),
        )
    }
}

pub(crate) fn rebuild_brush_caches(
    mut commands: Commands,
    changed_brushes: Query<(Entity, &Brush), Changed<Brush>>,
) {
    for (entity, brush) in &changed_brushes {
        let (vertices, face_polygons) = compute_brush_geometry(&brush.faces);
        if vertices.is_empty() && !brush.faces.is_empty() {
            warn!("Brush {entity} has no closed volume; it will snap to its origin only");
        }
        commands.entity(entity).insert(BrushMeshCache {
            vertices,
            face_polygons,
        });
    }
}
