use bevy::prelude::*;

pub const EPSILON: f32 = 1e-4;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Half-space boundary: points with `normal.dot(p) <= distance` are inside.
#[derive(Clone, Copy, Debug, Reflect, Default, PartialEq)]
pub struct BrushPlane {
    pub normal: Vec3,
    pub distance: f32,
}

impl BrushPlane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }
}

#[derive(Clone, Debug, Reflect, Default, PartialEq)]
pub struct BrushFace {
    pub plane: BrushPlane,
}

impl From<BrushPlane> for BrushFace {
    fn from(plane: BrushPlane) -> Self {
        Self { plane }
    }
}

/// Six axis-aligned faces of a box centered on the local origin.
pub fn cuboid_faces(half_extents: Vec3) -> Vec<BrushFace> {
    [
        (Vec3::X, half_extents.x),
        (Vec3::NEG_X, half_extents.x),
        (Vec3::Y, half_extents.y),
        (Vec3::NEG_Y, half_extents.y),
        (Vec3::Z, half_extents.z),
        (Vec3::NEG_Z, half_extents.z),
    ]
    .into_iter()
    .map(|(normal, distance)| BrushPlane::new(normal, distance).into())
    .collect()
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Solve the intersection of three planes. Returns None if degenerate.
pub fn plane_triple_intersection(p1: &BrushPlane, p2: &BrushPlane, p3: &BrushPlane) -> Option<Vec3> {
    let n1 = p1.normal;
    let n2 = p2.normal;
    let n3 = p3.normal;

    let det = n1.dot(n2.cross(n3));
    if det.abs() < EPSILON {
        return None;
    }

    let point = (n2.cross(n3) * p1.distance + n3.cross(n1) * p2.distance + n1.cross(n2) * p3.distance) / det;
    Some(point)
}

/// Check if a point is inside (or on the boundary of) all half-planes.
pub fn point_inside_all_planes(point: Vec3, faces: &[BrushFace]) -> bool {
    faces
        .iter()
        .all(|face| face.plane.normal.dot(point) <= face.plane.distance + EPSILON)
}

/// Compute brush geometry from face planes.
/// Returns (unique vertices, per-face polygon vertex indices).
pub fn compute_brush_geometry(faces: &[BrushFace]) -> (Vec<Vec3>, Vec<Vec<usize>>) {
    let n = faces.len();
    let mut vertices: Vec<Vec3> = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let Some(point) =
                    plane_triple_intersection(&faces[i].plane, &faces[j].plane, &faces[k].plane)
                else {
                    continue;
                };
                if !point_inside_all_planes(point, faces) {
                    continue;
                }
                // Three or more planes can meet in the same corner
                if !vertices.iter().any(|v| (*v - point).length() < EPSILON) {
                    vertices.push(point);
                }
            }
        }
    }

    let mut face_polygons = Vec::with_capacity(n);
    for face in faces {
        let mut face_verts: Vec<usize> = vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| (face.plane.normal.dot(**v) - face.plane.distance).abs() < EPSILON)
            .map(|(vi, _)| vi)
            .collect();

        if face_verts.len() >= 3 {
            sort_face_vertices_by_winding(&vertices, &mut face_verts, face.plane.normal);
        }

        face_polygons.push(face_verts);
    }

    (vertices, face_polygons)
}

/// Sort face vertex indices by winding order around the face normal.
pub fn sort_face_vertices_by_winding(vertices: &[Vec3], indices: &mut [usize], normal: Vec3) {
    if indices.len() < 3 {
        return;
    }

    let centroid: Vec3 = indices.iter().map(|&i| vertices[i]).sum::<Vec3>() / indices.len() as f32;
    let (u_axis, v_axis) = compute_face_tangent_axes(normal);

    indices.sort_by(|&a, &b| {
        let da = vertices[a] - centroid;
        let db = vertices[b] - centroid;
        let angle_a = da.dot(v_axis).atan2(da.dot(u_axis));
        let angle_b = db.dot(v_axis).atan2(db.dot(u_axis));
        angle_a.partial_cmp(&angle_b).unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Compute tangent axes for a face from its normal (paraxial projection).
pub fn compute_face_tangent_axes(normal: Vec3) -> (Vec3, Vec3) {
    let abs_n = normal.abs();
    let up = if abs_n.y >= abs_n.x && abs_n.y >= abs_n.z {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let u = normal.cross(up).normalize_or_zero();
    let v = normal.cross(u).normalize_or_zero();
    (u, v)
}

/// Walk every face polygon in order and emit its corner positions.
///
/// Corners shared between faces are emitted once per face, so a cuboid yields
/// 24 points rather than 8.
pub fn flatten_face_polygons(vertices: &[Vec3], face_polygons: &[Vec<usize>]) -> Vec<Vec3> {
    face_polygons
        .iter()
        .flat_map(|polygon| polygon.iter().filter_map(|&vi| vertices.get(vi).copied()))
        .collect()
}
