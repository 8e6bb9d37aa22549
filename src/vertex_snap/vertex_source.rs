use bevy::{
    math::{Affine3A, Mat3A},
    prelude::*,
};
use jackdaw_geometry::flatten_face_polygons;

use crate::scene::{ComponentGeometry, SkinSection, SnapComponent, SnapVertex};

/// Local-to-world transform of a component plus the matrix used for normals.
#[derive(Clone, Copy, Debug)]
struct VertexTransform {
    world_from_local: Affine3A,
    normal_matrix: Mat3A,
}

impl VertexTransform {
    fn new(world_from_local: Affine3A) -> Self {
        let linear = world_from_local.matrix3;
        // Inverse-transpose keeps normals perpendicular under non-uniform scale.
        // A collapsed axis has no inverse; fall back to the linear part.
        let normal_matrix = if linear.determinant().abs() > f32::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };
        Self {
            world_from_local,
            normal_matrix,
        }
    }

    fn point(&self, local: Vec3) -> Vec3 {
        self.world_from_local.transform_point3(local)
    }

    fn normal(&self, local: Vec3) -> Vec3 {
        self.normal_matrix.mul_vec3(local).normalize_or_zero()
    }
}

/// Cursor over the world-space vertices of one renderable component.
///
/// Built with [`VertexSource::new`], which picks the variant from the component's
/// geometry. Also usable as an `Iterator<Item = SnapVertex>`.
#[derive(Clone, Debug)]
pub enum VertexSource<'a> {
    TriangleMesh(MeshVertices<'a>),
    SkinnedMesh(SkinnedVertices<'a>),
    Brush(BrushVertices),
}

#[derive(Clone, Debug)]
pub struct MeshVertices<'a> {
    positions: &'a [[f32; 3]],
    normals: Option<&'a [[f32; 3]]>,
    index: usize,
    transform: VertexTransform,
}

#[derive(Clone, Debug)]
pub struct SkinnedVertices<'a> {
    sections: Vec<SkinSection<'a>>,
    section: usize,
    index: usize,
    transform: VertexTransform,
}

#[derive(Clone, Debug)]
pub struct BrushVertices {
    vertices: Vec<Vec3>,
    index: usize,
    transform: VertexTransform,
}

impl<'a> VertexSource<'a> {
    /// `None` when the component carries no usable geometry.
    pub fn new(component: &SnapComponent<'a>) -> Option<Self> {
        let transform = VertexTransform::new(component.world_from_local);
        match &component.geometry {
            ComponentGeometry::None => None,
            ComponentGeometry::TriangleMesh { positions, normals } => {
                Some(Self::TriangleMesh(MeshVertices {
                    positions: *positions,
                    normals: *normals,
                    index: 0,
                    transform,
                }))
            }
            ComponentGeometry::SkinnedMesh { sections } => {
                let mut source = SkinnedVertices {
                    sections: sections.clone(),
                    section: 0,
                    index: 0,
                    transform,
                };
                source.skip_empty_sections();
                Some(Self::SkinnedMesh(source))
            }
            ComponentGeometry::Brush {
                vertices,
                face_polygons,
            } => Some(Self::Brush(BrushVertices {
                vertices: flatten_face_polygons(*vertices, *face_polygons),
                index: 0,
                transform,
            })),
        }
    }

    pub fn has_next(&self) -> bool {
        match self {
            Self::TriangleMesh(mesh) => mesh.index < mesh.positions.len(),
            Self::SkinnedMesh(skinned) => skinned.current_section().is_some(),
            Self::Brush(brush) => brush.index < brush.vertices.len(),
        }
    }

    /// Step to the next vertex. Does nothing once exhausted.
    pub fn advance(&mut self) {
        if !self.has_next() {
            return;
        }
        match self {
            Self::TriangleMesh(mesh) => mesh.index += 1,
            Self::SkinnedMesh(skinned) => {
                skinned.index += 1;
                skinned.skip_empty_sections();
            }
            Self::Brush(brush) => brush.index += 1,
        }
    }

    /// World-space position of the current vertex (zero once exhausted).
    pub fn position(&self) -> Vec3 {
        match self {
            Self::TriangleMesh(mesh) => mesh
                .positions
                .get(mesh.index)
                .map(|p| mesh.transform.point(Vec3::from_array(*p)))
                .unwrap_or_default(),
            Self::SkinnedMesh(skinned) => skinned
                .current_section()
                .and_then(|section| section.positions.get(skinned.index))
                .map(|p| skinned.transform.point(Vec3::from_array(*p)))
                .unwrap_or_default(),
            Self::Brush(brush) => brush
                .vertices
                .get(brush.index)
                .map(|p| brush.transform.point(*p))
                .unwrap_or_default(),
        }
    }

    /// World-space normal of the current vertex, zero when the data has none.
    pub fn normal(&self) -> Vec3 {
        match self {
            Self::TriangleMesh(mesh) => mesh
                .normals
                .and_then(|normals| normals.get(mesh.index))
                .map(|n| mesh.transform.normal(Vec3::from_array(*n)))
                .unwrap_or_default(),
            Self::SkinnedMesh(skinned) => skinned
                .current_section()
                .and_then(|section| section.normals)
                .and_then(|normals| normals.get(skinned.index))
                .map(|n| skinned.transform.normal(Vec3::from_array(*n)))
                .unwrap_or_default(),
            // Solid geometry corners are shared by several faces
            Self::Brush(_) => Vec3::ZERO,
        }
    }

    pub fn current(&self) -> SnapVertex {
        SnapVertex::new(self.position(), self.normal())
    }
}

impl Iterator for VertexSource<'_> {
    type Item = SnapVertex;

    fn next(&mut self) -> Option<SnapVertex> {
        if !self.has_next() {
            return None;
        }
        let vertex = self.current();
        self.advance();
        Some(vertex)
    }
}

impl<'a> SkinnedVertices<'a> {
    fn current_section(&self) -> Option<&SkinSection<'a>> {
        self.sections
            .get(self.section)
            .filter(|section| self.index < section.positions.len())
    }

    fn skip_empty_sections(&mut self) {
        while let Some(section) = self.sections.get(self.section) {
            if self.index < section.positions.len() {
                return;
            }
            self.section += 1;
            self.index = 0;
        }
    }
}
