use bevy::{math::bounding::Aabb3d, prelude::*};

use super::{candidates::CandidateObject, vertex_source::VertexSource};
use crate::{
    scene::{
        NEARLY_ZERO, SnapAxis, SnapComponent, SnapPlane, SnapScene, SnapVertex, SnapView,
        aabb_contains_point,
    },
    snap_helpers::SnapHelperSink,
};

/// Vertices farther than this from the camera are never screen-space targets.
pub const MAX_CAMERA_DISTANCE: f32 = 100_000.0;
const MAX_CAMERA_DISTANCE_SQUARED: f32 = MAX_CAMERA_DISTANCE * MAX_CAMERA_DISTANCE;

/// Inputs of one nearest-vertex search.
#[derive(Clone, Copy, Debug)]
pub struct SnapQuery {
    /// Passes through `unsnapped_location`, facing the drag direction.
    pub reference_plane: SnapPlane,
    pub unsnapped_location: Vec3,
    pub axis: SnapAxis,
    /// Pointer in viewport pixels.
    pub pointer: Vec2,
    pub draw_helpers: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosestVertex {
    pub vertex: SnapVertex,
    /// Object owning the vertex. `None` means nothing to snap to.
    pub target: Option<Entity>,
}

impl SnapQuery {
    /// Distance of `vertex` under this query's metric, smaller is better.
    /// `None` rejects the vertex.
    pub fn score(&self, vertex: &SnapVertex, allowed_region: &Aabb3d, view: &impl SnapView) -> Option<f32> {
        if !self.axis.is_screen() {
            let distance = self.reference_plane.signed_distance(vertex.position);
            return (distance >= 0.0).then_some(distance);
        }

        let position = vertex.position;
        let screen = view.world_to_screen(position)?;
        if !view.is_on_screen(screen) {
            return None;
        }
        let to_camera = view.view_origin() - position;
        if to_camera.length_squared() > MAX_CAMERA_DISTANCE_SQUARED {
            return None;
        }
        if view.is_perspective() {
            if vertex.normal != Vec3::ZERO && to_camera.dot(vertex.normal) < 0.0 {
                return None;
            }
            if !aabb_contains_point(allowed_region, position) {
                return None;
            }
        }
        Some(screen.distance_squared(self.pointer))
    }
}

/// Best vertex of a single component.
///
/// Returns the candidate's origin with a zero normal and `false` when the
/// component has no geometry or none of its vertices pass the query's filters.
pub fn closest_on_component(
    candidate: &CandidateObject,
    component: &SnapComponent<'_>,
    query: &SnapQuery,
    view: &impl SnapView,
) -> (SnapVertex, bool) {
    let fallback = SnapVertex::at(candidate.origin);
    let Some(source) = VertexSource::new(component) else {
        return (fallback, false);
    };

    let mut best: Option<(f32, SnapVertex)> = None;
    for vertex in source {
        let Some(score) = query.score(&vertex, &candidate.allowed_region, view) else {
            continue;
        };
        if best.is_none_or(|(best_score, _)| score < best_score) {
            best = Some((score, vertex));
        }
    }

    match best {
        Some((_, vertex)) => (vertex, true),
        None => (fallback, false),
    }
}

/// Closest point across every candidate.
///
/// Points that coincide with the unsnapped location are ignored. When nothing
/// else qualifies the unsnapped location itself comes back with no target.
pub fn closest(
    candidates: &[CandidateObject],
    query: &SnapQuery,
    scene: &impl SnapScene,
    view: &impl SnapView,
) -> ClosestVertex {
    let mut best: Option<(f32, ClosestVertex)> = None;

    for candidate in candidates {
        if !scene.is_alive(candidate.entity) {
            continue;
        }
        let components = scene.components(candidate.entity);
        let points: Vec<SnapVertex> = if components.is_empty() {
            vec![SnapVertex::at(candidate.origin)]
        } else {
            components
                .iter()
                .map(|component| closest_on_component(candidate, component, query, view).0)
                .collect()
        };

        for point in points {
            if point.position.abs_diff_eq(query.unsnapped_location, NEARLY_ZERO) {
                continue;
            }
            let Some(score) = query.score(&point, &candidate.allowed_region, view) else {
                continue;
            };
            if best.is_none_or(|(best_score, _)| score < best_score) {
                best = Some((
                    score,
                    ClosestVertex {
                        vertex: point,
                        target: Some(candidate.entity),
                    },
                ));
            }
        }
    }

    best.map(|(_, found)| found).unwrap_or(ClosestVertex {
        vertex: SnapVertex::at(query.unsnapped_location),
        target: None,
    })
}

/// [`closest`], then point the helper overlay at the winner (or clear it when
/// helpers are off).
pub fn closest_with_helpers(
    candidates: &[CandidateObject],
    query: &SnapQuery,
    scene: &impl SnapScene,
    view: &impl SnapView,
    overlay: &mut impl SnapHelperSink,
    now: f32,
) -> ClosestVertex {
    let found = closest(candidates, query, scene, view);
    if query.draw_helpers {
        overlay.highlight(found.target, now);
    } else {
        overlay.clear(true, now);
    }
    found
}
