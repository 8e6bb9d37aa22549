use bevy::{ecs::entity::EntityHashMap, prelude::*};

use crate::{
    ecs_scene::EcsSnapScene,
    scene::{SnapScene, SnapVertex},
    vertex_snap::VertexSource,
};

/// Seconds a released highlight takes to shrink away.
pub const FADE_TIME: f32 = 0.15;

const HELPER_RADIUS: f32 = 0.05;
const HELPER_COLOR: Color = Color::srgba(1.0, 0.6, 0.1, 1.0);

/// Receives the outcome of a vertex search for presentation.
pub trait SnapHelperSink {
    /// `target` becomes the highlighted object; `None` releases the current one.
    fn highlight(&mut self, target: Option<Entity>, now: f32);

    fn clear(&mut self, immediate: bool, now: f32);
}

/// Discards all helper updates.
impl SnapHelperSink for () {
    fn highlight(&mut self, _target: Option<Entity>, _now: f32) {}

    fn clear(&mut self, _immediate: bool, _now: f32) {}
}

/// Which object's vertices are drawn as snap helpers, plus recently released
/// objects still fading out. Entries for despawned objects are dropped the
/// next time points are gathered.
#[derive(Resource, Default, Debug)]
pub struct SnapHelperOverlay {
    current: Option<Entity>,
    /// Fade start time per released object.
    fading: EntityHashMap<f32>,
}

/// One helper marker, `scale` in `0..=1` of the full marker size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HelperPoint {
    pub position: Vec3,
    pub scale: f32,
}

impl SnapHelperOverlay {
    pub fn current(&self) -> Option<Entity> {
        self.current
    }

    pub fn fading_len(&self) -> usize {
        self.fading.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.fading.is_empty()
    }

    /// Make `target` the highlighted object. The previous one, if different,
    /// starts fading at `now`.
    pub fn set_target(&mut self, target: Option<Entity>, now: f32) {
        if self.current == target {
            return;
        }
        if let Some(previous) = self.current.take() {
            self.fading.insert(previous, now);
        }
        if let Some(target) = target {
            self.fading.remove(&target);
        }
        self.current = target;
    }

    /// Drop everything at once, or let the current target fade out.
    pub fn clear(&mut self, immediate: bool, now: f32) {
        if immediate {
            self.current = None;
            self.fading.clear();
        } else {
            self.set_target(None, now);
        }
    }

    /// Markers to draw at `now`, pruning dead and fully faded entries first.
    pub fn helper_points(&mut self, scene: &impl SnapScene, now: f32) -> Vec<HelperPoint> {
        self.fading
            .retain(|&entity, &mut start| now - start < FADE_TIME && scene.is_alive(entity));
        if self.current.is_some_and(|entity| !scene.is_alive(entity)) {
            self.current = None;
        }

        let mut points = Vec::new();
        if let Some(entity) = self.current {
            points.extend(object_vertices(scene, entity).map(|vertex| HelperPoint {
                position: vertex.position,
                scale: 1.0,
            }));
        }
        for (&entity, &start) in &self.fading {
            let scale = (1.0 - (now - start) / FADE_TIME).clamp(0.0, 1.0);
            points.extend(object_vertices(scene, entity).map(|vertex| HelperPoint {
                position: vertex.position,
                scale,
            }));
        }
        points
    }
}

impl SnapHelperSink for SnapHelperOverlay {
    fn highlight(&mut self, target: Option<Entity>, now: f32) {
        self.set_target(target, now);
    }

    fn clear(&mut self, immediate: bool, now: f32) {
        SnapHelperOverlay::clear(self, immediate, now);
    }
}

/// Every vertex of every component of `entity`, or its origin when it has no
/// geometry at all.
fn object_vertices(scene: &impl SnapScene, entity: Entity) -> impl Iterator<Item = SnapVertex> {
    let mut vertices: Vec<SnapVertex> = scene
        .components(entity)
        .iter()
        .filter_map(VertexSource::new)
        .flatten()
        .collect();
    if vertices.is_empty()
        && let Some(info) = scene.object(entity)
    {
        vertices.push(SnapVertex::at(info.origin));
    }
    vertices.into_iter()
}

pub(crate) fn draw_snap_helpers(
    mut overlay: ResMut<SnapHelperOverlay>,
    scene: EcsSnapScene,
    time: Res<Time>,
    mut gizmos: Gizmos,
) {
    if overlay.is_empty() {
        return;
    }
    for point in overlay.helper_points(&scene, time.elapsed_secs()) {
        gizmos.sphere(
            Isometry3d::from_translation(point.position),
            HELPER_RADIUS * point.scale,
            HELPER_COLOR,
        );
    }
}
