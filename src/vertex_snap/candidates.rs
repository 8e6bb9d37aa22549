use bevy::{
    ecs::entity::EntityHashSet,
    math::bounding::{Aabb3d, IntersectsVolume},
    prelude::*,
};

use crate::scene::{ObjectKind, SnapAxis, SnapScene, SnapView};

/// An object worth searching for snap points during one query.
///
/// Only valid for the query that produced it: the entity may be gone by the
/// next frame, so resolvers look it up again through the scene.
#[derive(Clone, Copy, Debug)]
pub struct CandidateObject {
    pub entity: Entity,
    pub origin: Vec3,
    pub allowed_region: Aabb3d,
}

/// Objects a drag must never snap to: the selection itself, everything attached
/// below it, and the rest of any unlocked group a selected object belongs to.
///
/// A locked group moves as one rigid body, so its unselected members stay valid
/// targets and contribute nothing here.
pub fn build_ignore_set(
    scene: &impl SnapScene,
    selection: &[Entity],
    grouping_active: bool,
) -> EntityHashSet {
    let mut ignore = EntityHashSet::default();
    for &entity in selection {
        ignore.insert(entity);
        ignore.extend(scene.descendants(entity));

        if !grouping_active {
            continue;
        }
        let Some(group) = scene.group(entity) else {
            continue;
        };
        if group.locked {
            continue;
        }
        for member in group.members {
            ignore.insert(member);
            ignore.extend(scene.descendants(member));
        }
    }
    ignore
}

/// Gather the objects whose vertices could be snapped to.
///
/// Screen-space drags in a perspective view prefer whatever sits directly under
/// the pointer; otherwise every visible object overlapping both `allowed_region`
/// and the view frustum is returned.
pub fn collect_candidates(
    scene: &impl SnapScene,
    view: &impl SnapView,
    allowed_region: Aabb3d,
    pointer: Vec2,
    axis: SnapAxis,
    ignore: &EntityHashSet,
) -> Vec<CandidateObject> {
    if axis.is_screen()
        && view.is_perspective()
        && let Some(picked) = view.pick(pointer, ignore)
        && let Some(candidate) = picked_candidate(scene, picked, allowed_region)
    {
        return vec![candidate];
    }

    let mut candidates = Vec::new();
    for entity in scene.objects() {
        if ignore.contains(&entity) {
            continue;
        }
        let Some(info) = scene.object(entity) else {
            continue;
        };
        if info.hidden || info.kind == ObjectKind::Placeholder {
            continue;
        }
        if !info.bounds.intersects(&allowed_region) || !view.intersects_frustum(&info.bounds) {
            continue;
        }
        candidates.push(CandidateObject {
            entity,
            origin: info.origin,
            allowed_region,
        });
    }
    candidates
}

fn picked_candidate(
    scene: &impl SnapScene,
    entity: Entity,
    allowed_region: Aabb3d,
) -> Option<CandidateObject> {
    let info = scene.object(entity)?;
    if info.hidden || info.kind == ObjectKind::Placeholder || scene.components(entity).is_empty() {
        return None;
    }
    Some(CandidateObject {
        entity,
        origin: info.origin,
        allowed_region,
    })
}
