use bevy::{ecs::entity::EntityHashSet, math::bounding::Aabb3d, prelude::*};

use super::{
    candidates::{build_ignore_set, collect_candidates},
    resolver::{SnapQuery, closest_with_helpers},
};
use crate::{
    scene::{NEARLY_ZERO, ObjectKind, SnapAxis, SnapPlane, SnapScene, SnapView, aabb_from_min_max},
    snap_helpers::SnapHelperSink,
    snapping::SnapSettings,
};

/// Everything a snap call reads from the editor for one frame.
pub struct SnapContext<'a, S: SnapScene, V: SnapView> {
    pub scene: &'a S,
    pub view: &'a V,
    /// Objects being dragged.
    pub selection: &'a [Entity],
    pub settings: &'a SnapSettings,
    /// Pointer in viewport pixels.
    pub pointer: Vec2,
}

/// Turns raw per-frame drag deltas into snapped ones.
///
/// Vertex snapping is evaluated from scratch every frame. Pivot snapping keeps
/// the object it is stuck to until the pivot leaves the snap radius or the drag
/// ends.
#[derive(Resource, Default, Debug)]
pub struct DragSnapEngine {
    stuck_to: Option<Entity>,
}

impl DragSnapEngine {
    /// Object the pivot is currently stuck to, if any.
    pub fn snapped_to(&self) -> Option<Entity> {
        self.stuck_to
    }

    pub fn end_drag(&mut self) {
        if let Some(entity) = self.stuck_to.take() {
            debug!("Drag ended, released pivot snap to {entity}");
        }
    }

    /// Correct `delta` so the dragged objects land on the nearest vertex.
    ///
    /// Returns `false` with `delta` untouched when vertex snapping is off, the
    /// delta is zero, or nothing is in reach. When a target is found the snapped
    /// delta is kept only if it ends strictly closer to the drag target than the
    /// start does; otherwise `delta` is zeroed. Both of those return `true`.
    pub fn snap_dragged_objects<S: SnapScene, V: SnapView>(
        &mut self,
        delta: &mut Vec3,
        axis: SnapAxis,
        start: Vec3,
        ctx: &SnapContext<S, V>,
        overlay: &mut impl SnapHelperSink,
        now: f32,
    ) -> bool {
        if !ctx.settings.vertex_snap_held || delta.abs_diff_eq(Vec3::ZERO, NEARLY_ZERO) {
            return false;
        }

        let desired = start + *delta;
        let region = allowed_region(desired, start, ctx.settings.vertex_snap_distance);
        let ignore = build_ignore_set(ctx.scene, ctx.selection, ctx.settings.grouping_active);
        let candidates = collect_candidates(ctx.scene, ctx.view, region, ctx.pointer, axis, &ignore);

        let query = SnapQuery {
            reference_plane: SnapPlane::from_point_normal(desired, *delta),
            unsnapped_location: desired,
            axis,
            pointer: ctx.pointer,
            draw_helpers: ctx.settings.draw_vertex_helpers,
        };
        let found = closest_with_helpers(&candidates, &query, ctx.scene, ctx.view, overlay, now);
        let Some(target) = found.target else {
            return false;
        };

        let closest = found.vertex.position;
        let snapped_delta = match axis.direction() {
            Some(direction) => direction * (closest - start).dot(direction),
            None => closest - start,
        };

        if ends_closer(start, start + snapped_delta, desired, axis, ctx) {
            debug!("Vertex snap to {target} at {closest}");
            *delta = snapped_delta;
        } else {
            *delta = Vec3::ZERO;
        }
        true
    }

    /// Stick `pivot` to the origin of the nearest other object within
    /// [`SnapSettings::actor_snap_radius`] of `pivot + delta`.
    ///
    /// While stuck, `pivot` is overwritten and `delta` zeroed. Once the
    /// dragged location leaves the radius the stick is released and `delta`
    /// passes through unchanged.
    pub fn snap_actors_to_nearest_actor<S: SnapScene, V: SnapView>(
        &mut self,
        delta: &mut Vec3,
        pivot: &mut Vec3,
        ctx: &SnapContext<S, V>,
    ) -> bool {
        if !ctx.settings.actor_snap {
            self.end_drag();
            return false;
        }

        let location = *pivot + *delta;
        let radius = ctx.settings.actor_snap_radius;
        let excluded: EntityHashSet = ctx
            .selection
            .iter()
            .flat_map(|&entity| std::iter::once(entity).chain(ctx.scene.descendants(entity)))
            .collect();

        let mut nearest: Option<(f32, Entity, Vec3)> = None;
        for entity in ctx.scene.objects() {
            if excluded.contains(&entity) {
                continue;
            }
            let Some(info) = ctx.scene.object(entity) else {
                continue;
            };
            if matches!(info.kind, ObjectKind::Volume | ObjectKind::Placeholder) {
                continue;
            }
            if let Some(group) = ctx.scene.group(entity) {
                let has_selected = group.members.iter().any(|m| ctx.selection.contains(m));
                if group.locked && !has_selected {
                    continue;
                }
            }
            let distance = info.origin.distance_squared(location);
            if distance <= radius * radius && nearest.is_none_or(|(best, ..)| distance < best) {
                nearest = Some((distance, entity, info.origin));
            }
        }

        match nearest {
            Some((_, entity, origin)) => {
                if self.stuck_to != Some(entity) {
                    debug!("Pivot snapped to {entity}");
                }
                self.stuck_to = Some(entity);
                *pivot = origin;
                *delta = Vec3::ZERO;
                true
            }
            None => {
                if let Some(entity) = self.stuck_to.take() {
                    debug!("Pivot left snap radius of {entity}");
                }
                false
            }
        }
    }

    /// Screen-space vertex snap of a lone location, e.g. the pivot itself.
    ///
    /// Nothing is ignored, so the selection's own vertices are valid targets.
    /// The result is applied without the commit check.
    pub fn snap_drag_location_to_nearest_vertex<S: SnapScene, V: SnapView>(
        &self,
        base: Vec3,
        delta: &mut Vec3,
        ctx: &SnapContext<S, V>,
        overlay: &mut impl SnapHelperSink,
        now: f32,
    ) -> bool {
        if !ctx.settings.vertex_snap_held {
            return false;
        }

        let desired = base + *delta;
        let region = allowed_region(desired, base, ctx.settings.vertex_snap_distance);
        let ignore = EntityHashSet::default();
        let candidates = collect_candidates(
            ctx.scene,
            ctx.view,
            region,
            ctx.pointer,
            SnapAxis::Screen,
            &ignore,
        );

        let query = SnapQuery {
            reference_plane: SnapPlane::from_point_normal(desired, *delta),
            unsnapped_location: desired,
            axis: SnapAxis::Screen,
            pointer: ctx.pointer,
            draw_helpers: ctx.settings.draw_vertex_helpers,
        };
        let found = closest_with_helpers(&candidates, &query, ctx.scene, ctx.view, overlay, now);
        if found.target.is_none() {
            return false;
        }
        *delta = found.vertex.position - base;
        true
    }
}

/// Box of half-extent `reach` around `desired`, grown to contain `start`.
fn allowed_region(desired: Vec3, start: Vec3, reach: f32) -> Aabb3d {
    let reach = Vec3::splat(reach.max(0.0));
    aabb_from_min_max((desired - reach).min(start), (desired + reach).max(start))
}

/// Whether `snapped` is strictly closer to the drag target than `start`.
///
/// World distance to `desired` for world-axis drags in a perspective view,
/// pixel distance to the pointer otherwise.
fn ends_closer<S: SnapScene, V: SnapView>(
    start: Vec3,
    snapped: Vec3,
    desired: Vec3,
    axis: SnapAxis,
    ctx: &SnapContext<S, V>,
) -> bool {
    if (!ctx.view.is_perspective() || axis.is_screen())
        && let (Some(from_snapped), Some(from_start)) =
            (ctx.view.world_to_screen(snapped), ctx.view.world_to_screen(start))
    {
        return from_snapped.distance_squared(ctx.pointer)
            < from_start.distance_squared(ctx.pointer);
    }
    snapped.distance_squared(desired) < start.distance_squared(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestObject, TestScene, TestView};
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn vertex_settings(distance: f32) -> SnapSettings {
        SnapSettings {
            vertex_snap_held: true,
            vertex_snap_distance: distance,
            draw_vertex_helpers: false,
            ..default()
        }
    }

    fn actor_settings(radius: f32) -> SnapSettings {
        SnapSettings {
            actor_snap: true,
            actor_snap_radius: radius,
            ..default()
        }
    }

    fn ctx<'a>(
        scene: &'a TestScene,
        view: &'a TestView,
        selection: &'a [Entity],
        settings: &'a SnapSettings,
        pointer: Vec2,
    ) -> SnapContext<'a, TestScene, TestView> {
        SnapContext {
            scene,
            view,
            selection,
            settings,
            pointer,
        }
    }

    #[test]
    fn drag_along_x_snaps_to_the_nearest_object_ahead() {
        let mut scene = TestScene::new();
        let _origin_cube = scene.spawn_cube(Vec3::ZERO, 10.0);
        let _near_cube = scene.spawn_cube(Vec3::new(100.0, 0.0, 0.0), 10.0);
        let _far_cube = scene.spawn_cube(Vec3::new(1000.0, 0.0, 0.0), 10.0);
        let start = Vec3::new(-50.0, 0.0, 0.0);
        let dragged = scene.spawn_cube(start, 10.0);
        let view = TestView::perspective(Vec3::new(100.0, 200.0, 800.0), Vec3::new(100.0, 0.0, 0.0));
        let settings = vertex_settings(300.0);
        let selection = [dragged];
        let ctx = ctx(&scene, &view, &selection, &settings, Vec2::ZERO);

        let mut delta = Vec3::new(155.0, 0.0, 0.0);
        let mut engine = DragSnapEngine::default();
        assert!(engine.snap_dragged_objects(&mut delta, SnapAxis::X, start, &ctx, &mut (), 0.0));

        let landed = start + delta;
        assert_eq!(landed, Vec3::new(110.0, 0.0, 0.0));
        assert!((90.0..=110.0).contains(&landed.x));
    }

    #[test]
    fn zero_delta_never_scans_the_scene() {
        let mut scene = TestScene::new();
        scene.spawn_cube(Vec3::ZERO, 10.0);
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = vertex_settings(300.0);
        let ctx = ctx(&scene, &view, &[], &settings, Vec2::ZERO);

        let mut delta = Vec3::ZERO;
        let mut engine = DragSnapEngine::default();
        assert!(!engine.snap_dragged_objects(&mut delta, SnapAxis::Screen, Vec3::ONE, &ctx, &mut (), 0.0));
        assert_eq!(delta, Vec3::ZERO);
        assert_eq!(scene.scans.get(), 0);
    }

    #[rstest]
    #[case(SnapAxis::X, Vec3::new(12.0, 0.0, 0.0))]
    #[case(SnapAxis::Y, Vec3::new(0.0, -7.5, 0.0))]
    #[case(SnapAxis::Screen, Vec3::new(3.0, 4.0, -2.0))]
    fn nothing_in_reach_leaves_delta_untouched(#[case] axis: SnapAxis, #[case] drag: Vec3) {
        let mut scene = TestScene::new();
        scene.spawn_cube(Vec3::new(5000.0, 0.0, 0.0), 10.0);
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = vertex_settings(30.0);
        let ctx = ctx(&scene, &view, &[], &settings, Vec2::new(400.0, 300.0));

        let mut delta = drag;
        let mut engine = DragSnapEngine::default();
        assert!(!engine.snap_dragged_objects(&mut delta, axis, Vec3::ZERO, &ctx, &mut (), 0.0));
        assert_eq!(delta, drag);
    }

    #[test]
    fn disabled_vertex_snap_is_a_no_op() {
        let mut scene = TestScene::new();
        scene.spawn_cube(Vec3::new(10.0, 0.0, 0.0), 1.0);
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = SnapSettings {
            vertex_snap_held: false,
            ..vertex_settings(300.0)
        };
        let ctx = ctx(&scene, &view, &[], &settings, Vec2::ZERO);

        let mut delta = Vec3::new(5.0, 0.0, 0.0);
        let mut engine = DragSnapEngine::default();
        assert!(!engine.snap_dragged_objects(&mut delta, SnapAxis::X, Vec3::ZERO, &ctx, &mut (), 0.0));
        assert_eq!(delta, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn snap_farther_from_pointer_than_start_is_rejected() {
        let mut scene = TestScene::new();
        scene.spawn_cube(Vec3::new(120.0, 0.0, 0.0), 10.0);
        let view = TestView::front_ortho(Vec3::ZERO, 1.0);
        let settings = vertex_settings(300.0);
        let pointer = view.world_to_screen(Vec3::new(50.0, 0.0, 0.0)).unwrap();
        let ctx = ctx(&scene, &view, &[], &settings, pointer);

        let mut delta = Vec3::new(50.0, 0.0, 0.0);
        let mut engine = DragSnapEngine::default();
        assert!(engine.snap_dragged_objects(&mut delta, SnapAxis::Screen, Vec3::ZERO, &ctx, &mut (), 0.0));
        assert_eq!(delta, Vec3::ZERO);
    }

    #[test]
    fn perspective_axis_snap_farther_from_target_is_rejected() {
        let mut scene = TestScene::new();
        // Nearest corner ahead of the drag is x = 35, 25 past the target at x = 10
        scene.spawn_cube(Vec3::new(40.0, 0.0, 0.0), 5.0);
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = vertex_settings(50.0);
        let ctx = ctx(&scene, &view, &[], &settings, Vec2::ZERO);

        let mut delta = Vec3::new(10.0, 0.0, 0.0);
        let mut engine = DragSnapEngine::default();
        assert!(engine.snap_dragged_objects(&mut delta, SnapAxis::X, Vec3::ZERO, &ctx, &mut (), 0.0));
        assert_eq!(delta, Vec3::ZERO);
    }

    proptest! {
        #[test]
        fn axis_snaps_commit_only_when_closer_to_the_target(
            target_x in -200.0f32..200.0,
            drag_x in -150.0f32..150.0,
        ) {
            prop_assume!(drag_x.abs() > 0.01);
            let mut scene = TestScene::new();
            scene.spawn(TestObject::empty(Vec3::new(target_x, 0.0, 0.0)));
            let view = TestView::perspective(Vec3::new(0.0, 50.0, 800.0), Vec3::ZERO);
            let settings = vertex_settings(400.0);
            let ctx = ctx(&scene, &view, &[], &settings, Vec2::ZERO);

            let desired = Vec3::new(drag_x, 0.0, 0.0);
            let mut delta = desired;
            let mut engine = DragSnapEngine::default();
            if engine.snap_dragged_objects(&mut delta, SnapAxis::X, Vec3::ZERO, &ctx, &mut (), 0.0) {
                prop_assert!(
                    delta == Vec3::ZERO || delta.distance(desired) < desired.length(),
                    "delta {delta} for drag {desired}"
                );
                prop_assert_eq!(delta.y, 0.0);
                prop_assert_eq!(delta.z, 0.0);
            } else {
                prop_assert_eq!(delta, desired);
            }
        }
    }

    #[test]
    fn snap_closer_to_pointer_is_committed() {
        let mut scene = TestScene::new();
        scene.spawn_cube(Vec3::new(60.0, 0.0, 0.0), 5.0);
        let view = TestView::front_ortho(Vec3::ZERO, 1.0);
        let settings = vertex_settings(300.0);
        let pointer = view.world_to_screen(Vec3::new(50.0, 0.0, 0.0)).unwrap();
        let ctx = ctx(&scene, &view, &[], &settings, pointer);

        let mut delta = Vec3::new(50.0, 0.0, 0.0);
        let mut engine = DragSnapEngine::default();
        assert!(engine.snap_dragged_objects(&mut delta, SnapAxis::Screen, Vec3::ZERO, &ctx, &mut (), 0.0));
        assert_relative_eq!(delta.x, 55.0, epsilon = 1e-3);
        assert_relative_eq!(delta.y.abs(), 5.0, epsilon = 1e-3);

        let snapped = view.world_to_screen(delta).unwrap();
        let unmoved = view.world_to_screen(Vec3::ZERO).unwrap();
        assert!(snapped.distance(pointer) < unmoved.distance(pointer));
    }

    #[test]
    fn pivot_sticks_inside_radius_and_releases_outside() {
        let mut scene = TestScene::new();
        let dragged = scene.spawn(TestObject::empty(Vec3::ZERO));
        let anchor = scene.spawn(TestObject::empty(Vec3::new(100.0, 0.0, 0.0)));
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = actor_settings(10.0);
        let selection = [dragged];
        let ctx = ctx(&scene, &view, &selection, &settings, Vec2::ZERO);
        let mut engine = DragSnapEngine::default();

        let mut pivot = Vec3::ZERO;
        let mut delta = Vec3::new(95.0, 0.0, 0.0);
        assert!(engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, &ctx));
        assert_eq!(pivot, Vec3::new(100.0, 0.0, 0.0));
        assert_eq!(delta, Vec3::ZERO);
        assert_eq!(engine.snapped_to(), Some(anchor));

        // Still inside the radius: stays stuck
        let mut delta = Vec3::new(4.0, 3.0, 0.0);
        assert!(engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, &ctx));
        assert_eq!(pivot, Vec3::new(100.0, 0.0, 0.0));

        let mut delta = Vec3::new(30.0, 0.0, 0.0);
        assert!(!engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, &ctx));
        assert_eq!(delta, Vec3::new(30.0, 0.0, 0.0));
        assert_eq!(engine.snapped_to(), None);
    }

    #[test]
    fn end_drag_releases_the_stick() {
        let mut scene = TestScene::new();
        scene.spawn(TestObject::empty(Vec3::X));
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = actor_settings(5.0);
        let ctx = ctx(&scene, &view, &[], &settings, Vec2::ZERO);
        let mut engine = DragSnapEngine::default();

        let (mut delta, mut pivot) = (Vec3::ZERO, Vec3::ZERO);
        assert!(engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, &ctx));
        engine.end_drag();
        assert_eq!(engine.snapped_to(), None);
    }

    #[rstest]
    #[case::volume(ObjectKind::Volume, false, false)]
    #[case::placeholder(ObjectKind::Placeholder, false, false)]
    #[case::locked_group_of_strangers(ObjectKind::Regular, true, false)]
    #[case::regular(ObjectKind::Regular, false, true)]
    fn pivot_snap_exclusions(#[case] kind: ObjectKind, #[case] locked_group: bool, #[case] expect_snap: bool) {
        let mut scene = TestScene::new();
        let dragged = scene.spawn(TestObject::empty(Vec3::ZERO));
        let target = scene.spawn(TestObject::empty(Vec3::new(2.0, 0.0, 0.0)));
        scene.get_mut(target).kind = kind;
        if locked_group {
            let other = scene.spawn(TestObject::empty(Vec3::new(500.0, 0.0, 0.0)));
            scene.make_group(&[target, other], true);
        }
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = actor_settings(10.0);
        let selection = [dragged];
        let ctx = ctx(&scene, &view, &selection, &settings, Vec2::ZERO);

        let (mut delta, mut pivot) = (Vec3::X, Vec3::ZERO);
        let mut engine = DragSnapEngine::default();
        assert_eq!(engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, &ctx), expect_snap);
    }

    #[test]
    fn locked_group_with_a_selected_member_is_a_pivot_target() {
        let mut scene = TestScene::new();
        let dragged = scene.spawn(TestObject::empty(Vec3::ZERO));
        let mate = scene.spawn(TestObject::empty(Vec3::new(3.0, 0.0, 0.0)));
        scene.make_group(&[dragged, mate], true);
        let view = TestView::perspective(Vec3::new(0.0, 0.0, 500.0), Vec3::ZERO);
        let settings = actor_settings(10.0);
        let selection = [dragged];
        let ctx = ctx(&scene, &view, &selection, &settings, Vec2::ZERO);

        let (mut delta, mut pivot) = (Vec3::X, Vec3::ZERO);
        let mut engine = DragSnapEngine::default();
        assert!(engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, &ctx));
        assert_eq!(engine.snapped_to(), Some(mate));
    }

    #[test]
    fn lone_location_snaps_onto_selected_geometry() {
        let mut scene = TestScene::new();
        let cube = scene.spawn_cube(Vec3::new(45.0, 0.0, 0.0), 5.0);
        let view = TestView::front_ortho(Vec3::ZERO, 1.0);
        let settings = vertex_settings(300.0);
        let selection = [cube];
        let pointer = view.world_to_screen(Vec3::new(48.0, 0.0, 0.0)).unwrap();
        let ctx = ctx(&scene, &view, &selection, &settings, pointer);

        let mut delta = Vec3::new(48.0, 0.0, 0.0);
        let engine = DragSnapEngine::default();
        assert!(engine.snap_drag_location_to_nearest_vertex(Vec3::ZERO, &mut delta, &ctx, &mut (), 0.0));
        assert_relative_eq!(delta.x, 50.0, epsilon = 1e-3);
    }
}
