use bevy::{
    camera::primitives::Frustum,
    math::Affine3A,
    picking::mesh_picking::ray_cast::MeshRayCast,
    prelude::*,
    window::{CursorGrabMode, CursorOptions},
};

use crate::{
    EditorEntity,
    ecs_scene::{CameraSnapView, EcsSnapScene, pointer_hits},
    scene::{SnapAxis, SnapScene, SnapView},
    selection::Selection,
    snap_helpers::{SnapHelperOverlay, SnapHelperSink},
    snapping::SnapSettings,
    vertex_snap::{DragSnapEngine, SnapContext},
};

/// Pixels the pointer must travel before a click becomes a drag.
const DRAG_THRESHOLD: f32 = 5.0;

const PIVOT_RADIUS: f32 = 0.08;
const PIVOT_COLOR: Color = Color::srgb(0.2, 0.9, 1.0);

pub struct ViewportDragPlugin;

impl Plugin for ViewportDragPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ViewportDragState>()
            .init_resource::<CustomPivot>()
            .add_systems(
                Update,
                (
                    reset_custom_pivot,
                    viewport_drag_detect,
                    viewport_drag_update,
                    viewport_drag_finish,
                    viewport_pivot_drag,
                )
                    .chain()
                    .in_set(ViewportDragSystems),
            )
            .add_systems(Update, draw_custom_pivot.after(ViewportDragSystems));
    }
}

/// Selection picking and dragging in the viewport.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewportDragSystems;

#[derive(Resource, Default)]
pub struct ViewportDragState {
    pub pending: Option<PendingDrag>,
    pub active: Option<ActiveDrag>,
    /// Middle-mouse drag of the pivot alone.
    pub pivot_drag: Option<PivotDrag>,
}

pub struct PendingDrag {
    pub click_pos: Vec2,
}

pub struct ActiveDrag {
    pub start_pivot: Vec3,
    /// Current pivot, snapped.
    pub pivot: Vec3,
    /// Camera-facing plane through the start pivot the pointer is projected onto.
    pub plane_normal: Vec3,
    /// Pivot minus the plane hit at the start of the drag.
    pub grab_offset: Vec3,
    pub dragged: Vec<DraggedObject>,
}

pub struct PivotDrag {
    pub base: Vec3,
    pub plane_normal: Vec3,
    pub grab_offset: Vec3,
}

/// A selected object moved by the drag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DraggedObject {
    pub entity: Entity,
    pub start_translation: Vec3,
    /// Maps world-space offsets into the space `Transform` lives in.
    pub parent_from_world: Affine3A,
}

/// Pivot moved away from the primary selection's origin with a middle-mouse
/// drag. Dropped whenever the selection changes.
#[derive(Resource, Default, Debug)]
pub struct CustomPivot {
    pub location: Option<Vec3>,
}

type EditorCamera = (
    &'static Camera,
    &'static GlobalTransform,
    &'static Projection,
    Option<&'static Frustum>,
);

// ---------------------------------------------------------------------------
// Drag step
// ---------------------------------------------------------------------------

/// Axis held down to constrain the drag, `Screen` when none.
pub fn held_axis(keyboard: &ButtonInput<KeyCode>) -> SnapAxis {
    if keyboard.pressed(KeyCode::KeyX) {
        SnapAxis::X
    } else if keyboard.pressed(KeyCode::KeyY) {
        SnapAxis::Y
    } else if keyboard.pressed(KeyCode::KeyZ) {
        SnapAxis::Z
    } else {
        SnapAxis::Screen
    }
}

/// Project `point` onto the line through `start` along `axis`.
pub fn constrain_to_axis(start: Vec3, point: Vec3, axis: SnapAxis) -> Vec3 {
    match axis.direction() {
        Some(direction) => start + direction * (point - start).dot(direction),
        None => point,
    }
}

/// Advance the pivot toward `unsnapped` for one frame.
///
/// Pivot snapping wins when it sticks; otherwise vertex snapping gets a go,
/// and grid snapping applies when no vertex was found.
pub fn step_drag<S: SnapScene, V: SnapView>(
    engine: &mut DragSnapEngine,
    pivot: Vec3,
    unsnapped: Vec3,
    start_pivot: Vec3,
    axis: SnapAxis,
    ctx: &SnapContext<S, V>,
    overlay: &mut impl SnapHelperSink,
    now: f32,
) -> Vec3 {
    fade_helpers_without_chord(ctx, overlay, now);

    let mut pivot = pivot;
    let mut delta = unsnapped - pivot;

    if engine.snap_actors_to_nearest_actor(&mut delta, &mut pivot, ctx) {
        return pivot;
    }
    if engine.snap_dragged_objects(&mut delta, axis, pivot, ctx, overlay, now) {
        return pivot + delta;
    }
    ctx.settings.snap_point_to_grid(pivot + delta, start_pivot)
}

/// Move the pivot alone toward `unsnapped`, onto the nearest vertex under the
/// pointer while the vertex snap chord is held.
pub fn step_pivot_drag<S: SnapScene, V: SnapView>(
    engine: &DragSnapEngine,
    base: Vec3,
    unsnapped: Vec3,
    ctx: &SnapContext<S, V>,
    overlay: &mut impl SnapHelperSink,
    now: f32,
) -> Vec3 {
    fade_helpers_without_chord(ctx, overlay, now);

    let mut delta = unsnapped - base;
    engine.snap_drag_location_to_nearest_vertex(base, &mut delta, ctx, overlay, now);
    base + delta
}

/// Let the last highlight fade once the vertex snap chord is released.
fn fade_helpers_without_chord<S: SnapScene, V: SnapView>(
    ctx: &SnapContext<S, V>,
    overlay: &mut impl SnapHelperSink,
    now: f32,
) {
    if !ctx.settings.vertex_snap_held {
        overlay.clear(false, now);
    }
}

/// Selected objects the drag moves. Objects with a selected ancestor are
/// left out since their ancestor already carries them.
pub fn collect_dragged(
    selection: &[Entity],
    transforms: &Query<&mut Transform>,
    parents: &Query<&ChildOf>,
    globals: &Query<&GlobalTransform>,
) -> Vec<DraggedObject> {
    selection
        .iter()
        .copied()
        .filter(|&entity| {
            let parent_of = |e: Entity| parents.get(e).ok().map(|child_of| child_of.parent());
            !std::iter::successors(parent_of(entity), |&e| parent_of(e))
                .any(|ancestor| selection.contains(&ancestor))
        })
        .filter_map(|entity| {
            let transform = transforms.get(entity).ok()?;
            let parent_from_world = parents
                .get(entity)
                .ok()
                .and_then(|child_of| globals.get(child_of.parent()).ok())
                .map(|parent| parent.affine().inverse())
                .unwrap_or(Affine3A::IDENTITY);
            Some(DraggedObject {
                entity,
                start_translation: transform.translation,
                parent_from_world,
            })
        })
        .collect()
}

/// Place every dragged object at its start plus the world-space `offset`.
pub fn apply_drag_offset(
    dragged: &[DraggedObject],
    offset: Vec3,
    transforms: &mut Query<&mut Transform>,
) {
    for object in dragged {
        if let Ok(mut transform) = transforms.get_mut(object.entity) {
            transform.translation =
                object.start_translation + object.parent_from_world.transform_vector3(offset);
        }
    }
}

// ---------------------------------------------------------------------------
// Viewport drag detect
// ---------------------------------------------------------------------------

fn reset_custom_pivot(selection: Res<Selection>, mut pivot: ResMut<CustomPivot>) {
    if selection.is_changed() && pivot.location.is_some() {
        pivot.location = None;
    }
}

fn viewport_drag_detect(
    mut commands: Commands,
    mouse: Res<ButtonInput<MouseButton>>,
    keyboard: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window>,
    camera_query: Query<(&Camera, &GlobalTransform), (With<Camera3d>, With<EditorEntity>)>,
    scene: EcsSnapScene,
    mut ray_cast: MeshRayCast,
    mut selection: ResMut<Selection>,
    mut drag_state: ResMut<ViewportDragState>,
) {
    if !mouse.just_pressed(MouseButton::Left) || drag_state.pivot_drag.is_some() {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor_pos) = window.cursor_position() else {
        return;
    };
    let Ok((camera, cam_tf)) = camera_query.single() else {
        return;
    };

    let hits = pointer_hits(&mut ray_cast, &scene, camera, cam_tf, cursor_pos);
    let ctrl = keyboard.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]);

    let Some(&hit) = hits.first() else {
        if !ctrl {
            selection.clear(&mut commands);
        }
        return;
    };

    if ctrl {
        selection.toggle(&mut commands, hit);
        return;
    }
    if !selection.is_selected(hit) {
        selection.select_single(&mut commands, hit);
    }
    drag_state.pending = Some(PendingDrag {
        click_pos: cursor_pos,
    });
}

// ---------------------------------------------------------------------------
// Viewport drag update
// ---------------------------------------------------------------------------

fn viewport_drag_update(
    mouse: Res<ButtonInput<MouseButton>>,
    keyboard: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window>,
    camera_query: Query<EditorCamera, (With<Camera3d>, With<EditorEntity>)>,
    scene: EcsSnapScene,
    mut ray_cast: MeshRayCast,
    selection: Res<Selection>,
    settings: Res<SnapSettings>,
    time: Res<Time>,
    mut engine: ResMut<DragSnapEngine>,
    mut overlay: ResMut<SnapHelperOverlay>,
    mut drag_state: ResMut<ViewportDragState>,
    mut custom_pivot: ResMut<CustomPivot>,
    mut transforms: Query<&mut Transform>,
    (parents, globals): (Query<&ChildOf>, Query<&GlobalTransform>),
    mut cursor_query: Query<&mut CursorOptions, With<Window>>,
) {
    if !mouse.pressed(MouseButton::Left) {
        drag_state.pending = None;
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor_pos) = window.cursor_position() else {
        return;
    };
    let Ok((camera, cam_tf, projection, frustum)) = camera_query.single() else {
        return;
    };

    // Check pending -> active promotion
    if let Some(click_pos) = drag_state.pending.as_ref().map(|pending| pending.click_pos) {
        if (cursor_pos - click_pos).length() <= DRAG_THRESHOLD {
            return;
        }
        let Some(primary) = selection.primary() else {
            drag_state.pending = None;
            return;
        };
        let Some(start_pivot) = custom_pivot
            .location
            .or_else(|| scene.object(primary).map(|info| info.origin))
        else {
            drag_state.pending = None;
            return;
        };
        let plane_normal = cam_tf.forward().as_vec3();
        let Some(grab) = pointer_on_plane(camera, cam_tf, click_pos, start_pivot, plane_normal)
        else {
            drag_state.pending = None;
            return;
        };

        drag_state.active = Some(ActiveDrag {
            start_pivot,
            pivot: start_pivot,
            plane_normal,
            grab_offset: start_pivot - grab,
            dragged: collect_dragged(&selection.entities, &transforms, &parents, &globals),
        });
        drag_state.pending = None;
        // Confine cursor during viewport drag
        if let Ok(mut cursor_opts) = cursor_query.single_mut() {
            cursor_opts.grab_mode = CursorGrabMode::Confined;
        }
    }

    let Some(ref mut active) = drag_state.active else {
        return;
    };
    let Some(hit) = pointer_on_plane(camera, cam_tf, cursor_pos, active.start_pivot, active.plane_normal)
    else {
        return;
    };

    let axis = held_axis(&keyboard);
    let unsnapped = constrain_to_axis(active.start_pivot, hit + active.grab_offset, axis);

    let hits = if settings.vertex_snap_held && axis.is_screen() {
        pointer_hits(&mut ray_cast, &scene, camera, cam_tf, cursor_pos)
    } else {
        Vec::new()
    };
    let view = CameraSnapView::new(camera, cam_tf, projection, frustum, hits);
    let ctx = SnapContext {
        scene: &scene,
        view: &view,
        selection: &selection.entities,
        settings: &settings,
        pointer: cursor_pos,
    };

    active.pivot = step_drag(
        &mut engine,
        active.pivot,
        unsnapped,
        active.start_pivot,
        axis,
        &ctx,
        &mut *overlay,
        time.elapsed_secs(),
    );

    if custom_pivot.location.is_some() {
        custom_pivot.location = Some(active.pivot);
    }
    apply_drag_offset(&active.dragged, active.pivot - active.start_pivot, &mut transforms);
}

fn pointer_on_plane(
    camera: &Camera,
    cam_tf: &GlobalTransform,
    pointer: Vec2,
    origin: Vec3,
    normal: Vec3,
) -> Option<Vec3> {
    let ray = camera.viewport_to_world(cam_tf, pointer).ok()?;
    let distance = ray.intersect_plane(origin, InfinitePlane3d::new(normal))?;
    Some(ray.get_point(distance))
}

// ---------------------------------------------------------------------------
// Viewport drag finish
// ---------------------------------------------------------------------------

fn viewport_drag_finish(
    mouse: Res<ButtonInput<MouseButton>>,
    time: Res<Time>,
    mut drag_state: ResMut<ViewportDragState>,
    mut engine: ResMut<DragSnapEngine>,
    mut overlay: ResMut<SnapHelperOverlay>,
    mut cursor_query: Query<&mut CursorOptions, With<Window>>,
) {
    if !mouse.just_released(MouseButton::Left) {
        return;
    }

    drag_state.pending = None;

    let Some(active) = drag_state.active.take() else {
        return;
    };
    engine.end_drag();
    overlay.clear(false, time.elapsed_secs());
    info!(
        "Moved {} objects by {}",
        active.dragged.len(),
        active.pivot - active.start_pivot
    );

    // Release cursor confinement
    if let Ok(mut cursor_opts) = cursor_query.single_mut() {
        cursor_opts.grab_mode = CursorGrabMode::None;
    }
}

// ---------------------------------------------------------------------------
// Pivot drag
// ---------------------------------------------------------------------------

fn viewport_pivot_drag(
    mouse: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window>,
    camera_query: Query<EditorCamera, (With<Camera3d>, With<EditorEntity>)>,
    scene: EcsSnapScene,
    mut ray_cast: MeshRayCast,
    selection: Res<Selection>,
    settings: Res<SnapSettings>,
    time: Res<Time>,
    engine: Res<DragSnapEngine>,
    mut overlay: ResMut<SnapHelperOverlay>,
    mut drag_state: ResMut<ViewportDragState>,
    mut custom_pivot: ResMut<CustomPivot>,
) {
    if mouse.just_released(MouseButton::Middle) {
        if drag_state.pivot_drag.take().is_some() {
            overlay.clear(false, time.elapsed_secs());
            if let Some(location) = custom_pivot.location {
                info!("Pivot moved to {location}");
            }
        }
        return;
    }
    if !mouse.pressed(MouseButton::Middle) || drag_state.active.is_some() {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor_pos) = window.cursor_position() else {
        return;
    };
    let Ok((camera, cam_tf, projection, frustum)) = camera_query.single() else {
        return;
    };

    if mouse.just_pressed(MouseButton::Middle) {
        let Some(base) = custom_pivot.location.or_else(|| {
            selection
                .primary()
                .and_then(|primary| scene.object(primary))
                .map(|info| info.origin)
        }) else {
            return;
        };
        let plane_normal = cam_tf.forward().as_vec3();
        let Some(grab) = pointer_on_plane(camera, cam_tf, cursor_pos, base, plane_normal) else {
            return;
        };
        drag_state.pivot_drag = Some(PivotDrag {
            base,
            plane_normal,
            grab_offset: base - grab,
        });
    }

    let Some(pivot_drag) = drag_state.pivot_drag.as_ref() else {
        return;
    };
    let Some(hit) = pointer_on_plane(camera, cam_tf, cursor_pos, pivot_drag.base, pivot_drag.plane_normal)
    else {
        return;
    };

    let hits = if settings.vertex_snap_held {
        pointer_hits(&mut ray_cast, &scene, camera, cam_tf, cursor_pos)
    } else {
        Vec::new()
    };
    let view = CameraSnapView::new(camera, cam_tf, projection, frustum, hits);
    let ctx = SnapContext {
        scene: &scene,
        view: &view,
        selection: &selection.entities,
        settings: &settings,
        pointer: cursor_pos,
    };

    custom_pivot.location = Some(step_pivot_drag(
        &engine,
        pivot_drag.base,
        hit + pivot_drag.grab_offset,
        &ctx,
        &mut *overlay,
        time.elapsed_secs(),
    ));
}

fn draw_custom_pivot(pivot: Res<CustomPivot>, mut gizmos: Gizmos) {
    if let Some(location) = pivot.location {
        gizmos.sphere(Isometry3d::from_translation(location), PIVOT_RADIUS, PIVOT_COLOR);
    }
}
