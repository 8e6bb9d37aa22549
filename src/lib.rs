pub mod brush;
pub mod ecs_scene;
pub mod scene;
pub mod selection;
pub mod snap_helpers;
pub mod snapping;
pub mod vertex_snap;
pub mod viewport_drag;

#[cfg(test)]
pub(crate) mod test_support;

use bevy::prelude::*;

pub use snap_helpers::SnapHelperOverlay;
pub use snapping::{SnapPreferences, SnapSettings};
pub use vertex_snap::DragSnapEngine;

/// Editor-owned entity (camera, gizmos, groups). Never part of the edited scene.
#[derive(Component, Default)]
pub struct EditorEntity;

/// Grid, pivot and vertex snapping for dragging objects in the 3D viewport.
///
/// The viewport camera must be a `Camera3d` tagged [`EditorEntity`].
pub struct SnappingPlugin;

impl Plugin for SnappingPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            snapping::SnapSettingsPlugin,
            selection::SelectionPlugin,
            brush::BrushPlugin,
            viewport_drag::ViewportDragPlugin,
        ))
        .register_type::<ecs_scene::PlaceholderGeometry>()
        .register_type::<ecs_scene::SnapVolume>()
        .register_type::<selection::ObjectGroup>()
        .init_resource::<DragSnapEngine>()
        .init_resource::<SnapHelperOverlay>()
        .add_systems(
            Update,
            snap_helpers::draw_snap_helpers.after(viewport_drag::ViewportDragSystems),
        );
    }
}
