use std::path::{Path, PathBuf};

use anyhow::Context;
use bevy::{prelude::*, tasks::IoTaskPool};
use bevy_infinite_grid::{InfiniteGrid, InfiniteGridSettings};
use serde::{Deserialize, Serialize};

pub struct SnapSettingsPlugin;

impl Plugin for SnapSettingsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SnapSettings>()
            .init_resource::<SnapPreferences>()
            .init_resource::<GridSettings>()
            .add_systems(Startup, load_snap_preferences)
            .add_systems(
                Update,
                (
                    track_vertex_snap_chord,
                    save_snap_preferences,
                    match_grid_to_snap_size,
                    sync_grid_settings,
                )
                    .chain(),
            );
    }
}

/// Held to snap dragged objects onto nearby vertices.
pub const VERTEX_SNAP_KEY: KeyCode = KeyCode::KeyV;

// ---------------------------------------------------------------------------
// Grid settings
// ---------------------------------------------------------------------------

#[derive(Resource)]
pub struct GridSettings {
    pub visible: bool,
    pub scale: f32,
    pub major_line_color: Color,
    pub minor_line_color: Color,
    pub fadeout_distance: f32,
    /// Keep minor lines one snap cell apart.
    pub follow_snap_size: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            visible: true,
            scale: 1.0,
            major_line_color: Color::srgb(0.25, 0.25, 0.25),
            minor_line_color: Color::srgb(0.1, 0.1, 0.1),
            fadeout_distance: 100.0,
            follow_snap_size: true,
        }
    }
}

fn match_grid_to_snap_size(settings: Res<SnapSettings>, mut grid: ResMut<GridSettings>) {
    if !settings.is_changed() || !grid.follow_snap_size || settings.grid_size <= 0.0 {
        return;
    }
    let scale = 1.0 / settings.grid_size;
    if grid.scale != scale {
        grid.scale = scale;
    }
}

fn sync_grid_settings(
    grid: Res<GridSettings>,
    mut grids: Query<(&mut InfiniteGridSettings, &mut Visibility), With<InfiniteGrid>>,
) {
    if !grid.is_changed() {
        return;
    }
    for (mut settings, mut visibility) in &mut grids {
        settings.scale = grid.scale;
        settings.major_line_color = grid.major_line_color;
        settings.minor_line_color = grid.minor_line_color;
        settings.fadeout_distance = grid.fadeout_distance;
        *visibility = if grid.visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}

// ---------------------------------------------------------------------------
// Snap settings
// ---------------------------------------------------------------------------

/// Every snapping toggle and size the editor exposes. Persisted as JSON.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapSettings {
    pub grid_snap: bool,
    pub grid_size: f32,
    pub rotate_snap: bool,
    /// Radians.
    pub rotate_increment: f32,
    pub scale_snap: bool,
    pub scale_increment: f32,
    /// Snap scale changes as a fraction of the starting scale instead of
    /// absolute increments.
    pub percentage_scale: bool,
    /// Half-extent of the box around the dragged location searched for vertices.
    pub vertex_snap_distance: f32,
    pub draw_vertex_helpers: bool,
    pub actor_snap: bool,
    pub actor_snap_radius: f32,
    /// When off, group membership is ignored while building ignore sets.
    pub grouping_active: bool,
    /// Mirrors [`VERTEX_SNAP_KEY`]. Runtime only.
    #[serde(skip)]
    pub vertex_snap_held: bool,
}

impl Default for SnapSettings {
    fn default() -> Self {
        Self {
            grid_snap: false,
            grid_size: 0.25,
            rotate_snap: false,
            rotate_increment: 15.0_f32.to_radians(),
            scale_snap: false,
            scale_increment: 0.1,
            percentage_scale: false,
            vertex_snap_distance: 3.0,
            draw_vertex_helpers: true,
            actor_snap: false,
            actor_snap_radius: 1.0,
            grouping_active: true,
            vertex_snap_held: false,
        }
    }
}

fn snap_value(value: f32, increment: f32) -> f32 {
    (value / increment).round() * increment
}

impl SnapSettings {
    /// Snap `point` to the grid whose cell corners include `grid_base`.
    pub fn snap_point_to_grid(&self, point: Vec3, grid_base: Vec3) -> Vec3 {
        if !self.grid_snap || self.grid_size <= 0.0 {
            return point;
        }
        ((point - grid_base) / self.grid_size).round() * self.grid_size + grid_base
    }

    /// Snap each euler angle (radians) to the rotation increment.
    pub fn snap_rotation_to_grid(&self, euler: Vec3) -> Vec3 {
        if !self.rotate_snap || self.rotate_increment <= 0.0 {
            return euler;
        }
        Vec3::new(
            snap_value(euler.x, self.rotate_increment),
            snap_value(euler.y, self.rotate_increment),
            snap_value(euler.z, self.rotate_increment),
        )
    }

    pub fn snap_quat_to_grid(&self, rotation: Quat) -> Quat {
        if !self.rotate_snap || self.rotate_increment <= 0.0 {
            return rotation;
        }
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        let snapped = self.snap_rotation_to_grid(Vec3::new(x, y, z));
        Quat::from_euler(EulerRot::XYZ, snapped.x, snapped.y, snapped.z)
    }

    /// Snap a scale. Absolute mode rounds each axis to the increment; percentage
    /// mode rounds each axis's change relative to `grid_base` to the increment.
    pub fn snap_scale(&self, scale: Vec3, grid_base: Vec3) -> Vec3 {
        if !self.scale_snap || self.scale_increment <= 0.0 {
            return scale;
        }
        if !self.percentage_scale {
            return Vec3::new(
                snap_value(scale.x, self.scale_increment),
                snap_value(scale.y, self.scale_increment),
                snap_value(scale.z, self.scale_increment),
            );
        }
        let relative = |value: f32, base: f32| {
            if base.abs() <= f32::EPSILON {
                snap_value(value, self.scale_increment)
            } else {
                base * (1.0 + snap_value(value / base - 1.0, self.scale_increment))
            }
        };
        Vec3::new(
            relative(scale.x, grid_base.x),
            relative(scale.y, grid_base.y),
            relative(scale.z, grid_base.z),
        )
    }
}

fn track_vertex_snap_chord(keyboard: Res<ButtonInput<KeyCode>>, mut settings: ResMut<SnapSettings>) {
    let held = keyboard.pressed(VERTEX_SNAP_KEY);
    if settings.vertex_snap_held != held {
        settings.vertex_snap_held = held;
    }
}

// ---------------------------------------------------------------------------
// Preferences file
// ---------------------------------------------------------------------------

/// Where [`SnapSettings`] are loaded from at startup and saved to on change.
#[derive(Resource, Clone, Debug)]
pub struct SnapPreferences {
    pub path: PathBuf,
}

impl Default for SnapPreferences {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/settings/snapping.json"),
        }
    }
}

impl SnapPreferences {
    pub fn load(&self) -> anyhow::Result<SnapSettings> {
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", self.path.display()))
    }

    pub fn save(&self, settings: &SnapSettings) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(settings).context("serializing snap settings")?;
        write_file(&self.path, &json)
    }
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn load_snap_preferences(preferences: Res<SnapPreferences>, mut settings: ResMut<SnapSettings>) {
    if !preferences.path.exists() {
        return;
    }
    match preferences.load() {
        Ok(loaded) => {
            info!("Loaded snap settings from {}", preferences.path.display());
            *settings = loaded;
        }
        Err(err) => warn!("Failed to load snap settings: {err:#}"),
    }
}

/// Write the settings out whenever a persisted field changes.
fn save_snap_preferences(
    settings: Res<SnapSettings>,
    preferences: Res<SnapPreferences>,
    mut last_saved: Local<Option<String>>,
) {
    if !settings.is_changed() {
        return;
    }
    let json = match serde_json::to_string_pretty(&*settings) {
        Ok(json) => json,
        Err(err) => {
            warn!("Failed to serialize snap settings: {err}");
            return;
        }
    };
    // The first change is the startup load (or defaults); nothing to write yet.
    let Some(previous) = last_saved.replace(json.clone()) else {
        return;
    };
    if previous == json {
        return;
    }

    let path = preferences.path.clone();
    IoTaskPool::get()
        .spawn(async move {
            match write_file(&path, &json) {
                Ok(()) => info!("Snap settings saved to {}", path.display()),
                Err(err) => warn!("Failed to save snap settings: {err:#}"),
            }
        })
        .detach();
}
