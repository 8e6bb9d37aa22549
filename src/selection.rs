use bevy::prelude::*;

use crate::EditorEntity;

pub struct SelectionPlugin;

impl Plugin for SelectionPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Selection::default())
            .add_observer(on_selected_removed)
            .add_observer(on_group_member_replaced)
            .add_systems(Update, handle_group_keys);
    }
}

/// Marker component placed on selected entities. Multiple entities can have this.
#[derive(Component)]
pub struct Selected;

/// Resource tracking the full selection state.
#[derive(Resource, Default)]
pub struct Selection {
    /// Ordered list of selected entities. The last entity is the primary selection.
    pub entities: Vec<Entity>,
}

impl Selection {
    /// Select a single entity, clearing all others.
    pub fn select_single(&mut self, commands: &mut Commands, entity: Entity) {
        for &e in &self.entities {
            if e != entity
                && let Ok(mut ec) = commands.get_entity(e)
            {
                ec.remove::<Selected>();
            }
        }
        self.entities.clear();
        self.entities.push(entity);
        commands.entity(entity).insert(Selected);
    }

    /// Toggle selection of an entity (Ctrl+Click behavior).
    pub fn toggle(&mut self, commands: &mut Commands, entity: Entity) {
        if let Some(pos) = self.entities.iter().position(|&e| e == entity) {
            self.entities.remove(pos);
            commands.entity(entity).remove::<Selected>();
        } else {
            self.entities.push(entity);
            commands.entity(entity).insert(Selected);
        }
    }

    pub fn clear(&mut self, commands: &mut Commands) {
        for &e in &self.entities {
            if let Ok(mut ec) = commands.get_entity(e) {
                ec.remove::<Selected>();
            }
        }
        self.entities.clear();
    }

    /// Get the primary (last) selected entity.
    pub fn primary(&self) -> Option<Entity> {
        self.entities.last().copied()
    }

    pub fn is_selected(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }
}

/// Clean up the Selection resource when a Selected component is removed
/// (e.g., entity despawned).
fn on_selected_removed(trigger: On<Remove, Selected>, mut selection: ResMut<Selection>) {
    let entity = trigger.event_target();
    selection.entities.retain(|&e| e != entity);
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A user group. Lives on its own editor-side entity; members point at it
/// with [`GroupMember`].
///
/// A locked group moves as one and is a single snap target even while some of
/// its members are selected.
#[derive(Component, Default, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct ObjectGroup {
    pub locked: bool,
}

/// Membership of a scene object in an [`ObjectGroup`] entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember(pub Entity);

/// Put every `members` entity into a fresh group. Existing memberships are
/// replaced.
pub fn create_group(commands: &mut Commands, members: &[Entity], locked: bool) -> Entity {
    let group = commands
        .spawn((EditorEntity, Name::new("Group"), ObjectGroup { locked }))
        .id();
    for &member in members {
        commands.entity(member).insert(GroupMember(group));
    }
    group
}

/// Despawn a group once its last member leaves it, whether by ungrouping,
/// joining another group or being despawned.
fn on_group_member_replaced(
    trigger: On<Replace, GroupMember>,
    mut commands: Commands,
    members: Query<(Entity, &GroupMember)>,
) {
    let leaving = trigger.event_target();
    let Ok((_, &GroupMember(group))) = members.get(leaving) else {
        return;
    };
    let still_used = members
        .iter()
        .any(|(member, membership)| member != leaving && membership.0 == group);
    if !still_used && let Ok(mut ec) = commands.get_entity(group) {
        debug!("Despawning empty group {group}");
        ec.despawn();
    }
}

/// Ctrl+G groups the selection, Ctrl+Shift+G ungroups it, Ctrl+L toggles the
/// lock of every group touched by the selection.
fn handle_group_keys(
    mut commands: Commands,
    keyboard: Res<ButtonInput<KeyCode>>,
    selection: Res<Selection>,
    members: Query<&GroupMember>,
    mut groups: Query<&mut ObjectGroup>,
) {
    let ctrl = keyboard.any_pressed([KeyCode::ControlLeft, KeyCode::ControlRight]);
    let shift = keyboard.any_pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]);
    if !ctrl || selection.entities.is_empty() {
        return;
    }

    if keyboard.just_pressed(KeyCode::KeyG) {
        if shift {
            for &entity in &selection.entities {
                if members.contains(entity) {
                    commands.entity(entity).remove::<GroupMember>();
                }
            }
            info!("Ungrouped {} objects", selection.entities.len());
        } else if selection.entities.len() > 1 {
            let group = create_group(&mut commands, &selection.entities, false);
            info!("Grouped {} objects into {group}", selection.entities.len());
        }
    }

    if keyboard.just_pressed(KeyCode::KeyL) {
        let mut touched: Vec<Entity> = selection
            .entities
            .iter()
            .filter_map(|&entity| members.get(entity).ok().map(|member| member.0))
            .collect();
        touched.sort_unstable();
        touched.dedup();
        for group in touched {
            if let Ok(mut object_group) = groups.get_mut(group) {
                object_group.locked = !object_group.locked;
                info!(
                    "Group {group} {}",
                    if object_group.locked { "locked" } else { "unlocked" }
                );
            }
        }
    }
}
