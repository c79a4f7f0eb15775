//! On-screen clock: time-of-day band and "HH:MM" in the top-left corner.

use bevy::prelude::*;

use crate::day_night::DayNightCycle;
use crate::terrain_loader::TerrainLoader;

/// Marker for the clock text.
#[derive(Component)]
pub struct HudClock;

pub struct HudPlugin;

impl Plugin for HudPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_hud)
            .add_systems(Update, update_hud_clock);
    }
}

/// Text shown for a clock reading, e.g. "Dawn 04:48", with a hint while
/// terrain is still loading.
pub fn hud_label(cycle: &DayNightCycle, loading: bool) -> String {
    let mut label = format!("{} {}", cycle.phase(), cycle.clock_string());
    if loading {
        label.push_str("  (loading terrain)");
    }
    label
}

fn spawn_hud(mut commands: Commands) {
    commands.spawn((
        HudClock,
        Text::new(""),
        TextFont {
            font_size: 20.0,
            ..default()
        },
        TextColor(Color::WHITE),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        },
    ));

    commands.spawn((
        Text::new("Click to look around, WASD to move, Space to jump, Esc to release"),
        TextFont {
            font_size: 14.0,
            ..default()
        },
        TextColor(Color::srgba(1.0, 1.0, 1.0, 0.7)),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(12.0),
            left: Val::Px(12.0),
            ..default()
        },
    ));
}

fn update_hud_clock(
    cycle: Res<DayNightCycle>,
    loader: Option<Res<TerrainLoader>>,
    mut query: Query<&mut Text, With<HudClock>>,
) {
    let loading = loader.is_some_and(|loader| loader.is_loading());
    let label = hud_label(&cycle, loading);
    for mut text in query.iter_mut() {
        if text.0 != label {
            text.0.clone_from(&label);
        }
    }
}
