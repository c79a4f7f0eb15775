//! Jump sound effect.
//!
//! The controller fires a [`JumpSound`] message; this plugin turns each one
//! into a short synthesized tone that despawns itself when finished.

use bevy::audio::{Pitch, PlaybackSettings, Volume};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fired once per successful jump.
#[derive(Message, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JumpSound;

/// Tone used for the jump sound.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpSoundConfig {
    pub enabled: bool,
    /// Tone frequency (Hz)
    pub frequency: f32,
    /// Tone length (seconds)
    pub duration: f32,
    /// Linear volume
    pub volume: f32,
}

impl Default for JumpSoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: 300.0,
            duration: 0.3,
            volume: 0.3,
        }
    }
}

/// Cached tone asset, built on first use.
#[derive(Resource, Default)]
struct JumpTone(Option<Handle<Pitch>>);

pub struct JumpAudioPlugin;

impl Plugin for JumpAudioPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<JumpSoundConfig>()
            .init_resource::<JumpTone>()
            .add_message::<JumpSound>()
            .add_systems(PostUpdate, play_jump_sounds);
    }
}

fn play_jump_sounds(
    mut commands: Commands,
    mut jumps: MessageReader<JumpSound>,
    config: Res<JumpSoundConfig>,
    mut tone: ResMut<JumpTone>,
    pitches: Option<ResMut<Assets<Pitch>>>,
) {
    // Several jumps in one frame still play a single tone.
    if jumps.read().count() == 0 || !config.enabled {
        return;
    }
    let Some(mut pitches) = pitches else {
        return;
    };

    let handle = tone
        .0
        .get_or_insert_with(|| {
            pitches.add(Pitch::new(
                config.frequency,
                Duration::try_from_secs_f32(config.duration).unwrap_or_default(),
            ))
        })
        .clone();

    commands.spawn((
        AudioPlayer(handle),
        PlaybackSettings::DESPAWN.with_volume(Volume::Linear(config.volume)),
    ));
}
