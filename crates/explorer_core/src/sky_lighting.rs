//! Sky and lighting colorizer.
//!
//! Turns the day/night clock into concrete scene state: sun illuminance and
//! position, ambient brightness, distance fog color and the clear (sky)
//! color. [`compute_lighting`] is the pure mapping; the systems below push
//! its result onto the entities recorded in [`SceneLightHandles`].

use bevy::color::Mix;
use bevy::pbr::{DistanceFog, FogFalloff};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::day_night::{update_day_night_cycle, DayNightCycle, DayPhase};

/// Colors and intensities at the two extremes of the cycle.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub day_light_intensity: f32,
    pub night_light_intensity: f32,
    pub day_ambient_intensity: f32,
    pub night_ambient_intensity: f32,
    /// Distance of the sun from the world origin.
    pub sun_distance: f32,
    pub day_fog_color: Srgba,
    pub night_fog_color: Srgba,
    pub day_sky_color: Srgba,
    pub night_sky_color: Srgba,
    /// Sky color at the midpoint of dawn and dusk.
    pub sunset_sky_color: Srgba,
    /// Linear fog start/end distances.
    pub fog_start: f32,
    pub fog_end: f32,
    /// Lux per unit of normalized sun intensity.
    pub sun_illuminance_scale: f32,
    /// Ambient brightness per unit of normalized ambient intensity.
    pub ambient_brightness_scale: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            day_light_intensity: 0.8,
            night_light_intensity: 0.1,
            day_ambient_intensity: 0.3,
            night_ambient_intensity: 0.05,
            sun_distance: 20.0,
            day_fog_color: Srgba::rgb_u8(0x87, 0xCE, 0xEB),
            night_fog_color: Srgba::rgb_u8(0x19, 0x19, 0x70),
            day_sky_color: Srgba::rgb_u8(0x87, 0xCE, 0xEB),
            night_sky_color: Srgba::rgb_u8(0x0A, 0x0A, 0x1A),
            sunset_sky_color: Srgba::rgb_u8(0xFF, 0x6B, 0x35),
            fog_start: 10.0,
            fog_end: 100.0,
            sun_illuminance_scale: 10_000.0,
            ambient_brightness_scale: 500.0,
        }
    }
}

/// Lighting derived from the clock, recomputed every frame.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct LightingState {
    pub phase: DayPhase,
    pub factor: f32,
    /// Normalized sun intensity (0.1 at night, 0.8 at day by default).
    pub light_intensity: f32,
    /// Normalized ambient intensity.
    pub ambient_intensity: f32,
    pub sun_position: Vec3,
    pub fog_color: Srgba,
    pub sky_color: Srgba,
}

impl Default for LightingState {
    fn default() -> Self {
        compute_lighting(&DayNightCycle::default(), &LightingConfig::default())
    }
}

/// Entities the lighting systems write to.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct SceneLightHandles {
    pub sun: Option<Entity>,
    pub camera: Option<Entity>,
}

/// Map a clock reading to the full lighting state.
pub fn compute_lighting(cycle: &DayNightCycle, config: &LightingConfig) -> LightingState {
    let phase = cycle.phase();
    let factor = cycle.transition_factor();

    let (light_intensity, ambient_intensity, fog_color) = match phase {
        DayPhase::Day => (
            config.day_light_intensity,
            config.day_ambient_intensity,
            config.day_fog_color,
        ),
        DayPhase::Night => (
            config.night_light_intensity,
            config.night_ambient_intensity,
            config.night_fog_color,
        ),
        DayPhase::Dawn | DayPhase::Dusk => (
            lerp(config.night_light_intensity, config.day_light_intensity, factor),
            lerp(config.night_ambient_intensity, config.day_ambient_intensity, factor),
            config.night_fog_color.mix(&config.day_fog_color, factor),
        ),
    };

    let angle = cycle.time * TAU;
    let sun_position = Vec3::new(angle.cos(), angle.sin(), angle.sin()) * config.sun_distance;

    LightingState {
        phase,
        factor,
        light_intensity,
        ambient_intensity,
        sun_position,
        fog_color,
        sky_color: sky_color(phase, factor, config),
    }
}

/// Sky color, routed through the sunset color during transitions.
pub fn sky_color(phase: DayPhase, factor: f32, config: &LightingConfig) -> Srgba {
    match phase {
        DayPhase::Day => config.day_sky_color,
        DayPhase::Night => config.night_sky_color,
        DayPhase::Dawn | DayPhase::Dusk => {
            if factor < 0.5 {
                config
                    .night_sky_color
                    .mix(&config.sunset_sky_color, factor * 2.0)
            } else {
                config
                    .sunset_sky_color
                    .mix(&config.day_sky_color, factor * 2.0 - 1.0)
            }
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// System to recompute [`LightingState`] from the clock.
pub fn update_lighting_state(
    cycle: Res<DayNightCycle>,
    config: Res<LightingConfig>,
    mut state: ResMut<LightingState>,
) {
    let next = compute_lighting(&cycle, &config);
    if *state != next {
        if state.phase != next.phase {
            debug!("Time of day: {} ({})", next.phase, cycle.clock_string());
        }
        *state = next;
    }
}

/// System to apply [`LightingState`] to the sun, camera fog, ambient light
/// and clear color.
pub fn apply_lighting(
    state: Res<LightingState>,
    config: Res<LightingConfig>,
    handles: Res<SceneLightHandles>,
    ambient: Option<ResMut<AmbientLight>>,
    clear_color: Option<ResMut<ClearColor>>,
    mut suns: Query<(&mut DirectionalLight, &mut Transform)>,
    mut fogs: Query<&mut DistanceFog>,
) {
    if !state.is_changed() && !handles.is_changed() {
        return;
    }

    if let Some(sun) = handles.sun {
        if let Ok((mut light, mut transform)) = suns.get_mut(sun) {
            light.illuminance = state.light_intensity * config.sun_illuminance_scale;
            *transform =
                Transform::from_translation(state.sun_position).looking_at(Vec3::ZERO, Vec3::Y);
        }
    }

    if let Some(camera) = handles.camera {
        if let Ok(mut fog) = fogs.get_mut(camera) {
            fog.color = state.fog_color.into();
            fog.falloff = FogFalloff::Linear {
                start: config.fog_start,
                end: config.fog_end,
            };
        }
    }

    if let Some(mut ambient) = ambient {
        ambient.brightness = state.ambient_intensity * config.ambient_brightness_scale;
    }

    if let Some(mut clear_color) = clear_color {
        clear_color.0 = state.sky_color.into();
    }
}

/// Plugin that drives scene lighting from the day/night clock.
///
/// Requires [`crate::day_night::DayNightCyclePlugin`].
pub struct SkyLightingPlugin;

impl Plugin for SkyLightingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LightingConfig>()
            .init_resource::<SceneLightHandles>()
            .init_resource::<LightingState>()
            .add_systems(
                PreUpdate,
                (update_lighting_state, apply_lighting)
                    .chain()
                    .after(update_day_night_cycle),
            );
    }
}
