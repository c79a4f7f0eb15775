//! Day/Night Cycle System
//!
//! A single normalized clock in `[0, 1)` drives everything time-of-day
//! related. One full turn of the clock is one in-game day:
//!
//! ```text
//! 0.00      0.10      0.25                 0.75      0.90      1.00
//!  | Night   | Dawn    | Day                 | Dusk    | Night   |
//! ```
//!
//! The clock itself only classifies the band and exposes a transition factor
//! (0 at full night, 1 at full day). Colors and intensities are derived from
//! it in [`crate::sky_lighting`].

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Start of the dawn transition.
pub const DAWN_START: f32 = 0.10;
/// Start of full day.
pub const DAY_START: f32 = 0.25;
/// End of full day, start of dusk.
pub const DAY_END: f32 = 0.75;
/// End of dusk, start of night.
pub const NIGHT_START: f32 = 0.90;

/// Length of each transition band.
const TRANSITION_LENGTH: f32 = DAY_START - DAWN_START;

/// Time-of-day band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DayPhase {
    Dawn,
    Day,
    Dusk,
    Night,
}

impl DayPhase {
    /// Classify a clock value. Day wins ties at its boundaries.
    pub fn at(time: f32) -> Self {
        if (DAY_START..=DAY_END).contains(&time) {
            DayPhase::Day
        } else if time < DAWN_START || time > NIGHT_START {
            DayPhase::Night
        } else if time < DAY_START {
            DayPhase::Dawn
        } else {
            DayPhase::Dusk
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DayPhase::Dawn => "Dawn",
            DayPhase::Day => "Day",
            DayPhase::Dusk => "Dusk",
            DayPhase::Night => "Night",
        }
    }
}

impl std::fmt::Display for DayPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables for the clock.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DayNightConfig {
    /// Real seconds per full day.
    pub day_length: f32,
    /// Clock value at startup.
    pub start_time: f32,
}

impl Default for DayNightConfig {
    fn default() -> Self {
        Self {
            day_length: 120.0,
            start_time: 0.0,
        }
    }
}

/// Main day/night cycle resource.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct DayNightCycle {
    /// Current time in cycle (0.0 - 1.0, wraps automatically).
    pub time: f32,

    /// Whether the cycle is paused.
    pub paused: bool,

    /// Real seconds per full cycle.
    pub day_length: f32,
}

impl Default for DayNightCycle {
    fn default() -> Self {
        Self::from_config(&DayNightConfig::default())
    }
}

impl DayNightCycle {
    pub fn from_config(config: &DayNightConfig) -> Self {
        Self {
            time: wrap_time(config.start_time),
            paused: false,
            day_length: config.day_length,
        }
    }

    /// Create a cycle starting at a specific time.
    pub fn with_time(mut self, time: f32) -> Self {
        self.set_time(time);
        self
    }

    /// Set time directly.
    pub fn set_time(&mut self, time: f32) {
        self.time = wrap_time(time);
    }

    /// Advance the clock by `delta_seconds` of real time.
    ///
    /// Crossing 1.0 keeps the remainder, so a big step never loses time.
    pub fn update(&mut self, delta_seconds: f32) {
        if self.paused || !delta_seconds.is_finite() || delta_seconds <= 0.0 {
            return;
        }
        if self.day_length <= 0.0 || !self.day_length.is_finite() {
            return;
        }
        self.time += delta_seconds / self.day_length;
        if self.time >= 1.0 {
            self.time -= self.time.floor();
        }
    }

    pub fn phase(&self) -> DayPhase {
        DayPhase::at(self.time)
    }

    /// 0 at full night, 1 at full day, ramping linearly through dawn and
    /// dusk.
    pub fn transition_factor(&self) -> f32 {
        let t = self.time;
        match self.phase() {
            DayPhase::Day => 1.0,
            DayPhase::Night => 0.0,
            DayPhase::Dawn => ((t - DAWN_START) / TRANSITION_LENGTH).max(0.0),
            DayPhase::Dusk => (1.0 - (t - DAY_END) / TRANSITION_LENGTH).max(0.0),
        }
    }

    /// Wall-clock reading, `time * 24` hours, as "HH:MM".
    pub fn clock_string(&self) -> String {
        let total_minutes = (self.time * 24.0 * 60.0).floor() as u32 % (24 * 60);
        format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
    }
}

fn wrap_time(time: f32) -> f32 {
    if !time.is_finite() {
        return 0.0;
    }
    // rem_euclid of a tiny negative rounds up to exactly 1.0
    let t = time.rem_euclid(1.0);
    if t >= 1.0 {
        0.0
    } else {
        t
    }
}

/// System to advance the day/night cycle each frame.
pub fn update_day_night_cycle(time: Res<Time>, mut cycle: ResMut<DayNightCycle>) {
    cycle.update(time.delta_secs());
}

/// Plugin that adds the day/night clock.
pub struct DayNightCyclePlugin;

impl Plugin for DayNightCyclePlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world_mut()
            .get_resource_or_init::<DayNightConfig>()
            .clone();

        if !app.world().contains_resource::<DayNightCycle>() {
            app.insert_resource(DayNightCycle::from_config(&config));
        }
        app.add_systems(PreUpdate, update_day_night_cycle);
    }
}
