//! Core simulation for Terrain Explorer.
//!
//! This crate provides:
//! - Terrain collision queries (height, blocking rays) over a static triangle set
//! - Background terrain loading (glTF, procedural, flat)
//! - First-person character controller with capsule collision
//! - Spawn placement and fall-through recovery
//! - Day/night clock driving sun, ambient, fog and sky colors
//! - Jump sound, clock HUD and a JSON configuration file

pub mod audio;
pub mod capsule;
pub mod character_controller;
pub mod config;
pub mod day_night;
pub mod explorer_app;
pub mod hud;
pub mod sky_lighting;
pub mod spawn;
pub mod terrain;
pub mod terrain_loader;

pub use audio::{JumpAudioPlugin, JumpSound, JumpSoundConfig};
pub use capsule::{sweep, CapsuleSamplePattern, CapsuleShape};
pub use character_controller::{
    apply_look, horizontal_displacement, respawn, step_character, CharacterControllerConfig,
    CharacterControllerPlugin, FrameInput, PlayerCharacter, PointerLock, PointerLockPlugin,
    StepOutcome,
};
pub use config::{load_config, save_config, ConfigError, ConfigResult, ExplorerConfig};
pub use day_night::{
    update_day_night_cycle, DayNightConfig, DayNightCycle, DayNightCyclePlugin, DayPhase,
};
pub use explorer_app::{ExplorerApp, ExplorerPlugin};
pub use hud::{hud_label, HudClock, HudPlugin};
pub use sky_lighting::{
    apply_lighting, compute_lighting, sky_color, update_lighting_state, LightingConfig,
    LightingState, SceneLightHandles, SkyLightingPlugin,
};
pub use spawn::{default_probes, find_spawn_position, SpawnConfig};
pub use terrain::{RayHit, TerrainMesh, TerrainQuery, TerrainTriangle};
pub use terrain_loader::{
    build_terrain, procedural_terrain, terrain_from_meshes, LoadTerrain, TerrainLoadError,
    TerrainLoadResult, TerrainLoader, TerrainPlugin, TerrainReady, TerrainSource, TerrainVisual,
};
