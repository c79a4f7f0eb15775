//! ExplorerApp - one-call setup for the terrain explorer.
//!
//! [`ExplorerPlugin`] carries the simulation (terrain, controller, clock,
//! lighting) and runs headless. [`ExplorerApp`] adds the window, input
//! capture, audio, HUD and the scene itself.
//!
//! # Example
//!
//! ```ignore
//! use explorer_core::{ExplorerApp, TerrainSource};
//!
//! fn main() {
//!     ExplorerApp::new("Canyon")
//!         .with_terrain(TerrainSource::Gltf { path: "models/canyon.glb".into(), scale: 2.0 })
//!         .with_start_time(0.2)
//!         .run();
//! }
//! ```

use bevy::pbr::{DistanceFog, FogFalloff};
use bevy::prelude::*;
use bevy::window::WindowPlugin;
use std::path::{Path, PathBuf};

use crate::audio::JumpAudioPlugin;
use crate::character_controller::{CharacterControllerPlugin, PlayerCharacter, PointerLockPlugin};
use crate::config::{load_config, ConfigError, ExplorerConfig};
use crate::day_night::DayNightCyclePlugin;
use crate::hud::HudPlugin;
use crate::sky_lighting::{LightingConfig, SceneLightHandles, SkyLightingPlugin};
use crate::spawn::SpawnConfig;
use crate::terrain_loader::{TerrainPlugin, TerrainSource};

/// Simulation plugins plus the resources from an [`ExplorerConfig`].
///
/// Needs no window or renderer, so tests can run it on `MinimalPlugins`.
pub struct ExplorerPlugin {
    pub config: ExplorerConfig,
}

impl ExplorerPlugin {
    pub fn new(config: ExplorerConfig) -> Self {
        Self { config }
    }
}

impl Default for ExplorerPlugin {
    fn default() -> Self {
        Self::new(ExplorerConfig::default())
    }
}

impl Plugin for ExplorerPlugin {
    fn build(&self, app: &mut App) {
        let config = &self.config;
        app.insert_resource(config.controller.clone())
            .insert_resource(config.spawn.clone())
            .insert_resource(config.day_night.clone())
            .insert_resource(config.lighting.clone())
            .insert_resource(config.jump_sound.clone());

        app.add_plugins((
            TerrainPlugin::with_source(config.terrain.clone()),
            CharacterControllerPlugin,
            DayNightCyclePlugin,
            SkyLightingPlugin,
        ));
    }
}

/// Builder for the explorer app.
pub struct ExplorerApp {
    config: ExplorerConfig,
    /// File the config came from, and the error if it fell back to defaults.
    config_file: Option<(PathBuf, Option<ConfigError>)>,
}

impl ExplorerApp {
    /// Create a new ExplorerApp with the given title and default settings.
    pub fn new(title: impl Into<String>) -> Self {
        Self::from_config(ExplorerConfig {
            title: title.into(),
            ..default()
        })
    }

    pub fn from_config(config: ExplorerConfig) -> Self {
        Self {
            config,
            config_file: None,
        }
    }

    /// Load settings from a JSON file, keeping defaults if it can't be read.
    ///
    /// The outcome is logged from [`ExplorerApp::build`], once the log
    /// handler is installed.
    pub fn from_config_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        match load_config(&path) {
            Ok(config) => Self {
                config,
                config_file: Some((path, None)),
            },
            Err(e) => Self {
                config: ExplorerConfig::default(),
                config_file: Some((path, Some(e))),
            },
        }
    }

    pub fn with_terrain(mut self, source: TerrainSource) -> Self {
        self.config.terrain = source;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.config.resolution = (width, height);
        self
    }

    /// Clock value (0.0 - 1.0) at startup.
    pub fn with_start_time(mut self, time: f32) -> Self {
        self.config.day_night.start_time = time;
        self
    }

    /// Real seconds per in-game day.
    pub fn with_day_length(mut self, seconds: f32) -> Self {
        self.config.day_night.day_length = seconds;
        self
    }

    pub fn with_hud(mut self, enabled: bool) -> Self {
        self.config.show_hud = enabled;
        self
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Why the config file was not used, if it wasn't.
    pub fn config_error(&self) -> Option<&ConfigError> {
        self.config_file.as_ref().and_then(|(_, error)| error.as_ref())
    }

    /// Build the app without running it.
    pub fn build(self) -> App {
        let config = self.config;
        let mut app = App::new();

        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                resolution: config.resolution.into(),
                title: config.title.clone(),
                ..default()
            }),
            ..default()
        }));

        info!("Starting {}", config.title);
        match &self.config_file {
            Some((path, None)) => info!("Loaded config from {}", path.display()),
            Some((path, Some(e))) => {
                warn!("Failed to load config {}: {}, using defaults", path.display(), e)
            }
            None => {}
        }

        app.insert_resource(ClearColor(config.lighting.day_sky_color.into()));
        app.insert_resource(AmbientLight {
            color: Color::WHITE,
            brightness: config.lighting.day_ambient_intensity
                * config.lighting.ambient_brightness_scale,
            ..default()
        });

        let show_hud = config.show_hud;
        app.add_plugins(ExplorerPlugin::new(config));
        app.add_plugins((PointerLockPlugin, JumpAudioPlugin));
        if show_hud {
            app.add_plugins(HudPlugin);
        }

        app.add_systems(Startup, setup_scene);
        app
    }

    /// Run the application.
    pub fn run(self) {
        self.build().run();
    }
}

/// Spawn the camera-mounted player and the sun, and record both in
/// [`SceneLightHandles`].
fn setup_scene(
    mut commands: Commands,
    spawn: Res<SpawnConfig>,
    lighting: Res<LightingConfig>,
    mut handles: ResMut<SceneLightHandles>,
) {
    let player = PlayerCharacter::at(spawn.fallback);

    let camera = commands
        .spawn((
            Camera3d::default(),
            Transform::from_translation(player.position).with_rotation(player.rotation()),
            DistanceFog {
                color: lighting.day_fog_color.into(),
                falloff: FogFalloff::Linear {
                    start: lighting.fog_start,
                    end: lighting.fog_end,
                },
                ..default()
            },
            player,
        ))
        .id();

    let sun = commands
        .spawn((
            DirectionalLight {
                illuminance: lighting.day_light_intensity * lighting.sun_illuminance_scale,
                shadows_enabled: true,
                ..default()
            },
            Transform::from_xyz(10.0, 20.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
        ))
        .id();

    handles.camera = Some(camera);
    handles.sun = Some(sun);
}
