//! Headless end-to-end tests: the explorer's simulation plugins running on
//! `MinimalPlugins` with a fixed frame time, no window or renderer.

use bevy::input::InputPlugin;
use bevy::pbr::DistanceFog;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use explorer_core::{
    ConfigError, DayPhase, ExplorerApp, ExplorerConfig, ExplorerPlugin, JumpSound, LightingState,
    LoadTerrain, PlayerCharacter, SceneLightHandles, TerrainLoader, TerrainQuery, TerrainSource,
};
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

fn headless_app(config: ExplorerConfig) -> App {
    let mut app = App::new();
    app.add_plugins((MinimalPlugins, InputPlugin));
    app.insert_resource(TimeUpdateStrategy::ManualDuration(FRAME));
    app.add_plugins(ExplorerPlugin::new(config));
    app
}

fn flat_config(height: f32) -> ExplorerConfig {
    ExplorerConfig {
        terrain: TerrainSource::Flat {
            size: 200.0,
            height,
        },
        ..default()
    }
}

fn spawn_player(app: &mut App) -> Entity {
    app.world_mut()
        .spawn((PlayerCharacter::default(), Transform::default()))
        .id()
}

fn player(app: &App, entity: Entity) -> PlayerCharacter {
    app.world()
        .get::<PlayerCharacter>(entity)
        .cloned()
        .expect("player entity should exist")
}

/// Run frames until the terrain generation reaches `generation`.
fn wait_for_terrain(app: &mut App, generation: u64) {
    for _ in 0..500 {
        app.update();
        if app.world().resource::<TerrainQuery>().generation() >= generation {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("terrain generation {} never arrived", generation);
}

fn run_frames(app: &mut App, frames: usize) {
    for _ in 0..frames {
        app.update();
    }
}

#[derive(Resource, Default)]
struct JumpCount(usize);

fn count_jumps(mut jumps: MessageReader<JumpSound>, mut count: ResMut<JumpCount>) {
    count.0 += jumps.read().count();
}

#[test]
fn test_player_spawns_and_lands_on_loaded_terrain() {
    let mut app = headless_app(flat_config(0.0));
    let entity = spawn_player(&mut app);

    wait_for_terrain(&mut app, 1);
    assert!(!app.world().resource::<TerrainLoader>().is_loading());
    let spawned = player(&app, entity);
    println!("Spawned at {:?}", spawned.position);
    assert!(
        (spawned.position - Vec3::new(0.0, 3.0, 0.0)).length() < 0.2,
        "spawn should be 3 above the origin, got {:?}",
        spawned.position
    );

    run_frames(&mut app, 120);
    let landed = player(&app, entity);
    assert!(landed.grounded, "player should be grounded: {:?}", landed);
    assert!(
        (landed.position.y - 1.8).abs() < 1e-3,
        "eye should rest at player height, got {}",
        landed.position.y
    );

    let transform = app.world().get::<Transform>(entity).copied().unwrap();
    assert_eq!(transform.translation, landed.position, "camera follows the eye");
}

#[test]
fn test_holding_forward_walks_along_view() {
    let mut app = headless_app(flat_config(0.0));
    let entity = spawn_player(&mut app);
    wait_for_terrain(&mut app, 1);
    run_frames(&mut app, 120);

    let start = player(&app, entity).position;
    app.world_mut()
        .resource_mut::<ButtonInput<KeyCode>>()
        .press(KeyCode::KeyW);
    run_frames(&mut app, 30);
    let end = player(&app, entity).position;

    println!("Walked from {:?} to {:?}", start, end);
    assert!(end.z < start.z - 3.0, "should walk toward -Z: {:?} -> {:?}", start, end);
    assert!((end.x - start.x).abs() < 1e-4);
    assert!((end.y - 1.8).abs() < 1e-3, "should stay on the ground");
}

#[test]
fn test_space_jumps_once_and_fires_sound() {
    let mut app = headless_app(flat_config(0.0));
    app.init_resource::<JumpCount>()
        .add_systems(PostUpdate, count_jumps);
    let entity = spawn_player(&mut app);
    wait_for_terrain(&mut app, 1);
    run_frames(&mut app, 120);
    assert!(player(&app, entity).grounded);

    app.world_mut()
        .resource_mut::<ButtonInput<KeyCode>>()
        .press(KeyCode::Space);
    app.update();

    let airborne = player(&app, entity);
    assert!(!airborne.grounded);
    assert!(airborne.vertical_velocity > 0.0);
    assert_eq!(app.world().resource::<JumpCount>().0, 1);

    // Holding space in the air does not jump again.
    run_frames(&mut app, 5);
    assert_eq!(app.world().resource::<JumpCount>().0, 1);
}

#[test]
fn test_falling_through_the_world_respawns() {
    let mut app = headless_app(flat_config(0.0));
    let entity = spawn_player(&mut app);
    wait_for_terrain(&mut app, 1);

    app.world_mut()
        .get_mut::<PlayerCharacter>(entity)
        .unwrap()
        .position = Vec3::new(30.0, -40.0, 30.0);
    app.update();

    let recovered = player(&app, entity);
    assert!(recovered.position.y >= 0.0, "respawned at {:?}", recovered.position);
    assert_eq!(recovered.vertical_velocity, 0.0);
}

#[test]
fn test_loading_new_terrain_respawns_on_it() {
    let mut app = headless_app(flat_config(0.0));
    let entity = spawn_player(&mut app);
    wait_for_terrain(&mut app, 1);
    run_frames(&mut app, 60);

    app.world_mut().write_message(LoadTerrain(TerrainSource::Flat {
        size: 100.0,
        height: 5.0,
    }));
    wait_for_terrain(&mut app, 2);
    run_frames(&mut app, 120);

    let moved = player(&app, entity);
    assert!(
        (moved.position.y - 6.8).abs() < 1e-3,
        "should stand on the raised plane, got {:?}",
        moved.position
    );
}

#[test]
fn test_clock_drives_scene_lighting() {
    let mut config = ExplorerConfig::default();
    config.terrain = TerrainSource::Empty;
    config.day_night.start_time = 0.2;
    let fog_day = config.lighting.day_fog_color;
    let mut app = headless_app(config);

    app.insert_resource(ClearColor(Color::BLACK));
    app.insert_resource(AmbientLight::default());
    let camera = app.world_mut().spawn(DistanceFog::default()).id();
    let sun = app
        .world_mut()
        .spawn((DirectionalLight::default(), Transform::default()))
        .id();
    {
        let mut handles = app.world_mut().resource_mut::<SceneLightHandles>();
        handles.camera = Some(camera);
        handles.sun = Some(sun);
    }

    app.update();
    let dawn = app.world().resource::<LightingState>().clone();
    assert_eq!(dawn.phase, DayPhase::Dawn);
    assert!(dawn.light_intensity > 0.1 && dawn.light_intensity < 0.8);

    let fog = app.world().get::<DistanceFog>(camera).unwrap();
    assert_eq!(fog.color, Color::from(dawn.fog_color));
    let light = app.world().get::<DirectionalLight>(sun).unwrap();
    assert!(light.illuminance > 0.0);

    // 0.2 -> past 0.25 takes at least 6 seconds of a 120 second day.
    run_frames(&mut app, 500);
    let day = app.world().resource::<LightingState>().clone();
    assert_eq!(day.phase, DayPhase::Day);
    assert_eq!(day.fog_color, fog_day);
    let clear = app.world().resource::<ClearColor>().0;
    assert_eq!(clear, Color::from(day.sky_color));
}

#[test]
fn test_config_file_feeds_app_builder() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("explorer.json");

    let mut config = ExplorerConfig::default();
    config.terrain = TerrainSource::Procedural {
        seed: 99,
        size: 64.0,
    };
    config.day_night.day_length = 600.0;
    explorer_core::save_config(&path, &config).unwrap();

    let app = ExplorerApp::from_config_file(&path);
    assert_eq!(app.config(), &config);
    assert!(app.config_error().is_none());

    let fallback = ExplorerApp::from_config_file(dir.path().join("missing.json"));
    assert_eq!(fallback.config(), &ExplorerConfig::default());
    assert!(
        matches!(fallback.config_error(), Some(ConfigError::Io(_))),
        "missing file should keep its error for logging"
    );
}

#[test]
fn test_invalid_config_file_falls_back_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("explorer.json");
    std::fs::write(&path, r#"{ "controller": { "max_delta": -0.05 } }"#).unwrap();

    let app = ExplorerApp::from_config_file(&path);
    assert_eq!(app.config(), &ExplorerConfig::default());
    assert!(
        matches!(app.config_error(), Some(ConfigError::Invalid(_))),
        "got {:?}",
        app.config_error()
    );
}
