//! First-person character controller for terrain exploration.
//!
//! Provides a camera-mounted avatar with:
//! - Mouse look (yaw/pitch, pitch clamped) while the pointer is locked
//! - W/S/A/D or arrow keys move relative to the view yaw
//! - Space to jump when grounded
//! - Capsule collision against the terrain mesh with axis-wise wall sliding
//! - Gravity, ground snapping and respawn after falling through the world
//!
//! The per-frame physics lives in [`step_character`], a pure function over
//! the avatar state, a [`FrameInput`] snapshot and the terrain, so it can be
//! exercised without an `App`.

use bevy::input::mouse::AccumulatedMouseMotion;
use bevy::prelude::*;
use bevy::window::{CursorGrabMode, CursorOptions, PrimaryWindow};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::audio::JumpSound;
use crate::capsule::{sweep, CapsuleSamplePattern, CapsuleShape};
use crate::spawn::{find_spawn_position, SpawnConfig};
use crate::terrain::{TerrainMesh, TerrainQuery};
use crate::terrain_loader::TerrainReady;

/// Plugin that adds the character controller systems.
pub struct CharacterControllerPlugin;

impl Plugin for CharacterControllerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CharacterControllerConfig>()
            .init_resource::<SpawnConfig>()
            .init_resource::<TerrainQuery>()
            .init_resource::<FrameInput>()
            .init_resource::<PointerLock>()
            .add_message::<JumpSound>()
            .add_message::<TerrainReady>()
            .add_systems(
                Update,
                (
                    respawn_on_terrain_ready,
                    character_input_system,
                    character_physics_system,
                    character_camera_system,
                )
                    .chain(),
            );
    }
}

/// Plugin that locks the cursor on click and releases it on Escape.
///
/// Separate from [`CharacterControllerPlugin`] because it needs a window.
pub struct PointerLockPlugin;

impl Plugin for PointerLockPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PointerLock>()
            .add_systems(PreUpdate, pointer_lock_system);
    }
}

/// Configuration for the character controller.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterControllerConfig {
    /// Horizontal movement speed (units/sec)
    pub move_speed: f32,
    /// Initial upward velocity when jumping
    pub jump_speed: f32,
    /// Vertical acceleration (units/sec^2, negative = down)
    pub gravity: f32,
    /// Radians of rotation per pixel of mouse motion
    pub mouse_sensitivity: f32,
    /// Pitch limit in both directions (radians)
    pub max_pitch: f32,
    /// Eye height above the feet; also the capsule's total height
    pub player_height: f32,
    /// Capsule radius
    pub capsule_radius: f32,
    /// Extra reach added to every collision ray
    pub skin_width: f32,
    /// Distance below the local terrain height that triggers a respawn
    pub fall_respawn_margin: f32,
    /// Largest delta time integrated in one frame (seconds)
    pub max_delta: f32,
    /// Capsule sample layout
    pub sample_pattern: CapsuleSamplePattern,
}

impl Default for CharacterControllerConfig {
    fn default() -> Self {
        Self {
            move_speed: 10.0,
            jump_speed: 15.0,
            gravity: -30.0,
            mouse_sensitivity: 0.002,
            max_pitch: FRAC_PI_2,
            player_height: 1.8,
            capsule_radius: 0.4,
            skin_width: 0.05,
            fall_respawn_margin: 20.0,
            max_delta: 0.05,
            sample_pattern: CapsuleSamplePattern::default(),
        }
    }
}

impl CharacterControllerConfig {
    pub fn capsule(&self) -> CapsuleShape {
        CapsuleShape::from_height(self.player_height, self.capsule_radius)
    }
}

/// Component holding the avatar's pose and vertical motion.
///
/// `position` is the eye point; the feet are `player_height` below it.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct PlayerCharacter {
    pub position: Vec3,
    /// Heading (radians, wrapped to (-PI, PI])
    pub yaw: f32,
    /// Vertical look angle (radians, clamped to +-max_pitch)
    pub pitch: f32,
    /// Vertical velocity (units/sec, positive = up)
    pub vertical_velocity: f32,
    /// Whether the feet rest on a surface
    pub grounded: bool,
}

impl Default for PlayerCharacter {
    fn default() -> Self {
        Self::at(Vec3::new(0.0, 5.0, 5.0))
    }
}

impl PlayerCharacter {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            vertical_velocity: 0.0,
            grounded: false,
        }
    }

    /// View orientation: yaw about world Y, then pitch about the local X axis.
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Horizontal forward direction (ignores pitch).
    pub fn forward(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos())
    }

    /// Horizontal right direction (ignores pitch).
    pub fn right(&self) -> Vec3 {
        Vec3::new(self.yaw.cos(), 0.0, -self.yaw.sin())
    }

    fn capsule_center(&self, player_height: f32) -> Vec3 {
        self.position - Vec3::Y * (player_height * 0.5)
    }
}

/// One frame of player intent, gathered from the keyboard and mouse.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct FrameInput {
    /// Mouse motion since the last frame (pixels)
    pub look_delta: Vec2,
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

/// Whether mouse motion currently drives the view.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointerLock {
    pub locked: bool,
}

/// What happened during one controller step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub jumped: bool,
    pub landed: bool,
    pub respawned: bool,
}

/// Apply mouse look: yaw and pitch decrease with positive deltas.
pub fn apply_look(player: &mut PlayerCharacter, look_delta: Vec2, config: &CharacterControllerConfig) {
    if !look_delta.is_finite() {
        return;
    }
    player.yaw = wrap_angle(player.yaw - look_delta.x * config.mouse_sensitivity);
    // clamp panics on a negative or NaN limit
    let limit = config.max_pitch.abs();
    player.pitch = (player.pitch - look_delta.y * config.mouse_sensitivity)
        .min(limit)
        .max(-limit);
}

fn wrap_angle(angle: f32) -> f32 {
    PI - (PI - angle).rem_euclid(TAU)
}

/// Horizontal displacement for this frame's movement keys.
///
/// Pressed directions are summed and normalized before scaling, so diagonals
/// move no faster than a single key. Opposing keys cancel to zero.
pub fn horizontal_displacement(player: &PlayerCharacter, input: &FrameInput, distance: f32) -> Vec3 {
    let forward = player.forward();
    let right = player.right();

    let mut direction = Vec3::ZERO;
    if input.forward {
        direction += forward;
    }
    if input.back {
        direction -= forward;
    }
    if input.left {
        direction -= right;
    }
    if input.right {
        direction += right;
    }

    direction
        .try_normalize()
        .map_or(Vec3::ZERO, |direction| direction * distance)
}

/// Reset the avatar above the best spawn point.
pub fn respawn(player: &mut PlayerCharacter, terrain: &TerrainMesh, spawn: &SpawnConfig) -> Vec3 {
    let position = find_spawn_position(terrain, spawn);
    *player = PlayerCharacter::at(position);
    position
}

/// Advance the avatar by one frame.
///
/// Order matters: look, horizontal move (with wall sliding), jump, gravity,
/// then ground snap and the fall-through safety net.
pub fn step_character(
    player: &mut PlayerCharacter,
    input: &FrameInput,
    terrain: &TerrainMesh,
    config: &CharacterControllerConfig,
    spawn: &SpawnConfig,
    delta_seconds: f32,
) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    let dt = if delta_seconds.is_finite() {
        delta_seconds.min(config.max_delta).max(0.0)
    } else {
        0.0
    };

    apply_look(player, input.look_delta, config);

    let shape = config.capsule();
    let offsets = config.sample_pattern.offsets(&shape);

    // Horizontal movement with axis-wise sliding
    let displacement = horizontal_displacement(player, input, config.move_speed * dt);
    if displacement != Vec3::ZERO {
        let center = player.capsule_center(config.player_height);
        let candidates = [
            displacement,
            Vec3::new(displacement.x, 0.0, 0.0),
            Vec3::new(0.0, 0.0, displacement.z),
        ];
        let accepted = candidates.into_iter().find(|candidate| {
            *candidate != Vec3::ZERO
                && sweep(terrain, center, &shape, &offsets, *candidate, config.skin_width).is_none()
        });
        if let Some(step) = accepted {
            player.position += step;
        }
    }

    // Jump
    if input.jump && player.grounded {
        player.vertical_velocity = config.jump_speed;
        player.grounded = false;
        outcome.jumped = true;
    }

    // Gravity
    player.vertical_velocity += config.gravity * dt;
    let dy = player.vertical_velocity * dt;
    if dy != 0.0 {
        let center = player.capsule_center(config.player_height);
        let vertical = Vec3::Y * dy;
        match sweep(terrain, center, &shape, &offsets, vertical, config.skin_width) {
            None => {
                player.position.y += dy;
                player.grounded = false;
            }
            Some(free) if dy < 0.0 => {
                // Settle onto the surface below
                player.position.y -= free;
                player.vertical_velocity = 0.0;
                outcome.landed = !player.grounded;
                player.grounded = true;
            }
            Some(free) => {
                // Ceiling bump
                player.position.y += free;
                player.vertical_velocity = 0.0;
                player.grounded = false;
            }
        }
    }

    // Ground snap and fall-through recovery
    let ground = terrain.height_at(player.position.x, player.position.z);
    if player.position.y < ground - config.fall_respawn_margin {
        respawn(player, terrain, spawn);
        outcome.respawned = true;
    } else if player.position.y <= ground + config.player_height {
        player.position.y = ground + config.player_height;
        player.vertical_velocity = 0.0;
        outcome.landed |= !player.grounded;
        player.grounded = true;
    }

    outcome
}

/// System that snapshots keyboard and mouse state into [`FrameInput`].
fn character_input_system(
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    pointer: Res<PointerLock>,
    mut input: ResMut<FrameInput>,
) {
    *input = FrameInput {
        look_delta: if pointer.locked {
            mouse_motion.delta
        } else {
            Vec2::ZERO
        },
        forward: keyboard.any_pressed([KeyCode::KeyW, KeyCode::ArrowUp]),
        back: keyboard.any_pressed([KeyCode::KeyS, KeyCode::ArrowDown]),
        left: keyboard.any_pressed([KeyCode::KeyA, KeyCode::ArrowLeft]),
        right: keyboard.any_pressed([KeyCode::KeyD, KeyCode::ArrowRight]),
        jump: keyboard.pressed(KeyCode::Space),
    };
}

/// System that runs one controller step per player.
fn character_physics_system(
    time: Res<Time>,
    input: Res<FrameInput>,
    config: Res<CharacterControllerConfig>,
    spawn: Res<SpawnConfig>,
    terrain: Res<TerrainQuery>,
    mut player_query: Query<&mut PlayerCharacter>,
    mut jump_sounds: MessageWriter<JumpSound>,
) {
    let dt = time.delta_secs();

    for mut player in player_query.iter_mut() {
        let outcome = step_character(&mut player, &input, terrain.mesh(), &config, &spawn, dt);

        if outcome.jumped {
            jump_sounds.write(JumpSound);
        }
        if outcome.respawned {
            info!(
                "Player fell through the terrain, respawned at {:?}",
                player.position
            );
        }
    }
}

/// System that moves the camera to the avatar's eye.
fn character_camera_system(mut query: Query<(&PlayerCharacter, &mut Transform)>) {
    for (player, mut transform) in query.iter_mut() {
        transform.translation = player.position;
        transform.rotation = player.rotation();
    }
}

/// System that respawns every player when a new terrain set is swapped in.
fn respawn_on_terrain_ready(
    mut ready: MessageReader<TerrainReady>,
    spawn: Res<SpawnConfig>,
    terrain: Res<TerrainQuery>,
    mut player_query: Query<&mut PlayerCharacter>,
) {
    if ready.read().last().is_none() {
        return;
    }

    for mut player in player_query.iter_mut() {
        let position = respawn(&mut player, terrain.mesh(), &spawn);
        info!("Terrain ready, player spawned at {:?}", position);
    }
}

/// System that grabs the cursor on left click and releases it on Escape.
fn pointer_lock_system(
    mouse_button: Res<ButtonInput<MouseButton>>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mut pointer: ResMut<PointerLock>,
    mut cursor_query: Query<&mut CursorOptions, With<PrimaryWindow>>,
) {
    let Ok(mut cursor) = cursor_query.single_mut() else {
        return;
    };

    if mouse_button.just_pressed(MouseButton::Left) && !pointer.locked {
        cursor.grab_mode = CursorGrabMode::Locked;
        cursor.visible = false;
        pointer.locked = true;
        info!("Pointer locked");
    } else if keyboard.just_pressed(KeyCode::Escape) && pointer.locked {
        cursor.grab_mode = CursorGrabMode::None;
        cursor.visible = true;
        pointer.locked = false;
        info!("Pointer released");
    }
}
