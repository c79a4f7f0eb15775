//! Spawn locator.
//!
//! Probes a fixed list of X/Z points and places the avatar above the highest
//! one. Used on terrain load and to recover from falling through the world.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::terrain::TerrainMesh;

/// Spawn probe configuration.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    /// Candidate X/Z points, checked in order.
    pub probes: Vec<Vec2>,
    /// Height above the chosen terrain point to place the avatar.
    pub clearance: f32,
    /// Position used while no terrain is loaded.
    pub fallback: Vec3,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            probes: default_probes(10.0),
            clearance: 3.0,
            fallback: Vec3::new(0.0, 5.0, 5.0),
        }
    }
}

/// Origin followed by a symmetric ring of eight points at `radius`.
pub fn default_probes(radius: f32) -> Vec<Vec2> {
    let r = radius;
    vec![
        Vec2::ZERO,
        Vec2::new(r, 0.0),
        Vec2::new(-r, 0.0),
        Vec2::new(0.0, r),
        Vec2::new(0.0, -r),
        Vec2::new(r, r),
        Vec2::new(-r, r),
        Vec2::new(r, -r),
        Vec2::new(-r, -r),
    ]
}

/// Pick the probe with the highest terrain under it.
///
/// Ties keep the first probe in list order. An empty terrain or empty probe
/// list yields the configured fallback.
pub fn find_spawn_position(terrain: &TerrainMesh, config: &SpawnConfig) -> Vec3 {
    if !terrain.is_loaded() {
        return config.fallback;
    }

    let best = config.probes.iter().fold(None, |best: Option<(Vec2, f32)>, probe| {
        let height = terrain.height_at(probe.x, probe.y);
        match best {
            Some((_, best_height)) if height <= best_height => best,
            _ => Some((*probe, height)),
        }
    });

    match best {
        Some((probe, height)) => Vec3::new(probe.x, height + config.clearance, probe.y),
        None => config.fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_terrain_spawns_three_above_origin() {
        let terrain = TerrainMesh::flat_plane(50.0, 0.0);
        let position = find_spawn_position(&terrain, &SpawnConfig::default());
        assert_eq!(position, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_empty_terrain_uses_fallback() {
        let config = SpawnConfig::default();
        let position = find_spawn_position(&TerrainMesh::empty(), &config);
        assert_eq!(position, config.fallback);
    }

    #[test]
    fn test_highest_probe_wins() {
        let mut terrain = TerrainMesh::flat_plane(50.0, 0.0);
        terrain.extend(TerrainMesh::cuboid(Vec3::new(-10.0, 2.5, 10.0), Vec3::new(1.0, 2.5, 1.0)));
        let position = find_spawn_position(&terrain, &SpawnConfig::default());
        assert!((position - Vec3::new(-10.0, 8.0, 10.0)).length() < 1e-4, "got {:?}", position);
    }

    #[test]
    fn test_ties_keep_first_probe() {
        let terrain = TerrainMesh::flat_plane(50.0, 1.0);
        let config = SpawnConfig {
            probes: vec![Vec2::new(5.0, 5.0), Vec2::ZERO],
            ..default()
        };
        let position = find_spawn_position(&terrain, &config);
        assert_eq!(position, Vec3::new(5.0, 4.0, 5.0));
    }

    #[test]
    fn test_no_probes_uses_fallback() {
        let terrain = TerrainMesh::flat_plane(50.0, 0.0);
        let config = SpawnConfig {
            probes: Vec::new(),
            ..default()
        };
        assert_eq!(find_spawn_position(&terrain, &config), config.fallback);
    }
}
