//! Sample-based capsule sweeps against the terrain.
//!
//! The avatar's collision volume is a vertical capsule, but it is never tested
//! analytically. Instead a fixed pattern of points inside the capsule each
//! cast one ray along the direction of motion:
//!
//! ```text
//!        top ●        ring level +H: 8 points at radius R
//!            │
//!     middle ●        ring level  0: 8 points at radius R
//!            │
//!     bottom ●        ring level -H: 8 points at radius R
//! ```
//!
//! 3 axis points plus 8 directions × 3 levels = 27 rays per sweep. Each ray
//! reaches from its sample to the capsule's supporting plane in the direction
//! of motion, plus the move length and a small skin. Geometry thinner than
//! the gap between two samples can slip through; that is accepted.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::terrain::TerrainMesh;

/// Capsule dimensions: radius of the hemispherical caps and half the length
/// of the cylindrical section between them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapsuleShape {
    pub radius: f32,
    pub half_height: f32,
}

impl CapsuleShape {
    /// Capsule whose total height (cap to cap) is `height`.
    pub fn from_height(height: f32, radius: f32) -> Self {
        Self {
            radius,
            half_height: (height * 0.5 - radius).max(0.0),
        }
    }

    /// How far the capsule surface extends past `offset` (a point inside the
    /// capsule, relative to its center) along the unit vector `direction`.
    ///
    /// Uses the capsule's supporting plane, so the result is conservative
    /// near the rounded caps.
    pub fn extent_along(&self, offset: Vec3, direction: Vec3) -> f32 {
        let support = self.half_height * direction.y.abs() + self.radius;
        (support - offset.dot(direction)).max(0.0)
    }
}

/// Fixed sample layout used for every capsule sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleSamplePattern {
    /// Points evenly spaced around the radius at each level.
    pub ring_directions: usize,
    /// Levels spread evenly from the bottom to the top of the cylinder.
    pub ring_levels: usize,
}

impl Default for CapsuleSamplePattern {
    fn default() -> Self {
        Self {
            ring_directions: 8,
            ring_levels: 3,
        }
    }
}

impl CapsuleSamplePattern {
    pub fn sample_count(&self) -> usize {
        3 + self.ring_directions * self.ring_levels
    }

    /// Sample offsets relative to the capsule center: top, middle and bottom
    /// of the axis first, then each ring level from bottom to top.
    pub fn offsets(&self, shape: &CapsuleShape) -> Vec<Vec3> {
        let h = shape.half_height;
        let mut offsets = Vec::with_capacity(self.sample_count());
        offsets.extend([Vec3::Y * h, Vec3::ZERO, Vec3::NEG_Y * h]);

        for level in 0..self.ring_levels {
            let y = if self.ring_levels > 1 {
                -h + 2.0 * h * level as f32 / (self.ring_levels - 1) as f32
            } else {
                0.0
            };
            for i in 0..self.ring_directions {
                let angle = TAU * i as f32 / self.ring_directions as f32;
                offsets.push(Vec3::new(
                    angle.cos() * shape.radius,
                    y,
                    angle.sin() * shape.radius,
                ));
            }
        }
        offsets
    }
}

/// Sweep the sampled capsule centered at `center` by `displacement`.
///
/// Returns `None` when every sample is clear. Otherwise returns how far the
/// capsule can travel along the displacement before its surface touches the
/// nearest hit (clamped to `[0, |displacement|]`).
pub fn sweep(
    terrain: &TerrainMesh,
    center: Vec3,
    shape: &CapsuleShape,
    offsets: &[Vec3],
    displacement: Vec3,
    skin_width: f32,
) -> Option<f32> {
    let distance = displacement.length();
    let direction = displacement.try_normalize()?;

    offsets
        .iter()
        .filter_map(|offset| {
            let extent = shape.extent_along(*offset, direction);
            let reach = distance + extent + skin_width;
            terrain
                .raycast(center + *offset, direction, reach)
                .map(|hit| (hit.distance - extent).clamp(0.0, distance))
        })
        .min_by(|a, b| a.total_cmp(b))
}
