//! Terrain query service.
//!
//! Holds the static set of world-space triangles the avatar collides with and
//! answers the two questions the rest of the crate asks about it:
//!
//! - `height_at(x, z)` - elevation of the highest surface under a column
//! - `is_blocked(point, direction, max_distance)` - is there geometry closer
//!   than `max_distance` along a ray
//!
//! ## Architecture
//!
//! ```text
//! TerrainSource (gltf file, procedural, flat plane)
//!       │  async task (terrain_loader.rs)
//!       ▼
//! TerrainMesh (Vec<TerrainTriangle>, immutable once built)
//!       │  Arc swap
//!       ▼
//! TerrainQuery (Bevy resource, read by controller + spawn locator)
//! ```
//!
//! Every query is a brute-force ray test against every triangle. There is no
//! spatial index; the sets this demo loads are small enough that a linear scan
//! per ray is fine at frame rate.
//!
//! An empty mesh never fails a query: heights fall back to
//! [`FALLBACK_HEIGHT`] and rays never report a hit.

use bevy::asset::RenderAssetUsages;
use bevy::math::Affine3A;
use bevy::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bevy::prelude::*;
use std::sync::Arc;

/// Elevation reported when no terrain is loaded or nothing lies under a column.
pub const FALLBACK_HEIGHT: f32 = 0.0;

/// How far above the mesh bounds the downward height probe starts.
const HEIGHT_PROBE_CLEARANCE: f32 = 10.0;

/// Determinant threshold below which a ray is treated as parallel to a triangle.
const PARALLEL_EPSILON: f32 = 1e-8;

/// Barycentric slack so rays along a shared edge hit at least one neighbour.
const EDGE_EPSILON: f32 = 1e-6;

/// A single world-space triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainTriangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

/// Where a ray struck a triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Distance along the (normalized) ray direction.
    pub distance: f32,
    /// Hit point, interpolated from the triangle's vertices.
    pub point: Vec3,
}

impl TerrainTriangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Möller–Trumbore ray/triangle intersection, double sided.
    ///
    /// `direction` must already be normalized for `distance` to be in world
    /// units. Hits behind the origin are ignored.
    pub fn raycast(&self, origin: Vec3, direction: Vec3) -> Option<RayHit> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;

        let p = direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() < PARALLEL_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = origin - self.a;
        let u = s.dot(p) * inv_det;
        if !(-EDGE_EPSILON..=1.0 + EDGE_EPSILON).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = direction.dot(q) * inv_det;
        if v < -EDGE_EPSILON || u + v > 1.0 + EDGE_EPSILON {
            return None;
        }

        let distance = edge2.dot(q) * inv_det;
        if distance < 0.0 || !distance.is_finite() {
            return None;
        }

        // Barycentric point rather than origin + t * dir: the height probe
        // starts far above the surface and f32 loses the low bits otherwise.
        let point = self.a + edge1 * u + edge2 * v;
        Some(RayHit { distance, point })
    }

    fn transformed(&self, transform: &Affine3A) -> Self {
        Self {
            a: transform.transform_point3(self.a),
            b: transform.transform_point3(self.b),
            c: transform.transform_point3(self.c),
        }
    }
}

/// Immutable collection of collision triangles.
#[derive(Clone, Debug, Default)]
pub struct TerrainMesh {
    triangles: Vec<TerrainTriangle>,
    /// Axis-aligned bounds (min, max). `None` while empty.
    bounds: Option<(Vec3, Vec3)>,
}

impl TerrainMesh {
    /// An empty set. Every query degrades to its permissive default.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_triangles(triangles: Vec<TerrainTriangle>) -> Self {
        let mut mesh = Self {
            triangles,
            bounds: None,
        };
        mesh.recompute_bounds();
        mesh
    }

    /// Square plane of side `size` centered on the origin at elevation `height`.
    pub fn flat_plane(size: f32, height: f32) -> Self {
        let h = size * 0.5;
        let corners = [
            Vec3::new(-h, height, -h),
            Vec3::new(h, height, -h),
            Vec3::new(h, height, h),
            Vec3::new(-h, height, h),
        ];
        Self::from_triangles(vec![
            TerrainTriangle::new(corners[0], corners[2], corners[1]),
            TerrainTriangle::new(corners[0], corners[3], corners[2]),
        ])
    }

    /// Closed axis-aligned box, 12 triangles.
    pub fn cuboid(center: Vec3, half_extents: Vec3) -> Self {
        let min = center - half_extents;
        let max = center + half_extents;
        let v = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        let p = [
            v(min.x, min.y, min.z),
            v(max.x, min.y, min.z),
            v(max.x, min.y, max.z),
            v(min.x, min.y, max.z),
            v(min.x, max.y, min.z),
            v(max.x, max.y, min.z),
            v(max.x, max.y, max.z),
            v(min.x, max.y, max.z),
        ];
        // Two triangles per face, wound outward.
        const FACES: [[usize; 4]; 6] = [
            [0, 1, 2, 3], // bottom
            [4, 7, 6, 5], // top
            [0, 4, 5, 1], // -z
            [3, 2, 6, 7], // +z
            [0, 3, 7, 4], // -x
            [1, 5, 6, 2], // +x
        ];
        let triangles = FACES
            .iter()
            .flat_map(|[a, b, c, d]| {
                [
                    TerrainTriangle::new(p[*a], p[*b], p[*c]),
                    TerrainTriangle::new(p[*a], p[*c], p[*d]),
                ]
            })
            .collect();
        Self::from_triangles(triangles)
    }

    /// Regular grid of `resolution` x `resolution` cells over a square of side
    /// `size`, with vertex elevations sampled from `height`.
    pub fn heightfield(size: f32, resolution: usize, height: impl Fn(f32, f32) -> f32) -> Self {
        let resolution = resolution.max(1);
        let step = size / resolution as f32;
        let origin = -size * 0.5;
        let vertex = |ix: usize, iz: usize| {
            let x = origin + ix as f32 * step;
            let z = origin + iz as f32 * step;
            Vec3::new(x, height(x, z), z)
        };

        let mut triangles = Vec::with_capacity(resolution * resolution * 2);
        for iz in 0..resolution {
            for ix in 0..resolution {
                let p00 = vertex(ix, iz);
                let p10 = vertex(ix + 1, iz);
                let p01 = vertex(ix, iz + 1);
                let p11 = vertex(ix + 1, iz + 1);
                triangles.push(TerrainTriangle::new(p00, p01, p11));
                triangles.push(TerrainTriangle::new(p00, p11, p10));
            }
        }
        Self::from_triangles(triangles)
    }

    /// Extract the triangles of a Bevy triangle-list mesh, moved into world
    /// space by `transform`.
    ///
    /// Meshes with another topology, or without `f32x3` positions, yield
    /// `None`.
    pub fn from_bevy_mesh(mesh: &Mesh, transform: &Affine3A) -> Option<Self> {
        if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
            return None;
        }
        let Some(VertexAttributeValues::Float32x3(positions)) =
            mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        else {
            return None;
        };
        let position = |i: usize| positions.get(i).map(|p| Vec3::from_array(*p));

        let indices: Vec<usize> = match mesh.indices() {
            Some(indices) => indices.iter().collect(),
            None => (0..positions.len()).collect(),
        };

        let triangles = indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let triangle = TerrainTriangle::new(
                    position(tri[0])?,
                    position(tri[1])?,
                    position(tri[2])?,
                );
                Some(triangle.transformed(transform))
            })
            .collect();
        Some(Self::from_triangles(triangles))
    }

    /// Build a flat-shaded render mesh from the collision triangles.
    pub fn to_bevy_mesh(&self) -> Mesh {
        let positions: Vec<[f32; 3]> = self
            .triangles
            .iter()
            .flat_map(|t| [t.a.to_array(), t.b.to_array(), t.c.to_array()])
            .collect();
        Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
            .with_computed_flat_normals()
    }

    /// Append another set's triangles.
    pub fn extend(&mut self, other: TerrainMesh) {
        self.triangles.extend(other.triangles);
        self.recompute_bounds();
    }

    pub fn triangles(&self) -> &[TerrainTriangle] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_loaded(&self) -> bool {
        !self.triangles.is_empty()
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.bounds
    }

    fn recompute_bounds(&mut self) {
        self.bounds = self.triangles.iter().fold(None, |acc, t| {
            let tri_min = t.a.min(t.b).min(t.c);
            let tri_max = t.a.max(t.b).max(t.c);
            Some(match acc {
                Some((min, max)) => (min.min(tri_min), max.max(tri_max)),
                None => (tri_min, tri_max),
            })
        });
    }

    /// Nearest hit along a normalized ray, closer than `max_distance`.
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        if !origin.is_finite() || !direction.is_finite() {
            return None;
        }
        self.triangles
            .iter()
            .filter_map(|t| t.raycast(origin, direction))
            .filter(|hit| hit.distance < max_distance)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// Elevation of the highest surface directly below `(x, z)`.
    ///
    /// Returns [`FALLBACK_HEIGHT`] when the set is empty or the column misses
    /// every triangle.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let Some((_, max)) = self.bounds else {
            return FALLBACK_HEIGHT;
        };
        let origin = Vec3::new(x, max.y + HEIGHT_PROBE_CLEARANCE, z);
        self.raycast(origin, Vec3::NEG_Y, f32::INFINITY)
            .map_or(FALLBACK_HEIGHT, |hit| hit.point.y)
    }

    /// True iff geometry lies strictly closer than `max_distance` along
    /// `direction` from `point`.
    ///
    /// Zero-length or non-finite directions never block.
    pub fn is_blocked(&self, point: Vec3, direction: Vec3, max_distance: f32) -> bool {
        let Some(direction) = direction.try_normalize() else {
            return false;
        };
        self.raycast(point, direction, max_distance).is_some()
    }
}

/// Shared terrain handle read by the controller and spawn locator.
///
/// Replacing the terrain swaps the whole `Arc` in one assignment, so a reader
/// sees either the previous set or the new one, never a mix.
#[derive(Resource, Clone, Default)]
pub struct TerrainQuery {
    mesh: Arc<TerrainMesh>,
    generation: u64,
}

impl TerrainQuery {
    pub fn new(mesh: TerrainMesh) -> Self {
        Self {
            mesh: Arc::new(mesh),
            generation: 1,
        }
    }

    /// Swap in a new mesh set as a unit. Returns the new generation.
    pub fn replace(&mut self, mesh: TerrainMesh) -> u64 {
        self.mesh = Arc::new(mesh);
        self.generation += 1;
        self.generation
    }

    /// Cheap clone of the current set, stable across later swaps.
    pub fn snapshot(&self) -> Arc<TerrainMesh> {
        Arc::clone(&self.mesh)
    }

    pub fn mesh(&self) -> &TerrainMesh {
        &self.mesh
    }

    /// Number of swaps so far (0 = never loaded).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loaded(&self) -> bool {
        self.mesh.is_loaded()
    }

    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.mesh.height_at(x, z)
    }

    pub fn is_blocked(&self, point: Vec3, direction: Vec3, max_distance: f32) -> bool {
        self.mesh.is_blocked(point, direction, max_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mesh_height_is_fallback() {
        let terrain = TerrainMesh::empty();
        for (x, z) in [(0.0, 0.0), (12.5, -3.0), (-1000.0, 1000.0)] {
            assert_eq!(terrain.height_at(x, z), FALLBACK_HEIGHT);
        }
    }

    #[test]
    fn test_empty_mesh_never_blocks() {
        let terrain = TerrainMesh::empty();
        assert!(!terrain.is_blocked(Vec3::ZERO, Vec3::X, 1000.0));
        assert!(!terrain.is_blocked(Vec3::new(3.0, -2.0, 1.0), Vec3::NEG_Y, f32::MAX));
    }

    #[test]
    fn test_flat_plane_height() {
        let terrain = TerrainMesh::flat_plane(50.0, 2.5);
        assert_eq!(terrain.height_at(0.0, 0.0), 2.5);
        assert_eq!(terrain.height_at(10.0, -7.0), 2.5);
        // Outside the plane the column misses everything.
        assert_eq!(terrain.height_at(100.0, 0.0), FALLBACK_HEIGHT);
    }

    #[test]
    fn test_height_picks_highest_surface() {
        let mut terrain = TerrainMesh::flat_plane(50.0, 0.0);
        terrain.extend(TerrainMesh::cuboid(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(1.0)));

        let on_box = terrain.height_at(0.0, 0.0);
        assert!((on_box - 3.0).abs() < 1e-5, "expected box top, got {}", on_box);

        let beside_box = terrain.height_at(5.0, 5.0);
        assert!(beside_box.abs() < 1e-5, "expected ground, got {}", beside_box);
    }

    #[test]
    fn test_is_blocked_is_strict() {
        let terrain = TerrainMesh::cuboid(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(1.0));
        // Near face at x = 4, four units away.
        assert!(terrain.is_blocked(Vec3::ZERO, Vec3::X, 4.5));
        assert!(!terrain.is_blocked(Vec3::ZERO, Vec3::X, 3.5));
        // Looking away from the box.
        assert!(!terrain.is_blocked(Vec3::ZERO, Vec3::NEG_X, 100.0));
    }

    #[test]
    fn test_is_blocked_normalizes_direction() {
        let terrain = TerrainMesh::cuboid(Vec3::new(5.0, 0.0, 0.0), Vec3::splat(1.0));
        assert!(terrain.is_blocked(Vec3::ZERO, Vec3::X * 40.0, 4.5));
        assert!(!terrain.is_blocked(Vec3::ZERO, Vec3::X * 40.0, 3.5));
    }

    #[test]
    fn test_degenerate_direction_never_blocks() {
        let terrain = TerrainMesh::flat_plane(10.0, 0.0);
        assert!(!terrain.is_blocked(Vec3::Y, Vec3::ZERO, 10.0));
        assert!(!terrain.is_blocked(Vec3::Y, Vec3::new(f32::NAN, -1.0, 0.0), 10.0));
    }

    #[test]
    fn test_raycast_returns_nearest_hit() {
        let mut terrain = TerrainMesh::cuboid(Vec3::new(10.0, 0.0, 0.0), Vec3::splat(1.0));
        terrain.extend(TerrainMesh::cuboid(Vec3::new(4.0, 0.0, 0.0), Vec3::splat(1.0)));
        let hit = terrain.raycast(Vec3::ZERO, Vec3::X, f32::INFINITY).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-5, "got {}", hit.distance);
    }

    #[test]
    fn test_heightfield_follows_function() {
        let terrain = TerrainMesh::heightfield(20.0, 20, |x, _z| x * 0.5);
        assert_eq!(terrain.triangle_count(), 20 * 20 * 2);
        let h = terrain.height_at(4.0, 3.0);
        assert!((h - 2.0).abs() < 1e-4, "expected 2.0, got {}", h);
    }

    #[test]
    fn test_from_bevy_mesh_applies_transform() {
        let mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[-1.0, 0.0, -1.0], [-1.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 0.0, -1.0]],
            )
            .with_inserted_indices(Indices::U32(vec![0, 1, 2, 0, 2, 3]));
        let transform =
            Affine3A::from_scale_rotation_translation(Vec3::splat(2.0), Quat::IDENTITY, Vec3::Y * 3.0);

        let terrain = TerrainMesh::from_bevy_mesh(&mesh, &transform).unwrap();
        assert_eq!(terrain.triangle_count(), 2);
        assert_eq!(terrain.height_at(1.5, -1.5), 3.0);
        assert_eq!(terrain.height_at(2.5, 0.0), FALLBACK_HEIGHT);
    }

    #[test]
    fn test_from_bevy_mesh_rejects_line_list() {
        let mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
            .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(TerrainMesh::from_bevy_mesh(&mesh, &Affine3A::IDENTITY).is_none());
    }

    #[test]
    fn test_query_swap_is_whole_set() {
        let mut query = TerrainQuery::default();
        assert_eq!(query.generation(), 0);
        assert!(!query.is_loaded());

        let before = query.snapshot();
        let generation = query.replace(TerrainMesh::flat_plane(10.0, 1.0));
        assert_eq!(generation, 1);

        // A snapshot taken before the swap still sees the old set.
        assert!(!before.is_loaded());
        assert_eq!(query.height_at(0.0, 0.0), 1.0);
    }
}
