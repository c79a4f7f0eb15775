//! Terrain loading.
//!
//! A [`LoadTerrain`] message starts a load. Triangle extraction runs on the
//! [`AsyncComputeTaskPool`] and reports back over an `async_channel`; the
//! receiving system swaps the finished mesh into [`TerrainQuery`] in one
//! assignment, replaces the visuals and fires [`TerrainReady`].
//!
//! Only the most recent request is applied. Results from superseded loads
//! are dropped.

use bevy::gltf::{Gltf, GltfAssetLabel, GltfMesh, GltfNode};
use bevy::math::Affine3A;
use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::terrain::{TerrainMesh, TerrainQuery};

/// Trees scattered over procedural terrain.
const TREE_COUNT: usize = 20;
/// Rocks scattered over procedural terrain.
const ROCK_COUNT: usize = 15;
/// Guard against malformed node hierarchies.
const MAX_NODE_DEPTH: usize = 64;

/// Where the collision terrain comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainSource {
    /// A glTF/GLB file under the asset directory, uniformly scaled.
    Gltf { path: String, scale: f32 },
    /// Square ground with scattered tree trunks and rocks.
    Procedural { seed: u64, size: f32 },
    /// A single flat square.
    Flat { size: f32, height: f32 },
    /// No terrain at all.
    Empty,
}

impl Default for TerrainSource {
    fn default() -> Self {
        TerrainSource::Procedural {
            seed: 7,
            size: 50.0,
        }
    }
}

/// Errors that can occur while loading terrain.
#[derive(Debug)]
pub enum TerrainLoadError {
    /// Source parameters out of range
    InvalidSource(String),
    /// A glTF source was requested without an asset server
    AssetServerUnavailable(String),
    /// The asset server failed to load the file
    Asset { path: String, reason: String },
    /// The loaded file had no triangle geometry
    NoTriangles(String),
}

impl std::fmt::Display for TerrainLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerrainLoadError::InvalidSource(msg) => write!(f, "Invalid terrain source: {}", msg),
            TerrainLoadError::AssetServerUnavailable(path) => {
                write!(f, "No asset server available to load {}", path)
            }
            TerrainLoadError::Asset { path, reason } => {
                write!(f, "Failed to load {}: {}", path, reason)
            }
            TerrainLoadError::NoTriangles(path) => write!(f, "No triangle meshes in {}", path),
        }
    }
}

impl std::error::Error for TerrainLoadError {}

pub type TerrainLoadResult<T> = Result<T, TerrainLoadError>;

/// Request a terrain load. Replaces whatever is loaded once it finishes.
#[derive(Message, Clone, Debug, PartialEq)]
pub struct LoadTerrain(pub TerrainSource);

/// Fired after a new terrain set has been swapped in.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainReady {
    pub generation: u64,
    pub triangle_count: usize,
}

/// Marker for entities rendering the current terrain.
#[derive(Component)]
pub struct TerrainVisual;

/// Result of one background build.
struct TerrainBuilt {
    request: u64,
    result: TerrainLoadResult<TerrainMesh>,
}

struct PendingGltf {
    request: u64,
    path: String,
    scale: f32,
    handle: Handle<Gltf>,
}

/// Load bookkeeping and the channel background tasks report on.
#[derive(Resource)]
pub struct TerrainLoader {
    tx: async_channel::Sender<TerrainBuilt>,
    rx: async_channel::Receiver<TerrainBuilt>,
    next_request: u64,
    latest: Option<(u64, TerrainSource)>,
    pending_gltf: Option<PendingGltf>,
}

impl Default for TerrainLoader {
    fn default() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            tx,
            rx,
            next_request: 0,
            latest: None,
            pending_gltf: None,
        }
    }
}

impl TerrainLoader {
    /// True while the latest request has not been applied.
    pub fn is_loading(&self) -> bool {
        self.latest.is_some()
    }

    fn begin(&mut self, source: TerrainSource) -> u64 {
        self.next_request += 1;
        self.latest = Some((self.next_request, source));
        self.pending_gltf = None;
        self.next_request
    }

    fn is_latest(&self, request: u64) -> bool {
        matches!(self.latest, Some((latest, _)) if latest == request)
    }

    fn spawn_build<F>(&self, request: u64, build: F)
    where
        F: FnOnce() -> TerrainLoadResult<TerrainMesh> + Send + 'static,
    {
        let tx = self.tx.clone();
        AsyncComputeTaskPool::get()
            .spawn(async move {
                let result = build();
                if tx.send(TerrainBuilt { request, result }).await.is_err() {
                    warn!("Terrain loader channel closed, dropping build {}", request);
                }
            })
            .detach();
    }
}

/// Build the collision mesh for a source that needs no assets.
pub fn build_terrain(source: &TerrainSource) -> TerrainLoadResult<TerrainMesh> {
    match source {
        TerrainSource::Empty => Ok(TerrainMesh::empty()),
        TerrainSource::Flat { size, height } => {
            check_size(*size)?;
            if !height.is_finite() {
                return Err(TerrainLoadError::InvalidSource(format!(
                    "height must be finite, got {}",
                    height
                )));
            }
            Ok(TerrainMesh::flat_plane(*size, *height))
        }
        TerrainSource::Procedural { seed, size } => {
            check_size(*size)?;
            Ok(procedural_terrain(*seed, *size))
        }
        TerrainSource::Gltf { path, .. } => {
            Err(TerrainLoadError::AssetServerUnavailable(path.clone()))
        }
    }
}

fn check_size(size: f32) -> TerrainLoadResult<()> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        Err(TerrainLoadError::InvalidSource(format!(
            "size must be positive, got {}",
            size
        )))
    }
}

/// Ground square with tree trunks and rocks, deterministic per seed.
///
/// Trunks and rocks are boxes. Tree canopies are left out of the collision
/// set since the avatar walks under them.
pub fn procedural_terrain(seed: u64, size: f32) -> TerrainMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut terrain = TerrainMesh::flat_plane(size, 0.0);

    let tree_extent = (size - 10.0) * 0.5;
    for _ in 0..TREE_COUNT {
        let x = scatter(&mut rng, tree_extent);
        let z = scatter(&mut rng, tree_extent);
        let radius = rng.gen_range(0.3..0.5);
        terrain.extend(TerrainMesh::cuboid(
            Vec3::new(x, 2.0, z),
            Vec3::new(radius, 2.0, radius),
        ));
    }

    let rock_extent = (size - 5.0) * 0.5;
    for _ in 0..ROCK_COUNT {
        let x = scatter(&mut rng, rock_extent);
        let z = scatter(&mut rng, rock_extent);
        let rock_size = 0.5 + rng.gen::<f32>() * 1.5;
        terrain.extend(TerrainMesh::cuboid(
            Vec3::new(x, 0.5, z),
            Vec3::splat(rock_size * 0.6),
        ));
    }

    terrain
}

fn scatter(rng: &mut StdRng, extent: f32) -> f32 {
    if extent > 0.0 {
        rng.gen_range(-extent..extent)
    } else {
        0.0
    }
}

/// Merge triangle-list meshes into one collision set. Other topologies are
/// skipped.
pub fn terrain_from_meshes(
    meshes: &[(Mesh, Affine3A)],
    label: &str,
) -> TerrainLoadResult<TerrainMesh> {
    let mut terrain = TerrainMesh::empty();
    for (mesh, transform) in meshes {
        if let Some(part) = TerrainMesh::from_bevy_mesh(mesh, transform) {
            terrain.extend(part);
        }
    }
    if terrain.is_loaded() {
        Ok(terrain)
    } else {
        Err(TerrainLoadError::NoTriangles(label.to_string()))
    }
}

/// Walk the glTF node hierarchy from its roots, collecting every primitive
/// mesh with its world transform.
fn collect_gltf_meshes(
    gltf: &Gltf,
    nodes: &Assets<GltfNode>,
    gltf_meshes: &Assets<GltfMesh>,
    meshes: &Assets<Mesh>,
    root: Affine3A,
) -> Vec<(Mesh, Affine3A)> {
    let children: HashSet<AssetId<GltfNode>> = gltf
        .nodes
        .iter()
        .filter_map(|handle| nodes.get(handle))
        .flat_map(|node| node.children.iter().map(|child| child.id()))
        .collect();

    let mut stack: Vec<(Handle<GltfNode>, Affine3A, usize)> = gltf
        .nodes
        .iter()
        .filter(|handle| !children.contains(&handle.id()))
        .map(|handle| (handle.clone(), root, 0))
        .collect();

    let mut collected = Vec::new();
    while let Some((handle, parent, depth)) = stack.pop() {
        let Some(node) = nodes.get(&handle) else {
            continue;
        };
        let world = parent * node.transform.compute_affine();

        if let Some(gltf_mesh) = node.mesh.as_ref().and_then(|h| gltf_meshes.get(h)) {
            for primitive in &gltf_mesh.primitives {
                if let Some(mesh) = meshes.get(&primitive.mesh) {
                    collected.push((mesh.clone(), world));
                }
            }
        }

        if depth < MAX_NODE_DEPTH {
            stack.extend(
                node.children
                    .iter()
                    .map(|child| (child.clone(), world, depth + 1)),
            );
        }
    }
    collected
}

/// System that starts builds for incoming [`LoadTerrain`] requests.
fn start_terrain_loads(
    mut requests: MessageReader<LoadTerrain>,
    mut loader: ResMut<TerrainLoader>,
    asset_server: Option<Res<AssetServer>>,
) {
    // Only the last request in a frame matters.
    let Some(LoadTerrain(source)) = requests.read().last().cloned() else {
        return;
    };

    info!("Loading terrain from {:?}", source);
    let request = loader.begin(source.clone());

    match source {
        TerrainSource::Gltf { path, scale } => {
            let Some(asset_server) = asset_server else {
                let tx = loader.tx.clone();
                let error = TerrainLoadError::AssetServerUnavailable(path);
                if tx.try_send(TerrainBuilt { request, result: Err(error) }).is_err() {
                    warn!("Terrain loader channel closed");
                }
                return;
            };
            let handle = asset_server.load::<Gltf>(path.clone());
            loader.pending_gltf = Some(PendingGltf {
                request,
                path,
                scale,
                handle,
            });
        }
        source => loader.spawn_build(request, move || build_terrain(&source)),
    }
}

/// System that waits for a requested glTF file and hands its meshes to a
/// background build.
fn poll_gltf_assets(
    mut loader: ResMut<TerrainLoader>,
    asset_server: Res<AssetServer>,
    gltfs: Res<Assets<Gltf>>,
    nodes: Res<Assets<GltfNode>>,
    gltf_meshes: Res<Assets<GltfMesh>>,
    meshes: Res<Assets<Mesh>>,
) {
    let Some(pending) = loader.pending_gltf.as_ref() else {
        return;
    };

    if let bevy::asset::LoadState::Failed(err) = asset_server.load_state(&pending.handle) {
        let error = TerrainLoadError::Asset {
            path: pending.path.clone(),
            reason: err.to_string(),
        };
        let request = pending.request;
        loader.pending_gltf = None;
        if loader.tx.try_send(TerrainBuilt { request, result: Err(error) }).is_err() {
            warn!("Terrain loader channel closed");
        }
        return;
    }

    if !asset_server.is_loaded_with_dependencies(&pending.handle) {
        return;
    }
    let Some(gltf) = gltfs.get(&pending.handle) else {
        return;
    };

    let root = Affine3A::from_scale(Vec3::splat(pending.scale));
    let collected = collect_gltf_meshes(gltf, &nodes, &gltf_meshes, &meshes, root);
    let label = pending.path.clone();
    let request = pending.request;
    debug!("Collected {} glTF primitives from {}", collected.len(), label);

    loader.pending_gltf = None;
    loader.spawn_build(request, move || terrain_from_meshes(&collected, &label));
}

/// System that applies finished builds: swap the collision set, replace the
/// visuals and announce the new terrain.
fn receive_terrain_builds(
    mut commands: Commands,
    mut loader: ResMut<TerrainLoader>,
    mut terrain: ResMut<TerrainQuery>,
    mut ready: MessageWriter<TerrainReady>,
    asset_server: Option<Res<AssetServer>>,
    mut meshes: Option<ResMut<Assets<Mesh>>>,
    mut materials: Option<ResMut<Assets<StandardMaterial>>>,
    visuals: Query<Entity, With<TerrainVisual>>,
) {
    let rx = loader.rx.clone();
    while let Ok(TerrainBuilt { request, result }) = rx.try_recv() {
        if !loader.is_latest(request) {
            debug!("Dropping superseded terrain build {}", request);
            continue;
        }
        let Some((_, source)) = loader.latest.take() else {
            continue;
        };

        let mesh = match result {
            Ok(mesh) => mesh,
            Err(e) => {
                error!("Terrain load failed: {}", e);
                continue;
            }
        };

        for entity in visuals.iter() {
            commands.entity(entity).despawn();
        }
        match &source {
            TerrainSource::Gltf { path, scale } => {
                if let Some(asset_server) = asset_server.as_ref() {
                    let scene =
                        asset_server.load(GltfAssetLabel::Scene(0).from_asset(path.clone()));
                    commands.spawn((
                        TerrainVisual,
                        SceneRoot(scene),
                        Transform::from_scale(Vec3::splat(*scale)),
                    ));
                }
            }
            TerrainSource::Empty => {}
            _ => {
                if let (Some(meshes), Some(materials)) = (meshes.as_mut(), materials.as_mut()) {
                    commands.spawn((
                        TerrainVisual,
                        Mesh3d(meshes.add(mesh.to_bevy_mesh())),
                        MeshMaterial3d(materials.add(StandardMaterial {
                            base_color: Color::srgb_u8(0x3a, 0x5f, 0x3a),
                            perceptual_roughness: 0.9,
                            ..default()
                        })),
                        Transform::IDENTITY,
                    ));
                }
            }
        }

        let triangle_count = mesh.triangle_count();
        let generation = terrain.replace(mesh);
        info!(
            "Terrain ready: {} triangles (generation {})",
            triangle_count, generation
        );
        ready.write(TerrainReady {
            generation,
            triangle_count,
        });
    }
}

/// Plugin that loads terrain in the background and keeps [`TerrainQuery`]
/// current.
#[derive(Default)]
pub struct TerrainPlugin {
    /// Source requested at startup, if any.
    pub initial_source: Option<TerrainSource>,
}

impl TerrainPlugin {
    pub fn with_source(source: TerrainSource) -> Self {
        Self {
            initial_source: Some(source),
        }
    }
}

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TerrainQuery>()
            .init_resource::<TerrainLoader>()
            .add_message::<LoadTerrain>()
            .add_message::<TerrainReady>()
            .add_systems(
                PreUpdate,
                (
                    start_terrain_loads,
                    poll_gltf_assets.run_if(
                        resource_exists::<AssetServer>
                            .and(resource_exists::<Assets<Gltf>>)
                            .and(resource_exists::<Assets<GltfNode>>)
                            .and(resource_exists::<Assets<GltfMesh>>)
                            .and(resource_exists::<Assets<Mesh>>),
                    ),
                    receive_terrain_builds,
                )
                    .chain(),
            );

        if let Some(source) = self.initial_source.clone() {
            app.add_systems(Startup, move |mut writer: MessageWriter<LoadTerrain>| {
                writer.write(LoadTerrain(source.clone()));
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::asset::RenderAssetUsages;
    use bevy::mesh::PrimitiveTopology;

    #[test]
    fn test_flat_source_builds_plane() {
        let terrain = build_terrain(&TerrainSource::Flat {
            size: 20.0,
            height: 1.5,
        })
        .expect("flat terrain should build");
        assert_eq!(terrain.triangle_count(), 2);
        assert!((terrain.height_at(3.0, -4.0) - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_empty_source_builds_empty_set() {
        let terrain = build_terrain(&TerrainSource::Empty).expect("empty always builds");
        assert!(!terrain.is_loaded());
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        for size in [0.0, -5.0, f32::NAN, f32::INFINITY] {
            let result = build_terrain(&TerrainSource::Flat { size, height: 0.0 });
            assert!(
                matches!(result, Err(TerrainLoadError::InvalidSource(_))),
                "size {} should be rejected",
                size
            );
        }
    }

    #[test]
    fn test_gltf_needs_asset_server() {
        let result = build_terrain(&TerrainSource::Gltf {
            path: "models/terrain.glb".into(),
            scale: 1.0,
        });
        assert!(matches!(result, Err(TerrainLoadError::AssetServerUnavailable(_))));
    }

    #[test]
    fn test_procedural_is_deterministic_per_seed() {
        let a = procedural_terrain(42, 50.0);
        let b = procedural_terrain(42, 50.0);
        let c = procedural_terrain(43, 50.0);

        // Ground (2) + 35 boxes (12 each).
        assert_eq!(a.triangle_count(), 2 + (TREE_COUNT + ROCK_COUNT) * 12);
        assert_eq!(a.bounds(), b.bounds());
        assert_eq!(a.triangles(), b.triangles());
        assert_ne!(a.triangles(), c.triangles());
    }

    #[test]
    fn test_procedural_props_stay_on_ground() {
        let terrain = procedural_terrain(7, 50.0);
        let (min, max) = terrain.bounds().expect("procedural terrain has bounds");
        assert!(max.x <= 25.0 + 1e-4 && min.x >= -25.0 - 1e-4);
        assert!(max.y <= 4.0 + 1e-4, "tallest prop is a 4 unit trunk, got {}", max.y);
    }

    #[test]
    fn test_tiny_procedural_does_not_panic() {
        let terrain = procedural_terrain(1, 4.0);
        assert!(terrain.is_loaded());
    }

    #[test]
    fn test_terrain_from_meshes_skips_non_triangles() {
        let plane = TerrainMesh::flat_plane(10.0, 0.0).to_bevy_mesh();
        let lines = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
            .with_inserted_attribute(
                Mesh::ATTRIBUTE_POSITION,
                vec![[0.0f32, 0.0, 0.0], [1.0, 1.0, 1.0]],
            );

        let terrain = terrain_from_meshes(
            &[
                (lines.clone(), Affine3A::IDENTITY),
                (plane, Affine3A::from_translation(Vec3::Y * 2.0)),
            ],
            "test",
        )
        .expect("plane should contribute triangles");
        assert_eq!(terrain.triangle_count(), 2);
        assert!((terrain.height_at(0.5, 0.5) - 2.0).abs() < 1e-5);

        let only_lines = terrain_from_meshes(&[(lines, Affine3A::IDENTITY)], "lines");
        assert!(matches!(only_lines, Err(TerrainLoadError::NoTriangles(_))));
    }

    #[test]
    fn test_source_json_shape() {
        let source = TerrainSource::Gltf {
            path: "terrain.glb".into(),
            scale: 2.0,
        };
        let json = serde_json::to_string(&source).expect("serialize");
        assert!(json.contains("\"kind\":\"gltf\""), "json was {}", json);
        let back: TerrainSource = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, source);
    }

    #[test]
    fn test_loading_flag_tracks_latest_request() {
        let mut loader = TerrainLoader::default();
        assert!(!loader.is_loading());

        let first = loader.begin(TerrainSource::Empty);
        let second = loader.begin(TerrainSource::default());
        assert!(loader.is_loading());
        assert!(!loader.is_latest(first));
        assert!(loader.is_latest(second));

        loader.latest.take();
        assert!(!loader.is_loading());
    }
}
