use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;

use boxrun_engine::events::VolumeEvent;
use boxrun_engine::registry::VolumeRegistry;
use boxrun_engine::space::Coord;
use boxrun_engine::state::{CellState, StateTable};
use boxrun_engine::volume::islands::Island;
use boxrun_engine::volume::mutate::EmptyPolicy;
use boxrun_engine::volume::run::RunShape;
use boxrun_engine::volume::snapshot::Snapshot;
use boxrun_engine::volume::{Volume, VolumeConfig, codec, search};
use glam::Vec3;

/// Scene used when no `--scene` file is given: a quarry slab with a dirt
/// overhang ready to calve.
const DEFAULT_SCENE: &str = r#"{
  "name": "quarry",
  "states": [
    { "name": "bedrock", "permanent": true, "supported": true, "density": 10.0 },
    { "name": "rock", "hard": true, "density": 2.6 },
    { "name": "dirt", "density": 1.3 }
  ],
  "fills": [
    { "state": "bedrock", "from": [-6, 0, -6], "to": [6, 1, 6] },
    { "state": "rock", "from": [-6, 1, -6], "to": [6, 3, 6] },
    { "state": "dirt", "from": [-6, 3, -6], "to": [6, 4, 6] },
    { "state": "dirt", "from": [6, 3, -1], "to": [9, 4, 1] }
  ]
}"#;

#[derive(Debug, Deserialize)]
struct SceneConfig {
    name: String,
    states: Vec<StateSpec>,
    #[serde(default)]
    fills: Vec<FillSpec>,
}

#[derive(Debug, Deserialize)]
struct StateSpec {
    name: String,
    #[serde(default)]
    permanent: bool,
    #[serde(default)]
    supported: bool,
    #[serde(default)]
    hard: bool,
    #[serde(default = "default_density")]
    density: f32,
}

fn default_density() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct FillSpec {
    state: String,
    from: [i32; 3],
    to: [i32; 3],
}

fn main() -> Result<()> {
    let scene_path: Option<PathBuf> = std::env::args()
        .skip_while(|a| a != "--scene")
        .nth(1)
        .map(PathBuf::from);
    let save_path: Option<PathBuf> = std::env::args()
        .skip_while(|a| a != "--save")
        .nth(1)
        .map(PathBuf::from);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let scene = match &scene_path {
        Some(path) => load_scene(path)?,
        None => serde_json::from_str(DEFAULT_SCENE).context("parsing the built-in scene")?,
    };

    tracing::info!("Box-run sandbox -- scene '{}'", scene.name);
    let (table, volume) = build_volume(&scene)?;
    let volume = Arc::new(volume);
    tracing::info!(
        "Scene ready: {} runs across {} chunks",
        volume.active_run_count(),
        volume.chunk_count()
    );

    let registry = VolumeRegistry::new();
    let terrain = registry.insert(volume.clone());

    // ── Carve a trench straight across the slab ──────────────────────────
    let mut trench = Vec::new();
    for x in -6..6 {
        for y in 1..4 {
            trench.push(Coord::new(x, y, 0));
        }
    }
    let before = volume.active_run_count();
    let carved = volume.empty_many(&trench, EmptyPolicy::default());
    volume.regenerate_now();
    tracing::info!(
        "Trench carved: {} cells removed, {} runs -> {} after the rebuild",
        carved,
        before,
        volume.active_run_count()
    );

    // ── Undercut the overhang and let the island calve ───────────────────
    let rx = volume.subscribe();
    volume.empty_many(
        &[Coord::new(6, 3, -1), Coord::new(6, 3, 0)],
        EmptyPolicy::default(),
    );
    registry.regenerate(terrain);

    let mut islands: Vec<Island> = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(VolumeEvent::Islands(list)) => {
                islands = list.to_vec();
                break;
            }
            _ => continue,
        }
    }

    if islands.is_empty() {
        tracing::warn!("No island detached -- something is off.");
    } else {
        let cells: i64 = islands.iter().map(|i| i.cell_count()).sum();
        tracing::info!("{} island(s) detached, {} cells total", islands.len(), cells);

        let shapes: Vec<RunShape> = islands
            .iter()
            .flat_map(|island| island.shapes.iter().copied())
            .collect();
        let debris = Arc::new(Volume::new(table.clone(), VolumeConfig::default()));
        debris.build_from_runs(&shapes);
        let debris_id = registry.insert(debris.clone());

        if volume.state_at(Coord::new(7, 3, 0)).is_empty()
            && !debris.state_at(Coord::new(7, 3, 0)).is_empty()
        {
            tracing::info!("The overhang calved into its own body ({debris_id:?})");
        } else {
            tracing::warn!("Cell states after the calve look wrong -- something is off.");
        }

        // A ray over the void under the old overhang now lands on debris.
        let drop = registry.raycast_all(Vec3::new(7.5, 8.0, 0.5), Vec3::new(7.5, -2.0, 0.5));
        match drop {
            Some((id, hit)) => tracing::info!(
                "Ray over the drop zone: {:?} cell {:?} at distance {:.2}",
                id,
                hit.coord,
                hit.distance
            ),
            None => tracing::warn!("Ray over the drop zone missed -- something is off."),
        }
    }

    // A ray down the trench line reaches the bedrock floor.
    if let Some((id, hit)) =
        registry.raycast_all(Vec3::new(0.5, 8.0, 0.5), Vec3::new(0.5, -2.0, 0.5))
    {
        tracing::info!(
            "Ray down the trench: {:?} cell {:?}, normal {:?}",
            id,
            hit.coord,
            hit.normal
        );
    }

    // ── Walk from rim to rim over a frozen snapshot ──────────────────────
    let frozen = Snapshot::new(&volume, Coord::new(-8, -1, -8), Coord::new(9, 6, 7));
    match search::greedy_path(&frozen, Coord::new(-5, 4, -3), Coord::new(-5, 4, 3)) {
        Some(path) => tracing::info!("Rim-to-rim path found: {} steps", path.len()),
        None => tracing::warn!("No rim-to-rim path -- something is off."),
    }

    // ── Round-trip the volume through the codec ──────────────────────────
    let text = codec::encode_base64(&volume);
    let restored = Volume::new(table.clone(), VolumeConfig::default());
    let runs = codec::decode_base64(&restored, &text).context("decoding the saved scene")?;
    let mut mismatches = 0usize;
    for x in -8..10 {
        for y in -2..6 {
            for z in -8..8 {
                let c = Coord::new(x, y, z);
                if restored.state_at(c) != volume.state_at(c) {
                    mismatches += 1;
                }
            }
        }
    }
    if mismatches == 0 {
        tracing::info!("Save round-trip: {} runs, {} chars, cells identical", runs, text.len());
    } else {
        tracing::warn!("Save round-trip changed {} cells -- something is off.", mismatches);
    }

    if let Some(path) = save_path {
        fs::write(&path, &text).with_context(|| format!("writing save file {}", path.display()))?;
        tracing::info!("Saved scene to {}", path.display());
    }

    Ok(())
}

fn load_scene(path: &Path) -> Result<SceneConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading scene file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing scene file {}", path.display()))
}

/// Register the scene's states and apply its fills, leaving the volume
/// compacted and ready.
fn build_volume(scene: &SceneConfig) -> Result<(Arc<StateTable>, Volume)> {
    let mut table = StateTable::new();
    for spec in &scene.states {
        table.register(
            CellState::new(spec.name.as_str())
                .permanent(spec.permanent)
                .supported(spec.supported)
                .hard(spec.hard)
                .density(spec.density),
        );
    }
    let table = table.into_shared();

    let volume = Volume::new(table.clone(), VolumeConfig::default());
    for fill in &scene.fills {
        let state = table
            .id_of(&fill.state)
            .with_context(|| format!("scene fill references unknown state {:?}", fill.state))?;
        let from = Coord::new(fill.from[0], fill.from[1], fill.from[2]);
        let to = Coord::new(fill.to[0], fill.to[1], fill.to[2]);
        volume.fill_extent(from, to, state);
    }
    volume.regenerate_now();
    Ok((table, volume))
}
