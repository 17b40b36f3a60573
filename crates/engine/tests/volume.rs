//! Cross-module volume scenarios: mutation batches flowing through rebuild
//! passes, island handoff, persistence, searches over snapshots, and the
//! shared background worker, driven the way a host game would drive them.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use boxrun_engine::events::VolumeEvent;
use boxrun_engine::registry::VolumeRegistry;
use boxrun_engine::space::{Coord, Direction};
use boxrun_engine::state::{CellState, StateId, StateTable};
use boxrun_engine::volume::mutate::EmptyPolicy;
use boxrun_engine::volume::run::RunShape;
use boxrun_engine::volume::snapshot::Snapshot;
use boxrun_engine::volume::{Volume, VolumeConfig, codec, search};
use glam::Vec3;

const ROCK: StateId = StateId(1);
const DIRT: StateId = StateId(2);
const BEDROCK: StateId = StateId(3);

fn material_table() -> Arc<StateTable> {
    let mut table = StateTable::new();
    table.register(CellState::new("rock"));
    table.register(CellState::new("dirt"));
    table.register(CellState::new("bedrock").permanent(true).supported(true));
    table.into_shared()
}

fn new_volume() -> Volume {
    Volume::new(material_table(), VolumeConfig::default())
}

fn shapes_overlap(a: &RunShape, b: &RunShape) -> bool {
    let (ae, be) = (a.end(), b.end());
    a.origin.x < be.x
        && b.origin.x < ae.x
        && a.origin.y < be.y
        && b.origin.y < ae.y
        && a.origin.z < be.z
        && b.origin.z < ae.z
}

// ---------------------------------------------------------------------------
// Mutation batches and rebuild passes
// ---------------------------------------------------------------------------

#[test]
fn a_rebuild_compacts_without_changing_cells() {
    let volume = new_volume();
    assert_eq!(
        volume.fill_extent(Coord::new(0, 0, 0), Coord::new(4, 1, 4), ROCK),
        16
    );
    volume.regenerate_now();

    assert_eq!(volume.active_run_count(), 1);
    for x in 0..4 {
        for z in 0..4 {
            assert_eq!(volume.state_at(Coord::new(x, 0, z)), ROCK);
        }
    }
    assert_eq!(volume.state_at(Coord::new(4, 0, 0)), StateId::EMPTY);
    assert_eq!(volume.state_at(Coord::new(0, 1, 0)), StateId::EMPTY);
}

#[test]
fn rebuilt_runs_stay_disjoint() {
    let volume = new_volume();
    // A floor with a three-cell tower on one corner.
    volume.fill_extent(Coord::new(0, 0, 0), Coord::new(4, 1, 4), ROCK);
    volume.fill_extent(Coord::new(0, 1, 0), Coord::new(1, 4, 1), ROCK);
    volume.regenerate_now();

    let shapes = volume.contiguous_by_state(Coord::new(0, 0, 0));
    assert_eq!(shapes.len(), volume.active_run_count());
    assert_eq!(shapes.iter().map(|s| s.cell_count()).sum::<i64>(), 19);
    for (i, a) in shapes.iter().enumerate() {
        for b in shapes.iter().skip(i + 1) {
            assert!(!shapes_overlap(a, b), "{a:?} overlaps {b:?}");
        }
    }
}

// ---------------------------------------------------------------------------
// Islands and the spawn handoff
// ---------------------------------------------------------------------------

#[test]
fn detached_spans_hand_off_to_a_new_volume() {
    let volume = new_volume();
    volume.fill(Coord::new(0, 0, 0), BEDROCK);
    volume.fill_extent(Coord::new(1, 0, 0), Coord::new(4, 1, 1), ROCK);
    volume.regenerate_now();

    let rx = volume.subscribe();
    assert!(volume.empty(Coord::new(1, 0, 0)));
    volume.regenerate_now();

    let islands: Vec<_> = rx
        .try_iter()
        .filter_map(|event| match event {
            VolumeEvent::Islands(list) => Some(list.to_vec()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(islands.len(), 1);
    assert_eq!(islands[0].cell_count(), 2);
    assert!(!islands[0].is_loose());

    // The source volume dropped the island cells but kept its anchor.
    assert_eq!(volume.state_at(Coord::new(2, 0, 0)), StateId::EMPTY);
    assert_eq!(volume.state_at(Coord::new(3, 0, 0)), StateId::EMPTY);
    assert_eq!(volume.state_at(Coord::new(0, 0, 0)), BEDROCK);
    assert_eq!(volume.active_run_count(), 1);

    // The spawn collaborator turns the island into an independent body.
    let debris = new_volume();
    assert_eq!(debris.build_from_runs(&islands[0].shapes), 1);
    assert_eq!(debris.state_at(Coord::new(2, 0, 0)), ROCK);
    assert_eq!(debris.state_at(Coord::new(3, 0, 0)), ROCK);
    assert_eq!(debris.active_run_count(), 1);
}

#[test]
fn island_removal_that_empties_the_volume_says_so() {
    let volume = new_volume();
    volume.fill(Coord::new(0, 0, 0), BEDROCK);
    volume.fill(Coord::new(1, 0, 0), ROCK);
    volume.regenerate_now();

    let rx = volume.subscribe();
    assert!(volume.empty_with(
        Coord::new(0, 0, 0),
        EmptyPolicy {
            force: true,
            force_hard: true,
        }
    ));
    volume.regenerate_now();

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), 4);
    match &events[0] {
        VolumeEvent::CellsEmptied(cells) => {
            assert_eq!(&**cells, &[(Coord::new(0, 0, 0), BEDROCK)])
        }
        other => panic!("expected the forced removal first, got {other:?}"),
    }
    match &events[1] {
        VolumeEvent::CellsEmptied(cells) => {
            assert_eq!(&**cells, &[(Coord::new(1, 0, 0), ROCK)])
        }
        other => panic!("expected the island cells second, got {other:?}"),
    }
    match &events[2] {
        VolumeEvent::Islands(list) => {
            assert_eq!(list.len(), 1);
            assert!(list[0].is_loose());
        }
        other => panic!("expected the island batch third, got {other:?}"),
    }
    assert!(matches!(events[3], VolumeEvent::CompletelyEmptied));
    assert_eq!(volume.active_run_count(), 0);
}

// ---------------------------------------------------------------------------
// Raycasts, snapshots and searches
// ---------------------------------------------------------------------------

#[test]
fn rays_hit_what_paths_walk_on() {
    let volume = new_volume();
    volume.fill_extent(Coord::new(0, 0, 0), Coord::new(8, 1, 8), ROCK);
    volume.regenerate_now();

    let hit = volume
        .raycast(Vec3::new(3.5, 6.0, 3.5), Vec3::new(3.5, -2.0, 3.5))
        .unwrap();
    assert_eq!(hit.coord, Coord::new(3, 0, 3));
    assert_eq!(hit.normal, Direction::PosY);
    assert!((hit.position - Vec3::new(3.5, 1.0, 3.5)).length() < 1e-4);
    assert!((hit.distance - 5.0).abs() < 1e-4);

    let path = search::greedy_path(&volume, Coord::new(0, 1, 0), Coord::new(7, 1, 7))
        .expect("a clear floor should be walkable");
    assert_eq!(path[0], Coord::new(0, 1, 0));
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let manhattan = (a.x - b.x).abs() + (a.y - b.y).abs() + (a.z - b.z).abs();
        assert_eq!(manhattan, 1, "path jumped from {a:?} to {b:?}");
    }
}

#[test]
fn snapshots_isolate_searches_from_live_edits() {
    let volume = new_volume();
    volume.fill_extent(Coord::new(0, 0, 0), Coord::new(8, 1, 8), ROCK);
    volume.regenerate_now();
    let snapshot = Snapshot::capture(&volume);

    let mut floor = Vec::new();
    for x in 0..8 {
        for z in 0..8 {
            floor.push(Coord::new(x, 0, z));
        }
    }
    assert_eq!(volume.empty_many(&floor, EmptyPolicy::default()), 64);

    assert_eq!(volume.state_at(Coord::new(3, 0, 3)), StateId::EMPTY);
    assert_eq!(snapshot.state_at(Coord::new(3, 0, 3)), ROCK);

    // The live volume has nothing left to stand on; the snapshot does.
    assert!(search::greedy_path(&volume, Coord::new(0, 1, 0), Coord::new(7, 1, 7)).is_none());
    assert!(search::greedy_path(&snapshot, Coord::new(0, 1, 0), Coord::new(7, 1, 7)).is_some());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn saved_volumes_reload_identically() {
    let volume = new_volume();
    volume.fill_extent(Coord::new(0, 0, 0), Coord::new(6, 1, 6), BEDROCK);
    volume.fill_extent(Coord::new(1, 1, 1), Coord::new(4, 3, 4), ROCK);
    volume.fill(Coord::new(1, 3, 1), DIRT);
    volume.fill(Coord::new(3, 3, 2), DIRT);
    volume.regenerate_now();

    let text = codec::encode_base64(&volume);
    let restored = new_volume();
    codec::decode_base64(&restored, &text).unwrap();

    for x in -1..7 {
        for y in -1..5 {
            for z in -1..7 {
                let c = Coord::new(x, y, z);
                assert_eq!(
                    restored.state_at(c),
                    volume.state_at(c),
                    "cell {c:?} changed across the save"
                );
            }
        }
    }

    let down = (Vec3::new(2.5, 8.0, 2.5), Vec3::new(2.5, -2.0, 2.5));
    let before = volume.raycast(down.0, down.1).unwrap();
    let after = restored.raycast(down.0, down.1).unwrap();
    assert_eq!(before.coord, after.coord);
    assert!((before.distance - after.distance).abs() < 1e-4);

    // Restored volumes stay fully editable.
    assert!(restored.empty(Coord::new(1, 3, 1)));
    restored.regenerate_now();
    assert_eq!(restored.state_at(Coord::new(1, 3, 1)), StateId::EMPTY);
}

// ---------------------------------------------------------------------------
// The shared background worker
// ---------------------------------------------------------------------------

#[test]
fn the_registry_rebuilds_in_the_background() {
    let registry = VolumeRegistry::new();
    let volume = Arc::new(new_volume());
    volume.fill(Coord::new(0, 0, 0), ROCK);
    volume.fill(Coord::new(0, 0, 1), ROCK);

    let id = registry.insert(volume.clone());
    assert!(registry.regenerate(id));

    for _ in 0..300 {
        if volume.active_run_count() == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(volume.active_run_count(), 1);
    let run = volume.run_at(Coord::new(0, 0, 0)).unwrap();
    assert_eq!(run.depth, 2);
}
