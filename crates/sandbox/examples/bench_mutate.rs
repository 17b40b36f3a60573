//! Benchmark: bulk mutation, rebuild compaction, and the save round-trip.
//!
//! Fills a layered terrain slab cell by cell, compacts it, carves tunnels
//! through it, then pushes the result through the save codec, timing each
//! phase. Run with: `cargo run --release -p boxrun-sandbox --example bench_mutate`

use std::sync::Arc;
use std::time::Instant;

use boxrun_engine::space::Coord;
use boxrun_engine::state::{CellState, StateId, StateTable};
use boxrun_engine::volume::mutate::EmptyPolicy;
use boxrun_engine::volume::{Volume, VolumeConfig, codec};

const ROCK: StateId = StateId(1);
const DIRT: StateId = StateId(2);

fn main() {
    let width = 64;
    let depth = 64;
    let rock_height = 4;
    let total_cells = width * depth * (rock_height + 1);

    println!("=== Box-run volume: mutation benchmark ===\n");
    println!(
        "  {}x{} slab, {} rock layers + 1 dirt layer, {} cells\n",
        width, depth, rock_height, total_cells
    );

    let table = material_table();
    let volume = Volume::new(table.clone(), VolumeConfig::default());

    // --- Bulk fill ---
    let t0 = Instant::now();
    let mut filled = volume.fill_extent(
        Coord::new(0, 0, 0),
        Coord::new(width, rock_height, depth),
        ROCK,
    );
    filled += volume.fill_extent(
        Coord::new(0, rock_height, 0),
        Coord::new(width, rock_height + 1, depth),
        DIRT,
    );
    let dt = t0.elapsed();
    println!(
        "  Fill:    {:>8} cells in {:>8.2?} ({} runs)",
        filled,
        dt,
        volume.active_run_count()
    );

    // --- Rebuild ---
    let before = volume.active_run_count();
    let t0 = Instant::now();
    volume.regenerate_now();
    let dt = t0.elapsed();
    println!(
        "  Rebuild: {:>8} runs -> {:>5} in {:>8.2?}",
        before,
        volume.active_run_count(),
        dt
    );

    // --- Carve ---
    let tunnels = tunnel_cells(width, depth, rock_height);
    let t0 = Instant::now();
    let emptied = volume.empty_many(&tunnels, EmptyPolicy::default());
    let dt = t0.elapsed();
    println!(
        "  Carve:   {:>8} cells in {:>8.2?} ({} runs)",
        emptied,
        dt,
        volume.active_run_count()
    );

    let before = volume.active_run_count();
    let t0 = Instant::now();
    volume.regenerate_now();
    let dt = t0.elapsed();
    println!(
        "  Rebuild: {:>8} runs -> {:>5} in {:>8.2?}",
        before,
        volume.active_run_count(),
        dt
    );

    // --- Save / load ---
    let t0 = Instant::now();
    let blob = codec::encode(&volume);
    let dt = t0.elapsed();
    println!("  Save:    {:>8} bytes in {:>8.2?}", blob.len(), dt);

    let restored = Volume::new(table, VolumeConfig::default());
    let t0 = Instant::now();
    let loaded = match codec::decode(&restored, &blob) {
        Ok(count) => count,
        Err(err) => {
            println!("  Load:    FAILED ({err})");
            return;
        }
    };
    let dt = t0.elapsed();
    println!("  Load:    {:>8} runs in {:>8.2?}", loaded, dt);

    // --- Verify identical ---
    let mut mismatches = 0;
    for x in -1..=width {
        for y in -1..=rock_height + 1 {
            for z in -1..=depth {
                let c = Coord::new(x, y, z);
                if volume.state_at(c) != restored.state_at(c) {
                    mismatches += 1;
                }
            }
        }
    }

    if mismatches == 0 {
        println!("\n  Verification: PASS (volumes identical)");
    } else {
        println!("\n  Verification: FAIL ({} mismatches!)", mismatches);
    }
}

fn material_table() -> Arc<StateTable> {
    let mut table = StateTable::new();
    table.register(CellState::new("rock").hard(true).density(2.6));
    table.register(CellState::new("dirt").density(1.3));
    table.into_shared()
}

/// Three straight tunnels along x through the rock, plus one shaft punched
/// down through every layer away from the tunnel lines.
fn tunnel_cells(width: i32, depth: i32, rock_height: i32) -> Vec<Coord> {
    let mut cells = Vec::new();
    for z in [depth / 4, depth / 2, 3 * depth / 4] {
        for x in 0..width {
            for y in 1..rock_height.min(3) {
                cells.push(Coord::new(x, y, z));
            }
        }
    }
    for y in 0..=rock_height {
        cells.push(Coord::new(width / 4, y, depth / 8));
    }
    cells
}
