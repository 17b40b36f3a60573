//! Run merging.
//!
//! After a batch of mutations the rebuild pass tries to collapse each
//! refreshed run with the runs stacked after it, one axis at a time.
//! A merge requires the same state, identical cross-section, and a shared
//! chunk; the absorbed run's cells are repointed at the survivor and its
//! adjacency is spliced across.

use crate::space::{Axis, Coord, Direction};

use super::VolumeData;
use super::run::{RunId, RunShape};

/// Axis order for one merge sweep. Depth first, then width, then height,
/// so columns collapse before they widen into slabs.
const MERGE_ORDER: [Axis; 3] = [Axis::Z, Axis::X, Axis::Y];

fn component(c: Coord, axis: Axis) -> i32 {
    match axis {
        Axis::X => c.x,
        Axis::Y => c.y,
        Axis::Z => c.z,
    }
}

fn extent(shape: &RunShape, axis: Axis) -> i32 {
    match axis {
        Axis::X => shape.width,
        Axis::Y => shape.height,
        Axis::Z => shape.depth,
    }
}

fn poles(axis: Axis) -> (Direction, Direction) {
    match axis {
        Axis::X => (Direction::NegX, Direction::PosX),
        Axis::Y => (Direction::NegY, Direction::PosY),
        Axis::Z => (Direction::NegZ, Direction::PosZ),
    }
}

/// Same state and an identical cross-section perpendicular to `axis`.
fn mergeable(base: &RunShape, cand: &RunShape, axis: Axis) -> bool {
    if base.state != cand.state {
        return false;
    }
    match axis {
        Axis::X => {
            base.origin.y == cand.origin.y
                && base.origin.z == cand.origin.z
                && base.height == cand.height
                && base.depth == cand.depth
        }
        Axis::Y => {
            base.origin.x == cand.origin.x
                && base.origin.z == cand.origin.z
                && base.width == cand.width
                && base.depth == cand.depth
        }
        Axis::Z => {
            base.origin.x == cand.origin.x
                && base.origin.y == cand.origin.y
                && base.width == cand.width
                && base.height == cand.height
        }
    }
}

/// One merge sweep over the refresh set. `modified[i]` is raised when
/// `order[i]` absorbed anything, which forces its chunk entry to be
/// re-marked at the apply step.
pub(super) fn pass(data: &mut VolumeData, order: &[RunId], modified: &mut [bool]) {
    for axis in MERGE_ORDER {
        for (i, &id) in order.iter().enumerate() {
            if merge_along(data, id, axis) {
                modified[i] = true;
            }
        }
    }
}

/// Chain-absorb runs stacked after `base` along `axis` until the next
/// cell holds no matching run or the chunk edge is reached.
fn merge_along(data: &mut VolumeData, base_id: RunId, axis: Axis) -> bool {
    let mut merged = false;
    loop {
        let Some(base) = data.runs.get(base_id) else {
            return merged;
        };
        if !base.active {
            return merged;
        }
        let shape = base.shape;
        let Some(chunk_origin) = data.chunk_origin(shape.origin) else {
            return merged;
        };
        let probe = component(shape.end(), axis);
        if probe - component(chunk_origin, axis) >= data.side {
            // Runs never straddle a chunk edge.
            return merged;
        }

        let mut probe_cell = shape.origin;
        match axis {
            Axis::X => probe_cell.x = probe,
            Axis::Y => probe_cell.y = probe,
            Axis::Z => probe_cell.z = probe,
        }
        let Some(cand_id) = data.run_id_at(probe_cell) else {
            return merged;
        };
        if cand_id == base_id {
            return merged;
        }
        let Some(cand) = data.runs.get(cand_id) else {
            return merged;
        };
        if !cand.active
            || component(cand.shape.origin, axis) != probe
            || !mergeable(&shape, &cand.shape, axis)
        {
            return merged;
        }

        absorb(data, base_id, cand_id, axis);
        merged = true;
    }
}

/// Fold `cand` into `base`: splice adjacency, extend the base extent,
/// inherit the far face bit, repoint the dense cells.
fn absorb(data: &mut VolumeData, base_id: RunId, cand_id: RunId, axis: Axis) {
    let Some(cand) = data.runs.get(cand_id) else {
        return;
    };
    let cand_shape = cand.shape;
    let cand_faces = cand.faces;
    let cand_neighbors = cand.neighbors.clone();

    // The absorbed run disappears from every neighbor list, but keeps its
    // own list so the refresh set still reaches the runs it touched.
    for &n in &cand_neighbors {
        if let Some(other) = data.runs.get_mut(n) {
            other.neighbors.retain(|&r| r != cand_id);
        }
    }
    if let Some(base) = data.runs.get_mut(base_id) {
        base.neighbors.retain(|&r| r != cand_id);
    }
    for &n in &cand_neighbors {
        if n == base_id || !data.runs.get(n).is_some_and(|r| r.active) {
            continue;
        }
        let linked = data
            .runs
            .get(base_id)
            .is_some_and(|r| r.neighbors.contains(&n));
        if !linked {
            if let Some(base) = data.runs.get_mut(base_id) {
                base.neighbors.push(n);
            }
            if let Some(other) = data.runs.get_mut(n) {
                other.neighbors.push(base_id);
            }
        }
    }

    if let Some(cand) = data.runs.get_mut(cand_id) {
        cand.active = false;
    }
    data.removals.push(cand_id);

    let grow = extent(&cand_shape, axis);
    if let Some(base) = data.runs.get_mut(base_id) {
        match axis {
            Axis::X => base.shape.width += grow,
            Axis::Y => base.shape.height += grow,
            Axis::Z => base.shape.depth += grow,
        }
        let (near, far) = poles(axis);
        base.faces.set(far, cand_faces.get(far));
        for dir in Direction::ALL {
            if dir == near || dir == far {
                continue;
            }
            let visible = base.faces.get(dir) || cand_faces.get(dir);
            base.faces.set(dir, visible);
        }
    }

    if let Some(chunk) = data.chunk_containing_mut(cand_shape.origin) {
        chunk.stamp(&cand_shape, Some(base_id));
    }
    data.mark_dirty(&cand_shape);
}

#[cfg(test)]
mod tests {
    use crate::space::Coord;
    use crate::state::{CellState, StateId, StateTable};
    use crate::volume::{Volume, VolumeConfig};

    fn volume() -> (Volume, StateId, StateId) {
        let mut table = StateTable::new();
        let rock = table.register(CellState::new("rock"));
        let dirt = table.register(CellState::new("dirt"));
        (
            Volume::new(table.into_shared(), VolumeConfig::default()),
            rock,
            dirt,
        )
    }

    #[test]
    fn two_stacked_cells_merge_into_one_run() {
        let (volume, rock, _) = volume();
        volume.fill(Coord::new(5, 5, 5), rock);
        volume.fill(Coord::new(5, 5, 6), rock);
        volume.regenerate_now();

        assert_eq!(volume.active_run_count(), 1);
        let run = volume.run_at(Coord::new(5, 5, 5)).unwrap();
        assert_eq!(run.origin, Coord::new(5, 5, 5));
        assert_eq!((run.width, run.height, run.depth), (1, 1, 2));
        assert_eq!(volume.run_at(Coord::new(5, 5, 6)), Some(run));
    }

    #[test]
    fn a_cube_of_cells_collapses_to_a_single_run() {
        let (volume, rock, _) = volume();
        volume.fill_extent(Coord::new(0, 0, 0), Coord::new(3, 3, 3), rock);
        volume.regenerate_now();

        assert_eq!(volume.active_run_count(), 1);
        let run = volume.run_at(Coord::new(1, 1, 1)).unwrap();
        assert_eq!((run.width, run.height, run.depth), (3, 3, 3));
        assert_eq!(run.cell_count(), 27);
    }

    #[test]
    fn merging_stops_at_state_changes() {
        let (volume, rock, dirt) = volume();
        volume.fill(Coord::new(0, 0, 0), rock);
        volume.fill(Coord::new(0, 0, 1), dirt);
        volume.fill(Coord::new(0, 0, 2), rock);
        volume.regenerate_now();

        assert_eq!(volume.active_run_count(), 3);
        assert_eq!(volume.run_at(Coord::new(0, 0, 0)).unwrap().state, rock);
        assert_eq!(volume.run_at(Coord::new(0, 0, 1)).unwrap().state, dirt);
    }

    #[test]
    fn merging_never_crosses_chunk_boundaries() {
        let (volume, rock, _) = volume();
        // Chunk side is 16 and cell 8 starts the next chunk along x.
        volume.fill(Coord::new(7, 0, 0), rock);
        volume.fill(Coord::new(8, 0, 0), rock);
        volume.regenerate_now();

        assert_eq!(volume.active_run_count(), 2);
        let left = volume.run_at(Coord::new(7, 0, 0)).unwrap();
        let right = volume.run_at(Coord::new(8, 0, 0)).unwrap();
        assert_ne!(left, right);
        assert_eq!(left.width, 1);
        assert_eq!(right.width, 1);
    }

    #[test]
    fn second_sweep_finds_merges_exposed_by_the_first() {
        let (volume, rock, _) = volume();
        volume.fill_extent(Coord::new(0, 0, 0), Coord::new(2, 1, 1), rock);
        volume.regenerate_now();
        assert_eq!(volume.active_run_count(), 1);

        // Two fresh cells that only match the old run once they have
        // merged with each other along x.
        volume.fill(Coord::new(0, 0, 1), rock);
        volume.fill(Coord::new(1, 0, 1), rock);
        volume.regenerate_now();

        assert_eq!(volume.active_run_count(), 1);
        let run = volume.run_at(Coord::new(0, 0, 0)).unwrap();
        assert_eq!((run.width, run.height, run.depth), (2, 1, 2));
    }

    #[test]
    fn absorbed_runs_hand_their_neighbors_to_the_survivor() {
        let (volume, rock, dirt) = volume();
        volume.fill(Coord::new(0, 0, 0), rock);
        volume.fill(Coord::new(0, 0, 1), rock);
        // Dirt touching only the cell that will be absorbed.
        volume.fill(Coord::new(0, 1, 1), dirt);
        volume.regenerate_now();

        assert_eq!(volume.active_run_count(), 2);
        let data = volume.read_data();
        let merged = data.run_id_at(Coord::new(0, 0, 0)).unwrap();
        let outsider = data.run_id_at(Coord::new(0, 1, 1)).unwrap();
        assert!(data.runs[merged].neighbors.contains(&outsider));
        assert!(data.runs[outsider].neighbors.contains(&merged));
        assert_eq!(data.runs[outsider].neighbors.len(), 1);
    }
}
