//! Frozen cell copies.

use std::collections::HashMap;
use std::sync::Arc;

use crate::space::Coord;
use crate::state::{StateId, StateTable};

use super::{CellRead, Volume};

/// An immutable copy of every cell in a volume at capture time.
///
/// Capture resolves runs into dense per-chunk state grids, so later reads
/// never touch the live volume. Search and pathfinding take one of these
/// when they must not see concurrent edits.
pub struct Snapshot {
    states: Arc<StateTable>,
    min: Coord,
    side: i32,
    /// Dense x-major state grid per populated chunk, keyed by origin.
    chunks: HashMap<Coord, Vec<StateId>>,
}

impl Snapshot {
    /// Copy every populated chunk overlapping the half-open box
    /// `[start, end)` under one read lock. Reads outside the captured
    /// chunks return the empty sentinel.
    pub fn new(volume: &Volume, start: Coord, end: Coord) -> Self {
        Self::capture_where(volume, |origin, side| {
            origin.x < end.x
                && origin.x + side > start.x
                && origin.y < end.y
                && origin.y + side > start.y
                && origin.z < end.z
                && origin.z + side > start.z
        })
    }

    /// Copy every populated chunk of `volume` under one read lock.
    pub fn capture(volume: &Volume) -> Self {
        Self::capture_where(volume, |_, _| true)
    }

    fn capture_where(volume: &Volume, keep: impl Fn(Coord, i32) -> bool) -> Self {
        let data = volume.read_data();
        let side = data.side;
        let mut chunks = HashMap::new();
        for chunk in data.chunks.iter().flatten() {
            if !keep(chunk.origin, side) {
                continue;
            }
            let mut cells = vec![StateId::EMPTY; (side as usize).pow(3)];
            for x in 0..side {
                for y in 0..side {
                    for z in 0..side {
                        let local = Coord::new(x, y, z);
                        let Some(id) = chunk.cell(local) else { continue };
                        if let Some(run) = data.runs.get(id) {
                            cells[((x * side + y) * side + z) as usize] = run.shape.state;
                        }
                    }
                }
            }
            chunks.insert(chunk.origin, cells);
        }
        Self {
            states: volume.state_table().clone(),
            min: data.min,
            side,
            chunks,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn origin_of(&self, c: Coord) -> Coord {
        Coord::new(
            self.min.x + (c.x - self.min.x).div_euclid(self.side) * self.side,
            self.min.y + (c.y - self.min.y).div_euclid(self.side) * self.side,
            self.min.z + (c.z - self.min.z).div_euclid(self.side) * self.side,
        )
    }

    /// State captured at `c`; the empty sentinel anywhere uncaptured.
    pub fn state_at(&self, c: Coord) -> StateId {
        let origin = self.origin_of(c);
        let Some(cells) = self.chunks.get(&origin) else {
            return StateId::EMPTY;
        };
        let local = Coord::new(c.x - origin.x, c.y - origin.y, c.z - origin.z);
        cells[((local.x * self.side + local.y) * self.side + local.z) as usize]
    }
}

impl CellRead for Snapshot {
    fn state_at(&self, c: Coord) -> StateId {
        Snapshot::state_at(self, c)
    }

    fn states(&self) -> &StateTable {
        &self.states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CellState;
    use crate::volume::VolumeConfig;

    #[test]
    fn snapshots_survive_later_edits() {
        let mut table = StateTable::new();
        let rock = table.register(CellState::new("rock"));
        let volume = Volume::new(table.into_shared(), VolumeConfig::default());
        volume.fill(Coord::new(1, 2, 3), rock);

        let snapshot = Snapshot::capture(&volume);
        volume.empty(Coord::new(1, 2, 3));

        assert_eq!(volume.state_at(Coord::new(1, 2, 3)), StateId::EMPTY);
        assert_eq!(snapshot.state_at(Coord::new(1, 2, 3)), rock);
        assert_eq!(snapshot.state_at(Coord::new(0, 0, 0)), StateId::EMPTY);
        assert_eq!(snapshot.state_at(Coord::new(-3000, 7, 9)), StateId::EMPTY);
        assert_eq!(snapshot.chunk_count(), 1);
    }

    #[test]
    fn ranged_snapshots_skip_chunks_outside_the_box() {
        let mut table = StateTable::new();
        let rock = table.register(CellState::new("rock"));
        let volume = Volume::new(table.into_shared(), VolumeConfig::default());
        volume.fill(Coord::new(2, 2, 2), rock);
        volume.fill(Coord::new(40, 2, 2), rock);

        let snapshot = Snapshot::new(&volume, Coord::new(0, 0, 0), Coord::new(8, 8, 8));
        assert_eq!(snapshot.chunk_count(), 1);
        assert_eq!(snapshot.state_at(Coord::new(2, 2, 2)), rock);
        assert_eq!(snapshot.state_at(Coord::new(40, 2, 2)), StateId::EMPTY);
    }
}
