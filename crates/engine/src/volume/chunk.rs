use crate::space::Coord;

use super::run::{RunId, RunShape};

/// A fixed-size cube of cells inside a volume.
///
/// Holds the dense cell lookup (one `Option<RunId>` per cell, x-major) for
/// O(1) point queries, plus the sparse list of runs registered here. Side
/// length is `2 * chunk_half_side` from the volume config. Created lazily
/// the first time a fill touches one of its cells.
pub struct Chunk {
    /// World coordinate of the minimum-corner cell.
    pub origin: Coord,
    side: i32,
    cells: Vec<Option<RunId>>,
    /// Runs currently listed in this chunk, insertion order.
    pub runs: Vec<RunId>,
}

impl Chunk {
    pub fn new(origin: Coord, side: i32) -> Self {
        let volume = (side as usize).pow(3);
        Self {
            origin,
            side,
            cells: vec![None; volume],
            runs: Vec::new(),
        }
    }

    pub fn side(&self) -> i32 {
        self.side
    }

    #[inline]
    fn index(&self, local: Coord) -> usize {
        ((local.x * self.side + local.y) * self.side + local.z) as usize
    }

    /// Chunk-relative coordinate of a world cell.
    #[inline]
    pub fn local(&self, world: Coord) -> Coord {
        Coord::new(
            world.x - self.origin.x,
            world.y - self.origin.y,
            world.z - self.origin.z,
        )
    }

    #[inline]
    pub fn in_bounds_local(&self, local: Coord) -> bool {
        local.x >= 0
            && local.x < self.side
            && local.y >= 0
            && local.y < self.side
            && local.z >= 0
            && local.z < self.side
    }

    pub fn contains(&self, world: Coord) -> bool {
        self.in_bounds_local(self.local(world))
    }

    /// Dense lookup by chunk-relative coordinate. `None` out of bounds.
    #[inline]
    pub fn cell(&self, local: Coord) -> Option<RunId> {
        if !self.in_bounds_local(local) {
            return None;
        }
        self.cells[self.index(local)]
    }

    #[inline]
    pub fn set_cell(&mut self, local: Coord, run: Option<RunId>) {
        let idx = self.index(local);
        self.cells[idx] = run;
    }

    /// Dense lookup by world coordinate. `None` outside this chunk.
    #[inline]
    pub fn cell_world(&self, world: Coord) -> Option<RunId> {
        self.cell(self.local(world))
    }

    /// Point every cell of `shape` at `run` (or clear with `None`).
    ///
    /// The shape must lie entirely inside this chunk; runs are chunk-local
    /// by construction and decode clamps before stamping.
    pub fn stamp(&mut self, shape: &RunShape, run: Option<RunId>) {
        let lo = self.local(shape.origin);
        for x in lo.x..lo.x + shape.width {
            for y in lo.y..lo.y + shape.height {
                for z in lo.z..lo.z + shape.depth {
                    self.set_cell(Coord::new(x, y, z), run);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateId;
    use slotmap::SlotMap;

    #[test]
    fn world_and_local_lookup_agree() {
        let mut arena: SlotMap<RunId, ()> = SlotMap::with_key();
        let id = arena.insert(());
        let mut chunk = Chunk::new(Coord::new(-16, 0, 16), 16);
        chunk.set_cell(Coord::new(3, 4, 5), Some(id));
        assert_eq!(chunk.cell(Coord::new(3, 4, 5)), Some(id));
        assert_eq!(chunk.cell_world(Coord::new(-13, 4, 21)), Some(id));
        assert_eq!(chunk.cell_world(Coord::new(0, 0, 0)), None);
        assert_eq!(chunk.cell(Coord::new(16, 0, 0)), None);
    }

    #[test]
    fn stamp_covers_exactly_the_shape() {
        let mut arena: SlotMap<RunId, ()> = SlotMap::with_key();
        let id = arena.insert(());
        let mut chunk = Chunk::new(Coord::new(0, 0, 0), 8);
        let shape = RunShape::new(Coord::new(1, 2, 3), 2, 2, 1, StateId(1));
        chunk.stamp(&shape, Some(id));
        assert_eq!(chunk.cell(Coord::new(1, 2, 3)), Some(id));
        assert_eq!(chunk.cell(Coord::new(2, 3, 3)), Some(id));
        assert_eq!(chunk.cell(Coord::new(3, 2, 3)), None);
        assert_eq!(chunk.cell(Coord::new(1, 2, 4)), None);
        chunk.stamp(&shape, None);
        assert_eq!(chunk.cell(Coord::new(1, 2, 3)), None);
    }
}
