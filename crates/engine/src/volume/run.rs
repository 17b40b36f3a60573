use slotmap::new_key_type;

use crate::space::{Coord, FaceMask};
use crate::state::StateId;

new_key_type! {
    /// Stable handle to a run in a volume's arena.
    pub struct RunId;
}

/// Geometry and material of a run, free of arena bookkeeping.
///
/// Extents are strictly positive; `origin` is the minimum corner and the
/// covered cells are the half-open box `[origin, origin + extents)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunShape {
    pub origin: Coord,
    pub width: i32,
    pub height: i32,
    pub depth: i32,
    pub state: StateId,
}

impl RunShape {
    pub const fn new(origin: Coord, width: i32, height: i32, depth: i32, state: StateId) -> Self {
        Self {
            origin,
            width,
            height,
            depth,
            state,
        }
    }

    pub const fn unit(origin: Coord, state: StateId) -> Self {
        Self::new(origin, 1, 1, 1, state)
    }

    /// Exclusive maximum corner.
    pub const fn end(&self) -> Coord {
        Coord::new(
            self.origin.x + self.width,
            self.origin.y + self.height,
            self.origin.z + self.depth,
        )
    }

    pub fn contains(&self, c: Coord) -> bool {
        let end = self.end();
        c.x >= self.origin.x
            && c.x < end.x
            && c.y >= self.origin.y
            && c.y < end.y
            && c.z >= self.origin.z
            && c.z < end.z
    }

    /// Number of cells covered.
    pub fn cell_count(&self) -> i64 {
        self.width as i64 * self.height as i64 * self.depth as i64
    }

    /// Every cell covered by this run, x-major.
    pub fn cells(&self) -> impl Iterator<Item = Coord> {
        let o = self.origin;
        let e = self.end();
        (o.x..e.x).flat_map(move |x| {
            (o.y..e.y).flat_map(move |y| (o.z..e.z).map(move |z| Coord::new(x, y, z)))
        })
    }
}

/// A run in a volume: an axis-aligned box of identically-typed cells.
///
/// Runs are chunk-local (never straddle a chunk boundary), so the owning
/// chunk is always recoverable from `shape.origin`. Cross-references go
/// through `RunId` keys only.
#[derive(Debug, Clone)]
pub struct Run {
    pub shape: RunShape,
    /// Cleared when the run is emptied or absorbed by a merge.
    pub active: bool,
    /// Whether the run currently appears in its chunk's sparse list.
    pub listed: bool,
    pub faces: FaceMask,
    /// Runs sharing a face with this one. Kept symmetric.
    pub neighbors: Vec<RunId>,
}

impl Run {
    pub fn new(shape: RunShape) -> Self {
        Self {
            shape,
            active: true,
            listed: false,
            faces: FaceMask::NONE,
            neighbors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_containment_is_half_open() {
        let shape = RunShape::new(Coord::new(2, 3, 4), 2, 1, 3, StateId(1));
        assert!(shape.contains(Coord::new(2, 3, 4)));
        assert!(shape.contains(Coord::new(3, 3, 6)));
        assert!(!shape.contains(Coord::new(4, 3, 4)));
        assert!(!shape.contains(Coord::new(2, 4, 4)));
        assert_eq!(shape.end(), Coord::new(4, 4, 7));
        assert_eq!(shape.cell_count(), 6);
    }
}
