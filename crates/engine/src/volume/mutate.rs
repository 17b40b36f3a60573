//! Fill and empty mutations.
//!
//! Fills create unit runs; empties split the covering run into up to six
//! residual runs around the removed cell. Both record their cells for the
//! event bus and leave merge work to the next rebuild pass.

use crate::events::VolumeEvent;
use crate::space::Coord;
use crate::state::StateId;

use super::Volume;
use super::adjacency;
use super::run::{RunId, RunShape};

/// Overrides for the protection checks in empty operations.
///
/// With the defaults, permanent states refuse removal and hard states do
/// not; pass `force_hard: false` to let hard states refuse too.
#[derive(Debug, Clone, Copy)]
pub struct EmptyPolicy {
    /// Remove cells even when their state is permanent.
    pub force: bool,
    /// Remove cells even when their state is hard.
    pub force_hard: bool,
}

impl Default for EmptyPolicy {
    fn default() -> Self {
        Self {
            force: false,
            force_hard: true,
        }
    }
}

impl Volume {
    /// Fill a single cell with `state`.
    ///
    /// Returns false without touching anything when the state is empty or
    /// unregistered, the cell is already occupied, or the volume is
    /// immutable.
    pub fn fill(&self, coord: Coord, state: StateId) -> bool {
        if !self.is_mutable() || !self.states.contains(state) {
            return false;
        }
        {
            let mut data = self.write_data();
            if data.run_id_at(coord).is_some() {
                return false;
            }
            let id = data.add_run(RunShape::unit(coord, state));
            adjacency::attach_run(&mut data, id);
            self.flush_dirty(&mut data);
        }
        self.publish(VolumeEvent::CellsFilled(vec![(coord, state)].into()));
        true
    }

    /// Fill every empty cell in the half-open box `[start, end)`.
    /// Returns the number of cells filled.
    pub fn fill_extent(&self, start: Coord, end: Coord, state: StateId) -> usize {
        if !self.is_mutable() || !self.states.contains(state) {
            return 0;
        }
        let mut filled: Vec<(Coord, StateId)> = Vec::new();
        {
            let mut data = self.write_data();
            for x in start.x..end.x {
                for y in start.y..end.y {
                    for z in start.z..end.z {
                        let coord = Coord::new(x, y, z);
                        if data.run_id_at(coord).is_some() {
                            continue;
                        }
                        let id = data.add_run(RunShape::unit(coord, state));
                        adjacency::attach_run(&mut data, id);
                        filled.push((coord, state));
                    }
                }
            }
            self.flush_dirty(&mut data);
        }
        let count = filled.len();
        if count > 0 {
            self.publish(VolumeEvent::CellsFilled(filled.into()));
        }
        count
    }

    /// Empty a single cell under the default policy.
    pub fn empty(&self, coord: Coord) -> bool {
        self.empty_with(coord, EmptyPolicy::default())
    }

    pub fn empty_with(&self, coord: Coord, policy: EmptyPolicy) -> bool {
        self.empty_many(&[coord], policy) == 1
    }

    /// Empty a batch of cells.
    ///
    /// Coordinates are processed in order, so later ones see the splits
    /// made by earlier ones; adjacency for all residual runs is computed
    /// once at the end. Emptied cells are remembered for the island check
    /// in the next rebuild pass. Returns the number of cells emptied.
    pub fn empty_many(&self, coords: &[Coord], policy: EmptyPolicy) -> usize {
        if !self.is_mutable() {
            return 0;
        }
        let mut removed: Vec<(Coord, StateId)> = Vec::new();
        let mut completely_emptied = false;
        {
            let mut data = self.write_data();
            for &coord in coords {
                let Some(run_id) = data.run_id_at(coord) else {
                    continue;
                };
                let Some(run) = data.runs.get(run_id) else {
                    continue;
                };
                let shape = run.shape;
                let protected = match self.states.get(shape.state) {
                    Some(s) => (s.permanent && !policy.force) || (s.hard && !policy.force_hard),
                    None => false,
                };
                if protected {
                    continue;
                }
                removed.push((coord, shape.state));
                data.removal_coords.push(coord);
                data.remove_run(run_id);
                for residual in residual_shapes(&shape, coord) {
                    data.add_run(residual);
                }
            }
            if !removed.is_empty() {
                let batch: Vec<RunId> = data
                    .additions
                    .iter()
                    .copied()
                    .filter(|&id| data.runs.get(id).is_some_and(|r| r.active))
                    .collect();
                adjacency::attach_batch(&mut data, &batch);
                completely_emptied = !data.runs.values().any(|r| r.active);
            }
            self.flush_dirty(&mut data);
        }
        let count = removed.len();
        if count > 0 {
            self.publish(VolumeEvent::CellsEmptied(removed.into()));
            if completely_emptied {
                self.publish(VolumeEvent::CompletelyEmptied);
            }
        }
        count
    }
}

/// The up-to-six runs tiling `shape` minus the removed cell `c`: slabs
/// with the full cross-section left and right of it, one-cell-wide
/// columns below and above, and single-cell rods behind and in front.
fn residual_shapes(shape: &RunShape, c: Coord) -> Vec<RunShape> {
    let o = shape.origin;
    let e = shape.end();
    let s = shape.state;
    let mut out = Vec::with_capacity(6);
    push_if_solid(
        &mut out,
        RunShape::new(o, c.x - o.x, shape.height, shape.depth, s),
    );
    push_if_solid(
        &mut out,
        RunShape::new(
            Coord::new(c.x + 1, o.y, o.z),
            e.x - (c.x + 1),
            shape.height,
            shape.depth,
            s,
        ),
    );
    push_if_solid(
        &mut out,
        RunShape::new(Coord::new(c.x, o.y, o.z), 1, c.y - o.y, shape.depth, s),
    );
    push_if_solid(
        &mut out,
        RunShape::new(
            Coord::new(c.x, c.y + 1, o.z),
            1,
            e.y - (c.y + 1),
            shape.depth,
            s,
        ),
    );
    push_if_solid(
        &mut out,
        RunShape::new(Coord::new(c.x, c.y, o.z), 1, 1, c.z - o.z, s),
    );
    push_if_solid(
        &mut out,
        RunShape::new(Coord::new(c.x, c.y, c.z + 1), 1, 1, e.z - (c.z + 1), s),
    );
    out
}

fn push_if_solid(out: &mut Vec<RunShape>, shape: RunShape) {
    if shape.width > 0 && shape.height > 0 && shape.depth > 0 {
        out.push(shape);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CellState, StateTable};
    use crate::volume::VolumeConfig;

    fn volume() -> (Volume, StateId, StateId, StateId) {
        let mut table = StateTable::new();
        let rock = table.register(CellState::new("rock").supported(true));
        let bedrock = table.register(CellState::new("bedrock").permanent(true));
        let steel = table.register(CellState::new("steel").hard(true));
        (
            Volume::new(table.into_shared(), VolumeConfig::default()),
            rock,
            bedrock,
            steel,
        )
    }

    #[test]
    fn fill_reads_back_and_rejects_double_fill() {
        let (volume, rock, ..) = volume();
        let c = Coord::new(3, 4, 5);
        assert!(volume.fill(c, rock));
        assert_eq!(volume.state_at(c), rock);
        assert!(!volume.fill(c, rock));
        assert!(!volume.fill(c, StateId::EMPTY));
        assert!(!volume.fill(Coord::new(0, 0, 0), StateId(99)));
    }

    #[test]
    fn fill_then_empty_round_trips() {
        let (volume, rock, ..) = volume();
        let c = Coord::new(1, 1, 1);
        assert!(volume.fill(c, rock));
        assert!(volume.empty(c));
        assert_eq!(volume.state_at(c), StateId::EMPTY);
        assert!(!volume.empty(c));
    }

    #[test]
    fn emptying_the_center_of_a_block_keeps_every_other_cell() {
        let (volume, rock, ..) = volume();
        let start = Coord::new(4, 4, 4);
        let end = Coord::new(7, 7, 7);
        assert_eq!(volume.fill_extent(start, end, rock), 27);
        volume.regenerate_now();

        let center = Coord::new(5, 5, 5);
        assert!(volume.empty(center));
        assert_eq!(volume.state_at(center), StateId::EMPTY);
        for x in 4..7 {
            for y in 4..7 {
                for z in 4..7 {
                    let c = Coord::new(x, y, z);
                    if c != center {
                        assert_eq!(volume.state_at(c), rock, "cell {c:?} lost its state");
                    }
                }
            }
        }
    }

    #[test]
    fn residual_split_produces_six_disjoint_runs() {
        let shape = RunShape::new(Coord::new(0, 0, 0), 3, 3, 3, StateId(1));
        let removed = Coord::new(1, 1, 1);
        let residuals = residual_shapes(&shape, removed);
        assert_eq!(residuals.len(), 6);
        let total: i64 = residuals.iter().map(|r| r.cell_count()).sum();
        assert_eq!(total, 26);
        for r in &residuals {
            assert!(!r.contains(removed));
        }
        // corner removal drops the three shapes on the corner side
        let corner = residual_shapes(&shape, Coord::new(0, 0, 0));
        assert_eq!(corner.len(), 3);
        assert_eq!(corner.iter().map(|r| r.cell_count()).sum::<i64>(), 26);
    }

    #[test]
    fn permanent_and_hard_states_respect_policy() {
        let (volume, _, bedrock, steel) = volume();
        let b = Coord::new(0, 0, 0);
        let s = Coord::new(2, 0, 0);
        volume.fill(b, bedrock);
        volume.fill(s, steel);

        assert!(!volume.empty(b));
        assert!(volume.empty_with(
            b,
            EmptyPolicy {
                force: true,
                force_hard: true
            }
        ));

        // hard yields under the default policy, refuses when force_hard is off
        assert!(!volume.empty_with(
            s,
            EmptyPolicy {
                force: false,
                force_hard: false
            }
        ));
        assert!(volume.empty(s));
    }

    #[test]
    fn mutation_events_reach_subscribers() {
        let (volume, rock, ..) = volume();
        let rx = volume.subscribe();
        let c = Coord::new(9, 9, 9);
        volume.fill(c, rock);
        match rx.try_recv() {
            Ok(VolumeEvent::CellsFilled(cells)) => assert_eq!(&*cells, &[(c, rock)]),
            other => panic!("expected CellsFilled, got {other:?}"),
        }
        volume.empty(c);
        match rx.try_recv() {
            Ok(VolumeEvent::CellsEmptied(cells)) => assert_eq!(&*cells, &[(c, rock)]),
            other => panic!("expected CellsEmptied, got {other:?}"),
        }
        assert!(matches!(
            rx.try_recv(),
            Ok(VolumeEvent::CompletelyEmptied)
        ));
    }
}
