pub mod chunk;
pub mod codec;
pub mod islands;
pub mod mutate;
pub mod raycast;
pub mod run;
pub mod search;
pub mod snapshot;

mod adjacency;
mod simplify;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crossbeam_channel::Receiver;
use dashmap::DashSet;
use rayon::prelude::*;
use slotmap::SlotMap;

use crate::events::{EventBus, VolumeEvent};
use crate::space::Coord;
use crate::state::{StateId, StateTable};

use chunk::Chunk;
use islands::{Island, IslandPolicy};
use run::{Run, RunId, RunShape};

/// Construction parameters for a [`Volume`].
#[derive(Debug, Clone, Copy)]
pub struct VolumeConfig {
    /// Chunk slots per axis. Doubles automatically when a mutation lands
    /// outside the current bounds.
    pub max_chunks: i32,
    /// Half the chunk side length in cells (side = 2 * this).
    pub chunk_half_side: i32,
    /// World offset applied to the volume's bounds.
    pub offset: Coord,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            max_chunks: 20,
            chunk_half_side: 8,
            offset: Coord::new(0, 0, 0),
        }
    }
}

/// Read-only cell access shared by live volumes and snapshots.
///
/// Search routines are generic over this, so they run identically against
/// a live volume (one short lock per query) or a frozen [`snapshot::Snapshot`].
pub trait CellRead {
    fn state_at(&self, c: Coord) -> StateId;
    fn states(&self) -> &StateTable;

    fn is_filled(&self, c: Coord) -> bool {
        !self.state_at(c).is_empty()
    }
}

/// Everything behind the volume's lock: chunk slots, the run arena, and
/// the bookkeeping lists a rebuild pass consumes.
struct VolumeData {
    half: i32,
    side: i32,
    max_chunks: i32,
    offset: Coord,
    /// Inclusive minimum cell coordinate.
    min: Coord,
    /// Exclusive maximum cell coordinate.
    max: Coord,
    /// `max_chunks^3` slots, x-major, lazily populated.
    chunks: Vec<Option<Chunk>>,
    runs: SlotMap<RunId, Run>,
    /// Runs created since the last rebuild pass.
    additions: Vec<RunId>,
    /// Runs deactivated since the last rebuild pass.
    removals: Vec<RunId>,
    /// Cells emptied since the last island pass.
    removal_coords: Vec<Coord>,
    /// (chunk origin, state) keys touched since the last drain.
    dirty_marks: Vec<(Coord, StateId)>,
}

impl VolumeData {
    fn new(config: VolumeConfig) -> Self {
        let side = config.chunk_half_side * 2;
        let slots = (config.max_chunks as usize).pow(3);
        let mut chunks = Vec::new();
        chunks.resize_with(slots, || None);
        let mut data = Self {
            half: config.chunk_half_side,
            side,
            max_chunks: config.max_chunks,
            offset: config.offset,
            min: Coord::new(0, 0, 0),
            max: Coord::new(0, 0, 0),
            chunks,
            runs: SlotMap::with_key(),
            additions: Vec::new(),
            removals: Vec::new(),
            removal_coords: Vec::new(),
            dirty_marks: Vec::new(),
        };
        data.update_bounds();
        data
    }

    /// Bounds are shifted half a chunk so cell 0 sits at the center of a
    /// middle chunk; chunk world origins stay fixed across doublings.
    fn update_bounds(&mut self) {
        let n = self.max_chunks;
        let half = self.half;
        self.min = Coord::new(
            -half * n - half + self.offset.x,
            -half * n - half + self.offset.y,
            -half * n - half + self.offset.z,
        );
        self.max = Coord::new(
            half * n - half + self.offset.x,
            half * n - half + self.offset.y,
            half * n - half + self.offset.z,
        );
    }

    fn in_bounds(&self, c: Coord) -> bool {
        c.x >= self.min.x
            && c.x < self.max.x
            && c.y >= self.min.y
            && c.y < self.max.y
            && c.z >= self.min.z
            && c.z < self.max.z
    }

    /// Double the chunk array in every dimension, recentering the existing
    /// slots so world positions are preserved.
    fn grow(&mut self) {
        let old_n = self.max_chunks as usize;
        let new_n = old_n * 2;
        let shift = old_n / 2;
        let mut fresh: Vec<Option<Chunk>> = Vec::new();
        fresh.resize_with(new_n.pow(3), || None);
        for x in 0..old_n {
            for y in 0..old_n {
                for z in 0..old_n {
                    let old_slot = (x * old_n + y) * old_n + z;
                    if let Some(chunk) = self.chunks[old_slot].take() {
                        let new_slot = ((x + shift) * new_n + y + shift) * new_n + z + shift;
                        fresh[new_slot] = Some(chunk);
                    }
                }
            }
        }
        self.chunks = fresh;
        self.max_chunks = new_n as i32;
        self.update_bounds();
        tracing::debug!(
            "Volume bounds doubled to {} chunks per axis",
            self.max_chunks
        );
    }

    fn grow_to_include(&mut self, c: Coord) {
        while !self.in_bounds(c) {
            self.grow();
        }
    }

    /// Chunk indices of a cell, or `None` when out of bounds.
    fn chunk_index_of(&self, c: Coord) -> Option<(i32, i32, i32)> {
        if !self.in_bounds(c) {
            return None;
        }
        Some((
            (c.x - self.min.x) / self.side,
            (c.y - self.min.y) / self.side,
            (c.z - self.min.z) / self.side,
        ))
    }

    fn slot(&self, ix: i32, iy: i32, iz: i32) -> usize {
        ((ix * self.max_chunks + iy) * self.max_chunks + iz) as usize
    }

    /// World origin of the chunk containing `c`.
    fn chunk_origin(&self, c: Coord) -> Option<Coord> {
        let (ix, iy, iz) = self.chunk_index_of(c)?;
        Some(Coord::new(
            self.min.x + ix * self.side,
            self.min.y + iy * self.side,
            self.min.z + iz * self.side,
        ))
    }

    fn chunk_containing(&self, c: Coord) -> Option<&Chunk> {
        let (ix, iy, iz) = self.chunk_index_of(c)?;
        self.chunks[self.slot(ix, iy, iz)].as_ref()
    }

    fn chunk_containing_mut(&mut self, c: Coord) -> Option<&mut Chunk> {
        let (ix, iy, iz) = self.chunk_index_of(c)?;
        let slot = self.slot(ix, iy, iz);
        self.chunks[slot].as_mut()
    }

    /// Chunk containing `c`, created (growing bounds first) if absent.
    fn ensure_chunk(&mut self, c: Coord) -> &mut Chunk {
        self.grow_to_include(c);
        let (ix, iy, iz) = (
            (c.x - self.min.x) / self.side,
            (c.y - self.min.y) / self.side,
            (c.z - self.min.z) / self.side,
        );
        let origin = Coord::new(
            self.min.x + ix * self.side,
            self.min.y + iy * self.side,
            self.min.z + iz * self.side,
        );
        let side = self.side;
        let slot = self.slot(ix, iy, iz);
        self.chunks[slot].get_or_insert_with(|| Chunk::new(origin, side))
    }

    fn run_id_at(&self, c: Coord) -> Option<RunId> {
        self.chunk_containing(c).and_then(|chunk| chunk.cell_world(c))
    }

    fn state_at(&self, c: Coord) -> StateId {
        match self.run_id_at(c).and_then(|id| self.runs.get(id)) {
            Some(run) => run.shape.state,
            None => StateId::EMPTY,
        }
    }

    fn mark_dirty(&mut self, shape: &RunShape) {
        if let Some(origin) = self.chunk_origin(shape.origin) {
            self.dirty_marks.push((origin, shape.state));
        }
    }

    /// Register a chunk-local run: arena entry, dense stamp, dirty mark.
    /// The run joins its chunk's sparse list at the next apply step.
    fn add_run(&mut self, shape: RunShape) -> RunId {
        let id = self.runs.insert(Run::new(shape));
        self.ensure_chunk(shape.origin).stamp(&shape, Some(id));
        self.mark_dirty(&shape);
        self.additions.push(id);
        id
    }

    /// Stamp `shape` into the volume, splitting at chunk boundaries.
    /// Returns one run per overlapped chunk piece.
    fn place_shape(&mut self, shape: RunShape) -> Vec<RunId> {
        if shape.width <= 0 || shape.height <= 0 || shape.depth <= 0 {
            return Vec::new();
        }
        let end = shape.end();
        self.grow_to_include(shape.origin);
        self.grow_to_include(end.offset(-1, -1, -1));
        let side = self.side;
        let first = Coord::new(
            self.min.x + ((shape.origin.x - self.min.x) / side) * side,
            self.min.y + ((shape.origin.y - self.min.y) / side) * side,
            self.min.z + ((shape.origin.z - self.min.z) / side) * side,
        );
        let mut ids = Vec::new();
        let mut cx = first.x;
        while cx < end.x {
            let mut cy = first.y;
            while cy < end.y {
                let mut cz = first.z;
                while cz < end.z {
                    let bx = shape.origin.x.max(cx);
                    let by = shape.origin.y.max(cy);
                    let bz = shape.origin.z.max(cz);
                    let ex = end.x.min(cx + side);
                    let ey = end.y.min(cy + side);
                    let ez = end.z.min(cz + side);
                    if ex > bx && ey > by && ez > bz {
                        ids.push(self.add_run(RunShape::new(
                            Coord::new(bx, by, bz),
                            ex - bx,
                            ey - by,
                            ez - bz,
                            shape.state,
                        )));
                    }
                    cz += side;
                }
                cy += side;
            }
            cx += side;
        }
        ids
    }

    /// Deactivate a run: clear its cells, drop it from every neighbor's
    /// list, queue it for the next apply step. Its own neighbor list is
    /// kept so the rebuild pass can refresh the runs it used to touch.
    fn remove_run(&mut self, id: RunId) {
        let Some(run) = self.runs.get(id) else { return };
        if !run.active {
            return;
        }
        let shape = run.shape;
        let neighbors = run.neighbors.clone();
        for n in neighbors {
            if let Some(other) = self.runs.get_mut(n) {
                other.neighbors.retain(|&r| r != id);
            }
        }
        if let Some(chunk) = self.chunk_containing_mut(shape.origin) {
            chunk.stamp(&shape, None);
        }
        if let Some(run) = self.runs.get_mut(id) {
            run.active = false;
        }
        self.mark_dirty(&shape);
        self.removals.push(id);
    }

    /// Active runs in chunk-slot order, as the serializer sees them.
    fn listed_runs(&self) -> Vec<RunId> {
        let mut out = Vec::new();
        for chunk in self.chunks.iter().flatten() {
            for &id in &chunk.runs {
                if self.runs.get(id).is_some_and(|r| r.active) {
                    out.push(id);
                }
            }
        }
        out
    }
}

/// A chunked sparse volume of typed cells stored as merged box runs.
///
/// Mutations and rebuild passes serialize on an internal write lock;
/// point queries and raycasts share a read lock. Collaborators learn
/// about changes through [`subscribe`](Volume::subscribe) and the
/// (chunk, state) dirty keys from [`take_dirty`](Volume::take_dirty).
pub struct Volume {
    states: Arc<StateTable>,
    data: RwLock<VolumeData>,
    /// (chunk origin, state) keys with stale mesh/physics artifacts.
    dirty: DashSet<(Coord, StateId)>,
    bus: EventBus,
    mutable: AtomicBool,
    island_policy: IslandPolicy,
    config: VolumeConfig,
}

impl Volume {
    pub fn new(states: Arc<StateTable>, config: VolumeConfig) -> Self {
        Self::with_island_policy(states, config, IslandPolicy::default())
    }

    pub fn with_island_policy(
        states: Arc<StateTable>,
        config: VolumeConfig,
        island_policy: IslandPolicy,
    ) -> Self {
        Self {
            states,
            data: RwLock::new(VolumeData::new(config)),
            dirty: DashSet::new(),
            bus: EventBus::new(),
            mutable: AtomicBool::new(true),
            island_policy,
            config,
        }
    }

    pub(crate) fn read_data(&self) -> RwLockReadGuard<'_, VolumeData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_data(&self) -> RwLockWriteGuard<'_, VolumeData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move accumulated (chunk, state) marks into the lock-free dirty set.
    /// Called while still holding the write lock.
    fn flush_dirty(&self, data: &mut VolumeData) {
        for mark in data.dirty_marks.drain(..) {
            self.dirty.insert(mark);
        }
    }

    pub fn config(&self) -> VolumeConfig {
        self.config
    }

    pub fn state_table(&self) -> &Arc<StateTable> {
        &self.states
    }

    pub fn island_policy(&self) -> IslandPolicy {
        self.island_policy
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable.load(Ordering::Relaxed)
    }

    /// Freeze or unfreeze the volume. While frozen every mutation,
    /// including queued rebuild passes, is a silent no-op.
    pub fn set_mutable(&self, mutable: bool) {
        self.mutable.store(mutable, Ordering::Relaxed);
    }

    /// Receive all future change events for this volume.
    pub fn subscribe(&self) -> Receiver<VolumeEvent> {
        self.bus.subscribe()
    }

    pub(crate) fn publish(&self, event: VolumeEvent) {
        self.bus.publish(event);
    }

    /// Current (inclusive min, exclusive max) cell bounds.
    pub fn bounds(&self) -> (Coord, Coord) {
        let data = self.read_data();
        (data.min, data.max)
    }

    /// State of the cell at `c`; the empty sentinel when nothing is there.
    pub fn state_at(&self, c: Coord) -> StateId {
        self.read_data().state_at(c)
    }

    /// Shape and state of the run covering `c`, if any.
    pub fn run_at(&self, c: Coord) -> Option<RunShape> {
        let data = self.read_data();
        let id = data.run_id_at(c)?;
        data.runs.get(id).map(|r| r.shape)
    }

    pub fn active_run_count(&self) -> usize {
        self.read_data().runs.values().filter(|r| r.active).count()
    }

    pub fn chunk_count(&self) -> usize {
        self.read_data().chunks.iter().flatten().count()
    }

    /// Active runs of `state` registered in the chunk whose origin is
    /// `chunk_origin` (the key handed out by [`take_dirty`](Self::take_dirty)).
    pub fn runs_in_chunk(&self, chunk_origin: Coord, state: StateId) -> Vec<RunShape> {
        let data = self.read_data();
        let Some(chunk) = data.chunk_containing(chunk_origin) else {
            return Vec::new();
        };
        chunk
            .runs
            .iter()
            .filter_map(|&id| data.runs.get(id))
            .filter(|r| r.active && r.shape.state == state)
            .map(|r| r.shape)
            .collect()
    }

    /// Drain and return all (chunk origin, state) keys dirtied since the
    /// last call. After this returns, the dirty set is empty.
    pub fn take_dirty(&self) -> Vec<(Coord, StateId)> {
        let mut dirty = Vec::new();
        // Collect then remove; a key dirtied between the two loops is
        // simply picked up by the next drain -- always safe.
        for entry in self.dirty.iter() {
            dirty.push(*entry);
        }
        for key in &dirty {
            self.dirty.remove(key);
        }
        dirty
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Run the full rebuild pass synchronously: detach islands, refresh
    /// face masks around everything the last batch touched, merge runs
    /// (two passes), and reconcile chunk lists. Holds the write lock for
    /// the duration; events go out after it is released.
    pub fn regenerate_now(&self) {
        if !self.is_mutable() {
            return;
        }
        let started = Instant::now();
        let mut emptied: Vec<(Coord, StateId)> = Vec::new();
        let islands: Vec<Island>;
        let refreshed;
        let completely_emptied;
        {
            let mut data = self.write_data();
            islands = islands::collect(&mut data, &self.states, self.island_policy);
            for island in &islands {
                for shape in &island.shapes {
                    for cell in shape.cells() {
                        emptied.push((cell, shape.state));
                    }
                }
            }

            let order = refresh_targets(&data);
            refreshed = order.len();
            let data_ref: &VolumeData = &data;
            let masks: Vec<_> = order
                .par_iter()
                .map(|&id| adjacency::face_mask(data_ref, id))
                .collect();

            let mut modified = vec![false; order.len()];
            let mut marks: Vec<RunShape> = Vec::new();
            for (i, (&id, (mask, listed))) in order.iter().zip(masks).enumerate() {
                if let Some(run) = data.runs.get_mut(id) {
                    run.faces = mask;
                    modified[i] = listed;
                    if listed {
                        marks.push(run.shape);
                    }
                }
            }
            for shape in &marks {
                data.mark_dirty(shape);
            }

            // Second pass catches merges the first pass's axis order misses.
            simplify::pass(&mut data, &order, &mut modified);
            simplify::pass(&mut data, &order, &mut modified);

            apply_changes(&mut data, &order, &modified);
            completely_emptied =
                !islands.is_empty() && !data.runs.values().any(|r| r.active);
            self.flush_dirty(&mut data);
        }

        let island_count = islands.len();
        if !emptied.is_empty() {
            self.publish(VolumeEvent::CellsEmptied(emptied.into()));
        }
        if island_count > 0 {
            self.publish(VolumeEvent::Islands(islands.into()));
        }
        if completely_emptied {
            self.publish(VolumeEvent::CompletelyEmptied);
        }
        tracing::debug!(
            "Rebuild pass: {} runs refreshed, {} islands, {:?}",
            refreshed,
            island_count,
            started.elapsed()
        );
    }

    /// Populate the volume directly from run shapes (the island respawn
    /// path): stamp each shape, attach adjacency, then run a synchronous
    /// rebuild pass. Returns the number of runs placed.
    pub fn build_from_runs(&self, shapes: &[RunShape]) -> usize {
        if !self.is_mutable() {
            return 0;
        }
        let mut filled: Vec<(Coord, StateId)> = Vec::new();
        let placed_count;
        {
            let mut data = self.write_data();
            let mut placed: Vec<RunId> = Vec::new();
            for shape in shapes {
                if shape.state.is_empty() || !self.states.contains(shape.state) {
                    continue;
                }
                for cell in shape.cells() {
                    filled.push((cell, shape.state));
                }
                placed.extend(data.place_shape(*shape));
            }
            placed_count = placed.len();
            adjacency::attach_batch(&mut data, &placed);
            self.flush_dirty(&mut data);
        }
        if !filled.is_empty() {
            self.publish(VolumeEvent::CellsFilled(filled.into()));
        }
        self.regenerate_now();
        placed_count
    }

    /// All runs connected to the run covering `seed` through same-state
    /// adjacency. Empty when `seed` is empty.
    pub fn contiguous_by_state(&self, seed: Coord) -> Vec<RunShape> {
        let data = self.read_data();
        islands::contiguous_by_state(&data, seed)
    }
}

impl CellRead for Volume {
    fn state_at(&self, c: Coord) -> StateId {
        Volume::state_at(self, c)
    }

    fn states(&self) -> &StateTable {
        &self.states
    }
}

/// Everything whose faces need recomputing after a batch: still-active
/// touched runs plus the active neighbors of every touched run (removed
/// runs keep their neighbor lists for exactly this).
fn refresh_targets(data: &VolumeData) -> Vec<RunId> {
    let mut seen: HashSet<RunId> = HashSet::new();
    let mut order: Vec<RunId> = Vec::new();
    let sources: Vec<RunId> = data
        .removals
        .iter()
        .copied()
        .chain(
            data.additions
                .iter()
                .copied()
                .filter(|&id| data.runs.get(id).is_some_and(|r| r.active)),
        )
        .collect();
    for id in sources {
        let Some(run) = data.runs.get(id) else { continue };
        if run.active && seen.insert(id) {
            order.push(id);
        }
        for &n in &run.neighbors {
            if seen.contains(&n) {
                continue;
            }
            if data.runs.get(n).is_some_and(|r| r.active) {
                seen.insert(n);
                order.push(n);
            }
        }
    }
    order
}

fn unlist(data: &mut VolumeData, id: RunId, marks: &mut Vec<RunShape>) {
    let Some(run) = data.runs.get(id) else { return };
    let shape = run.shape;
    if let Some(chunk) = data.chunk_containing_mut(shape.origin) {
        chunk.runs.retain(|&r| r != id);
    }
    if let Some(run) = data.runs.get_mut(id) {
        run.listed = false;
    }
    marks.push(shape);
}

/// Reconcile chunk run lists with the batch outcome, then release the
/// arena slots of everything that was deactivated.
fn apply_changes(data: &mut VolumeData, order: &[RunId], modified: &[bool]) {
    let removals = std::mem::take(&mut data.removals);
    let additions = std::mem::take(&mut data.additions);
    let mut marks: Vec<RunShape> = Vec::new();

    for &id in &removals {
        if data.runs.get(id).is_some_and(|r| r.listed) {
            unlist(data, id, &mut marks);
        }
    }

    for (i, &id) in order.iter().enumerate() {
        let Some(run) = data.runs.get(id) else { continue };
        if run.listed && !run.active {
            unlist(data, id, &mut marks);
        } else if run.listed && run.active && modified[i] {
            marks.push(run.shape);
        }
    }

    for &id in &additions {
        let Some(run) = data.runs.get(id) else { continue };
        if run.active && !run.listed {
            let shape = run.shape;
            if let Some(chunk) = data.chunk_containing_mut(shape.origin) {
                chunk.runs.push(id);
            }
            if let Some(run) = data.runs.get_mut(id) {
                run.listed = true;
            }
            marks.push(shape);
        }
    }

    for shape in &marks {
        data.mark_dirty(shape);
    }

    for id in removals.into_iter().chain(additions) {
        if data.runs.get(id).is_some_and(|r| !r.active) {
            data.runs.remove(id);
        }
    }
}
