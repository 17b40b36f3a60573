//! Neighbor discovery and face visibility.
//!
//! Both walk run faces with a jump-scan: probing one cell beyond the face,
//! a hit advances the scan cursor past the neighbor's whole extent, so the
//! cost scales with the number of bordering runs rather than face area.

use std::collections::HashSet;

use crate::space::{Coord, Direction, FaceMask};

use super::VolumeData;
use super::run::{RunId, RunShape};

/// Visit the probe cell one out from every cell of the `dir` face.
///
/// The inner scan axis jumps past any run it finds; the outer axis always
/// steps by one.
fn walk_face(data: &VolumeData, shape: &RunShape, dir: Direction, mut f: impl FnMut(Option<RunId>)) {
    let o = shape.origin;
    let e = shape.end();
    match dir {
        Direction::NegX | Direction::PosX => {
            let x = if dir == Direction::PosX { e.x } else { o.x - 1 };
            for z in o.z..e.z {
                let mut y = o.y;
                while y < e.y {
                    let id = data.run_id_at(Coord::new(x, y, z));
                    let jump = match id.and_then(|i| data.runs.get(i)) {
                        Some(run) => run.shape.end().y - y,
                        None => 1,
                    };
                    f(id);
                    y += jump.max(1);
                }
            }
        }
        Direction::NegY | Direction::PosY => {
            let y = if dir == Direction::PosY { e.y } else { o.y - 1 };
            for x in o.x..e.x {
                let mut z = o.z;
                while z < e.z {
                    let id = data.run_id_at(Coord::new(x, y, z));
                    let jump = match id.and_then(|i| data.runs.get(i)) {
                        Some(run) => run.shape.end().z - z,
                        None => 1,
                    };
                    f(id);
                    z += jump.max(1);
                }
            }
        }
        Direction::NegZ | Direction::PosZ => {
            let z = if dir == Direction::PosZ { e.z } else { o.z - 1 };
            for x in o.x..e.x {
                let mut y = o.y;
                while y < e.y {
                    let id = data.run_id_at(Coord::new(x, y, z));
                    let jump = match id.and_then(|i| data.runs.get(i)) {
                        Some(run) => run.shape.end().y - y,
                        None => 1,
                    };
                    f(id);
                    y += jump.max(1);
                }
            }
        }
    }
}

/// Runs bordering `shape`, each reported once, in discovery order.
fn discover(data: &VolumeData, this: RunId, shape: &RunShape) -> Vec<RunId> {
    let mut found: Vec<RunId> = Vec::new();
    let mut seen: HashSet<RunId> = HashSet::new();
    seen.insert(this);
    for dir in Direction::ALL {
        walk_face(data, shape, dir, |probe| {
            if let Some(n) = probe {
                if data.runs.get(n).is_some_and(|r| r.active) && seen.insert(n) {
                    found.push(n);
                }
            }
        });
    }
    found
}

/// Discover and record the neighbors of a freshly created run, inserting
/// every edge symmetrically.
pub(super) fn attach_run(data: &mut VolumeData, id: RunId) {
    let Some(run) = data.runs.get(id) else { return };
    if !run.active {
        return;
    }
    let shape = run.shape;
    let found = discover(data, id, &shape);
    for &n in &found {
        if let Some(other) = data.runs.get_mut(n) {
            other.neighbors.push(id);
        }
    }
    if let Some(run) = data.runs.get_mut(id) {
        run.neighbors = found;
    }
}

/// Recompute adjacency for a batch of freshly created runs in one sweep.
///
/// All batch lists are cleared before any scanning so a symmetric insert
/// is never wiped by a later reset; a pair discovered from either side is
/// inserted exactly once.
pub(super) fn attach_batch(data: &mut VolumeData, batch: &[RunId]) {
    for &id in batch {
        if let Some(run) = data.runs.get_mut(id) {
            run.neighbors.clear();
        }
    }
    let mut linked: HashSet<(RunId, RunId)> = HashSet::new();
    for &id in batch {
        let Some(run) = data.runs.get(id) else { continue };
        if !run.active {
            continue;
        }
        let shape = run.shape;
        for n in discover(data, id, &shape) {
            let pair = if n < id { (n, id) } else { (id, n) };
            if !linked.insert(pair) {
                continue;
            }
            if let Some(other) = data.runs.get_mut(n) {
                other.neighbors.push(id);
            }
            if let Some(run) = data.runs.get_mut(id) {
                run.neighbors.push(n);
            }
        }
    }
}

/// Throw away every neighbor list and rediscover adjacency for all active
/// runs. This is the recovery path for corrupt persisted adjacency.
pub(super) fn rebuild_all(data: &mut VolumeData) {
    let ids: Vec<RunId> = data
        .runs
        .iter()
        .filter(|(_, r)| r.active)
        .map(|(id, _)| id)
        .collect();
    for &id in &ids {
        if let Some(run) = data.runs.get_mut(id) {
            run.neighbors.clear();
        }
    }
    attach_batch(data, &ids);
}

/// Recompute the visibility mask of a run: a face bit is set when at least
/// one of its face cells borders no covering run. Also reports whether the
/// run is currently listed in its chunk, which the apply step uses as its
/// modified flag.
pub(super) fn face_mask(data: &VolumeData, id: RunId) -> (FaceMask, bool) {
    let Some(run) = data.runs.get(id) else {
        return (FaceMask::NONE, false);
    };
    let shape = run.shape;
    let mut mask = FaceMask::NONE;
    for dir in Direction::ALL {
        let mut exposed = false;
        walk_face(data, &shape, dir, |probe| {
            if probe.is_none() {
                exposed = true;
            }
        });
        mask.set(dir, exposed);
    }
    (mask, run.listed)
}
