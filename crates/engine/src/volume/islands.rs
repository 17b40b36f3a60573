//! Island detection.
//!
//! Emptying cells can detach whole groups of runs from anything holding
//! them up. The rebuild pass floods adjacency outward from every emptied
//! cell and breaks the detached groups off as [`Island`]s, which leave the
//! volume and are handed to subscribers.

use std::collections::{HashSet, VecDeque};

use crate::space::Coord;
use crate::state::StateTable;

use super::VolumeData;
use super::run::{RunId, RunShape};

/// How the rebuild pass decides which detached groups break off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IslandPolicy {
    /// A group breaks off unless it reaches a run whose state is marked
    /// supported.
    #[default]
    SupportedFlag,
    /// When no reachable run is supported, the largest group by cell
    /// volume stays put and every other group breaks off.
    KeepLargest,
}

/// A detached group of runs, in the shape it had when it broke off.
#[derive(Debug, Clone)]
pub struct Island {
    pub shapes: Vec<RunShape>,
}

impl Island {
    pub fn cell_count(&self) -> i64 {
        self.shapes.iter().map(RunShape::cell_count).sum()
    }

    /// A single one-cell run. Collaborators usually scatter these as
    /// debris instead of respawning them as bodies.
    pub fn is_loose(&self) -> bool {
        self.shapes.len() == 1 && self.shapes[0].cell_count() == 1
    }
}

/// Flood adjacency from `seed`, stopping early the moment a supported
/// state is dequeued. Returns the runs visited and whether support was
/// reached.
fn flood(data: &VolumeData, states: &StateTable, seed: RunId) -> (Vec<RunId>, bool) {
    let mut visited: HashSet<RunId> = HashSet::new();
    let mut queue: VecDeque<RunId> = VecDeque::new();
    let mut group: Vec<RunId> = Vec::new();
    visited.insert(seed);
    queue.push_back(seed);
    while let Some(id) = queue.pop_front() {
        let Some(run) = data.runs.get(id) else { continue };
        if !run.active {
            continue;
        }
        group.push(id);
        if states.is_supported(run.shape.state) {
            return (group, true);
        }
        for &n in &run.neighbors {
            if data.runs.get(n).is_some_and(|r| r.active) && visited.insert(n) {
                queue.push_back(n);
            }
        }
    }
    (group, false)
}

fn group_volume(data: &VolumeData, group: &[RunId]) -> i64 {
    group
        .iter()
        .filter_map(|&id| data.runs.get(id))
        .map(|r| r.shape.cell_count())
        .sum()
}

/// Drain the emptied-cell backlog, flood around each coordinate, and
/// detach every group the policy condemns. The detached runs are removed
/// from the volume before this returns.
pub(super) fn collect(
    data: &mut VolumeData,
    states: &StateTable,
    policy: IslandPolicy,
) -> Vec<Island> {
    let coords = std::mem::take(&mut data.removal_coords);
    if coords.is_empty() {
        return Vec::new();
    }

    let mut claimed: HashSet<RunId> = HashSet::new();
    let mut groups: Vec<Vec<RunId>> = Vec::new();
    let mut any_supported = false;
    for coord in coords {
        if data.run_id_at(coord).is_some() {
            // Refilled since the removal; nothing detached here.
            continue;
        }
        for neighbor in coord.neighbors() {
            let Some(id) = data.run_id_at(neighbor) else { continue };
            if claimed.contains(&id) {
                continue;
            }
            let (group, supported) = flood(data, states, id);
            if supported {
                any_supported = true;
            } else {
                claimed.extend(group.iter().copied());
                groups.push(group);
            }
        }
    }

    let condemned: Vec<Vec<RunId>> = match policy {
        IslandPolicy::SupportedFlag => groups,
        IslandPolicy::KeepLargest => {
            if any_supported {
                groups
            } else if groups.len() > 1 {
                let keep = groups
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, g)| group_volume(data, g))
                    .map(|(i, _)| i);
                groups
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != keep)
                    .map(|(_, g)| g)
                    .collect()
            } else {
                Vec::new()
            }
        }
    };

    let mut islands = Vec::new();
    for group in condemned {
        let shapes: Vec<RunShape> = group
            .iter()
            .filter_map(|&id| data.runs.get(id))
            .map(|r| r.shape)
            .collect();
        for &id in &group {
            data.remove_run(id);
        }
        if !shapes.is_empty() {
            islands.push(Island { shapes });
        }
    }
    islands
}

/// All runs reachable from the run covering `seed` through same-state
/// adjacency.
pub(super) fn contiguous_by_state(data: &VolumeData, seed: Coord) -> Vec<RunShape> {
    let Some(seed_id) = data.run_id_at(seed) else {
        return Vec::new();
    };
    let Some(seed_run) = data.runs.get(seed_id) else {
        return Vec::new();
    };
    let state = seed_run.shape.state;

    let mut visited: HashSet<RunId> = HashSet::from([seed_id]);
    let mut queue: VecDeque<RunId> = VecDeque::from([seed_id]);
    let mut shapes: Vec<RunShape> = Vec::new();
    while let Some(id) = queue.pop_front() {
        let Some(run) = data.runs.get(id) else { continue };
        if !run.active || run.shape.state != state {
            continue;
        }
        shapes.push(run.shape);
        for &n in &run.neighbors {
            if visited.insert(n) {
                queue.push_back(n);
            }
        }
    }
    shapes
}
