//! Proximity search and greedy pathfinding over cells.
//!
//! Everything here is generic over [`CellRead`], so callers can run
//! against the live volume or a [`snapshot::Snapshot`](super::snapshot::Snapshot)
//! captured off-thread.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::space::Coord;

use super::CellRead;

/// Offsets that count as "beside structure" for open-cell checks and
/// pathfinding support. Deliberately lopsided: the set leans on upward
/// diagonals so paths hug walkable surfaces.
const NEAR_OFFSETS: [(i32, i32, i32); 14] = [
    (0, 0, 1),
    (0, 1, 0),
    (0, 1, 1),
    (1, 0, 0),
    (1, 0, 1),
    (1, 1, 0),
    (1, 1, 1),
    (0, 0, -1),
    (0, -1, 0),
    (0, -1, -1),
    (-1, 0, 0),
    (-1, 0, 1),
    (-1, -1, 0),
    (-1, -1, -1),
];

/// Search radius used for the start of a path.
const START_RADIUS: i32 = 10;
/// Search radius used for the goal of a path.
const GOAL_RADIUS: i32 = 20;
/// Pathfinding gives up (returning its best partial path) after this many
/// expansions.
const PATH_BUDGET: usize = 200;

/// Filled, or touching something filled through [`NEAR_OFFSETS`].
fn near_structure<V: CellRead>(view: &V, c: Coord) -> bool {
    view.is_filled(c)
        || NEAR_OFFSETS
            .iter()
            .any(|&(dx, dy, dz)| view.is_filled(c.offset(dx, dy, dz)))
}

/// Visit every cell offset on the hollow cube shell of radius `r`.
fn shell(r: i32, mut f: impl FnMut(i32, i32, i32)) {
    for x in [-r, r] {
        for y in -r..=r {
            for z in -r..=r {
                f(x, y, z);
            }
        }
    }
    for y in [-r, r] {
        for x in (1 - r)..r {
            for z in (1 - r)..r {
                f(x, y, z);
            }
        }
    }
    for z in [-r, r] {
        for x in (1 - r)..r {
            for y in -r..=r {
                f(x, y, z);
            }
        }
    }
}

/// Grow shells around `from` until one holds a cell passing `accept`, and
/// return the closest such cell by straight-line distance.
fn closest_matching<V, P>(view: &V, from: Coord, max_radius: i32, accept: P) -> Option<Coord>
where
    V: CellRead,
    P: Fn(&V, Coord) -> bool,
{
    if accept(view, from) {
        return Some(from);
    }
    for r in 1..max_radius {
        let mut best: Option<(i64, Coord)> = None;
        shell(r, |dx, dy, dz| {
            let c = from.offset(dx, dy, dz);
            if accept(view, c) {
                let d = from.distance_sq(c);
                if best.is_none_or(|(bd, _)| d < bd) {
                    best = Some((d, c));
                }
            }
        });
        if let Some((_, c)) = best {
            return Some(c);
        }
    }
    None
}

/// Closest filled cell within `max_radius` shells of `from`.
pub fn closest_filled<V: CellRead>(view: &V, from: Coord, max_radius: i32) -> Option<Coord> {
    closest_matching(view, from, max_radius, |v, c| v.is_filled(c))
}

/// Closest cell beside structure that is not permanent: somewhere a
/// collaborator could build or stand.
pub fn closest_open<V: CellRead>(view: &V, from: Coord, max_radius: i32) -> Option<Coord> {
    closest_matching(view, from, max_radius, |v, c| {
        near_structure(v, c) && !v.states().is_permanent(v.state_at(c))
    })
}

/// Frontier entry ordered by distance to the goal alone.
struct Candidate {
    to_goal: i64,
    coord: Coord,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.to_goal == other.to_goal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_goal.cmp(&other.to_goal)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Greedy best-first walk from near `start` to near `end`.
///
/// Cells are passable when filled and not permanent, or empty but beside
/// structure. The frontier is ordered purely by distance to the goal, so
/// paths are short rather than optimal; once the expansion budget runs
/// out, the best partial path found so far is returned.
pub fn greedy_path<V: CellRead>(view: &V, start: Coord, end: Coord) -> Option<Vec<Coord>> {
    let from = closest_open(view, start, START_RADIUS)?;
    let goal = closest_filled(view, end, GOAL_RADIUS)?;

    let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut came_from: HashMap<Coord, Coord> = HashMap::new();
    let mut so_far: HashMap<Coord, i64> = HashMap::from([(from, 0)]);
    let mut closed: HashSet<Coord> = HashSet::new();
    frontier.push(Reverse(Candidate {
        to_goal: from.distance_sq(goal),
        coord: from,
    }));

    let mut expansions = 0;
    while let Some(Reverse(candidate)) = frontier.pop() {
        let current = candidate.coord;
        if expansions == PATH_BUDGET || current.chebyshev(goal) <= 1 {
            return Some(reconstruct(&came_from, from, current));
        }
        expansions += 1;
        if !closed.insert(current) {
            continue;
        }

        let steps = so_far.get(&current).copied().unwrap_or(0);
        for next in current.neighbors() {
            if came_from.get(&current) == Some(&next) || closed.contains(&next) {
                continue;
            }
            let state = view.state_at(next);
            if view.states().is_permanent(state) {
                continue;
            }
            if state.is_empty() && !near_structure(view, next) {
                continue;
            }
            let tentative = steps + 1;
            if so_far.get(&next).is_some_and(|&best| best <= tentative) {
                continue;
            }
            so_far.insert(next, tentative);
            came_from.insert(next, current);
            frontier.push(Reverse(Candidate {
                to_goal: next.distance_sq(goal),
                coord: next,
            }));
        }
    }
    None
}

fn reconstruct(came_from: &HashMap<Coord, Coord>, from: Coord, tail: Coord) -> Vec<Coord> {
    let mut path = vec![tail];
    let mut current = tail;
    while current != from {
        let Some(&previous) = came_from.get(&current) else {
            break;
        };
        path.push(previous);
        current = previous;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CellState, StateId, StateTable};
    use crate::volume::snapshot::Snapshot;
    use crate::volume::{Volume, VolumeConfig};

    fn volume() -> (Volume, StateId, StateId) {
        let mut table = StateTable::new();
        let rock = table.register(CellState::new("rock"));
        let bedrock = table.register(CellState::new("bedrock").permanent(true).supported(true));
        (
            Volume::new(table.into_shared(), VolumeConfig::default()),
            rock,
            bedrock,
        )
    }

    #[test]
    fn closest_filled_prefers_the_nearest_cell() {
        let (volume, rock, _) = volume();
        volume.fill(Coord::new(3, 0, 0), rock);
        volume.fill(Coord::new(0, 4, 0), rock);

        assert_eq!(
            closest_filled(&volume, Coord::new(0, 0, 0), 20),
            Some(Coord::new(3, 0, 0))
        );
        assert_eq!(
            closest_filled(&volume, Coord::new(3, 0, 0), 20),
            Some(Coord::new(3, 0, 0))
        );
    }

    #[test]
    fn closest_filled_respects_the_radius_cap() {
        let (volume, rock, _) = volume();
        volume.fill(Coord::new(10, 0, 0), rock);
        assert_eq!(closest_filled(&volume, Coord::new(0, 0, 0), 5), None);
        assert!(closest_filled(&volume, Coord::new(0, 0, 0), 12).is_some());
    }

    #[test]
    fn closest_open_lands_beside_structure() {
        let (volume, rock, _) = volume();
        volume.fill(Coord::new(0, 0, 0), rock);
        assert_eq!(
            closest_open(&volume, Coord::new(5, 0, 0), 10),
            Some(Coord::new(1, 0, 0))
        );
    }

    #[test]
    fn closest_open_skips_permanent_cells() {
        let (volume, _, bedrock) = volume();
        volume.fill(Coord::new(0, 0, 0), bedrock);

        let open = closest_open(&volume, Coord::new(0, 0, 0), 10);
        assert!(open.is_some());
        assert_ne!(open, Some(Coord::new(0, 0, 0)));
    }

    #[test]
    fn greedy_path_walks_along_a_floor() {
        let (volume, rock, _) = volume();
        volume.fill_extent(Coord::new(0, 0, 0), Coord::new(8, 1, 1), rock);
        volume.regenerate_now();

        let path = greedy_path(&volume, Coord::new(0, 1, 0), Coord::new(7, 1, 0)).unwrap();
        assert_eq!(path.first(), Some(&Coord::new(0, 1, 0)));
        let tail = *path.last().unwrap();
        assert!(tail.chebyshev(Coord::new(7, 0, 0)) <= 1);
        assert_eq!(path.len(), 7);
        for pair in path.windows(2) {
            assert_eq!(
                (pair[0].x - pair[1].x).abs()
                    + (pair[0].y - pair[1].y).abs()
                    + (pair[0].z - pair[1].z).abs(),
                1
            );
        }
    }

    #[test]
    fn greedy_path_needs_structure_at_both_ends() {
        let (volume, rock, _) = volume();
        assert!(greedy_path(&volume, Coord::new(0, 0, 0), Coord::new(5, 0, 0)).is_none());

        volume.fill(Coord::new(0, 0, 0), rock);
        // Goal far beyond the search radius around the end point.
        assert!(greedy_path(&volume, Coord::new(0, 1, 0), Coord::new(90, 0, 0)).is_none());
    }

    #[test]
    fn searches_run_on_snapshots() {
        let (volume, rock, _) = volume();
        volume.fill(Coord::new(2, 0, 0), rock);
        let snapshot = Snapshot::capture(&volume);
        volume.empty(Coord::new(2, 0, 0));

        assert_eq!(closest_filled(&volume, Coord::new(0, 0, 0), 10), None);
        assert_eq!(
            closest_filled(&snapshot, Coord::new(0, 0, 0), 10),
            Some(Coord::new(2, 0, 0))
        );
    }
}
