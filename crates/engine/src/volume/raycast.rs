//! Segment raycasts.
//!
//! A cast rasterizes the chunks crossed by the segment, finds where the
//! segment enters each chunk through a slab test, then walks cells with a
//! grid DDA until it lands on a run. The reported position is the analytic
//! intersection with the hit face plane, not the cell corner.

use glam::Vec3;

use crate::space::{Coord, Direction};
use crate::state::StateId;

use super::chunk::Chunk;
use super::{Volume, VolumeData};

const EPSILON: f32 = 1e-6;

/// First solid cell along a cast segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub coord: Coord,
    pub state: StateId,
    /// Face the ray came through, pointing back toward the start.
    pub normal: Direction,
    /// Analytic intersection with the hit face plane.
    pub position: Vec3,
    /// Distance from the segment start to `position`.
    pub distance: f32,
}

impl Volume {
    /// Cast a segment and return the first solid cell it crosses.
    pub fn raycast(&self, start: Vec3, end: Vec3) -> Option<RayHit> {
        self.raycast_filtered(start, end, |_| true)
    }

    /// Cast `length` units from `start` along `direction`.
    pub fn raycast_dir(&self, start: Vec3, direction: Vec3, length: f32) -> Option<RayHit> {
        let dir = direction.normalize_or_zero();
        self.raycast(start, start + dir * length)
    }

    /// Cast a segment, ignoring cells whose state fails `filter`.
    pub fn raycast_filtered<F>(&self, start: Vec3, end: Vec3, filter: F) -> Option<RayHit>
    where
        F: Fn(StateId) -> bool,
    {
        let data = self.read_data();
        for (ix, iy, iz) in chunk_indices_along(&data, start, end) {
            if ix < 0
                || ix >= data.max_chunks
                || iy < 0
                || iy >= data.max_chunks
                || iz < 0
                || iz >= data.max_chunks
            {
                continue;
            }
            let slot = data.slot(ix, iy, iz);
            let Some(chunk) = data.chunks[slot].as_ref() else {
                continue;
            };
            let Some(entry) = chunk_entry(chunk, start, end) else {
                continue;
            };
            if let Some(hit) = walk_chunk(&data, chunk, start, entry, end, &filter) {
                return Some(hit);
            }
        }
        None
    }
}

/// Chunk indices crossed by the segment, in travel order. Indices outside
/// the slot grid are included; the caller skips them.
fn chunk_indices_along(data: &VolumeData, start: Vec3, end: Vec3) -> Vec<(i32, i32, i32)> {
    let side = data.side as f32;
    let min = data.min.to_vec3();
    let s = (start - min) / side;
    let e = (end - min) / side;
    let dir = e - s;

    let mut cell = (
        s.x.floor() as i32,
        s.y.floor() as i32,
        s.z.floor() as i32,
    );
    let last = (
        e.x.floor() as i32,
        e.y.floor() as i32,
        e.z.floor() as i32,
    );
    let steps = (last.0 - cell.0).abs() as i64
        + (last.1 - cell.1).abs() as i64
        + (last.2 - cell.2).abs() as i64;

    let step = (sign(dir.x), sign(dir.y), sign(dir.z));
    let t_delta = (inv_abs(dir.x), inv_abs(dir.y), inv_abs(dir.z));
    let mut t_max = (
        boundary_t(s.x, cell.0, step.0, t_delta.0),
        boundary_t(s.y, cell.1, step.1, t_delta.1),
        boundary_t(s.z, cell.2, step.2, t_delta.2),
    );

    let mut out = Vec::with_capacity(steps as usize + 1);
    for i in 0..=steps {
        out.push(cell);
        if i == steps {
            break;
        }
        if t_max.0 <= t_max.1 && t_max.0 <= t_max.2 {
            cell.0 += step.0;
            t_max.0 += t_delta.0;
        } else if t_max.1 <= t_max.2 {
            cell.1 += step.1;
            t_max.1 += t_delta.1;
        } else {
            cell.2 += step.2;
            t_max.2 += t_delta.2;
        }
    }
    out
}

fn sign(v: f32) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

fn inv_abs(v: f32) -> f32 {
    if v == 0.0 { f32::INFINITY } else { 1.0 / v.abs() }
}

/// Parametric distance from `pos` to the next grid boundary along one axis.
fn boundary_t(pos: f32, cell: i32, step: i32, t_delta: f32) -> f32 {
    if step > 0 {
        (cell as f32 + 1.0 - pos) * t_delta
    } else if step < 0 {
        (pos - cell as f32) * t_delta
    } else {
        f32::INFINITY
    }
}

/// Where the segment starts sampling this chunk: the start itself when it
/// lies inside, otherwise the nearest boundary crossing found by testing
/// each face slab. `None` when the segment misses the chunk entirely.
fn chunk_entry(chunk: &Chunk, start: Vec3, end: Vec3) -> Option<Vec3> {
    let lo = chunk.origin.to_vec3();
    let hi = lo + Vec3::splat(chunk.side() as f32);
    let inside = |p: Vec3| {
        p.x >= lo.x && p.x <= hi.x && p.y >= lo.y && p.y <= hi.y && p.z >= lo.z && p.z <= hi.z
    };
    if inside(start) {
        return Some(start);
    }
    let expected = if inside(end) { 1 } else { 2 };

    let delta = end - start;
    let mut points: Vec<Vec3> = Vec::new();
    for dir in Direction::ALL {
        let (plane, along) = match dir {
            Direction::NegX => (lo.x, delta.x),
            Direction::PosX => (hi.x, delta.x),
            Direction::NegY => (lo.y, delta.y),
            Direction::PosY => (hi.y, delta.y),
            Direction::NegZ => (lo.z, delta.z),
            Direction::PosZ => (hi.z, delta.z),
        };
        if along.abs() < EPSILON {
            continue;
        }
        let offset = match dir {
            Direction::NegX | Direction::PosX => plane - start.x,
            Direction::NegY | Direction::PosY => plane - start.y,
            Direction::NegZ | Direction::PosZ => plane - start.z,
        };
        let ratio = offset / along;
        if ratio <= 0.0 || ratio > 1.0 {
            continue;
        }
        let p = start + delta * ratio;
        if inside(p) {
            points.push(p);
            if points.len() == expected {
                break;
            }
        }
    }
    points
        .into_iter()
        .min_by(|a, b| a.distance_squared(start).total_cmp(&b.distance_squared(start)))
}

/// DDA the cells between `entry` and `end`, starting fresh inside this
/// chunk. Cells outside the chunk are skipped, and the walk ends once it
/// has left the chunk behind.
fn walk_chunk<F>(
    data: &VolumeData,
    chunk: &Chunk,
    ray_start: Vec3,
    entry: Vec3,
    end: Vec3,
    filter: &F,
) -> Option<RayHit>
where
    F: Fn(StateId) -> bool,
{
    let lo = chunk.origin.to_vec3();
    let s = entry - lo;
    let e = end - lo;
    let dir = e - s;

    let mut cell = (
        s.x.floor() as i32,
        s.y.floor() as i32,
        s.z.floor() as i32,
    );
    let last = (
        e.x.floor() as i32,
        e.y.floor() as i32,
        e.z.floor() as i32,
    );
    let steps = (last.0 - cell.0).abs() as i64
        + (last.1 - cell.1).abs() as i64
        + (last.2 - cell.2).abs() as i64;

    let step = (sign(dir.x), sign(dir.y), sign(dir.z));
    let t_delta = (inv_abs(dir.x), inv_abs(dir.y), inv_abs(dir.z));
    let mut t_max = (
        boundary_t(s.x, cell.0, step.0, t_delta.0),
        boundary_t(s.y, cell.1, step.1, t_delta.1),
        boundary_t(s.z, cell.2, step.2, t_delta.2),
    );

    let mut normal: Option<Direction> = None;
    let mut entered = false;
    for i in 0..=steps {
        let local = Coord::new(cell.0, cell.1, cell.2);
        if chunk.in_bounds_local(local) {
            entered = true;
            if let Some(id) = chunk.cell(local) {
                if let Some(run) = data.runs.get(id) {
                    let state = run.shape.state;
                    if filter(state) {
                        let coord = Coord::new(
                            chunk.origin.x + cell.0,
                            chunk.origin.y + cell.1,
                            chunk.origin.z + cell.2,
                        );
                        return Some(make_hit(coord, state, normal, ray_start, end));
                    }
                }
            }
        } else if entered {
            // Chunks are convex; once left, the segment never returns.
            break;
        }
        if i == steps {
            break;
        }
        if t_max.0 <= t_max.1 && t_max.0 <= t_max.2 {
            cell.0 += step.0;
            t_max.0 += t_delta.0;
            normal = Some(if step.0 > 0 {
                Direction::NegX
            } else {
                Direction::PosX
            });
        } else if t_max.1 <= t_max.2 {
            cell.1 += step.1;
            t_max.1 += t_delta.1;
            normal = Some(if step.1 > 0 {
                Direction::NegY
            } else {
                Direction::PosY
            });
        } else {
            cell.2 += step.2;
            t_max.2 += t_delta.2;
            normal = Some(if step.2 > 0 {
                Direction::NegZ
            } else {
                Direction::PosZ
            });
        }
    }
    None
}

/// Project the hit back onto the face plane for an exact position. A cast
/// that starts inside the cell has no crossing face, so the normal falls
/// back to the dominant axis looking back along the ray.
fn make_hit(
    coord: Coord,
    state: StateId,
    normal: Option<Direction>,
    ray_start: Vec3,
    ray_end: Vec3,
) -> RayHit {
    let delta = ray_end - ray_start;
    let normal = normal.unwrap_or_else(|| Direction::from_vector(-delta.normalize_or_zero()));
    let n = normal.vector();
    let plane_point = coord.center() + n * 0.5;
    let denom = delta.dot(n);
    let position = if denom.abs() > EPSILON {
        let t = (plane_point - ray_start).dot(n) / denom;
        ray_start + delta * t
    } else {
        plane_point
    };
    RayHit {
        coord,
        state,
        normal,
        position,
        distance: position.distance(ray_start),
    }
}
