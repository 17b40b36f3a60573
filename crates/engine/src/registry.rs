//! Registry of live volumes.
//!
//! Owns the shared rebuild worker and answers queries that span every
//! registered volume.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use glam::Vec3;

use crate::regen::RegenQueue;
use crate::volume::Volume;
use crate::volume::raycast::RayHit;

/// Handle to a registered volume. Never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(pub u64);

pub struct VolumeRegistry {
    volumes: DashMap<VolumeId, Arc<Volume>>,
    next_id: AtomicU64,
    queue: RegenQueue,
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self {
            volumes: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue: RegenQueue::new(),
        }
    }

    pub fn insert(&self, volume: Arc<Volume>) -> VolumeId {
        let id = VolumeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.volumes.insert(id, volume);
        id
    }

    pub fn get(&self, id: VolumeId) -> Option<Arc<Volume>> {
        self.volumes.get(&id).map(|entry| entry.clone())
    }

    /// Drop a volume from the registry. Rebuilds already queued for it
    /// still run; the worker holds its own handle.
    pub fn remove(&self, id: VolumeId) -> Option<Arc<Volume>> {
        self.volumes.remove(&id).map(|(_, volume)| volume)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Queue a background rebuild for `id`; false when the id is unknown.
    pub fn regenerate(&self, id: VolumeId) -> bool {
        match self.get(id) {
            Some(volume) => {
                self.queue.enqueue(volume);
                true
            }
            None => false,
        }
    }

    /// Raycast the segment against every registered volume and keep the
    /// nearest hit. Each volume's segment is clipped to the best distance
    /// found so far, so later volumes only search the remaining prefix.
    pub fn raycast_all(&self, start: Vec3, end: Vec3) -> Option<(VolumeId, RayHit)> {
        let full = start.distance(end);
        if full <= f32::EPSILON {
            return None;
        }
        let dir = (end - start) / full;

        let mut best: Option<(VolumeId, RayHit)> = None;
        for entry in self.volumes.iter() {
            let limit = best.as_ref().map_or(full, |(_, hit)| hit.distance);
            let clipped = start + dir * limit;
            if let Some(hit) = entry.value().raycast(start, clipped) {
                if best.as_ref().is_none_or(|(_, b)| hit.distance < b.distance) {
                    best = Some((*entry.key(), hit));
                }
            }
        }
        best
    }
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Coord;
    use crate::state::{CellState, StateId, StateTable};
    use crate::volume::VolumeConfig;

    fn volume_with_cell(c: Coord) -> Arc<Volume> {
        let mut table = StateTable::new();
        table.register(CellState::new("rock"));
        let volume = Volume::new(table.into_shared(), VolumeConfig::default());
        volume.fill(c, StateId(1));
        volume.regenerate_now();
        Arc::new(volume)
    }

    #[test]
    fn ids_are_distinct_and_stable() {
        let registry = VolumeRegistry::new();
        let a = registry.insert(volume_with_cell(Coord::new(0, 0, 0)));
        let b = registry.insert(volume_with_cell(Coord::new(1, 0, 0)));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.get(a).is_some());
        assert!(registry.remove(a).is_some());
        assert!(registry.get(a).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get(b).is_some());
    }

    #[test]
    fn regenerate_rejects_unknown_ids() {
        let registry = VolumeRegistry::new();
        let id = registry.insert(volume_with_cell(Coord::new(0, 0, 0)));
        assert!(registry.regenerate(id));
        assert!(!registry.regenerate(VolumeId(999)));
    }

    #[test]
    fn raycast_all_returns_the_nearest_hit() {
        let registry = VolumeRegistry::new();
        let far = registry.insert(volume_with_cell(Coord::new(5, 0, 0)));
        let near = registry.insert(volume_with_cell(Coord::new(2, 0, 0)));

        let start = Vec3::new(-3.5, 0.5, 0.5);
        let end = Vec3::new(8.0, 0.5, 0.5);
        let (id, hit) = registry.raycast_all(start, end).unwrap();
        assert_eq!(id, near);
        assert_eq!(hit.coord, Coord::new(2, 0, 0));
        assert!((hit.distance - 5.5).abs() < 1e-4);

        registry.remove(near);
        let (id, hit) = registry.raycast_all(start, end).unwrap();
        assert_eq!(id, far);
        assert_eq!(hit.coord, Coord::new(5, 0, 0));
    }

    #[test]
    fn raycast_all_misses_cleanly() {
        let registry = VolumeRegistry::new();
        registry.insert(volume_with_cell(Coord::new(5, 5, 5)));
        let start = Vec3::new(-3.0, 0.5, 0.5);
        assert!(registry.raycast_all(start, Vec3::new(3.0, 0.5, 0.5)).is_none());
        assert!(registry.raycast_all(start, start).is_none());
    }
}
