//! Sparse box-run voxel volumes.
//!
//! A [`volume::Volume`] stores filled space as axis-aligned runs stamped
//! into fixed-size chunks. Mutation, merge compaction, island detection,
//! raycasting and serialization all work on that run structure; the
//! [`registry::VolumeRegistry`] owns the shared background rebuild worker
//! that keeps volumes compacted.

pub mod events;
pub mod regen;
pub mod registry;
pub mod space;
pub mod state;
pub mod volume;
