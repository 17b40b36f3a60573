//! Volume serialization.
//!
//! A volume flattens to a stream of 32-bit words: a run count, five words
//! per run (origin, packed extents and state, face mask), then the
//! adjacency edges as bit-packed run-index pairs. Words are written out
//! big-endian. Extents and states are packed one byte each, so chunk
//! sides beyond 255 cells are not representable.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::space::{Coord, FaceMask};
use crate::state::StateId;

use super::run::{Run, RunId, RunShape};
use super::{Volume, VolumeData, adjacency, apply_changes, simplify};

// ── Errors ───────────────────────────────────────────────────────────────────

/// Reasons a blob cannot be restored at all. Recoverable damage (bad
/// records, bad edges) is skipped or rebuilt instead.
#[derive(Debug)]
pub enum DecodeError {
    /// Byte length is not a whole number of words.
    RaggedLength(usize),
    /// The stream ends before the declared run records.
    Truncated { declared: usize, words: usize },
    Base64(base64::DecodeError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::RaggedLength(len) => {
                write!(f, "blob length {len} is not a whole number of words")
            }
            DecodeError::Truncated { declared, words } => {
                write!(f, "blob declares {declared} runs but holds {words} words")
            }
            DecodeError::Base64(err) => write!(f, "invalid base64: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Base64(err) => Some(err),
            _ => None,
        }
    }
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        DecodeError::Base64(err)
    }
}

// ── Bit-packing helpers ──────────────────────────────────────────────────────

/// Bits needed for one run index: ceil(log2(run_count)), minimum 1.
fn bits_per_entry(run_count: usize) -> usize {
    let raw = if run_count <= 1 {
        0
    } else {
        (usize::BITS - (run_count - 1).leading_zeros()) as usize
    };
    raw.max(1)
}

/// Pack indices into words; entries never span two words.
fn pack_indices(indices: &[u32], run_count: usize) -> Vec<u32> {
    let bits = bits_per_entry(run_count);
    let per_word = 32 / bits;
    let mask = (1u64 << bits) - 1;
    let mut words = vec![0u32; indices.len().div_ceil(per_word)];
    for (i, &idx) in indices.iter().enumerate() {
        let word = i / per_word;
        let offset = (i % per_word) * bits;
        words[word] |= ((idx as u64 & mask) as u32) << offset;
    }
    words
}

/// Unpack `count` indices packed by [`pack_indices`].
fn unpack_indices(data: &[u32], count: usize, run_count: usize) -> Vec<u32> {
    let bits = bits_per_entry(run_count);
    let per_word = 32 / bits;
    let mask = (1u64 << bits) - 1;
    let mut indices = vec![0u32; count];
    for (i, idx) in indices.iter_mut().enumerate() {
        let word = i / per_word;
        let offset = (i % per_word) * bits;
        if word < data.len() {
            *idx = ((data[word] as u64 >> offset) & mask) as u32;
        }
    }
    indices
}

fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn to_words(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::RaggedLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

// ── Encode ───────────────────────────────────────────────────────────────────

/// Serialize a volume to its word-stream bytes.
///
/// Compacts first: two merge sweeps over every active run (pending edits
/// included) and a reconcile step, so the blob holds the smallest run set
/// this volume can express.
pub fn encode(volume: &Volume) -> Vec<u8> {
    let start = Instant::now();
    let mut data = volume.write_data();

    let order: Vec<RunId> = data
        .runs
        .iter()
        .filter(|(_, run)| run.active)
        .map(|(id, _)| id)
        .collect();
    let mut modified = vec![false; order.len()];
    simplify::pass(&mut data, &order, &mut modified);
    simplify::pass(&mut data, &order, &mut modified);
    apply_changes(&mut data, &order, &modified);

    let order = data.listed_runs();
    let index: HashMap<RunId, u32> = order
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i as u32))
        .collect();

    let mut words: Vec<u32> = Vec::with_capacity(1 + order.len() * 5);
    words.push(order.len() as u32);
    for &id in &order {
        let Some(run) = data.runs.get(id) else { continue };
        let shape = run.shape;
        words.push(shape.origin.x as u32);
        words.push(shape.origin.y as u32);
        words.push(shape.origin.z as u32);
        words.push(
            shape.width as u32
                | (shape.height as u32) << 8
                | (shape.depth as u32) << 16
                | (shape.state.0 as u32) << 24,
        );
        words.push(run.faces.0 as u32);
    }

    let mut seen: HashSet<(u32, u32)> = HashSet::new();
    let mut pairs: Vec<u32> = Vec::new();
    for &id in &order {
        let Some(run) = data.runs.get(id) else { continue };
        let Some(&a) = index.get(&id) else { continue };
        for n in &run.neighbors {
            let Some(&b) = index.get(n) else { continue };
            let key = if a < b { (a, b) } else { (b, a) };
            if seen.insert(key) {
                pairs.push(key.0);
                pairs.push(key.1);
            }
        }
    }
    words.push((pairs.len() / 2) as u32);
    words.extend(pack_indices(&pairs, order.len()));

    tracing::debug!(
        "Volume encoded: {} runs, {} edges, {} words ({:?})",
        order.len(),
        pairs.len() / 2,
        words.len(),
        start.elapsed()
    );
    to_bytes(&words)
}

/// [`encode`], wrapped in standard base64 for text transports.
pub fn encode_base64(volume: &Volume) -> String {
    STANDARD.encode(encode(volume))
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Restore a blob into `volume`, which is expected to be empty.
///
/// Damaged records (empty, unknown or zero-extent states) are skipped
/// with a warning. Records that no longer fit a single chunk under this
/// volume's layout are split, which costs their stored adjacency: any
/// split, missing edge data, or out-of-range edge index triggers a full
/// adjacency rebuild. Returns the number of runs restored.
pub fn decode(volume: &Volume, bytes: &[u8]) -> Result<usize, DecodeError> {
    let start = Instant::now();
    let words = to_words(bytes)?;
    let declared = words.first().copied().unwrap_or(0) as usize;
    if words.len() < 1 + declared * 5 + 1 {
        return Err(DecodeError::Truncated {
            declared,
            words: words.len(),
        });
    }

    let states = volume.state_table().clone();
    let mut data = volume.write_data();
    let mut record_ids: Vec<Option<RunId>> = Vec::with_capacity(declared);
    let mut restored = 0usize;
    let mut needs_rebuild = false;

    for r in 0..declared {
        let base = 1 + r * 5;
        let origin = Coord::new(
            words[base] as i32,
            words[base + 1] as i32,
            words[base + 2] as i32,
        );
        let packed = words[base + 3];
        let shape = RunShape::new(
            origin,
            (packed & 0xff) as i32,
            ((packed >> 8) & 0xff) as i32,
            ((packed >> 16) & 0xff) as i32,
            StateId((packed >> 24) as u8),
        );
        let faces = FaceMask((words[base + 4] & 0x3f) as u8);

        if shape.state.is_empty() || !states.contains(shape.state) {
            tracing::warn!("Skipping record {} with unusable state {}", r, shape.state.0);
            record_ids.push(None);
            continue;
        }
        if shape.width == 0 || shape.height == 0 || shape.depth == 0 {
            tracing::warn!("Skipping record {} with a zero extent", r);
            record_ids.push(None);
            continue;
        }

        let (last, pieces) = place_decoded(&mut data, shape, faces);
        if pieces > 1 {
            needs_rebuild = true;
        }
        restored += pieces;
        record_ids.push(last);
    }

    let edge_base = 1 + declared * 5;
    let edge_count = words[edge_base] as usize;
    let bits = bits_per_entry(declared);
    let per_word = 32 / bits;
    let needed = (edge_count * 2).div_ceil(per_word);
    let available = words.len() - edge_base - 1;
    if available < needed {
        tracing::warn!(
            "Edge data truncated ({} words, need {}); rebuilding adjacency",
            available,
            needed
        );
        needs_rebuild = true;
    }

    if !needs_rebuild {
        let indices = unpack_indices(&words[edge_base + 1..], edge_count * 2, declared);
        for pair in indices.chunks(2) {
            let (a, b) = (pair[0] as usize, pair[1] as usize);
            if a >= declared || b >= declared {
                tracing::warn!("Edge index out of range ({a}, {b}); rebuilding adjacency");
                needs_rebuild = true;
                break;
            }
            if a == b {
                continue;
            }
            if let (Some(ia), Some(ib)) = (record_ids[a], record_ids[b]) {
                if let Some(run) = data.runs.get_mut(ia) {
                    run.neighbors.push(ib);
                }
                if let Some(run) = data.runs.get_mut(ib) {
                    run.neighbors.push(ia);
                }
            }
        }
    }

    if needs_rebuild {
        adjacency::rebuild_all(&mut data);
    }
    volume.flush_dirty(&mut data);
    drop(data);

    tracing::debug!(
        "Volume decoded: {} of {} records restored ({:?})",
        restored,
        declared,
        start.elapsed()
    );
    Ok(restored)
}

/// [`decode`] from standard base64 text.
pub fn decode_base64(volume: &Volume, text: &str) -> Result<usize, DecodeError> {
    let bytes = STANDARD.decode(text)?;
    decode(volume, &bytes)
}

/// Stamp a decoded shape directly into chunk lists, already listed and
/// carrying its stored face mask. Splits at chunk boundaries; the record
/// maps to the last piece.
fn place_decoded(
    data: &mut VolumeData,
    shape: RunShape,
    faces: FaceMask,
) -> (Option<RunId>, usize) {
    let end = shape.end();
    data.grow_to_include(shape.origin);
    data.grow_to_include(end.offset(-1, -1, -1));
    let side = data.side;
    let first = Coord::new(
        data.min.x + ((shape.origin.x - data.min.x) / side) * side,
        data.min.y + ((shape.origin.y - data.min.y) / side) * side,
        data.min.z + ((shape.origin.z - data.min.z) / side) * side,
    );

    let mut last = None;
    let mut pieces = 0usize;
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
                    let piece = RunShape::new(
                        Coord::new(bx, by, bz),
                        ex - bx,
                        ey - by,
                        ez - bz,
                        shape.state,
                    );
                    let mut run = Run::new(piece);
                    run.listed = true;
                    run.faces = faces;
                    let id = data.runs.insert(run);
                    let chunk = data.ensure_chunk(piece.origin);
                    chunk.stamp(&piece, Some(id));
                    chunk.runs.push(id);
                    data.mark_dirty(&piece);
                    last = Some(id);
                    pieces += 1;
                }
                cz += side;
            }
            cy += side;
        }
        cx += side;
    }
    (last, pieces)
}
