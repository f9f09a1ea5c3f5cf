//! The Argon2 memory matrix and the per-segment fill loop.
//!
//! The matrix is stored slice-major:
//! ```text
//! [slice 0: lane 0 segment | lane 1 segment | ...][slice 1: ...][slice 2][slice 3]
//! ```
//! While slice `s` is being filled, every lane owns its segment of slice `s`
//! exclusively (`&mut`), and the other three slices are shared read-only.
//! Argon2 never lets one lane reference another lane's in-progress segment,
//! so the lanes of one slice run as independent rayon tasks; the join at the
//! end of each slice is the synchronization barrier.

use rayon::prelude::*;
use zeroize::Zeroizing;

use cascrypt_core::{EngineError, EngineResult, KdfAlgorithm, KdfSpec};

use super::block::{Block, BLOCK_WORDS};

/// Slices (synchronization points) per pass
pub(crate) const SYNC_POINTS: u32 = 4;

/// Addresses produced by one data-independent address block
const ADDRESSES_PER_BLOCK: u32 = BLOCK_WORDS as u32;

/// Shape of the matrix derived from a validated `KdfSpec`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub algorithm: KdfAlgorithm,
    pub passes: u32,
    pub lanes: u32,
    pub lane_length: u32,
    pub segment_length: u32,
}

impl Geometry {
    pub(crate) fn new(spec: &KdfSpec) -> Self {
        // m' = 4p * floor(m / 4p); validation guarantees m >= 8p
        let segment_length = spec.memory_cost_kib / (SYNC_POINTS * spec.parallelism);
        Self {
            algorithm: spec.algorithm,
            passes: spec.time_cost,
            lanes: spec.parallelism,
            lane_length: segment_length * SYNC_POINTS,
            segment_length,
        }
    }

    pub(crate) fn block_count(&self) -> usize {
        self.lane_length as usize * self.lanes as usize
    }

    fn slice_len(&self) -> usize {
        self.segment_length as usize * self.lanes as usize
    }

    /// Flat index of block `index` (0..lane_length) of `lane`.
    pub(crate) fn flat(&self, lane: u32, index: u32) -> usize {
        let slice = (index / self.segment_length) as usize;
        let offset = (index % self.segment_length) as usize;
        slice * self.slice_len() + lane as usize * self.segment_length as usize + offset
    }
}

#[derive(Debug, Clone, Copy)]
struct Position {
    pass: u32,
    lane: u32,
    slice: u32,
}

/// Memory matrix owned by one KDF call; zeroed when dropped.
pub(crate) struct Matrix {
    geometry: Geometry,
    blocks: Zeroizing<Vec<Block>>,
}

impl Matrix {
    pub(crate) fn allocate(geometry: Geometry) -> EngineResult<Self> {
        let count = geometry.block_count();
        let mut blocks: Vec<Block> = Vec::new();
        blocks.try_reserve_exact(count).map_err(|e| {
            EngineError::ResourceExhausted(format!("cannot allocate {count} KiB of Argon2 memory: {e}"))
        })?;
        blocks.resize(count, Block::ZERO);
        Ok(Self {
            geometry,
            blocks: Zeroizing::new(blocks),
        })
    }

    pub(crate) fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub(crate) fn block_mut(&mut self, lane: u32, index: u32) -> &mut Block {
        let i = self.geometry.flat(lane, index);
        &mut self.blocks[i]
    }

    pub(crate) fn block(&self, lane: u32, index: u32) -> &Block {
        &self.blocks[self.geometry.flat(lane, index)]
    }

    /// Run every pass. Blocks 0 and 1 of each lane must already be seeded.
    pub(crate) fn fill(&mut self) {
        let geometry = self.geometry;
        let slice_len = geometry.slice_len();

        for pass in 0..geometry.passes {
            for slice in 0..SYNC_POINTS {
                let (done, rest) = self.blocks.split_at_mut(slice as usize * slice_len);
                let (current, pending) = rest.split_at_mut(slice_len);
                let view = SharedSlices {
                    geometry,
                    slice,
                    done,
                    pending,
                };

                current
                    .par_chunks_mut(geometry.segment_length as usize)
                    .enumerate()
                    .for_each(|(lane, segment)| {
                        let position = Position {
                            pass,
                            lane: lane as u32,
                            slice,
                        };
                        fill_segment(&view, position, segment);
                    });
            }
        }
    }
}

/// Read-only view of every slice except the one being filled.
struct SharedSlices<'a> {
    geometry: Geometry,
    slice: u32,
    done: &'a [Block],
    pending: &'a [Block],
}

impl SharedSlices<'_> {
    fn block(&self, lane: u32, index: u32) -> &Block {
        let g = &self.geometry;
        let slice = index / g.segment_length;
        let in_slice = lane as usize * g.segment_length as usize
            + (index % g.segment_length) as usize;

        if slice < self.slice {
            &self.done[slice as usize * g.slice_len() + in_slice]
        } else {
            debug_assert!(slice > self.slice, "current slice is not shared");
            &self.pending[(slice - self.slice - 1) as usize * g.slice_len() + in_slice]
        }
    }
}

/// Generator of pseudo-random reference indices for data-independent
/// addressing: each address block is G(0, G(0, input)) with a running counter.
struct AddressGenerator {
    input: Block,
    addresses: Block,
}

impl AddressGenerator {
    fn new(geometry: &Geometry, position: Position) -> Self {
        let mut input = Block::ZERO;
        input.0[0] = u64::from(position.pass);
        input.0[1] = u64::from(position.lane);
        input.0[2] = u64::from(position.slice);
        input.0[3] = geometry.block_count() as u64;
        input.0[4] = u64::from(geometry.passes);
        input.0[5] = u64::from(geometry.algorithm.type_code());
        Self {
            input,
            addresses: Block::ZERO,
        }
    }

    fn address(&mut self, index: u32) -> u64 {
        if index % ADDRESSES_PER_BLOCK == 0 || self.input.0[6] == 0 {
            self.input.0[6] += 1;
            let tmp = Block::compress(&Block::ZERO, &self.input);
            self.addresses = Block::compress(&Block::ZERO, &tmp);
        }
        self.addresses.0[(index % ADDRESSES_PER_BLOCK) as usize]
    }
}

fn data_independent(algorithm: KdfAlgorithm, position: Position) -> bool {
    match algorithm {
        KdfAlgorithm::Argon2i => true,
        KdfAlgorithm::Argon2d => false,
        KdfAlgorithm::Argon2id => position.pass == 0 && position.slice < SYNC_POINTS / 2,
    }
}

fn fill_segment(view: &SharedSlices<'_>, position: Position, segment: &mut [Block]) {
    let g = &view.geometry;
    let mut addresses =
        data_independent(g.algorithm, position).then(|| AddressGenerator::new(g, position));

    // The first two blocks of every lane are seeded from H0
    let start = if position.pass == 0 && position.slice == 0 { 2 } else { 0 };

    for i in start..g.segment_length {
        let (filled, rest) = segment.split_at_mut(i as usize);
        let current = &mut rest[0];

        let prev: &Block = if i == 0 {
            let lane_index = if position.slice == 0 {
                g.lane_length - 1
            } else {
                position.slice * g.segment_length - 1
            };
            view.block(position.lane, lane_index)
        } else {
            &filled[i as usize - 1]
        };

        let pseudo_rand = match addresses.as_mut() {
            Some(generator) => generator.address(i),
            None => prev.0[0],
        };

        let ref_lane = if position.pass == 0 && position.slice == 0 {
            position.lane
        } else {
            ((pseudo_rand >> 32) % u64::from(g.lanes)) as u32
        };
        let same_lane = ref_lane == position.lane;
        let ref_index = reference_index(g, position, i, pseudo_rand as u32, same_lane);

        let reference: &Block = if same_lane && ref_index / g.segment_length == position.slice {
            &filled[(ref_index % g.segment_length) as usize]
        } else {
            view.block(ref_lane, ref_index)
        };

        let next = Block::compress(prev, reference);
        if position.pass == 0 {
            *current = next;
        } else {
            *current ^= &next;
        }
    }
}

/// Map a 32-bit pseudo-random value onto the blocks `index` may reference.
fn reference_index(
    g: &Geometry,
    position: Position,
    index: u32,
    pseudo_rand: u32,
    same_lane: bool,
) -> u32 {
    let seg = g.segment_length;
    let area_size = if position.pass == 0 {
        if position.slice == 0 {
            index - 1
        } else if same_lane {
            position.slice * seg + index - 1
        } else if index == 0 {
            position.slice * seg - 1
        } else {
            position.slice * seg
        }
    } else if same_lane {
        g.lane_length - seg + index - 1
    } else if index == 0 {
        g.lane_length - seg - 1
    } else {
        g.lane_length - seg
    };

    let area_size = u64::from(area_size);
    let x = (u64::from(pseudo_rand) * u64::from(pseudo_rand)) >> 32;
    let relative = area_size - 1 - ((area_size * x) >> 32);

    let start = if position.pass == 0 || position.slice == SYNC_POINTS - 1 {
        0
    } else {
        u64::from((position.slice + 1) * seg)
    };

    ((start + relative) % u64::from(g.lane_length)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(memory_cost_kib: u32, parallelism: u32) -> Geometry {
        Geometry::new(&KdfSpec::new(KdfAlgorithm::Argon2d, 1, memory_cost_kib, parallelism).unwrap())
    }

    #[test]
    fn test_geometry_rounds_down_to_sync_multiple() {
        let g = geometry(274261, 2);
        assert_eq!(g.segment_length, 274261 / 8);
        assert_eq!(g.lane_length, g.segment_length * 4);
        assert_eq!(g.block_count(), 8 * (274261 / 8) as usize);
    }

    #[test]
    fn test_flat_index_is_a_bijection() {
        let g = geometry(96, 3);
        let mut seen = vec![false; g.block_count()];
        for lane in 0..g.lanes {
            for index in 0..g.lane_length {
                let flat = g.flat(lane, index);
                assert!(!seen[flat], "lane {lane} index {index} collides");
                seen[flat] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_reference_index_stays_out_of_current_segment() {
        let g = geometry(256, 4);
        for pass in 0..2 {
            for slice in 0..SYNC_POINTS {
                for lane in 0..g.lanes {
                    let position = Position { pass, lane, slice };
                    let start = if pass == 0 && slice == 0 { 2 } else { 0 };
                    for i in start..g.segment_length {
                        for rand in [0u32, 1, 0x8000_0000, u32::MAX] {
                            let own = reference_index(&g, position, i, rand, true);
                            let own_offset = slice * g.segment_length + i;
                            if own / g.segment_length == slice {
                                assert!(own + 1 < own_offset, "must precede the previous block");
                            }
                            if pass == 0 {
                                assert!(own < own_offset);
                            }

                            if pass == 0 && slice == 0 {
                                continue;
                            }
                            let other = reference_index(&g, position, i, rand, false);
                            assert_ne!(
                                other / g.segment_length,
                                slice,
                                "other lanes' current segment is off limits"
                            );
                        }
                    }
                }
            }
        }
    }
}
