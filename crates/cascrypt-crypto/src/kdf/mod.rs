//! Argon2 (RFC 9106, version 0x13) password hashing.
//!
//! All three variants are implemented here rather than through a wrapper so
//! the engine can size the output to the whole key schedule, take the
//! optional secret K, and report allocation failure instead of aborting.

mod block;
mod hash;
mod memory;

use zeroize::Zeroizing;

use cascrypt_core::{EngineError, EngineResult, KdfSpec};

use block::{Block, BLOCK_SIZE};
use hash::HashInputs;
use memory::{Geometry, Matrix};

/// Smallest tag Argon2 will produce
pub const MIN_OUTPUT_LEN: usize = 4;

/// Key material produced by the KDF.
///
/// Zeroized on drop to prevent secrets lingering in memory.
pub struct DerivedKeyMaterial {
    bytes: Zeroizing<Vec<u8>>,
}

impl DerivedKeyMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for DerivedKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeyMaterial")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive `out_len` bytes from `password` and `salt`.
///
/// `secret` is Argon2's optional key K; pass an empty slice when unused.
/// Lanes are filled concurrently on the rayon pool.
pub fn derive(
    spec: &KdfSpec,
    password: &[u8],
    salt: &[u8],
    secret: &[u8],
    out_len: usize,
) -> EngineResult<DerivedKeyMaterial> {
    derive_with_associated_data(spec, password, salt, secret, &[], out_len)
}

pub(crate) fn derive_with_associated_data(
    spec: &KdfSpec,
    password: &[u8],
    salt: &[u8],
    secret: &[u8],
    associated_data: &[u8],
    out_len: usize,
) -> EngineResult<DerivedKeyMaterial> {
    spec.validate()?;
    if out_len < MIN_OUTPUT_LEN {
        return Err(EngineError::InvalidParameter(format!(
            "KDF output must be at least {MIN_OUTPUT_LEN} bytes, requested {out_len}"
        )));
    }
    let tag_len = u32::try_from(out_len)
        .map_err(|_| EngineError::InvalidParameter(format!("KDF output too long: {out_len} bytes")))?;

    let geometry = Geometry::new(spec);
    tracing::debug!(
        kdf = %spec,
        blocks = geometry.block_count(),
        out_len,
        "deriving key material"
    );

    let inputs = HashInputs {
        password,
        salt,
        secret,
        associated_data,
    };
    let h0 = hash::initial_hash(spec, &inputs, tag_len)?;

    let mut matrix = Matrix::allocate(geometry)?;
    seed_lanes(&mut matrix, h0.as_slice())?;
    matrix.fill();

    let mut last = Block::ZERO;
    for lane in 0..geometry.lanes {
        last ^= matrix.block(lane, geometry.lane_length - 1);
    }
    let mut last_bytes = Zeroizing::new([0u8; BLOCK_SIZE]);
    last.write_bytes(last_bytes.as_mut_slice());
    zeroize::Zeroize::zeroize(&mut last);

    let mut bytes = Zeroizing::new(vec![0u8; out_len]);
    hash::variable_hash(&[last_bytes.as_slice()], &mut bytes)?;
    Ok(DerivedKeyMaterial { bytes })
}

/// B[lane][0] = H'(H0 || 0 || lane), B[lane][1] = H'(H0 || 1 || lane)
fn seed_lanes(matrix: &mut Matrix, h0: &[u8]) -> EngineResult<()> {
    let lanes = matrix.geometry().lanes;
    let mut buf = Zeroizing::new([0u8; BLOCK_SIZE]);
    for lane in 0..lanes {
        for index in 0..2u32 {
            hash::variable_hash(
                &[h0, &index.to_le_bytes(), &lane.to_le_bytes()],
                buf.as_mut_slice(),
            )?;
            *matrix.block_mut(lane, index) = Block::from_bytes(buf.as_slice());
        }
    }
    Ok(())
}
