//! BLAKE2b-based hashing used by Argon2: the pre-hash H0 and the
//! variable-length hash H'.

use blake2::digest::{Digest, Update, VariableOutput};
use blake2::{Blake2b512, Blake2bVar};
use zeroize::Zeroizing;

use cascrypt_core::{EngineError, EngineResult, KdfSpec};

/// Argon2 version 1.3
pub(crate) const ARGON2_VERSION: u32 = 0x13;

/// BLAKE2b maximum digest size
const BLAKE2B_OUT: usize = 64;

/// Inputs hashed into H0 besides the cost parameters.
pub(crate) struct HashInputs<'a> {
    pub password: &'a [u8],
    pub salt: &'a [u8],
    pub secret: &'a [u8],
    pub associated_data: &'a [u8],
}

/// H0 = BLAKE2b-512(p, T, m, t, v, y, len(P), P, len(S), S, len(K), K, len(X), X)
pub(crate) fn initial_hash(
    spec: &KdfSpec,
    inputs: &HashInputs<'_>,
    out_len: u32,
) -> EngineResult<Zeroizing<[u8; BLAKE2B_OUT]>> {
    let mut h = Blake2b512::new();
    for word in [
        spec.parallelism,
        out_len,
        spec.memory_cost_kib,
        spec.time_cost,
        ARGON2_VERSION,
        spec.algorithm.type_code(),
    ] {
        Digest::update(&mut h, word.to_le_bytes());
    }
    for field in [
        inputs.password,
        inputs.salt,
        inputs.secret,
        inputs.associated_data,
    ] {
        Digest::update(&mut h, length_prefix(field)?);
        Digest::update(&mut h, field);
    }

    let mut out = Zeroizing::new([0u8; BLAKE2B_OUT]);
    out.copy_from_slice(&h.finalize());
    Ok(out)
}

/// H'^T over the concatenation of `parts`, filling all of `out`.
pub(crate) fn variable_hash(parts: &[&[u8]], out: &mut [u8]) -> EngineResult<()> {
    let prefix = length_prefix(out)?;

    if out.len() <= BLAKE2B_OUT {
        let mut h = blake2b_var(out.len())?;
        Update::update(&mut h, &prefix);
        for part in parts {
            Update::update(&mut h, part);
        }
        return finalize_var(h, out);
    }

    // V1 = H(T || X); emit 32 bytes of every V_i, chaining V_{i+1} = H(V_i),
    // then the last 32 < n <= 64 bytes with a digest sized to fit.
    let mut h = Blake2b512::new();
    Digest::update(&mut h, prefix);
    for part in parts {
        Digest::update(&mut h, part);
    }
    let mut v = Zeroizing::new([0u8; BLAKE2B_OUT]);
    v.copy_from_slice(&h.finalize());

    let half = BLAKE2B_OUT / 2;
    out[..half].copy_from_slice(&v[..half]);
    let mut pos = half;

    while out.len() - pos > BLAKE2B_OUT {
        let next = Blake2b512::digest(v.as_slice());
        v.copy_from_slice(&next);
        out[pos..pos + half].copy_from_slice(&v[..half]);
        pos += half;
    }

    let mut h = blake2b_var(out.len() - pos)?;
    Update::update(&mut h, v.as_slice());
    finalize_var(h, &mut out[pos..])
}

fn length_prefix(data: &[u8]) -> EngineResult<[u8; 4]> {
    u32::try_from(data.len())
        .map(u32::to_le_bytes)
        .map_err(|_| EngineError::InvalidParameter(format!("KDF input too long: {} bytes", data.len())))
}

fn blake2b_var(len: usize) -> EngineResult<Blake2bVar> {
    Blake2bVar::new(len)
        .map_err(|_| EngineError::InvalidParameter(format!("invalid BLAKE2b output size {len}")))
}

fn finalize_var(h: Blake2bVar, out: &mut [u8]) -> EngineResult<()> {
    h.finalize_variable(out)
        .map_err(|_| EngineError::InvalidParameter(format!("invalid BLAKE2b output size {}", out.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_variable_hash_is_prefixed_blake2b() {
        let mut out = [0u8; 32];
        variable_hash(&[b"abc"], &mut out).unwrap();

        let mut expected = [0u8; 32];
        let mut h = Blake2bVar::new(32).unwrap();
        Update::update(&mut h, &32u32.to_le_bytes());
        Update::update(&mut h, b"abc");
        h.finalize_variable(&mut expected).unwrap();

        assert_eq!(out, expected);
    }

    #[test]
    fn test_variable_hash_split_inputs_match_joined() {
        let mut split = [0u8; 1024];
        let mut joined = [0u8; 1024];
        variable_hash(&[b"hello ", b"world"], &mut split).unwrap();
        variable_hash(&[b"hello world"], &mut joined).unwrap();
        assert_eq!(split, joined);
    }

    fn v1(out_len: u32, input: &[u8]) -> [u8; 64] {
        let mut h = Blake2b512::new();
        Digest::update(&mut h, out_len.to_le_bytes());
        Digest::update(&mut h, input);
        let mut v = [0u8; 64];
        v.copy_from_slice(&h.finalize());
        v
    }

    #[test]
    fn test_long_variable_hash_layout() {
        // 96 bytes: V1[..32], then all 64 bytes of V2 = H(V1)
        let mut out = [0u8; 96];
        variable_hash(&[b"x"], &mut out).unwrap();

        let v1 = v1(96, b"x");
        let v2 = Blake2b512::digest(v1);
        assert_eq!(&out[..32], &v1[..32]);
        assert_eq!(&out[32..], v2.as_slice());
    }

    #[test]
    fn test_chained_variable_hash_layout() {
        // 128 bytes: V1[..32], V2[..32], then all 64 bytes of V3 = H(V2)
        let mut out = [0u8; 128];
        variable_hash(&[b"x"], &mut out).unwrap();

        let v1 = v1(128, b"x");
        let v2 = Blake2b512::digest(v1);
        let v3 = Blake2b512::digest(v2);
        assert_eq!(&out[..32], &v1[..32]);
        assert_eq!(&out[32..64], &v2[..32]);
        assert_eq!(&out[64..], v3.as_slice());
    }

    #[test]
    fn test_uneven_tail_uses_sized_digest() {
        // 100 bytes: V1[..32], V2[..32], then a 36-byte digest of V2
        let mut out = [0u8; 100];
        variable_hash(&[b"x"], &mut out).unwrap();

        let v1 = v1(100, b"x");
        let v2 = Blake2b512::digest(v1);
        assert_eq!(&out[32..64], &v2[..32]);

        let mut tail = [0u8; 36];
        let mut h = Blake2bVar::new(36).unwrap();
        Update::update(&mut h, &v2);
        h.finalize_variable(&mut tail).unwrap();
        assert_eq!(&out[64..], &tail);
    }

    #[test]
    fn test_output_lengths_differ() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 65];
        variable_hash(&[b"same"], &mut a).unwrap();
        variable_hash(&[b"same"], &mut b).unwrap();
        assert_ne!(&a[..32], &b[..32], "length is part of the hashed input");
    }
}
