//! Argon2 memory block and the BlaMka-based compression function G.

use std::ops::BitXorAssign;

use zeroize::Zeroize;

/// Size of one memory block in bytes (1 KiB)
pub(crate) const BLOCK_SIZE: usize = 1024;

/// 64-bit words per block
pub(crate) const BLOCK_WORDS: usize = BLOCK_SIZE / 8;

#[derive(Clone, Copy, Zeroize)]
pub(crate) struct Block(pub(crate) [u64; BLOCK_WORDS]);

impl Block {
    pub(crate) const ZERO: Self = Self([0; BLOCK_WORDS]);

    /// Load a block from 1024 little-endian bytes.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), BLOCK_SIZE);
        let mut block = Self::ZERO;
        for (word, chunk) in block.0.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *word = u64::from_le_bytes(buf);
        }
        block
    }

    pub(crate) fn write_bytes(&self, out: &mut [u8]) {
        debug_assert_eq!(out.len(), BLOCK_SIZE);
        for (word, chunk) in self.0.iter().zip(out.chunks_exact_mut(8)) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
    }

    /// G(x, y) = P(x ^ y) ^ (x ^ y), where P applies the BLAKE2b round
    /// (with BlaMka multiplication) to the rows and then the columns of the
    /// block viewed as an 8x8 matrix of 16-byte registers.
    pub(crate) fn compress(x: &Self, y: &Self) -> Self {
        let mut r = *x;
        r ^= y;
        let mut q = r;

        for row in 0..8 {
            let base = 16 * row;
            permute(&mut q.0, std::array::from_fn(|k| base + k));
        }
        for col in 0..8 {
            let base = 2 * col;
            permute(
                &mut q.0,
                std::array::from_fn(|k| base + 16 * (k / 2) + (k % 2)),
            );
        }

        q ^= &r;
        r.zeroize();
        q
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::ZERO
    }
}

impl BitXorAssign<&Block> for Block {
    fn bitxor_assign(&mut self, rhs: &Block) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a ^= b;
        }
    }
}

/// One BLAKE2b round without message words over the sixteen words at `idx`.
fn permute(q: &mut [u64; BLOCK_WORDS], idx: [usize; 16]) {
    let mut v: [u64; 16] = std::array::from_fn(|k| q[idx[k]]);

    mix(&mut v, 0, 4, 8, 12);
    mix(&mut v, 1, 5, 9, 13);
    mix(&mut v, 2, 6, 10, 14);
    mix(&mut v, 3, 7, 11, 15);
    mix(&mut v, 0, 5, 10, 15);
    mix(&mut v, 1, 6, 11, 12);
    mix(&mut v, 2, 7, 8, 13);
    mix(&mut v, 3, 4, 9, 14);

    for (k, &i) in idx.iter().enumerate() {
        q[i] = v[k];
    }
}

#[inline(always)]
fn mix(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize) {
    v[a] = blamka(v[a], v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = blamka(v[c], v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = blamka(v[a], v[b]);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = blamka(v[c], v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

/// x + y + 2 * lo32(x) * lo32(y), all mod 2^64
#[inline(always)]
fn blamka(x: u64, y: u64) -> u64 {
    let product = u64::from(x as u32).wrapping_mul(u64::from(y as u32));
    x.wrapping_add(y).wrapping_add(product.wrapping_mul(2))
}
