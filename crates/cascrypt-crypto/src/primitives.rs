//! Keyed streaming transforms behind the cascades.
//!
//! Stage objects are resolved once from the algorithm enums and dispatched
//! by `match`; every transform keeps its own running position so the
//! result is independent of how the input is split into chunks.

use aes::{Aes128, Aes192, Aes256};
use chacha20::ChaCha20Legacy;
use ctr::cipher::{KeyIvInit, StreamCipher as _};
use ctr::Ctr128BE;
use hmac::{Hmac, Mac as _};
use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use zeroize::{Zeroize, Zeroizing};

use cascrypt_core::{CipherAlgorithm, EngineError, EngineResult, MacAlgorithm};

/// Poly1305 consumes 16-byte blocks
const POLY1305_BLOCK: usize = 16;

/// A keystream cipher positioned at the start of its stream.
pub enum StreamCipher {
    Aes128Ctr(Ctr128BE<Aes128>),
    Aes192Ctr(Ctr128BE<Aes192>),
    Aes256Ctr(Ctr128BE<Aes256>),
    ChaCha20(ChaCha20Legacy),
}

impl StreamCipher {
    pub fn new(algorithm: CipherAlgorithm, key: &[u8], nonce: &[u8]) -> EngineResult<Self> {
        let bad_length = |_| {
            EngineError::InvalidParameter(format!(
                "{algorithm}: expected {}-byte key and {}-byte nonce, got {} and {}",
                algorithm.key_len(),
                algorithm.nonce_len(),
                key.len(),
                nonce.len()
            ))
        };

        Ok(match algorithm {
            CipherAlgorithm::Aes128Ctr => {
                Self::Aes128Ctr(Ctr128BE::new_from_slices(key, nonce).map_err(bad_length)?)
            }
            CipherAlgorithm::Aes192Ctr => {
                Self::Aes192Ctr(Ctr128BE::new_from_slices(key, nonce).map_err(bad_length)?)
            }
            CipherAlgorithm::Aes256Ctr => {
                Self::Aes256Ctr(Ctr128BE::new_from_slices(key, nonce).map_err(bad_length)?)
            }
            CipherAlgorithm::ChaCha20 => {
                Self::ChaCha20(ChaCha20Legacy::new_from_slices(key, nonce).map_err(bad_length)?)
            }
        })
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply_keystream(&mut self, buf: &mut [u8]) -> EngineResult<()> {
        let result = match self {
            Self::Aes128Ctr(c) => c.try_apply_keystream(buf),
            Self::Aes192Ctr(c) => c.try_apply_keystream(buf),
            Self::Aes256Ctr(c) => c.try_apply_keystream(buf),
            Self::ChaCha20(c) => c.try_apply_keystream(buf),
        };
        result.map_err(|_| EngineError::InvalidParameter("keystream exhausted".into()))
    }
}

/// An incremental MAC accumulator.
pub enum Mac {
    HmacSha1(Hmac<Sha1>),
    HmacSha256(Hmac<Sha256>),
    HmacSha512(Hmac<Sha512>),
    Poly1305(Poly1305Stream),
}

impl Mac {
    pub fn new(algorithm: MacAlgorithm, key: &[u8]) -> EngineResult<Self> {
        let bad_key = |_| {
            EngineError::InvalidParameter(format!(
                "{algorithm}: expected {}-byte key, got {}",
                algorithm.key_len(),
                key.len()
            ))
        };

        Ok(match algorithm {
            MacAlgorithm::HmacSha1 => {
                Self::HmacSha1(<Hmac<Sha1> as hmac::Mac>::new_from_slice(key).map_err(bad_key)?)
            }
            MacAlgorithm::HmacSha256 => {
                Self::HmacSha256(<Hmac<Sha256> as hmac::Mac>::new_from_slice(key).map_err(bad_key)?)
            }
            MacAlgorithm::HmacSha512 => {
                Self::HmacSha512(<Hmac<Sha512> as hmac::Mac>::new_from_slice(key).map_err(bad_key)?)
            }
            MacAlgorithm::Poly1305 => Self::Poly1305(Poly1305Stream::new(key)?),
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::HmacSha1(m) => m.update(data),
            Self::HmacSha256(m) => m.update(data),
            Self::HmacSha512(m) => m.update(data),
            Self::Poly1305(m) => m.update(data),
        }
    }

    pub fn finalize(self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(match self {
            Self::HmacSha1(m) => m.finalize().into_bytes().to_vec(),
            Self::HmacSha256(m) => m.finalize().into_bytes().to_vec(),
            Self::HmacSha512(m) => m.finalize().into_bytes().to_vec(),
            Self::Poly1305(m) => m.finalize(),
        })
    }
}

/// Poly1305 over an arbitrary byte stream: whole blocks go straight to the
/// universal hash, the remainder waits for the next update or for finalize.
pub struct Poly1305Stream {
    state: Poly1305,
    pending: [u8; POLY1305_BLOCK],
    pending_len: usize,
}

impl Poly1305Stream {
    fn new(key: &[u8]) -> EngineResult<Self> {
        let state = Poly1305::new_from_slice(key).map_err(|_| {
            EngineError::InvalidParameter(format!("poly1305: expected 32-byte key, got {}", key.len()))
        })?;
        Ok(Self {
            state,
            pending: [0; POLY1305_BLOCK],
            pending_len: 0,
        })
    }

    fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let take = (POLY1305_BLOCK - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];

            if self.pending_len < POLY1305_BLOCK {
                return;
            }
            let block = poly1305::Block::clone_from_slice(&self.pending);
            self.state.update(std::slice::from_ref(&block));
            self.pending_len = 0;
        }

        let mut blocks = data.chunks_exact(POLY1305_BLOCK);
        for chunk in &mut blocks {
            let block = poly1305::Block::clone_from_slice(chunk);
            self.state.update(std::slice::from_ref(&block));
        }
        let rest = blocks.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();
    }

    fn finalize(self) -> Vec<u8> {
        let Self {
            state,
            mut pending,
            pending_len,
        } = self;
        let tag = state.compute_unpadded(&pending[..pending_len]).to_vec();
        pending.zeroize();
        tag
    }
}
