//! Container framing.
//!
//! ```text
//! [salt: 16][nonce 1]...[nonce k][ciphertext: n][tag: last MAC tag length]
//! ```
//!
//! No algorithm identifiers or cost parameters are stored; both sides must
//! agree on the KDF and cascades out of band.

use std::io::Read;

use rand::RngCore;

use cascrypt_core::{CipherSpec, EngineError, EngineResult, MacSpec};

/// Bytes of random salt at the start of every container
pub const SALT_SIZE: usize = 16;

/// Fixed header and trailer sizes for a cascade pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub header_len: usize,
    pub trailer_len: usize,
}

impl Layout {
    pub fn new(ciphers: &CipherSpec, macs: &MacSpec) -> Self {
        Self {
            header_len: SALT_SIZE + ciphers.nonce_len(),
            trailer_len: macs.tag_len(),
        }
    }

    /// Smallest valid container (empty ciphertext).
    pub fn overhead(&self) -> usize {
        self.header_len + self.trailer_len
    }

    /// Ciphertext length of a container of `total` bytes.
    pub fn body_len(&self, total: u64) -> EngineResult<u64> {
        total.checked_sub(self.overhead() as u64).ok_or_else(|| {
            EngineError::InvalidContainer(format!(
                "{total} bytes is shorter than header and tag ({} bytes)",
                self.overhead()
            ))
        })
    }
}

/// Salt and per-stage nonces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub salt: [u8; SALT_SIZE],
    pub nonces: Vec<Vec<u8>>,
}

impl Header {
    /// Fresh random salt and nonces.
    pub fn generate(ciphers: &CipherSpec) -> Self {
        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_SIZE];
        rng.fill_bytes(&mut salt);
        let nonces = ciphers
            .stages()
            .iter()
            .map(|c| {
                let mut nonce = vec![0u8; c.nonce_len()];
                rng.fill_bytes(&mut nonce);
                nonce
            })
            .collect();
        Self { salt, nonces }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_SIZE + self.nonces.iter().map(Vec::len).sum::<usize>());
        out.extend_from_slice(&self.salt);
        for nonce in &self.nonces {
            out.extend_from_slice(nonce);
        }
        out
    }

    /// Split header bytes (exactly `Layout::header_len` long) into fields.
    pub fn parse(bytes: &[u8], ciphers: &CipherSpec) -> EngineResult<Self> {
        let expected = SALT_SIZE + ciphers.nonce_len();
        if bytes.len() != expected {
            return Err(EngineError::InvalidContainer(format!(
                "header is {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let (salt_bytes, mut rest) = bytes.split_at(SALT_SIZE);
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(salt_bytes);

        let mut nonces = Vec::with_capacity(ciphers.len());
        for c in ciphers.stages() {
            let (nonce, tail) = rest.split_at(c.nonce_len());
            nonces.push(nonce.to_vec());
            rest = tail;
        }
        Ok(Self { salt, nonces })
    }

    /// Read the header from the front of a container. Returns the parsed
    /// header and its raw bytes (which are authenticated).
    pub fn read_from(reader: &mut dyn Read, ciphers: &CipherSpec) -> EngineResult<(Self, Vec<u8>)> {
        let mut raw = vec![0u8; SALT_SIZE + ciphers.nonce_len()];
        reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                EngineError::InvalidContainer("truncated before end of header".into())
            }
            _ => EngineError::Io(e),
        })?;
        let header = Self::parse(&raw, ciphers)?;
        Ok((header, raw))
    }
}
