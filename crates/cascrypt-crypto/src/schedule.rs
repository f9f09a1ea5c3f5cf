//! Positional slicing of derived key material into per-stage keys.
//!
//! ```text
//! [cipher key 1][cipher key 2]...[cipher key n][mac key 1]...[mac key m]
//! ```

use std::ops::Range;

use cascrypt_core::{CipherSpec, EngineError, EngineResult, MacSpec};

use crate::kdf::DerivedKeyMaterial;

/// Owns the derived key material and hands out borrowed stage keys.
#[derive(Debug)]
pub struct KeySchedule {
    material: DerivedKeyMaterial,
    cipher_ranges: Vec<Range<usize>>,
    mac_ranges: Vec<Range<usize>>,
}

impl KeySchedule {
    /// Bytes of key material a cascade pair consumes.
    pub fn required_len(ciphers: &CipherSpec, macs: &MacSpec) -> usize {
        ciphers.key_len() + macs.key_len()
    }

    pub fn new(
        material: DerivedKeyMaterial,
        ciphers: &CipherSpec,
        macs: &MacSpec,
    ) -> EngineResult<Self> {
        let required = Self::required_len(ciphers, macs);
        if material.len() != required {
            return Err(EngineError::InvalidParameter(format!(
                "key material is {} bytes, cascades need {required}",
                material.len()
            )));
        }

        let mut offset = 0;
        let mut take = |len: usize| {
            let range = offset..offset + len;
            offset += len;
            range
        };
        let cipher_ranges = ciphers.stages().iter().map(|c| take(c.key_len())).collect();
        let mac_ranges = macs.stages().iter().map(|m| take(m.key_len())).collect();

        Ok(Self {
            material,
            cipher_ranges,
            mac_ranges,
        })
    }

    /// Key of cipher stage `i` (cascade order).
    pub fn cipher_key(&self, i: usize) -> &[u8] {
        &self.material.as_bytes()[self.cipher_ranges[i].clone()]
    }

    /// Key of MAC stage `i` (cascade order).
    pub fn mac_key(&self, i: usize) -> &[u8] {
        &self.material.as_bytes()[self.mac_ranges[i].clone()]
    }

    pub fn cipher_stages(&self) -> usize {
        self.cipher_ranges.len()
    }

    pub fn mac_stages(&self) -> usize {
        self.mac_ranges.len()
    }
}
