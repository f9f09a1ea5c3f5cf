//! Ordered cipher and MAC cascades.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use cascrypt_core::{CipherSpec, EngineError, EngineResult, MacSpec};

use crate::primitives::{Mac, StreamCipher};
use crate::schedule::KeySchedule;

/// Stream ciphers applied in cascade order on encrypt and in reverse on
/// decrypt. Each stage keeps its keystream position across chunks.
pub struct CipherCascade {
    stages: Vec<StreamCipher>,
}

impl CipherCascade {
    /// `nonces[i]` belongs to stage `i`.
    pub fn new(spec: &CipherSpec, schedule: &KeySchedule, nonces: &[Vec<u8>]) -> EngineResult<Self> {
        if nonces.len() != spec.len() {
            return Err(EngineError::InvalidParameter(format!(
                "{} nonces for {} cipher stages",
                nonces.len(),
                spec.len()
            )));
        }
        let stages = spec
            .stages()
            .iter()
            .zip(nonces)
            .enumerate()
            .map(|(i, (&algorithm, nonce))| StreamCipher::new(algorithm, schedule.cipher_key(i), nonce))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn encrypt(&mut self, buf: &mut [u8]) -> EngineResult<()> {
        for stage in &mut self.stages {
            stage.apply_keystream(buf)?;
        }
        Ok(())
    }

    pub fn decrypt(&mut self, buf: &mut [u8]) -> EngineResult<()> {
        for stage in self.stages.iter_mut().rev() {
            stage.apply_keystream(buf)?;
        }
        Ok(())
    }
}

/// MAC stages fed the same authenticated bytes and chained at the end:
/// every stage after the first also authenticates its predecessor's tag.
pub struct MacCascade {
    stages: Vec<Mac>,
}

impl MacCascade {
    pub fn new(spec: &MacSpec, schedule: &KeySchedule) -> EngineResult<Self> {
        let stages = spec
            .stages()
            .iter()
            .enumerate()
            .map(|(i, &algorithm)| Mac::new(algorithm, schedule.mac_key(i)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn update(&mut self, data: &[u8]) {
        for stage in &mut self.stages {
            stage.update(data);
        }
    }

    /// The final tag of the chain.
    pub fn finalize(self) -> Zeroizing<Vec<u8>> {
        let mut tag: Option<Zeroizing<Vec<u8>>> = None;
        for mut stage in self.stages {
            if let Some(prev) = &tag {
                stage.update(prev);
            }
            tag = Some(stage.finalize());
        }
        tag.unwrap_or_default()
    }

    /// Compare the chained tag against `expected` in constant time.
    pub fn verify(self, expected: &[u8]) -> EngineResult<()> {
        let tag = self.finalize();
        if tag.len() == expected.len() && bool::from(tag.as_slice().ct_eq(expected)) {
            Ok(())
        } else {
            Err(EngineError::MacVerificationFailure)
        }
    }
}
