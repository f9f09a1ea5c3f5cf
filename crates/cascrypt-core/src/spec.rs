//! Algorithm specifications: KDF cost parameters and the cipher/MAC cascades.
//!
//! Every identifier is resolved once, at parse time, into a closed enum. The
//! engine never looks an algorithm up by name after that point.
//!
//! Textual forms (as accepted on the command line and in the config file):
//! ```text
//! kdf     = argon2id,1,2097152,4        algorithm,time_cost,memory_cost_kib,parallelism
//! ciphers = aes-256-ctr,chacha20        applied left to right when encrypting
//! macs    = hmac-sha512,poly1305        chained left to right
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Argon2 lanes are addressed with 24 bits.
pub const MAX_PARALLELISM: u32 = 0x00FF_FFFF;

// ── KDF ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    Argon2i,
    Argon2d,
    Argon2id,
}

impl KdfAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Argon2i => "argon2i",
            Self::Argon2d => "argon2d",
            Self::Argon2id => "argon2id",
        }
    }

    /// Argon2 type field `y` as hashed into H0 and the address blocks.
    pub fn type_code(self) -> u32 {
        match self {
            Self::Argon2d => 0,
            Self::Argon2i => 1,
            Self::Argon2id => 2,
        }
    }
}

impl FromStr for KdfAlgorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.trim() {
            "argon2i" => Ok(Self::Argon2i),
            "argon2d" => Ok(Self::Argon2d),
            "argon2id" => Ok(Self::Argon2id),
            other => Err(EngineError::invalid(format!("unknown KDF algorithm '{other}'"))),
        }
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory-hard KDF cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KdfSpec {
    pub algorithm: KdfAlgorithm,
    /// Number of passes over the memory matrix
    pub time_cost: u32,
    /// Memory matrix size in KiB (1 KiB per Argon2 block)
    pub memory_cost_kib: u32,
    /// Number of lanes, each filled by its own task
    pub parallelism: u32,
}

impl KdfSpec {
    /// Build a spec, rejecting cost parameters Argon2 cannot run with.
    pub fn new(
        algorithm: KdfAlgorithm,
        time_cost: u32,
        memory_cost_kib: u32,
        parallelism: u32,
    ) -> EngineResult<Self> {
        let spec = Self {
            algorithm,
            time_cost,
            memory_cost_kib,
            parallelism,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.time_cost == 0 {
            return Err(EngineError::invalid("time_cost must be greater than zero"));
        }
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(EngineError::invalid(format!(
                "parallelism must be in 1..={MAX_PARALLELISM}, got {}",
                self.parallelism
            )));
        }
        if u64::from(self.memory_cost_kib) < 8 * u64::from(self.parallelism) {
            return Err(EngineError::invalid(format!(
                "memory_cost_kib ({}) must be at least 8 x parallelism ({})",
                self.memory_cost_kib,
                8 * u64::from(self.parallelism)
            )));
        }
        Ok(())
    }
}

impl Default for KdfSpec {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            time_cost: 1,
            memory_cost_kib: 2 * 1024 * 1024,
            parallelism: 4,
        }
    }
}

impl FromStr for KdfSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        let &[algorithm, time_cost, memory_cost_kib, parallelism] = fields.as_slice() else {
            return Err(EngineError::invalid(format!(
                "KDF spec '{s}' must be algorithm,time_cost,memory_cost_kib,parallelism"
            )));
        };

        Self::new(
            algorithm.parse()?,
            parse_u32("time_cost", time_cost)?,
            parse_u32("memory_cost_kib", memory_cost_kib)?,
            parse_u32("parallelism", parallelism)?,
        )
    }
}

impl fmt::Display for KdfSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.algorithm, self.time_cost, self.memory_cost_kib, self.parallelism
        )
    }
}

impl TryFrom<String> for KdfSpec {
    type Error = EngineError;

    fn try_from(value: String) -> EngineResult<Self> {
        value.parse()
    }
}

impl From<KdfSpec> for String {
    fn from(spec: KdfSpec) -> Self {
        spec.to_string()
    }
}

fn parse_u32(field: &str, value: &str) -> EngineResult<u32> {
    value
        .parse()
        .map_err(|e| EngineError::invalid(format!("{field} '{value}': {e}")))
}

// ── Ciphers ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    Aes128Ctr,
    Aes192Ctr,
    Aes256Ctr,
    /// Original (DJB) ChaCha20: 64-bit nonce, 64-bit block counter
    ChaCha20,
}

impl CipherAlgorithm {
    pub const ALL: [Self; 4] = [Self::Aes128Ctr, Self::Aes192Ctr, Self::Aes256Ctr, Self::ChaCha20];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Ctr => "aes-128-ctr",
            Self::Aes192Ctr => "aes-192-ctr",
            Self::Aes256Ctr => "aes-256-ctr",
            Self::ChaCha20 => "chacha20",
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Ctr => 16,
            Self::Aes192Ctr => 24,
            Self::Aes256Ctr | Self::ChaCha20 => 32,
        }
    }

    /// For AES-CTR this is the full initial counter block.
    pub fn nonce_len(self) -> usize {
        match self {
            Self::Aes128Ctr | Self::Aes192Ctr | Self::Aes256Ctr => 16,
            Self::ChaCha20 => 8,
        }
    }
}

impl FromStr for CipherAlgorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| EngineError::invalid(format!("unknown cipher algorithm '{s}'")))
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty, ordered list of cipher stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CipherSpec(Vec<CipherAlgorithm>);

impl CipherSpec {
    pub fn new(stages: Vec<CipherAlgorithm>) -> EngineResult<Self> {
        if stages.is_empty() {
            return Err(EngineError::invalid("cipher list must not be empty"));
        }
        Ok(Self(stages))
    }

    pub fn stages(&self) -> &[CipherAlgorithm] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn key_len(&self) -> usize {
        self.0.iter().map(|c| c.key_len()).sum()
    }

    pub fn nonce_len(&self) -> usize {
        self.0.iter().map(|c| c.nonce_len()).sum()
    }
}

impl Default for CipherSpec {
    fn default() -> Self {
        Self(vec![CipherAlgorithm::ChaCha20])
    }
}

impl FromStr for CipherSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        Self::new(parse_list(s)?)
    }
}

impl fmt::Display for CipherSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, &self.0)
    }
}

impl TryFrom<String> for CipherSpec {
    type Error = EngineError;

    fn try_from(value: String) -> EngineResult<Self> {
        value.parse()
    }
}

impl From<CipherSpec> for String {
    fn from(spec: CipherSpec) -> Self {
        spec.to_string()
    }
}

// ── MACs ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
    HmacSha512,
    Poly1305,
}

impl MacAlgorithm {
    pub const ALL: [Self; 4] = [Self::HmacSha1, Self::HmacSha256, Self::HmacSha512, Self::Poly1305];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha1 => "hmac-sha1",
            Self::HmacSha256 => "hmac-sha256",
            Self::HmacSha512 => "hmac-sha512",
            Self::Poly1305 => "poly1305",
        }
    }

    pub fn key_len(self) -> usize {
        32
    }

    pub fn tag_len(self) -> usize {
        match self {
            Self::HmacSha1 => 20,
            Self::HmacSha256 => 32,
            Self::HmacSha512 => 64,
            Self::Poly1305 => 16,
        }
    }
}

impl FromStr for MacAlgorithm {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EngineError::invalid(format!("unknown MAC algorithm '{s}'")))
    }
}

impl fmt::Display for MacAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty, ordered list of MAC stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacSpec(Vec<MacAlgorithm>);

impl MacSpec {
    pub fn new(stages: Vec<MacAlgorithm>) -> EngineResult<Self> {
        if stages.is_empty() {
            return Err(EngineError::invalid("MAC list must not be empty"));
        }
        Ok(Self(stages))
    }

    pub fn stages(&self) -> &[MacAlgorithm] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn key_len(&self) -> usize {
        self.0.iter().map(|m| m.key_len()).sum()
    }

    /// Only the last stage's tag is stored in the container.
    pub fn tag_len(&self) -> usize {
        self.0.last().map_or(0, |m| m.tag_len())
    }
}

impl Default for MacSpec {
    fn default() -> Self {
        Self(vec![MacAlgorithm::Poly1305])
    }
}

impl FromStr for MacSpec {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        Self::new(parse_list(s)?)
    }
}

impl fmt::Display for MacSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, &self.0)
    }
}

impl TryFrom<String> for MacSpec {
    type Error = EngineError;

    fn try_from(value: String) -> EngineResult<Self> {
        value.parse()
    }
}

impl From<MacSpec> for String {
    fn from(spec: MacSpec) -> Self {
        spec.to_string()
    }
}

fn parse_list<T: FromStr<Err = EngineError>>(s: &str) -> EngineResult<Vec<T>> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(str::parse).collect()
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
