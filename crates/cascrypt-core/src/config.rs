use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::spec::{CipherSpec, KdfSpec, MacSpec};

/// Default size of one streaming chunk (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CascryptConfig {
    pub defaults: DefaultsConfig,
    pub io: IoConfig,
    pub log: LogConfig,
}

impl CascryptConfig {
    /// Parse a config file. A missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Algorithm choices used when the command line does not name them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// KDF descriptor (default: argon2id,1,2097152,4)
    pub kdf: KdfSpec,
    /// Cipher cascade (default: chacha20)
    pub ciphers: CipherSpec,
    /// MAC cascade (default: poly1305)
    pub macs: MacSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Streaming chunk size in bytes (default: 1 MiB)
    pub chunk_size: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CipherAlgorithm, KdfAlgorithm, MacAlgorithm};

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[defaults]
kdf = "argon2d,3,499782,4"
ciphers = "aes-256-ctr,chacha20"
macs = "hmac-sha512,poly1305"

[io]
chunk_size = 65536

[log]
level = "debug"
format = "json"
"#;

        let config: CascryptConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.defaults.kdf.algorithm, KdfAlgorithm::Argon2d);
        assert_eq!(config.defaults.kdf.memory_cost_kib, 499782);
        assert_eq!(
            config.defaults.ciphers.stages(),
            &[CipherAlgorithm::Aes256Ctr, CipherAlgorithm::ChaCha20]
        );
        assert_eq!(
            config.defaults.macs.stages(),
            &[MacAlgorithm::HmacSha512, MacAlgorithm::Poly1305]
        );
        assert_eq!(config.io.chunk_size, 65536);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CascryptConfig = toml::from_str("[io]\nchunk_size = 4096\n").unwrap();
        assert_eq!(config.io.chunk_size, 4096);
        assert_eq!(config.defaults.kdf, KdfSpec::default());
        assert_eq!(config.defaults.ciphers, CipherSpec::default());
        assert_eq!(config.defaults.macs, MacSpec::default());
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_invalid_spec_in_config_is_rejected() {
        let result = toml::from_str::<CascryptConfig>("[defaults]\nkdf = \"argon2d,0,8,1\"\n");
        assert!(result.is_err(), "time_cost 0 must fail at config load");

        let result = toml::from_str::<CascryptConfig>("[defaults]\nciphers = \"rot13\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialize_roundtrip() {
        let config = CascryptConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("argon2id,1,2097152,4"));
        let back: CascryptConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.defaults.kdf, config.defaults.kdf);
    }

    #[test]
    fn test_load_missing_and_present_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = CascryptConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing.io.chunk_size, DEFAULT_CHUNK_SIZE);

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[defaults]\nmacs = \"hmac-sha256\"\n").unwrap();
        let loaded = CascryptConfig::load(&path).unwrap();
        assert_eq!(loaded.defaults.macs.stages(), &[MacAlgorithm::HmacSha256]);

        std::fs::write(&path, "[defaults\n").unwrap();
        assert!(matches!(
            CascryptConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
