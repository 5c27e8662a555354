//! Battery parameters
//!
//! Defaults reproduce the reference scenario; a JSON file can override any
//! part of it. Byte strings are hex-encoded in the file.

use crate::gateway::{Algorithm, StorageFlags, Uid};
use crate::sequencer::DerivationRequest;
use crate::services::{CHALLENGE_SIZES, MAX_TOKEN_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Hex-encoded byte string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexBytes(#[serde(with = "hex")] pub Vec<u8>);

impl From<&[u8]> for HexBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Known-answer hash test: the chunks are fed in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashVector {
    pub algorithm: Algorithm,
    pub chunks: Vec<HexBytes>,
    /// Digest the domain must accept
    #[serde(with = "hex")]
    pub expected: Vec<u8>,
}

/// Storage round trip parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record identifier in internal trusted storage
    pub uid: Uid,
    /// Bytes written and expected back
    #[serde(with = "hex")]
    pub data: Vec<u8>,
    /// Creation flags passed to the set call
    pub flags: StorageFlags,
    /// Remove the record once the round trip has been checked
    pub remove_after: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uid: 1,
            data: vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa],
            flags: StorageFlags::NO_CONFIDENTIALITY | StorageFlags::NO_REPLAY_PROTECTION,
            remove_after: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Attestation challenge, 32, 48 or 64 bytes
    #[serde(with = "hex")]
    pub challenge: Vec<u8>,
    /// Size of the buffer the token is fetched into
    pub token_buffer_size: usize,
    pub storage: StorageConfig,
    /// Length of each random fill
    pub random_len: usize,
    pub hash_vectors: Vec<HashVector>,
    pub derivation: DerivationRequest,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut challenge = vec![0u8; 32];
        challenge[0] = 0x2a;
        Self {
            challenge,
            token_buffer_size: MAX_TOKEN_SIZE,
            storage: StorageConfig::default(),
            random_len: 10,
            hash_vectors: vec![
                HashVector {
                    algorithm: Algorithm::SHA_256,
                    chunks: vec![HexBytes::from(&b"abc"[..])],
                    expected: hex_literal(
                        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
                    ),
                },
                HashVector {
                    algorithm: Algorithm::SHA_256,
                    chunks: vec![HexBytes::from(&b"abc"[..]), HexBytes::from(&b"dddddddd"[..])],
                    expected: hex_literal(
                        "7bd340d029f761d7af22af96ebafba8fbe2bd6b39158b6e213816418add4143b",
                    ),
                },
            ],
            derivation: DerivationRequest::default(),
        }
    }
}

/// Decode a digest constant; the literals above are well-formed
fn hex_literal(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap_or_default()
}

impl ValidationConfig {
    /// Load from a JSON file; absent fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject parameters the battery could never pass with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !CHALLENGE_SIZES.contains(&self.challenge.len()) {
            return Err(ConfigError::Invalid(format!(
                "challenge must be one of {:?} bytes, got {}",
                CHALLENGE_SIZES,
                self.challenge.len()
            )));
        }
        if self.token_buffer_size == 0 {
            return Err(ConfigError::Invalid("token buffer size is zero".into()));
        }
        if self.storage.data.is_empty() {
            return Err(ConfigError::Invalid("storage data is empty".into()));
        }
        if self.random_len == 0 {
            return Err(ConfigError::Invalid("random length is zero".into()));
        }
        if self.hash_vectors.is_empty() {
            return Err(ConfigError::Invalid("no hash vectors".into()));
        }
        for (i, vector) in self.hash_vectors.iter().enumerate() {
            match vector.algorithm.hash_length() {
                Some(len) if len == vector.expected.len() => {}
                Some(len) => {
                    return Err(ConfigError::Invalid(format!(
                        "hash vector {}: {} digest is {} bytes, got {}",
                        i,
                        vector.algorithm,
                        len,
                        vector.expected.len()
                    )))
                }
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "hash vector {}: {} is not a hash algorithm",
                        i, vector.algorithm
                    )))
                }
            }
        }
        let bits = self.derivation.attributes.bits;
        if bits == 0 || bits % 8 != 0 {
            return Err(ConfigError::Invalid(format!(
                "derived key size must be a non-zero multiple of 8 bits, got {}",
                bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::KeyId;

    #[test]
    fn test_default_is_reference_scenario() {
        let config = ValidationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.challenge.len(), 32);
        assert_eq!(config.challenge[0], 0x2a);
        assert_eq!(config.token_buffer_size, 800);
        assert_eq!(config.storage.uid, 1);
        assert_eq!(config.storage.data.len(), 10);
        assert_eq!(config.random_len, 10);
        assert_eq!(config.hash_vectors.len(), 2);
        assert_eq!(config.hash_vectors[0].expected.len(), 32);
        assert_eq!(config.derivation.key_source, KeyId::HUK);
        assert_eq!(config.derivation.label, b"key_1\0");
        assert_eq!(config.derivation.attributes.bits, 256);
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let config = ValidationConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"challenge\": \"2a00"));
        assert!(json.contains("\"data\": \"112233445566778899aa\""));
        let back: ValidationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ValidationConfig = serde_json::from_str(r#"{ "random_len": 64 }"#).unwrap();
        assert_eq!(config.random_len, 64);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let bad_challenge = ValidationConfig {
            challenge: vec![0; 20],
            ..ValidationConfig::default()
        };
        assert!(matches!(bad_challenge.validate(), Err(ConfigError::Invalid(_))));

        let mut bad_digest = ValidationConfig::default();
        bad_digest.hash_vectors[1].expected.pop();
        assert!(matches!(bad_digest.validate(), Err(ConfigError::Invalid(_))));

        let mut not_a_hash = ValidationConfig::default();
        not_a_hash.hash_vectors[0].algorithm = Algorithm::HKDF_SHA_256;
        assert!(matches!(not_a_hash.validate(), Err(ConfigError::Invalid(_))));

        let mut odd_bits = ValidationConfig::default();
        odd_bits.derivation.attributes.bits = 100;
        assert!(matches!(odd_bits.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("psaval-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "storage": { "uid": 9, "data": "0102", "flags": 1, "remove_after": false } }"#)
            .unwrap();
        let config = ValidationConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.storage.uid, 9);
        assert_eq!(config.storage.data, vec![1, 2]);
        assert_eq!(config.storage.flags, StorageFlags::WRITE_ONCE);
        assert!(!config.storage.remove_after);

        assert!(matches!(
            ValidationConfig::load(std::env::temp_dir().join("psaval-missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
