//! Trusted-domain call surface
//!
//! The non-secure side only ever talks to the trusted domain through
//! [`TrustedDomain`]. Identifiers use the PSA numeric encodings so a
//! firmware-backed implementation can pass them through untouched.

use super::status::DomainResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Algorithm identifier (PSA `psa_algorithm_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Algorithm(pub u32);

impl Algorithm {
    pub const SHA_224: Self = Self(0x0200_0008);
    pub const SHA_256: Self = Self(0x0200_0009);
    pub const SHA_384: Self = Self(0x0200_000a);
    pub const SHA_512: Self = Self(0x0200_000b);
    pub const HKDF_SHA_256: Self = Self::hkdf(Self::SHA_256);

    const HASH_CATEGORY: u32 = 0x0200_0000;
    const HKDF_BASE: u32 = 0x0800_0100;

    /// HKDF over the given hash
    pub const fn hkdf(hash: Algorithm) -> Self {
        Self(Self::HKDF_BASE | (hash.0 & 0xff))
    }

    pub fn is_hash(self) -> bool {
        self.0 & 0x7f00_0000 == Self::HASH_CATEGORY
    }

    /// Hash underlying an HKDF identifier
    pub fn hkdf_hash(self) -> Option<Algorithm> {
        if self.0 & !0xff == Self::HKDF_BASE {
            Some(Self(Self::HASH_CATEGORY | (self.0 & 0xff)))
        } else {
            None
        }
    }

    /// Digest length in bytes for the hash algorithms this crate knows
    pub fn hash_length(self) -> Option<usize> {
        match self {
            Self::SHA_224 => Some(28),
            Self::SHA_256 => Some(32),
            Self::SHA_384 => Some(48),
            Self::SHA_512 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SHA_224 => write!(f, "SHA-224"),
            Self::SHA_256 => write!(f, "SHA-256"),
            Self::SHA_384 => write!(f, "SHA-384"),
            Self::SHA_512 => write!(f, "SHA-512"),
            alg => match alg.hkdf_hash() {
                Some(hash) => write!(f, "HKDF-{}", hash),
                None => write!(f, "alg {:#010x}", alg.0),
            },
        }
    }
}

/// Storage record identifier, chosen by the caller
pub type Uid = u64;

/// Creation flags for an internal trusted storage record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageFlags(pub u32);

impl StorageFlags {
    pub const NONE: Self = Self(0);
    pub const WRITE_ONCE: Self = Self(1 << 0);
    pub const NO_CONFIDENTIALITY: Self = Self(1 << 1);
    pub const NO_REPLAY_PROTECTION: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StorageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Key identifier on the trusted side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u32);

impl KeyId {
    /// Built-in hardware unique key
    pub const HUK: Self = Self(0x7fff_815c);
}

/// Handle to an operation context held by the trusted domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub u32);

/// Key type (PSA `psa_key_type_t`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyType(pub u16);

impl KeyType {
    pub const RAW_DATA: Self = Self(0x1001);
    pub const DERIVE: Self = Self(0x1200);
}

/// Key usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyUsage(pub u32);

impl KeyUsage {
    pub const EXPORT: Self = Self(0x0000_0001);
    pub const DERIVE: Self = Self(0x0000_4000);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for KeyUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Attributes requested for a key produced by derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttributes {
    pub key_type: KeyType,
    pub bits: usize,
    pub usage: KeyUsage,
    pub algorithm: Algorithm,
}

impl KeyAttributes {
    pub fn byte_len(&self) -> usize {
        self.bits.div_ceil(8)
    }
}

/// Input slot of a key derivation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivationStep(pub u16);

impl DerivationStep {
    pub const SECRET: Self = Self(0x0101);
    pub const LABEL: Self = Self(0x0201);
    pub const SALT: Self = Self(0x0202);
    pub const INFO: Self = Self(0x0203);
}

/// Fixed call surface exposed by the trusted domain
///
/// Every method crosses the boundary once and blocks until the trusted side
/// answers. Implementations are not expected to be reentrant.
pub trait TrustedDomain {
    /// Set up the non-secure interface to the trusted domain
    fn connect(&mut self) -> DomainResult<()>;

    fn attest_token_size(&mut self, challenge_len: usize) -> DomainResult<usize>;

    /// Write a token bound to `challenge` into `token`, returning its length
    fn attest_token(&mut self, challenge: &[u8], token: &mut [u8]) -> DomainResult<usize>;

    fn its_set(&mut self, uid: Uid, data: &[u8], flags: StorageFlags) -> DomainResult<()>;

    /// Read from `offset` into `out`, returning the number of bytes copied
    fn its_get(&mut self, uid: Uid, offset: usize, out: &mut [u8]) -> DomainResult<usize>;

    fn its_remove(&mut self, uid: Uid) -> DomainResult<()>;

    fn generate_random(&mut self, out: &mut [u8]) -> DomainResult<()>;

    fn hash_setup(&mut self, alg: Algorithm) -> DomainResult<OperationHandle>;

    fn hash_update(&mut self, op: OperationHandle, input: &[u8]) -> DomainResult<()>;

    fn hash_verify(&mut self, op: OperationHandle, expected: &[u8]) -> DomainResult<()>;

    fn hash_abort(&mut self, op: OperationHandle) -> DomainResult<()>;

    fn key_derivation_setup(&mut self, alg: Algorithm) -> DomainResult<OperationHandle>;

    fn key_derivation_input_key(
        &mut self,
        op: OperationHandle,
        step: DerivationStep,
        key: KeyId,
    ) -> DomainResult<()>;

    fn key_derivation_input_bytes(
        &mut self,
        op: OperationHandle,
        step: DerivationStep,
        data: &[u8],
    ) -> DomainResult<()>;

    fn key_derivation_output_key(
        &mut self,
        attributes: &KeyAttributes,
        op: OperationHandle,
    ) -> DomainResult<KeyId>;

    fn key_derivation_abort(&mut self, op: OperationHandle) -> DomainResult<()>;

    fn export_key(&mut self, key: KeyId, out: &mut [u8]) -> DomainResult<usize>;

    fn destroy_key(&mut self, key: KeyId) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_identifier() {
        assert_eq!(Algorithm::HKDF_SHA_256, Algorithm(0x0800_0109));
        assert_eq!(Algorithm::HKDF_SHA_256.hkdf_hash(), Some(Algorithm::SHA_256));
        assert_eq!(Algorithm::SHA_256.hkdf_hash(), None);
        assert!(Algorithm::SHA_384.is_hash());
        assert!(!Algorithm::HKDF_SHA_256.is_hash());
        assert_eq!(Algorithm::HKDF_SHA_256.to_string(), "HKDF-SHA-256");
    }

    #[test]
    fn test_flags() {
        let flags = StorageFlags::NO_CONFIDENTIALITY | StorageFlags::NO_REPLAY_PROTECTION;
        assert_eq!(flags.0, 0b110);
        assert!(flags.contains(StorageFlags::NO_CONFIDENTIALITY));
        assert!(!flags.contains(StorageFlags::WRITE_ONCE));
    }

    #[test]
    fn test_key_byte_len() {
        let attrs = KeyAttributes {
            key_type: KeyType::DERIVE,
            bits: 256,
            usage: KeyUsage::EXPORT | KeyUsage::DERIVE,
            algorithm: Algorithm::HKDF_SHA_256,
        };
        assert_eq!(attrs.byte_len(), 32);
    }
}
