//! Initial attestation tokens issued by the simulated domain
//!
//! Token layout (all integers little-endian):
//! 1. magic `PSAT` and a `u16` format version
//! 2. `u16` challenge length followed by the challenge
//! 3. implementation id (32 bytes), instance id (33 bytes), boot seed (32 bytes)
//! 4. SHA-256 tag over everything above, keyed by the attestation key
//!
//! The tag stands in for the signature a firmware-backed domain produces.

use crate::gateway::{DomainResult, DomainStatus};
use crate::services::CHALLENGE_SIZES;
use sha2::{Digest, Sha256};

pub const TOKEN_MAGIC: &[u8; 4] = b"PSAT";
pub const TOKEN_VERSION: u16 = 1;

const CLAIMS_LEN: usize = 32 + 33 + 32;
const TAG_LEN: usize = 32;
const HEADER_LEN: usize = TOKEN_MAGIC.len() + 2 + 2;

/// Claims the simulated device reports about itself
#[derive(Debug, Clone)]
pub struct DeviceClaims {
    pub implementation_id: [u8; 32],
    pub instance_id: [u8; 33],
    pub boot_seed: [u8; 32],
    attestation_key: [u8; 32],
}

impl DeviceClaims {
    /// Claims rooted in the device's hardware unique key
    pub fn from_huk(huk: &[u8; 32], boot_seed: [u8; 32]) -> Self {
        let implementation_id: [u8; 32] = Sha256::digest(b"psaval-simulated-implementation-v1").into();

        let mut instance_id = [0u8; 33];
        instance_id[0] = 0x01;
        let mut h = Sha256::new();
        h.update(huk);
        h.update(b"psaval-instance-id-v1");
        instance_id[1..].copy_from_slice(&h.finalize());

        let mut h = Sha256::new();
        h.update(huk);
        h.update(b"psaval-attestation-key-v1");
        let attestation_key: [u8; 32] = h.finalize().into();

        Self {
            implementation_id,
            instance_id,
            boot_seed,
            attestation_key,
        }
    }

    /// Exact token size for a challenge of `challenge_len` bytes
    pub fn token_size(challenge_len: usize) -> DomainResult<usize> {
        if !CHALLENGE_SIZES.contains(&challenge_len) {
            return Err(DomainStatus::INVALID_ARGUMENT);
        }
        Ok(HEADER_LEN + challenge_len + CLAIMS_LEN + TAG_LEN)
    }

    /// Write a token bound to `challenge` into `out`
    pub fn issue(&self, challenge: &[u8], out: &mut [u8]) -> DomainResult<usize> {
        let size = Self::token_size(challenge.len())?;
        if out.len() < size {
            return Err(DomainStatus::BUFFER_TOO_SMALL);
        }

        let mut token = Vec::with_capacity(size);
        token.extend_from_slice(TOKEN_MAGIC);
        token.extend_from_slice(&TOKEN_VERSION.to_le_bytes());
        // challenge_len is one of CHALLENGE_SIZES
        token.extend_from_slice(&(challenge.len() as u16).to_le_bytes());
        token.extend_from_slice(challenge);
        token.extend_from_slice(&self.implementation_id);
        token.extend_from_slice(&self.instance_id);
        token.extend_from_slice(&self.boot_seed);
        let tag = self.tag(&token);
        token.extend_from_slice(&tag);

        out[..size].copy_from_slice(&token);
        Ok(size)
    }

    fn tag(&self, body: &[u8]) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(self.attestation_key);
        h.update(body);
        h.update(b"psaval-token-tag-v1");
        h.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> DeviceClaims {
        DeviceClaims::from_huk(&[0x5a; 32], [0x11; 32])
    }

    fn challenge_of(token: &[u8]) -> &[u8] {
        let len = u16::from_le_bytes([token[6], token[7]]) as usize;
        &token[HEADER_LEN..HEADER_LEN + len]
    }

    #[test]
    fn test_token_binds_challenge() {
        let claims = claims();
        let mut challenge = [0u8; 32];
        challenge[0] = 0x2a;
        let mut buf = [0u8; 800];

        let len = claims.issue(&challenge, &mut buf).unwrap();
        assert_eq!(len, DeviceClaims::token_size(32).unwrap());
        assert_eq!(&buf[..4], TOKEN_MAGIC);
        assert_eq!(challenge_of(&buf[..len]), &challenge);

        let body = &buf[..len - TAG_LEN];
        assert_eq!(&buf[len - TAG_LEN..len], &claims.tag(body));
    }

    #[test]
    fn test_sizes_follow_service_constants() {
        for len in CHALLENGE_SIZES {
            let size = DeviceClaims::token_size(len).unwrap();
            assert!(size <= crate::services::MAX_TOKEN_SIZE);
        }
        assert_eq!(DeviceClaims::token_size(16), Err(DomainStatus::INVALID_ARGUMENT));
    }

    #[test]
    fn test_token_changes_with_challenge() {
        let claims = claims();
        let mut a = [0u8; 800];
        let mut b = [0u8; 800];
        let len = claims.issue(&[1u8; 48], &mut a).unwrap();
        claims.issue(&[2u8; 48], &mut b).unwrap();
        assert_ne!(&a[len - TAG_LEN..len], &b[len - TAG_LEN..len]);
    }

    #[test]
    fn test_token_size_rules() {
        assert_eq!(DeviceClaims::token_size(33), Err(DomainStatus::INVALID_ARGUMENT));
        let size = DeviceClaims::token_size(64).unwrap();
        let mut small = vec![0u8; size - 1];
        assert_eq!(
            claims().issue(&[0u8; 64], &mut small),
            Err(DomainStatus::BUFFER_TOO_SMALL)
        );
    }

    #[test]
    fn test_instance_id_depends_on_huk() {
        let a = DeviceClaims::from_huk(&[1; 32], [0; 32]);
        let b = DeviceClaims::from_huk(&[2; 32], [0; 32]);
        assert_eq!(a.implementation_id, b.implementation_id);
        assert_ne!(a.instance_id, b.instance_id);
        assert_eq!(a.instance_id[0], 0x01);
    }
}
