//! Initial attestation service

use crate::error::{Stage, ValidationError, ValidationResult};
use crate::gateway::{DomainStatus, Session, TrustedDomain};

/// Worst-case token size, the default token buffer
pub const MAX_TOKEN_SIZE: usize = 800;

/// Challenge sizes the attestation service accepts
pub const CHALLENGE_SIZES: [usize; 3] = [32, 48, 64];

fn check_challenge(len: usize) -> ValidationResult<()> {
    if CHALLENGE_SIZES.contains(&len) {
        Ok(())
    } else {
        Err(ValidationError::InvalidChallenge(len))
    }
}

impl<D: TrustedDomain> Session<'_, D> {
    /// Size of the token the domain would issue for this challenge length
    pub fn attest_token_size(&mut self, challenge_len: usize) -> ValidationResult<usize> {
        check_challenge(challenge_len)?;
        self.call(Stage::AttestTokenSize, |d| d.attest_token_size(challenge_len))
    }

    /// Fetch a token bound to `challenge` into `buffer`, returning its length
    ///
    /// The token size is queried first. A buffer shorter than that size, or
    /// one the domain itself rejects as too small, is `BufferTooSmall`.
    pub fn attest_token(&mut self, challenge: &[u8], buffer: &mut [u8]) -> ValidationResult<usize> {
        let required = self.attest_token_size(challenge.len())?;
        let too_small = ValidationError::BufferTooSmall {
            stage: Stage::AttestToken,
            required,
            provided: buffer.len(),
        };
        if buffer.len() < required {
            return Err(too_small);
        }
        self.call(Stage::AttestToken, |d| d.attest_token(challenge, buffer))
            .map_err(|e| match e {
                ValidationError::Service {
                    status: DomainStatus::BUFFER_TOO_SMALL,
                    ..
                } => too_small,
                other => other,
            })
    }
}
