//! Streaming hash verification
//!
//! `Setup(alg) → Updated(data…) → Verified(expected) → Done`. The trusted
//! context is aborted on every path: explicitly through [`HashOperation::abort`]
//! so the release status can be reported, or by `Drop` when the operation goes
//! out of scope without it.

use crate::error::{settle, Stage, ValidationError, ValidationResult};
use crate::gateway::{Algorithm, DomainStatus, OperationHandle, Session, TrustedDomain};
use log::warn;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashState {
    Setup,
    Updated,
    Verified,
    Done,
}

impl HashState {
    fn name(self) -> &'static str {
        match self {
            HashState::Setup => "set up",
            HashState::Updated => "updated",
            HashState::Verified => "verified",
            HashState::Done => "done",
        }
    }
}

impl fmt::Display for HashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Single-use hash context held by the trusted domain
pub struct HashOperation<'s, 'g, D: TrustedDomain> {
    session: &'s mut Session<'g, D>,
    handle: OperationHandle,
    alg: Algorithm,
    state: HashState,
}

impl<'s, 'g, D: TrustedDomain> HashOperation<'s, 'g, D> {
    /// Open a context for `alg`. Nothing is held trusted-side if this fails.
    pub fn setup(session: &'s mut Session<'g, D>, alg: Algorithm) -> ValidationResult<Self> {
        let handle = session.call(Stage::HashSetup, |d| d.hash_setup(alg))?;
        Ok(Self {
            session,
            handle,
            alg,
            state: HashState::Setup,
        })
    }

    pub fn state(&self) -> HashState {
        self.state
    }

    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    pub fn update(&mut self, data: &[u8]) -> ValidationResult<()> {
        self.require(Stage::HashUpdate, &[HashState::Setup, HashState::Updated])?;
        let handle = self.handle;
        self.session
            .call(Stage::HashUpdate, |d| d.hash_update(handle, data))?;
        self.state = HashState::Updated;
        Ok(())
    }

    /// Compare the accumulated digest with `expected`
    ///
    /// The context is spent whatever the outcome; only `abort` is valid next.
    pub fn verify(&mut self, expected: &[u8]) -> ValidationResult<()> {
        self.require(Stage::HashVerify, &[HashState::Setup, HashState::Updated])?;
        let handle = self.handle;
        let result = self
            .session
            .call(Stage::HashVerify, |d| d.hash_verify(handle, expected));
        self.state = HashState::Verified;
        match result {
            Err(ValidationError::Service {
                status: DomainStatus::INVALID_SIGNATURE,
                ..
            }) => Err(ValidationError::DigestMismatch),
            other => other,
        }
    }

    /// Release the trusted-side context. Calling it again is a no-op.
    pub fn abort(&mut self) -> ValidationResult<()> {
        if self.state == HashState::Done {
            return Ok(());
        }
        self.state = HashState::Done;
        let handle = self.handle;
        self.session.call(Stage::HashAbort, |d| d.hash_abort(handle))
    }

    fn require(&self, stage: Stage, allowed: &[HashState]) -> ValidationResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ValidationError::BadSequence {
                stage,
                state: self.state.name(),
            })
        }
    }
}

impl<D: TrustedDomain> Drop for HashOperation<'_, '_, D> {
    fn drop(&mut self) {
        if self.state == HashState::Done {
            return;
        }
        warn!("Hash operation dropped while {}, aborting", self.state);
        if let Err(e) = self.abort() {
            warn!("Ignored error while aborting dropped hash operation: {}", e);
        }
    }
}

/// Hash `chunks` in order and verify the result against `expected`
pub fn verify_digest<'c, D: TrustedDomain>(
    session: &mut Session<'_, D>,
    alg: Algorithm,
    chunks: impl IntoIterator<Item = &'c [u8]>,
    expected: &[u8],
) -> ValidationResult<()> {
    let mut op = HashOperation::setup(session, alg)?;
    let outcome = chunks
        .into_iter()
        .try_for_each(|chunk| op.update(chunk))
        .and_then(|()| op.verify(expected));
    let released = op.abort();
    settle(outcome, released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;
    use crate::tee::{Fault, SimulatedDomain};

    const ABC_DIGEST: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const ABCD_DIGEST: &str = "7bd340d029f761d7af22af96ebafba8fbe2bd6b39158b6e213816418add4143b";

    fn gateway() -> Gateway<SimulatedDomain> {
        let mut gateway = Gateway::new(SimulatedDomain::new());
        gateway.initialize().unwrap();
        gateway
    }

    fn digest(hex_str: &str) -> Vec<u8> {
        hex::decode(hex_str).unwrap()
    }

    #[test]
    fn test_known_vectors() {
        let mut gateway = gateway();
        let mut session = gateway.session().unwrap();
        verify_digest(&mut session, Algorithm::SHA_256, [&b"abc"[..]], &digest(ABC_DIGEST)).unwrap();
        verify_digest(
            &mut session,
            Algorithm::SHA_256,
            [&b"abc"[..], &b"dddddddd"[..]],
            &digest(ABCD_DIGEST),
        )
        .unwrap();
        drop(session);
        assert_eq!(gateway.domain().live_operations(), 0);
    }

    #[test]
    fn test_every_single_bit_flip_is_digest_mismatch() {
        let mut gateway = gateway();
        let mut session = gateway.session().unwrap();
        let good = digest(ABC_DIGEST);
        for bit in 0..good.len() * 8 {
            let mut bad = good.clone();
            bad[bit / 8] ^= 1 << (bit % 8);
            assert_eq!(
                verify_digest(&mut session, Algorithm::SHA_256, [&b"abc"[..]], &bad),
                Err(ValidationError::DigestMismatch)
            );
        }
        drop(session);
        assert_eq!(gateway.domain().live_operations(), 0);
    }

    #[test]
    fn test_reuse_after_abort_is_bad_sequence() {
        let mut gateway = gateway();
        let mut session = gateway.session().unwrap();
        let mut op = HashOperation::setup(&mut session, Algorithm::SHA_256).unwrap();
        op.update(b"abc").unwrap();
        op.abort().unwrap();
        assert_eq!(op.state(), HashState::Done);
        assert_eq!(op.abort(), Ok(()));
        assert_eq!(
            op.update(b"more"),
            Err(ValidationError::BadSequence {
                stage: Stage::HashUpdate,
                state: "done",
            })
        );
        assert!(matches!(
            op.verify(&digest(ABC_DIGEST)),
            Err(ValidationError::BadSequence { stage: Stage::HashVerify, .. })
        ));
    }

    #[test]
    fn test_update_after_verify_is_bad_sequence() {
        let mut gateway = gateway();
        let mut session = gateway.session().unwrap();
        let mut op = HashOperation::setup(&mut session, Algorithm::SHA_256).unwrap();
        op.update(b"abc").unwrap();
        op.verify(&digest(ABC_DIGEST)).unwrap();
        assert!(matches!(
            op.update(b"abc"),
            Err(ValidationError::BadSequence { stage: Stage::HashUpdate, state: "verified" })
        ));
        op.abort().unwrap();
    }

    #[test]
    fn test_abort_from_every_state() {
        let mut gateway = gateway();
        for steps in 0..3 {
            let mut session = gateway.session().unwrap();
            let mut op = HashOperation::setup(&mut session, Algorithm::SHA_256).unwrap();
            if steps >= 1 {
                op.update(b"abc").unwrap();
            }
            if steps >= 2 {
                op.verify(&digest(ABC_DIGEST)).unwrap();
            }
            op.abort().unwrap();
            assert_eq!(op.state(), HashState::Done);
            drop(op);
            drop(session);
            assert_eq!(gateway.domain().live_operations(), 0);
        }
    }

    #[test]
    fn test_drop_aborts() {
        let mut gateway = gateway();
        {
            let mut session = gateway.session().unwrap();
            let mut op = HashOperation::setup(&mut session, Algorithm::SHA_256).unwrap();
            op.update(b"partial").unwrap();
        }
        assert_eq!(gateway.domain().live_operations(), 0);
    }

    #[test]
    fn test_update_failure_still_aborts() {
        let mut gateway = gateway();
        gateway
            .domain_mut()
            .inject(Fault::Fail(Stage::HashUpdate, DomainStatus::HARDWARE_FAILURE));
        let mut session = gateway.session().unwrap();
        assert_eq!(
            verify_digest(&mut session, Algorithm::SHA_256, [&b"abc"[..]], &digest(ABC_DIGEST)),
            Err(ValidationError::service(Stage::HashUpdate, DomainStatus::HARDWARE_FAILURE))
        );
        drop(session);
        assert_eq!(gateway.domain().live_operations(), 0);
    }

    #[test]
    fn test_abort_failure_keeps_primary() {
        let mut gateway = gateway();
        gateway
            .domain_mut()
            .inject(Fault::Fail(Stage::HashAbort, DomainStatus::COMMUNICATION_FAILURE));
        let mut session = gateway.session().unwrap();

        let err = verify_digest(&mut session, Algorithm::SHA_256, [&b"abc"[..]], &[0u8; 32])
            .unwrap_err();
        assert_eq!(err.cause(), crate::error::Cause::DigestMismatch);
        assert_eq!(
            err.cleanup_error(),
            Some(&ValidationError::service(
                Stage::HashAbort,
                DomainStatus::COMMUNICATION_FAILURE
            ))
        );

        // Release failure alone is still reported when verification passed
        assert_eq!(
            verify_digest(&mut session, Algorithm::SHA_256, [&b"abc"[..]], &digest(ABC_DIGEST)),
            Err(ValidationError::service(
                Stage::HashAbort,
                DomainStatus::COMMUNICATION_FAILURE
            ))
        );
    }

    #[test]
    fn test_unsupported_algorithm() {
        let mut gateway = gateway();
        let mut session = gateway.session().unwrap();
        assert!(matches!(
            HashOperation::setup(&mut session, Algorithm(0x0200_0013)),
            Err(ValidationError::Service {
                stage: Stage::HashSetup,
                status: DomainStatus::NOT_SUPPORTED
            })
        ));
    }
}
