//! Hardware-rooted key derivation
//!
//! `Setup(alg) → SecretBound(source) → InfoBound(label) → KeyMaterialized`,
//! then the derivation context is aborted whether or not a key came out of
//! it. The resulting key is held by a [`DerivedKey`] that destroys it on
//! every path once it has been exported.

use crate::error::{settle, Stage, ValidationError, ValidationResult};
use crate::gateway::{
    Algorithm, DerivationStep, DomainStatus, KeyAttributes, KeyId, KeyType, KeyUsage,
    OperationHandle, Session, TrustedDomain,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extra room in the export buffer so over-long keys are caught too
const EXPORT_SLACK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationState {
    Setup,
    SecretBound,
    InfoBound,
    KeyMaterialized,
    Done,
}

impl DerivationState {
    fn name(self) -> &'static str {
        match self {
            DerivationState::Setup => "set up",
            DerivationState::SecretBound => "secret-bound",
            DerivationState::InfoBound => "info-bound",
            DerivationState::KeyMaterialized => "key-materialized",
            DerivationState::Done => "done",
        }
    }
}

impl fmt::Display for DerivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to derive and from where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationRequest {
    pub algorithm: Algorithm,
    pub key_source: KeyId,
    #[serde(with = "hex")]
    pub label: Vec<u8>,
    pub attributes: KeyAttributes,
}

impl Default for DerivationRequest {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HKDF_SHA_256,
            key_source: KeyId::HUK,
            label: b"key_1\0".to_vec(),
            attributes: KeyAttributes {
                key_type: KeyType::DERIVE,
                bits: 256,
                usage: KeyUsage::DERIVE | KeyUsage::EXPORT,
                algorithm: Algorithm::HKDF_SHA_256,
            },
        }
    }
}

/// Single-use derivation context held by the trusted domain
pub struct DerivationOperation<'s, 'g, D: TrustedDomain> {
    session: &'s mut Session<'g, D>,
    handle: OperationHandle,
    state: DerivationState,
}

impl<'s, 'g, D: TrustedDomain> DerivationOperation<'s, 'g, D> {
    pub fn setup(session: &'s mut Session<'g, D>, alg: Algorithm) -> ValidationResult<Self> {
        let handle = session.call(Stage::DeriveSetup, |d| d.key_derivation_setup(alg))?;
        Ok(Self {
            session,
            handle,
            state: DerivationState::Setup,
        })
    }

    pub fn state(&self) -> DerivationState {
        self.state
    }

    /// Bind a key resident in the trusted domain as the secret input
    pub fn input_secret(&mut self, source: KeyId) -> ValidationResult<()> {
        self.require(Stage::DeriveInputSecret, DerivationState::Setup)?;
        let handle = self.handle;
        self.session.call(Stage::DeriveInputSecret, |d| {
            d.key_derivation_input_key(handle, DerivationStep::SECRET, source)
        })?;
        self.state = DerivationState::SecretBound;
        Ok(())
    }

    pub fn input_info(&mut self, label: &[u8]) -> ValidationResult<()> {
        self.require(Stage::DeriveInputInfo, DerivationState::SecretBound)?;
        let handle = self.handle;
        self.session.call(Stage::DeriveInputInfo, |d| {
            d.key_derivation_input_bytes(handle, DerivationStep::INFO, label)
        })?;
        self.state = DerivationState::InfoBound;
        Ok(())
    }

    /// Create the derived key inside the trusted domain
    pub fn output_key(&mut self, attributes: &KeyAttributes) -> ValidationResult<KeyId> {
        self.require(Stage::DeriveOutputKey, DerivationState::InfoBound)?;
        let handle = self.handle;
        let key = self.session.call(Stage::DeriveOutputKey, |d| {
            d.key_derivation_output_key(attributes, handle)
        })?;
        self.state = DerivationState::KeyMaterialized;
        debug!("Derived key {:?} materialized", key);
        Ok(key)
    }

    /// Release the derivation context. Calling it again is a no-op.
    pub fn abort(&mut self) -> ValidationResult<()> {
        if self.state == DerivationState::Done {
            return Ok(());
        }
        self.state = DerivationState::Done;
        let handle = self.handle;
        self.session
            .call(Stage::DeriveAbort, |d| d.key_derivation_abort(handle))
    }

    fn require(&self, stage: Stage, from: DerivationState) -> ValidationResult<()> {
        if self.state == from {
            Ok(())
        } else {
            Err(ValidationError::BadSequence {
                stage,
                state: self.state.name(),
            })
        }
    }
}

impl<D: TrustedDomain> Drop for DerivationOperation<'_, '_, D> {
    fn drop(&mut self) {
        if self.state == DerivationState::Done {
            return;
        }
        warn!("Derivation operation dropped while {}, aborting", self.state);
        if let Err(e) = self.abort() {
            warn!("Ignored error while aborting dropped derivation: {}", e);
        }
    }
}

/// Handle to a derived key resident in the trusted domain
pub struct DerivedKey<'s, 'g, D: TrustedDomain> {
    session: &'s mut Session<'g, D>,
    id: KeyId,
    attributes: KeyAttributes,
    destroyed: bool,
}

impl<'s, 'g, D: TrustedDomain> DerivedKey<'s, 'g, D> {
    /// Take ownership of a key the trusted domain has just created
    pub fn adopt(session: &'s mut Session<'g, D>, id: KeyId, attributes: KeyAttributes) -> Self {
        Self {
            session,
            id,
            attributes,
            destroyed: false,
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    /// Export the key material, however long the domain says it is
    ///
    /// A key that overflows the export buffer comes back from the domain as
    /// `BUFFER_TOO_SMALL`.
    pub fn export(&mut self) -> ValidationResult<Vec<u8>> {
        if self.destroyed {
            return Err(ValidationError::BadSequence {
                stage: Stage::KeyExport,
                state: "destroyed",
            });
        }
        let mut out = vec![0u8; self.attributes.byte_len() + EXPORT_SLACK];
        let id = self.id;
        let n = self
            .session
            .call(Stage::KeyExport, |d| d.export_key(id, &mut out))?;
        out.truncate(n);
        Ok(out)
    }

    /// Destroy the key. Calling it again is a no-op.
    pub fn destroy(&mut self) -> ValidationResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let id = self.id;
        self.session.call(Stage::KeyDestroy, |d| d.destroy_key(id))
    }
}

impl<D: TrustedDomain> Drop for DerivedKey<'_, '_, D> {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }
        warn!("Derived key {:?} dropped without destroy, destroying", self.id);
        if let Err(e) = self.destroy() {
            warn!("Ignored error while destroying dropped key: {}", e);
        }
    }
}

/// Run the whole derivation protocol and return the exported key
///
/// The derivation context is aborted and the key destroyed before returning,
/// on success and on every failure.
pub fn derive_key<D: TrustedDomain>(
    session: &mut Session<'_, D>,
    request: &DerivationRequest,
) -> ValidationResult<Vec<u8>> {
    let mut op = DerivationOperation::setup(session, request.algorithm)?;
    let materialized = op
        .input_secret(request.key_source)
        .and_then(|()| op.input_info(&request.label))
        .and_then(|()| op.output_key(&request.attributes));
    let released = op.abort();
    drop(op);

    let id = match materialized {
        Ok(id) => id,
        Err(e) => return settle(Err(e), released),
    };

    let mut key = DerivedKey::adopt(session, id, request.attributes);
    let expected = request.attributes.byte_len();
    let outcome = released
        .and_then(|()| key.export())
        .map_err(|e| match e {
            ValidationError::Service {
                stage: Stage::KeyExport,
                status: DomainStatus::BUFFER_TOO_SMALL,
            } => ValidationError::DerivedKeyLengthMismatch {
                expected,
                actual: None,
            },
            other => other,
        })
        .and_then(|bytes| {
            if bytes.len() == expected {
                Ok(bytes)
            } else {
                Err(ValidationError::DerivedKeyLengthMismatch {
                    expected,
                    actual: Some(bytes.len()),
                })
            }
        });
    let destroyed = key.destroy();
    settle(outcome, destroyed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Cause;
    use crate::gateway::{DomainStatus, Gateway};
    use crate::tee::{Fault, SimulatedDomain};

    fn gateway_with(faults: &[Fault]) -> Gateway<SimulatedDomain> {
        let mut domain = SimulatedDomain::with_huk([0x33; 32], [0; 32]);
        for fault in faults {
            domain.inject(*fault);
        }
        let mut gateway = Gateway::new(domain);
        gateway.initialize().unwrap();
        gateway
    }

    fn assert_no_leaks(gateway: &Gateway<SimulatedDomain>) {
        assert_eq!(gateway.domain().live_operations(), 0);
        assert_eq!(gateway.domain().live_keys(), 0);
    }

    #[test]
    fn test_derive_256_bits() {
        let mut gateway = gateway_with(&[]);
        let mut session = gateway.session().unwrap();
        let request = DerivationRequest::default();
        let first = derive_key(&mut session, &request).unwrap();
        let second = derive_key(&mut session, &request).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
        drop(session);
        assert_no_leaks(&gateway);
    }

    #[test]
    fn test_label_changes_key() {
        let mut gateway = gateway_with(&[]);
        let mut session = gateway.session().unwrap();
        let a = derive_key(&mut session, &DerivationRequest::default()).unwrap();
        let b = derive_key(
            &mut session,
            &DerivationRequest {
                label: b"key_2\0".to_vec(),
                ..DerivationRequest::default()
            },
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_export_is_length_mismatch() {
        let mut gateway = gateway_with(&[Fault::ShortExport(16)]);
        let mut session = gateway.session().unwrap();
        assert_eq!(
            derive_key(&mut session, &DerivationRequest::default()),
            Err(ValidationError::DerivedKeyLengthMismatch {
                expected: 32,
                actual: Some(16),
            })
        );
        drop(session);
        assert_no_leaks(&gateway);
    }

    #[test]
    fn test_long_export_is_length_mismatch() {
        let mut gateway = gateway_with(&[Fault::LongExport(40)]);
        let mut session = gateway.session().unwrap();
        assert_eq!(
            derive_key(&mut session, &DerivationRequest::default()),
            Err(ValidationError::DerivedKeyLengthMismatch {
                expected: 32,
                actual: Some(40),
            })
        );
        drop(session);
        assert_no_leaks(&gateway);
    }

    #[test]
    fn test_key_overflowing_buffer_is_length_mismatch() {
        let mut gateway = gateway_with(&[Fault::LongExport(100)]);
        let mut session = gateway.session().unwrap();
        let err = derive_key(&mut session, &DerivationRequest::default()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DerivedKeyLengthMismatch {
                expected: 32,
                actual: None,
            }
        );
        assert_eq!(err.stage(), Some(Stage::KeyLength));
        assert_eq!(err.status(), None);
        drop(session);
        assert_no_leaks(&gateway);
    }

    #[test]
    fn test_failure_at_each_step_releases_everything() {
        let stages = [
            Stage::DeriveInputSecret,
            Stage::DeriveInputInfo,
            Stage::DeriveOutputKey,
            Stage::KeyExport,
        ];
        for stage in stages {
            let mut gateway = gateway_with(&[Fault::Fail(stage, DomainStatus::GENERIC_ERROR)]);
            let mut session = gateway.session().unwrap();
            let err = derive_key(&mut session, &DerivationRequest::default()).unwrap_err();
            assert_eq!(err, ValidationError::service(stage, DomainStatus::GENERIC_ERROR));
            drop(session);
            assert_no_leaks(&gateway);
        }
    }

    #[test]
    fn test_abort_failure_still_destroys_key() {
        let mut gateway = gateway_with(&[Fault::Fail(Stage::DeriveAbort, DomainStatus::BAD_STATE)]);
        let mut session = gateway.session().unwrap();
        let err = derive_key(&mut session, &DerivationRequest::default()).unwrap_err();
        assert_eq!(err, ValidationError::service(Stage::DeriveAbort, DomainStatus::BAD_STATE));
        drop(session);
        assert_eq!(gateway.domain().live_keys(), 0);
    }

    #[test]
    fn test_destroy_failure_keeps_primary() {
        let mut gateway = gateway_with(&[
            Fault::ShortExport(8),
            Fault::Fail(Stage::KeyDestroy, DomainStatus::HARDWARE_FAILURE),
        ]);
        let mut session = gateway.session().unwrap();
        let err = derive_key(&mut session, &DerivationRequest::default()).unwrap_err();
        assert_eq!(err.cause(), Cause::DerivedKeyLengthMismatch);
        assert_eq!(
            err.cleanup_error(),
            Some(&ValidationError::service(
                Stage::KeyDestroy,
                DomainStatus::HARDWARE_FAILURE
            ))
        );
    }

    #[test]
    fn test_out_of_order_steps() {
        let mut gateway = gateway_with(&[]);
        let mut session = gateway.session().unwrap();
        let mut op = DerivationOperation::setup(&mut session, Algorithm::HKDF_SHA_256).unwrap();
        assert_eq!(
            op.input_info(b"key_1\0"),
            Err(ValidationError::BadSequence {
                stage: Stage::DeriveInputInfo,
                state: "set up",
            })
        );
        assert!(matches!(
            op.output_key(&DerivationRequest::default().attributes),
            Err(ValidationError::BadSequence { stage: Stage::DeriveOutputKey, .. })
        ));
        op.input_secret(KeyId::HUK).unwrap();
        assert!(matches!(
            op.input_secret(KeyId::HUK),
            Err(ValidationError::BadSequence { stage: Stage::DeriveInputSecret, state: "secret-bound" })
        ));
        op.abort().unwrap();
        assert_eq!(op.state(), DerivationState::Done);
        assert_eq!(op.abort(), Ok(()));
        assert!(matches!(
            op.input_info(b"key_1\0"),
            Err(ValidationError::BadSequence { state: "done", .. })
        ));
        drop(op);
        drop(session);
        assert_no_leaks(&gateway);
    }

    #[test]
    fn test_dropped_operation_aborts() {
        let mut gateway = gateway_with(&[]);
        {
            let mut session = gateway.session().unwrap();
            let mut op = DerivationOperation::setup(&mut session, Algorithm::HKDF_SHA_256).unwrap();
            op.input_secret(KeyId::HUK).unwrap();
        }
        assert_no_leaks(&gateway);
    }

    #[test]
    fn test_export_after_destroy() {
        let mut gateway = gateway_with(&[]);
        let mut session = gateway.session().unwrap();
        let request = DerivationRequest::default();
        let id = {
            let mut op = DerivationOperation::setup(&mut session, request.algorithm).unwrap();
            op.input_secret(request.key_source).unwrap();
            op.input_info(&request.label).unwrap();
            let id = op.output_key(&request.attributes).unwrap();
            op.abort().unwrap();
            id
        };
        let mut key = DerivedKey::adopt(&mut session, id, request.attributes);
        assert_eq!(key.export().unwrap().len(), 32);
        key.destroy().unwrap();
        assert_eq!(key.destroy(), Ok(()));
        assert!(matches!(
            key.export(),
            Err(ValidationError::BadSequence { stage: Stage::KeyExport, .. })
        ));
    }
}
