//! Caller-facing error taxonomy
//!
//! Every failure carries the [`Stage`] it happened at so the orchestrator can
//! say *where* a sequence broke, plus the raw [`DomainStatus`] when the trusted
//! domain was the one that answered with an error.

use crate::gateway::DomainStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type used by every layer above the gateway
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Step of the battery, either a trusted call or a local check on its result
///
/// The discriminants are part of the composite code and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Stage {
    Init = 0x01,
    AttestTokenSize = 0x10,
    AttestToken = 0x11,
    StorageSet = 0x20,
    StorageGet = 0x21,
    StorageCompare = 0x22,
    StorageRemove = 0x23,
    Random = 0x30,
    RandomCompare = 0x31,
    HashSetup = 0x40,
    HashUpdate = 0x41,
    HashVerify = 0x42,
    HashAbort = 0x43,
    DeriveSetup = 0x50,
    DeriveInputSecret = 0x51,
    DeriveInputInfo = 0x52,
    DeriveOutputKey = 0x53,
    DeriveAbort = 0x54,
    KeyExport = 0x55,
    KeyDestroy = 0x56,
    KeyLength = 0x57,
}

impl Stage {
    pub const ALL: [Stage; 21] = [
        Stage::Init,
        Stage::AttestTokenSize,
        Stage::AttestToken,
        Stage::StorageSet,
        Stage::StorageGet,
        Stage::StorageCompare,
        Stage::StorageRemove,
        Stage::Random,
        Stage::RandomCompare,
        Stage::HashSetup,
        Stage::HashUpdate,
        Stage::HashVerify,
        Stage::HashAbort,
        Stage::DeriveSetup,
        Stage::DeriveInputSecret,
        Stage::DeriveInputInfo,
        Stage::DeriveOutputKey,
        Stage::DeriveAbort,
        Stage::KeyExport,
        Stage::KeyDestroy,
        Stage::KeyLength,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Stage> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::AttestTokenSize => "attest.token_size",
            Stage::AttestToken => "attest.token",
            Stage::StorageSet => "its.set",
            Stage::StorageGet => "its.get",
            Stage::StorageCompare => "its.compare",
            Stage::StorageRemove => "its.remove",
            Stage::Random => "random.generate",
            Stage::RandomCompare => "random.compare",
            Stage::HashSetup => "hash.setup",
            Stage::HashUpdate => "hash.update",
            Stage::HashVerify => "hash.verify",
            Stage::HashAbort => "hash.abort",
            Stage::DeriveSetup => "derive.setup",
            Stage::DeriveInputSecret => "derive.input_secret",
            Stage::DeriveInputInfo => "derive.input_info",
            Stage::DeriveOutputKey => "derive.output_key",
            Stage::DeriveAbort => "derive.abort",
            Stage::KeyExport => "key.export",
            Stage::KeyDestroy => "key.destroy",
            Stage::KeyLength => "key.length",
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }

    /// Local checks never reach the trusted domain
    pub fn is_local(self) -> bool {
        matches!(
            self,
            Stage::StorageCompare | Stage::RandomCompare | Stage::KeyLength
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Failure category, the third byte of the composite code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Cause {
    NotInitialized = 0x01,
    Init = 0x02,
    Service = 0x03,
    DigestMismatch = 0x04,
    DerivedKeyLengthMismatch = 0x05,
    DataIntegrityMismatch = 0x06,
    BufferTooSmall = 0x07,
    InvalidChallenge = 0x08,
    BadSequence = 0x09,
    RandomRepeated = 0x0a,
}

impl Cause {
    /// Set on the cause byte when a release step failed as well
    pub const CLEANUP_FLAG: u8 = 0x80;

    pub const ALL: [Cause; 10] = [
        Cause::NotInitialized,
        Cause::Init,
        Cause::Service,
        Cause::DigestMismatch,
        Cause::DerivedKeyLengthMismatch,
        Cause::DataIntegrityMismatch,
        Cause::BufferTooSmall,
        Cause::InvalidChallenge,
        Cause::BadSequence,
        Cause::RandomRepeated,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Cause> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Cause::NotInitialized => "not_initialized",
            Cause::Init => "init",
            Cause::Service => "service",
            Cause::DigestMismatch => "digest_mismatch",
            Cause::DerivedKeyLengthMismatch => "derived_key_length_mismatch",
            Cause::DataIntegrityMismatch => "data_integrity_mismatch",
            Cause::BufferTooSmall => "buffer_too_small",
            Cause::InvalidChallenge => "invalid_challenge",
            Cause::BadSequence => "bad_sequence",
            Cause::RandomRepeated => "random_repeated",
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Failure of the one-time session setup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("channel setup failed: {0}")]
    Channel(DomainStatus),

    #[error("session already initialized")]
    AlreadyInitialized,
}

/// Validation errors surfaced to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("session not initialized")]
    NotInitialized,

    #[error("session initialization failed: {0}")]
    Init(#[from] InitError),

    #[error("{stage} failed: {status}")]
    Service { stage: Stage, status: DomainStatus },

    #[error("computed digest does not match the expected value")]
    DigestMismatch,

    /// `actual` is `None` when the key did not fit the export buffer at all
    #[error("derived key is {}, expected {expected} bytes", key_len(.actual))]
    DerivedKeyLengthMismatch {
        expected: usize,
        actual: Option<usize>,
    },

    #[error("{stage}: read back {actual_len} bytes differing from the {expected_len} stored")]
    DataIntegrityMismatch {
        stage: Stage,
        expected_len: usize,
        actual_len: usize,
    },

    #[error("{stage}: buffer of {provided} bytes too small, {required} required")]
    BufferTooSmall {
        stage: Stage,
        required: usize,
        provided: usize,
    },

    #[error("challenge of {0} bytes is not a supported size")]
    InvalidChallenge(usize),

    #[error("{stage} not allowed while the operation is {state}")]
    BadSequence { stage: Stage, state: &'static str },

    #[error("two successive random fills of {len} bytes were identical")]
    RandomRepeated { len: usize },

    #[error("{primary}; cleanup also failed: {cleanup}")]
    CleanupFailed {
        primary: Box<ValidationError>,
        cleanup: Box<ValidationError>,
    },
}

impl ValidationError {
    pub fn service(stage: Stage, status: DomainStatus) -> Self {
        ValidationError::Service { stage, status }
    }

    /// Stage the failure is attributed to
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ValidationError::NotInitialized => None,
            ValidationError::Init(_) => Some(Stage::Init),
            ValidationError::Service { stage, .. } => Some(*stage),
            ValidationError::DigestMismatch => Some(Stage::HashVerify),
            ValidationError::DerivedKeyLengthMismatch { .. } => Some(Stage::KeyLength),
            ValidationError::DataIntegrityMismatch { stage, .. } => Some(*stage),
            ValidationError::BufferTooSmall { stage, .. } => Some(*stage),
            ValidationError::InvalidChallenge(_) => Some(Stage::AttestToken),
            ValidationError::BadSequence { stage, .. } => Some(*stage),
            ValidationError::RandomRepeated { .. } => Some(Stage::RandomCompare),
            ValidationError::CleanupFailed { primary, .. } => primary.stage(),
        }
    }

    /// Raw status from the trusted domain, when it produced the failure
    pub fn status(&self) -> Option<DomainStatus> {
        match self {
            ValidationError::Service { status, .. } => Some(*status),
            ValidationError::Init(InitError::Channel(status)) => Some(*status),
            ValidationError::CleanupFailed { primary, .. } => primary.status(),
            _ => None,
        }
    }

    pub fn cause(&self) -> Cause {
        match self {
            ValidationError::NotInitialized => Cause::NotInitialized,
            ValidationError::Init(_) => Cause::Init,
            ValidationError::Service { .. } => Cause::Service,
            ValidationError::DigestMismatch => Cause::DigestMismatch,
            ValidationError::DerivedKeyLengthMismatch { .. } => Cause::DerivedKeyLengthMismatch,
            ValidationError::DataIntegrityMismatch { .. } => Cause::DataIntegrityMismatch,
            ValidationError::BufferTooSmall { .. } => Cause::BufferTooSmall,
            ValidationError::InvalidChallenge(_) => Cause::InvalidChallenge,
            ValidationError::BadSequence { .. } => Cause::BadSequence,
            ValidationError::RandomRepeated { .. } => Cause::RandomRepeated,
            ValidationError::CleanupFailed { primary, .. } => primary.cause(),
        }
    }

    /// Error raised by the release step, if one failed alongside the primary
    pub fn cleanup_error(&self) -> Option<&ValidationError> {
        match self {
            ValidationError::CleanupFailed { cleanup, .. } => Some(cleanup),
            _ => None,
        }
    }
}

fn key_len(actual: &Option<usize>) -> String {
    match actual {
        Some(n) => format!("{} bytes", n),
        None => "longer than the export buffer".to_string(),
    }
}

/// Combine the outcome of an operation with the outcome of releasing it
///
/// The primary failure always wins; a failed release is attached to it, or
/// reported on its own when the operation itself succeeded.
pub(crate) fn settle<T>(
    primary: ValidationResult<T>,
    cleanup: ValidationResult<()>,
) -> ValidationResult<T> {
    match (primary, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(cleanup)) => Err(cleanup),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(cleanup)) => Err(ValidationError::CleanupFailed {
            primary: Box::new(primary),
            cleanup: Box::new(cleanup),
        }),
    }
}
