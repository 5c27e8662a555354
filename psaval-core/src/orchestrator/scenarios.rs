//! The validation battery
//!
//! Each scenario exercises one trusted service end to end and returns the
//! first error it hit. Scenarios after `SessionInit` open their own session
//! and fail with `NotInitialized` if the gateway never came up.

use crate::config::ValidationConfig;
use crate::error::{settle, Stage, ValidationError, ValidationResult};
use crate::gateway::{Gateway, TrustedDomain};
use crate::sequencer::{derive_key, verify_digest};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scenario identifier, the top byte of the composite code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ScenarioId {
    SessionInit = 1,
    Attestation = 2,
    Storage = 3,
    Random = 4,
    Hash = 5,
    Derivation = 6,
}

impl ScenarioId {
    /// Battery order
    pub const ALL: [ScenarioId; 6] = [
        ScenarioId::SessionInit,
        ScenarioId::Attestation,
        ScenarioId::Storage,
        ScenarioId::Random,
        ScenarioId::Hash,
        ScenarioId::Derivation,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<ScenarioId> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScenarioId::SessionInit => "session_init",
            ScenarioId::Attestation => "attestation",
            ScenarioId::Storage => "storage",
            ScenarioId::Random => "random",
            ScenarioId::Hash => "hash",
            ScenarioId::Derivation => "derivation",
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

pub type ScenarioFn<D> = fn(&mut Gateway<D>, &ValidationConfig) -> ValidationResult<()>;

/// Every scenario paired with its id, in run order
pub fn battery<D: TrustedDomain>() -> [(ScenarioId, ScenarioFn<D>); 6] {
    [
        (ScenarioId::SessionInit, session_init::<D> as ScenarioFn<D>),
        (ScenarioId::Attestation, attestation::<D> as ScenarioFn<D>),
        (ScenarioId::Storage, storage::<D> as ScenarioFn<D>),
        (ScenarioId::Random, random::<D> as ScenarioFn<D>),
        (ScenarioId::Hash, hash::<D> as ScenarioFn<D>),
        (ScenarioId::Derivation, derivation::<D> as ScenarioFn<D>),
    ]
}

pub fn session_init<D: TrustedDomain>(
    gateway: &mut Gateway<D>,
    _config: &ValidationConfig,
) -> ValidationResult<()> {
    gateway.initialize()?;
    Ok(())
}

/// Fetch a token for the configured challenge; the size query comes first
pub fn attestation<D: TrustedDomain>(
    gateway: &mut Gateway<D>,
    config: &ValidationConfig,
) -> ValidationResult<()> {
    let mut session = gateway.session()?;
    let mut token = vec![0u8; config.token_buffer_size];
    let len = session.attest_token(&config.challenge, &mut token)?;
    debug!("Attestation token of {} bytes in a {} byte buffer", len, token.len());
    Ok(())
}

/// Store a record, read it back byte for byte, then remove it
pub fn storage<D: TrustedDomain>(
    gateway: &mut Gateway<D>,
    config: &ValidationConfig,
) -> ValidationResult<()> {
    let storage = &config.storage;
    let mut session = gateway.session()?;
    session.its_put(storage.uid, &storage.data, storage.flags)?;
    let checked = session
        .its_get(storage.uid, storage.data.len())
        .and_then(|read| {
            if read == storage.data {
                Ok(())
            } else {
                Err(ValidationError::DataIntegrityMismatch {
                    stage: Stage::StorageCompare,
                    expected_len: storage.data.len(),
                    actual_len: read.len(),
                })
            }
        });
    if storage.remove_after {
        settle(checked, session.its_remove(storage.uid))
    } else {
        checked
    }
}

/// Two successive fills must both succeed and must differ
pub fn random<D: TrustedDomain>(
    gateway: &mut Gateway<D>,
    config: &ValidationConfig,
) -> ValidationResult<()> {
    let mut session = gateway.session()?;
    let first = session.random_bytes(config.random_len)?;
    let second = session.random_bytes(config.random_len)?;
    if first == second {
        return Err(ValidationError::RandomRepeated {
            len: config.random_len,
        });
    }
    Ok(())
}

pub fn hash<D: TrustedDomain>(
    gateway: &mut Gateway<D>,
    config: &ValidationConfig,
) -> ValidationResult<()> {
    let mut session = gateway.session()?;
    for vector in &config.hash_vectors {
        verify_digest(
            &mut session,
            vector.algorithm,
            vector.chunks.iter().map(|chunk| chunk.0.as_slice()),
            &vector.expected,
        )?;
    }
    Ok(())
}

pub fn derivation<D: TrustedDomain>(
    gateway: &mut Gateway<D>,
    config: &ValidationConfig,
) -> ValidationResult<()> {
    let mut session = gateway.session()?;
    let key = derive_key(&mut session, &config.derivation)?;
    debug!("Derived and exported {} key bytes", key.len());
    Ok(())
}
