//! Simulated trusted domain — software stand-in for the secure firmware
//!
//! Implements the full [`TrustedDomain`] call surface in-process so the
//! validation battery runs on a host or in CI:
//! - attestation tokens bound to the caller challenge
//! - internal trusted storage honouring creation flags
//! - random generation from the OS-seeded RNG
//! - hash and HKDF contexts addressed by handles
//!
//! Faults can be armed to make any call misbehave, and the live context and
//! key counts expose leaks left behind by the caller.

use super::attestation::DeviceClaims;
use super::crypto::{DerivationContext, HashContext, KeyStore};
use super::fault::{Fault, FaultPlan};
use super::storage::ItsStore;
use crate::error::Stage;
use crate::gateway::{
    Algorithm, DerivationStep, DomainResult, DomainStatus, KeyAttributes, KeyId, OperationHandle,
    StorageFlags, TrustedDomain, Uid,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of the simulated domain's resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveStatus {
    /// Unique identifier
    pub domain_id: String,
    /// A session has been opened
    pub connected: bool,
    /// Records held in internal trusted storage
    pub stored_records: usize,
    /// Hash and derivation contexts not yet aborted
    pub live_operations: usize,
    /// Derived keys not yet destroyed
    pub live_keys: usize,
    pub faults_armed: bool,
}

/// In-process trusted domain
pub struct SimulatedDomain {
    /// Unique identifier
    pub id: String,
    connected: bool,
    claims: DeviceClaims,
    storage: ItsStore,
    hashes: HashMap<OperationHandle, HashContext>,
    derivations: HashMap<OperationHandle, DerivationContext>,
    keys: KeyStore,
    next_handle: u32,
    faults: FaultPlan,
}

impl SimulatedDomain {
    /// Fresh domain with a random HUK and boot seed
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let mut huk = [0u8; 32];
        let mut boot_seed = [0u8; 32];
        rng.fill_bytes(&mut huk);
        rng.fill_bytes(&mut boot_seed);
        Self::with_huk(huk, boot_seed)
    }

    /// Domain with a fixed HUK, for reproducible derivations
    pub fn with_huk(huk: [u8; 32], boot_seed: [u8; 32]) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("Simulated trusted domain created: id={}", &id[..8]);
        Self {
            id,
            connected: false,
            claims: DeviceClaims::from_huk(&huk, boot_seed),
            storage: ItsStore::default(),
            hashes: HashMap::new(),
            derivations: HashMap::new(),
            keys: KeyStore::new(huk),
            next_handle: 1,
            faults: FaultPlan::default(),
        }
    }

    pub fn inject(&mut self, fault: Fault) {
        log::debug!("Arming fault {:?}", fault);
        self.faults.arm(fault);
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Hash and derivation contexts not yet aborted
    pub fn live_operations(&self) -> usize {
        self.hashes.len() + self.derivations.len()
    }

    /// Derived keys not yet destroyed
    pub fn live_keys(&self) -> usize {
        self.keys.live()
    }

    pub fn has_record(&self, uid: Uid) -> bool {
        self.storage.contains(uid)
    }

    pub fn status(&self) -> EnclaveStatus {
        EnclaveStatus {
            domain_id: self.id.clone(),
            connected: self.connected,
            stored_records: self.storage.len(),
            live_operations: self.live_operations(),
            live_keys: self.live_keys(),
            faults_armed: !self.faults.is_empty(),
        }
    }

    /// Gate shared by every call: channel up and no fault armed for `stage`
    fn enter(&self, stage: Stage) -> DomainResult<()> {
        if !self.connected {
            return Err(DomainStatus::CONNECTION_REFUSED);
        }
        self.faults.check(stage)
    }

    fn allocate_handle(&mut self) -> OperationHandle {
        let handle = OperationHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn hash_context(&mut self, op: OperationHandle) -> DomainResult<&mut HashContext> {
        self.hashes.get_mut(&op).ok_or(DomainStatus::INVALID_HANDLE)
    }

    fn derivation_context(&mut self, op: OperationHandle) -> DomainResult<&mut DerivationContext> {
        self.derivations
            .get_mut(&op)
            .ok_or(DomainStatus::INVALID_HANDLE)
    }
}

impl Default for SimulatedDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustedDomain for SimulatedDomain {
    fn connect(&mut self) -> DomainResult<()> {
        self.faults.check(Stage::Init)?;
        self.connected = true;
        Ok(())
    }

    fn attest_token_size(&mut self, challenge_len: usize) -> DomainResult<usize> {
        self.enter(Stage::AttestTokenSize)?;
        DeviceClaims::token_size(challenge_len)
    }

    fn attest_token(&mut self, challenge: &[u8], token: &mut [u8]) -> DomainResult<usize> {
        self.enter(Stage::AttestToken)?;
        self.claims.issue(challenge, token)
    }

    fn its_set(&mut self, uid: Uid, data: &[u8], flags: StorageFlags) -> DomainResult<()> {
        self.enter(Stage::StorageSet)?;
        self.storage.set(uid, data, flags)
    }

    fn its_get(&mut self, uid: Uid, offset: usize, out: &mut [u8]) -> DomainResult<usize> {
        self.enter(Stage::StorageGet)?;
        let n = self.storage.get(uid, offset, out)?;
        if n > 0 && self.faults.corrupt_read() {
            out[0] ^= 0x01;
        }
        Ok(n)
    }

    fn its_remove(&mut self, uid: Uid) -> DomainResult<()> {
        self.enter(Stage::StorageRemove)?;
        self.storage.remove(uid)
    }

    fn generate_random(&mut self, out: &mut [u8]) -> DomainResult<()> {
        self.enter(Stage::Random)?;
        if self.faults.repeat_random() {
            out.fill(0);
        } else {
            rand::thread_rng().fill_bytes(out);
        }
        Ok(())
    }

    fn hash_setup(&mut self, alg: Algorithm) -> DomainResult<OperationHandle> {
        self.enter(Stage::HashSetup)?;
        let ctx = HashContext::new(alg)?;
        let handle = self.allocate_handle();
        log::debug!("Hash context {:?} opened for {}", handle, ctx.algorithm());
        self.hashes.insert(handle, ctx);
        Ok(handle)
    }

    fn hash_update(&mut self, op: OperationHandle, input: &[u8]) -> DomainResult<()> {
        self.enter(Stage::HashUpdate)?;
        self.hash_context(op)?.update(input)
    }

    fn hash_verify(&mut self, op: OperationHandle, expected: &[u8]) -> DomainResult<()> {
        self.enter(Stage::HashVerify)?;
        self.hash_context(op)?.verify(expected)
    }

    fn hash_abort(&mut self, op: OperationHandle) -> DomainResult<()> {
        self.enter(Stage::HashAbort)?;
        self.hashes
            .remove(&op)
            .map(|_| ())
            .ok_or(DomainStatus::INVALID_HANDLE)
    }

    fn key_derivation_setup(&mut self, alg: Algorithm) -> DomainResult<OperationHandle> {
        self.enter(Stage::DeriveSetup)?;
        let ctx = DerivationContext::new(alg)?;
        let handle = self.allocate_handle();
        self.derivations.insert(handle, ctx);
        Ok(handle)
    }

    fn key_derivation_input_key(
        &mut self,
        op: OperationHandle,
        step: DerivationStep,
        key: KeyId,
    ) -> DomainResult<()> {
        self.enter(Stage::DeriveInputSecret)?;
        let key = self.keys.get(key)?.clone();
        self.derivation_context(op)?.input_key(step, &key)
    }

    fn key_derivation_input_bytes(
        &mut self,
        op: OperationHandle,
        step: DerivationStep,
        data: &[u8],
    ) -> DomainResult<()> {
        self.enter(Stage::DeriveInputInfo)?;
        self.derivation_context(op)?.input_bytes(step, data)
    }

    fn key_derivation_output_key(
        &mut self,
        attributes: &KeyAttributes,
        op: OperationHandle,
    ) -> DomainResult<KeyId> {
        self.enter(Stage::DeriveOutputKey)?;
        let key = self.derivation_context(op)?.output_key(attributes)?;
        Ok(self.keys.insert(key))
    }

    fn key_derivation_abort(&mut self, op: OperationHandle) -> DomainResult<()> {
        self.enter(Stage::DeriveAbort)?;
        self.derivations
            .remove(&op)
            .map(|_| ())
            .ok_or(DomainStatus::INVALID_HANDLE)
    }

    fn export_key(&mut self, key: KeyId, out: &mut [u8]) -> DomainResult<usize> {
        self.enter(Stage::KeyExport)?;
        let n = self.keys.export(key, out)?;
        if let Some(len) = self.faults.long_export().filter(|&len| len > n) {
            out.get_mut(n..len)
                .ok_or(DomainStatus::BUFFER_TOO_SMALL)?
                .fill(0);
            return Ok(len);
        }
        Ok(self.faults.short_export().map_or(n, |limit| n.min(limit)))
    }

    fn destroy_key(&mut self, key: KeyId) -> DomainResult<()> {
        self.enter(Stage::KeyDestroy)?;
        self.keys.destroy(key)
    }
}
