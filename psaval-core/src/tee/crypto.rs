//! Operation contexts and key slots held by the simulated domain
//!
//! Primitives come from `sha2` and `hkdf`; this module only tracks the
//! state each context is in and answers out-of-order calls with `BAD_STATE`.

use crate::gateway::{
    Algorithm, DerivationStep, DomainResult, DomainStatus, KeyAttributes, KeyId, KeyType, KeyUsage,
};
use hkdf::Hkdf;
use sha2::digest::DynDigest;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::collections::HashMap;

/// Streaming hash context
pub struct HashContext {
    alg: Algorithm,
    hasher: Option<Box<dyn DynDigest>>,
}

impl HashContext {
    pub fn new(alg: Algorithm) -> DomainResult<Self> {
        let hasher: Box<dyn DynDigest> = match alg {
            Algorithm::SHA_224 => Box::new(Sha224::new()),
            Algorithm::SHA_256 => Box::new(Sha256::new()),
            Algorithm::SHA_384 => Box::new(Sha384::new()),
            Algorithm::SHA_512 => Box::new(Sha512::new()),
            _ if alg.is_hash() => return Err(DomainStatus::NOT_SUPPORTED),
            _ => return Err(DomainStatus::INVALID_ARGUMENT),
        };
        Ok(Self {
            alg,
            hasher: Some(hasher),
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    pub fn update(&mut self, input: &[u8]) -> DomainResult<()> {
        let hasher = self.hasher.as_mut().ok_or(DomainStatus::BAD_STATE)?;
        hasher.update(input);
        Ok(())
    }

    /// Finish the context and compare against `expected`
    ///
    /// The context is spent afterwards whatever the outcome.
    pub fn verify(&mut self, expected: &[u8]) -> DomainResult<()> {
        let hasher = self.hasher.take().ok_or(DomainStatus::BAD_STATE)?;
        let digest = hasher.finalize();
        if digest.as_ref() == expected {
            Ok(())
        } else {
            Err(DomainStatus::INVALID_SIGNATURE)
        }
    }
}

/// Key resident in the simulated domain
#[derive(Debug, Clone)]
pub struct StoredKey {
    pub attributes: KeyAttributes,
    pub material: Vec<u8>,
}

/// HKDF derivation context
#[derive(Debug)]
pub struct DerivationContext {
    salt: Option<Vec<u8>>,
    secret: Option<Vec<u8>>,
    info: Option<Vec<u8>>,
    output_started: bool,
}

impl DerivationContext {
    pub fn new(alg: Algorithm) -> DomainResult<Self> {
        match alg.hkdf_hash() {
            Some(Algorithm::SHA_256) => Ok(Self {
                salt: None,
                secret: None,
                info: None,
                output_started: false,
            }),
            Some(_) => Err(DomainStatus::NOT_SUPPORTED),
            None => Err(DomainStatus::INVALID_ARGUMENT),
        }
    }

    /// Feed a key resident in the domain as the secret input
    pub fn input_key(&mut self, step: DerivationStep, key: &StoredKey) -> DomainResult<()> {
        if step != DerivationStep::SECRET {
            return Err(DomainStatus::INVALID_ARGUMENT);
        }
        if !key.attributes.usage.contains(KeyUsage::DERIVE) {
            return Err(DomainStatus::NOT_PERMITTED);
        }
        self.input_bytes(step, &key.material)
    }

    pub fn input_bytes(&mut self, step: DerivationStep, data: &[u8]) -> DomainResult<()> {
        if self.output_started {
            return Err(DomainStatus::BAD_STATE);
        }
        match step {
            DerivationStep::SALT if self.secret.is_none() && self.salt.is_none() => {
                self.salt = Some(data.to_vec());
            }
            DerivationStep::SECRET if self.secret.is_none() => {
                self.secret = Some(data.to_vec());
            }
            DerivationStep::INFO if self.secret.is_some() && self.info.is_none() => {
                self.info = Some(data.to_vec());
            }
            DerivationStep::SALT | DerivationStep::SECRET | DerivationStep::INFO => {
                return Err(DomainStatus::BAD_STATE);
            }
            _ => return Err(DomainStatus::INVALID_ARGUMENT),
        }
        Ok(())
    }

    /// Produce key material for `attributes` from the bound inputs
    pub fn output_key(&mut self, attributes: &KeyAttributes) -> DomainResult<StoredKey> {
        let secret = self.secret.as_deref().ok_or(DomainStatus::BAD_STATE)?;
        if attributes.key_type != KeyType::DERIVE && attributes.key_type != KeyType::RAW_DATA {
            return Err(DomainStatus::NOT_SUPPORTED);
        }
        if attributes.bits == 0 || attributes.bits % 8 != 0 {
            return Err(DomainStatus::INVALID_ARGUMENT);
        }
        let hkdf = Hkdf::<Sha256>::new(self.salt.as_deref(), secret);
        let mut material = vec![0u8; attributes.byte_len()];
        hkdf.expand(self.info.as_deref().unwrap_or_default(), &mut material)
            .map_err(|_| DomainStatus::INSUFFICIENT_DATA)?;
        self.output_started = true;
        Ok(StoredKey {
            attributes: *attributes,
            material,
        })
    }
}

/// Key slots addressed by `KeyId`, with the built-in HUK kept apart
pub struct KeyStore {
    huk: StoredKey,
    keys: HashMap<KeyId, StoredKey>,
    next_id: u32,
}

impl KeyStore {
    pub fn new(huk: [u8; 32]) -> Self {
        Self {
            huk: StoredKey {
                attributes: KeyAttributes {
                    key_type: KeyType::DERIVE,
                    bits: 256,
                    usage: KeyUsage::DERIVE,
                    algorithm: Algorithm::HKDF_SHA_256,
                },
                material: huk.to_vec(),
            },
            keys: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn get(&self, id: KeyId) -> DomainResult<&StoredKey> {
        if id == KeyId::HUK {
            return Ok(&self.huk);
        }
        self.keys.get(&id).ok_or(DomainStatus::INVALID_HANDLE)
    }

    pub fn insert(&mut self, key: StoredKey) -> KeyId {
        let id = KeyId(self.next_id);
        self.next_id += 1;
        self.keys.insert(id, key);
        id
    }

    pub fn export(&self, id: KeyId, out: &mut [u8]) -> DomainResult<usize> {
        let key = self.get(id)?;
        if id == KeyId::HUK || !key.attributes.usage.contains(KeyUsage::EXPORT) {
            return Err(DomainStatus::NOT_PERMITTED);
        }
        if out.len() < key.material.len() {
            return Err(DomainStatus::BUFFER_TOO_SMALL);
        }
        out[..key.material.len()].copy_from_slice(&key.material);
        Ok(key.material.len())
    }

    pub fn destroy(&mut self, id: KeyId) -> DomainResult<()> {
        if id == KeyId::HUK {
            return Err(DomainStatus::NOT_PERMITTED);
        }
        self.keys
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainStatus::INVALID_HANDLE)
    }

    /// Keys created at runtime that are still resident
    pub fn live(&self) -> usize {
        self.keys.len()
    }
}
