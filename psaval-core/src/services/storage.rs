//! Internal trusted storage service

use crate::error::{Stage, ValidationError, ValidationResult};
use crate::gateway::{Session, StorageFlags, TrustedDomain, Uid};

impl<D: TrustedDomain> Session<'_, D> {
    /// Create or replace the record `uid`
    pub fn its_put(&mut self, uid: Uid, data: &[u8], flags: StorageFlags) -> ValidationResult<()> {
        self.call(Stage::StorageSet, |d| d.its_set(uid, data, flags))
    }

    /// Read exactly `expected_len` bytes of record `uid`
    ///
    /// A shorter read means the record is not what was stored.
    pub fn its_get(&mut self, uid: Uid, expected_len: usize) -> ValidationResult<Vec<u8>> {
        let mut out = vec![0u8; expected_len];
        let n = self.call(Stage::StorageGet, |d| d.its_get(uid, 0, &mut out))?;
        if n != expected_len {
            return Err(ValidationError::DataIntegrityMismatch {
                stage: Stage::StorageGet,
                expected_len,
                actual_len: n,
            });
        }
        Ok(out)
    }

    pub fn its_remove(&mut self, uid: Uid) -> ValidationResult<()> {
        self.call(Stage::StorageRemove, |d| d.its_remove(uid))
    }
}
