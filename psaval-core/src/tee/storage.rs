//! In-memory internal trusted storage for the simulated domain

use crate::gateway::{DomainResult, DomainStatus, StorageFlags, Uid};
use std::collections::HashMap;

/// Largest record the store accepts
pub const MAX_ASSET_SIZE: usize = 512;

#[derive(Debug, Clone)]
struct Record {
    data: Vec<u8>,
    flags: StorageFlags,
}

/// Uid-keyed record store honouring the creation flags
#[derive(Debug, Default)]
pub struct ItsStore {
    records: HashMap<Uid, Record>,
}

impl ItsStore {
    pub fn set(&mut self, uid: Uid, data: &[u8], flags: StorageFlags) -> DomainResult<()> {
        if uid == 0 || data.len() > MAX_ASSET_SIZE {
            return Err(DomainStatus::INVALID_ARGUMENT);
        }
        if flags.0 & !StorageFlags::ALL.0 != 0 {
            return Err(DomainStatus::NOT_SUPPORTED);
        }
        if let Some(existing) = self.records.get(&uid) {
            if existing.flags.contains(StorageFlags::WRITE_ONCE) {
                return Err(DomainStatus::NOT_PERMITTED);
            }
        }
        self.records.insert(
            uid,
            Record {
                data: data.to_vec(),
                flags,
            },
        );
        Ok(())
    }

    pub fn get(&self, uid: Uid, offset: usize, out: &mut [u8]) -> DomainResult<usize> {
        let record = self.records.get(&uid).ok_or(DomainStatus::DOES_NOT_EXIST)?;
        if offset > record.data.len() {
            return Err(DomainStatus::INVALID_ARGUMENT);
        }
        let available = &record.data[offset..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    pub fn remove(&mut self, uid: Uid) -> DomainResult<()> {
        let record = self.records.get(&uid).ok_or(DomainStatus::DOES_NOT_EXIST)?;
        if record.flags.contains(StorageFlags::WRITE_ONCE) {
            return Err(DomainStatus::NOT_PERMITTED);
        }
        self.records.remove(&uid);
        Ok(())
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.records.contains_key(&uid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_partial() {
        let mut store = ItsStore::default();
        store.set(5, b"trusted bytes", StorageFlags::NONE).unwrap();

        let mut out = [0u8; 5];
        assert_eq!(store.get(5, 8, &mut out), Ok(5));
        assert_eq!(&out, b"bytes");

        let mut big = [0u8; 64];
        assert_eq!(store.get(5, 0, &mut big), Ok(13));
        assert_eq!(store.get(5, 14, &mut big), Err(DomainStatus::INVALID_ARGUMENT));
        assert_eq!(store.get(6, 0, &mut big), Err(DomainStatus::DOES_NOT_EXIST));
    }

    #[test]
    fn test_write_once() {
        let mut store = ItsStore::default();
        store.set(9, b"first", StorageFlags::WRITE_ONCE).unwrap();
        assert_eq!(store.set(9, b"second", StorageFlags::NONE), Err(DomainStatus::NOT_PERMITTED));
        assert_eq!(store.remove(9), Err(DomainStatus::NOT_PERMITTED));
        assert!(store.contains(9));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let mut store = ItsStore::default();
        assert_eq!(store.set(0, b"x", StorageFlags::NONE), Err(DomainStatus::INVALID_ARGUMENT));
        assert_eq!(
            store.set(1, &[0u8; MAX_ASSET_SIZE + 1], StorageFlags::NONE),
            Err(DomainStatus::INVALID_ARGUMENT)
        );
        assert_eq!(store.set(1, b"x", StorageFlags(1 << 7)), Err(DomainStatus::NOT_SUPPORTED));
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let mut store = ItsStore::default();
        store.set(3, b"old", StorageFlags::NONE).unwrap();
        store.set(3, b"newer", StorageFlags::NONE).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(store.get(3, 0, &mut out), Ok(5));
        store.remove(3).unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(store.remove(3), Err(DomainStatus::DOES_NOT_EXIST));
    }
}
