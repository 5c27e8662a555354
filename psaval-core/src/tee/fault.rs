//! Fault injection for the simulated trusted domain
//!
//! Faults stay armed until cleared, so a fault on a call that a scenario makes
//! twice (two hash vectors, say) hits both.

use crate::error::Stage;
use crate::gateway::{DomainResult, DomainStatus};
use log::debug;
use std::str::FromStr;

/// A deliberate misbehaviour of the simulated domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer the call made at `Stage` with the given status
    Fail(Stage, DomainStatus),
    /// Export at most this many bytes while still reporting success
    ShortExport(usize),
    /// Report this many exported bytes, padding the key with zeros, or
    /// `BUFFER_TOO_SMALL` when the caller's buffer cannot hold them
    LongExport(usize),
    /// Flip a bit in the first byte returned by storage reads
    CorruptRead,
    /// Return the same fixed bytes from every random request
    RepeatRandom,
}

/// Parses `STAGE[=STATUS]`, `short-export=LEN`, `long-export=LEN`,
/// `corrupt-read` or `repeat-random`. A bare stage fails with `GENERIC_ERROR`.
impl FromStr for Fault {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, value) = match s.split_once('=') {
            Some((head, value)) => (head, Some(value)),
            None => (s, None),
        };
        match (head, value) {
            ("corrupt-read", None) => Ok(Fault::CorruptRead),
            ("repeat-random", None) => Ok(Fault::RepeatRandom),
            ("short-export", Some(len)) => len
                .parse()
                .map(Fault::ShortExport)
                .map_err(|_| format!("bad export length '{}'", len)),
            ("long-export", Some(len)) => len
                .parse()
                .map(Fault::LongExport)
                .map_err(|_| format!("bad export length '{}'", len)),
            (stage, value) => {
                let stage =
                    Stage::from_name(stage).ok_or_else(|| format!("unknown stage '{}'", stage))?;
                let status = match value {
                    None => DomainStatus::GENERIC_ERROR,
                    Some(name) => DomainStatus::from_name(name)
                        .or_else(|| name.parse().ok().map(DomainStatus))
                        .ok_or_else(|| format!("unknown status '{}'", name))?,
                };
                Ok(Fault::Fail(stage, status))
            }
        }
    }
}

/// Set of armed faults
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Vec<Fault>,
}

impl FaultPlan {
    pub fn arm(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    pub fn clear(&mut self) {
        self.faults.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    /// Status forced on the call made at `stage`, if any
    pub fn check(&self, stage: Stage) -> DomainResult<()> {
        let forced = self.faults.iter().find_map(|fault| match fault {
            Fault::Fail(s, status) if *s == stage => Some(*status),
            _ => None,
        });
        match forced {
            Some(status) => {
                debug!("Injected fault at {}: {}", stage, status);
                Err(status)
            }
            None => Ok(()),
        }
    }

    pub fn short_export(&self) -> Option<usize> {
        self.faults.iter().find_map(|fault| match fault {
            Fault::ShortExport(len) => Some(*len),
            _ => None,
        })
    }

    pub fn long_export(&self) -> Option<usize> {
        self.faults.iter().find_map(|fault| match fault {
            Fault::LongExport(len) => Some(*len),
            _ => None,
        })
    }

    pub fn corrupt_read(&self) -> bool {
        self.faults.contains(&Fault::CorruptRead)
    }

    pub fn repeat_random(&self) -> bool {
        self.faults.contains(&Fault::RepeatRandom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_matches_stage() {
        let mut plan = FaultPlan::default();
        assert!(plan.is_empty());
        plan.arm(Fault::Fail(Stage::StorageSet, DomainStatus::STORAGE_FAILURE));

        assert_eq!(plan.check(Stage::StorageSet), Err(DomainStatus::STORAGE_FAILURE));
        assert_eq!(plan.check(Stage::StorageGet), Ok(()));
        assert!(!plan.corrupt_read());

        plan.clear();
        assert_eq!(plan.check(Stage::StorageSet), Ok(()));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "its.set=STORAGE_FAILURE".parse::<Fault>(),
            Ok(Fault::Fail(Stage::StorageSet, DomainStatus::STORAGE_FAILURE))
        );
        assert_eq!(
            "hash.verify=-149".parse::<Fault>(),
            Ok(Fault::Fail(Stage::HashVerify, DomainStatus::INVALID_SIGNATURE))
        );
        assert_eq!(
            "random.generate".parse::<Fault>(),
            Ok(Fault::Fail(Stage::Random, DomainStatus::GENERIC_ERROR))
        );
        assert_eq!("short-export=16".parse::<Fault>(), Ok(Fault::ShortExport(16)));
        assert_eq!("long-export=100".parse::<Fault>(), Ok(Fault::LongExport(100)));
        assert_eq!("corrupt-read".parse::<Fault>(), Ok(Fault::CorruptRead));
        assert!("nope".parse::<Fault>().is_err());
        assert!("its.set=NOT_A_STATUS".parse::<Fault>().is_err());
        assert!("short-export=many".parse::<Fault>().is_err());
    }

    #[test]
    fn test_data_faults() {
        let mut plan = FaultPlan::default();
        plan.arm(Fault::ShortExport(16));
        plan.arm(Fault::RepeatRandom);
        assert_eq!(plan.short_export(), Some(16));
        assert_eq!(plan.long_export(), None);
        assert!(plan.repeat_random());
    }
}
