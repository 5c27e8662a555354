//! Domain status codes returned across the trusted boundary
//!
//! Every trusted call answers with one value of the PSA status enumeration.
//! `SUCCESS` is the only success value; the non-secure side never sees it
//! inside an `Err`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw status reported by the trusted domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainStatus(pub i32);

/// Result of a single trusted call
pub type DomainResult<T> = Result<T, DomainStatus>;

impl DomainStatus {
    pub const SUCCESS: Self = Self(0);
    pub const PROGRAMMER_ERROR: Self = Self(-129);
    pub const CONNECTION_REFUSED: Self = Self(-130);
    pub const CONNECTION_BUSY: Self = Self(-131);
    pub const GENERIC_ERROR: Self = Self(-132);
    pub const NOT_PERMITTED: Self = Self(-133);
    pub const NOT_SUPPORTED: Self = Self(-134);
    pub const INVALID_ARGUMENT: Self = Self(-135);
    pub const INVALID_HANDLE: Self = Self(-136);
    pub const BAD_STATE: Self = Self(-137);
    pub const BUFFER_TOO_SMALL: Self = Self(-138);
    pub const ALREADY_EXISTS: Self = Self(-139);
    pub const DOES_NOT_EXIST: Self = Self(-140);
    pub const INSUFFICIENT_MEMORY: Self = Self(-141);
    pub const INSUFFICIENT_STORAGE: Self = Self(-142);
    pub const INSUFFICIENT_DATA: Self = Self(-143);
    pub const SERVICE_FAILURE: Self = Self(-144);
    pub const COMMUNICATION_FAILURE: Self = Self(-145);
    pub const STORAGE_FAILURE: Self = Self(-146);
    pub const HARDWARE_FAILURE: Self = Self(-147);
    pub const INSUFFICIENT_ENTROPY: Self = Self(-148);
    pub const INVALID_SIGNATURE: Self = Self(-149);
    pub const INVALID_PADDING: Self = Self(-150);
    pub const CORRUPTION_DETECTED: Self = Self(-151);
    pub const DATA_CORRUPT: Self = Self(-152);
    pub const DATA_INVALID: Self = Self(-153);

    const NAMED: [(Self, &'static str); 26] = [
        (Self::SUCCESS, "SUCCESS"),
        (Self::PROGRAMMER_ERROR, "PROGRAMMER_ERROR"),
        (Self::CONNECTION_REFUSED, "CONNECTION_REFUSED"),
        (Self::CONNECTION_BUSY, "CONNECTION_BUSY"),
        (Self::GENERIC_ERROR, "GENERIC_ERROR"),
        (Self::NOT_PERMITTED, "NOT_PERMITTED"),
        (Self::NOT_SUPPORTED, "NOT_SUPPORTED"),
        (Self::INVALID_ARGUMENT, "INVALID_ARGUMENT"),
        (Self::INVALID_HANDLE, "INVALID_HANDLE"),
        (Self::BAD_STATE, "BAD_STATE"),
        (Self::BUFFER_TOO_SMALL, "BUFFER_TOO_SMALL"),
        (Self::ALREADY_EXISTS, "ALREADY_EXISTS"),
        (Self::DOES_NOT_EXIST, "DOES_NOT_EXIST"),
        (Self::INSUFFICIENT_MEMORY, "INSUFFICIENT_MEMORY"),
        (Self::INSUFFICIENT_STORAGE, "INSUFFICIENT_STORAGE"),
        (Self::INSUFFICIENT_DATA, "INSUFFICIENT_DATA"),
        (Self::SERVICE_FAILURE, "SERVICE_FAILURE"),
        (Self::COMMUNICATION_FAILURE, "COMMUNICATION_FAILURE"),
        (Self::STORAGE_FAILURE, "STORAGE_FAILURE"),
        (Self::HARDWARE_FAILURE, "HARDWARE_FAILURE"),
        (Self::INSUFFICIENT_ENTROPY, "INSUFFICIENT_ENTROPY"),
        (Self::INVALID_SIGNATURE, "INVALID_SIGNATURE"),
        (Self::INVALID_PADDING, "INVALID_PADDING"),
        (Self::CORRUPTION_DETECTED, "CORRUPTION_DETECTED"),
        (Self::DATA_CORRUPT, "DATA_CORRUPT"),
        (Self::DATA_INVALID, "DATA_INVALID"),
    ];

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Turn a raw code from the boundary into a call result
    pub fn check(self) -> DomainResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Symbolic name, if the code belongs to the enumeration
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(status, _)| *status == self)
            .map(|(_, name)| *name)
    }

    /// Look a status up by its symbolic name (with or without `PSA_ERROR_`)
    pub fn from_name(name: &str) -> Option<Self> {
        let bare = name
            .strip_prefix("PSA_ERROR_")
            .or_else(|| name.strip_prefix("PSA_"))
            .unwrap_or(name);
        Self::NAMED
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(bare))
            .map(|(status, _)| *status)
    }

    /// Composite-code byte for a status that has no one-byte magnitude
    pub const MAGNITUDE_OUT_OF_RANGE: u8 = 0xff;

    /// Magnitude of an error status as one byte of the composite code
    ///
    /// Errors from -1 to -254 keep their magnitude. Anything else, positive
    /// statuses included, becomes [`Self::MAGNITUDE_OUT_OF_RANGE`].
    pub fn magnitude(self) -> u8 {
        match u8::try_from(-i64::from(self.0)) {
            Ok(m) if m != Self::MAGNITUDE_OUT_OF_RANGE => m,
            _ => Self::MAGNITUDE_OUT_OF_RANGE,
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "PSA_{}{} ({})", if self.is_success() { "" } else { "ERROR_" }, name, self.0),
            None => write!(f, "unknown status ({})", self.0),
        }
    }
}
