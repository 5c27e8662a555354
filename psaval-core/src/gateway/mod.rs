//! Gateway — the boundary between the non-secure caller and the trusted domain
//!
//! - **Status**: the PSA status enumeration answered by every call
//! - **Provider**: the fixed call surface and its identifiers
//! - **Session**: one-time channel setup and the borrowed session handle

pub mod provider;
pub mod session;
pub mod status;

pub use provider::{
    Algorithm, DerivationStep, KeyAttributes, KeyId, KeyType, KeyUsage, OperationHandle,
    StorageFlags, TrustedDomain, Uid,
};
pub use session::{Gateway, Session};
pub use status::{DomainResult, DomainStatus};
