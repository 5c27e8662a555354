//! TEE — software reference trusted domain
//!
//! Lets the validation battery run without secure hardware:
//! - **Enclave**: the simulated domain implementing the call surface
//! - **Attestation**: token issuance bound to the caller challenge
//! - **Storage**: flag-aware internal trusted storage
//! - **Crypto**: hash and derivation contexts, key slots
//! - **Fault**: deterministic fault injection

pub mod attestation;
pub mod crypto;
pub mod enclave;
pub mod fault;
pub mod storage;

pub use enclave::{EnclaveStatus, SimulatedDomain};
pub use fault::{Fault, FaultPlan};
