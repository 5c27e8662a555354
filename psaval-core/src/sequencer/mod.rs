//! Operation Sequencer — multi-step protocols against the trusted domain
//!
//! Each protocol is a guard object borrowing the [`Session`](crate::gateway::Session):
//! - **Hash**: setup, update, verify, abort
//! - **Derivation**: setup, secret, info, output key, abort, then export and
//!   destroy the key
//!
//! Steps out of order fail with `BadSequence` before reaching the domain, and
//! dropping a guard early releases what it holds.

pub mod derivation;
pub mod hash;

pub use derivation::{derive_key, DerivationOperation, DerivationRequest, DerivationState, DerivedKey};
pub use hash::{verify_digest, HashOperation, HashState};
