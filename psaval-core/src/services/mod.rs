//! Service Invoker — typed wrappers over the stateless trusted services
//!
//! Each wrapper is a method on [`Session`](crate::gateway::Session) that
//! performs the call, checks the caller-side contract and reports failures as
//! [`ValidationError`](crate::error::ValidationError). Hash and derivation are
//! stateful and live in [`sequencer`](crate::sequencer).

pub mod attestation;
pub mod random;
pub mod storage;

pub use attestation::{CHALLENGE_SIZES, MAX_TOKEN_SIZE};
