//! psaval — cross-domain validation of trusted-domain security services
//!
//! Runs a fixed battery of checks from the non-secure side against the PSA
//! services a trusted domain exposes: attestation, internal trusted storage,
//! random generation, hashing and hardware-rooted key derivation. The result
//! of a run folds into a single composite code.

pub mod config;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod sequencer;
pub mod services;
pub mod tee;

pub use config::{ConfigError, ValidationConfig};
pub use error::{Cause, InitError, Stage, ValidationError, ValidationResult};
pub use gateway::{DomainStatus, Gateway, Session, TrustedDomain};
pub use orchestrator::{run_all, CompositeCode, Orchestrator, RunReport, ScenarioId};
pub use tee::{Fault, SimulatedDomain};
