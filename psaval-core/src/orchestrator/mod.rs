//! Test Orchestrator — runs the battery and folds the results
//!
//! Scenarios run once each in a fixed order:
//! 1. SessionInit
//! 2. Attestation
//! 3. Storage
//! 4. Random
//! 5. Hash
//! 6. Derivation
//!
//! A failure never stops the run. The composite code names the first failure.

pub mod report;
pub mod scenarios;

pub use report::{CompositeCode, DecodedCode, Failure, RunReport, ScenarioOutcome};
pub use scenarios::{battery, ScenarioFn, ScenarioId};

use crate::config::ValidationConfig;
use crate::gateway::{Gateway, TrustedDomain};
use chrono::Utc;
use log::{info, warn};

/// Owns the gateway for the duration of a battery run
pub struct Orchestrator<D: TrustedDomain> {
    gateway: Gateway<D>,
    config: ValidationConfig,
}

impl<D: TrustedDomain> Orchestrator<D> {
    pub fn new(domain: D, config: ValidationConfig) -> Self {
        Self {
            gateway: Gateway::new(domain),
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Gateway<D> {
        &self.gateway
    }

    pub fn into_domain(self) -> D {
        self.gateway.into_inner()
    }

    /// Run every scenario once
    ///
    /// The session is set up by the first scenario, so a second run on the
    /// same orchestrator reports `SessionInit` as already initialized.
    pub fn run(&mut self) -> RunReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(ScenarioId::ALL.len());

        for (scenario, check) in battery::<D>() {
            info!("Scenario {} starting", scenario);
            let failure = match check(&mut self.gateway, &self.config) {
                Ok(()) => {
                    info!("Scenario {} passed", scenario);
                    None
                }
                Err(e) => {
                    warn!("Scenario {} failed: {}", scenario, e);
                    Some(Failure::from(&e))
                }
            };
            outcomes.push(ScenarioOutcome { scenario, failure });
        }

        let report = RunReport::new(started_at, outcomes);
        info!(
            "Battery finished: {}/{} passed, composite {}",
            report.outcomes.len() - report.failed_count(),
            report.outcomes.len(),
            report.composite
        );
        report
    }
}

/// Run the whole battery against `domain` and return the composite code
pub fn run_all<D: TrustedDomain>(domain: D, config: &ValidationConfig) -> u32 {
    Orchestrator::new(domain, config.clone()).run().composite.0
}
