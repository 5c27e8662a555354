//! Run report and composite status code

use super::scenarios::ScenarioId;
use crate::error::{Cause, Stage, ValidationError};
use crate::gateway::DomainStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a scenario failed, in the terms the composite code carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Call or local check that failed, `None` before any stage ran
    pub stage: Option<Stage>,
    pub cause: Cause,
    /// Raw status from the trusted domain, `None` for local failures
    pub status: Option<DomainStatus>,
    /// A release step failed as well
    pub cleanup_failed: bool,
    /// Human-readable rendering of the error
    pub message: String,
}

impl From<&ValidationError> for Failure {
    fn from(err: &ValidationError) -> Self {
        Self {
            stage: err.stage(),
            cause: err.cause(),
            status: err.status(),
            cleanup_failed: err.cleanup_error().is_some(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario: ScenarioId,
    /// `None` when the scenario passed
    pub failure: Option<Failure>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// One `u32` summarizing a whole run
///
/// `scenario << 24 | stage << 16 | cause << 8 | |status|`, zero when every
/// scenario passed. Bit 7 of the cause byte marks a failed cleanup step, and
/// a status byte of `0xff` marks a status with no one-byte magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeCode(pub u32);

/// Fields unpacked from a [`CompositeCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCode {
    pub scenario: Option<ScenarioId>,
    pub stage: Option<Stage>,
    pub cause: Option<Cause>,
    pub cleanup_failed: bool,
    /// `None` for local failures and for out-of-range statuses
    pub status: Option<DomainStatus>,
    /// The status byte was [`DomainStatus::MAGNITUDE_OUT_OF_RANGE`]
    pub status_out_of_range: bool,
}

impl CompositeCode {
    pub const PASS: Self = Self(0);

    pub fn encode(scenario: ScenarioId, failure: &Failure) -> Self {
        let stage = failure.stage.map_or(0, Stage::code);
        let mut cause = failure.cause.code();
        if failure.cleanup_failed {
            cause |= Cause::CLEANUP_FLAG;
        }
        let status = failure.status.map_or(0, DomainStatus::magnitude);
        Self(
            u32::from(scenario.code()) << 24
                | u32::from(stage) << 16
                | u32::from(cause) << 8
                | u32::from(status),
        )
    }

    pub fn is_pass(self) -> bool {
        self == Self::PASS
    }

    /// Unpack the fields; `None` for passes
    pub fn decode(self) -> Option<DecodedCode> {
        if self.is_pass() {
            return None;
        }
        let [scenario, stage, cause, status] = self.0.to_be_bytes();
        Some(DecodedCode {
            scenario: ScenarioId::from_code(scenario),
            stage: Stage::from_code(stage),
            cause: Cause::from_code(cause & !Cause::CLEANUP_FLAG),
            cleanup_failed: cause & Cause::CLEANUP_FLAG != 0,
            status: match status {
                0 | DomainStatus::MAGNITUDE_OUT_OF_RANGE => None,
                m => Some(DomainStatus(-i32::from(m))),
            },
            status_out_of_range: status == DomainStatus::MAGNITUDE_OUT_OF_RANGE,
        })
    }
}

impl fmt::Display for CompositeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decoded = match self.decode() {
            None => return write!(f, "0x00000000 PASS"),
            Some(decoded) => decoded,
        };
        write!(f, "{:#010x}", self.0)?;
        match decoded.scenario {
            Some(s) => write!(f, " scenario={}", s)?,
            None => write!(f, " scenario=?")?,
        }
        if let Some(stage) = decoded.stage {
            write!(f, " stage={}", stage)?;
        }
        match decoded.cause {
            Some(c) => write!(f, " cause={}", c)?,
            None => write!(f, " cause=?")?,
        }
        if decoded.cleanup_failed {
            write!(f, " +cleanup")?;
        }
        if let Some(status) = decoded.status {
            write!(f, " status={}", status)?;
        }
        if decoded.status_out_of_range {
            write!(f, " status=out-of-range")?;
        }
        Ok(())
    }
}

/// Outcome of one battery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per scenario, in battery order
    pub outcomes: Vec<ScenarioOutcome>,
    /// Code of the first failing scenario, or `PASS`
    pub composite: CompositeCode,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, outcomes: Vec<ScenarioOutcome>) -> Self {
        let composite = outcomes
            .iter()
            .find_map(|o| {
                o.failure
                    .as_ref()
                    .map(|failure| CompositeCode::encode(o.scenario, failure))
            })
            .unwrap_or(CompositeCode::PASS);
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
            composite,
        }
    }

    pub fn passed(&self) -> bool {
        self.composite.is_pass()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn outcome(&self, scenario: ScenarioId) -> Option<&ScenarioOutcome> {
        self.outcomes.iter().find(|o| o.scenario == scenario)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
