//! Session Gateway — one-time channel setup and ownership
//!
//! The [`Gateway`] owns the trusted domain for the whole process. Components
//! never reach the domain directly: they borrow a [`Session`] from an
//! initialized gateway, and every call goes through [`Session::call`] which
//! maps the raw status into the validation taxonomy.

use super::provider::TrustedDomain;
use super::status::DomainResult;
use crate::error::{InitError, Stage, ValidationError, ValidationResult};
use log::{debug, info, warn};

/// Owner of the single cross-domain channel
pub struct Gateway<D> {
    domain: D,
    initialized: bool,
}

impl<D: TrustedDomain> Gateway<D> {
    pub fn new(domain: D) -> Self {
        Self {
            domain,
            initialized: false,
        }
    }

    /// Establish the channel. Must succeed once before any service call.
    ///
    /// A failed attempt leaves the gateway uninitialized; retrying is up to
    /// the caller.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        if self.initialized {
            return Err(InitError::AlreadyInitialized);
        }
        self.domain.connect().map_err(|status| {
            warn!("Trusted domain channel setup failed: {}", status);
            InitError::Channel(status)
        })?;
        self.initialized = true;
        info!("Trusted domain session established");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Borrow the session handle, failing with `NotInitialized` before setup
    pub fn session(&mut self) -> ValidationResult<Session<'_, D>> {
        if !self.initialized {
            return Err(ValidationError::NotInitialized);
        }
        Ok(Session {
            domain: &mut self.domain,
        })
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn domain_mut(&mut self) -> &mut D {
        &mut self.domain
    }

    pub fn into_inner(self) -> D {
        self.domain
    }
}

/// Borrowed handle to an initialized channel
pub struct Session<'g, D> {
    domain: &'g mut D,
}

impl<D: TrustedDomain> Session<'_, D> {
    /// Perform one trusted call, attributing any failure to `stage`
    pub(crate) fn call<T>(
        &mut self,
        stage: Stage,
        f: impl FnOnce(&mut D) -> DomainResult<T>,
    ) -> ValidationResult<T> {
        debug!("-> {}", stage);
        f(&mut *self.domain).map_err(|status| {
            debug!("<- {} {}", stage, status);
            ValidationError::service(stage, status)
        })
    }
}
