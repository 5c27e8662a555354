//! Random generation service

use crate::error::{Stage, ValidationResult};
use crate::gateway::{Session, TrustedDomain};

impl<D: TrustedDomain> Session<'_, D> {
    /// Fill all of `buffer` with random bytes from the trusted domain
    pub fn fill_random(&mut self, buffer: &mut [u8]) -> ValidationResult<()> {
        self.call(Stage::Random, |d| d.generate_random(buffer))
    }

    pub fn random_bytes(&mut self, len: usize) -> ValidationResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.fill_random(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{Stage, ValidationError};
    use crate::gateway::{DomainStatus, Gateway};
    use crate::tee::{Fault, SimulatedDomain};

    #[test]
    fn test_successive_fills_differ() {
        let mut gateway = Gateway::new(SimulatedDomain::new());
        gateway.initialize().unwrap();
        let mut session = gateway.session().unwrap();
        let a = session.random_bytes(10).unwrap();
        let b = session.random_bytes(10).unwrap();
        assert_eq!(a.len(), 10);
        assert_ne!(a, b);
    }

    #[test]
    fn test_entropy_failure() {
        let mut domain = SimulatedDomain::new();
        domain.inject(Fault::Fail(Stage::Random, DomainStatus::INSUFFICIENT_ENTROPY));
        let mut gateway = Gateway::new(domain);
        gateway.initialize().unwrap();
        let mut session = gateway.session().unwrap();
        assert_eq!(
            session.random_bytes(10),
            Err(ValidationError::service(Stage::Random, DomainStatus::INSUFFICIENT_ENTROPY))
        );
    }
}
