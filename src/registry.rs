//! Star registry: the admission gate in front of the ledger.

use crate::blockchain::{Block, BlockBody, Ledger};
use crate::error::ChainError;
use crate::identity::IdentityChallengeStore;
use crate::star::{StarRecord, StarSubmission, MAX_STORY_BYTES};
use std::sync::Arc;
use tracing::info;

pub struct StarRegistry {
    ledger: Arc<Ledger>,
    identity: Arc<IdentityChallengeStore>,
    max_story_bytes: usize,
}

impl StarRegistry {
    pub fn new(ledger: Arc<Ledger>, identity: Arc<IdentityChallengeStore>) -> Self {
        StarRegistry {
            ledger,
            identity,
            max_story_bytes: MAX_STORY_BYTES,
        }
    }

    pub fn with_max_story_bytes(mut self, max_story_bytes: usize) -> Self {
        self.max_story_bytes = max_story_bytes;
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn identity(&self) -> &Arc<IdentityChallengeStore> {
        &self.identity
    }

    /// Register a star for `address`.
    ///
    /// Order: authorization, schema validation, append, challenge retirement.
    /// Nothing is written unless the first two pass; the challenge survives a
    /// failed append. Retirement after a successful append is best-effort: if it
    /// fails, the block stands and the still-valid challenge can admit one more
    /// registration until it is invalidated.
    pub fn submit_record(&self, address: &str, star: StarSubmission) -> Result<Block, ChainError> {
        let block = self.identity.admit(address, || {
            star.validate(self.max_story_bytes)?;
            let record = StarRecord {
                address: address.to_string(),
                star: star.into_star(),
            };
            self.ledger.append(BlockBody::Star(record))
        })?;

        info!("Registered star for {} at height {}", address, block.height);
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::KeyPair;
    use crate::persistence::InMemoryStore;

    fn setup() -> StarRegistry {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let ledger = Ledger::open_with_clock(Arc::new(InMemoryStore::new()), clock.clone()).unwrap();
        let identity = IdentityChallengeStore::with_clock(Arc::new(InMemoryStore::new()), clock);
        StarRegistry::new(Arc::new(ledger), Arc::new(identity))
    }

    fn validate(registry: &StarRegistry, keypair: &KeyPair) {
        let address = keypair.address();
        let challenge = registry.identity().get_or_issue(&address).unwrap();
        let signature = keypair.sign_message(&challenge.message).unwrap();
        assert!(registry.identity().verify(&address, &signature).unwrap().register_star);
    }

    #[test]
    fn test_unvalidated_address_is_rejected_before_schema() {
        let registry = setup();
        // Invalid payload, but authorization is checked first
        let result = registry.submit_record("stranger", StarSubmission::default());
        assert!(matches!(result, Err(ChainError::NotAuthorized(_))));
        assert_eq!(registry.ledger().height(), 0);
    }

    #[test]
    fn test_schema_failure_keeps_challenge() {
        let registry = setup();
        let keypair = KeyPair::generate().unwrap();
        validate(&registry, &keypair);

        let result = registry.submit_record(&keypair.address(), StarSubmission::new("ra", "dec", ""));
        assert!(matches!(result, Err(ChainError::Validation(_))));
        assert_eq!(registry.ledger().height(), 0);
        assert!(registry.identity().is_validated(&keypair.address()).unwrap());
    }

    #[test]
    fn test_custom_story_ceiling() {
        let registry = setup().with_max_story_bytes(10);
        let keypair = KeyPair::generate().unwrap();
        validate(&registry, &keypair);

        let result = registry.submit_record(&keypair.address(), StarSubmission::new("ra", "dec", "eleven char"));
        assert!(matches!(result, Err(ChainError::Validation(_))));
    }

    #[test]
    fn test_one_proof_one_star() {
        let registry = setup();
        let keypair = KeyPair::generate().unwrap();
        validate(&registry, &keypair);

        let block = registry
            .submit_record(&keypair.address(), StarSubmission::new("ra", "dec", "first"))
            .unwrap();
        assert_eq!(block.height, 1);
        assert_eq!(block.body.address(), Some(keypair.address().as_str()));

        let second = registry.submit_record(&keypair.address(), StarSubmission::new("ra", "dec", "second"));
        assert!(matches!(second, Err(ChainError::NotAuthorized(_))));
        assert_eq!(registry.ledger().height(), 1);
    }
}
