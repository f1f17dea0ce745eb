//! Identity challenges that gate star registration.
//!
//! A client asks for a challenge for its address, signs the challenge message
//! and submits the signature. A verified challenge admits exactly one star
//! registration and is deleted once that registration is written.

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::crypto::verify_message;
use crate::error::ChainError;
use crate::persistence::KeyValueStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Seconds a challenge stays signable after it is issued.
pub const DEFAULT_VALIDATION_WINDOW: u64 = 300;

/// Suffix binding challenge messages to this registry.
pub const MESSAGE_DOMAIN_TAG: &str = "starRegistry";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    #[default]
    Unverified,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityChallenge {
    pub address: String,
    pub request_time_stamp: Timestamp,
    pub message: String,
    /// Seconds left to sign, as of the last time the record was read or verified.
    pub validation_window: u64,
    #[serde(default)]
    pub message_signature: SignatureStatus,
}

impl IdentityChallenge {
    pub fn new(address: &str, issued_at: Timestamp, window: u64) -> Self {
        IdentityChallenge {
            address: address.to_string(),
            request_time_stamp: issued_at,
            message: Self::challenge_message(address, issued_at),
            validation_window: window,
            message_signature: SignatureStatus::Unverified,
        }
    }

    pub fn challenge_message(address: &str, issued_at: Timestamp) -> String {
        format!("{}:{}:{}", address, issued_at, MESSAGE_DOMAIN_TAG)
    }

    pub fn is_expired(&self, now: Timestamp, window: u64) -> bool {
        self.request_time_stamp.saturating_add(window) < now
    }

    pub fn remaining_window(&self, now: Timestamp, window: u64) -> u64 {
        self.request_time_stamp
            .saturating_add(window)
            .saturating_sub(now)
    }
}

/// Result of a signature submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub register_star: bool,
    pub status: IdentityChallenge,
}

/// Issues, verifies and retires identity challenges over one key-value namespace.
///
/// Every read-modify-write on a record runs under that address's lock, so
/// operations on one address are serialized while different addresses proceed
/// in parallel.
pub struct IdentityChallengeStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    window: u64,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityChallengeStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        IdentityChallengeStore {
            store,
            clock,
            window: DEFAULT_VALIDATION_WINDOW,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window(mut self, window: u64) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Always issue a fresh challenge, replacing whatever is stored for `address`.
    pub fn issue(&self, address: &str) -> Result<IdentityChallenge, ChainError> {
        require_address(address)?;
        self.with_address_lock(address, || self.issue_unlocked(address))
    }

    /// The live challenge for `address` with its remaining window, or a fresh
    /// one if none exists or the stored one has expired.
    pub fn get_or_issue(&self, address: &str) -> Result<IdentityChallenge, ChainError> {
        require_address(address)?;
        self.with_address_lock(address, || {
            let now = self.clock.now();
            match self.load(address)? {
                Some(mut challenge) if !challenge.is_expired(now, self.window) => {
                    challenge.validation_window = challenge.remaining_window(now, self.window);
                    Ok(challenge)
                }
                _ => self.issue_unlocked(address),
            }
        })
    }

    /// Check `signature` against the stored challenge for `address`.
    ///
    /// Already-valid challenges short-circuit without touching the curve.
    /// Malformed signatures are recorded as `invalid`, never returned as errors.
    pub fn verify(&self, address: &str, signature: &str) -> Result<VerificationOutcome, ChainError> {
        self.with_address_lock(address, || self.verify_unlocked(address, signature))
    }

    fn verify_unlocked(&self, address: &str, signature: &str) -> Result<VerificationOutcome, ChainError> {
        let mut challenge = self.load(address)?.ok_or_else(|| {
            ChainError::NotFound(format!("No validation request found for {}", address))
        })?;

        if challenge.message_signature == SignatureStatus::Valid {
            return Ok(VerificationOutcome {
                register_star: true,
                status: challenge,
            });
        }

        let now = self.clock.now();
        if challenge.is_expired(now, self.window) {
            challenge.validation_window = 0;
            self.save(&challenge)?;
            debug!("Validation window expired for {}", address);
            return Ok(VerificationOutcome {
                register_star: false,
                status: challenge,
            });
        }

        let signature_ok = match verify_message(&challenge.message, address, signature) {
            Ok(()) => true,
            Err(e) => {
                debug!("Signature rejected for {}: {}", address, e);
                false
            }
        };

        challenge.message_signature = if signature_ok {
            SignatureStatus::Valid
        } else {
            SignatureStatus::Invalid
        };
        challenge.validation_window = challenge.remaining_window(now, self.window);
        self.save(&challenge)?;

        Ok(VerificationOutcome {
            register_star: signature_ok,
            status: challenge,
        })
    }

    /// `Ok(true)` when `address` holds a verified challenge. A missing challenge
    /// and a failed one both surface as `NotAuthorized`.
    pub fn is_validated(&self, address: &str) -> Result<bool, ChainError> {
        self.with_address_lock(address, || self.is_validated_unlocked(address))
    }

    /// Delete the challenge for `address`. Deleting a missing challenge is fine.
    pub fn invalidate(&self, address: &str) -> Result<(), ChainError> {
        self.with_address_lock(address, || self.store.delete(address))
    }

    /// Run `write` only if `address` is validated, then retire the challenge.
    ///
    /// The address lock is held from the authorization check through the
    /// retirement, so one proof admits at most one write. A failing `write`
    /// leaves the challenge intact. A failing retirement after a successful
    /// `write` is logged and the write's result is still returned.
    pub fn admit<T>(
        &self,
        address: &str,
        write: impl FnOnce() -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        self.with_address_lock(address, || {
            self.is_validated_unlocked(address)?;
            let written = write()?;

            if let Err(e) = self.store.delete(address) {
                warn!("Failed to invalidate challenge for {} after write: {}", address, e);
            }
            Ok(written)
        })
    }

    fn is_validated_unlocked(&self, address: &str) -> Result<bool, ChainError> {
        match self.load(address)? {
            Some(challenge) if challenge.message_signature == SignatureStatus::Valid => Ok(true),
            _ => Err(ChainError::NotAuthorized(format!(
                "Address {} has no validated signature",
                address
            ))),
        }
    }

    fn issue_unlocked(&self, address: &str) -> Result<IdentityChallenge, ChainError> {
        let challenge = IdentityChallenge::new(address, self.clock.now(), self.window);
        self.save(&challenge)?;
        debug!("Issued challenge for {}", address);
        Ok(challenge)
    }

    fn load(&self, address: &str) -> Result<Option<IdentityChallenge>, ChainError> {
        match self.store.get(address)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, challenge: &IdentityChallenge) -> Result<(), ChainError> {
        self.store
            .put(&challenge.address, &serde_json::to_vec(challenge)?)
    }

    /// Run `f` holding the lock for `address`. The lock entry is dropped from
    /// the map once no other caller holds or waits on it.
    fn with_address_lock<T>(
        &self,
        address: &str,
        f: impl FnOnce() -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        let lock = self
            .locks
            .lock()
            .entry(address.to_string())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        // Clones are taken and released only under the map lock, so a count of one
        // means the map holds the last reference.
        let mut locks = self.locks.lock();
        drop(lock);
        if locks.get(address).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(address);
        }
        result
    }
}

fn require_address(address: &str) -> Result<(), ChainError> {
    if address.trim().is_empty() {
        return Err(ChainError::Validation(
            "Address cannot be empty. Please provide a valid address".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::KeyPair;
    use crate::persistence::InMemoryStore;

    const START: Timestamp = 1_700_000_000;

    fn setup() -> (IdentityChallengeStore, ManualClock) {
        let clock = ManualClock::new(START);
        let store = IdentityChallengeStore::with_clock(Arc::new(InMemoryStore::new()), Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_message_format() {
        let challenge = IdentityChallenge::new("abc", 42, DEFAULT_VALIDATION_WINDOW);
        assert_eq!(challenge.message, "abc:42:starRegistry");
        assert_eq!(challenge.validation_window, 300);
        assert_eq!(challenge.message_signature, SignatureStatus::Unverified);
    }

    #[test]
    fn test_expiry_boundary() {
        let challenge = IdentityChallenge::new("abc", 100, 300);
        assert!(!challenge.is_expired(400, 300));
        assert_eq!(challenge.remaining_window(400, 300), 0);
        assert!(challenge.is_expired(401, 300));
        assert_eq!(challenge.remaining_window(250, 300), 150);
    }

    #[test]
    fn test_get_or_issue_reuses_live_challenge() {
        let (store, clock) = setup();
        let first = store.get_or_issue("alice").unwrap();

        clock.advance(120);
        let second = store.get_or_issue("alice").unwrap();
        assert_eq!(second.message, first.message);
        assert_eq!(second.validation_window, 180);
    }

    #[test]
    fn test_get_or_issue_regenerates_after_expiry() {
        let (store, clock) = setup();
        let first = store.get_or_issue("alice").unwrap();

        clock.advance(DEFAULT_VALIDATION_WINDOW + 1);
        let second = store.get_or_issue("alice").unwrap();
        assert_ne!(second.message, first.message);
        assert_eq!(second.validation_window, DEFAULT_VALIDATION_WINDOW);
        assert_eq!(second.request_time_stamp, START + DEFAULT_VALIDATION_WINDOW + 1);
    }

    #[test]
    fn test_issue_overwrites() {
        let (store, clock) = setup();
        let first = store.issue("alice").unwrap();
        clock.advance(5);
        let second = store.issue("alice").unwrap();
        assert_ne!(first.message, second.message);
        assert_eq!(store.get_or_issue("alice").unwrap().message, second.message);
    }

    #[test]
    fn test_empty_address_rejected() {
        let (store, _) = setup();
        assert!(matches!(store.get_or_issue("  "), Err(ChainError::Validation(_))));
    }

    #[test]
    fn test_verify_unknown_address_is_not_found() {
        let (store, _) = setup();
        assert!(matches!(store.verify("nobody", "sig"), Err(ChainError::NotFound(_))));
    }

    #[test]
    fn test_verify_valid_then_short_circuit() {
        let (store, clock) = setup();
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.address();

        let challenge = store.get_or_issue(&address).unwrap();
        let signature = keypair.sign_message(&challenge.message).unwrap();

        clock.advance(10);
        let outcome = store.verify(&address, &signature).unwrap();
        assert!(outcome.register_star);
        assert_eq!(outcome.status.message_signature, SignatureStatus::Valid);
        assert_eq!(outcome.status.validation_window, 290);

        let again = store.verify(&address, "bogus").unwrap();
        assert!(again.register_star);
        assert_eq!(again.status.message_signature, SignatureStatus::Valid);
    }

    #[test]
    fn test_verify_bad_signature_marks_invalid() {
        let (store, _) = setup();
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.address();
        store.get_or_issue(&address).unwrap();

        let outcome = store.verify(&address, "bogus").unwrap();
        assert!(!outcome.register_star);
        assert_eq!(outcome.status.message_signature, SignatureStatus::Invalid);
        assert!(matches!(store.is_validated(&address), Err(ChainError::NotAuthorized(_))));
    }

    #[test]
    fn test_verify_after_expiry_rejects_valid_signature() {
        let (store, clock) = setup();
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.address();

        let challenge = store.get_or_issue(&address).unwrap();
        let signature = keypair.sign_message(&challenge.message).unwrap();

        clock.advance(DEFAULT_VALIDATION_WINDOW + 1);
        let outcome = store.verify(&address, &signature).unwrap();
        assert!(!outcome.register_star);
        assert_eq!(outcome.status.validation_window, 0);
        assert_eq!(outcome.status.message_signature, SignatureStatus::Unverified);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let (store, _) = setup();
        store.get_or_issue("alice").unwrap();
        store.invalidate("alice").unwrap();
        store.invalidate("alice").unwrap();
        assert!(matches!(store.verify("alice", "sig"), Err(ChainError::NotFound(_))));
    }

    #[test]
    fn test_admit_keeps_challenge_when_write_fails() {
        let (store, _) = setup();
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.address();
        let challenge = store.get_or_issue(&address).unwrap();
        store
            .verify(&address, &keypair.sign_message(&challenge.message).unwrap())
            .unwrap();

        let result: Result<(), ChainError> =
            store.admit(&address, || Err(ChainError::Storage("disk full".to_string())));
        assert!(matches!(result, Err(ChainError::Storage(_))));
        assert!(store.is_validated(&address).unwrap());

        let written = store.admit(&address, || Ok(7)).unwrap();
        assert_eq!(written, 7);
        assert!(matches!(store.is_validated(&address), Err(ChainError::NotAuthorized(_))));
    }

    #[test]
    fn test_lock_entries_released_after_use() {
        let (store, _) = setup();
        for i in 0..10_000 {
            let address = format!("addr-{}", i);
            assert!(matches!(store.is_validated(&address), Err(ChainError::NotAuthorized(_))));
            assert!(matches!(store.verify(&address, "sig"), Err(ChainError::NotFound(_))));
        }
        assert_eq!(store.locks.lock().len(), 0);
    }

    #[test]
    fn test_lock_entries_released_under_contention() {
        let (store, _) = setup();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..200 {
                        store.get_or_issue(&format!("addr-{}", i % 4)).unwrap();
                    }
                });
            }
        });
        assert_eq!(store.locks.lock().len(), 0);
    }
}
