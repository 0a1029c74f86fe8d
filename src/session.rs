// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session holding the key pair and exposing the encryption operations of the
//! chat client.
//!
//! All operations are expressed on an explicit [`DeviceSession`] object instead of
//! module-level state, which makes it possible to run multiple simulated identities in
//! one process and to inject a storage backend.
//!
//! Two API levels are offered. The typed methods ([`DeviceSession::encrypt_message`],
//! [`DeviceSession::decrypt_message`]) return a `Result` and force callers to handle the
//! failure branch. The fail-open methods ([`DeviceSession::encrypt_or_plaintext`],
//! [`DeviceSession::decrypt_or_placeholder`]) reproduce the original client behaviour:
//! a failed encrypt hands back the plaintext so the message can still be sent
//! unencrypted, a failed decrypt yields the [`DECRYPT_PLACEHOLDER`] sentinel so the
//! message can still be displayed. Callers of the fail-open API must check the outcome
//! flag before treating the text as protected.
use thiserror::Error;
use tracing::warn;

use crate::agreement::{AgreementError, KeyAgreement};
use crate::crypto::hmac::{hmac_sha256, hmac_verify};
use crate::crypto::Rng;
use crate::envelope::{self, EnvelopeError};
use crate::identity::{DeviceIdentity, IdentityError};
use crate::store::{KeyStore, MemoryKeyStore, StoreError};

/// Sentinel shown in place of a message that could not be decrypted.
pub const DECRYPT_PLACEHOLDER: &str = "[Encrypted Message - Cannot Decrypt]";

/// A device's encryption session: its key pair, storage backend and key-agreement mode.
#[derive(Debug)]
pub struct DeviceSession<S = MemoryKeyStore> {
    store: S,
    agreement: KeyAgreement,
    identity: Option<DeviceIdentity>,
    rng: Rng,
}

/// Result of a fail-open encrypt call.
///
/// When `encrypted` is `false`, `text` is the *original plaintext*. Sending it anyway is
/// a deliberate usability trade-off of the chat client and a confidentiality risk the
/// caller must decide on.
#[derive(Debug)]
pub struct EncryptOutcome {
    pub text: String,
    pub encrypted: bool,
    pub error: Option<SessionError>,
}

/// Result of a fail-open decrypt call.
///
/// When `decrypted` is `false`, `text` is the [`DECRYPT_PLACEHOLDER`] sentinel.
#[derive(Debug)]
pub struct DecryptOutcome {
    pub text: String,
    pub decrypted: bool,
    pub error: Option<SessionError>,
}

impl DeviceSession<MemoryKeyStore> {
    /// Creates a session without durable storage, the identity lives only in memory.
    pub fn ephemeral(agreement: KeyAgreement) -> Self {
        Self::new(MemoryKeyStore::new(), agreement)
    }
}

impl<S: KeyStore> DeviceSession<S> {
    /// Creates a session over a storage backend. No identity is loaded or generated
    /// until [`initialize`](Self::initialize) is called.
    pub fn new(store: S, agreement: KeyAgreement) -> Self {
        Self {
            store,
            agreement,
            identity: None,
            rng: Rng::default(),
        }
    }

    #[cfg(any(test, feature = "test_utils"))]
    pub fn with_rng(store: S, agreement: KeyAgreement, rng: Rng) -> Self {
        Self {
            store,
            agreement,
            identity: None,
            rng,
        }
    }

    /// Loads the persisted device identity or generates a new one, returning the public
    /// key.
    ///
    /// Idempotent: repeated calls return the same public key and an existing identity is
    /// never silently regenerated. An unavailable or corrupted store degrades to an
    /// in-memory identity for this session (a later session will then generate a fresh
    /// one, a known limitation of the original client).
    pub fn initialize(&mut self) -> Result<String, SessionError> {
        if let Some(identity) = &self.identity {
            return Ok(identity.public_key());
        }

        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(err) => {
                warn!(%err, "key store unavailable, continuing without persistence");
                None
            }
        };

        let identity = match stored {
            Some(stored) => match DeviceIdentity::from_stored(&stored) {
                Ok(identity) => {
                    if identity.public_key() != stored.public_key {
                        // The private entry is authoritative, repair the digest.
                        warn!("persisted public key does not match private key, repairing store");
                        self.persist_best_effort(&identity);
                    }
                    identity
                }
                Err(err) => {
                    warn!(%err, "persisted key pair is unusable, generating a new identity");
                    let identity = DeviceIdentity::generate(&self.rng)?;
                    self.persist_best_effort(&identity);
                    identity
                }
            },
            None => {
                let identity = DeviceIdentity::generate(&self.rng)?;
                self.persist_best_effort(&identity);
                identity
            }
        };

        let public_key = identity.public_key();
        self.identity = Some(identity);
        Ok(public_key)
    }

    fn persist_best_effort(&mut self, identity: &DeviceIdentity) {
        if let Err(err) = self.store.persist(&identity.to_stored()) {
            warn!(%err, "failed to persist device key pair, identity is session-only");
        }
    }

    /// Returns the device public key, or `None` before [`initialize`](Self::initialize).
    ///
    /// Side-effect free.
    pub fn public_key(&self) -> Option<String> {
        self.identity.as_ref().map(DeviceIdentity::public_key)
    }

    /// Returns the device X25519 exchange key, or `None` before initialisation.
    ///
    /// Correspondents need this value for the [`KeyAgreement::X25519`] mode.
    pub fn exchange_key(&self) -> Option<String> {
        self.identity.as_ref().map(DeviceIdentity::exchange_key)
    }

    /// Whether a key pair is currently loaded for this session.
    pub fn is_enabled(&self) -> bool {
        self.identity.is_some()
    }

    /// Encrypts a message for a correspondent, returning the envelope string.
    pub fn encrypt_message(
        &self,
        plaintext: &str,
        recipient_key: &str,
    ) -> Result<String, SessionError> {
        let identity = self.identity.as_ref().ok_or(SessionError::MissingIdentity)?;
        let secret = self.agreement.pairwise_secret(identity, recipient_key)?;
        Ok(envelope::seal(plaintext, &secret, &self.rng)?)
    }

    /// Decrypts an envelope from a correspondent.
    pub fn decrypt_message(
        &self,
        message: &str,
        sender_key: &str,
    ) -> Result<String, SessionError> {
        let identity = self.identity.as_ref().ok_or(SessionError::MissingIdentity)?;
        let secret = self.agreement.pairwise_secret(identity, sender_key)?;
        Ok(envelope::open(message, &secret)?)
    }

    /// Fail-open variant of [`encrypt_message`](Self::encrypt_message): on any failure
    /// the outcome carries the original plaintext and `encrypted == false`.
    pub fn encrypt_or_plaintext(&self, plaintext: &str, recipient_key: &str) -> EncryptOutcome {
        match self.encrypt_message(plaintext, recipient_key) {
            Ok(text) => EncryptOutcome {
                text,
                encrypted: true,
                error: None,
            },
            Err(err) => EncryptOutcome {
                text: plaintext.to_string(),
                encrypted: false,
                error: Some(err),
            },
        }
    }

    /// Fail-open variant of [`decrypt_message`](Self::decrypt_message): on any failure
    /// the outcome carries the [`DECRYPT_PLACEHOLDER`] sentinel and `decrypted == false`.
    pub fn decrypt_or_placeholder(&self, message: &str, sender_key: &str) -> DecryptOutcome {
        match self.decrypt_message(message, sender_key) {
            Ok(text) => DecryptOutcome {
                text,
                decrypted: true,
                error: None,
            },
            Err(err) => DecryptOutcome {
                text: DECRYPT_PLACEHOLDER.to_string(),
                decrypted: false,
                error: Some(err),
            },
        }
    }

    /// Computes an integrity tag over a message, or `None` before initialisation.
    ///
    /// The tag is `HMAC-SHA256(message, public_key)`, keyed with the *public* key of the
    /// signer. Anyone can recompute it, so it only shows a message was not altered after
    /// tagging, it does not prove authorship.
    pub fn sign_message(&self, message: &str) -> Option<String> {
        let identity = self.identity.as_ref()?;
        let tag = hmac_sha256(identity.public_key().as_bytes(), message.as_bytes());
        Some(hex::encode(tag))
    }

    /// Wipes the in-memory key pair and removes both persisted entries.
    ///
    /// The in-memory wipe happens unconditionally, even when the store fails.
    /// Afterwards [`is_enabled`](Self::is_enabled) returns `false` and
    /// [`public_key`](Self::public_key) returns `None`.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.identity = None;
        self.store.clear()?;
        Ok(())
    }

    /// Clears the current identity and generates a fresh one, returning the new public
    /// key. Used by the logout/key-reset flow.
    pub fn reset(&mut self) -> Result<String, SessionError> {
        self.clear()?;
        self.initialize()
    }
}

/// Verifies an integrity tag produced by [`DeviceSession::sign_message`].
///
/// Recomputes `HMAC-SHA256(message, sender_public_key)` and compares in constant time.
/// Needs no local identity. Non-hex signatures verify as `false`, never as an error.
pub fn verify_message(message: &str, signature: &str, sender_public_key: &str) -> bool {
    let Ok(tag) = hex::decode(signature) else {
        return false;
    };
    hmac_verify(sender_public_key.as_bytes(), message.as_bytes(), &tag)
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no device key pair has been initialised for this session")]
    MissingIdentity,

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Agreement(#[from] AgreementError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use std::io;

    use crate::agreement::KeyAgreement;
    use crate::crypto::Rng;
    use crate::store::{FsKeyStore, KeyStore, MemoryKeyStore, StoreError, StoredKeyPair};

    use super::{DECRYPT_PLACEHOLDER, DeviceSession, SessionError, verify_message};

    fn session(seed: u8) -> DeviceSession<MemoryKeyStore> {
        DeviceSession::with_rng(
            MemoryKeyStore::new(),
            KeyAgreement::default(),
            Rng::from_seed([seed; 32]),
        )
    }

    fn x25519_session(seed: u8) -> DeviceSession<MemoryKeyStore> {
        DeviceSession::with_rng(
            MemoryKeyStore::new(),
            KeyAgreement::X25519,
            Rng::from_seed([seed; 32]),
        )
    }

    /// Store double that fails every operation, simulating unavailable storage.
    struct UnavailableStore;

    impl KeyStore for UnavailableStore {
        fn load(&self) -> Result<Option<StoredKeyPair>, StoreError> {
            Err(io::Error::other("storage unavailable").into())
        }

        fn persist(&mut self, _keypair: &StoredKeyPair) -> Result<(), StoreError> {
            Err(io::Error::other("storage unavailable").into())
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            Err(io::Error::other("storage unavailable").into())
        }
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut session = session(1);
        let public_key_1 = session.initialize().unwrap();
        let public_key_2 = session.initialize().unwrap();
        assert_eq!(public_key_1, public_key_2);
        assert_eq!(session.public_key(), Some(public_key_1));
    }

    #[test]
    fn no_identity_before_initialize() {
        let session = DeviceSession::ephemeral(KeyAgreement::default());
        assert!(!session.is_enabled());
        assert_eq!(session.public_key(), None);
        assert_eq!(session.exchange_key(), None);
        assert_eq!(session.sign_message("hello"), None);
    }

    #[test]
    fn identity_survives_across_sessions() {
        let tmp = tempfile::tempdir().unwrap();

        let public_key = {
            let mut session = DeviceSession::with_rng(
                FsKeyStore::new(tmp.path()),
                KeyAgreement::default(),
                Rng::from_seed([1; 32]),
            );
            session.initialize().unwrap()
        };

        let mut session = DeviceSession::with_rng(
            FsKeyStore::new(tmp.path()),
            KeyAgreement::default(),
            Rng::from_seed([2; 32]),
        );
        assert_eq!(session.initialize().unwrap(), public_key);
    }

    #[test]
    fn encrypt_decrypt_round_trip_same_direction() {
        // In directed-digest mode the derived secret only depends on the local private
        // key and the remote key string, so the sealing session can open its own
        // envelope again.
        let mut session = session(1);
        session.initialize().unwrap();

        let remote_key = "cc".repeat(32);
        let envelope = session.encrypt_message("hello", &remote_key).unwrap();
        assert_ne!(envelope, "hello");
        assert_eq!(
            session.decrypt_message(&envelope, &remote_key).unwrap(),
            "hello"
        );
    }

    #[test]
    fn encrypt_decrypt_between_two_devices() {
        let mut alice = x25519_session(1);
        let mut bob = x25519_session(2);
        alice.initialize().unwrap();
        bob.initialize().unwrap();

        let envelope = alice
            .encrypt_message("hello bob", &bob.exchange_key().unwrap())
            .unwrap();
        assert_eq!(
            bob.decrypt_message(&envelope, &alice.exchange_key().unwrap())
                .unwrap(),
            "hello bob"
        );
    }

    #[test]
    fn encrypt_toward_arbitrary_recipient_key() {
        // The function only needs the recipient's public key string, no recipient
        // device has to exist locally.
        let mut session = session(1);
        session.initialize().unwrap();

        let outcome = session.encrypt_or_plaintext("hello", &"dd".repeat(32));
        assert!(outcome.encrypted);
        assert!(outcome.error.is_none());
        assert!(!outcome.text.is_empty());
        assert_ne!(outcome.text, "hello");
    }

    #[test]
    fn missing_identity_is_an_error() {
        let session = session(1);
        assert!(matches!(
            session.encrypt_message("hello", "key"),
            Err(SessionError::MissingIdentity)
        ));
        assert!(matches!(
            session.decrypt_message("deadbeef", "key"),
            Err(SessionError::MissingIdentity)
        ));
    }

    #[test]
    fn fail_open_encrypt_falls_back_to_plaintext() {
        let session = session(1);

        let outcome = session.encrypt_or_plaintext("hello", "key");
        assert!(!outcome.encrypted);
        assert_eq!(outcome.text, "hello");
        assert!(matches!(
            outcome.error,
            Some(SessionError::MissingIdentity)
        ));
    }

    #[test]
    fn fail_open_decrypt_falls_back_to_placeholder() {
        let mut session = session(1);
        session.initialize().unwrap();

        let outcome = session.decrypt_or_placeholder("not an envelope at all", "key");
        assert!(!outcome.decrypted);
        assert_eq!(outcome.text, DECRYPT_PLACEHOLDER);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn empty_recipient_key_rejected() {
        let mut session = session(1);
        session.initialize().unwrap();
        assert!(session.encrypt_message("hello", "").is_err());
    }

    #[test]
    fn signature_self_consistency() {
        let mut session = session(1);
        let public_key = session.initialize().unwrap();

        let signature = session.sign_message("hello").unwrap();
        assert!(verify_message("hello", &signature, &public_key));

        // Tampered message, wrong key and garbage signatures all fail.
        assert!(!verify_message("hello!", &signature, &public_key));
        assert!(!verify_message("hello", &signature, &"ee".repeat(32)));
        assert!(!verify_message("hello", "not hex", &public_key));
    }

    #[test]
    fn clear_wipes_identity_and_regenerates_differently() {
        let mut session = session(1);
        let public_key_1 = session.initialize().unwrap();

        session.clear().unwrap();
        assert!(!session.is_enabled());
        assert_eq!(session.public_key(), None);

        let public_key_2 = session.initialize().unwrap();
        assert_ne!(public_key_1, public_key_2);
    }

    #[test]
    fn reset_yields_fresh_key_pair() {
        let mut session = session(1);
        let public_key_1 = session.initialize().unwrap();
        let public_key_2 = session.reset().unwrap();
        assert_ne!(public_key_1, public_key_2);
        assert!(session.is_enabled());
    }

    #[test]
    fn unavailable_store_degrades_to_in_memory_identity() {
        let mut session = DeviceSession::with_rng(
            UnavailableStore,
            KeyAgreement::default(),
            Rng::from_seed([1; 32]),
        );

        let public_key = session.initialize().unwrap();
        assert!(session.is_enabled());
        assert_eq!(session.public_key(), Some(public_key));

        // Clearing still wipes the in-memory pair even though the store fails.
        assert!(session.clear().is_err());
        assert!(!session.is_enabled());
    }

    #[test]
    fn corrupted_private_entry_regenerates_identity() {
        let mut store = MemoryKeyStore::new();
        store
            .persist(&StoredKeyPair {
                private_key: "not a key".into(),
                public_key: "also not a key".into(),
            })
            .unwrap();

        let mut session =
            DeviceSession::with_rng(store, KeyAgreement::default(), Rng::from_seed([1; 32]));
        let public_key = session.initialize().unwrap();
        assert_eq!(public_key.len(), 64);
    }

    #[test]
    fn mismatched_public_entry_is_repaired_from_private_key() {
        let rng = Rng::from_seed([1; 32]);
        let identity = crate::identity::DeviceIdentity::generate(&rng).unwrap();

        let mut stored = identity.to_stored();
        stored.public_key = "ff".repeat(32);
        let mut store = MemoryKeyStore::new();
        store.persist(&stored).unwrap();

        let mut session =
            DeviceSession::with_rng(store, KeyAgreement::default(), Rng::from_seed([2; 32]));
        assert_eq!(session.initialize().unwrap(), identity.public_key());
    }
}
