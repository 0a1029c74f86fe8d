// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device identity key pair.
//!
//! A device identity is a 256-bit random private key together with its published public
//! counterpart, the SHA2-256 digest of the private key's hex form. The digest is a
//! one-way commitment to the private key, it is not a curve point. For the X25519
//! key-agreement mode the same private bytes double as the exchange secret and the
//! derived curve point is published separately (see [`DeviceIdentity::exchange_key`]).
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::sha2::{SHA256_DIGEST_SIZE, sha2_256};
use crate::crypto::x25519;
use crate::crypto::{Rng, RngError, Secret};
use crate::store::StoredKeyPair;

/// 256-bit private key.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Key pair identifying one device.
///
/// Immutable after creation, the only way to change a device identity is to generate a
/// full replacement. The public digest is always recomputed from the private key, so the
/// invariant `public_key == SHA256(private_key_hex)` holds by construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    private_key: Secret<PRIVATE_KEY_SIZE>,
    public_key: [u8; SHA256_DIGEST_SIZE],
}

impl DeviceIdentity {
    /// Generates a fresh identity from the random-number generator.
    pub fn generate(rng: &Rng) -> Result<Self, IdentityError> {
        let bytes: [u8; PRIVATE_KEY_SIZE] = rng.random_array()?;
        Ok(Self::from_private_bytes(bytes))
    }

    fn from_private_bytes(bytes: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let private_key = Secret::from_bytes(bytes);
        let private_hex = Zeroizing::new(hex::encode(private_key.as_bytes()));
        let public_key = sha2_256(&[private_hex.as_bytes()]);
        Self {
            private_key,
            public_key,
        }
    }

    /// Restores an identity from its persisted form.
    ///
    /// The private entry is authoritative: the public digest is recomputed from it and
    /// may disagree with the persisted public entry (a corrupted store). Callers decide
    /// whether to repair the store, see [`crate::DeviceSession::initialize`].
    pub fn from_stored(stored: &StoredKeyPair) -> Result<Self, IdentityError> {
        let bytes = hex::decode(&stored.private_key)
            .map_err(|_| IdentityError::MalformedPrivateKey)?;
        let bytes: [u8; PRIVATE_KEY_SIZE] =
            bytes.try_into().map_err(|_| IdentityError::InvalidKeySize)?;
        Ok(Self::from_private_bytes(bytes))
    }

    /// Returns the persisted form of this identity, two lowercase hex entries.
    pub fn to_stored(&self) -> StoredKeyPair {
        StoredKeyPair {
            private_key: hex::encode(self.private_key.as_bytes()),
            public_key: self.public_key(),
        }
    }

    /// The published public key, `SHA256(private_key_hex)` in lowercase hex.
    pub fn public_key(&self) -> String {
        hex::encode(self.public_key)
    }

    /// The published X25519 exchange key in lowercase hex.
    ///
    /// Only correspondents using [`crate::KeyAgreement::X25519`] need this value.
    pub fn exchange_key(&self) -> String {
        self.exchange_secret().public_key().to_hex()
    }

    /// The private key in its canonical lowercase hex form.
    pub(crate) fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.private_key.as_bytes()))
    }

    /// The private key interpreted as an X25519 exchange secret.
    pub(crate) fn exchange_secret(&self) -> x25519::SecretKey {
        x25519::SecretKey::from_bytes(*self.private_key.as_bytes())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("persisted private key is not a hex-encoded value")]
    MalformedPrivateKey,

    #[error("persisted private key does not match the required 32 byte length")]
    InvalidKeySize,
}

#[cfg(test)]
mod tests {
    use crate::crypto::Rng;
    use crate::crypto::sha2::sha2_256;
    use crate::store::StoredKeyPair;

    use super::{DeviceIdentity, IdentityError};

    #[test]
    fn public_key_is_digest_of_private_hex() {
        let rng = Rng::from_seed([1; 32]);
        let identity = DeviceIdentity::generate(&rng).unwrap();

        let stored = identity.to_stored();
        let expected = hex::encode(sha2_256(&[stored.private_key.as_bytes()]));
        assert_eq!(identity.public_key(), expected);
        assert_eq!(stored.public_key, expected);
    }

    #[test]
    fn generated_identities_are_distinct() {
        let rng = Rng::from_seed([1; 32]);
        let identity_1 = DeviceIdentity::generate(&rng).unwrap();
        let identity_2 = DeviceIdentity::generate(&rng).unwrap();
        assert_ne!(identity_1.public_key(), identity_2.public_key());
    }

    #[test]
    fn stored_round_trip() {
        let rng = Rng::from_seed([2; 32]);
        let identity = DeviceIdentity::generate(&rng).unwrap();

        let restored = DeviceIdentity::from_stored(&identity.to_stored()).unwrap();
        assert_eq!(identity, restored);
        assert_eq!(identity.exchange_key(), restored.exchange_key());
    }

    #[test]
    fn corrupted_public_entry_is_overruled_by_private_key() {
        let rng = Rng::from_seed([3; 32]);
        let identity = DeviceIdentity::generate(&rng).unwrap();

        let mut stored = identity.to_stored();
        stored.public_key = "ff".repeat(32);

        // The digest is recomputed from the private entry, not read from the store.
        let restored = DeviceIdentity::from_stored(&stored).unwrap();
        assert_eq!(restored.public_key(), identity.public_key());
        assert_ne!(restored.public_key(), stored.public_key);
    }

    #[test]
    fn malformed_stored_keys_rejected() {
        let not_hex = StoredKeyPair {
            private_key: "not a key".into(),
            public_key: String::new(),
        };
        assert!(matches!(
            DeviceIdentity::from_stored(&not_hex),
            Err(IdentityError::MalformedPrivateKey)
        ));

        let too_short = StoredKeyPair {
            private_key: "abcd".into(),
            public_key: String::new(),
        };
        assert!(matches!(
            DeviceIdentity::from_stored(&too_short),
            Err(IdentityError::InvalidKeySize)
        ));
    }
}
