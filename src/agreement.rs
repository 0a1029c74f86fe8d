// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairwise shared-secret derivation between two devices.
//!
//! Two modes are available and the choice is made once per session:
//!
//! - [`KeyAgreement::DirectedDigest`] reproduces the chat client's original formula
//!   `SHA256(local_private_key_hex + remote_public_key)` exactly. **This formula is not
//!   a key agreement**: the value depends on which party computes it, so a recipient on
//!   another device can never derive the secret the sender used. It is kept as the
//!   default for behavioural parity with existing clients and is only usable where both
//!   ends can compute the same directed value (for example, a device decrypting its own
//!   history). Switching away from it changes wire compatibility.
//! - [`KeyAgreement::X25519`] is the corrected scheme: an X25519 Diffie-Hellman exchange
//!   between the local exchange secret and the remote party's published exchange key,
//!   expanded through HKDF-SHA256. Both parties derive the same secret.
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::crypto::sha2::sha2_256;
use crate::crypto::x25519::{PublicKey, X25519Error};
use crate::crypto::Secret;
use crate::identity::DeviceIdentity;

/// 256-bit pairwise secret.
pub const SHARED_SECRET_SIZE: usize = 32;

const X25519_SECRET_INFO: &[u8] = b"converse-pairwise-secret-v1";

/// Shared-secret derivation mode of a session.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum KeyAgreement {
    /// `SHA256(local_private_key_hex + remote_public_key)`, the original directed
    /// formula. Direction-asymmetric, see the module documentation.
    #[default]
    DirectedDigest,

    /// X25519 Diffie-Hellman with HKDF-SHA256 expansion. The remote key string is the
    /// peer's hex-encoded exchange key ([`DeviceIdentity::exchange_key`]).
    X25519,
}

impl KeyAgreement {
    /// Derives the pairwise secret for a correspondent.
    ///
    /// The secret is ephemeral, recomputed on every encrypt and decrypt call and never
    /// persisted.
    pub(crate) fn pairwise_secret(
        &self,
        identity: &DeviceIdentity,
        remote_key: &str,
    ) -> Result<Secret<SHARED_SECRET_SIZE>, AgreementError> {
        if remote_key.is_empty() {
            return Err(AgreementError::EmptyRemoteKey);
        }

        match self {
            KeyAgreement::DirectedDigest => {
                let private_hex = identity.private_key_hex();
                let digest = sha2_256(&[private_hex.as_bytes(), remote_key.as_bytes()]);
                Ok(Secret::from_bytes(digest))
            }
            KeyAgreement::X25519 => {
                let their_key = PublicKey::from_hex(remote_key)?;
                let shared_point = identity.exchange_secret().diffie_hellman(&their_key)?;

                let hkdf = Hkdf::<Sha256>::new(None, &shared_point);
                let mut secret = [0u8; SHARED_SECRET_SIZE];
                hkdf.expand(X25519_SECRET_INFO, &mut secret)
                    .expect("32 bytes is a valid hkdf output length");
                Ok(Secret::from_bytes(secret))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AgreementError {
    #[error("remote public key must not be empty")]
    EmptyRemoteKey,

    #[error(transparent)]
    X25519(#[from] X25519Error),
}
