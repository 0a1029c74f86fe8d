// SPDX-License-Identifier: MIT OR Apache-2.0

//! X25519 key pairs for Diffie-Hellman key agreement.
use std::fmt;

use thiserror::Error;
use x25519_dalek::StaticSecret;

pub const X25519_KEY_SIZE: usize = 32;

/// X25519 secret key.
///
/// Any 32-byte value is a valid secret (clamping is applied internally by the curve
/// implementation), which allows the device private key bytes to double as the exchange
/// secret.
pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derives the public counterpart of this secret key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(x25519_dalek::PublicKey::from(&self.0).to_bytes())
    }

    /// Computes the shared X25519 point with the other party's public key.
    ///
    /// Rejects low-order public keys, where the resulting shared point would be the same
    /// for every secret.
    pub fn diffie_hellman(
        &self,
        their_key: &PublicKey,
    ) -> Result<[u8; X25519_KEY_SIZE], X25519Error> {
        let shared = self
            .0
            .diffie_hellman(&x25519_dalek::PublicKey::from(their_key.0));
        if !shared.was_contributory() {
            return Err(X25519Error::NonContributoryKey);
        }
        Ok(shared.to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not reveal secret values when printing debug info.
        f.debug_struct("SecretKey").field("value", &"***").finish()
    }
}

/// X25519 public key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey([u8; X25519_KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, X25519Error> {
        let bytes = hex::decode(value).map_err(|_| X25519Error::MalformedPublicKey)?;
        let bytes: [u8; X25519_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| X25519Error::MalformedPublicKey)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[derive(Debug, Error)]
pub enum X25519Error {
    #[error("public key is not a 32 byte hex-encoded value")]
    MalformedPublicKey,

    #[error("public key is a low-order point and yields a non-contributory shared secret")]
    NonContributoryKey,
}
