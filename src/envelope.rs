// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-contained authenticated message envelopes.
//!
//! A sealed message is a single hex string carrying everything needed to open it again
//! with the same pairwise secret:
//!
//! ```text
//! hex( salt[16] || nonce[12] || ciphertext+tag )
//! ```
//!
//! The per-message key is derived from the pairwise secret and the random salt with
//! HKDF-SHA256, encryption is AES-256-GCM. Salt and nonce are fresh for every message,
//! so sealing the same plaintext twice yields different envelopes. Callers never handle
//! nonces or salts themselves.
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::agreement::SHARED_SECRET_SIZE;
use crate::crypto::{Rng, RngError, Secret};

/// Length of the random HKDF salt embedded in each envelope.
pub const SALT_SIZE: usize = 16;

/// Length of the AES-GCM nonce embedded in each envelope.
pub const NONCE_SIZE: usize = 12;

/// Length of the AES-GCM authentication tag.
const TAG_SIZE: usize = 16;

const ENVELOPE_KEY_INFO: &[u8] = b"converse-message-envelope-v1";

/// Encrypts a message under a pairwise secret into a self-contained envelope string.
pub fn seal(
    plaintext: &str,
    secret: &Secret<SHARED_SECRET_SIZE>,
    rng: &Rng,
) -> Result<String, EnvelopeError> {
    let salt: [u8; SALT_SIZE] = rng.random_array()?;
    let nonce: [u8; NONCE_SIZE] = rng.random_array()?;

    let key = derive_message_key(secret, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| EnvelopeError::Encrypt)?;

    let mut envelope = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(hex::encode(envelope))
}

/// Decrypts an envelope string with a pairwise secret.
///
/// Fails on malformed encoding, truncation, a wrong secret or any bit-flip in the
/// ciphertext. Never panics on arbitrary input.
pub fn open(
    envelope: &str,
    secret: &Secret<SHARED_SECRET_SIZE>,
) -> Result<String, EnvelopeError> {
    let bytes = hex::decode(envelope)?;
    if bytes.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(EnvelopeError::TooShort);
    }

    let (salt, rest) = bytes.split_at(SALT_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let key = derive_message_key(secret, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EnvelopeError::Decrypt)?;

    String::from_utf8(plaintext).map_err(|_| EnvelopeError::InvalidUtf8)
}

fn derive_message_key(
    secret: &Secret<SHARED_SECRET_SIZE>,
    salt: &[u8],
) -> Zeroizing<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), secret.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(ENVELOPE_KEY_INFO, key.as_mut())
        .expect("32 bytes is a valid hkdf output length");
    key
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("envelope is not a hex-encoded value")]
    MalformedEncoding(#[from] hex::FromHexError),

    #[error("envelope is too short to contain salt, nonce and ciphertext")]
    TooShort,

    #[error("message could not be encrypted")]
    Encrypt,

    #[error("ciphertext failed authentication or was sealed with a different secret")]
    Decrypt,

    #[error("decrypted message is not valid utf-8")]
    InvalidUtf8,
}
