// SPDX-License-Identifier: MIT OR Apache-2.0

//! `converse-encryption` provides the device-side end-to-end encryption of the Converse
//! chat client: a per-device identity key pair, pairwise shared-secret derivation with a
//! correspondent and authenticated symmetric encryption of message text.
//!
//! The crate is a pure library without any network protocol of its own. The surrounding
//! application publishes the local public key to its profile record, fetches a
//! correspondent's key before encrypting or decrypting, and stores the resulting
//! envelope string alongside each chat message.
//!
//! ## Device identity
//!
//! Every device generates a 256-bit random private key on first use and publishes its
//! SHA2-256 digest as the public key. The pair is persisted through a pluggable
//! [`KeyStore`] (two string entries, matching the client's origin-scoped storage) and
//! loaded on every subsequent session. See [`DeviceSession::initialize`].
//!
//! ## Message encryption
//!
//! Message text is sealed into a self-contained envelope string: a per-message key is
//! derived from the pairwise secret with HKDF-SHA256 and a random salt, encryption is
//! AES-256-GCM. Salt and nonce travel inside the envelope, callers only ever handle two
//! strings.
//!
//! ## Failure behaviour
//!
//! Every operation degrades gracefully. The typed API returns a [`SessionError`];
//! the fail-open API reproduces the original client behaviour, handing back the
//! plaintext on a failed encrypt and the [`DECRYPT_PLACEHOLDER`] sentinel on a failed
//! decrypt, so a cryptographic failure never blocks sending or displaying a message.
//! Callers must check the outcome flag before treating a message as protected.
//!
//! ## Security
//!
//! Two limitations of the original client are preserved deliberately and need to be
//! understood before relying on this crate:
//!
//! - The default [`KeyAgreement::DirectedDigest`] mode reproduces the original
//!   shared-secret formula `SHA256(local_private_key_hex + remote_public_key)`. The
//!   formula is direction-asymmetric and therefore **not a usable key agreement between
//!   two independent devices**. The corrected [`KeyAgreement::X25519`] mode ships
//!   alongside it; switching modes changes wire compatibility and is an application
//!   decision.
//! - [`DeviceSession::sign_message`] keys its HMAC with the signer's *public* key. The
//!   tag detects accidental modification but proves nothing about authorship, since
//!   anyone can recompute it.
mod agreement;
mod crypto;
mod envelope;
mod identity;
mod session;
mod store;

pub use agreement::{AgreementError, KeyAgreement, SHARED_SECRET_SIZE};
pub use crypto::{Rng, RngError, X25519Error};
pub use envelope::{EnvelopeError, NONCE_SIZE, SALT_SIZE};
pub use identity::{DeviceIdentity, IdentityError, PRIVATE_KEY_SIZE};
pub use session::{
    DECRYPT_PLACEHOLDER, DecryptOutcome, DeviceSession, EncryptOutcome, SessionError,
    verify_message,
};
pub use store::{
    FsKeyStore, KeyStore, MemoryKeyStore, PRIVATE_KEY_ENTRY, PUBLIC_KEY_ENTRY, StoreError,
    StoredKeyPair,
};
