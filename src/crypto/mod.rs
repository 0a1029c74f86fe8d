// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cryptographic primitives used by the device identity and message envelope
//! implementations.
pub(crate) mod hmac;
mod rng;
mod secret;
pub(crate) mod sha2;
pub(crate) mod x25519;

pub use rng::{Rng, RngError};
pub use secret::Secret;
pub use x25519::X25519Error;
