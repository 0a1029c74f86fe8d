// SPDX-License-Identifier: MIT OR Apache-2.0

//! HMAC-SHA256 message integrity tags.
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const HMAC_TAG_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Computes an HMAC-SHA256 tag over a message.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; HMAC_TAG_SIZE] {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("hmac-sha256 accepts keys of any length");
    mac.update(message);
    let result = mac.finalize().into_bytes();
    result[..].try_into().expect("hmac-sha256 tag size")
}

/// Verifies an HMAC-SHA256 tag in constant time.
pub fn hmac_verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("hmac-sha256 accepts keys of any length");
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}
