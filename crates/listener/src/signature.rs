//! Webhook signature verification.
//!
//! GitHub signs every delivery with HMAC-SHA256 over the raw request body
//! and sends the hex-encoded result as `X-Hub-Signature-256: sha256=<hex>`.
//! Verification recomputes the MAC over the exact bytes received and
//! compares in constant time; short-circuit string equality would leak how
//! many leading bytes of a forged signature were correct.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Computes the hex-encoded HMAC-SHA256 of `body` under `secret`.
///
/// Exposed so tests can produce valid signatures; production only verifies.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Returns `true` iff `header` is a well-formed `sha256=<hex>` signature
/// matching `body` under `secret`.
///
/// `None` (header absent) and malformed values verify as `false`; the caller
/// answers 401 either way and never distinguishes the two to the sender.
pub fn verify_signature(body: &[u8], header: Option<&str>, secret: &str) -> bool {
    let Some(header) = header else {
        return false;
    };
    let Some(claimed) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let expected = compute_signature(secret, body);
    claimed.as_bytes().ct_eq(expected.as_bytes()).into()
}
