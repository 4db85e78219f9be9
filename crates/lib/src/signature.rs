//! Webhook signature verification (`X-Hub-Signature-256`).
//!
//! Meta signs every webhook body with HMAC-SHA256 keyed by the app secret and sends
//! `sha256=<hex>` in the header. The digest covers the exact bytes on the wire, so callers must
//! pass the raw body; parsing and re-serializing the JSON does not reproduce those bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).ok()
}

/// Returns true only when `header` is `sha256=<hex>` and the hex digest equals
/// HMAC-SHA256(`app_secret`, `body`). The comparison is constant time.
///
/// Absent header, unset or empty secret, missing prefix, bad hex (odd length, non-hex
/// characters) and digest length mismatch all yield false.
pub fn verify_signature(app_secret: Option<&str>, body: &[u8], header: Option<&str>) -> bool {
    let Some(secret) = app_secret.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(hex_sig) = header.and_then(|h| h.trim().strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_sig) else {
        return false;
    };
    let Some(mut mac) = mac_for(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// Header value (`sha256=<hex>`) for `body` signed with `secret`.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let digest = match mac_for(secret) {
        Some(mut mac) => {
            mac.update(body);
            mac.finalize().into_bytes().to_vec()
        }
        None => Vec::new(),
    };
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest))
}
