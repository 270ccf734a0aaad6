//! Referral code derivation.

use anyhow::Context;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex length of a referral code.
const CODE_LEN: usize = 10;

/// Derive a stable referral code for a user.
///
/// Truncated HMAC-SHA256 over the uid, keyed with the server signing key:
/// deterministic per user, and not enumerable from uids alone.
pub fn referral_code(user_id: &str, key: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(key).context("HMAC init failed")?;
    mac.update(user_id.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(hex::encode(digest)[..CODE_LEN].to_string())
}
