/// Time-based one-time passwords (RFC 6238, HMAC-SHA1, 30 second step, 6 digits)
use crate::error::{WhitelistError, WhitelistResult};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const TIME_STEP_SECS: i64 = 30;
pub const DIGITS: u32 = 6;

/// Decode a base32 shared secret as handed out by authenticator setup pages.
///
/// Spaces, `=` padding and lowercase letters are accepted.
pub fn decode_secret(secret: &str) -> WhitelistResult<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.is_empty() {
        return Err(WhitelistError::Config("TOTP secret is empty".to_string()));
    }

    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &normalized)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| WhitelistError::Config("TOTP secret is not valid base32".to_string()))
}

/// Generate the code valid at `at` for a base32 secret
pub fn generate_code(secret: &str, at: DateTime<Utc>) -> WhitelistResult<String> {
    let key = decode_secret(secret)?;
    let counter = at.timestamp().div_euclid(TIME_STEP_SECS) as u64;
    hotp(&key, counter)
}

/// RFC 4226 HOTP value for a raw key and counter
fn hotp(key: &[u8], counter: u64) -> WhitelistResult<String> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| WhitelistError::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    // Dynamic truncation
    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    let code = binary % 10u32.pow(DIGITS);
    Ok(format!("{:0width$}", code, width = DIGITS as usize))
}
