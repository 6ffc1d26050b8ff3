//! Time-based one-time password engine used to gate privileged relay writes.
//!
//! Produces the current code plus a configurable number of previous codes so
//! that a phone authenticator and this device do not need perfectly synced
//! clocks. The HMAC-SHA1 construction and the dynamic truncation follow
//! RFC 4226 / RFC 6238 bit for bit; shared secrets are supplied Base32
//! encoded, the way every authenticator app expects them.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;
use tracing::warn;

type HmacSha1 = Hmac<Sha1>;

/// Default RFC 6238 time step.
pub const STEP_SECS: u64 = 30;
/// Default code length.
pub const DIGITS: u32 = 6;

#[derive(Debug, Error)]
pub enum TotpError {
    #[error("invalid Base32 character {0:?} in secret")]
    InvalidBase32(char),

    #[error("secret decodes to an empty key")]
    EmptySecret,
}

/// Decodes an RFC 4648 Base32 string. `=` padding is accepted anywhere,
/// every other character outside the alphabet is an error.
pub fn base32_decode(encoded: &str) -> Result<Vec<u8>, TotpError> {
    let mut bits = 0u32;
    let mut buffer = 0u32;
    let mut decoded = Vec::with_capacity(encoded.len() * 5 / 8);

    for c in encoded.chars() {
        let n = match c {
            'A'..='Z' => c as u32 - 'A' as u32,
            '2'..='7' => c as u32 - '2' as u32 + 26,
            '=' => continue,
            other => return Err(TotpError::InvalidBase32(other)),
        };
        buffer = (buffer << 5) | n;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            decoded.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(decoded)
}

/// One HOTP code for a single counter value (RFC 4226 dynamic truncation).
fn hotp(key: &[u8], counter: u64, digits: u32) -> u32 {
    // HMAC accepts keys of any length, so this cannot fail for a non-empty key.
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return 0,
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0xf) as usize;
    let code = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    code % 10u32.pow(digits)
}

/// Generates the acceptance window for `secret` at `now_unix`: the current
/// code first, then up to `window - 1` previous codes (one per time step).
pub fn generate_window(
    secret: &str,
    now_unix: u64,
    window: usize,
    step_secs: u64,
    digits: u32,
) -> Result<Vec<u32>, TotpError> {
    let key = base32_decode(secret)?;
    if key.is_empty() {
        return Err(TotpError::EmptySecret);
    }

    let current_step = now_unix / step_secs;
    let codes = (0..window as u64)
        .map(|i| hotp(&key, current_step.saturating_sub(i), digits))
        .collect();
    Ok(codes)
}

/// True when `code` is valid for at least one of the given secrets at
/// `now_unix`. Secrets that fail to decode are skipped with a warning;
/// configuration loading should have rejected them already.
pub fn code_in_window(code: u32, secrets: &[String], now_unix: u64, window: usize) -> bool {
    for secret in secrets {
        match generate_window(secret, now_unix, window, STEP_SECS, DIGITS) {
            Ok(codes) if codes.contains(&code) => return true,
            Ok(_) => {}
            Err(e) => warn!("Skipping undecodable MFA secret: {}", e),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32_decodes_padded_text() {
        let decoded = base32_decode("JBSWY3DPFQQHO33SNRSA====").unwrap();
        assert_eq!(decoded, b"Hello, world");
    }

    #[test]
    fn base32_rejects_characters_outside_alphabet() {
        assert!(matches!(
            base32_decode("1ABC"),
            Err(TotpError::InvalidBase32('1'))
        ));
        assert!(matches!(
            base32_decode("abcd"),
            Err(TotpError::InvalidBase32('a'))
        ));
    }

    #[test]
    fn current_code_matches_known_vector() {
        // Known-good vector for this secret and timestamp.
        let codes = generate_window("DWRGVKRPQJLNU4GY", 1_602_659_430, 1, 30, 6).unwrap();
        assert_eq!(codes, vec![846_307]);

        // Same step five seconds later, same code.
        let codes = generate_window("DWRGVKRPQJLNU4GY", 1_602_659_435, 1, 30, 6).unwrap();
        assert_eq!(codes, vec![846_307]);
    }

    #[test]
    fn rfc6238_vector_reduced_to_six_digits() {
        // RFC 6238 appendix B, SHA-1 row at T=59 is 94287082; six digits keep
        // the low-order part.
        let secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
        let codes = generate_window(secret, 59, 1, 30, 6).unwrap();
        assert_eq!(codes, vec![287_082]);
    }

    #[test]
    fn window_is_most_recent_first() {
        let now = 1_602_659_430;
        let window = generate_window("DWRGVKRPQJLNU4GY", now, 3, 30, 6).unwrap();
        let current = generate_window("DWRGVKRPQJLNU4GY", now, 1, 30, 6).unwrap();
        let previous = generate_window("DWRGVKRPQJLNU4GY", now - 30, 1, 30, 6).unwrap();
        assert_eq!(window[0], current[0]);
        assert_eq!(window[1], previous[0]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn code_in_window_accepts_recent_and_rejects_stale() {
        let secret = "DWRGVKRPQJLNU4GY".to_string();
        let now = 1_602_659_430;
        let two_steps_old = generate_window(&secret, now - 60, 1, 30, 6).unwrap()[0];

        assert!(code_in_window(two_steps_old, &[secret.clone()], now, 5));
        assert!(!code_in_window(two_steps_old, &[secret.clone()], now, 2));
        assert!(!code_in_window(two_steps_old, &[], now, 5));
    }

    #[test]
    fn codes_are_zero_padded_range() {
        // Six digit codes always reduce modulo 10^6.
        let codes = generate_window("DWRGVKRPQJLNU4GY", 1_602_659_430, 20, 30, 6).unwrap();
        assert!(codes.iter().all(|c| *c < 1_000_000));
    }
}
