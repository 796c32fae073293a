//! License key formats.
//!
//! Keys are classified by shape alone.  There is no signature and no
//! issuer round-trip: anyone who knows the formats can produce a key
//! that classifies.  Treat this as a gate for honest users only.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEMO_KEY: &str = "DEMO-KEY-12345";
pub const FULL_KEY_PREFIX: &str = "LIC-PEGAWAI-2025-";

/// What a key unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Lifetime,
    Demo,
    Full,
}

/// Matches `key` against the recognised formats.
///
/// The lifetime key is compared first, then the demo key, then the full
/// license prefix.  Matching is exact and case-sensitive.
pub fn classify(key: &str, lifetime_key: &str) -> Option<KeyKind> {
    if !lifetime_key.is_empty() && key == lifetime_key {
        Some(KeyKind::Lifetime)
    } else if key == DEMO_KEY {
        Some(KeyKind::Demo)
    } else if key.starts_with(FULL_KEY_PREFIX) {
        Some(KeyKind::Full)
    } else {
        None
    }
}

/// Produces a new full-license key of the form
/// `LIC-PEGAWAI-2025-<RANDOM>-<USERHASH><TIME>`.
///
/// `RANDOM` is 13 upper-case hex characters, `USERHASH` the first eight
/// characters of base64(name + email) upper-cased, and `TIME` the
/// issue instant in milliseconds, base 36.
pub fn generate_license_key(name: &str, email: &str, now: DateTime<Utc>) -> String {
    let random: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .to_uppercase()
        .chars()
        .take(13)
        .collect();
    let user_hash: String = STANDARD
        .encode(format!("{name}{email}"))
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase();
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    format!("{FULL_KEY_PREFIX}{random}-{user_hash}{}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
