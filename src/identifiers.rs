use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::constants::{REFERENCE_PREFIX, REFERENCE_SUFFIX_LEN};

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Human-facing tracking code: `FB-YYYYMMDD-XXXXX`.
///
/// Codes sort by creation date. The random suffix is short, so callers must
/// regenerate when the store reports a collision.
pub fn generate_reference_code(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", REFERENCE_PREFIX, now.format("%Y%m%d"), suffix)
}

/// Opaque single-use survey token (122 random bits, no retry needed)
pub fn generate_survey_token() -> String {
    Uuid::new_v4().simple().to_string()
}
