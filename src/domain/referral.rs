use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated referral codes
pub const REFERRAL_CODE_LEN: usize = 8;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralCode {
    pub user_address: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub referrer_address: String,
    pub referee_address: String,
    pub created_at: DateTime<Utc>,
}

/// Random uppercase code without look-alike characters (0/O, 1/I)
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form of a user-entered code; `None` if it cannot be a valid code
pub fn normalize_referral_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() == REFERRAL_CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
        Some(code)
    } else {
        None
    }
}
