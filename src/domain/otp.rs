use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;

/// The stored side of a one-time passcode: a salted HMAC-SHA-256 digest plus
/// the validity window and usage counters. The plaintext code is never kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub code_hash: String,
    pub salt: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub resend_count: u32,
    pub last_resend_at: Option<DateTime<Utc>>,
}

impl OtpChallenge {
    /// Constant-time check of a submitted code against the stored digest.
    pub fn verify_code(&self, submitted: &str) -> bool {
        let Ok(salt) = hex::decode(&self.salt) else {
            return false;
        };
        let Ok(expected) = hex::decode(&self.code_hash) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&salt).expect("HMAC accepts any key length");
        mac.update(submitted.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

/// A freshly generated passcode. The plaintext is handed out exactly once for
/// dispatch; only the challenge half is persisted.
#[derive(Debug)]
pub struct IssuedOtp {
    pub code: String,
    pub challenge: OtpChallenge,
}

/// Produces fixed-width numeric passcodes from the operating system CSPRNG.
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    length: usize,
}

impl CredentialGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn issue(&self, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> IssuedOtp {
        let code: String = (0..self.length)
            .map(|_| char::from(b'0' + OsRng.gen_range(0..10u8)))
            .collect();

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill(&mut salt);

        let mut mac = HmacSha256::new_from_slice(&salt).expect("HMAC accepts any key length");
        mac.update(code.as_bytes());
        let code_hash = hex::encode(mac.finalize().into_bytes());

        IssuedOtp {
            code,
            challenge: OtpChallenge {
                code_hash,
                salt: hex::encode(salt),
                issued_at,
                expires_at,
                attempts: 0,
                resend_count: 0,
                last_resend_at: None,
            },
        }
    }
}
