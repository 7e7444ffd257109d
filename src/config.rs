use crate::error::{PaymentError, Result};
use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

/// Tunable knobs for the transaction lifecycle engine.
///
/// All fields have defaults matching the production values; a TOML file can
/// override any subset of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of digits in a one-time passcode.
    pub otp_length: usize,
    /// Validity window of a passcode, in seconds.
    pub otp_ttl_secs: u64,
    /// Maximum verification attempts against a transaction before it fails.
    pub max_attempts: u32,
    /// Maximum passcode resends per transaction before it fails.
    pub max_resends: u32,
    /// Minimum gap between two effective resends, in seconds.
    pub resend_cooldown_secs: u64,
    /// A resend inside the cooldown is suppressed only while the current
    /// code still has more than this many seconds left.
    pub resend_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            otp_length: 6,
            otp_ttl_secs: 300,
            max_attempts: 5,
            max_resends: 3,
            resend_cooldown_secs: 60,
            resend_grace_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| PaymentError::Config(e.to_string()))
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl_secs as i64)
    }

    pub fn resend_cooldown(&self) -> Duration {
        Duration::seconds(self.resend_cooldown_secs as i64)
    }

    pub fn resend_grace(&self) -> Duration {
        Duration::seconds(self.resend_grace_secs as i64)
    }
}
