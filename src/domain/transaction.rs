use crate::domain::ledger::{PayerId, StudentId};
use crate::domain::money::Amount;
use crate::domain::otp::OtpChallenge;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque transaction identifier, generated at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    PendingOtp,
    Verified,
    Expired,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Terminal states are never mutated again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingOtp)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PendingOtp => "PENDING_OTP",
            Self::Verified => "VERIFIED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{label}")
    }
}

/// The unit of work: one payer settling one student's bill, guarded by a
/// one-time passcode challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub payer: PayerId,
    pub student: StudentId,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub challenge: OtpChallenge,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        payer: PayerId,
        student: StudentId,
        amount: Amount,
        challenge: OtpChallenge,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            payer,
            student,
            amount,
            status: TransactionStatus::PendingOtp,
            challenge,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.challenge.expires_at
    }

    /// Pending and inside the passcode validity window.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::PendingOtp && !self.is_expired(now)
    }

    /// Time left on the current passcode, floored at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        std::cmp::max(self.challenge.expires_at - now, Duration::zero())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::otp::CredentialGenerator;
    use rust_decimal_macros::dec;

    fn sample(now: DateTime<Utc>) -> Transaction {
        let issued = CredentialGenerator::new(6).issue(now, now + Duration::seconds(300));
        Transaction::new(
            PayerId::new("alice").unwrap(),
            StudentId::new("20120129").unwrap(),
            Amount::new(dec!(12500000)).unwrap(),
            issued.challenge,
            now,
        )
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let now = Utc::now();
        let tx = sample(now);
        assert_eq!(tx.status, TransactionStatus::PendingOtp);
        assert!(tx.is_active(now));
        assert_eq!(tx.remaining(now), Duration::seconds(300));
    }

    #[test]
    fn test_expiry_is_checked_lazily() {
        let now = Utc::now();
        let tx = sample(now);
        let later = now + Duration::seconds(301);
        assert!(tx.is_expired(later));
        assert!(!tx.is_active(later));
        assert_eq!(tx.remaining(later), Duration::zero());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransactionStatus::PendingOtp.is_terminal());
        assert!(TransactionStatus::Verified.is_terminal());
        assert!(TransactionStatus::Expired.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let raw = serde_json::to_string(&TransactionStatus::PendingOtp).unwrap();
        assert_eq!(raw, "\"PENDING_OTP\"");
        let raw = serde_json::to_string(&TransactionStatus::Verified).unwrap();
        assert_eq!(raw, "\"VERIFIED\"");
    }

    #[test]
    fn test_unique_ids() {
        let now = Utc::now();
        assert_ne!(sample(now).id, sample(now).id);
    }
}
