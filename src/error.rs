use crate::domain::transaction::TransactionStatus;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("claimed amount {claimed} does not match the outstanding tuition {outstanding}")]
    AmountMismatch { claimed: Decimal, outstanding: Decimal },
    #[error("student {0} not found")]
    UnknownStudent(String),
    #[error("payer {0} not found")]
    UnknownPayer(String),
    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("another payer already holds an active challenge for student {0}")]
    Conflict(String),
    #[error("an active transaction already exists for this student")]
    DuplicateActive,
    #[error("transaction is {0}, not awaiting verification")]
    InvalidState(TransactionStatus),
    #[error("a concurrent update won the race")]
    Stale,

    #[error("one-time passcode expired")]
    Expired,
    #[error("incorrect passcode, {remaining} attempts remaining")]
    InvalidCode { remaining: u32 },
    #[error("verification attempt limit reached")]
    AttemptsExceeded,
    #[error("resend limit reached")]
    ResendLimitExceeded,

    #[error("insufficient balance to cover {0}")]
    InsufficientFunds(Decimal),
    #[error("tuition already settled for student {0}")]
    AlreadySettled(String),

    #[error("passcode delivery failed: {0}")]
    Delivery(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
