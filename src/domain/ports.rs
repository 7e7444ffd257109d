use crate::domain::ledger::{PayerAccount, PayerId, StudentId};
use crate::domain::money::Amount;
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Mutation applied to the current record inside a compare-and-swap, under
/// the store's exclusion. Runs before the status write.
pub type MutateFn = Box<dyn FnOnce(&mut Transaction) + Send>;

/// Durable, conditionally-consistent persistence for transactions.
///
/// `insert_active` and `compare_and_swap_status` are the two primitives the
/// engine builds every state transition on; neither allows a transition to be
/// silently lost under concurrent callers.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts a new `PENDING_OTP` transaction. Fails with `DuplicateActive`
    /// if an unexpired pending transaction already exists for the student —
    /// the check and the insert are one atomic operation.
    async fn insert_active(&self, tx: Transaction, now: DateTime<Utc>) -> Result<()>;

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>>;

    /// The pending transaction for a student, expired or not. The engine
    /// classifies it (reuse, conflict, lazy expiry).
    async fn find_pending_for_student(&self, student: &StudentId) -> Result<Option<Transaction>>;

    /// Applies `mutate` and writes `new_status` only if the record's current
    /// status equals `expected`; fails with `Stale` otherwise. Returns the
    /// updated record.
    async fn compare_and_swap_status(
        &self,
        id: &TransactionId,
        expected: TransactionStatus,
        new_status: TransactionStatus,
        mutate: MutateFn,
    ) -> Result<Transaction>;

    /// Pending transactions whose passcode window has passed, for the
    /// hygiene sweep.
    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>>;

    /// Every stored transaction, ordered by creation time.
    async fn all(&self) -> Result<Vec<Transaction>>;

    /// Point read of the active transaction for a payer/student pair.
    async fn find_active_for(
        &self,
        payer: &PayerId,
        student: &StudentId,
        now: DateTime<Utc>,
    ) -> Result<Option<Transaction>> {
        Ok(self
            .find_pending_for_student(student)
            .await?
            .filter(|tx| tx.payer == *payer && tx.is_active(now)))
    }
}

pub type TransactionStoreBox = Box<dyn TransactionStore>;

/// A student's outstanding bill as the ledger currently sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outstanding {
    pub amount: Amount,
    pub is_paid: bool,
}

/// Outcome of an idempotent settlement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Balance debited and student marked paid in this call.
    Applied,
    /// A previous call for the same transaction id already settled; nothing
    /// was mutated.
    AlreadyApplied,
}

/// External collaborator holding payer balances and student paid-flags.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn outstanding(&self, student: &StudentId) -> Result<Outstanding>;

    async fn payer(&self, payer: &PayerId) -> Result<PayerAccount>;

    /// Atomically re-checks the balance and the paid-flag, debits the payer
    /// and marks the student paid. Idempotent per `tx_id`: a replay is a
    /// no-op reported as `AlreadyApplied`.
    async fn settle_once(
        &self,
        tx_id: &TransactionId,
        payer: &PayerId,
        student: &StudentId,
        amount: Amount,
    ) -> Result<Settlement>;
}

pub type LedgerBox = Box<dyn Ledger>;

/// Delivers the passcode out of band. A delivery failure never invalidates
/// the issued code.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()>;
}

pub type NotifierBox = Box<dyn Notifier>;

/// Source of the current instant. Expiry is evaluated lazily against this,
/// never against in-memory timers.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type ClockBox = Box<dyn Clock>;
