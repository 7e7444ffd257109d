use crate::domain::ledger::{PayerAccount, PayerId, StudentId, StudentRecord};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{Ledger, MutateFn, Notifier, Outstanding, Settlement, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory transaction store.
///
/// All conditional writes run under one write lock, which makes the
/// active-uniqueness check and the compare-and-swap genuinely atomic.
/// Clones share the underlying map.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert_active(&self, tx: Transaction, now: DateTime<Utc>) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let duplicate = transactions
            .values()
            .any(|existing| existing.student == tx.student && existing.is_active(now));
        if duplicate {
            return Err(PaymentError::DuplicateActive);
        }
        transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(id).cloned())
    }

    async fn find_pending_for_student(&self, student: &StudentId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.student == *student && tx.status == TransactionStatus::PendingOtp)
            .max_by_key(|tx| tx.created_at)
            .cloned())
    }

    async fn compare_and_swap_status(
        &self,
        id: &TransactionId,
        expected: TransactionStatus,
        new_status: TransactionStatus,
        mutate: MutateFn,
    ) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions
            .get_mut(id)
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))?;
        if tx.status != expected {
            return Err(PaymentError::Stale);
        }
        mutate(tx);
        tx.status = new_status;
        Ok(tx.clone())
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::PendingOtp && tx.is_expired(now))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut all: Vec<Transaction> = transactions.values().cloned().collect();
        all.sort_by_key(|tx| tx.created_at);
        Ok(all)
    }
}

struct LedgerState {
    payers: HashMap<PayerId, PayerAccount>,
    students: HashMap<StudentId, StudentRecord>,
    settlements: HashSet<TransactionId>,
}

/// In-memory ledger collaborator.
///
/// `settle_once` runs its balance check, debit and paid-flag write inside a
/// single write-lock critical section and records the transaction id, so a
/// replayed settlement is a no-op.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new(payers: Vec<PayerAccount>, students: Vec<StudentRecord>) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState {
                payers: payers.into_iter().map(|p| (p.id.clone(), p)).collect(),
                students: students.into_iter().map(|s| (s.id.clone(), s)).collect(),
                settlements: HashSet::new(),
            })),
        }
    }

    pub async fn payer_balance(&self, payer: &PayerId) -> Option<Balance> {
        let state = self.state.read().await;
        state.payers.get(payer).map(|p| p.balance)
    }

    pub async fn student(&self, student: &StudentId) -> Option<StudentRecord> {
        let state = self.state.read().await;
        state.students.get(student).cloned()
    }

    /// Current ledger contents sorted by id, for reporting.
    pub async fn snapshot(&self) -> (Vec<PayerAccount>, Vec<StudentRecord>) {
        let state = self.state.read().await;
        let mut payers: Vec<PayerAccount> = state.payers.values().cloned().collect();
        payers.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let mut students: Vec<StudentRecord> = state.students.values().cloned().collect();
        students.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        (payers, students)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn outstanding(&self, student: &StudentId) -> Result<Outstanding> {
        let state = self.state.read().await;
        let record = state
            .students
            .get(student)
            .ok_or_else(|| PaymentError::UnknownStudent(student.to_string()))?;
        Ok(Outstanding {
            amount: record.tuition_amount,
            is_paid: record.is_paid,
        })
    }

    async fn payer(&self, payer: &PayerId) -> Result<PayerAccount> {
        let state = self.state.read().await;
        state
            .payers
            .get(payer)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownPayer(payer.to_string()))
    }

    async fn settle_once(
        &self,
        tx_id: &TransactionId,
        payer: &PayerId,
        student: &StudentId,
        amount: Amount,
    ) -> Result<Settlement> {
        let mut state = self.state.write().await;
        if state.settlements.contains(tx_id) {
            return Ok(Settlement::AlreadyApplied);
        }

        let LedgerState {
            payers,
            students,
            settlements,
        } = &mut *state;

        let record = students
            .get_mut(student)
            .ok_or_else(|| PaymentError::UnknownStudent(student.to_string()))?;
        if record.is_paid {
            return Err(PaymentError::AlreadySettled(student.to_string()));
        }

        let account = payers
            .get_mut(payer)
            .ok_or_else(|| PaymentError::UnknownPayer(payer.to_string()))?;
        account.debit(amount)?;
        record.settle(amount, Utc::now());
        settlements.insert(*tx_id);

        Ok(Settlement::Applied)
    }
}

/// Records every delivery instead of sending it anywhere. Tests and the CLI
/// driver read codes back out of the mailbox.
#[derive(Default, Clone)]
pub struct MailboxNotifier {
    deliveries: Arc<RwLock<Vec<Delivery>>>,
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub destination: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl MailboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn last_code_for(&self, destination: &str) -> Option<String> {
        let deliveries = self.deliveries.read().await;
        deliveries
            .iter()
            .rev()
            .find(|d| d.destination == destination)
            .map(|d| d.code.clone())
    }

    pub async fn delivery_count(&self) -> usize {
        let deliveries = self.deliveries.read().await;
        deliveries.len()
    }
}

#[async_trait]
impl Notifier for MailboxNotifier {
    async fn send(&self, destination: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()> {
        tracing::debug!(destination, "passcode delivered to mailbox");
        let mut deliveries = self.deliveries.write().await;
        deliveries.push(Delivery {
            destination: destination.to_string(),
            code: code.to_string(),
            expires_at,
        });
        Ok(())
    }
}

/// A notifier whose deliveries always fail. Lets tests check that an issued
/// code survives a delivery outage.
#[derive(Default, Clone)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, destination: &str, _code: &str, _expires_at: DateTime<Utc>) -> Result<()> {
        Err(PaymentError::Delivery(format!(
            "smtp refused mail for {destination}"
        )))
    }
}
