use crate::domain::ledger::StudentId;
use crate::domain::ports::{MutateFn, TransactionStore};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for transaction records, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for the active-transaction index, keyed by student id.
pub const CF_ACTIVE: &str = "active";

/// A persistent transaction store backed by RocksDB.
///
/// The `active` column family holds one pointer per student to its pending
/// transaction; read-modify-write sequences are serialized by an internal
/// mutex so the uniqueness check and the compare-and-swap stay atomic.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbTransactionStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbTransactionStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// both column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let cf_active = ColumnFamilyDescriptor::new(CF_ACTIVE, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions, cf_active])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Storage(format!("column family {name} not found")))
    }

    fn read(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, id.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, tx: &Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let value = serde_json::to_vec(tx)?;
        self.db.put_cf(cf, tx.id.to_string().as_bytes(), value)?;
        Ok(())
    }

    fn active_pointer(&self, student: &StudentId) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_ACTIVE)?;
        match self.db.get_cf(cf, student.as_str().as_bytes())? {
            Some(bytes) => {
                let id: TransactionId = serde_json::from_slice(&bytes)?;
                self.read(&id)
            }
            None => Ok(None),
        }
    }

    fn set_active_pointer(&self, student: &StudentId, id: &TransactionId) -> Result<()> {
        let cf = self.cf(CF_ACTIVE)?;
        let value = serde_json::to_vec(id)?;
        self.db.put_cf(cf, student.as_str().as_bytes(), value)?;
        Ok(())
    }

    fn clear_active_pointer(&self, student: &StudentId, id: &TransactionId) -> Result<()> {
        // Only remove the pointer if it still references this transaction.
        if let Some(current) = self.active_pointer(student)?
            && current.id == *id
        {
            let cf = self.cf(CF_ACTIVE)?;
            self.db.delete_cf(cf, student.as_str().as_bytes())?;
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for RocksDbTransactionStore {
    async fn insert_active(&self, tx: Transaction, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.active_pointer(&tx.student)?
            && existing.is_active(now)
        {
            return Err(PaymentError::DuplicateActive);
        }
        self.write(&tx)?;
        self.set_active_pointer(&tx.student, &tx.id)?;
        Ok(())
    }

    async fn get(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.read(id)
    }

    async fn find_pending_for_student(&self, student: &StudentId) -> Result<Option<Transaction>> {
        Ok(self
            .active_pointer(student)?
            .filter(|tx| tx.status == TransactionStatus::PendingOtp))
    }

    async fn compare_and_swap_status(
        &self,
        id: &TransactionId,
        expected: TransactionStatus,
        new_status: TransactionStatus,
        mutate: MutateFn,
    ) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self
            .read(id)?
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))?;
        if tx.status != expected {
            return Err(PaymentError::Stale);
        }
        mutate(&mut tx);
        tx.status = new_status;
        self.write(&tx)?;
        if new_status != TransactionStatus::PendingOtp {
            self.clear_active_pointer(&tx.student, id)?;
        }
        Ok(tx)
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut stale = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            if tx.status == TransactionStatus::PendingOtp && tx.is_expired(now) {
                stale.push(tx);
            }
        }
        Ok(stale)
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut all = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            all.push(tx);
        }
        all.sort_by_key(|tx| tx.created_at);
        Ok(all)
    }
}
