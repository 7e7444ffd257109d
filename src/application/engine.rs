use crate::config::EngineConfig;
use crate::domain::ledger::{PayerId, StudentId};
use crate::domain::money::Amount;
use crate::domain::otp::CredentialGenerator;
use crate::domain::ports::{ClockBox, LedgerBox, NotifierBox, Settlement, TransactionStoreBox};
use crate::domain::transaction::{Transaction, TransactionId, TransactionStatus};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Receipt for an `initiate` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitiateReceipt {
    pub transaction_id: TransactionId,
    /// True when an already-active challenge was reused instead of a new
    /// code being issued.
    pub is_existing_transaction: bool,
    pub expires_in: Duration,
}

/// Receipt for a `resend` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResendReceipt {
    pub expires_in: Duration,
    /// True when the call was suppressed by the cooldown and the previous
    /// window still stands.
    pub is_existing: bool,
}

/// Receipt for a successful `verify` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyReceipt {
    pub transaction_id: TransactionId,
    pub settled_amount: Amount,
}

/// The main entry point for the tuition payment lifecycle.
///
/// `TuitionEngine` orchestrates initiate/resend/verify/cancel against the
/// transaction store, the credential generator and the external ledger and
/// notifier. It holds no in-process locks: same-student operations are
/// serialized by the store's active-uniqueness constraint and its
/// compare-and-swap primitive, so any number of engine instances may share
/// one store.
pub struct TuitionEngine {
    store: TransactionStoreBox,
    ledger: LedgerBox,
    notifier: NotifierBox,
    clock: ClockBox,
    generator: CredentialGenerator,
    config: EngineConfig,
}

impl TuitionEngine {
    pub fn new(
        store: TransactionStoreBox,
        ledger: LedgerBox,
        notifier: NotifierBox,
        clock: ClockBox,
        config: EngineConfig,
    ) -> Self {
        let generator = CredentialGenerator::new(config.otp_length);
        Self {
            store,
            ledger,
            notifier,
            clock,
            generator,
            config,
        }
    }

    /// Starts (or resumes) a payment transaction and dispatches a passcode.
    ///
    /// Re-submitting the same initiation while a challenge is live returns
    /// the existing transaction instead of minting a second code, so a
    /// double-click or page reload never produces two live challenges.
    pub async fn initiate(
        &self,
        payer: &PayerId,
        student: &StudentId,
        claimed_amount: Amount,
    ) -> Result<InitiateReceipt> {
        let now = self.clock.now();
        let account = self.ledger.payer(payer).await?;

        let bill = self.ledger.outstanding(student).await?;
        if bill.is_paid {
            return Err(PaymentError::AlreadySettled(student.to_string()));
        }
        if bill.amount != claimed_amount {
            return Err(PaymentError::AmountMismatch {
                claimed: claimed_amount.value(),
                outstanding: bill.amount.value(),
            });
        }

        if let Some(existing) = self.store.find_pending_for_student(student).await? {
            if existing.is_expired(now) {
                self.retire(&existing.id, TransactionStatus::Expired, now).await?;
            } else if existing.payer != *payer {
                return Err(PaymentError::Conflict(student.to_string()));
            } else if self.under_ceilings(&existing) {
                info!(
                    transaction = %existing.id,
                    payer = %payer,
                    student = %student,
                    "reusing active transaction"
                );
                return Ok(InitiateReceipt {
                    transaction_id: existing.id,
                    is_existing_transaction: true,
                    expires_in: existing.remaining(now),
                });
            } else {
                self.retire(&existing.id, TransactionStatus::Failed, now).await?;
            }
        }

        let issued = self
            .generator
            .issue(now, now + self.config.otp_ttl());
        let tx = Transaction::new(
            payer.clone(),
            student.clone(),
            claimed_amount,
            issued.challenge,
            now,
        );
        let transaction_id = tx.id;

        match self.store.insert_active(tx, now).await {
            Ok(()) => {}
            Err(PaymentError::DuplicateActive) => {
                // Lost the create race; resolve against the winner.
                if let Some(winner) = self.store.find_pending_for_student(student).await?
                    && winner.payer == *payer
                    && winner.is_active(now)
                {
                    return Ok(InitiateReceipt {
                        transaction_id: winner.id,
                        is_existing_transaction: true,
                        expires_in: winner.remaining(now),
                    });
                }
                return Err(PaymentError::Conflict(student.to_string()));
            }
            Err(e) => return Err(e),
        }

        info!(
            transaction = %transaction_id,
            payer = %payer,
            student = %student,
            amount = %claimed_amount,
            "transaction initiated"
        );
        self.dispatch(&account.email, &issued.code, now + self.config.otp_ttl())
            .await;

        Ok(InitiateReceipt {
            transaction_id,
            is_existing_transaction: false,
            expires_in: self.config.otp_ttl(),
        })
    }

    /// Re-issues the passcode for a pending transaction.
    ///
    /// A resend inside the cooldown while the current code still has more
    /// than the grace window left is suppressed and reports the unchanged
    /// window.
    pub async fn resend(&self, id: &TransactionId) -> Result<ResendReceipt> {
        match self.resend_once(id).await {
            Err(PaymentError::Stale) => match self.resend_once(id).await {
                Err(PaymentError::Stale) => Err(PaymentError::Conflict(id.to_string())),
                other => other,
            },
            other => other,
        }
    }

    async fn resend_once(&self, id: &TransactionId) -> Result<ResendReceipt> {
        let now = self.clock.now();
        let tx = self.require(id).await?;
        if tx.status != TransactionStatus::PendingOtp {
            return Err(PaymentError::InvalidState(tx.status));
        }
        if tx.is_expired(now) {
            self.store
                .compare_and_swap_status(
                    id,
                    TransactionStatus::PendingOtp,
                    TransactionStatus::Expired,
                    Box::new(move |t| t.touch(now)),
                )
                .await?;
            return Err(PaymentError::Expired);
        }

        let remaining = tx.remaining(now);
        if let Some(last) = tx.challenge.last_resend_at
            && now - last < self.config.resend_cooldown()
            && remaining > self.config.resend_grace()
        {
            return Ok(ResendReceipt {
                expires_in: remaining,
                is_existing: true,
            });
        }

        if tx.challenge.resend_count + 1 > self.config.max_resends {
            self.store
                .compare_and_swap_status(
                    id,
                    TransactionStatus::PendingOtp,
                    TransactionStatus::Failed,
                    Box::new(move |t| t.touch(now)),
                )
                .await?;
            warn!(transaction = %id, "resend limit reached, transaction failed");
            return Err(PaymentError::ResendLimitExceeded);
        }

        let issued = self.generator.issue(now, now + self.config.otp_ttl());
        let fresh = issued.challenge;
        let updated = self
            .store
            .compare_and_swap_status(
                id,
                TransactionStatus::PendingOtp,
                TransactionStatus::PendingOtp,
                Box::new(move |t| {
                    t.challenge.code_hash = fresh.code_hash;
                    t.challenge.salt = fresh.salt;
                    t.challenge.issued_at = fresh.issued_at;
                    t.challenge.expires_at = fresh.expires_at;
                    t.challenge.resend_count += 1;
                    t.challenge.last_resend_at = Some(now);
                    t.touch(now);
                }),
            )
            .await?;

        info!(
            transaction = %id,
            resend_count = updated.challenge.resend_count,
            "passcode re-issued"
        );
        let account = self.ledger.payer(&updated.payer).await?;
        self.dispatch(&account.email, &issued.code, updated.challenge.expires_at)
            .await;

        Ok(ResendReceipt {
            expires_in: self.config.otp_ttl(),
            is_existing: false,
        })
    }

    /// Checks a submitted passcode and, on a match, settles the payment.
    ///
    /// Settlement is exactly-once: the ledger mutation is idempotent per
    /// transaction id and the final status write is a compare-and-swap, so
    /// of two concurrent calls with the correct code exactly one succeeds.
    pub async fn verify(&self, id: &TransactionId, submitted_code: &str) -> Result<VerifyReceipt> {
        match self.verify_once(id, submitted_code).await {
            Err(PaymentError::Stale) => match self.verify_once(id, submitted_code).await {
                Err(PaymentError::Stale) => Err(PaymentError::Conflict(id.to_string())),
                other => other,
            },
            other => other,
        }
    }

    async fn verify_once(&self, id: &TransactionId, submitted_code: &str) -> Result<VerifyReceipt> {
        let now = self.clock.now();
        let tx = self.require(id).await?;
        if tx.status != TransactionStatus::PendingOtp {
            return Err(PaymentError::InvalidState(tx.status));
        }
        if tx.is_expired(now) {
            self.store
                .compare_and_swap_status(
                    id,
                    TransactionStatus::PendingOtp,
                    TransactionStatus::Expired,
                    Box::new(move |t| t.touch(now)),
                )
                .await?;
            info!(transaction = %id, "passcode expired");
            return Err(PaymentError::Expired);
        }

        let attempts = tx.challenge.attempts + 1;
        if attempts > self.config.max_attempts {
            self.retire(id, TransactionStatus::Failed, now).await?;
            return Err(PaymentError::AttemptsExceeded);
        }

        if !tx.challenge.verify_code(submitted_code) {
            if attempts >= self.config.max_attempts {
                self.store
                    .compare_and_swap_status(
                        id,
                        TransactionStatus::PendingOtp,
                        TransactionStatus::Failed,
                        Box::new(move |t| {
                            t.challenge.attempts += 1;
                            t.touch(now);
                        }),
                    )
                    .await?;
                warn!(transaction = %id, "attempt limit reached, transaction failed");
                return Err(PaymentError::AttemptsExceeded);
            }
            let updated = self
                .store
                .compare_and_swap_status(
                    id,
                    TransactionStatus::PendingOtp,
                    TransactionStatus::PendingOtp,
                    Box::new(move |t| {
                        t.challenge.attempts += 1;
                        t.touch(now);
                    }),
                )
                .await?;
            let remaining = self
                .config
                .max_attempts
                .saturating_sub(updated.challenge.attempts);
            return Err(PaymentError::InvalidCode { remaining });
        }

        match self
            .ledger
            .settle_once(id, &tx.payer, &tx.student, tx.amount)
            .await
        {
            Ok(Settlement::Applied) | Ok(Settlement::AlreadyApplied) => {
                match self
                    .store
                    .compare_and_swap_status(
                        id,
                        TransactionStatus::PendingOtp,
                        TransactionStatus::Verified,
                        Box::new(move |t| {
                            t.challenge.attempts += 1;
                            t.touch(now);
                        }),
                    )
                    .await
                {
                    Ok(_) => {
                        info!(
                            transaction = %id,
                            student = %tx.student,
                            amount = %tx.amount,
                            "payment settled"
                        );
                        Ok(VerifyReceipt {
                            transaction_id: *id,
                            settled_amount: tx.amount,
                        })
                    }
                    Err(PaymentError::Stale) => {
                        // The ledger side is already idempotent; decide who won.
                        let current = self.require(id).await?;
                        if current.status == TransactionStatus::Verified {
                            Err(PaymentError::InvalidState(current.status))
                        } else {
                            Err(PaymentError::Stale)
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            Err(refusal @ (PaymentError::InsufficientFunds(_) | PaymentError::AlreadySettled(_))) => {
                self.retire(id, TransactionStatus::Failed, now).await?;
                warn!(transaction = %id, reason = %refusal, "settlement refused, transaction failed");
                Err(refusal)
            }
            Err(e) => Err(e),
        }
    }

    /// Abandons a pending transaction.
    pub async fn cancel(&self, id: &TransactionId) -> Result<()> {
        let now = self.clock.now();
        let tx = self.require(id).await?;
        if tx.status != TransactionStatus::PendingOtp {
            return Err(PaymentError::InvalidState(tx.status));
        }
        self.store
            .compare_and_swap_status(
                id,
                TransactionStatus::PendingOtp,
                TransactionStatus::Cancelled,
                Box::new(move |t| t.touch(now)),
            )
            .await?;
        info!(transaction = %id, "transaction cancelled");
        Ok(())
    }

    /// Hygiene sweep: transitions every expired pending transaction to
    /// `EXPIRED`. Returns how many were swept. Expiry remains lazy — this is
    /// optional housekeeping, not a correctness requirement.
    pub async fn expire_stale(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut swept = 0;
        for tx in self.store.expired_pending(now).await? {
            match self
                .store
                .compare_and_swap_status(
                    &tx.id,
                    TransactionStatus::PendingOtp,
                    TransactionStatus::Expired,
                    Box::new(move |t| t.touch(now)),
                )
                .await
            {
                Ok(_) => swept += 1,
                Err(PaymentError::Stale) => {}
                Err(e) => return Err(e),
            }
        }
        if swept > 0 {
            info!(swept, "expired stale transactions");
        }
        Ok(swept)
    }

    async fn require(&self, id: &TransactionId) -> Result<Transaction> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(id.to_string()))
    }

    fn under_ceilings(&self, tx: &Transaction) -> bool {
        tx.challenge.attempts < self.config.max_attempts
            && tx.challenge.resend_count <= self.config.max_resends
    }

    /// Moves a pending transaction to a terminal state, tolerating a
    /// concurrent transition having done it first.
    async fn retire(
        &self,
        id: &TransactionId,
        to: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self
            .store
            .compare_and_swap_status(
                id,
                TransactionStatus::PendingOtp,
                to,
                Box::new(move |t| t.touch(now)),
            )
            .await
        {
            Ok(_) | Err(PaymentError::Stale) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn dispatch(&self, destination: &str, code: &str, expires_at: DateTime<Utc>) {
        if let Err(e) = self.notifier.send(destination, code, expires_at).await {
            warn!(error = %e, "passcode delivery failed; challenge remains valid");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{PayerAccount, StudentRecord};
    use crate::domain::money::Balance;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::{
        InMemoryLedger, InMemoryTransactionStore, MailboxNotifier,
    };
    use rust_decimal_macros::dec;

    fn engine() -> (TuitionEngine, MailboxNotifier, ManualClock) {
        let ledger = InMemoryLedger::new(
            vec![PayerAccount::new(
                PayerId::new("alice").unwrap(),
                "alice@example.com",
                Balance::new(dec!(20000000)),
            )],
            vec![StudentRecord::new(
                StudentId::new("20120129").unwrap(),
                "Nguyen Van A",
                Amount::new(dec!(12500000)).unwrap(),
            )],
        );
        let mailbox = MailboxNotifier::new();
        let clock = ManualClock::starting_at(Utc::now());
        let engine = TuitionEngine::new(
            Box::new(InMemoryTransactionStore::new()),
            Box::new(ledger),
            Box::new(mailbox.clone()),
            Box::new(clock.clone()),
            EngineConfig::default(),
        );
        (engine, mailbox, clock)
    }

    fn alice() -> PayerId {
        PayerId::new("alice").unwrap()
    }

    fn student() -> StudentId {
        StudentId::new("20120129").unwrap()
    }

    fn tuition() -> Amount {
        Amount::new(dec!(12500000)).unwrap()
    }

    #[tokio::test]
    async fn test_initiate_dispatches_a_code() {
        let (engine, mailbox, _clock) = engine();
        let receipt = engine.initiate(&alice(), &student(), tuition()).await.unwrap();

        assert!(!receipt.is_existing_transaction);
        assert_eq!(receipt.expires_in, Duration::seconds(300));
        let code = mailbox.last_code_for("alice@example.com").await.unwrap();
        assert_eq!(code.len(), 6);
    }

    #[tokio::test]
    async fn test_initiate_rejects_stale_amount() {
        let (engine, _mailbox, _clock) = engine();
        let result = engine
            .initiate(&alice(), &student(), Amount::new(dec!(1)).unwrap())
            .await;
        assert!(matches!(result, Err(PaymentError::AmountMismatch { .. })));
    }

    #[tokio::test]
    async fn test_repeat_initiate_reuses_transaction() {
        let (engine, mailbox, _clock) = engine();
        let first = engine.initiate(&alice(), &student(), tuition()).await.unwrap();
        let second = engine.initiate(&alice(), &student(), tuition()).await.unwrap();

        assert_eq!(first.transaction_id, second.transaction_id);
        assert!(second.is_existing_transaction);
        // No second code was issued.
        assert_eq!(mailbox.delivery_count().await, 1);
    }

    #[tokio::test]
    async fn test_wrong_code_counts_down_attempts() {
        let (engine, _mailbox, _clock) = engine();
        let receipt = engine.initiate(&alice(), &student(), tuition()).await.unwrap();

        let result = engine.verify(&receipt.transaction_id, "wrong!").await;
        assert!(matches!(
            result,
            Err(PaymentError::InvalidCode { remaining: 4 })
        ));
    }

    #[tokio::test]
    async fn test_correct_code_settles_once() {
        let (engine, mailbox, _clock) = engine();
        let receipt = engine.initiate(&alice(), &student(), tuition()).await.unwrap();
        let code = mailbox.last_code_for("alice@example.com").await.unwrap();

        let settled = engine.verify(&receipt.transaction_id, &code).await.unwrap();
        assert_eq!(settled.settled_amount, tuition());

        let replay = engine.verify(&receipt.transaction_id, &code).await;
        assert!(matches!(
            replay,
            Err(PaymentError::InvalidState(TransactionStatus::Verified))
        ));
    }
}
