use chrono::Utc;
use rust_decimal_macros::dec;
use tuition_engine::application::engine::TuitionEngine;
use tuition_engine::config::EngineConfig;
use tuition_engine::domain::ledger::{PayerAccount, PayerId, StudentId, StudentRecord};
use tuition_engine::domain::money::{Amount, Balance};
use tuition_engine::infrastructure::clock::ManualClock;
use tuition_engine::infrastructure::in_memory::{
    InMemoryLedger, InMemoryTransactionStore, MailboxNotifier,
};

pub const ALICE_EMAIL: &str = "alice@example.com";
pub const BOB_EMAIL: &str = "bob@example.com";

pub fn alice() -> PayerId {
    PayerId::new("alice").unwrap()
}

pub fn bob() -> PayerId {
    PayerId::new("bob").unwrap()
}

pub fn student_a() -> StudentId {
    StudentId::new("20120129").unwrap()
}

pub fn student_b() -> StudentId {
    StudentId::new("20120130").unwrap()
}

pub fn tuition_a() -> Amount {
    Amount::new(dec!(12500000)).unwrap()
}

pub fn tuition_b() -> Amount {
    Amount::new(dec!(9800000)).unwrap()
}

/// Engine wired to shared in-memory collaborators, so tests can advance the
/// clock, read delivered codes and inspect ledger state behind its back.
pub struct Harness {
    pub engine: TuitionEngine,
    pub store: InMemoryTransactionStore,
    pub ledger: InMemoryLedger,
    pub mailbox: MailboxNotifier,
    pub clock: ManualClock,
}

impl Harness {
    pub async fn delivered_code(&self, email: &str) -> String {
        self.mailbox
            .last_code_for(email)
            .await
            .expect("no code delivered")
    }
}

pub fn harness() -> Harness {
    harness_with_config(EngineConfig::default())
}

pub fn harness_with_config(config: EngineConfig) -> Harness {
    let ledger = InMemoryLedger::new(
        vec![
            PayerAccount::new(alice(), ALICE_EMAIL, Balance::new(dec!(20000000))),
            PayerAccount::new(bob(), BOB_EMAIL, Balance::new(dec!(500000))),
        ],
        vec![
            StudentRecord::new(student_a(), "Nguyen Van A", tuition_a()),
            StudentRecord::new(student_b(), "Tran Thi B", tuition_b()),
        ],
    );
    let store = InMemoryTransactionStore::new();
    let mailbox = MailboxNotifier::new();
    let clock = ManualClock::starting_at(Utc::now());
    let engine = TuitionEngine::new(
        Box::new(store.clone()),
        Box::new(ledger.clone()),
        Box::new(mailbox.clone()),
        Box::new(clock.clone()),
        config,
    );
    Harness {
        engine,
        store,
        ledger,
        mailbox,
        clock,
    }
}

/// A numeric code guaranteed not to match `correct`.
pub fn wrong_code(correct: &str) -> String {
    correct
        .bytes()
        .map(|b| if b == b'9' { '0' } else { char::from(b + 1) })
        .collect()
}
