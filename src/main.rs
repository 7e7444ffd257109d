use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tuition_engine::application::engine::TuitionEngine;
use tuition_engine::config::EngineConfig;
use tuition_engine::domain::ledger::{PayerId, StudentId};
use tuition_engine::domain::money::Amount;
use tuition_engine::domain::ports::{Ledger, TransactionStoreBox};
use tuition_engine::domain::transaction::TransactionId;
use tuition_engine::error::PaymentError;
use tuition_engine::infrastructure::clock::SystemClock;
use tuition_engine::infrastructure::in_memory::{InMemoryTransactionStore, MailboxNotifier};
use tuition_engine::interfaces::csv::op_reader::{Op, OpKind, OpReader};
use tuition_engine::interfaces::csv::report_writer::ReportWriter;
use tuition_engine::interfaces::protocol::{InitiateResponse, ResendResponse, VerifyResponse};
use tuition_engine::interfaces::seed::SeedFile;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Operation script CSV (initiate/resend/verify/cancel rows)
    script: PathBuf,

    /// Ledger seed file (TOML with payers and students)
    #[arg(long)]
    seed: PathBuf,

    /// Engine configuration file (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent transaction store (requires the storage-rocksdb
    /// feature). If provided, uses RocksDB instead of memory.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };

    let ledger = SeedFile::load(&cli.seed)
        .and_then(SeedFile::into_ledger)
        .into_diagnostic()?;
    let mailbox = MailboxNotifier::new();

    let (engine_store, report_store) = open_stores(&cli)?;
    let engine = TuitionEngine::new(
        engine_store,
        Box::new(ledger.clone()),
        Box::new(mailbox.clone()),
        Box::new(SystemClock),
        config,
    );

    // Transaction ids live server-side; the script addresses them by pair.
    let mut sessions: HashMap<(PayerId, StudentId), TransactionId> = HashMap::new();

    let file = File::open(&cli.script).into_diagnostic()?;
    let reader = OpReader::new(file);
    for op_result in reader.ops() {
        match op_result {
            Ok(op) => {
                if let Err(e) = run_op(&engine, &ledger, &mailbox, &mut sessions, op).await {
                    warn!(error = %e, "operation failed");
                }
            }
            Err(e) => warn!(error = %e, "skipping malformed row"),
        }
    }

    let transactions = report_store.all().await.into_diagnostic()?;
    let (payers, students) = ledger.snapshot().await;

    let stdout = io::stdout();
    ReportWriter::new(stdout.lock())
        .write_report(&payers, &students, &transactions)
        .into_diagnostic()?;

    Ok(())
}

fn open_stores(cli: &Cli) -> Result<(TransactionStoreBox, TransactionStoreBox)> {
    match &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            let store = tuition_engine::infrastructure::rocksdb::RocksDbTransactionStore::open(
                db_path,
            )
            .into_diagnostic()?;
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => miette::bail!("--db-path requires the storage-rocksdb feature"),
        None => {
            let store = InMemoryTransactionStore::new();
            Ok((Box::new(store.clone()), Box::new(store)))
        }
    }
}

async fn run_op(
    engine: &TuitionEngine,
    ledger: &impl Ledger,
    mailbox: &MailboxNotifier,
    sessions: &mut HashMap<(PayerId, StudentId), TransactionId>,
    op: Op,
) -> tuition_engine::error::Result<()> {
    let payer = PayerId::new(op.payer.clone())?;
    let student = StudentId::new(op.student.clone())?;

    match op.op {
        OpKind::Initiate => {
            let amount = op
                .amount
                .ok_or_else(|| PaymentError::Validation("initiate requires an amount".into()))?;
            let receipt = engine.initiate(&payer, &student, Amount::new(amount)?).await?;
            sessions.insert((payer, student), receipt.transaction_id);
            let response = serde_json::to_string(&InitiateResponse::from(&receipt))?;
            info!(%response, "initiate");
        }
        OpKind::Resend => {
            let id = session_id(sessions, &payer, &student)?;
            let receipt = engine.resend(&id).await?;
            let response = serde_json::to_string(&ResendResponse::from(&receipt))?;
            info!(%response, "resend");
        }
        OpKind::Verify => {
            let id = session_id(sessions, &payer, &student)?;
            let code = op
                .code
                .ok_or_else(|| PaymentError::Validation("verify requires a code".into()))?;
            let code = if code == "auto" {
                let account = ledger.payer(&payer).await?;
                mailbox.last_code_for(&account.email).await.ok_or_else(|| {
                    PaymentError::Validation(format!("no code delivered to {}", account.email))
                })?
            } else {
                code
            };
            let result = engine.verify(&id, &code).await;
            let response = serde_json::to_string(&VerifyResponse::from_result(&result))?;
            info!(%response, "verify");
            result?;
        }
        OpKind::Cancel => {
            let id = session_id(sessions, &payer, &student)?;
            engine.cancel(&id).await?;
            info!(transaction = %id, "cancel");
        }
    }
    Ok(())
}

fn session_id(
    sessions: &HashMap<(PayerId, StudentId), TransactionId>,
    payer: &PayerId,
    student: &StudentId,
) -> tuition_engine::error::Result<TransactionId> {
    sessions
        .get(&(payer.clone(), student.clone()))
        .copied()
        .ok_or_else(|| {
            PaymentError::Validation(format!("no transaction initiated for {payer}/{student}"))
        })
}
