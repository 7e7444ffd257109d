use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Initiate,
    Resend,
    Verify,
    Cancel,
}

/// One scripted operation against the engine. `amount` is required for
/// `initiate`; `code` is required for `verify` (the sentinel `auto` means
/// "whatever code the mailbox last delivered to this payer").
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Op {
    pub op: OpKind,
    pub payer: String,
    pub student: String,
    pub amount: Option<Decimal>,
    pub code: Option<String>,
}

/// Reads scripted operations from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<Op>`. It handles whitespace trimming and flexible record lengths
/// automatically.
pub struct OpReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OpReader<R> {
    /// Creates a new `OpReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes operations.
    pub fn ops(self) -> impl Iterator<Item = Result<Op>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
