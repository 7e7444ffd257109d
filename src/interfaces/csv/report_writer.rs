use crate::domain::ledger::{PayerAccount, StudentRecord};
use crate::domain::transaction::Transaction;
use crate::error::Result;
use std::io::Write;

/// Writes the end-of-run state as three CSV tables: payer balances, student
/// paid-flags, transaction outcomes.
pub struct ReportWriter<W: Write> {
    writer: W,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_report(
        mut self,
        payers: &[PayerAccount],
        students: &[StudentRecord],
        transactions: &[Transaction],
    ) -> Result<()> {
        {
            let mut csv = csv::Writer::from_writer(&mut self.writer);
            csv.write_record(["payer", "balance"])?;
            for payer in payers {
                csv.write_record([payer.id.as_str(), &payer.balance.to_string()])?;
            }
            csv.flush()?;
        }
        writeln!(self.writer)?;
        {
            let mut csv = csv::Writer::from_writer(&mut self.writer);
            csv.write_record(["student", "paid", "last_payment_amount"])?;
            for student in students {
                let last = student
                    .last_payment_amount
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                csv.write_record([
                    student.id.as_str(),
                    &student.is_paid.to_string(),
                    &last,
                ])?;
            }
            csv.flush()?;
        }
        writeln!(self.writer)?;
        {
            let mut csv = csv::Writer::from_writer(&mut self.writer);
            csv.write_record(["transaction", "payer", "student", "amount", "status"])?;
            for tx in transactions {
                csv.write_record([
                    &tx.id.to_string(),
                    tx.payer.as_str(),
                    tx.student.as_str(),
                    &tx.amount.to_string(),
                    &tx.status.to_string(),
                ])?;
            }
            csv.flush()?;
        }
        Ok(())
    }
}
