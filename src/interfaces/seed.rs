//! TOML seed file for the CLI driver: the payers and students the in-memory
//! ledger starts with.

use crate::domain::ledger::{PayerAccount, PayerId, StudentId, StudentRecord};
use crate::domain::money::{Amount, Balance};
use crate::error::{PaymentError, Result};
use crate::infrastructure::in_memory::InMemoryLedger;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub payers: Vec<PayerSeed>,
    #[serde(default)]
    pub students: Vec<StudentSeed>,
}

#[derive(Debug, Deserialize)]
pub struct PayerSeed {
    pub id: String,
    pub email: String,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct StudentSeed {
    pub id: String,
    pub name: String,
    pub tuition: Decimal,
}

impl SeedFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| PaymentError::Config(e.to_string()))
    }

    /// Validates every entry and builds the ledger collaborator.
    pub fn into_ledger(self) -> Result<InMemoryLedger> {
        let payers = self
            .payers
            .into_iter()
            .map(|p| {
                Ok(PayerAccount::new(
                    PayerId::new(p.id)?,
                    p.email,
                    Balance::new(p.balance),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let students = self
            .students
            .into_iter()
            .map(|s| {
                Ok(StudentRecord::new(
                    StudentId::new(s.id)?,
                    s.name,
                    Amount::new(s.tuition)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(InMemoryLedger::new(payers, students))
    }
}
