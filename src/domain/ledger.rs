use crate::domain::money::{Amount, Balance};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the account paying the bill.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayerId(String);

impl PayerId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(PaymentError::Validation(
                "payer id must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Student identifier: exactly 8 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaymentError::Validation(
                "student id must be exactly 8 digits".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The payer's side of the ledger: delivery address and spendable balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerAccount {
    pub id: PayerId,
    pub email: String,
    pub balance: Balance,
}

impl PayerAccount {
    pub fn new(id: PayerId, email: impl Into<String>, balance: Balance) -> Self {
        Self {
            id,
            email: email.into(),
            balance,
        }
    }

    /// Removes `amount` from the balance if it is covered.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        if self.balance.covers(amount) {
            self.balance -= amount.into();
            Ok(())
        } else {
            Err(PaymentError::InsufficientFunds(amount.value()))
        }
    }
}

/// The student's side of the ledger: the bill and its settlement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub full_name: String,
    pub tuition_amount: Amount,
    pub is_paid: bool,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub last_payment_amount: Option<Amount>,
}

impl StudentRecord {
    pub fn new(id: StudentId, full_name: impl Into<String>, tuition_amount: Amount) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            tuition_amount,
            is_paid: false,
            last_payment_date: None,
            last_payment_amount: None,
        }
    }

    /// Marks the bill paid and records the payment audit fields.
    pub fn settle(&mut self, amount: Amount, at: DateTime<Utc>) {
        self.is_paid = true;
        self.last_payment_date = Some(at);
        self.last_payment_amount = Some(amount);
    }
}
