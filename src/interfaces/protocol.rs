//! Transport-agnostic request/response shapes for the three client-facing
//! operations. Wire names are camelCase to match the payment wizard.

use crate::application::engine::{InitiateReceipt, ResendReceipt, VerifyReceipt};
use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub payer_id: String,
    pub student_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub transaction_id: String,
    pub is_existing_transaction: bool,
    /// Seconds left on the passcode window.
    pub expires_in: i64,
}

impl From<&InitiateReceipt> for InitiateResponse {
    fn from(receipt: &InitiateReceipt) -> Self {
        Self {
            transaction_id: receipt.transaction_id.to_string(),
            is_existing_transaction: receipt.is_existing_transaction,
            expires_in: receipt.expires_in.num_seconds(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    pub transaction_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendResponse {
    pub expires_in: i64,
    pub is_existing: bool,
}

impl From<&ResendReceipt> for ResendResponse {
    fn from(receipt: &ResendReceipt) -> Self {
        Self {
            expires_in: receipt.expires_in.num_seconds(),
            is_existing: receipt.is_existing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub transaction_id: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub status: VerifyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerifyResponse {
    pub fn from_result(result: &Result<VerifyReceipt, PaymentError>) -> Self {
        match result {
            Ok(_) => Self {
                status: VerifyStatus::Success,
                reason: None,
            },
            Err(e) => Self {
                status: VerifyStatus::Failed,
                reason: Some(e.to_string()),
            },
        }
    }
}
