use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use einvoice_core::TransactionId;
use einvoice_fiscal::{
    AccessKey, DocumentType, ElectronicReceipt, EmissionPoint, Environment, ReceiptStatus,
};
use einvoice_issuance::IssueOutcome;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub transaction_id: String,
    pub signature_password: String,
    /// Overrides the configured bound on each signer/authority call.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct IssueCreditNoteRequest {
    pub void_transaction_id: String,
    pub original_transaction_id: String,
    pub reason: String,
    pub signature_password: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub access_key: String,
    pub status: ReceiptStatus,
    pub message: Option<String>,
    pub authorization_date: Option<DateTime<Utc>>,
}

impl From<IssueOutcome> for OutcomeResponse {
    fn from(o: IssueOutcome) -> Self {
        Self {
            access_key: o.access_key.to_string(),
            status: o.status,
            message: o.message,
            authorization_date: o.authorization_date,
        }
    }
}

/// Receipt as listed over HTTP. The signed XML stays server-side.
#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub id: String,
    pub transaction_id: String,
    pub access_key: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub status: ReceiptStatus,
    pub message: Option<String>,
    pub authorization_date: Option<DateTime<Utc>>,
    pub environment: Environment,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ElectronicReceipt> for ReceiptResponse {
    fn from(r: ElectronicReceipt) -> Self {
        Self {
            id: r.id.to_string(),
            transaction_id: r.transaction_id.to_string(),
            document_number: r.access_key.document_number(),
            access_key: r.access_key.to_string(),
            document_type: r.document_type,
            status: r.status,
            message: r.message,
            authorization_date: r.authorization_date,
            environment: r.environment,
            email_sent: r.email_sent,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EmissionPointResponse {
    pub establishment_code: String,
    pub emission_point_code: String,
    pub document_type: DocumentType,
    pub current_sequence: u64,
    pub is_active: bool,
}

impl From<EmissionPoint> for EmissionPointResponse {
    fn from(p: EmissionPoint) -> Self {
        Self {
            establishment_code: p.establishment_code,
            emission_point_code: p.emission_point_code,
            document_type: p.document_type,
            current_sequence: p.current_sequence,
            is_active: p.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RideResponse {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub authorized: usize,
}

// -------------------------
// Path parsing
// -------------------------

pub fn parse_transaction_id(raw: &str, field: &str) -> Result<TransactionId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {field}"),
        )
    })
}

pub fn parse_access_key(raw: &str) -> Result<AccessKey, axum::response::Response> {
    AccessKey::parse(raw)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_access_key", e.to_string()))
}
