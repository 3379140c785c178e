//! Records the engine reads and writes through its repositories.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use einvoice_core::{
    DomainResult, EmissionPointId, Entity, IssuerId, ReceiptId, TaxPayerId, TransactionId,
};

use crate::access_key::{AccessKey, Sequential};
use crate::codes::{DocumentType, Environment, TaxRate};
use crate::status::ReceiptStatus;

/// The business entity issuing documents. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issuer {
    pub id: IssuerId,
    pub ruc: String,
    pub business_name: String,
    pub trade_name: Option<String>,
    pub main_address: String,
    pub establishment_address: String,
    pub establishment_code: String,
    pub emission_point_code: String,
    pub environment: Environment,
    pub keep_accounting: bool,
    /// Path to the PKCS#12 certificate handed to the signer.
    pub signature_path: String,
    pub is_active: bool,
}

impl Entity for Issuer {
    type Id = IssuerId;

    fn id(&self) -> IssuerId {
        self.id
    }
}

/// Counterparty (buyer) of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxPayer {
    pub id: TaxPayerId,
    pub identification: String,
    /// Authority catalogue code: `04` RUC, `05` cédula, `06` passport, `07` final consumer.
    pub identification_type: String,
    pub name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl TaxPayer {
    pub const FINAL_CONSUMER_IDENTIFICATION: &'static str = "9999999999999";
    pub const FINAL_CONSUMER_NAME: &'static str = "CONSUMIDOR FINAL";
    pub const FINAL_CONSUMER_TYPE: &'static str = "07";

    /// A fresh generic buyer record. Stores keep one and reuse it.
    pub fn final_consumer() -> Self {
        Self {
            id: TaxPayerId::new(),
            identification: Self::FINAL_CONSUMER_IDENTIFICATION.to_string(),
            identification_type: Self::FINAL_CONSUMER_TYPE.to_string(),
            name: Self::FINAL_CONSUMER_NAME.to_string(),
            email: None,
            address: None,
            phone: None,
        }
    }

    pub fn is_final_consumer(&self) -> bool {
        self.identification == Self::FINAL_CONSUMER_IDENTIFICATION
    }

    /// A non-blank email, if any.
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

impl Entity for TaxPayer {
    type Id = TaxPayerId;

    fn id(&self) -> TaxPayerId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Outcome,
}

/// Ledger transaction a document is issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub description: String,
    pub date: NaiveDate,
    /// Grand total, taxes included.
    pub amount: Decimal,
    pub subtotal_15: Decimal,
    pub subtotal_0: Decimal,
    pub tax_amount: Decimal,
    pub taxpayer_id: Option<TaxPayerId>,
    /// Set on the reversing transaction of a void.
    pub voids_transaction_id: Option<TransactionId>,
}

impl Transaction {
    pub fn subtotal(&self) -> Decimal {
        self.subtotal_15 + self.subtotal_0
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> TransactionId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionItem {
    pub transaction_id: TransactionId,
    pub code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Line total before tax.
    pub subtotal: Decimal,
    pub tax_rate: TaxRate,
}

/// Lookup key of a sequence counter. Document type is part of the key so
/// invoices and credit notes never share a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmissionPointKey {
    pub issuer_id: IssuerId,
    pub establishment: String,
    pub point: String,
    pub document_type: DocumentType,
}

impl EmissionPointKey {
    pub fn for_issuer(issuer: &Issuer, document_type: DocumentType) -> Self {
        Self {
            issuer_id: issuer.id,
            establishment: issuer.establishment_code.clone(),
            point: issuer.emission_point_code.clone(),
            document_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionPoint {
    pub id: EmissionPointId,
    pub issuer_id: IssuerId,
    pub establishment_code: String,
    pub emission_point_code: String,
    pub document_type: DocumentType,
    /// Last number handed out.
    pub current_sequence: u64,
    /// Historical floor when migrating from another system.
    pub initial_sequence: u64,
    pub is_active: bool,
}

impl EmissionPoint {
    pub fn key(&self) -> EmissionPointKey {
        EmissionPointKey {
            issuer_id: self.issuer_id,
            establishment: self.establishment_code.clone(),
            point: self.emission_point_code.clone(),
            document_type: self.document_type,
        }
    }

    /// The last issued number as a legal sequential.
    pub fn current(&self) -> DomainResult<Sequential> {
        Sequential::new(self.current_sequence)
    }
}

impl Entity for EmissionPoint {
    type Id = EmissionPointId;

    fn id(&self) -> EmissionPointId {
        self.id
    }
}

/// Creation request for a counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmissionPoint {
    pub key: EmissionPointKey,
    pub initial_sequence: u64,
}

impl NewEmissionPoint {
    /// Lazily created counters start from scratch.
    pub fn fresh(key: EmissionPointKey) -> Self {
        Self {
            key,
            initial_sequence: 1,
        }
    }

    /// Counter continuing a legacy numbering: the next reservation yields
    /// `next_sequence`.
    pub fn migrated(key: EmissionPointKey, next_sequence: u64) -> Self {
        Self {
            key,
            initial_sequence: next_sequence,
        }
    }

    /// `current_sequence` a new row starts with.
    pub fn seeded_current(&self) -> u64 {
        self.initial_sequence.saturating_sub(1)
    }

    pub fn into_emission_point(self) -> EmissionPoint {
        let current_sequence = self.seeded_current();
        EmissionPoint {
            id: EmissionPointId::new(),
            issuer_id: self.key.issuer_id,
            establishment_code: self.key.establishment,
            emission_point_code: self.key.point,
            document_type: self.key.document_type,
            current_sequence,
            initial_sequence: self.initial_sequence,
            is_active: true,
        }
    }
}

/// One submission attempt of one document, keyed by access key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectronicReceipt {
    pub id: ReceiptId,
    pub transaction_id: TransactionId,
    pub issuer_id: IssuerId,
    pub taxpayer_id: TaxPayerId,
    pub access_key: AccessKey,
    pub document_type: DocumentType,
    /// Signed XML exactly as submitted.
    pub xml_content: String,
    pub status: ReceiptStatus,
    pub message: Option<String>,
    pub authorization_date: Option<DateTime<Utc>>,
    pub environment: Environment,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for ElectronicReceipt {
    type Id = ReceiptId;

    fn id(&self) -> ReceiptId {
        self.id
    }
}

/// A receipt about to be persisted. Always starts `PENDIENTE`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReceipt {
    pub transaction_id: TransactionId,
    pub issuer_id: IssuerId,
    pub taxpayer_id: TaxPayerId,
    pub access_key: AccessKey,
    pub document_type: DocumentType,
    pub xml_content: String,
    pub environment: Environment,
}

impl NewReceipt {
    pub fn into_receipt(self, now: DateTime<Utc>) -> ElectronicReceipt {
        ElectronicReceipt {
            id: ReceiptId::new(),
            transaction_id: self.transaction_id,
            issuer_id: self.issuer_id,
            taxpayer_id: self.taxpayer_id,
            access_key: self.access_key,
            document_type: self.document_type,
            xml_content: self.xml_content,
            status: ReceiptStatus::Pendiente,
            message: None,
            authorization_date: None,
            environment: self.environment,
            email_sent: false,
            created_at: now,
            updated_at: now,
        }
    }
}
