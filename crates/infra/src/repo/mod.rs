//! Storage boundary of the issuance engine.
//!
//! One trait per record family. Implementations must provide:
//! - an atomic increment-and-return for emission point counters
//! - uniqueness of receipt access keys (`RepoError::Conflict` on duplicates)
//! - newest-first ordering for per-transaction receipt listings

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use einvoice_core::{EmissionPointId, IssuerId, TaxPayerId, TransactionId};
use einvoice_fiscal::{
    AccessKey, DocumentType, ElectronicReceipt, EmissionPoint, EmissionPointKey, Issuer,
    NewEmissionPoint, NewReceipt, ReceiptStatus, TaxPayer, Transaction, TransactionItem,
};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Repository error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait IssuerRepository: Send + Sync {
    /// The issuer documents are currently emitted for, if one is configured.
    async fn get_active(&self) -> RepoResult<Option<Issuer>>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn get_by_id(&self, id: TransactionId) -> RepoResult<Option<Transaction>>;

    /// Line items in entry order. Empty for unitemized transactions.
    async fn items_for(&self, id: TransactionId) -> RepoResult<Vec<TransactionItem>>;
}

#[async_trait]
pub trait TaxPayerRepository: Send + Sync {
    async fn get_by_id(&self, id: TaxPayerId) -> RepoResult<Option<TaxPayer>>;

    async fn get_by_identification(&self, identification: &str) -> RepoResult<Option<TaxPayer>>;

    /// Inserts `taxpayer`. If the identification is already registered the
    /// existing record is returned instead.
    async fn create(&self, taxpayer: TaxPayer) -> RepoResult<TaxPayer>;
}

#[async_trait]
pub trait EmissionPointRepository: Send + Sync {
    async fn get_by_key(&self, key: &EmissionPointKey) -> RepoResult<Option<EmissionPoint>>;

    /// Creates the counter for `new.key`, or returns the existing one when a
    /// concurrent caller got there first.
    async fn create(&self, new: NewEmissionPoint) -> RepoResult<EmissionPoint>;

    /// Atomically adds one to `current_sequence` and returns the row as written.
    async fn increment_sequence(&self, id: EmissionPointId) -> RepoResult<EmissionPoint>;

    async fn list_by_issuer(&self, issuer_id: IssuerId) -> RepoResult<Vec<EmissionPoint>>;
}

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Persists a new `PENDIENTE` receipt. Duplicate access keys are a `Conflict`.
    async fn create(&self, new: NewReceipt) -> RepoResult<ElectronicReceipt>;

    async fn update_status(
        &self,
        access_key: &AccessKey,
        status: ReceiptStatus,
        message: Option<&str>,
        authorization_date: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;

    async fn update_email_sent(&self, access_key: &AccessKey, sent: bool) -> RepoResult<()>;

    async fn get_by_access_key(&self, access_key: &AccessKey)
    -> RepoResult<Option<ElectronicReceipt>>;

    /// Most recent receipt of `document_type` for a transaction.
    async fn latest_for_transaction(
        &self,
        transaction_id: TransactionId,
        document_type: DocumentType,
    ) -> RepoResult<Option<ElectronicReceipt>>;

    /// Every receipt of a transaction, newest first.
    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> RepoResult<Vec<ElectronicReceipt>>;

    /// Non-terminal receipts, oldest first. `created_after` narrows the sweep.
    async fn find_pending(
        &self,
        created_after: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<ElectronicReceipt>>;
}
