//! In-memory repositories for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use einvoice_core::{EmissionPointId, Entity, IssuerId, TaxPayerId, TransactionId};
use einvoice_fiscal::{
    AccessKey, DocumentType, ElectronicReceipt, EmissionPoint, EmissionPointKey, Issuer,
    NewEmissionPoint, NewReceipt, ReceiptStatus, TaxPayer, Transaction, TransactionItem,
};

use super::{
    EmissionPointRepository, IssuerRepository, ReceiptRepository, RepoError, RepoResult,
    TaxPayerRepository, TransactionRepository,
};

/// Every repository behind one set of locks.
///
/// Receipts are kept in insertion order so "newest" is well defined even when
/// two rows share a timestamp.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    issuers: RwLock<Vec<Issuer>>,
    transactions: RwLock<HashMap<TransactionId, Transaction>>,
    items: RwLock<HashMap<TransactionId, Vec<TransactionItem>>>,
    taxpayers: RwLock<HashMap<TaxPayerId, TaxPayer>>,
    emission_points: RwLock<HashMap<EmissionPointId, EmissionPoint>>,
    receipts: RwLock<Vec<ElectronicReceipt>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers an issuer. Activating one deactivates the others.
    pub fn insert_issuer(&self, issuer: Issuer) -> RepoResult<()> {
        let mut issuers = write(&self.issuers)?;
        if issuer.is_active {
            for other in issuers.iter_mut() {
                other.is_active = false;
            }
        }
        issuers.retain(|i| i.id != issuer.id);
        issuers.push(issuer);
        Ok(())
    }

    pub fn insert_transaction(
        &self,
        transaction: Transaction,
        items: Vec<TransactionItem>,
    ) -> RepoResult<()> {
        let id = transaction.id();
        write(&self.transactions)?.insert(id, transaction);
        write(&self.items)?.insert(id, items);
        Ok(())
    }

    pub fn insert_taxpayer(&self, taxpayer: TaxPayer) -> RepoResult<()> {
        write(&self.taxpayers)?.insert(taxpayer.id(), taxpayer);
        Ok(())
    }

    /// Seeds a counter, e.g. one migrated from a previous system.
    pub fn insert_emission_point(&self, point: EmissionPoint) -> RepoResult<()> {
        write(&self.emission_points)?.insert(point.id(), point);
        Ok(())
    }

    /// Stores a receipt as-is, bypassing the `PENDIENTE` start state.
    pub fn insert_receipt(&self, receipt: ElectronicReceipt) -> RepoResult<()> {
        let mut receipts = write(&self.receipts)?;
        if receipts.iter().any(|r| r.access_key == receipt.access_key) {
            return Err(RepoError::Conflict(format!(
                "access key {} already exists",
                receipt.access_key
            )));
        }
        receipts.push(receipt);
        Ok(())
    }

    pub fn receipt_count(&self) -> RepoResult<usize> {
        Ok(read(&self.receipts)?.len())
    }

    pub fn taxpayer_count(&self) -> RepoResult<usize> {
        Ok(read(&self.taxpayers)?.len())
    }
}

#[async_trait]
impl IssuerRepository for InMemoryStore {
    async fn get_active(&self) -> RepoResult<Option<Issuer>> {
        Ok(read(&self.issuers)?.iter().find(|i| i.is_active).cloned())
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn get_by_id(&self, id: TransactionId) -> RepoResult<Option<Transaction>> {
        Ok(read(&self.transactions)?.get(&id).cloned())
    }

    async fn items_for(&self, id: TransactionId) -> RepoResult<Vec<TransactionItem>> {
        Ok(read(&self.items)?.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl TaxPayerRepository for InMemoryStore {
    async fn get_by_id(&self, id: TaxPayerId) -> RepoResult<Option<TaxPayer>> {
        Ok(read(&self.taxpayers)?.get(&id).cloned())
    }

    async fn get_by_identification(&self, identification: &str) -> RepoResult<Option<TaxPayer>> {
        Ok(read(&self.taxpayers)?
            .values()
            .find(|t| t.identification == identification)
            .cloned())
    }

    async fn create(&self, taxpayer: TaxPayer) -> RepoResult<TaxPayer> {
        let mut taxpayers = write(&self.taxpayers)?;
        if let Some(existing) = taxpayers
            .values()
            .find(|t| t.identification == taxpayer.identification)
        {
            return Ok(existing.clone());
        }
        taxpayers.insert(taxpayer.id(), taxpayer.clone());
        Ok(taxpayer)
    }
}

#[async_trait]
impl EmissionPointRepository for InMemoryStore {
    async fn get_by_key(&self, key: &EmissionPointKey) -> RepoResult<Option<EmissionPoint>> {
        Ok(read(&self.emission_points)?
            .values()
            .find(|p| &p.key() == key)
            .cloned())
    }

    async fn create(&self, new: NewEmissionPoint) -> RepoResult<EmissionPoint> {
        let mut points = write(&self.emission_points)?;
        if let Some(existing) = points.values().find(|p| p.key() == new.key) {
            return Ok(existing.clone());
        }
        let point = new.into_emission_point();
        points.insert(point.id(), point.clone());
        Ok(point)
    }

    async fn increment_sequence(&self, id: EmissionPointId) -> RepoResult<EmissionPoint> {
        let mut points = write(&self.emission_points)?;
        let point = points
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound(format!("emission point {id}")))?;
        if point.current_sequence >= einvoice_fiscal::Sequential::MAX {
            return Err(RepoError::Conflict(format!(
                "emission point {id} exhausted its sequence range"
            )));
        }
        point.current_sequence += 1;
        Ok(point.clone())
    }

    async fn list_by_issuer(&self, issuer_id: IssuerId) -> RepoResult<Vec<EmissionPoint>> {
        let mut points: Vec<EmissionPoint> = read(&self.emission_points)?
            .values()
            .filter(|p| p.issuer_id == issuer_id)
            .cloned()
            .collect();
        points.sort_by(|a, b| {
            (&a.establishment_code, &a.emission_point_code, a.document_type.code()).cmp(&(
                &b.establishment_code,
                &b.emission_point_code,
                b.document_type.code(),
            ))
        });
        Ok(points)
    }
}

#[async_trait]
impl ReceiptRepository for InMemoryStore {
    async fn create(&self, new: NewReceipt) -> RepoResult<ElectronicReceipt> {
        let receipt = new.into_receipt(Utc::now());
        self.insert_receipt(receipt.clone())?;
        Ok(receipt)
    }

    async fn update_status(
        &self,
        access_key: &AccessKey,
        status: ReceiptStatus,
        message: Option<&str>,
        authorization_date: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let mut receipts = write(&self.receipts)?;
        let receipt = find_mut(&mut receipts, access_key)?;
        receipt.status = status;
        receipt.message = message.map(str::to_string);
        if authorization_date.is_some() {
            receipt.authorization_date = authorization_date;
        }
        receipt.updated_at = Utc::now();
        Ok(())
    }

    async fn update_email_sent(&self, access_key: &AccessKey, sent: bool) -> RepoResult<()> {
        let mut receipts = write(&self.receipts)?;
        let receipt = find_mut(&mut receipts, access_key)?;
        receipt.email_sent = sent;
        receipt.updated_at = Utc::now();
        Ok(())
    }

    async fn get_by_access_key(
        &self,
        access_key: &AccessKey,
    ) -> RepoResult<Option<ElectronicReceipt>> {
        Ok(read(&self.receipts)?
            .iter()
            .find(|r| &r.access_key == access_key)
            .cloned())
    }

    async fn latest_for_transaction(
        &self,
        transaction_id: TransactionId,
        document_type: DocumentType,
    ) -> RepoResult<Option<ElectronicReceipt>> {
        Ok(read(&self.receipts)?
            .iter()
            .rev()
            .find(|r| r.transaction_id == transaction_id && r.document_type == document_type)
            .cloned())
    }

    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> RepoResult<Vec<ElectronicReceipt>> {
        Ok(read(&self.receipts)?
            .iter()
            .rev()
            .filter(|r| r.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn find_pending(
        &self,
        created_after: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<ElectronicReceipt>> {
        Ok(read(&self.receipts)?
            .iter()
            .filter(|r| !r.status.is_terminal())
            .filter(|r| created_after.is_none_or(|after| r.created_at >= after))
            .cloned()
            .collect())
    }
}

fn find_mut<'a>(
    receipts: &'a mut [ElectronicReceipt],
    access_key: &AccessKey,
) -> RepoResult<&'a mut ElectronicReceipt> {
    receipts
        .iter_mut()
        .find(|r| &r.access_key == access_key)
        .ok_or_else(|| RepoError::NotFound(format!("receipt {access_key}")))
}

fn read<T>(lock: &RwLock<T>) -> RepoResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| RepoError::Storage("in-memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> RepoResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| RepoError::Storage("in-memory store lock poisoned".into()))
}
