//! Postgres-backed repositories.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | RepoError | Scenario |
//! |------------|-----------------|-----------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | duplicate access key or identification |
//! | Database (check violation) | `23514` | `Conflict` | counter past `999999999`, malformed code |
//! | Database (other) | any other | `Storage` | FK violations, syntax, permissions |
//! | RowNotFound | N/A | `NotFound` | `fetch_one` on a missing row |
//! | Other | N/A | `Storage` | pool closed, network, decode failures |
//!
//! ## Counter atomicity
//!
//! `increment_sequence` is a single `UPDATE ... RETURNING` statement; Postgres
//! row locking serializes concurrent increments across processes, so no
//! application-level lock exists or is needed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::instrument;
use uuid::Uuid;

use einvoice_core::{EmissionPointId, IssuerId, ReceiptId, TaxPayerId, TransactionId};
use einvoice_fiscal::{
    AccessKey, DocumentType, ElectronicReceipt, EmissionPoint, EmissionPointKey, Environment,
    Issuer, NewEmissionPoint, NewReceipt, ReceiptStatus, TaxPayer, TaxRate, Transaction,
    TransactionItem, TransactionKind,
};

use super::{
    EmissionPointRepository, IssuerRepository, ReceiptRepository, RepoError, RepoResult,
    TaxPayerRepository, TransactionRepository,
};

const SCHEMA: &str = include_str!("../../migrations/0001_einvoice.sql");

const RECEIPT_COLUMNS: &str = "id, transaction_id, issuer_id, tax_payer_id, access_key, \
     receipt_type, xml_content, sri_status, sri_message, authorization_date, environment, \
     email_sent, created_at, updated_at";

const EMISSION_POINT_COLUMNS: &str = "id, issuer_id, establishment_code, emission_point_code, \
     receipt_type, current_sequence, initial_sequence, is_active";

/// All repositories over one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> RepoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema. Every statement is `IF NOT EXISTS`.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> RepoResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl IssuerRepository for PostgresStore {
    #[instrument(skip(self), err)]
    async fn get_active(&self) -> RepoResult<Option<Issuer>> {
        let row = sqlx::query(
            r#"
            SELECT id, ruc, business_name, trade_name, main_address, establishment_address,
                   establishment_code, emission_point_code, environment, keep_accounting,
                   signature_path, is_active
            FROM issuers
            WHERE is_active
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_active_issuer", e))?;

        row.map(|r| issuer_from_row(&r)).transpose()
    }
}

#[async_trait]
impl TransactionRepository for PostgresStore {
    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn get_by_id(&self, id: TransactionId) -> RepoResult<Option<Transaction>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, description, transaction_date, amount, subtotal_15, subtotal_0,
                   tax_amount, tax_payer_id, voids_transaction_id
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_transaction", e))?;

        row.map(|r| transaction_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn items_for(&self, id: TransactionId) -> RepoResult<Vec<TransactionItem>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, code, description, quantity, unit_price, subtotal, tax_rate
            FROM transaction_items
            WHERE transaction_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("items_for", e))?;

        rows.iter().map(item_from_row).collect()
    }
}

#[async_trait]
impl TaxPayerRepository for PostgresStore {
    #[instrument(skip(self), fields(taxpayer_id = %id), err)]
    async fn get_by_id(&self, id: TaxPayerId) -> RepoResult<Option<TaxPayer>> {
        let row = sqlx::query(
            "SELECT id, identification, identification_type, name, email, address, phone \
             FROM tax_payers WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_taxpayer", e))?;

        row.map(|r| taxpayer_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_by_identification(&self, identification: &str) -> RepoResult<Option<TaxPayer>> {
        let row = sqlx::query(
            "SELECT id, identification, identification_type, name, email, address, phone \
             FROM tax_payers WHERE identification = $1",
        )
        .bind(identification)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_taxpayer_by_identification", e))?;

        row.map(|r| taxpayer_from_row(&r)).transpose()
    }

    #[instrument(skip(self, taxpayer), fields(identification = %taxpayer.identification), err)]
    async fn create(&self, taxpayer: TaxPayer) -> RepoResult<TaxPayer> {
        sqlx::query(
            r#"
            INSERT INTO tax_payers (id, identification, identification_type, name, email, address, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (identification) DO NOTHING
            "#,
        )
        .bind(Uuid::from(taxpayer.id))
        .bind(&taxpayer.identification)
        .bind(&taxpayer.identification_type)
        .bind(&taxpayer.name)
        .bind(&taxpayer.email)
        .bind(&taxpayer.address)
        .bind(&taxpayer.phone)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_taxpayer", e))?;

        self.get_by_identification(&taxpayer.identification)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("taxpayer {}", taxpayer.identification)))
    }
}

#[async_trait]
impl EmissionPointRepository for PostgresStore {
    #[instrument(skip(self), fields(document_type = %key.document_type), err)]
    async fn get_by_key(&self, key: &EmissionPointKey) -> RepoResult<Option<EmissionPoint>> {
        let row = sqlx::query(&format!(
            "SELECT {EMISSION_POINT_COLUMNS} FROM emission_points \
             WHERE issuer_id = $1 AND establishment_code = $2 \
               AND emission_point_code = $3 AND receipt_type = $4"
        ))
        .bind(Uuid::from(key.issuer_id))
        .bind(&key.establishment)
        .bind(&key.point)
        .bind(key.document_type.code())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_emission_point", e))?;

        row.map(|r| emission_point_from_row(&r)).transpose()
    }

    #[instrument(skip(self, new), fields(document_type = %new.key.document_type), err)]
    async fn create(&self, new: NewEmissionPoint) -> RepoResult<EmissionPoint> {
        let key = new.key.clone();
        let point = new.into_emission_point();
        sqlx::query(
            r#"
            INSERT INTO emission_points (
                id, issuer_id, establishment_code, emission_point_code, receipt_type,
                current_sequence, initial_sequence, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (issuer_id, establishment_code, emission_point_code, receipt_type)
            DO NOTHING
            "#,
        )
        .bind(Uuid::from(point.id))
        .bind(Uuid::from(point.issuer_id))
        .bind(&point.establishment_code)
        .bind(&point.emission_point_code)
        .bind(point.document_type.code())
        .bind(to_i64(point.current_sequence)?)
        .bind(to_i64(point.initial_sequence)?)
        .bind(point.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_emission_point", e))?;

        // Whoever won the insert race, everybody converges on the stored row.
        self.get_by_key(&key)
            .await?
            .ok_or_else(|| RepoError::NotFound("emission point vanished after insert".into()))
    }

    #[instrument(skip(self), fields(emission_point_id = %id), err)]
    async fn increment_sequence(&self, id: EmissionPointId) -> RepoResult<EmissionPoint> {
        let row = sqlx::query(&format!(
            "UPDATE emission_points \
             SET current_sequence = current_sequence + 1, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {EMISSION_POINT_COLUMNS}"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_sequence", e))?
        .ok_or_else(|| RepoError::NotFound(format!("emission point {id}")))?;

        emission_point_from_row(&row)
    }

    #[instrument(skip(self), fields(issuer_id = %issuer_id), err)]
    async fn list_by_issuer(&self, issuer_id: IssuerId) -> RepoResult<Vec<EmissionPoint>> {
        let rows = sqlx::query(&format!(
            "SELECT {EMISSION_POINT_COLUMNS} FROM emission_points WHERE issuer_id = $1 \
             ORDER BY establishment_code, emission_point_code, receipt_type"
        ))
        .bind(Uuid::from(issuer_id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_emission_points", e))?;

        rows.iter().map(emission_point_from_row).collect()
    }
}

#[async_trait]
impl ReceiptRepository for PostgresStore {
    #[instrument(skip(self, new), fields(access_key = %new.access_key), err)]
    async fn create(&self, new: NewReceipt) -> RepoResult<ElectronicReceipt> {
        let receipt = new.into_receipt(Utc::now());
        sqlx::query(&format!(
            "INSERT INTO electronic_receipts ({RECEIPT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(Uuid::from(receipt.id))
        .bind(Uuid::from(receipt.transaction_id))
        .bind(Uuid::from(receipt.issuer_id))
        .bind(Uuid::from(receipt.taxpayer_id))
        .bind(receipt.access_key.as_str())
        .bind(receipt.document_type.code())
        .bind(&receipt.xml_content)
        .bind(receipt.status.as_str())
        .bind(&receipt.message)
        .bind(receipt.authorization_date)
        .bind(i16::from(receipt.environment.code()))
        .bind(receipt.email_sent)
        .bind(receipt.created_at)
        .bind(receipt.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_receipt", e))?;

        Ok(receipt)
    }

    #[instrument(skip(self, message), fields(access_key = %access_key, status = %status), err)]
    async fn update_status(
        &self,
        access_key: &AccessKey,
        status: ReceiptStatus,
        message: Option<&str>,
        authorization_date: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE electronic_receipts
            SET sri_status = $2,
                sri_message = $3,
                authorization_date = COALESCE($4, authorization_date),
                updated_at = NOW()
            WHERE access_key = $1
            "#,
        )
        .bind(access_key.as_str())
        .bind(status.as_str())
        .bind(message)
        .bind(authorization_date)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_status", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("receipt {access_key}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(access_key = %access_key), err)]
    async fn update_email_sent(&self, access_key: &AccessKey, sent: bool) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE electronic_receipts SET email_sent = $2, updated_at = NOW() WHERE access_key = $1",
        )
        .bind(access_key.as_str())
        .bind(sent)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_email_sent", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound(format!("receipt {access_key}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(access_key = %access_key), err)]
    async fn get_by_access_key(
        &self,
        access_key: &AccessKey,
    ) -> RepoResult<Option<ElectronicReceipt>> {
        let row = sqlx::query(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM electronic_receipts WHERE access_key = $1"
        ))
        .bind(access_key.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_receipt", e))?;

        row.map(|r| receipt_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id), err)]
    async fn latest_for_transaction(
        &self,
        transaction_id: TransactionId,
        document_type: DocumentType,
    ) -> RepoResult<Option<ElectronicReceipt>> {
        let row = sqlx::query(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM electronic_receipts \
             WHERE transaction_id = $1 AND receipt_type = $2 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(Uuid::from(transaction_id))
        .bind(document_type.code())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest_receipt", e))?;

        row.map(|r| receipt_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id), err)]
    async fn list_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> RepoResult<Vec<ElectronicReceipt>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM electronic_receipts \
             WHERE transaction_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(Uuid::from(transaction_id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_receipts", e))?;

        rows.iter().map(receipt_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn find_pending(
        &self,
        created_after: Option<DateTime<Utc>>,
    ) -> RepoResult<Vec<ElectronicReceipt>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM electronic_receipts \
             WHERE sri_status NOT IN ('AUTORIZADO', 'RECHAZADA', 'DEVUELTA') \
               AND ($1::timestamptz IS NULL OR created_at >= $1) \
             ORDER BY created_at ASC"
        ))
        .bind(created_after)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_pending", e))?;

        rows.iter().map(receipt_from_row).collect()
    }
}

fn issuer_from_row(row: &PgRow) -> RepoResult<Issuer> {
    Ok(Issuer {
        id: IssuerId::from(get::<Uuid>(row, "id")?),
        ruc: get(row, "ruc")?,
        business_name: get(row, "business_name")?,
        trade_name: get(row, "trade_name")?,
        main_address: get(row, "main_address")?,
        establishment_address: get(row, "establishment_address")?,
        establishment_code: get(row, "establishment_code")?,
        emission_point_code: get(row, "emission_point_code")?,
        environment: environment(get(row, "environment")?)?,
        keep_accounting: get(row, "keep_accounting")?,
        signature_path: get(row, "signature_path")?,
        is_active: get(row, "is_active")?,
    })
}

fn transaction_from_row(row: &PgRow) -> RepoResult<Transaction> {
    let kind: String = get(row, "kind")?;
    let kind = match kind.as_str() {
        "income" => TransactionKind::Income,
        "outcome" => TransactionKind::Outcome,
        other => return Err(RepoError::Storage(format!("unknown transaction kind {other}"))),
    };
    Ok(Transaction {
        id: TransactionId::from(get::<Uuid>(row, "id")?),
        kind,
        description: get(row, "description")?,
        date: get::<NaiveDate>(row, "transaction_date")?,
        amount: get::<Decimal>(row, "amount")?,
        subtotal_15: get(row, "subtotal_15")?,
        subtotal_0: get(row, "subtotal_0")?,
        tax_amount: get(row, "tax_amount")?,
        taxpayer_id: get::<Option<Uuid>>(row, "tax_payer_id")?.map(TaxPayerId::from),
        voids_transaction_id: get::<Option<Uuid>>(row, "voids_transaction_id")?
            .map(TransactionId::from),
    })
}

fn item_from_row(row: &PgRow) -> RepoResult<TransactionItem> {
    Ok(TransactionItem {
        transaction_id: TransactionId::from(get::<Uuid>(row, "transaction_id")?),
        code: get(row, "code")?,
        description: get(row, "description")?,
        quantity: get(row, "quantity")?,
        unit_price: get(row, "unit_price")?,
        subtotal: get(row, "subtotal")?,
        tax_rate: TaxRate::from_code(i32::from(get::<i16>(row, "tax_rate")?)),
    })
}

fn taxpayer_from_row(row: &PgRow) -> RepoResult<TaxPayer> {
    Ok(TaxPayer {
        id: TaxPayerId::from(get::<Uuid>(row, "id")?),
        identification: get(row, "identification")?,
        identification_type: get(row, "identification_type")?,
        name: get(row, "name")?,
        email: get(row, "email")?,
        address: get(row, "address")?,
        phone: get(row, "phone")?,
    })
}

fn emission_point_from_row(row: &PgRow) -> RepoResult<EmissionPoint> {
    Ok(EmissionPoint {
        id: EmissionPointId::from(get::<Uuid>(row, "id")?),
        issuer_id: IssuerId::from(get::<Uuid>(row, "issuer_id")?),
        establishment_code: get(row, "establishment_code")?,
        emission_point_code: get(row, "emission_point_code")?,
        document_type: document_type(get(row, "receipt_type")?)?,
        current_sequence: to_u64(get(row, "current_sequence")?)?,
        initial_sequence: to_u64(get(row, "initial_sequence")?)?,
        is_active: get(row, "is_active")?,
    })
}

fn receipt_from_row(row: &PgRow) -> RepoResult<ElectronicReceipt> {
    let access_key: String = get(row, "access_key")?;
    let status: String = get(row, "sri_status")?;
    Ok(ElectronicReceipt {
        id: ReceiptId::from(get::<Uuid>(row, "id")?),
        transaction_id: TransactionId::from(get::<Uuid>(row, "transaction_id")?),
        issuer_id: IssuerId::from(get::<Uuid>(row, "issuer_id")?),
        taxpayer_id: TaxPayerId::from(get::<Uuid>(row, "tax_payer_id")?),
        access_key: AccessKey::parse(&access_key)
            .map_err(|e| RepoError::Storage(format!("stored access key is corrupt: {e}")))?,
        document_type: document_type(get(row, "receipt_type")?)?,
        xml_content: get(row, "xml_content")?,
        status: status
            .parse()
            .map_err(|e| RepoError::Storage(format!("stored status is corrupt: {e}")))?,
        message: get(row, "sri_message")?,
        authorization_date: get(row, "authorization_date")?,
        environment: environment(get(row, "environment")?)?,
        email_sent: get(row, "email_sent")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> RepoResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| RepoError::Storage(format!("failed to decode column {column}: {e}")))
}

fn environment(code: i16) -> RepoResult<Environment> {
    u8::try_from(code)
        .ok()
        .and_then(|c| Environment::from_code(c).ok())
        .ok_or_else(|| RepoError::Storage(format!("unknown environment code {code}")))
}

fn document_type(code: String) -> RepoResult<DocumentType> {
    code.parse()
        .map_err(|e| RepoError::Storage(format!("stored document type is corrupt: {e}")))
}

fn to_u64(value: i64) -> RepoResult<u64> {
    u64::try_from(value).map_err(|_| RepoError::Storage(format!("negative counter value {value}")))
}

fn to_i64(value: u64) -> RepoResult<i64> {
    i64::try_from(value).map_err(|_| RepoError::Conflict(format!("counter value {value} too large")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") => RepoError::Conflict(msg),
                _ => RepoError::Storage(msg),
            }
        }
        sqlx::Error::RowNotFound => RepoError::NotFound(format!("row not found in {operation}")),
        sqlx::Error::PoolClosed => {
            RepoError::Storage(format!("connection pool closed in {operation}"))
        }
        other => RepoError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}
