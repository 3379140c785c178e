//! Issuance orchestrator.
//!
//! Drives one document through sequence reservation, mapping, signing,
//! persistence, reception and authorization. Every status change goes
//! through [`ReceiptStatus::transition`] before it is written, and the
//! submit/authorize half is re-entrant: [`IssuanceService::sync_receipt`]
//! resumes any non-terminal receipt from its persisted status.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use einvoice_core::TransactionId;
use einvoice_fiscal::{
    AccessKey, AccessKeyInput, CreditNoteReference, DocumentType, ElectronicReceipt,
    EmissionPoint, EmissionPointKey, EmissionType, FiscalDocument, Issuer, NewReceipt,
    NumericCode, ReceiptStatus, TaxPayer, Transaction, TransactionKind, map_credit_note,
    map_invoice,
};
use einvoice_infra::authority::{
    AuthorityMessage, AuthorizationState, ReceptionState, TaxAuthorityClient, TransportError,
};
use einvoice_infra::config::IssuanceSettings;
use einvoice_infra::render::{ReceiptRenderer, RideMetadata};
use einvoice_infra::repo::{
    EmissionPointRepository, IssuerRepository, ReceiptRepository, TaxPayerRepository,
    TransactionRepository,
};
use einvoice_infra::signer::{DocumentSigner, SignError, SigningCredential};

use crate::error::{IssuanceError, IssuanceResult};
use crate::finalizer::{FinalizeJob, FinalizerQueue};
use crate::sequence;

const MSG_RECEIVED: &str = "Recibido por SRI";
const MSG_IN_PROCESS: &str = "SRI procesando autorización...";
const MSG_AUTHORIZED: &str = "Autorización Exitosa";

/// Storage collaborators, one handle per record family.
#[derive(Clone)]
pub struct Repositories {
    pub issuers: Arc<dyn IssuerRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub taxpayers: Arc<dyn TaxPayerRepository>,
    pub emission_points: Arc<dyn EmissionPointRepository>,
    pub receipts: Arc<dyn ReceiptRepository>,
}

impl Repositories {
    /// All five families served by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: IssuerRepository
            + TransactionRepository
            + TaxPayerRepository
            + EmissionPointRepository
            + ReceiptRepository
            + 'static,
    {
        Self {
            issuers: store.clone(),
            transactions: store.clone(),
            taxpayers: store.clone(),
            emission_points: store.clone(),
            receipts: store,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// Upper bound on each signer and authority call.
    pub call_timeout: Duration,
    /// Pause between reception and the first authorization poll.
    pub authorization_delay: Duration,
    /// Age after which an `EN_PROCESO` receipt is abandoned for a new key.
    pub stuck_after: chrono::Duration,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self::from(&IssuanceSettings::default())
    }
}

impl From<&IssuanceSettings> for IssuanceConfig {
    fn from(settings: &IssuanceSettings) -> Self {
        Self {
            call_timeout: Duration::from_secs(settings.call_timeout_secs),
            authorization_delay: Duration::from_millis(settings.authorization_delay_ms),
            stuck_after: chrono::Duration::minutes(settings.stuck_after_minutes),
        }
    }
}

/// Where a document ended up after one pass of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueOutcome {
    pub access_key: AccessKey,
    pub status: ReceiptStatus,
    pub message: Option<String>,
    pub authorization_date: Option<DateTime<Utc>>,
}

impl IssueOutcome {
    fn of(receipt: &ElectronicReceipt) -> Self {
        Self {
            access_key: receipt.access_key.clone(),
            status: receipt.status,
            message: receipt.message.clone(),
            authorization_date: receipt.authorization_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreditNoteRequest {
    pub void_transaction_id: TransactionId,
    pub original_transaction_id: TransactionId,
    pub reason: String,
    pub signature_password: String,
}

/// What to do with a transaction that already has receipts.
enum Prior {
    Fresh,
    Resume(ElectronicReceipt),
}

/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct IssuanceService {
    repos: Repositories,
    signer: Arc<dyn DocumentSigner>,
    authority: Arc<dyn TaxAuthorityClient>,
    renderer: Arc<dyn ReceiptRenderer>,
    finalizer: Option<FinalizerQueue>,
    config: IssuanceConfig,
}

impl IssuanceService {
    pub fn new(
        repos: Repositories,
        signer: Arc<dyn DocumentSigner>,
        authority: Arc<dyn TaxAuthorityClient>,
        renderer: Arc<dyn ReceiptRenderer>,
        config: IssuanceConfig,
    ) -> Self {
        Self {
            repos,
            signer,
            authority,
            renderer,
            finalizer: None,
            config,
        }
    }

    /// Authorized receipts are handed to this queue.
    pub fn with_finalizer(mut self, queue: FinalizerQueue) -> Self {
        self.finalizer = Some(queue);
        self
    }

    /// Same engine with a different bound on each external call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Issues (or resumes) the invoice of an income transaction.
    #[instrument(skip(self, signature_password), fields(transaction_id = %transaction_id), err)]
    pub async fn issue_invoice(
        &self,
        transaction_id: TransactionId,
        signature_password: &str,
    ) -> IssuanceResult<IssueOutcome> {
        let tx = self.load_transaction(transaction_id).await?;
        if tx.kind != TransactionKind::Income {
            return Err(IssuanceError::Validation(format!(
                "transaction {transaction_id} is not an income, only incomes are invoiced"
            )));
        }
        let issuer = self.active_issuer().await?;

        if let Prior::Resume(receipt) = self.prior(transaction_id, DocumentType::Invoice).await? {
            info!(access_key = %receipt.access_key, status = %receipt.status, "resuming existing invoice");
            return self.drive(receipt).await;
        }

        let buyer = self.resolve_buyer(&tx).await?;
        let items = self.repos.transactions.items_for(tx.id).await?;

        let reservation = sequence::reserve(
            self.repos.emission_points.as_ref(),
            &EmissionPointKey::for_issuer(&issuer, DocumentType::Invoice),
        )
        .await?;
        let access_key = generate_key(&tx, &issuer, &reservation.emission_point, DocumentType::Invoice, reservation.sequential)?;

        let xml = map_invoice(&tx, &items, &issuer, &buyer, &access_key).to_xml()?;
        let credential = SigningCredential::new(&issuer.signature_path, signature_password);
        let signed = self
            .sign(self.signer.sign_invoice(xml.as_bytes(), &credential))
            .await?;

        let receipt = self
            .persist(NewReceipt {
                transaction_id: tx.id,
                issuer_id: issuer.id,
                taxpayer_id: buyer.id,
                access_key,
                document_type: DocumentType::Invoice,
                xml_content: signed,
                environment: issuer.environment,
            })
            .await?;
        self.drive(receipt).await
    }

    /// Issues a credit note voiding the authorized invoice of
    /// `original_transaction_id`.
    #[instrument(
        skip(self, request),
        fields(
            void_transaction_id = %request.void_transaction_id,
            original_transaction_id = %request.original_transaction_id
        ),
        err
    )]
    pub async fn issue_credit_note(&self, request: CreditNoteRequest) -> IssuanceResult<IssueOutcome> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(IssuanceError::Validation("a credit note needs a reason".into()));
        }

        let void_tx = self.load_transaction(request.void_transaction_id).await?;
        let original_tx = self.load_transaction(request.original_transaction_id).await?;
        if let Some(voided) = void_tx.voids_transaction_id {
            if voided != original_tx.id {
                return Err(IssuanceError::Validation(format!(
                    "transaction {} voids {voided}, not {}",
                    void_tx.id, original_tx.id
                )));
            }
        }

        let original_receipt = self
            .repos
            .receipts
            .list_for_transaction(original_tx.id)
            .await?
            .into_iter()
            .find(|r| {
                r.document_type == DocumentType::Invoice && r.status == ReceiptStatus::Autorizado
            })
            .ok_or_else(|| IssuanceError::OriginalNotAuthorized(original_tx.id.to_string()))?;

        let issuer = self.active_issuer().await?;

        if let Prior::Resume(receipt) = self.prior(void_tx.id, DocumentType::CreditNote).await? {
            info!(access_key = %receipt.access_key, status = %receipt.status, "resuming existing credit note");
            return self.drive(receipt).await;
        }

        let buyer = self
            .repos
            .taxpayers
            .get_by_id(original_receipt.taxpayer_id)
            .await?
            .ok_or_else(|| {
                IssuanceError::NotFound(format!("taxpayer {}", original_receipt.taxpayer_id))
            })?;
        let items = self.repos.transactions.items_for(original_tx.id).await?;

        let reservation = sequence::reserve(
            self.repos.emission_points.as_ref(),
            &EmissionPointKey::for_issuer(&issuer, DocumentType::CreditNote),
        )
        .await?;
        let access_key = generate_key(
            &void_tx,
            &issuer,
            &reservation.emission_point,
            DocumentType::CreditNote,
            reservation.sequential,
        )?;

        let reference = CreditNoteReference {
            original_access_key: original_receipt.access_key.clone(),
            original_date: original_tx.date,
            reason: reason.to_string(),
        };
        let xml = map_credit_note(
            &void_tx,
            &original_tx,
            &items,
            &issuer,
            &buyer,
            &access_key,
            &reference,
        )
        .to_xml()?;
        let credential = SigningCredential::new(&issuer.signature_path, &request.signature_password);
        let signed = self
            .sign(self.signer.sign_credit_note(xml.as_bytes(), &credential))
            .await?;

        let receipt = self
            .persist(NewReceipt {
                transaction_id: void_tx.id,
                issuer_id: issuer.id,
                taxpayer_id: buyer.id,
                access_key,
                document_type: DocumentType::CreditNote,
                xml_content: signed,
                environment: issuer.environment,
            })
            .await?;
        self.drive(receipt).await
    }

    /// Resumes one receipt from its persisted status. Terminal receipts are
    /// returned as they are.
    #[instrument(skip(self), fields(access_key = %access_key), err)]
    pub async fn sync_receipt(&self, access_key: &AccessKey) -> IssuanceResult<IssueOutcome> {
        let receipt = self.receipt(access_key).await?;
        self.drive(receipt).await
    }

    /// Re-drives every non-terminal receipt, oldest first. Receipts replaced
    /// by a newer attempt are left alone. Individual failures are logged and
    /// skipped. Returns how many became authorized.
    #[instrument(skip(self), err)]
    pub async fn process_background_sync(
        &self,
        created_after: Option<DateTime<Utc>>,
    ) -> IssuanceResult<usize> {
        let pending = self.repos.receipts.find_pending(created_after).await?;
        if pending.is_empty() {
            debug!("no pending receipts");
            return Ok(0);
        }
        info!(pending = pending.len(), "background sync started");

        let mut authorized = 0;
        for receipt in pending {
            let key = receipt.access_key.clone();
            match self.is_superseded(&receipt).await {
                Ok(false) => {}
                Ok(true) => {
                    debug!(access_key = %key, status = %receipt.status, "receipt replaced by a newer attempt, skipped");
                    continue;
                }
                Err(e) => {
                    warn!(access_key = %key, error = %e, "could not check for a newer attempt, skipped");
                    continue;
                }
            }
            match self.drive(receipt).await {
                Ok(outcome) if outcome.status == ReceiptStatus::Autorizado => authorized += 1,
                Ok(outcome) => {
                    debug!(access_key = %key, status = %outcome.status, "receipt still pending");
                }
                Err(e) => {
                    warn!(access_key = %key, error = %e, retryable = e.is_retryable(), "background sync of receipt failed");
                }
            }
        }

        info!(authorized, "background sync finished");
        Ok(authorized)
    }

    /// Renders the RIDE of the latest receipt of a transaction.
    #[instrument(skip(self), fields(transaction_id = %transaction_id), err)]
    pub async fn generate_ride(&self, transaction_id: TransactionId) -> IssuanceResult<PathBuf> {
        let receipt = self
            .repos
            .receipts
            .list_for_transaction(transaction_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IssuanceError::NotFound(format!("receipts of transaction {transaction_id}")))?;

        let buyer = self.repos.taxpayers.get_by_id(receipt.taxpayer_id).await?;
        let document = FiscalDocument::parse(receipt.document_type, &receipt.xml_content)?;
        let authorized = receipt.status == ReceiptStatus::Autorizado;
        let metadata = RideMetadata {
            status: receipt.status,
            authorization_number: authorized.then(|| receipt.access_key.to_string()),
            authorization_date: receipt.authorization_date,
            buyer_email: buyer.as_ref().and_then(|b| b.contact_email()).map(str::to_string),
        };
        Ok(self.renderer.render(&document, &metadata).await?)
    }

    /// Every receipt of a transaction, newest first.
    pub async fn receipts_for(
        &self,
        transaction_id: TransactionId,
    ) -> IssuanceResult<Vec<ElectronicReceipt>> {
        Ok(self.repos.receipts.list_for_transaction(transaction_id).await?)
    }

    pub async fn receipt(&self, access_key: &AccessKey) -> IssuanceResult<ElectronicReceipt> {
        self.repos
            .receipts
            .get_by_access_key(access_key)
            .await?
            .ok_or_else(|| IssuanceError::NotFound(format!("receipt {access_key}")))
    }

    /// Creates the active issuer's counter for `document_type` continuing a
    /// previous system's numbering.
    pub async fn configure_emission_point(
        &self,
        document_type: DocumentType,
        next_sequence: u64,
    ) -> IssuanceResult<EmissionPoint> {
        let issuer = self.active_issuer().await?;
        sequence::configure(
            self.repos.emission_points.as_ref(),
            EmissionPointKey::for_issuer(&issuer, document_type),
            next_sequence,
        )
        .await
    }

    /// The active issuer's counters, one per emission point and document type.
    pub async fn emission_points(&self) -> IssuanceResult<Vec<EmissionPoint>> {
        let issuer = self.active_issuer().await?;
        Ok(self.repos.emission_points.list_by_issuer(issuer.id).await?)
    }

    async fn load_transaction(&self, id: TransactionId) -> IssuanceResult<Transaction> {
        self.repos
            .transactions
            .get_by_id(id)
            .await?
            .ok_or_else(|| IssuanceError::NotFound(format!("transaction {id}")))
    }

    async fn active_issuer(&self) -> IssuanceResult<Issuer> {
        self.repos
            .issuers
            .get_active()
            .await?
            .ok_or_else(|| IssuanceError::Configuration("no active issuer configured".into()))
    }

    /// Re-issuance policy for a transaction that may already have receipts.
    async fn prior(
        &self,
        transaction_id: TransactionId,
        document_type: DocumentType,
    ) -> IssuanceResult<Prior> {
        let Some(latest) = self
            .repos
            .receipts
            .latest_for_transaction(transaction_id, document_type)
            .await?
        else {
            return Ok(Prior::Fresh);
        };

        match latest.status {
            ReceiptStatus::Autorizado => Err(IssuanceError::AlreadyAuthorized(latest.access_key)),
            ReceiptStatus::Devuelta | ReceiptStatus::Rechazada => {
                info!(access_key = %latest.access_key, status = %latest.status, "previous attempt failed, issuing a new key");
                Ok(Prior::Fresh)
            }
            ReceiptStatus::EnProceso if Utc::now() - latest.created_at > self.config.stuck_after => {
                self.last_poll_before_abandoning(latest).await
            }
            _ => Ok(Prior::Resume(latest)),
        }
    }

    /// Polls a stuck receipt once more. Only a receipt the authority still
    /// has not decided on is abandoned for a new key; a late authorization
    /// is returned as the outcome and a failed poll is propagated.
    async fn last_poll_before_abandoning(
        &self,
        mut stuck: ElectronicReceipt,
    ) -> IssuanceResult<Prior> {
        match self.authorize(&mut stuck).await {
            Ok(()) if stuck.status == ReceiptStatus::Autorizado => {
                info!(access_key = %stuck.access_key, "stuck receipt was authorized late");
                Ok(Prior::Resume(stuck))
            }
            Ok(()) => {
                warn!(
                    access_key = %stuck.access_key,
                    created_at = %stuck.created_at,
                    "receipt stuck in processing, issuing a new key"
                );
                Ok(Prior::Fresh)
            }
            Err(IssuanceError::Rejected { access_key, .. }) => {
                info!(access_key = %access_key, "stuck receipt was rejected, issuing a new key");
                Ok(Prior::Fresh)
            }
            Err(e) => Err(e),
        }
    }

    /// A receipt is superseded once a newer attempt exists for the same
    /// transaction and document type.
    async fn is_superseded(&self, receipt: &ElectronicReceipt) -> IssuanceResult<bool> {
        let latest = self
            .repos
            .receipts
            .latest_for_transaction(receipt.transaction_id, receipt.document_type)
            .await?;
        Ok(latest.is_some_and(|l| l.access_key != receipt.access_key))
    }

    /// The linked counterparty, or the shared final consumer record.
    async fn resolve_buyer(&self, tx: &Transaction) -> IssuanceResult<TaxPayer> {
        if let Some(id) = tx.taxpayer_id {
            return self
                .repos
                .taxpayers
                .get_by_id(id)
                .await?
                .ok_or_else(|| IssuanceError::NotFound(format!("taxpayer {id}")));
        }
        if let Some(existing) = self
            .repos
            .taxpayers
            .get_by_identification(TaxPayer::FINAL_CONSUMER_IDENTIFICATION)
            .await?
        {
            return Ok(existing);
        }
        Ok(self.repos.taxpayers.create(TaxPayer::final_consumer()).await?)
    }

    async fn sign<F>(&self, call: F) -> IssuanceResult<String>
    where
        F: Future<Output = Result<Vec<u8>, SignError>>,
    {
        let signed = tokio::time::timeout(self.config.call_timeout, call)
            .await
            .map_err(|_| {
                SignError::Failed(format!("signer timed out after {:?}", self.config.call_timeout))
            })??;
        String::from_utf8(signed)
            .map_err(|_| IssuanceError::Signing(SignError::Failed("signed document is not UTF-8".into())))
    }

    async fn persist(&self, new: NewReceipt) -> IssuanceResult<ElectronicReceipt> {
        let receipt = self.repos.receipts.create(new).await?;
        info!(
            access_key = %receipt.access_key,
            document_type = %receipt.document_type,
            status = %receipt.status,
            "receipt persisted"
        );
        Ok(receipt)
    }

    /// Runs the submit/authorize half of the state machine from wherever
    /// `receipt` currently is.
    async fn drive(&self, mut receipt: ElectronicReceipt) -> IssuanceResult<IssueOutcome> {
        if receipt.status.needs_submission() {
            self.submit(&mut receipt).await?;
            tokio::time::sleep(self.config.authorization_delay).await;
        }
        if receipt.status.needs_authorization() {
            self.authorize(&mut receipt).await?;
        }
        Ok(IssueOutcome::of(&receipt))
    }

    async fn submit(&self, receipt: &mut ElectronicReceipt) -> IssuanceResult<()> {
        let call = self
            .authority
            .submit(receipt.xml_content.as_bytes(), receipt.environment);
        let answer = tokio::time::timeout(self.config.call_timeout, call)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.config.call_timeout)));

        match answer {
            Err(e) => {
                let next = if e.is_network() {
                    ReceiptStatus::ErrorRed
                } else {
                    ReceiptStatus::ErrorEnvio
                };
                warn!(access_key = %receipt.access_key, status = %next, error = %e, "submission failed");
                self.record(receipt, next, Some(e.to_string()), None).await?;
                Err(IssuanceError::Transport {
                    access_key: Some(receipt.access_key.clone()),
                    source: e,
                })
            }
            Ok(resp) if resp.state == ReceptionState::Received => {
                let message = first_message(&resp.messages).unwrap_or_else(|| MSG_RECEIVED.to_string());
                self.record(receipt, ReceiptStatus::Recibida, Some(message), None).await
            }
            Ok(resp) if resp.is_already_processing() => {
                info!(access_key = %receipt.access_key, "authority already processing this key");
                self.record(receipt, ReceiptStatus::Recibida, first_message(&resp.messages), None)
                    .await
            }
            Ok(resp) => {
                let message = first_message(&resp.messages)
                    .unwrap_or_else(|| "Comprobante devuelto".to_string());
                warn!(access_key = %receipt.access_key, message = %message, "document returned");
                self.record(receipt, ReceiptStatus::Devuelta, Some(message.clone()), None)
                    .await?;
                Err(IssuanceError::Returned {
                    access_key: receipt.access_key.clone(),
                    message,
                })
            }
        }
    }

    async fn authorize(&self, receipt: &mut ElectronicReceipt) -> IssuanceResult<()> {
        let call = self
            .authority
            .authorize(&receipt.access_key, receipt.environment);
        let answer = tokio::time::timeout(self.config.call_timeout, call)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.config.call_timeout)));

        let resp = match answer {
            Ok(resp) => resp,
            Err(e) => {
                // Last confirmed status stands; the reconciler picks it up.
                warn!(access_key = %receipt.access_key, status = %receipt.status, error = %e, "authorization poll failed");
                return Err(IssuanceError::Transport {
                    access_key: Some(receipt.access_key.clone()),
                    source: e,
                });
            }
        };

        let Some(auth) = resp.first() else {
            debug!(access_key = %receipt.access_key, "authority has no decision yet");
            return self
                .record(receipt, ReceiptStatus::EnProceso, Some(MSG_IN_PROCESS.to_string()), None)
                .await;
        };

        match auth.state {
            AuthorizationState::Authorized => {
                let date = auth.date.unwrap_or_else(Utc::now);
                self.record(receipt, ReceiptStatus::Autorizado, Some(MSG_AUTHORIZED.to_string()), Some(date))
                    .await?;
                info!(access_key = %receipt.access_key, authorized_at = %date, "document authorized");
                self.schedule_finalizer(&receipt.access_key);
                Ok(())
            }
            AuthorizationState::InProcess => {
                let message = first_message(&auth.messages).unwrap_or_else(|| MSG_IN_PROCESS.to_string());
                self.record(receipt, ReceiptStatus::EnProceso, Some(message), None).await
            }
            AuthorizationState::NotAuthorized => {
                let message = first_message(&auth.messages)
                    .unwrap_or_else(|| "No autorizado".to_string());
                warn!(access_key = %receipt.access_key, message = %message, "document rejected");
                self.record(receipt, ReceiptStatus::Rechazada, Some(message.clone()), None)
                    .await?;
                Err(IssuanceError::Rejected {
                    access_key: receipt.access_key.clone(),
                    message,
                })
            }
        }
    }

    /// Validates and persists a status change, then mirrors it in memory.
    async fn record(
        &self,
        receipt: &mut ElectronicReceipt,
        next: ReceiptStatus,
        message: Option<String>,
        authorization_date: Option<DateTime<Utc>>,
    ) -> IssuanceResult<()> {
        let next = receipt.status.transition(next)?;
        self.repos
            .receipts
            .update_status(&receipt.access_key, next, message.as_deref(), authorization_date)
            .await?;
        debug!(access_key = %receipt.access_key, from = %receipt.status, to = %next, "status recorded");

        receipt.status = next;
        receipt.message = message;
        if authorization_date.is_some() {
            receipt.authorization_date = authorization_date;
        }
        receipt.updated_at = Utc::now();
        Ok(())
    }

    fn schedule_finalizer(&self, access_key: &AccessKey) {
        let Some(queue) = &self.finalizer else {
            debug!(access_key = %access_key, "no finalizer configured");
            return;
        };
        if let Err(e) = queue.schedule(FinalizeJob {
            access_key: access_key.clone(),
        }) {
            warn!(access_key = %access_key, error = %e, "finalizer not scheduled, RIDE can be generated on demand");
        }
    }
}

fn generate_key(
    tx: &Transaction,
    issuer: &Issuer,
    point: &EmissionPoint,
    document_type: DocumentType,
    sequential: einvoice_fiscal::Sequential,
) -> IssuanceResult<AccessKey> {
    let numeric_code = NumericCode::new(OsRng.gen_range(0..=NumericCode::MAX))?;
    Ok(AccessKey::generate(&AccessKeyInput {
        date: tx.date,
        document_type,
        ruc: issuer.ruc.clone(),
        environment: issuer.environment,
        establishment: point.establishment_code.clone(),
        point: point.emission_point_code.clone(),
        sequential,
        numeric_code,
        emission_type: EmissionType::Normal,
    })?)
}

fn first_message(messages: &[AuthorityMessage]) -> Option<String> {
    messages.first().map(AuthorityMessage::summary)
}
