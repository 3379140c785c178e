//! Scripted collaborators and seed fixtures.
//!
//! Compiled for this crate's tests and, through the `testing` feature, for
//! downstream crates that need an engine without a signer binary, the
//! authority's web services or a mail provider.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use einvoice_core::{IssuerId, ReceiptId, TaxPayerId, TransactionId};
use einvoice_fiscal::{
    AccessKey, AccessKeyInput, DocumentType, ElectronicReceipt, EmissionType, Environment,
    FiscalDocument, Issuer, NumericCode, ReceiptStatus, Sequential, TaxPayer, TaxRate,
    Transaction, TransactionItem, TransactionKind, map_invoice,
};
use einvoice_infra::authority::{
    AuthorityMessage, Authorization, AuthorizationResponse, AuthorizationState,
    ReceptionResponse, ReceptionState, TaxAuthorityClient, TransportError,
};
use einvoice_infra::mail::{MailError, Mailer};
use einvoice_infra::render::{ReceiptRenderer, RenderError, RideMetadata};
use einvoice_infra::repo::InMemoryStore;
use einvoice_infra::signer::{DocumentSigner, SignError, SigningCredential};

use crate::error::IssuanceResult;
use crate::service::{IssuanceConfig, IssuanceService, Repositories};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

const SIGNATURE: &str = r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignatureValue>dGVzdA==</ds:SignatureValue></ds:Signature>"#;

#[derive(Debug, Clone)]
pub enum SignerBehavior {
    /// Appends an enveloped signature element to the root.
    Sign,
    BadPassword,
    Fail(String),
}

/// Signer that never touches a certificate.
#[derive(Debug)]
pub struct FakeSigner {
    behavior: Mutex<SignerBehavior>,
    invoices: AtomicUsize,
    credit_notes: AtomicUsize,
    passwords: Mutex<Vec<String>>,
}

impl Default for FakeSigner {
    fn default() -> Self {
        Self {
            behavior: Mutex::new(SignerBehavior::Sign),
            invoices: AtomicUsize::new(0),
            credit_notes: AtomicUsize::new(0),
            passwords: Mutex::new(Vec::new()),
        }
    }
}

impl FakeSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, behavior: SignerBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn invoice_calls(&self) -> usize {
        self.invoices.load(Ordering::SeqCst)
    }

    pub fn credit_note_calls(&self) -> usize {
        self.credit_notes.load(Ordering::SeqCst)
    }

    pub fn passwords(&self) -> Vec<String> {
        lock(&self.passwords).clone()
    }

    fn sign(&self, xml: &[u8], credential: &SigningCredential) -> Result<Vec<u8>, SignError> {
        lock(&self.passwords).push(credential.password.clone());
        match lock(&self.behavior).clone() {
            SignerBehavior::BadPassword => Err(SignError::BadPassword),
            SignerBehavior::Fail(msg) => Err(SignError::Failed(msg)),
            SignerBehavior::Sign => {
                let text = String::from_utf8_lossy(xml);
                let signed = match text.rfind("</") {
                    Some(at) => format!("{}{SIGNATURE}{}", &text[..at], &text[at..]),
                    None => text.into_owned(),
                };
                Ok(signed.into_bytes())
            }
        }
    }
}

#[async_trait]
impl DocumentSigner for FakeSigner {
    async fn sign_invoice(
        &self,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError> {
        self.invoices.fetch_add(1, Ordering::SeqCst);
        self.sign(xml, credential)
    }

    async fn sign_credit_note(
        &self,
        xml: &[u8],
        credential: &SigningCredential,
    ) -> Result<Vec<u8>, SignError> {
        self.credit_notes.fetch_add(1, Ordering::SeqCst);
        self.sign(xml, credential)
    }
}

/// Authority whose answers are queued in advance.
///
/// With nothing queued, reception answers `RECIBIDA` and authorization
/// answers `AUTORIZADO`.
#[derive(Debug, Default)]
pub struct ScriptedAuthority {
    receptions: Mutex<VecDeque<Result<ReceptionResponse, TransportError>>>,
    authorizations: Mutex<VecDeque<Result<AuthorizationResponse, TransportError>>>,
    calls: Mutex<Vec<AuthorityCall>>,
    delay: Mutex<Option<Duration>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityCall {
    Submit { environment: Environment, xml: String },
    Authorize { access_key: AccessKey },
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reception(&self, answer: Result<ReceptionResponse, TransportError>) -> &Self {
        lock(&self.receptions).push_back(answer);
        self
    }

    pub fn push_authorization(
        &self,
        answer: Result<AuthorizationResponse, TransportError>,
    ) -> &Self {
        lock(&self.authorizations).push_back(answer);
        self
    }

    /// Every call sleeps this long first.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn calls(&self) -> Vec<AuthorityCall> {
        lock(&self.calls).clone()
    }

    pub fn submit_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AuthorityCall::Submit { .. }))
            .count()
    }

    pub fn authorize_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AuthorityCall::Authorize { .. }))
            .count()
    }

    async fn pause(&self) {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TaxAuthorityClient for ScriptedAuthority {
    async fn submit(
        &self,
        signed_xml: &[u8],
        environment: Environment,
    ) -> Result<ReceptionResponse, TransportError> {
        lock(&self.calls).push(AuthorityCall::Submit {
            environment,
            xml: String::from_utf8_lossy(signed_xml).into_owned(),
        });
        self.pause().await;
        let next = lock(&self.receptions).pop_front();
        next.unwrap_or_else(|| Ok(received()))
    }

    async fn authorize(
        &self,
        access_key: &AccessKey,
        _environment: Environment,
    ) -> Result<AuthorizationResponse, TransportError> {
        lock(&self.calls).push(AuthorityCall::Authorize {
            access_key: access_key.clone(),
        });
        self.pause().await;
        let next = lock(&self.authorizations).pop_front();
        next.unwrap_or_else(|| Ok(authorized()))
    }
}

pub fn message(identifier: &str, text: &str) -> AuthorityMessage {
    AuthorityMessage {
        identifier: identifier.into(),
        message: text.into(),
        additional_info: None,
        kind: Some("ERROR".into()),
    }
}

pub fn received() -> ReceptionResponse {
    ReceptionResponse {
        state: ReceptionState::Received,
        messages: Vec::new(),
    }
}

pub fn returned(identifier: &str, text: &str) -> ReceptionResponse {
    ReceptionResponse {
        state: ReceptionState::Returned,
        messages: vec![message(identifier, text)],
    }
}

pub fn authorized() -> AuthorizationResponse {
    decision(AuthorizationState::Authorized, Vec::new())
}

pub fn not_authorized(identifier: &str, text: &str) -> AuthorizationResponse {
    decision(AuthorizationState::NotAuthorized, vec![message(identifier, text)])
}

pub fn in_process() -> AuthorizationResponse {
    decision(AuthorizationState::InProcess, Vec::new())
}

/// Answer with no `autorizacion` entries at all.
pub fn no_decision() -> AuthorizationResponse {
    AuthorizationResponse {
        access_key: None,
        authorizations: Vec::new(),
    }
}

fn decision(state: AuthorizationState, messages: Vec<AuthorityMessage>) -> AuthorizationResponse {
    AuthorizationResponse {
        access_key: None,
        authorizations: vec![Authorization {
            state,
            number: None,
            date: (state == AuthorizationState::Authorized).then(Utc::now),
            messages,
        }],
    }
}

pub fn connection_refused() -> TransportError {
    TransportError::Connection("connection refused".into())
}

/// Renderer that writes a one-line file and remembers what it rendered.
#[derive(Debug)]
pub struct RecordingRenderer {
    dir: PathBuf,
    rendered: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rendered: Mutex::new(Vec::new()),
        }
    }

    pub fn rendered(&self) -> Vec<String> {
        lock(&self.rendered).clone()
    }
}

#[async_trait]
impl ReceiptRenderer for RecordingRenderer {
    async fn render(
        &self,
        document: &FiscalDocument,
        metadata: &RideMetadata,
    ) -> Result<PathBuf, RenderError> {
        let key = document.info_tributaria().clave_acceso.clone();
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("ride-{key}.txt"));
        tokio::fs::write(&path, format!("{key} {}\n", metadata.status)).await?;
        lock(&self.rendered).push(key);
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipient: String,
    pub document_type: DocumentType,
    pub attachments: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: Mutex<bool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn sent(&self) -> Vec<SentMail> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        _issuer: &Issuer,
        recipient: &str,
        document_type: DocumentType,
        attachments: &[PathBuf],
    ) -> Result<(), MailError> {
        if *lock(&self.failing) {
            return Err(MailError::Transport("smtp down".into()));
        }
        for path in attachments {
            if !Path::new(path).exists() {
                return Err(MailError::Attachment {
                    path: path.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
        }
        lock(&self.sent).push(SentMail {
            recipient: recipient.to_string(),
            document_type,
            attachments: attachments.to_vec(),
        });
        Ok(())
    }
}

pub fn sample_issuer() -> Issuer {
    Issuer {
        id: IssuerId::new(),
        ruc: "1790012345001".into(),
        business_name: "ACME SOLUCIONES S.A.".into(),
        trade_name: Some("Acme".into()),
        main_address: "Av. Amazonas N34-12, Quito".into(),
        establishment_address: "Av. Amazonas N34-12, Quito".into(),
        establishment_code: "001".into(),
        emission_point_code: "001".into(),
        environment: Environment::Test,
        keep_accounting: true,
        signature_path: "/certs/acme.p12".into(),
        is_active: true,
    }
}

pub fn sample_buyer(email: Option<&str>) -> TaxPayer {
    TaxPayer {
        id: TaxPayerId::new(),
        identification: "1712345678".into(),
        identification_type: "05".into(),
        name: "María Pérez".into(),
        email: email.map(Into::into),
        address: Some("Calle Larga 1-23, Cuenca".into()),
        phone: None,
    }
}

pub fn income(taxpayer_id: Option<TaxPayerId>) -> Transaction {
    Transaction {
        id: TransactionId::new(),
        kind: TransactionKind::Income,
        description: "Servicios de consultoría".into(),
        date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap_or_default(),
        amount: Decimal::new(12500, 2),
        subtotal_15: Decimal::new(10000, 2),
        subtotal_0: Decimal::new(1000, 2),
        tax_amount: Decimal::new(1500, 2),
        taxpayer_id,
        voids_transaction_id: None,
    }
}

pub fn items_for(tx: &Transaction) -> Vec<TransactionItem> {
    vec![
        TransactionItem {
            transaction_id: tx.id,
            code: Some("CONS-01".into()),
            description: "Consultoría".into(),
            quantity: Decimal::new(2, 0),
            unit_price: Decimal::new(5000, 2),
            subtotal: Decimal::new(10000, 2),
            tax_rate: TaxRate::Fifteen,
        },
        TransactionItem {
            transaction_id: tx.id,
            code: None,
            description: "Libro técnico".into(),
            quantity: Decimal::ONE,
            unit_price: Decimal::new(1000, 2),
            subtotal: Decimal::new(1000, 2),
            tax_rate: TaxRate::Zero,
        },
    ]
}

/// The void counterpart of `original`, dated a few days later.
pub fn void_of(original: &Transaction) -> Transaction {
    Transaction {
        id: TransactionId::new(),
        kind: TransactionKind::Outcome,
        description: format!("Anulación: {}", original.description),
        date: original.date + chrono::Duration::days(5),
        voids_transaction_id: Some(original.id),
        ..original.clone()
    }
}

/// Timeouts short enough for tests and no authorization delay.
pub fn fast_config() -> IssuanceConfig {
    IssuanceConfig {
        call_timeout: Duration::from_secs(5),
        authorization_delay: Duration::ZERO,
        stuck_after: chrono::Duration::hours(2),
    }
}

/// An engine over an in-memory store with an active issuer.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub issuer: Issuer,
    pub signer: Arc<FakeSigner>,
    pub authority: Arc<ScriptedAuthority>,
    pub renderer: Arc<RecordingRenderer>,
}

impl Harness {
    pub fn new(ride_dir: impl Into<PathBuf>) -> Self {
        let store = InMemoryStore::arc();
        let issuer = sample_issuer();
        // A fresh store has no issuers, so this cannot conflict.
        let _ = store.insert_issuer(issuer.clone());
        Self {
            store,
            issuer,
            signer: Arc::new(FakeSigner::new()),
            authority: Arc::new(ScriptedAuthority::new()),
            renderer: Arc::new(RecordingRenderer::new(ride_dir)),
        }
    }

    pub fn repositories(&self) -> Repositories {
        Repositories::from_store(self.store.clone())
    }

    pub fn service(&self) -> IssuanceService {
        self.service_with(fast_config())
    }

    pub fn service_with(&self, config: IssuanceConfig) -> IssuanceService {
        IssuanceService::new(
            self.repositories(),
            self.signer.clone(),
            self.authority.clone(),
            self.renderer.clone(),
            config,
        )
    }

    /// Seeds an itemized income sold to `buyer` (or the final consumer).
    pub fn seed_income(&self, buyer: Option<&TaxPayer>) -> Transaction {
        if let Some(b) = buyer {
            let _ = self.store.insert_taxpayer(b.clone());
        }
        let tx = income(buyer.map(|b| b.id));
        let _ = self.store.insert_transaction(tx.clone(), items_for(&tx));
        tx
    }

    /// A signed invoice for `tx` in `PENDIENTE`, as left behind when the
    /// process stops between persisting and submitting. Not stored.
    pub fn pending_invoice(&self, tx: &Transaction) -> IssuanceResult<ElectronicReceipt> {
        let buyer = TaxPayer::final_consumer();
        let access_key = AccessKey::generate(&AccessKeyInput {
            date: tx.date,
            document_type: DocumentType::Invoice,
            ruc: self.issuer.ruc.clone(),
            environment: self.issuer.environment,
            establishment: self.issuer.establishment_code.clone(),
            point: self.issuer.emission_point_code.clone(),
            sequential: Sequential::new(1)?,
            numeric_code: NumericCode::new(12_345_678)?,
            emission_type: EmissionType::Normal,
        })?;
        let xml = map_invoice(tx, &items_for(tx), &self.issuer, &buyer, &access_key).to_xml()?;
        let now = Utc::now();
        Ok(ElectronicReceipt {
            id: ReceiptId::new(),
            transaction_id: tx.id,
            issuer_id: self.issuer.id,
            taxpayer_id: buyer.id,
            access_key,
            document_type: DocumentType::Invoice,
            xml_content: xml,
            status: ReceiptStatus::Pendiente,
            message: None,
            authorization_date: None,
            environment: self.issuer.environment,
            email_sent: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn seed_void(&self, original: &Transaction) -> Transaction {
        let void = void_of(original);
        let _ = self.store.insert_transaction(void.clone(), Vec::new());
        void
    }
}
