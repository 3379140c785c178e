//! Outbound delivery of authorized receipts.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::info;

use einvoice_fiscal::{DocumentType, Issuer};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail delivery is not configured")]
    Disabled,
    #[error("attachment unreadable: {path}: {source}")]
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail provider rejected message: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        issuer: &Issuer,
        recipient: &str,
        document_type: DocumentType,
        attachments: &[PathBuf],
    ) -> Result<(), MailError>;
}

pub fn subject(issuer: &Issuer, document_type: DocumentType) -> String {
    let trade = issuer.trade_name.as_deref().unwrap_or(&issuer.business_name);
    match document_type {
        DocumentType::Invoice => format!("Comprobante Electrónico - {trade}"),
        DocumentType::CreditNote => format!("Nota de Crédito Electrónica - {trade}"),
    }
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    html: String,
    attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Serialize)]
struct EmailAttachment {
    filename: String,
    content: String,
}

/// JSON mail API (`POST {endpoint}/emails`, bearer token).
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

impl HttpMailer {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        sender: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            sender: sender.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(
        &self,
        issuer: &Issuer,
        recipient: &str,
        document_type: DocumentType,
        attachments: &[PathBuf],
    ) -> Result<(), MailError> {
        let mut files = Vec::with_capacity(attachments.len());
        for path in attachments {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| MailError::Attachment {
                    path: path.clone(),
                    source,
                })?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "adjunto".to_string());
            files.push(EmailAttachment {
                filename,
                content: STANDARD.encode(bytes),
            });
        }

        let request = EmailRequest {
            from: &self.sender,
            to: vec![recipient],
            subject: subject(issuer, document_type),
            html: format!(
                "<p>Estimado cliente,</p><p>Adjunto encontrará su comprobante electrónico emitido por {}.</p>",
                issuer.business_name
            ),
            attachments: files,
        };

        let resp = self
            .client
            .post(format!("{}/emails", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(recipient, document_type = %document_type, "receipt emailed");
        Ok(())
    }
}

/// Used when no mail provider is configured; every send fails with
/// [`MailError::Disabled`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(
        &self,
        _issuer: &Issuer,
        _recipient: &str,
        _document_type: DocumentType,
        _attachments: &[PathBuf],
    ) -> Result<(), MailError> {
        Err(MailError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use einvoice_core::IssuerId;
    use einvoice_fiscal::Environment;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn issuer(trade_name: Option<&str>) -> Issuer {
        Issuer {
            id: IssuerId::new(),
            ruc: "1790012345001".into(),
            business_name: "ACME S.A.".into(),
            trade_name: trade_name.map(Into::into),
            main_address: "Av. Amazonas 123".into(),
            establishment_address: "Quito".into(),
            establishment_code: "001".into(),
            emission_point_code: "001".into(),
            environment: Environment::Test,
            keep_accounting: false,
            signature_path: "/certs/acme.p12".into(),
            is_active: true,
        }
    }

    #[test]
    fn subject_prefers_trade_name() {
        assert_eq!(
            subject(&issuer(Some("Acme")), DocumentType::Invoice),
            "Comprobante Electrónico - Acme"
        );
        assert_eq!(
            subject(&issuer(None), DocumentType::CreditNote),
            "Nota de Crédito Electrónica - ACME S.A."
        );
    }

    #[tokio::test]
    async fn posts_attachments_as_base64() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(serde_json::json!({
                "to": ["cliente@example.com"],
                "attachments": [{ "filename": "doc.xml", "content": "PGZhY3R1cmEvPg==" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("doc.xml");
        std::fs::write(&xml, b"<factura/>").unwrap();

        let mailer = HttpMailer::new(
            server.uri(),
            "re_test",
            "facturas@acme.ec",
            Duration::from_secs(5),
        )
        .unwrap();
        mailer
            .send(&issuer(None), "cliente@example.com", DocumentType::Invoice, &[xml])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn provider_errors_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let mailer =
            HttpMailer::new(server.uri(), "k", "x@y.z", Duration::from_secs(5)).unwrap();
        let err = mailer
            .send(&issuer(None), "a@b.c", DocumentType::Invoice, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn disabled_mailer_refuses() {
        let err = DisabledMailer
            .send(&issuer(None), "a@b.c", DocumentType::Invoice, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Disabled));
    }
}
