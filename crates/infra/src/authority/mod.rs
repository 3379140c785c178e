//! Tax authority boundary: reception and authorization web services.

mod soap;
mod xml;

pub use soap::{AuthorityEndpoints, ServiceEndpoints, SoapClient};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use einvoice_fiscal::{AccessKey, Environment};

/// Reception answer for a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionState {
    /// `RECIBIDA`: accepted for validation.
    Received,
    /// `DEVUELTA`: failed schema or business validation.
    Returned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceptionResponse {
    pub state: ReceptionState,
    pub messages: Vec<AuthorityMessage>,
}

impl ReceptionResponse {
    /// The authority already holds this key and is still working on it.
    pub fn is_already_processing(&self) -> bool {
        self.state == ReceptionState::Returned
            && self
                .messages
                .iter()
                .any(|m| m.message.to_uppercase().contains("EN PROCESAMIENTO"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationState {
    Authorized,
    NotAuthorized,
    InProcess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub state: AuthorizationState,
    pub number: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub messages: Vec<AuthorityMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub access_key: Option<String>,
    pub authorizations: Vec<Authorization>,
}

impl AuthorizationResponse {
    /// The authoritative entry. `None` means the authority has not decided yet.
    pub fn first(&self) -> Option<&Authorization> {
        self.authorizations.first()
    }
}

/// One `mensaje` element from either web service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorityMessage {
    pub identifier: String,
    pub message: String,
    pub additional_info: Option<String>,
    pub kind: Option<String>,
}

impl AuthorityMessage {
    /// `identifier: message (additional info)`.
    pub fn summary(&self) -> String {
        let mut out = if self.identifier.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.identifier, self.message)
        };
        if let Some(info) = self.additional_info.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!(" ({info})"));
        }
        out
    }
}

impl fmt::Display for AuthorityMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("authority answered HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("could not decode authority response: {0}")]
    Decode(String),
}

impl TransportError {
    /// The request never got an answer (`ERROR_RED`), as opposed to an
    /// answer we could not use (`ERROR_ENVIO`).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }
}

#[async_trait]
pub trait TaxAuthorityClient: Send + Sync {
    async fn submit(
        &self,
        signed_xml: &[u8],
        environment: Environment,
    ) -> Result<ReceptionResponse, TransportError>;

    async fn authorize(
        &self,
        access_key: &AccessKey,
        environment: Environment,
    ) -> Result<AuthorizationResponse, TransportError>;
}
