//! Issuance error taxonomy.

use thiserror::Error;

use einvoice_core::DomainError;
use einvoice_fiscal::{AccessKey, XmlError};
use einvoice_infra::authority::TransportError;
use einvoice_infra::render::RenderError;
use einvoice_infra::repo::RepoError;
use einvoice_infra::signer::SignError;

pub type IssuanceResult<T> = Result<T, IssuanceError>;

#[derive(Debug, Error)]
pub enum IssuanceError {
    /// Missing issuer, inactive emission point, unusable counter.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("original transaction has no authorized invoice: {0}")]
    OriginalNotAuthorized(String),

    #[error("transaction already has an authorized receipt: {0}")]
    AlreadyAuthorized(AccessKey),

    #[error("signing failed: {0}")]
    Signing(#[from] SignError),

    /// Reception refused the document (`DEVUELTA`).
    #[error("document {access_key} returned by the authority: {message}")]
    Returned { access_key: AccessKey, message: String },

    /// Authorization denied the document (`RECHAZADA`).
    #[error("document {access_key} rejected by the authority: {message}")]
    Rejected { access_key: AccessKey, message: String },

    #[error("authority unreachable: {source}")]
    Transport {
        access_key: Option<AccessKey>,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Serialization(#[from] XmlError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IssuanceError {
    /// Whether the same access key may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The access key the failure is attached to, when one was issued.
    pub fn access_key(&self) -> Option<&AccessKey> {
        match self {
            Self::AlreadyAuthorized(key) => Some(key),
            Self::Returned { access_key, .. } | Self::Rejected { access_key, .. } => {
                Some(access_key)
            }
            Self::Transport { access_key, .. } => access_key.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const KEY: &str = "1001202601179001234500110010010000000011234567817";

    #[test]
    fn only_transport_failures_are_retryable() {
        let key = AccessKey::parse(KEY).unwrap();
        let transport = IssuanceError::Transport {
            access_key: Some(key.clone()),
            source: TransportError::Timeout(Duration::from_secs(30)),
        };
        assert!(transport.is_retryable());
        assert_eq!(transport.access_key(), Some(&key));

        let returned = IssuanceError::Returned {
            access_key: key.clone(),
            message: "35: ARCHIVO NO CUMPLE ESTRUCTURA XML".into(),
        };
        assert!(!returned.is_retryable());
        assert!(returned.to_string().contains(KEY));

        assert!(!IssuanceError::Configuration("no active issuer".into()).is_retryable());
        assert!(!IssuanceError::Repository(RepoError::Storage("down".into())).is_retryable());
    }
}
