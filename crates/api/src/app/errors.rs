use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use einvoice_core::DomainError;
use einvoice_fiscal::AccessKey;
use einvoice_infra::authority::TransportError;
use einvoice_infra::repo::RepoError;
use einvoice_infra::signer::SignError;
use einvoice_issuance::IssuanceError;

pub fn issuance_error_to_response(err: IssuanceError) -> axum::response::Response {
    let access_key = err.access_key().cloned();
    let (status, code) = match &err {
        IssuanceError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
        IssuanceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        IssuanceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        IssuanceError::OriginalNotAuthorized(_) => (StatusCode::CONFLICT, "original_not_authorized"),
        IssuanceError::AlreadyAuthorized(_) => (StatusCode::CONFLICT, "already_authorized"),
        IssuanceError::Signing(SignError::BadPassword) => {
            (StatusCode::BAD_REQUEST, "invalid_signature_password")
        }
        IssuanceError::Signing(SignError::CertificateNotFound(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "certificate_not_found")
        }
        IssuanceError::Signing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "signing_error"),
        IssuanceError::Returned { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "returned"),
        IssuanceError::Rejected { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "rejected"),
        IssuanceError::Transport {
            source: TransportError::Timeout(_),
            ..
        } => (StatusCode::GATEWAY_TIMEOUT, "authority_timeout"),
        IssuanceError::Transport { .. } => (StatusCode::BAD_GATEWAY, "authority_unavailable"),
        IssuanceError::Repository(RepoError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
        IssuanceError::Repository(RepoError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
        IssuanceError::Repository(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        IssuanceError::Domain(DomainError::Validation(_) | DomainError::InvalidId(_)) => {
            (StatusCode::BAD_REQUEST, "validation_error")
        }
        IssuanceError::Domain(DomainError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
        IssuanceError::Domain(DomainError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
        IssuanceError::Domain(DomainError::InvariantViolation(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation")
        }
        IssuanceError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error"),
        IssuanceError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "render_error"),
        IssuanceError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, code, "request failed");
    }
    match access_key {
        Some(key) => json_error_for(status, code, err.to_string(), &key),
        None => json_error(status, code, err.to_string()),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Like [`json_error`], for failures that already have a receipt behind them.
fn json_error_for(
    status: StatusCode,
    code: &'static str,
    message: String,
    access_key: &AccessKey,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message,
            "access_key": access_key.as_str(),
        })),
    )
        .into_response()
}
