use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use einvoice_issuance::CreditNoteRequest;

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/", post(issue_credit_note))
}

pub async fn issue_credit_note(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::IssueCreditNoteRequest>,
) -> axum::response::Response {
    let void_transaction_id =
        match dto::parse_transaction_id(&body.void_transaction_id, "void_transaction_id") {
            Ok(id) => id,
            Err(res) => return res,
        };
    let original_transaction_id =
        match dto::parse_transaction_id(&body.original_transaction_id, "original_transaction_id") {
            Ok(id) => id,
            Err(res) => return res,
        };

    let request = CreditNoteRequest {
        void_transaction_id,
        original_transaction_id,
        reason: body.reason,
        signature_password: body.signature_password,
    };

    match services.issuance.issue_credit_note(request).await {
        Ok(o) => (StatusCode::CREATED, Json(dto::OutcomeResponse::from(o))).into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}
