use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/", post(issue_invoice))
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::IssueInvoiceRequest>,
) -> axum::response::Response {
    let transaction_id = match dto::parse_transaction_id(&body.transaction_id, "transaction_id") {
        Ok(id) => id,
        Err(res) => return res,
    };

    let outcome = match body.timeout_secs {
        Some(0) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                "timeout_secs must be positive",
            )
        }
        Some(secs) => {
            services
                .issuance
                .clone()
                .with_call_timeout(Duration::from_secs(secs))
                .issue_invoice(transaction_id, &body.signature_password)
                .await
        }
        None => {
            services
                .issuance
                .issue_invoice(transaction_id, &body.signature_password)
                .await
        }
    };

    match outcome {
        Ok(o) => (StatusCode::CREATED, Json(dto::OutcomeResponse::from(o))).into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}
