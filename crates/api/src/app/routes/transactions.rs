use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/:id/receipts", get(list_receipts))
        .route("/:id/ride", post(generate_ride))
}

/// Every attempt for a transaction, newest first.
pub async fn list_receipts(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let transaction_id = match dto::parse_transaction_id(&id, "transaction id") {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.issuance.receipts_for(transaction_id).await {
        Ok(receipts) => Json(
            receipts
                .into_iter()
                .map(dto::ReceiptResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}

pub async fn generate_ride(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let transaction_id = match dto::parse_transaction_id(&id, "transaction id") {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.issuance.generate_ride(transaction_id).await {
        Ok(path) => Json(dto::RideResponse {
            path: path.display().to_string(),
        })
        .into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}
