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
        .route("/:access_key", get(get_receipt))
        .route("/:access_key/sync", post(sync_receipt))
}

pub async fn get_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Path(access_key): Path<String>,
) -> axum::response::Response {
    let key = match dto::parse_access_key(&access_key) {
        Ok(k) => k,
        Err(res) => return res,
    };

    match services.issuance.receipt(&key).await {
        Ok(r) => Json(dto::ReceiptResponse::from(r)).into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}

/// Resumes a receipt from its persisted status. Terminal receipts come back unchanged.
pub async fn sync_receipt(
    Extension(services): Extension<Arc<AppServices>>,
    Path(access_key): Path<String>,
) -> axum::response::Response {
    let key = match dto::parse_access_key(&access_key) {
        Ok(k) => k,
        Err(res) => return res,
    };

    match services.issuance.sync_receipt(&key).await {
        Ok(o) => Json(dto::OutcomeResponse::from(o)).into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}
