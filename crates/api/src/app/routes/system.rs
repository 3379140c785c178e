use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::{dto, errors, services::AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Runs one reconciliation sweep over every non-terminal receipt.
pub async fn sync_now(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.issuance.process_background_sync(None).await {
        Ok(authorized) => Json(dto::SyncResponse { authorized }).into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}
