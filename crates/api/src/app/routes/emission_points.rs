use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new().route("/", get(list_emission_points))
}

/// Current counters of the active issuer.
pub async fn list_emission_points(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.issuance.emission_points().await {
        Ok(points) => Json(
            points
                .into_iter()
                .map(dto::EmissionPointResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::issuance_error_to_response(e),
    }
}
