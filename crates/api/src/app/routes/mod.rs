use axum::{routing::post, Router};

pub mod credit_notes;
pub mod emission_points;
pub mod invoices;
pub mod receipts;
pub mod system;
pub mod transactions;

/// Router for every issuance endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/sync", post(system::sync_now))
        .nest("/invoices", invoices::router())
        .nest("/credit-notes", credit_notes::router())
        .nest("/emission-points", emission_points::router())
        .nest("/receipts", receipts::router())
        .nest("/transactions", transactions::router())
}
