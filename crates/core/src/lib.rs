//! `einvoice-core`: shared building blocks for the issuance engine.
//!
//! This crate contains **pure** primitives (no infrastructure concerns): the
//! domain error model, strongly-typed identifiers and the entity trait.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{EmissionPointId, IssuerId, ReceiptId, TaxPayerId, TransactionId};
