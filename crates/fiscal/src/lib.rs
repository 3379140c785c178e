//! Fiscal domain for Ecuadorian electronic receipts.
//!
//! Pure, deterministic logic only (no IO, no HTTP, no storage): legal codes,
//! the 49-digit access key, the receipt status machine, the persisted record
//! shapes and the mapping from ledger transactions to the authority's XML
//! document model.

pub mod access_key;
pub mod codes;
pub mod document;
pub mod mapper;
pub mod model;
pub mod status;

pub use access_key::{AccessKey, AccessKeyInput, NumericCode, Sequential};
pub use codes::{DocumentType, EmissionType, Environment, TaxRate};
pub use document::{Factura, FiscalDocument, NotaCredito, XmlError};
pub use mapper::{CreditNoteReference, map_credit_note, map_invoice};
pub use model::{
    ElectronicReceipt, EmissionPoint, EmissionPointKey, Issuer, NewEmissionPoint, NewReceipt,
    TaxPayer, Transaction, TransactionItem, TransactionKind,
};
pub use status::ReceiptStatus;
