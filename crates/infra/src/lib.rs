//! Infrastructure layer: storage, signing, tax authority transport, receipt
//! rendering, mail delivery and configuration.

pub mod authority;
pub mod config;
pub mod mail;
pub mod render;
pub mod repo;
pub mod signer;
