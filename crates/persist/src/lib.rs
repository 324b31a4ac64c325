//! Persistence for scene documents.
//!
//! # Invariants
//! - Upgrades run in strictly increasing version order and only rewrite
//!   property maps, never record order.
//! - A document with a sidecar is only decoded after its digest matches.

mod codec;
mod store;
mod upgrade;

pub use codec::{Format, MAGIC, decode, decode_binary, encode, sha256_hex};
pub use store::{DocumentMeta, DocumentStore, LoadedDocument, StoreError};
pub use upgrade::{CURRENT_DOCUMENT_VERSION, UpgradeReport, upgrade};
