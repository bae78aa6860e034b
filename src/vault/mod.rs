//! Vault module — access to the password vault holding states and secrets.
//!
//! This module provides:
//! - `Item`, `AttachmentReference` and friends (`model`)
//! - Scoped item and attachment queries (`query`)
//! - The `VaultClient` capability (`client`)
//! - A `bw` CLI backed client (`bitwarden`) and an in-memory one (`memory`)

pub mod bitwarden;
pub mod client;
pub mod memory;
pub mod model;
pub mod query;

// Re-export the most commonly used items.
pub use bitwarden::BitwardenCli;
pub use client::VaultClient;
pub use memory::MemoryVault;
pub use model::{AttachmentReference, Item, ItemField, Login, LoginUri, Status};
pub use query::{AttachmentQuery, ItemQuery};
