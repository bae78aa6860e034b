//! The advisory lock record, kept as a single `terraform.lock.json`
//! attachment.
//!
//! The lock is cooperative.  Nothing stops a writer that ignores it, and
//! replacing a lock briefly leaves two lock attachments on the item.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{BwStateError, Result};

use super::reference::Reference;
use super::timeline::LOCK_FILE_NAME;
use super::ItemLocator;

/// An opaque lock document as sent by the remote-state client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockRecord(pub Value);

impl LockRecord {
    /// The lock id (`"ID"` member), if the document carries one.
    pub fn id(&self) -> Option<&str> {
        self.0.get("ID").and_then(Value::as_str)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map(LockRecord)
            .map_err(|e| BwStateError::DecodeError(format!("lock: {e}")))
    }
}

#[derive(Clone)]
pub struct LockStore {
    locator: ItemLocator,
}

impl LockStore {
    pub fn new(locator: ItemLocator) -> Self {
        Self { locator }
    }

    /// Read the lock.  With several lock attachments present, the first
    /// one listed wins.
    pub fn get(&self, reference: &Reference) -> Result<LockRecord> {
        let item = self.locator.resolve(reference)?;
        let attachment = item
            .attachments_named(LOCK_FILE_NAME)
            .next()
            .ok_or_else(|| BwStateError::NotFound(format!("no lock on {item}")))?;

        let raw = self
            .locator
            .client()
            .get_attachment(&item, &attachment.id)?;
        serde_json::from_slice(&raw).map(LockRecord).map_err(|e| {
            BwStateError::DecodeError(format!(
                "lock of attachment {} of {item}: {e}",
                attachment.file_name
            ))
        })
    }

    /// Replace the lock.  The new attachment is created before the old
    /// ones are removed, so the item never has zero locks in between.
    pub fn put(&self, reference: &Reference, record: &LockRecord) -> Result<()> {
        let item = self.locator.resolve(reference)?;
        let stale: Vec<_> = item.attachments_named(LOCK_FILE_NAME).cloned().collect();

        let encoded = serde_json::to_vec(record)
            .map_err(|e| BwStateError::SerializationError(format!("lock for {item}: {e}")))?;

        let client = self.locator.client();
        let diagnostics = self.locator.diagnostics();
        client.create_attachment(&item, LOCK_FILE_NAME, &encoded)?;
        diagnostics.attachment_created(&item, LOCK_FILE_NAME);

        for attachment in &stale {
            client.delete_attachment(&item, attachment)?;
            diagnostics.attachment_deleted(&item, attachment);
        }
        Ok(())
    }

    /// Remove every lock attachment.  Deleting an absent lock is fine.
    pub fn delete(&self, reference: &Reference) -> Result<()> {
        let item = self.locator.resolve(reference)?;
        let client = self.locator.client();
        for attachment in item.attachments_named(LOCK_FILE_NAME) {
            client.delete_attachment(&item, attachment)?;
            self.locator
                .diagnostics()
                .attachment_deleted(&item, attachment);
        }
        Ok(())
    }
}
