//! In-memory vault (non-persistent).
//!
//! Behaves like the CLI-backed client as far as the store can observe:
//! items are returned as snapshots, attachments get fresh ids, and a
//! deleted attachment disappears from later reads only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{BwStateError, Result};

use super::client::VaultClient;
use super::model::{AttachmentReference, Item};
use super::query::ItemQuery;

#[derive(Default)]
struct Inner {
    items: Vec<Item>,
    bodies: HashMap<String, Vec<u8>>,
    next_attachment: u64,
    syncs: usize,
    fail_deletes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryVault {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace by id) an item.
    pub fn insert_item(&self, item: Item) {
        let mut inner = self.lock();
        inner.items.retain(|i| i.id != item.id);
        inner.items.push(item);
    }

    /// Current snapshot of an item.
    pub fn item(&self, id: &str) -> Option<Item> {
        self.lock().items.iter().find(|i| i.id == id).cloned()
    }

    /// Raw content of an attachment.
    pub fn attachment_body(&self, attachment_id: &str) -> Option<Vec<u8>> {
        self.lock().bodies.get(attachment_id).cloned()
    }

    /// How many times `sync` was called.
    pub fn sync_count(&self) -> usize {
        self.lock().syncs
    }

    /// Make every following `delete_attachment` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not poison the vault for others.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl VaultClient for MemoryVault {
    fn sync(&self) -> Result<()> {
        self.lock().syncs += 1;
        Ok(())
    }

    fn get_item(&self, id: &str) -> Result<Item> {
        self.item(id)
            .ok_or_else(|| BwStateError::NotFound(format!("no item with id {id}")))
    }

    fn find_item(&self, query: &ItemQuery) -> Result<Item> {
        query.select(self.list_items(query)?)
    }

    fn list_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        Ok(self
            .lock()
            .items
            .iter()
            .filter(|i| i.name.contains(&query.name) && query.in_scope(i))
            .cloned()
            .collect())
    }

    fn create_attachment(&self, item: &Item, file_name: &str, content: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        inner.next_attachment += 1;
        let id = format!("att-{:04}", inner.next_attachment);
        let stored = inner
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| BwStateError::NotFound(format!("no item with id {}", item.id)))?;
        stored.attachments.push(AttachmentReference {
            id: id.clone(),
            file_name: file_name.to_string(),
            size: content.len().to_string(),
            url: format!("memory://{}/{id}", item.id),
        });
        inner.bodies.insert(id, content.to_vec());
        Ok(())
    }

    fn delete_attachment(&self, item: &Item, attachment: &AttachmentReference) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_deletes {
            return Err(BwStateError::ExternalCallFailure(format!(
                "cannot delete attachment '{}' ({}) of {item}",
                attachment.file_name, attachment.id
            )));
        }
        let stored = inner
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| BwStateError::NotFound(format!("no item with id {}", item.id)))?;
        let before = stored.attachments.len();
        stored.attachments.retain(|a| a.id != attachment.id);
        if stored.attachments.len() == before {
            return Err(BwStateError::NotFound(format!(
                "no attachment {} on {item}",
                attachment.id
            )));
        }
        inner.bodies.remove(&attachment.id);
        Ok(())
    }

    fn get_attachment(&self, item: &Item, attachment_id: &str) -> Result<Vec<u8>> {
        self.attachment_body(attachment_id).ok_or_else(|| {
            BwStateError::NotFound(format!("no attachment {attachment_id} on {item}"))
        })
    }
}
