//! State documents stored as timestamped attachments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::errors::{BwStateError, Result};

use super::reference::Reference;
use super::timeline::{state_file_name, RetentionPolicy, Timeline};
use super::ItemLocator;

/// A state document: always a JSON object.
pub type StateDocument = Map<String, Value>;

/// Source of "now" for revision file names.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Default number of revisions kept per item.
pub const DEFAULT_MAX_REVISIONS: u16 = 2;

/// One entry of `StateStore::revisions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRevision {
    pub attachment_id: String,
    pub file_name: String,
    pub time: DateTime<Utc>,
    pub size: String,
}

/// Reads and writes the state document of an item.
///
/// Every write adds a new revision attachment and then evicts old ones
/// according to the retention policy.  Nothing here serializes callers:
/// two concurrent writes to the same item race in the vault.
#[derive(Clone)]
pub struct StateStore {
    locator: ItemLocator,
    max_revisions: u16,
    retention: RetentionPolicy,
    clock: Clock,
}

impl StateStore {
    pub fn new(locator: ItemLocator) -> Self {
        Self {
            locator,
            max_revisions: DEFAULT_MAX_REVISIONS,
            retention: RetentionPolicy::default(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Set the number of revisions to keep.  `0` means the default.
    pub fn with_max_revisions(mut self, max_revisions: u16) -> Self {
        self.max_revisions = if max_revisions == 0 {
            DEFAULT_MAX_REVISIONS
        } else {
            max_revisions
        };
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_revisions(&self) -> u16 {
        self.max_revisions
    }

    /// Fetch the latest state.  The flag is whether the document is
    /// encrypted by this store, which it never is.
    pub fn get(&self, reference: &Reference) -> Result<(StateDocument, bool)> {
        let item = self.locator.resolve(reference)?;
        let timeline = Timeline::from_item(&item);
        let latest = timeline
            .latest()
            .ok_or_else(|| BwStateError::NotFound(format!("no state stored on {item}")))?;

        let raw = self
            .locator
            .client()
            .get_attachment(&item, &latest.attachment.id)?;
        let document: StateDocument = serde_json::from_slice(&raw).map_err(|e| {
            BwStateError::DecodeError(format!(
                "state of attachment {} of {item}: {e}",
                latest.attachment.file_name
            ))
        })?;
        Ok((document, false))
    }

    /// Write a new revision, then evict old ones.
    ///
    /// If an eviction fails the new revision stays in place and only the
    /// eviction error is returned.
    pub fn put(
        &self,
        reference: &Reference,
        document: &StateDocument,
        metadata: &Map<String, Value>,
        encrypted: bool,
    ) -> Result<()> {
        if encrypted {
            return Err(BwStateError::UnsupportedEncryption);
        }
        if !metadata.is_empty() {
            return Err(BwStateError::UnsupportedMetadata);
        }

        let encoded = serde_json::to_vec(document)
            .map_err(|e| BwStateError::SerializationError(format!("state: {e}")))?;

        let item = self.locator.resolve(reference)?;
        let file_name = state_file_name((self.clock)());

        let client = self.locator.client();
        let diagnostics = self.locator.diagnostics();
        client.create_attachment(&item, &file_name, &encoded)?;
        diagnostics.attachment_created(&item, &file_name);

        // `item` was read before the new revision existed.
        let old = Timeline::from_item(&item);
        let evicted = old.evictions(self.max_revisions, self.retention);
        for member in evicted {
            client.delete_attachment(&item, &member.attachment)?;
            diagnostics.attachment_deleted(&item, &member.attachment);
        }
        if !evicted.is_empty() {
            diagnostics.retention_pruned(&item, evicted.len());
        }
        Ok(())
    }

    /// Delete every state revision of the item.  The lock record stays.
    pub fn delete(&self, reference: &Reference) -> Result<()> {
        let item = self.locator.resolve(reference)?;
        let client = self.locator.client();
        for member in Timeline::from_item(&item).sorted_ascending() {
            client.delete_attachment(&item, &member.attachment)?;
            self.locator
                .diagnostics()
                .attachment_deleted(&item, &member.attachment);
        }
        Ok(())
    }

    /// List the stored revisions, most recent first.
    pub fn revisions(&self, reference: &Reference) -> Result<Vec<StateRevision>> {
        let item = self.locator.resolve(reference)?;
        Ok(Timeline::from_item(&item)
            .sorted_descending()
            .into_iter()
            .map(|m| StateRevision {
                attachment_id: m.attachment.id.clone(),
                file_name: m.attachment.file_name.clone(),
                time: m.time,
                size: m.attachment.size.clone(),
            })
            .collect())
    }
}
