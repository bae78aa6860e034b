//! Diagnostics sink handed to the store and the variable resolver.
//!
//! The core never logs on its own.  Everything worth reporting goes
//! through a `Diagnostics` implementation chosen by the caller.

use tracing::{debug, warn};

use crate::vault::{AttachmentReference, Item};

/// Receives noteworthy events from the store and the resolver.
pub trait Diagnostics: Send + Sync {
    /// A name search ran without any organization, collection or folder
    /// filter.  `subject` names who asked (a variable label or the state).
    fn too_broad_query(&self, subject: &str, item_name: &str);

    fn attachment_created(&self, _item: &Item, _file_name: &str) {}

    fn attachment_deleted(&self, _item: &Item, _attachment: &AttachmentReference) {}

    /// Old state revisions were evicted after a write.
    fn retention_pruned(&self, _item: &Item, _evicted: usize) {}
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn too_broad_query(&self, subject: &str, item_name: &str) {
        warn!(
            subject,
            item_name,
            "no organization_id, collection_id or folder_id given; the search may match too many items"
        );
    }

    fn attachment_created(&self, item: &Item, file_name: &str) {
        debug!(item_name = %item.name, item_id = %item.id, attachment = file_name, "attachment created");
    }

    fn attachment_deleted(&self, item: &Item, attachment: &AttachmentReference) {
        debug!(
            item_name = %item.name,
            item_id = %item.id,
            attachment = %attachment.file_name,
            attachment_id = %attachment.id,
            "attachment deleted"
        );
    }

    fn retention_pruned(&self, item: &Item, evicted: usize) {
        debug!(item_name = %item.name, item_id = %item.id, evicted, "old state revisions removed");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn too_broad_query(&self, _subject: &str, _item_name: &str) {}
}
