//! The capability surface the store and resolver need from a vault.

use crate::errors::Result;

use super::model::{AttachmentReference, Item};
use super::query::ItemQuery;

/// Blocking access to a password vault.
///
/// Implementations must be safe to share between threads: the backend
/// server calls into one client from several requests at once.
pub trait VaultClient: Send + Sync {
    /// Pull remote changes into the local cache.
    fn sync(&self) -> Result<()>;

    /// Fetch an item by id.  A missing item is `NotFound`.
    fn get_item(&self, id: &str) -> Result<Item>;

    /// Fetch the single item matching `query`.
    ///
    /// Fails with `NotFound` on zero matches and `AmbiguousMatch` on more
    /// than one.
    fn find_item(&self, query: &ItemQuery) -> Result<Item>;

    /// List every item whose name contains `query.name`, limited by the
    /// query's scope filters.
    fn list_items(&self, query: &ItemQuery) -> Result<Vec<Item>>;

    fn create_attachment(&self, item: &Item, file_name: &str, content: &[u8]) -> Result<()>;

    fn delete_attachment(&self, item: &Item, attachment: &AttachmentReference) -> Result<()>;

    fn get_attachment(&self, item: &Item, attachment_id: &str) -> Result<Vec<u8>>;
}
