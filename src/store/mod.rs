//! Store module — state revisions and lock records kept as item attachments.
//!
//! This module provides:
//! - The opaque item `Reference` (`reference`)
//! - Revision file names, `Timeline` and retention (`timeline`)
//! - `StateStore` for get/put/delete of state documents (`state`)
//! - `LockStore` for the advisory lock record (`lock`)
//!
//! Both stores resolve a reference through `ItemLocator`, which always
//! syncs the vault first so the attachment list is current.

pub mod lock;
pub mod reference;
pub mod state;
pub mod timeline;

use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::errors::{BwStateError, Result};
use crate::vault::{Item, ItemQuery, VaultClient};

// Re-export the most commonly used items.
pub use lock::{LockRecord, LockStore};
pub use reference::Reference;
pub use state::{StateDocument, StateRevision, StateStore};
pub use timeline::{RetentionPolicy, TimedAttachment, Timeline, LOCK_FILE_NAME};

/// Filters applied when an item is looked up by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreScope {
    pub organization_id: Option<String>,
    pub collection_id: Option<String>,
    pub folder_id: Option<String>,
}

impl StoreScope {
    fn query(&self, name: &str) -> ItemQuery {
        ItemQuery {
            name: name.to_string(),
            organization_id: self.organization_id.clone(),
            collection_id: self.collection_id.clone(),
            folder_id: self.folder_id.clone(),
        }
    }
}

/// Resolves references to vault items.  Shared by both stores.
#[derive(Clone)]
pub struct ItemLocator {
    client: Arc<dyn VaultClient>,
    diagnostics: Arc<dyn Diagnostics>,
    scope: StoreScope,
}

impl ItemLocator {
    pub fn new(
        client: Arc<dyn VaultClient>,
        diagnostics: Arc<dyn Diagnostics>,
        scope: StoreScope,
    ) -> Self {
        Self {
            client,
            diagnostics,
            scope,
        }
    }

    pub fn client(&self) -> &dyn VaultClient {
        self.client.as_ref()
    }

    pub fn diagnostics(&self) -> &dyn Diagnostics {
        self.diagnostics.as_ref()
    }

    /// Sync, then fetch the item `reference` points at.
    pub fn resolve(&self, reference: &Reference) -> Result<Item> {
        if reference.is_empty() {
            return Err(BwStateError::InvalidReference(String::new()));
        }

        self.client.sync()?;

        match reference {
            Reference::ById(id) => self.client.get_item(id),
            Reference::ByName(name) => {
                let query = self.scope.query(name);
                if query.is_too_broad() {
                    self.diagnostics.too_broad_query("state", name);
                }
                self.client.find_item(&query)
            }
            Reference::Empty => Err(BwStateError::InvalidReference(String::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::diagnostics::NoopDiagnostics;
    use crate::vault::MemoryVault;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Diagnostics for Recorder {
        fn too_broad_query(&self, subject: &str, item_name: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{subject}:{item_name}"));
        }
    }

    fn vault_with(name: &str, folder: Option<&str>) -> MemoryVault {
        let vault = MemoryVault::new();
        vault.insert_item(Item {
            id: "item-1".into(),
            name: name.into(),
            folder_id: folder.map(String::from),
            ..Item::default()
        });
        vault
    }

    #[test]
    fn resolves_by_id_after_sync() {
        let vault = vault_with("prod-infra", None);
        let locator = ItemLocator::new(
            Arc::new(vault.clone()),
            Arc::new(NoopDiagnostics),
            StoreScope::default(),
        );
        let item = locator.resolve(&Reference::ById("item-1".into())).unwrap();
        assert_eq!(item.name, "prod-infra");
        assert_eq!(vault.sync_count(), 1);
    }

    #[test]
    fn unscoped_name_lookup_warns_but_succeeds() {
        let recorder = Arc::new(Recorder::default());
        let locator = ItemLocator::new(
            Arc::new(vault_with("prod-infra", None)),
            recorder.clone(),
            StoreScope::default(),
        );
        locator
            .resolve(&Reference::ByName("prod-infra".into()))
            .unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), ["state:prod-infra"]);
    }

    #[test]
    fn scoped_name_lookup_does_not_warn() {
        let recorder = Arc::new(Recorder::default());
        let locator = ItemLocator::new(
            Arc::new(vault_with("prod-infra", Some("f1"))),
            recorder.clone(),
            StoreScope {
                folder_id: Some("f1".into()),
                ..StoreScope::default()
            },
        );
        locator
            .resolve(&Reference::ByName("prod-infra".into()))
            .unwrap();
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn empty_reference_is_invalid() {
        let locator = ItemLocator::new(
            Arc::new(MemoryVault::new()),
            Arc::new(NoopDiagnostics),
            StoreScope::default(),
        );
        let err = locator.resolve(&Reference::Empty).unwrap_err();
        assert!(matches!(err, BwStateError::InvalidReference(_)));
    }
}
