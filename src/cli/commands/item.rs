//! `bwstate item` / `bwstate items` — read-only lookups of vault items,
//! printed as JSON.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::cli::{open_vault, Cli};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::errors::{BwStateError, Result};
use crate::variables::validate_uuid;
use crate::vault::query::resolve_attachments;
use crate::vault::{AttachmentQuery, Item, ItemQuery, LoginUri, VaultClient};

/// Organization, collection and folder filters shared by both lookups.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ScopeArgs {
    /// Only search this organization
    #[arg(long)]
    pub organization_id: Option<String>,

    /// Only search this collection
    #[arg(long)]
    pub collection_id: Option<String>,

    /// Only search this folder
    #[arg(long)]
    pub folder_id: Option<String>,
}

impl ScopeArgs {
    fn validate(&self, subject: &str) -> Result<()> {
        validate_uuid(subject, "organization_id", self.organization_id.as_deref())?;
        validate_uuid(subject, "collection_id", self.collection_id.as_deref())?;
        validate_uuid(subject, "folder_id", self.folder_id.as_deref())
    }

    fn query(&self, name: &str) -> ItemQuery {
        ItemQuery {
            name: name.to_string(),
            organization_id: self.organization_id.clone(),
            collection_id: self.collection_id.clone(),
            folder_id: self.folder_id.clone(),
        }
    }
}

/// Which attachments to inline into the printed items.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct AttachmentArgs {
    /// Include attachments whose file name matches, as <name>=<regex>
    #[arg(long = "attachment", value_name = "NAME=REGEX")]
    pub attachments: Vec<String>,

    /// Base64-encode attachment contents
    #[arg(long)]
    pub base64: bool,

    /// Fail if an attachment query matches more than one file
    #[arg(long)]
    pub unique: bool,
}

impl AttachmentArgs {
    pub fn queries(&self) -> Result<Vec<AttachmentQuery>> {
        self.attachments
            .iter()
            .map(|spec| AttachmentQuery::parse(spec, self.base64, self.unique))
            .collect()
    }
}

/// The printed shape of an item.
#[derive(Debug, Serialize)]
pub struct ItemView {
    pub id: String,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub item_type: u8,
    pub reprompt: u8,
    pub name: String,
    pub username: String,
    pub password: String,
    pub uris: Vec<UriView>,
    pub collection_ids: Vec<String>,
    pub attachments: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct UriView {
    #[serde(rename = "match")]
    pub match_type: Option<u8>,
    pub uri: String,
}

impl ItemView {
    pub fn new(item: &Item, attachments: BTreeMap<String, String>) -> Self {
        Self {
            id: item.id.clone(),
            organization_id: item.organization_id.clone(),
            folder_id: item.folder_id.clone(),
            item_type: item.item_type,
            reprompt: item.reprompt,
            name: item.name.clone(),
            username: item.login.username().to_string(),
            password: item.login.password().to_string(),
            uris: item.login.uris.iter().map(UriView::from).collect(),
            collection_ids: item.collection_ids.clone(),
            attachments,
        }
    }
}

impl From<&LoginUri> for UriView {
    fn from(u: &LoginUri) -> Self {
        Self {
            match_type: u.match_type,
            uri: u.uri.clone(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| BwStateError::SerializationError(e.to_string()))?;
    println!("{json}");
    Ok(())
}

/// Execute the `item` command.
pub fn execute(
    cli: &Cli,
    id: Option<&str>,
    name: Option<&str>,
    scope: &ScopeArgs,
    attachments: &AttachmentArgs,
) -> Result<()> {
    let queries = attachments.queries()?;
    let config = cli.load_config()?;
    let client: Arc<dyn VaultClient> = Arc::new(open_vault(&config)?);

    let view = lookup(client.as_ref(), &TracingDiagnostics, id, name, scope, &queries)?;
    print_json(&view)
}

/// Execute the `items` command.
pub fn execute_search(
    cli: &Cli,
    search: Option<&str>,
    scope: &ScopeArgs,
    attachments: &AttachmentArgs,
) -> Result<()> {
    let queries = attachments.queries()?;
    let config = cli.load_config()?;
    let client: Arc<dyn VaultClient> = Arc::new(open_vault(&config)?);

    let views = search_items(
        client.as_ref(),
        &TracingDiagnostics,
        search.unwrap_or_default(),
        scope,
        &queries,
    )?;
    print_json(&views)
}

/// Find the item and resolve the requested attachments.
pub fn lookup(
    client: &dyn VaultClient,
    diagnostics: &dyn Diagnostics,
    id: Option<&str>,
    name: Option<&str>,
    scope: &ScopeArgs,
    queries: &[AttachmentQuery],
) -> Result<ItemView> {
    scope.validate("item")?;

    client.sync()?;
    let item = match (id, name) {
        (Some(id), None) => client.get_item(id)?,
        (None, Some(name)) => {
            let query = scope.query(name);
            if query.is_too_broad() {
                diagnostics.too_broad_query("item", name);
            }
            client.find_item(&query)?
        }
        _ => {
            return Err(BwStateError::ValidationError(
                "exactly one of --id and --name is required".into(),
            ))
        }
    };

    let attachments = resolve_attachments(client, &item, queries)?;
    Ok(ItemView::new(&item, attachments))
}

/// Every item whose name contains `search` within the scope, each with
/// its attachments resolved.  An empty search without any scope filter
/// lists the whole vault and is reported as too broad.
pub fn search_items(
    client: &dyn VaultClient,
    diagnostics: &dyn Diagnostics,
    search: &str,
    scope: &ScopeArgs,
    queries: &[AttachmentQuery],
) -> Result<Vec<ItemView>> {
    scope.validate("items")?;

    let query = scope.query(search);
    if search.is_empty() && query.is_too_broad() {
        diagnostics.too_broad_query("items", search);
    }

    client.sync()?;
    client
        .list_items(&query)?
        .iter()
        .map(|item| Ok(ItemView::new(item, resolve_attachments(client, item, queries)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::diagnostics::NoopDiagnostics;
    use crate::vault::{Login, MemoryVault};

    const FOLDER: &str = "3a4b5c6d-7e8f-4a0b-9c1d-2e3f4a5b6c7d";

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

    fn queries(specs: &[&str]) -> Vec<AttachmentQuery> {
        specs
            .iter()
            .map(|s| AttachmentQuery::parse(s, false, false).unwrap())
            .collect()
    }

    /// Two deploy keys in the folder and one unrelated item outside it.
    fn vault() -> MemoryVault {
        let vault = MemoryVault::new();
        for (id, name, folder) in [
            ("item-1", "deploy-key-web", Some(FOLDER)),
            ("item-2", "deploy-key-db", Some(FOLDER)),
            ("item-3", "deploy-key-old", None),
            ("item-4", "grafana", Some(FOLDER)),
        ] {
            vault.insert_item(Item {
                id: id.into(),
                name: name.into(),
                folder_id: folder.map(String::from),
                login: Login {
                    username: Some("deploy".into()),
                    password: Some("s3cret".into()),
                    ..Login::default()
                },
                ..Item::default()
            });
            let item = vault.item(id).unwrap();
            vault
                .create_attachment(&item, "id_ed25519", format!("KEY {id}").as_bytes())
                .unwrap();
        }
        vault
    }

    #[test]
    fn lookup_renders_login_and_attachments() {
        let vault = vault();
        let view = lookup(
            &vault,
            &NoopDiagnostics,
            None,
            Some("deploy-key-web"),
            &ScopeArgs::default(),
            &queries(&["key=^id_ed25519$"]),
        )
        .unwrap();

        assert_eq!(view.username, "deploy");
        assert_eq!(view.attachments["key"], "KEY item-1");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], 0);
        assert!(json["organization_id"].is_null());
    }

    #[test]
    fn malformed_scope_ids_are_rejected() {
        let vault = MemoryVault::new();
        let scope = ScopeArgs {
            folder_id: Some("not-a-uuid".into()),
            ..ScopeArgs::default()
        };
        assert!(lookup(&vault, &NoopDiagnostics, None, Some("x"), &scope, &[]).is_err());
        assert!(search_items(&vault, &NoopDiagnostics, "x", &scope, &[]).is_err());
    }

    #[test]
    fn search_returns_every_match_in_scope() {
        let vault = vault();
        let scope = ScopeArgs {
            folder_id: Some(FOLDER.into()),
            ..ScopeArgs::default()
        };
        let diagnostics = Recorder::default();
        let views = search_items(
            &vault,
            &diagnostics,
            "deploy-key",
            &scope,
            &queries(&["key=^id_"]),
        )
        .unwrap();

        let mut found: Vec<(&str, &str)> = views
            .iter()
            .map(|v| (v.name.as_str(), v.attachments["key"].as_str()))
            .collect();
        found.sort();
        assert_eq!(
            found,
            [
                ("deploy-key-db", "KEY item-2"),
                ("deploy-key-web", "KEY item-1")
            ]
        );
        assert!(diagnostics.0.lock().unwrap().is_empty());
        assert_eq!(vault.sync_count(), 1);
    }

    #[test]
    fn search_without_any_limitation_lists_everything_and_warns() {
        let vault = vault();
        let diagnostics = Recorder::default();
        let views =
            search_items(&vault, &diagnostics, "", &ScopeArgs::default(), &[]).unwrap();

        assert_eq!(views.len(), 4);
        assert!(views.iter().all(|v| v.attachments.is_empty()));
        assert_eq!(*diagnostics.0.lock().unwrap(), ["items:"]);
    }

    #[test]
    fn search_with_only_a_search_term_does_not_warn() {
        let vault = vault();
        let diagnostics = Recorder::default();
        let views =
            search_items(&vault, &diagnostics, "grafana", &ScopeArgs::default(), &[]).unwrap();

        assert_eq!(views.len(), 1);
        assert!(diagnostics.0.lock().unwrap().is_empty());
    }

    #[test]
    fn search_without_matches_is_an_empty_list() {
        let views = search_items(
            &vault(),
            &NoopDiagnostics,
            "nothing-like-this",
            &ScopeArgs::default(),
            &[],
        )
        .unwrap();
        assert!(views.is_empty());
        assert_eq!(serde_json::to_string(&views).unwrap(), "[]");
    }

    #[test]
    fn unique_attachment_query_fails_the_search() {
        let vault = vault();
        let item = vault.item("item-4").unwrap();
        vault.create_attachment(&item, "id_rsa", b"OTHER").unwrap();

        let unique = vec![AttachmentQuery::parse("key=^id_", false, true).unwrap()];
        assert!(search_items(&vault, &NoopDiagnostics, "grafana", &ScopeArgs::default(), &unique)
            .is_err());
    }
}
