//! Scoped item queries and attachment selectors.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use regex::Regex;

use crate::errors::{BwStateError, Result};

use super::client::VaultClient;
use super::model::Item;

/// Search for one item by exact name, optionally limited to an
/// organization, collection and/or folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub name: String,
    pub organization_id: Option<String>,
    pub collection_id: Option<String>,
    pub folder_id: Option<String>,
}

impl ItemQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// `true` when none of the scope filters is set, so the search runs
    /// across the whole vault.
    pub fn is_too_broad(&self) -> bool {
        self.organization_id.is_none() && self.collection_id.is_none() && self.folder_id.is_none()
    }

    /// Pick the single item whose name matches exactly.
    ///
    /// The vault's search is a substring match, so the candidates are
    /// filtered here.  No match is `NotFound`, more than one is
    /// `AmbiguousMatch`.
    pub fn select(&self, candidates: Vec<Item>) -> Result<Item> {
        let mut matches = candidates.into_iter().filter(|i| i.name == self.name);
        let first = matches
            .next()
            .ok_or_else(|| BwStateError::NotFound(format!("no item matches {self}")))?;
        if matches.next().is_some() {
            return Err(BwStateError::AmbiguousMatch(self.to_string()));
        }
        Ok(first)
    }

    /// Whether an item satisfies the scope filters (not the name).
    pub fn in_scope(&self, item: &Item) -> bool {
        if let Some(org) = &self.organization_id {
            if item.organization_id.as_ref() != Some(org) {
                return false;
            }
        }
        if let Some(folder) = &self.folder_id {
            if item.folder_id.as_ref() != Some(folder) {
                return false;
            }
        }
        if let Some(collection) = &self.collection_id {
            if !item.collection_ids.contains(collection) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for ItemQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name '{}'", self.name)?;
        if let Some(v) = &self.organization_id {
            write!(f, " in organization {v}")?;
        }
        if let Some(v) = &self.collection_id {
            write!(f, " in collection {v}")?;
        }
        if let Some(v) = &self.folder_id {
            write!(f, " in folder {v}")?;
        }
        Ok(())
    }
}

/// Selects attachments of an item by file name and exposes their
/// content under `name`.
#[derive(Debug, Clone)]
pub struct AttachmentQuery {
    pub name: String,
    pub filename_matches: Regex,
    pub base64_encode: bool,
    pub unique: bool,
}

impl AttachmentQuery {
    /// Parse `<name>=<regex>` as given on the command line.
    pub fn parse(spec: &str, base64_encode: bool, unique: bool) -> Result<Self> {
        let (name, pattern) = spec.split_once('=').ok_or_else(|| {
            BwStateError::ValidationError(format!(
                "attachment query '{spec}' must look like <name>=<filename regex>"
            ))
        })?;
        if name.is_empty() {
            return Err(BwStateError::ValidationError(
                "empty attachment query name".into(),
            ));
        }
        if pattern.is_empty() {
            return Err(BwStateError::ValidationError(format!(
                "{name}: empty attachment filename pattern"
            )));
        }
        let filename_matches = Regex::new(pattern).map_err(|e| {
            BwStateError::ValidationError(format!("{name}: illegal filename pattern: {e}"))
        })?;
        Ok(Self {
            name: name.to_string(),
            filename_matches,
            base64_encode,
            unique,
        })
    }
}

/// Fetch every attachment of `item` matched by one of `queries`.
///
/// A later match overwrites an earlier one under the same name unless
/// the query is `unique`, in which case a second match is an error.
pub fn resolve_attachments(
    client: &dyn VaultClient,
    item: &Item,
    queries: &[AttachmentQuery],
) -> Result<BTreeMap<String, String>> {
    let mut result = BTreeMap::new();
    for attachment in &item.attachments {
        for q in queries {
            if !q.filename_matches.is_match(&attachment.file_name) {
                continue;
            }
            let body = client.get_attachment(item, &attachment.id)?;
            let value = if q.base64_encode {
                base64::engine::general_purpose::STANDARD.encode(&body)
            } else {
                String::from_utf8_lossy(&body).into_owned()
            };
            if result.contains_key(&q.name) && q.unique {
                return Err(BwStateError::AmbiguousMatch(format!(
                    "attachments of {item} for '{}' ({})",
                    q.name, q.filename_matches
                )));
            }
            result.insert(q.name.clone(), value);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str) -> Item {
        Item {
            id: id.into(),
            name: name.into(),
            ..Item::default()
        }
    }

    #[test]
    fn select_filters_substring_matches() {
        let q = ItemQuery::by_name("prod");
        let picked = q
            .select(vec![item("1", "prod-infra"), item("2", "prod")])
            .unwrap();
        assert_eq!(picked.id, "2");
    }

    #[test]
    fn select_reports_missing_and_ambiguous() {
        let q = ItemQuery::by_name("prod");
        assert!(q.select(vec![item("1", "dev")]).unwrap_err().is_not_found());

        let err = q
            .select(vec![item("1", "prod"), item("2", "prod")])
            .unwrap_err();
        assert!(matches!(err, BwStateError::AmbiguousMatch(_)));
    }

    #[test]
    fn too_broad_without_scope_filters() {
        let mut q = ItemQuery::by_name("prod");
        assert!(q.is_too_broad());
        q.folder_id = Some("f".into());
        assert!(!q.is_too_broad());
    }

    #[test]
    fn scope_filters_apply_to_items() {
        let mut i = item("1", "prod");
        i.collection_ids = vec!["c1".into()];
        let mut q = ItemQuery::by_name("prod");
        q.collection_id = Some("c1".into());
        assert!(q.in_scope(&i));
        q.organization_id = Some("o1".into());
        assert!(!q.in_scope(&i));
    }

    #[test]
    fn attachment_query_parsing() {
        let q = AttachmentQuery::parse("key=^id_rsa$", true, false).unwrap();
        assert_eq!(q.name, "key");
        assert!(q.filename_matches.is_match("id_rsa"));
        assert!(AttachmentQuery::parse("no-equals", false, false).is_err());
        assert!(AttachmentQuery::parse("=x", false, false).is_err());
        assert!(AttachmentQuery::parse("k=(", false, false).is_err());
    }
}
