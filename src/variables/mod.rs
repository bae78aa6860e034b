//! Named configuration variables that resolve to vault secrets.
//!
//! A variable points at an item by id, by a scoped name query, or at
//! another variable (`ref`).  The resolved values end up as `TF_VAR_*`
//! in the environment of the wrapped tool.

pub mod resolver;

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{BwStateError, Result};
use crate::vault::ItemQuery;

pub use resolver::{select_field, VariableResolver};

/// Field selected when a variable names none.
pub const DEFAULT_FIELD: &str = "password";

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new("^[a-z_]+$").unwrap_or_else(|e| unreachable!("label pattern is valid: {e}"))
    })
}

/// Reject values that are set but not UUID-shaped.
pub(crate) fn validate_uuid(owner: &str, attribute: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if uuid::Uuid::parse_str(v).is_err() => Err(BwStateError::ValidationError(
            format!("{owner}: illegal {attribute}: '{v}'"),
        )),
        _ => Ok(()),
    }
}

/// `Some` only for non-empty strings.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// One `[[variable]]` entry of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigVariable {
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Where a variable's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableSource<'a> {
    ItemId(&'a str),
    Query(ItemQuery),
    Ref(&'a str),
}

impl ConfigVariable {
    /// The selected field, `password` when unset.
    pub fn field(&self) -> &str {
        non_empty(&self.field).unwrap_or(DEFAULT_FIELD)
    }

    /// Exactly one of `item_id`, `name` and `ref` must be set.
    pub fn source(&self) -> Result<VariableSource<'_>> {
        let set = [
            non_empty(&self.item_id),
            non_empty(&self.name),
            non_empty(&self.reference),
        ];
        match set {
            [Some(id), None, None] => Ok(VariableSource::ItemId(id)),
            [None, Some(name), None] => Ok(VariableSource::Query(ItemQuery {
                name: name.to_string(),
                organization_id: non_empty(&self.organization_id).map(String::from),
                collection_id: non_empty(&self.collection_id).map(String::from),
                folder_id: non_empty(&self.folder_id).map(String::from),
            })),
            [None, None, Some(reference)] => Ok(VariableSource::Ref(reference)),
            [None, None, None] => Err(BwStateError::ValidationError(format!(
                "{}: one attribute of name, item_id or ref is required",
                self.label
            ))),
            _ => Err(BwStateError::ValidationError(format!(
                "{}: only one of the attributes name, item_id and ref can be used",
                self.label
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(BwStateError::ValidationError(
                "variable without label".into(),
            ));
        }
        if !label_regex().is_match(&self.label) {
            return Err(BwStateError::ValidationError(format!(
                "illegal variable label: '{}' (only a-z and _ are allowed)",
                self.label
            )));
        }

        validate_uuid(&self.label, "item_id", non_empty(&self.item_id))?;
        validate_uuid(&self.label, "organization_id", non_empty(&self.organization_id))?;
        validate_uuid(&self.label, "collection_id", non_empty(&self.collection_id))?;
        validate_uuid(&self.label, "folder_id", non_empty(&self.folder_id))?;

        if let Some(reference) = non_empty(&self.reference) {
            if !label_regex().is_match(reference) {
                return Err(BwStateError::ValidationError(format!(
                    "{}: illegal ref: '{reference}'",
                    self.label
                )));
            }
        }

        self.source().map(|_| ())
    }

    /// Short description of the source for listings.
    pub fn describe_source(&self) -> String {
        match self.source() {
            Ok(VariableSource::ItemId(id)) => format!("item id {id}"),
            Ok(VariableSource::Query(q)) => q.to_string(),
            Ok(VariableSource::Ref(r)) => format!("ref {r}"),
            Err(e) => format!("invalid ({e})"),
        }
    }
}

/// Ordered, label-unique list of variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigVariables(Vec<ConfigVariable>);

impl ConfigVariables {
    pub fn new(variables: Vec<ConfigVariable>) -> Self {
        Self(variables)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigVariable> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lookup(&self, label: &str) -> Option<&ConfigVariable> {
        self.0.iter().find(|v| v.label == label)
    }

    /// Validate every variable and reject duplicate labels.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.0.len());
        for v in &self.0 {
            v.validate()?;
            if !seen.insert(v.label.as_str()) {
                return Err(BwStateError::ValidationError(format!(
                    "variable '{}' is defined more than once",
                    v.label
                )));
            }
        }
        Ok(())
    }

    /// `self` first, then `other`; the first occurrence of a label wins.
    pub fn merge(&self, other: &ConfigVariables) -> ConfigVariables {
        let mut seen = HashSet::with_capacity(self.0.len() + other.0.len());
        let merged = self
            .0
            .iter()
            .chain(other.0.iter())
            .filter(|v| seen.insert(v.label.clone()))
            .cloned()
            .collect();
        ConfigVariables(merged)
    }
}

impl<'a> IntoIterator for &'a ConfigVariables {
    type Item = &'a ConfigVariable;
    type IntoIter = std::slice::Iter<'a, ConfigVariable>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
