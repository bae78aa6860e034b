//! Item and attachment types as returned by the vault CLI.
//!
//! The CLI emits camelCase JSON and uses `null` for empty collections,
//! so every list field goes through `null_as_default`.  Organization and
//! folder ids stay `Option<String>` so "unset" is distinguishable from
//! an empty value.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{BwStateError, Result};

/// A single vault entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,

    #[serde(default)]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub folder_id: Option<String>,

    #[serde(default, rename = "type")]
    pub item_type: u8,

    #[serde(default)]
    pub reprompt: u8,

    pub name: String,

    #[serde(default)]
    pub favorite: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<ItemField>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub login: Login,

    #[serde(default, deserialize_with = "null_as_default")]
    pub collection_ids: Vec<String>,

    #[serde(default, rename = "attachments", deserialize_with = "null_as_default")]
    pub attachments: Vec<AttachmentReference>,

    #[serde(default)]
    pub revision_date: Option<DateTime<Utc>>,
}

impl Item {
    /// Look up a custom field by name.  The first match wins.
    pub fn field(&self, name: &str) -> Option<&ItemField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All attachments carrying exactly the given file name.
    pub fn attachments_named<'a>(
        &'a self,
        file_name: &'a str,
    ) -> impl Iterator<Item = &'a AttachmentReference> + 'a {
        self.attachments
            .iter()
            .filter(move |a| a.file_name == file_name)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// The login record of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Login {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uris: Vec<LoginUri>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub totp: Option<String>,
}

impl Login {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }

    pub fn totp(&self) -> &str {
        self.totp.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginUri {
    #[serde(default, rename = "match")]
    pub match_type: Option<u8>,

    #[serde(default)]
    pub uri: String,
}

/// A named custom field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemField {
    pub name: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default, rename = "type")]
    pub field_type: u8,

    #[serde(default)]
    pub linked_id: Option<serde_json::Value>,
}

impl ItemField {
    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }
}

/// Reference to an attachment of an item.  Immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentReference {
    pub id: String,

    pub file_name: String,

    #[serde(default)]
    pub size: String,

    #[serde(default)]
    pub url: String,
}

/// Lock state reported by `bw status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unauthenticated,
    Locked,
    Unlocked,
}

impl Status {
    /// Only an unlocked vault can serve requests.
    pub fn is_usable(self) -> bool {
        self == Status::Unlocked
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unauthenticated => "unauthenticated",
            Status::Locked => "locked",
            Status::Unlocked => "unlocked",
        };
        f.write_str(s)
    }
}

/// Parse the item JSON printed by the vault CLI.
pub fn parse_item(raw: &[u8]) -> Result<Item> {
    serde_json::from_slice(raw)
        .map_err(|e| BwStateError::ExternalCallFailure(format!("malformed item JSON: {e}")))
}

/// Parse the item list JSON printed by the vault CLI.
pub fn parse_items(raw: &[u8]) -> Result<Vec<Item>> {
    serde_json::from_slice(raw)
        .map_err(|e| BwStateError::ExternalCallFailure(format!("malformed item list JSON: {e}")))
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM_JSON: &str = r#"{
        "object": "item",
        "id": "5f2c1f6a-7d8e-4b7a-9a51-0c1d2e3f4a5b",
        "organizationId": null,
        "folderId": "0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d",
        "type": 1,
        "reprompt": 0,
        "name": "prod-infra",
        "favorite": true,
        "fields": [
            {"name": "region", "value": "eu-west-1", "type": 0, "linkedId": null},
            {"name": "region", "value": "us-east-1", "type": 0, "linkedId": null}
        ],
        "login": {"uris": null, "username": "deploy", "password": "s3cret", "totp": null},
        "collectionIds": [],
        "attachments": [
            {"id": "a1", "fileName": "terraform.lock.json", "size": "120", "url": "https://x/a1"}
        ],
        "revisionDate": "2024-03-01T10:00:00.000Z"
    }"#;

    #[test]
    fn parses_cli_item_json() {
        let item = parse_item(ITEM_JSON.as_bytes()).unwrap();
        assert_eq!(item.name, "prod-infra");
        assert_eq!(item.organization_id, None);
        assert_eq!(
            item.folder_id.as_deref(),
            Some("0a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d")
        );
        assert!(item.login.uris.is_empty());
        assert_eq!(item.login.password(), "s3cret");
        assert_eq!(item.login.totp(), "");
        assert_eq!(item.attachments.len(), 1);
        assert_eq!(item.attachments[0].file_name, "terraform.lock.json");
    }

    #[test]
    fn null_fields_and_missing_login_become_empty() {
        let item = parse_item(br#"{"id":"x","name":"note","fields":null,"login":null}"#).unwrap();
        assert!(item.fields.is_empty());
        assert_eq!(item.login, Login::default());
        assert!(item.attachments.is_empty());
    }

    #[test]
    fn first_custom_field_wins() {
        let item = parse_item(ITEM_JSON.as_bytes()).unwrap();
        assert_eq!(item.field("region").unwrap().value(), "eu-west-1");
        assert!(item.field("missing").is_none());
    }

    #[test]
    fn malformed_json_is_an_external_call_failure() {
        let err = parse_items(b"not json").unwrap_err();
        assert!(matches!(err, BwStateError::ExternalCallFailure(_)));
    }

    #[test]
    fn status_parses_lowercase() {
        let status: Status = serde_json::from_str("\"unlocked\"").unwrap();
        assert!(status.is_usable());
        let status: Status = serde_json::from_str("\"locked\"").unwrap();
        assert!(!status.is_usable());
        assert_eq!(status.to_string(), "locked");
    }
}
