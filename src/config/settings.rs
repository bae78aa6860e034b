use serde::{Deserialize, Serialize};

use crate::errors::{BwStateError, Result};
use crate::store::{Reference, RetentionPolicy, StoreScope};
use crate::variables::{non_empty, validate_uuid, ConfigVariables};

/// Default port of the local backend server.
pub const DEFAULT_PORT: u16 = 26394;

/// Default vault CLI executable.
pub const DEFAULT_BITWARDEN_EXECUTABLE: &str = "bw";

/// Default terraform executable.
pub const DEFAULT_TERRAFORM_EXECUTABLE: &str = "terraform";

/// One configuration layer, as read from `config.toml` or `.bwstate.toml`
/// or built from command-line flags.
///
/// Every scalar is optional so layers can be merged; the accessors on
/// `Config` apply the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `[[variable]]` entries.
    #[serde(default, skip_serializing_if = "ConfigVariables::is_empty")]
    pub variable: ConfigVariables,

    #[serde(default)]
    pub state: StateSettings,

    #[serde(default)]
    pub bitwarden: BitwardenSettings,

    #[serde(default)]
    pub terraform: TerraformSettings,

    #[serde(default)]
    pub backend: BackendSettings,
}

/// `[state]`: where the state lives and how much history is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// Revisions kept per item (default: 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_revisions: Option<u16>,

    /// `literal` (default) or `strict`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionPolicy>,
}

/// `[bitwarden]`: how to reach the vault CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BitwardenSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Prompt for the master password when the vault is locked
    /// (default: true).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_if_required: Option<bool>,
}

/// `[terraform]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TerraformSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
}

/// `[backend]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

// ── Merge helpers ────────────────────────────────────────────────────

fn pick_str(left: Option<String>, right: Option<String>) -> Option<String> {
    left.filter(|v| !v.is_empty()).or(right)
}

fn pick_nonzero(left: Option<u16>, right: Option<u16>) -> Option<u16> {
    left.filter(|v| *v != 0).or(right)
}

// ── Implementation ───────────────────────────────────────────────────

impl StateSettings {
    fn locates_item(&self) -> bool {
        non_empty(&self.item_id).is_some() || non_empty(&self.item_name).is_some()
    }

    /// The item id and name travel together: a layer naming the item
    /// either way hides both of the lower layer's.
    fn merge(self, other: Self) -> Self {
        let (item_id, item_name) = if self.locates_item() {
            (self.item_id, self.item_name)
        } else {
            (other.item_id, other.item_name)
        };
        Self {
            item_id,
            item_name,
            organization_id: pick_str(self.organization_id, other.organization_id),
            collection_id: pick_str(self.collection_id, other.collection_id),
            folder_id: pick_str(self.folder_id, other.folder_id),
            max_revisions: pick_nonzero(self.max_revisions, other.max_revisions),
            retention: self.retention.or(other.retention),
        }
    }
}

impl BitwardenSettings {
    fn merge(self, other: Self) -> Self {
        Self {
            executable: pick_str(self.executable, other.executable),
            session: pick_str(self.session, other.session),
            unlock_if_required: self.unlock_if_required.or(other.unlock_if_required),
        }
    }
}

impl Config {
    /// Left-biased merge: values set in `self` win, `other` fills gaps.
    /// Variables are concatenated and deduplicated by label.
    pub fn merge(self, other: Config) -> Config {
        Config {
            variable: self.variable.merge(&other.variable),
            state: self.state.merge(other.state),
            bitwarden: self.bitwarden.merge(other.bitwarden),
            terraform: TerraformSettings {
                executable: pick_str(self.terraform.executable, other.terraform.executable),
            },
            backend: BackendSettings {
                port: pick_nonzero(self.backend.port, other.backend.port),
            },
        }
    }

    /// Check the variables and the state location.
    pub fn validate(&self) -> Result<()> {
        self.variable.validate()?;

        let state = &self.state;
        validate_uuid("state", "item_id", non_empty(&state.item_id))?;
        validate_uuid("state", "organization_id", non_empty(&state.organization_id))?;
        validate_uuid("state", "collection_id", non_empty(&state.collection_id))?;
        validate_uuid("state", "folder_id", non_empty(&state.folder_id))?;

        if non_empty(&state.item_id).is_some() && non_empty(&state.item_name).is_some() {
            return Err(BwStateError::ValidationError(
                "state: only one of item_id and item_name can be used".into(),
            ));
        }
        Ok(())
    }

    /// The configured state item as a `Reference`.
    pub fn state_reference(&self) -> Result<Reference> {
        match (non_empty(&self.state.item_id), non_empty(&self.state.item_name)) {
            (Some(id), None) => Ok(Reference::ById(id.to_string())),
            (None, Some(name)) => Ok(Reference::ByName(name.to_string())),
            (Some(_), Some(_)) => Err(BwStateError::ValidationError(
                "state: only one of item_id and item_name can be used".into(),
            )),
            (None, None) => Err(BwStateError::ValidationError(
                "no state item configured: set state.item_id or state.item_name \
                 (or --item-id / --item-name)"
                    .into(),
            )),
        }
    }

    /// Filters applied when the state item is looked up by name.
    pub fn store_scope(&self) -> StoreScope {
        StoreScope {
            organization_id: non_empty(&self.state.organization_id).map(String::from),
            collection_id: non_empty(&self.state.collection_id).map(String::from),
            folder_id: non_empty(&self.state.folder_id).map(String::from),
        }
    }

    pub fn max_revisions(&self) -> u16 {
        self.state
            .max_revisions
            .filter(|v| *v != 0)
            .unwrap_or(crate::store::state::DEFAULT_MAX_REVISIONS)
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.state.retention.unwrap_or_default()
    }

    pub fn bitwarden_executable(&self) -> &str {
        non_empty(&self.bitwarden.executable).unwrap_or(DEFAULT_BITWARDEN_EXECUTABLE)
    }

    pub fn bitwarden_session(&self) -> Option<&str> {
        non_empty(&self.bitwarden.session)
    }

    pub fn unlock_if_required(&self) -> bool {
        self.bitwarden.unlock_if_required.unwrap_or(true)
    }

    pub fn terraform_executable(&self) -> &str {
        non_empty(&self.terraform.executable).unwrap_or(DEFAULT_TERRAFORM_EXECUTABLE)
    }

    pub fn port(&self) -> u16 {
        self.backend.port.filter(|p| *p != 0).unwrap_or(DEFAULT_PORT)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::ConfigVariable;

    const UUID: &str = "0b6f1c2d-3e4f-4a5b-8c6d-7e8f9a0b1c2d";

    #[test]
    fn defaults_apply_to_an_empty_config() {
        let c = Config::default();
        assert_eq!(c.port(), 26394);
        assert_eq!(c.max_revisions(), 2);
        assert_eq!(c.retention(), RetentionPolicy::Literal);
        assert_eq!(c.bitwarden_executable(), "bw");
        assert_eq!(c.terraform_executable(), "terraform");
        assert!(c.unlock_if_required());
        assert!(c.bitwarden_session().is_none());
    }

    #[test]
    fn merge_is_left_biased_and_skips_empty_values() {
        let left = Config {
            state: StateSettings {
                item_name: Some(String::new()),
                max_revisions: Some(0),
                ..StateSettings::default()
            },
            backend: BackendSettings { port: Some(8080) },
            bitwarden: BitwardenSettings {
                unlock_if_required: Some(false),
                ..BitwardenSettings::default()
            },
            ..Config::default()
        };
        let right = Config {
            state: StateSettings {
                item_name: Some("prod-infra".into()),
                max_revisions: Some(5),
                ..StateSettings::default()
            },
            backend: BackendSettings { port: Some(9090) },
            bitwarden: BitwardenSettings {
                unlock_if_required: Some(true),
                executable: Some("/opt/bw".into()),
                ..BitwardenSettings::default()
            },
            ..Config::default()
        };

        let merged = left.merge(right);
        assert_eq!(merged.state.item_name.as_deref(), Some("prod-infra"));
        assert_eq!(merged.max_revisions(), 5);
        assert_eq!(merged.port(), 8080);
        assert!(!merged.unlock_if_required());
        assert_eq!(merged.bitwarden_executable(), "/opt/bw");
    }

    #[test]
    fn item_location_is_taken_from_one_layer() {
        let flags = Config {
            state: StateSettings {
                item_id: Some(UUID.into()),
                ..StateSettings::default()
            },
            ..Config::default()
        };
        let project = Config {
            state: StateSettings {
                item_name: Some("prod-infra".into()),
                folder_id: Some(UUID.into()),
                ..StateSettings::default()
            },
            ..Config::default()
        };
        let merged = flags.merge(project);
        assert_eq!(merged.state_reference().unwrap(), Reference::ById(UUID.into()));
        assert_eq!(merged.state.folder_id.as_deref(), Some(UUID));
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn merge_deduplicates_variables() {
        let var = |label: &str, name: &str| ConfigVariable {
            label: label.into(),
            name: Some(name.into()),
            ..ConfigVariable::default()
        };
        let left = Config {
            variable: ConfigVariables::new(vec![var("a", "one")]),
            ..Config::default()
        };
        let right = Config {
            variable: ConfigVariables::new(vec![var("a", "two"), var("b", "three")]),
            ..Config::default()
        };
        let merged = left.merge(right);
        assert_eq!(merged.variable.len(), 2);
        assert_eq!(merged.variable.lookup("a").unwrap().name.as_deref(), Some("one"));
    }

    #[test]
    fn state_reference_requires_exactly_one_location() {
        let mut c = Config::default();
        assert!(c.state_reference().is_err());

        c.state.item_name = Some("prod-infra".into());
        assert_eq!(
            c.state_reference().unwrap(),
            Reference::ByName("prod-infra".into())
        );

        c.state.item_id = Some(UUID.into());
        assert!(c.state_reference().is_err());
        assert!(c.validate().is_err());

        c.state.item_name = None;
        assert_eq!(c.state_reference().unwrap(), Reference::ById(UUID.into()));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_rejects_malformed_state_ids() {
        let c = Config {
            state: StateSettings {
                folder_id: Some("folder".into()),
                ..StateSettings::default()
            },
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn parses_all_sections_from_toml() {
        let c: Config = toml::from_str(
            r#"
[state]
item_name = "prod-infra"
max_revisions = 4
retention = "strict"

[bitwarden]
executable = "/usr/local/bin/bw"
unlock_if_required = false

[terraform]
executable = "tofu"

[backend]
port = 4000

[[variable]]
label = "db_password"
name = "prod-db"
"#,
        )
        .unwrap();
        assert_eq!(c.max_revisions(), 4);
        assert_eq!(c.retention(), RetentionPolicy::Strict);
        assert_eq!(c.terraform_executable(), "tofu");
        assert_eq!(c.port(), 4000);
        assert!(!c.unlock_if_required());
        assert_eq!(c.variable.len(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("[state]\nitem = \"x\"\n");
        assert!(result.is_err());
    }
}
