//! Integration tests for variable configuration and resolution.

use std::sync::Arc;

use bwstate::config::Config;
use bwstate::diagnostics::NoopDiagnostics;
use bwstate::errors::BwStateError;
use bwstate::variables::{ConfigVariable, ConfigVariables, VariableResolver};
use bwstate::vault::{Item, ItemField, Login, LoginUri, MemoryVault};

const FOLDER: &str = "3a4b5c6d-7e8f-4a0b-9c1d-2e3f4a5b6c7d";
const DB_ID: &str = "11111111-2222-4333-8444-555555555555";

/// Helper: a vault with a database login and an API token item.
fn vault() -> MemoryVault {
    let vault = MemoryVault::new();
    vault.insert_item(Item {
        id: DB_ID.into(),
        name: "prod-db".into(),
        folder_id: Some(FOLDER.into()),
        login: Login {
            username: Some("admin".into()),
            password: Some("hunter2".into()),
            uris: vec![LoginUri {
                match_type: None,
                uri: "postgres://db.internal:5432".into(),
            }],
            ..Login::default()
        },
        ..Item::default()
    });
    vault.insert_item(Item {
        id: "api-token-id".into(),
        name: "api-token".into(),
        folder_id: Some(FOLDER.into()),
        fields: vec![ItemField {
            name: "token".into(),
            value: Some("tok-123".into()),
            ..ItemField::default()
        }],
        ..Item::default()
    });
    vault
}

fn resolver(vault: &MemoryVault) -> VariableResolver {
    VariableResolver::new(Arc::new(vault.clone()), Arc::new(NoopDiagnostics))
}

fn config(toml_src: &str) -> Config {
    let config: Config = toml::from_str(toml_src).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn resolves_a_full_configuration() {
    let config = config(&format!(
        r#"
[[variable]]
label = "db_password"
name = "prod-db"
folder_id = "{FOLDER}"

[[variable]]
label = "db_user"
item_id = "{DB_ID}"
field = "username"

[[variable]]
label = "db_alias"
ref = "db_password"

[[variable]]
label = "api_token"
name = "api-token"
folder_id = "{FOLDER}"
field = "token"
"#
    ));

    let values = resolver(&vault()).resolve(&config.variable).unwrap();
    assert_eq!(values["db_password"], "hunter2");
    assert_eq!(values["db_user"], "admin");
    // A ref yields whatever its target yields.
    assert_eq!(values["db_alias"], "hunter2");
    assert_eq!(values["api_token"], "tok-123");
}

#[test]
fn uri_selects_the_first_login_uri() {
    let vars = ConfigVariables::new(vec![ConfigVariable {
        label: "db_url".into(),
        item_id: Some(DB_ID.into()),
        field: Some("uri".into()),
        ..ConfigVariable::default()
    }]);
    let values = resolver(&vault()).resolve(&vars).unwrap();
    assert_eq!(values["db_url"], "postgres://db.internal:5432");
}

#[test]
fn uri_of_an_item_without_uris_is_empty() {
    let vault = MemoryVault::new();
    vault.insert_item(Item {
        id: "bare".into(),
        name: "bare".into(),
        ..Item::default()
    });
    let vars = ConfigVariables::new(vec![ConfigVariable {
        label: "endpoint".into(),
        item_id: Some("bare".into()),
        field: Some("uri".into()),
        ..ConfigVariable::default()
    }]);
    let values = resolver(&vault).resolve(&vars).unwrap();
    assert_eq!(values["endpoint"], "");
}

#[test]
fn dangling_ref_is_unresolvable() {
    let vars = ConfigVariables::new(vec![ConfigVariable {
        label: "alias".into(),
        reference: Some("missing".into()),
        ..ConfigVariable::default()
    }]);
    let err = resolver(&vault()).resolve(&vars).unwrap_err();
    match err {
        BwStateError::Variable { label, source } => {
            assert_eq!(label, "alias");
            assert!(matches!(
                *source,
                BwStateError::UnresolvableRef { ref reference } if reference == "missing"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn longer_cycles_are_detected() {
    let chain = |label: &str, target: &str| ConfigVariable {
        label: label.into(),
        reference: Some(target.into()),
        ..ConfigVariable::default()
    };
    let vars = ConfigVariables::new(vec![chain("a", "b"), chain("b", "c"), chain("c", "a")]);
    let err = resolver(&vault()).resolve(&vars).unwrap_err();
    assert!(err.to_string().contains("a -> b -> c -> a"), "{err}");
}

#[test]
fn unknown_custom_field_names_the_variable() {
    let vars = ConfigVariables::new(vec![ConfigVariable {
        label: "db_colour".into(),
        item_id: Some(DB_ID.into()),
        field: Some("colour".into()),
        ..ConfigVariable::default()
    }]);
    let err = resolver(&vault()).resolve(&vars).unwrap_err();
    assert!(err.to_string().contains("db_colour"));
    match err {
        BwStateError::Variable { source, .. } => {
            assert!(matches!(*source, BwStateError::UnknownField(_)))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn ambiguous_names_fail() {
    let vault = vault();
    vault.insert_item(Item {
        id: "second-db".into(),
        name: "prod-db".into(),
        folder_id: Some(FOLDER.into()),
        ..Item::default()
    });
    let vars = ConfigVariables::new(vec![ConfigVariable {
        label: "db_password".into(),
        name: Some("prod-db".into()),
        folder_id: Some(FOLDER.into()),
        ..ConfigVariable::default()
    }]);
    let err = resolver(&vault).resolve(&vars).unwrap_err();
    match err {
        BwStateError::Variable { source, .. } => {
            assert!(matches!(*source, BwStateError::AmbiguousMatch(_)))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn merge_keeps_first_label_occurrence() {
    let var = |label: &str, name: &str| ConfigVariable {
        label: label.into(),
        name: Some(name.into()),
        ..ConfigVariable::default()
    };
    let left = ConfigVariables::new(vec![var("a", "a-item"), var("b", "b-item")]);
    let right = ConfigVariables::new(vec![var("b", "b-other"), var("c", "c-item")]);

    let merged = left.merge(&right);
    let order: Vec<(&str, &str)> = merged
        .iter()
        .map(|v| (v.label.as_str(), v.name.as_deref().unwrap()))
        .collect();
    assert_eq!(order, [("a", "a-item"), ("b", "b-item"), ("c", "c-item")]);
}

#[test]
fn invalid_configurations_are_rejected() {
    for src in [
        // Two sources.
        "[[variable]]\nlabel = \"x\"\nname = \"a\"\nref = \"y\"\n",
        // No source.
        "[[variable]]\nlabel = \"x\"\n",
        // Bad label.
        "[[variable]]\nlabel = \"X-1\"\nname = \"a\"\n",
        // Bad id.
        "[[variable]]\nlabel = \"x\"\nitem_id = \"42\"\n",
    ] {
        let config: Config = toml::from_str(src).unwrap();
        assert!(
            matches!(config.validate(), Err(BwStateError::ValidationError(_))),
            "{src}"
        );
    }
}
