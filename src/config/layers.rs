//! Loading and merging the configuration layers.
//!
//! The user layer is read first and turned into a read-only tree.  String
//! values in the project layer may then refer to it with
//! `${configs.user.<section>.<key>}` or
//! `${configs.user.variables.<label>.<key>}`.  Precedence of the final
//! merge is overlay, then project, then user.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use toml::{Table, Value};

use crate::errors::{BwStateError, Result};

use super::settings::Config;

/// Project config file, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".bwstate.toml";

/// User config file, relative to `$HOME`.
pub const USER_CONFIG_FILE: &str = ".config/bwstate/config.toml";

/// Sections a project file may interpolate from the user layer.
const USER_SECTIONS: [&str; 4] = ["state", "bitwarden", "terraform", "backend"];

fn interpolation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{configs\.user\.([a-z_]+)\.([a-z_]+)(?:\.([a-z_]+))?\}")
            .unwrap_or_else(|e| unreachable!("interpolation pattern is valid: {e}"))
    })
}

/// `$HOME/.config/bwstate/config.toml`, if `HOME` is set.
pub fn default_user_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(USER_CONFIG_FILE))
}

/// Load both files and merge them under `overlay`.
///
/// A missing file is an empty layer.  The result is not validated.
pub fn load(user_path: Option<&Path>, project_path: &Path, overlay: Config) -> Result<Config> {
    let user = match user_path {
        Some(path) => load_user(path)?,
        None => Config::default(),
    };
    let context = user_context(&user)?;
    let project = load_project(project_path, &context)?;
    Ok(overlay.merge(project).merge(user))
}

/// Read the user layer.  It cannot interpolate anything.
pub fn load_user(path: &Path) -> Result<Config> {
    match read_table(path)? {
        Some(table) => into_config(path, table),
        None => Ok(Config::default()),
    }
}

/// Read the project layer, interpolating from the user `context`.
pub fn load_project(path: &Path, context: &Table) -> Result<Config> {
    let Some(mut table) = read_table(path)? else {
        return Ok(Config::default());
    };
    for (_, value) in table.iter_mut() {
        interpolate(value, context, path)?;
    }
    into_config(path, table)
}

/// The user layer as seen from a project file: the sections as they
/// are, and the variables keyed by label under `variables`.
pub fn user_context(user: &Config) -> Result<Table> {
    let mut table = match Value::try_from(user) {
        Ok(Value::Table(table)) => table,
        Ok(_) => Table::new(),
        Err(e) => {
            return Err(BwStateError::SerializationError(format!(
                "user configuration: {e}"
            )))
        }
    };
    table.remove("variable");

    let mut variables = Table::new();
    for variable in &user.variable {
        let value = Value::try_from(variable).map_err(|e| {
            BwStateError::SerializationError(format!("variable '{}': {e}", variable.label))
        })?;
        variables.insert(variable.label.clone(), value);
    }
    table.insert("variables".into(), Value::Table(variables));
    Ok(table)
}

fn read_table(path: &Path) -> Result<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| BwStateError::ConfigError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    contents
        .parse::<Table>()
        .map(Some)
        .map_err(|e| BwStateError::ConfigError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn into_config(path: &Path, table: Table) -> Result<Config> {
    Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| BwStateError::ConfigError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn interpolate(value: &mut Value, context: &Table, path: &Path) -> Result<()> {
    match value {
        Value::String(raw) => {
            if let Some(replaced) = interpolate_str(raw, context, path)? {
                *value = replaced;
            }
        }
        Value::Array(items) => {
            for item in items {
                interpolate(item, context, path)?;
            }
        }
        Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                interpolate(item, context, path)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// `None` when `raw` has no placeholder.  A string that is exactly one
/// placeholder takes the referenced value with its type.
fn interpolate_str(raw: &str, context: &Table, path: &Path) -> Result<Option<Value>> {
    let re = interpolation_regex();
    if !re.is_match(raw) {
        return Ok(None);
    }

    if let Some(caps) = re.captures(raw) {
        if caps.get(0).map(|m| m.as_str().len()) == Some(raw.len()) {
            let value = lookup(&caps, context, path)?;
            return Ok(Some(value.unwrap_or_else(|| Value::String(String::new()))));
        }
    }

    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in re.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&raw[last..whole.start()]);
        if let Some(value) = lookup(&caps, context, path)? {
            out.push_str(&scalar_to_string(&value, whole.as_str(), path)?);
        }
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(Some(Value::String(out)))
}

/// Find the user value a placeholder names.  `None` means unset.
fn lookup(caps: &Captures<'_>, context: &Table, path: &Path) -> Result<Option<Value>> {
    let placeholder = &caps[0];
    let fail = |message: String| BwStateError::ConfigError {
        path: path.to_path_buf(),
        message,
    };

    let section = &caps[1];
    let (table, key) = if section == "variables" {
        let label = &caps[2];
        let key = caps
            .get(3)
            .ok_or_else(|| fail(format!("{placeholder}: expected variables.<label>.<key>")))?
            .as_str();
        let variable = context
            .get("variables")
            .and_then(|v| v.get(label))
            .and_then(Value::as_table)
            .ok_or_else(|| fail(format!("{placeholder}: no user variable '{label}'")))?;
        (Some(variable), key)
    } else if USER_SECTIONS.contains(&section) {
        if caps.get(3).is_some() {
            return Err(fail(format!("{placeholder}: expected {section}.<key>")));
        }
        (context.get(section).and_then(Value::as_table), &caps[2])
    } else {
        return Err(fail(format!(
            "{placeholder}: unknown section '{section}' of the user configuration"
        )));
    };

    Ok(table.and_then(|t| t.get(key)).cloned())
}

fn scalar_to_string(value: &Value, placeholder: &str, path: &Path) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        _ => Err(BwStateError::ConfigError {
            path: path.to_path_buf(),
            message: format!("{placeholder} is not a scalar value"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::config::settings::StateSettings;

    const FOLDER: &str = "9c1d2e3f-4a5b-4c6d-8e7f-0a1b2c3d4e5f";

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_files_are_empty_layers() {
        let tmp = TempDir::new().unwrap();
        let config = load(
            Some(&tmp.path().join("nope.toml")),
            &tmp.path().join(PROJECT_CONFIG_FILE),
            Config::default(),
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn precedence_is_overlay_project_user() {
        let tmp = TempDir::new().unwrap();
        let user = write(
            &tmp,
            "user.toml",
            "[state]\nitem_name = \"user-item\"\nmax_revisions = 7\n\n[backend]\nport = 1111\n",
        );
        let project = write(
            &tmp,
            PROJECT_CONFIG_FILE,
            "[state]\nitem_name = \"project-item\"\n\n[backend]\nport = 2222\n",
        );
        let overlay = Config {
            state: StateSettings {
                item_name: Some("flag-item".into()),
                ..StateSettings::default()
            },
            ..Config::default()
        };

        let config = load(Some(&user), &project, overlay).unwrap();
        assert_eq!(config.state.item_name.as_deref(), Some("flag-item"));
        assert_eq!(config.port(), 2222);
        assert_eq!(config.max_revisions(), 7);
    }

    #[test]
    fn project_interpolates_user_values() {
        let tmp = TempDir::new().unwrap();
        let user = write(
            &tmp,
            "user.toml",
            &format!(
                r#"
[state]
folder_id = "{FOLDER}"

[backend]
port = 4242

[[variable]]
label = "token"
name = "ci-token"
folder_id = "{FOLDER}"
"#
            ),
        );
        let project = write(
            &tmp,
            PROJECT_CONFIG_FILE,
            r#"
[state]
item_name = "infra-${configs.user.state.folder_id}"
folder_id = "${configs.user.state.folder_id}"

[backend]
port = "${configs.user.backend.port}"

[[variable]]
label = "api_token"
name = "${configs.user.variables.token.name}"
folder_id = "${configs.user.variables.token.folder_id}"
collection_id = "${configs.user.state.collection_id}"
"#,
        );

        let config = load(Some(&user), &project, Config::default()).unwrap();
        assert_eq!(
            config.state.item_name.as_deref(),
            Some(format!("infra-{FOLDER}").as_str())
        );
        assert_eq!(config.state.folder_id.as_deref(), Some(FOLDER));
        assert_eq!(config.port(), 4242);

        let api = config.variable.lookup("api_token").unwrap();
        assert_eq!(api.name.as_deref(), Some("ci-token"));
        assert_eq!(api.folder_id.as_deref(), Some(FOLDER));
        // Unset user values interpolate as empty strings.
        assert_eq!(api.collection_id.as_deref(), Some(""));
        // The user variable is still merged in after the project ones.
        assert!(config.variable.lookup("token").is_some());
    }

    #[test]
    fn unknown_section_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let project = write(
            &tmp,
            PROJECT_CONFIG_FILE,
            "[state]\nitem_name = \"${configs.user.nothing.here}\"\n",
        );
        let err = load(None, &project, Config::default()).unwrap_err();
        assert!(matches!(err, BwStateError::ConfigError { .. }));
        assert!(err.to_string().contains("unknown section"));
    }

    #[test]
    fn unknown_user_variable_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let project = write(
            &tmp,
            PROJECT_CONFIG_FILE,
            "[state]\nitem_name = \"${configs.user.variables.nobody.name}\"\n",
        );
        assert!(load(None, &project, Config::default()).is_err());
    }

    #[test]
    fn unparseable_file_names_the_path() {
        let tmp = TempDir::new().unwrap();
        let project = write(&tmp, PROJECT_CONFIG_FILE, "not valid {{toml");
        let err = load(None, &project, Config::default()).unwrap_err();
        match err {
            BwStateError::ConfigError { path, .. } => assert_eq!(path, project),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn user_context_keys_variables_by_label() {
        let user: Config = toml::from_str(
            "[[variable]]\nlabel = \"db\"\nname = \"prod-db\"\nfield = \"username\"\n",
        )
        .unwrap();
        let context = user_context(&user).unwrap();
        let db = context["variables"]["db"].as_table().unwrap();
        assert_eq!(db["field"].as_str(), Some("username"));
        assert!(context.get("variable").is_none());
    }
}
