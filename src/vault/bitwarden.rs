//! Bitwarden CLI (`bw`) integration.
//!
//! Every vault operation is one blocking `bw` invocation.  The session
//! token travels in `BW_SESSION`; the master password (only needed for
//! `unlock`) travels in a one-shot environment variable and is wiped
//! from memory afterwards.

use std::fmt::Write as _;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde::Deserialize;
use tracing::debug;
use zeroize::Zeroizing;

use crate::errors::{BwStateError, Result};

use super::client::VaultClient;
use super::model::{parse_item, parse_items, AttachmentReference, Item, Status};
use super::query::ItemQuery;

/// Default executable name, looked up on `PATH`.
pub const DEFAULT_EXECUTABLE: &str = "bw";

/// Environment variable carrying the session token.
pub const SESSION_ENV: &str = "BW_SESSION";

/// One-shot environment variable used to hand the master password to
/// `bw unlock --passwordenv`.
const MASTER_PASSWORD_ENV: &str = "BW_MASTER_PASSWORD";

/// Client that shells out to the `bw` binary.
#[derive(Clone)]
pub struct BitwardenCli {
    /// Program plus leading arguments (`["node", "bw.js"]` for a script).
    executable: Vec<String>,
    session: Zeroizing<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default, rename = "userEmail")]
    user_email: Option<String>,
    status: Status,
}

impl BitwardenCli {
    /// Create a client for `executable` (default `bw`) using `session`.
    ///
    /// A path ending in `.js` is run through `node`, which is how a
    /// source checkout of the CLI is started.
    pub fn new(executable: Option<&str>, session: Option<&str>) -> Result<Self> {
        let executable = executable
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_EXECUTABLE);

        let resolved = if executable.to_ascii_lowercase().ends_with(".js") {
            let path = Path::new(executable);
            if !path.is_file() {
                return Err(BwStateError::ExternalCallFailure(format!(
                    "executable ({executable}) is not a file"
                )));
            }
            vec!["node".to_string(), executable.to_string()]
        } else {
            vec![executable.to_string()]
        };

        Ok(Self {
            executable: resolved,
            session: Zeroizing::new(session.unwrap_or_default().to_string()),
        })
    }

    /// The session token in use (possibly replaced by `unlock`).
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Query `bw status`.  Returns the status and the logged-in user.
    pub fn status(&self) -> Result<(Status, Option<String>)> {
        let raw = self.execute(&["status"], None)?;
        let response: StatusResponse = serde_json::from_slice(&raw).map_err(|e| {
            BwStateError::ExternalCallFailure(format!(
                "{}: malformed status: {e}",
                self.format_args(&["status"])
            ))
        })?;
        Ok((
            response.status,
            response.user_email.filter(|u| !u.is_empty()),
        ))
    }

    /// `true` if the current session can serve requests.
    pub fn test(&self) -> Result<bool> {
        Ok(self.status()?.0.is_usable())
    }

    /// Unlock the vault, prompting for the master password through
    /// `prompt` (which receives the account e-mail).
    ///
    /// With `only_if_required`, an already unlocked vault is left alone.
    pub fn unlock<F>(&mut self, only_if_required: bool, prompt: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<Zeroizing<String>>,
    {
        let (status, user) = self.status()?;
        let user = match (status, user) {
            (Status::Unauthenticated, _) | (_, None) => return Err(BwStateError::NotLoggedIn),
            (_, Some(user)) => user,
        };
        if status.is_usable() && only_if_required {
            return Ok(());
        }

        let password = prompt(&user)?;
        let args = ["unlock", "--raw", "--passwordenv", MASTER_PASSWORD_ENV];
        let output = self.run(&args, Some((MASTER_PASSWORD_ENV, password.as_str())))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Invalid master password.") {
            return Err(BwStateError::SessionInvalid("invalid master password".into()));
        }
        self.check(&args, &output)?;

        let session = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if session.is_empty() {
            return Err(BwStateError::ExternalCallFailure(format!(
                "{}: no session token returned",
                self.format_args(&args)
            )));
        }
        self.session = Zeroizing::new(session);
        debug!(user = %user, "vault unlocked");
        Ok(())
    }

    /// Run `bw <args>` and return stdout, mapping failures to errors.
    fn execute(&self, args: &[&str], extra_env: Option<(&str, &str)>) -> Result<Vec<u8>> {
        let output = self.run(args, extra_env)?;
        self.check(args, &output)?;
        Ok(output.stdout)
    }

    fn run(&self, args: &[&str], extra_env: Option<(&str, &str)>) -> Result<Output> {
        let mut cmd = Command::new(&self.executable[0]);
        cmd.args(&self.executable[1..])
            .args(args)
            .env(SESSION_ENV, self.session.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some((key, value)) = extra_env {
            cmd.env(key, value);
        }

        cmd.output().map_err(|e| {
            BwStateError::ExternalCallFailure(format!("{}: {e}", self.format_args(args)))
        })
    }

    /// Turn a finished invocation into an error if it failed.
    fn check(&self, args: &[&str], output: &Output) -> Result<()> {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.starts_with("mac failed.") {
            return Err(BwStateError::SessionInvalid(
                "BW_SESSION is either wrong or expired".into(),
            ));
        }
        if output.status.success() {
            return Ok(());
        }

        let first_line = stderr
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("unknown error")
            .trim()
            .to_string();
        if first_line == "Not found." {
            return Err(BwStateError::NotFound(self.format_args(args)));
        }
        Err(BwStateError::ExternalCallFailure(format!(
            "{}: {first_line}",
            self.format_args(args)
        )))
    }

    /// Render the full command line for error messages.
    fn format_args(&self, args: &[&str]) -> String {
        let mut out = String::from("[");
        for (i, arg) in self
            .executable
            .iter()
            .map(String::as_str)
            .chain(args.iter().copied())
            .enumerate()
        {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{arg:?}");
        }
        out.push(']');
        out
    }

    fn search_args(query: &ItemQuery) -> Vec<&str> {
        let mut args = vec!["list", "items"];
        if !query.name.is_empty() {
            args.extend(["--search", query.name.as_str()]);
        }
        if let Some(v) = &query.organization_id {
            args.extend(["--organizationid", v.as_str()]);
        }
        if let Some(v) = &query.collection_id {
            args.extend(["--collectionid", v.as_str()]);
        }
        if let Some(v) = &query.folder_id {
            args.extend(["--folderid", v.as_str()]);
        }
        args.push("--raw");
        args
    }
}

impl VaultClient for BitwardenCli {
    fn sync(&self) -> Result<()> {
        self.execute(&["sync"], None).map(|_| ())
    }

    fn get_item(&self, id: &str) -> Result<Item> {
        let raw = self.execute(&["get", "item", id], None)?;
        parse_item(&raw)
    }

    fn find_item(&self, query: &ItemQuery) -> Result<Item> {
        if query.name.is_empty() {
            return Err(BwStateError::ValidationError(
                "no name in item query provided".into(),
            ));
        }
        query.select(self.list_items(query)?)
    }

    fn list_items(&self, query: &ItemQuery) -> Result<Vec<Item>> {
        let raw = self.execute(&Self::search_args(query), None)?;
        parse_items(&raw)
    }

    fn create_attachment(&self, item: &Item, file_name: &str, content: &[u8]) -> Result<()> {
        // The CLI names the attachment after the uploaded file, so the
        // content is staged under its final name in a private temp dir.
        let staging = tempfile::Builder::new()
            .prefix("bwstate-attachment-")
            .tempdir()?;
        let path = staging.path().join(file_name);
        std::fs::write(&path, content)?;
        let path = path.to_string_lossy();

        self.execute(
            &[
                "create",
                "attachment",
                "--itemid",
                item.id.as_str(),
                "--file",
                &*path,
            ],
            None,
        )
        .map_err(|e| match e {
            BwStateError::ExternalCallFailure(msg) => BwStateError::ExternalCallFailure(format!(
                "cannot create attachment '{file_name}' for {item}: {msg}"
            )),
            other => other,
        })?;
        Ok(())
    }

    fn delete_attachment(&self, item: &Item, attachment: &AttachmentReference) -> Result<()> {
        self.execute(
            &[
                "delete",
                "attachment",
                attachment.id.as_str(),
                "--itemid",
                item.id.as_str(),
            ],
            None,
        )
        .map_err(|e| match e {
            BwStateError::ExternalCallFailure(msg) => BwStateError::ExternalCallFailure(format!(
                "cannot delete attachment '{}' ({}) of {item}: {msg}",
                attachment.file_name, attachment.id
            )),
            other => other,
        })?;
        Ok(())
    }

    fn get_attachment(&self, item: &Item, attachment_id: &str) -> Result<Vec<u8>> {
        self.execute(
            &[
                "get",
                "attachment",
                attachment_id,
                "--itemid",
                item.id.as_str(),
                "--raw",
            ],
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn javascript_executable_requires_existing_file() {
        let err = BitwardenCli::new(Some("/nonexistent/bw.js"), None).err().unwrap();
        assert!(matches!(err, BwStateError::ExternalCallFailure(_)));
    }

    #[test]
    fn javascript_executable_runs_through_node() {
        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("bw.js");
        std::fs::write(&script, "").unwrap();
        let cli = BitwardenCli::new(Some(script.to_str().unwrap()), Some("tok")).unwrap();
        assert_eq!(cli.executable[0], "node");
        assert_eq!(cli.session(), "tok");
    }

    #[test]
    fn defaults_to_bw_on_path() {
        let cli = BitwardenCli::new(None, None).unwrap();
        assert_eq!(cli.executable, vec!["bw".to_string()]);
        assert_eq!(cli.session(), "");
    }

    #[test]
    fn format_args_quotes_everything() {
        let cli = BitwardenCli::new(Some("bw"), None).unwrap();
        assert_eq!(
            cli.format_args(&["get", "item", "x y"]),
            r#"["bw", "get", "item", "x y"]"#
        );
    }

    #[test]
    fn search_args_include_scope_filters() {
        let mut q = ItemQuery::by_name("prod");
        q.folder_id = Some("f1".into());
        assert_eq!(
            BitwardenCli::search_args(&q),
            vec!["list", "items", "--search", "prod", "--folderid", "f1", "--raw"]
        );
    }

    #[test]
    fn missing_executable_is_an_external_call_failure() {
        let cli = BitwardenCli::new(Some("/nonexistent/bw-binary"), None).unwrap();
        let err = cli.sync().unwrap_err();
        assert!(matches!(err, BwStateError::ExternalCallFailure(_)));
    }
}
