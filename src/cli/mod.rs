//! CLI module — Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap_complete::Shell;
use zeroize::Zeroizing;

use self::commands::item::{AttachmentArgs, ScopeArgs};

use crate::config::{self, BackendSettings, BitwardenSettings, Config, StateSettings};
use crate::config::{TerraformSettings, PROJECT_CONFIG_FILE};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::errors::{BwStateError, Result};
use crate::server::BackendState;
use crate::store::{ItemLocator, LockStore, StateStore};
use crate::vault::{BitwardenCli, VaultClient};

/// Environment variable checked for the master password before prompting.
const MASTER_PASSWORD_ENV: &str = "BW_PASSWORD";

/// bwstate CLI: Terraform state and secrets kept in a Bitwarden vault.
#[derive(Parser)]
#[command(
    name = "bwstate",
    about = "Terraform state and secrets kept in a Bitwarden vault",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Without a subcommand, `bwstate -- <args>` is `bwstate wrap -- <args>`
    #[arg(last = true, value_name = "TERRAFORM_ARGS")]
    pub terraform_args: Vec<String>,

    /// Switch to this directory before doing anything else
    #[arg(short = 'C', long, env = "TF_CHROOT", global = true)]
    pub chdir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `bwstate=trace` (default: info, or RUST_LOG)
    #[arg(long, env = "BWSTATE_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Project configuration file (default: .bwstate.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// User configuration file (default: ~/.config/bwstate/config.toml)
    #[arg(long, global = true)]
    pub user_config: Option<PathBuf>,

    /// ID of the item which holds the state
    #[arg(long, env = "TF_BACKEND_ITEM_ID", global = true)]
    pub item_id: Option<String>,

    /// Name of the item which holds the state
    #[arg(long, env = "TF_BACKEND_ITEM_NAME", global = true)]
    pub item_name: Option<String>,

    /// Port the backend listens on at 127.0.0.1 (default: 26394)
    #[arg(long, env = "TF_BACKEND_PORT", global = true)]
    pub listen: Option<u16>,

    /// Terraform executable (default: terraform)
    #[arg(long, env = "TF_EXECUTABLE", global = true)]
    pub terraform_executable: Option<String>,

    /// Bitwarden CLI executable (default: bw)
    #[arg(long, env = "BW_CLI_EXECUTABLE", global = true)]
    pub bitwarden_executable: Option<String>,

    /// Existing Bitwarden session to use
    #[arg(long, env = "BW_SESSION", global = true, hide_env_values = true)]
    pub bitwarden_session: Option<String>,

    /// Unlock the vault if it is locked (default: true)
    #[arg(long, env = "BW_UNLOCK", global = true)]
    pub bitwarden_unlock: Option<bool>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start the backend and run terraform against it
    Wrap {
        /// Arguments passed to terraform (after --)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Run only the backend until Ctrl-C
    Serve,

    /// List the configured variables (without values)
    Vars,

    /// List the stored state revisions
    Revisions,

    /// Look up a vault item and print it as JSON
    Item {
        /// Item ID
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,

        /// Item name (exact match)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        attachments: AttachmentArgs,
    },

    /// Search vault items and print every match as a JSON array
    Items {
        /// Text the item names must contain
        #[arg(long)]
        search: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        attachments: AttachmentArgs,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

impl Cli {
    /// The command to run.  Bare terraform arguments mean `wrap`; `None`
    /// when neither a subcommand nor arguments were given.
    pub fn take_command(&mut self) -> Option<Commands> {
        match self.command.take() {
            Some(command) => Some(command),
            None if !self.terraform_args.is_empty() => Some(Commands::Wrap {
                args: std::mem::take(&mut self.terraform_args),
            }),
            None => None,
        }
    }

    /// The configuration layer given by flags and environment.
    pub fn overlay(&self) -> Config {
        Config {
            state: StateSettings {
                item_id: self.item_id.clone(),
                item_name: self.item_name.clone(),
                ..StateSettings::default()
            },
            bitwarden: BitwardenSettings {
                executable: self.bitwarden_executable.clone(),
                session: self.bitwarden_session.clone(),
                unlock_if_required: self.bitwarden_unlock,
            },
            terraform: TerraformSettings {
                executable: self.terraform_executable.clone(),
            },
            backend: BackendSettings { port: self.listen },
            ..Config::default()
        }
    }

    pub fn project_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE))
    }

    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.user_config
            .clone()
            .or_else(config::default_user_config_path)
    }

    /// Load, merge and validate every configuration layer.
    pub fn load_config(&self) -> Result<Config> {
        let config = config::load(
            self.user_config_path().as_deref(),
            &self.project_config_path(),
            self.overlay(),
        )?;
        config.validate()?;
        Ok(config)
    }
}

/// Open the vault the configuration points at.
///
/// Unlocks it when allowed, otherwise the given session must work.
pub fn open_vault(config: &Config) -> Result<BitwardenCli> {
    let mut vault = BitwardenCli::new(
        Some(config.bitwarden_executable()),
        config.bitwarden_session(),
    )?;
    if config.unlock_if_required() {
        vault.unlock(true, prompt_master_password)?;
    } else if !vault.test()? {
        return Err(BwStateError::SessionInvalid(
            "the vault is locked and unlocking is disabled".into(),
        ));
    }
    Ok(vault)
}

/// Get the master password, trying in order:
/// 1. `BW_PASSWORD` env var (CI/CD)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped from memory on drop.
pub fn prompt_master_password(user: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(MASTER_PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt(format!("Master password for {user}"))
        .interact()
        .map_err(|e| BwStateError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Locator for the configured state scope.
pub fn item_locator(
    config: &Config,
    client: Arc<dyn VaultClient>,
    diagnostics: Arc<dyn Diagnostics>,
) -> ItemLocator {
    ItemLocator::new(client, diagnostics, config.store_scope())
}

/// State store honouring the configured retention.
pub fn state_store(config: &Config, locator: ItemLocator) -> StateStore {
    StateStore::new(locator)
        .with_max_revisions(config.max_revisions())
        .with_retention(config.retention())
}

/// Both stores, ready to be served.
pub fn backend_state(config: &Config, client: Arc<dyn VaultClient>) -> BackendState {
    let locator = item_locator(config, client, Arc::new(TracingDiagnostics));
    BackendState {
        states: state_store(config, locator.clone()),
        locks: LockStore::new(locator),
    }
}

/// A multi-threaded runtime for the backend server.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BwStateError::ServerError(format!("cannot start runtime: {e}")))
}
