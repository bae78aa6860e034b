//! `bwstate wrap` — run terraform against the vault-backed backend.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;

use tracing::info;
use zeroize::Zeroizing;

use crate::cli::{backend_state, open_vault, runtime, Cli};
use crate::config::Config;
use crate::diagnostics::TracingDiagnostics;
use crate::errors::{BwStateError, Result};
use crate::server::{backend_address, BackendServer};
use crate::store::Reference;
use crate::variables::VariableResolver;
use crate::vault::{bitwarden::SESSION_ENV, VaultClient};

/// Execute the `wrap` command.
pub fn execute(cli: &Cli, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(BwStateError::CommandFailed(
            "no terraform arguments given — use `bwstate wrap -- <args>`".into(),
        ));
    }

    let config = cli.load_config()?;
    let reference = config.state_reference()?;

    let vault = open_vault(&config)?;
    let session = Zeroizing::new(vault.session().to_string());
    let client: Arc<dyn VaultClient> = Arc::new(vault);

    let resolver = VariableResolver::new(client.clone(), Arc::new(TracingDiagnostics));
    let variables = resolver.resolve(&config.variable)?;
    info!(count = variables.len(), "variables resolved");

    let rt = runtime()?;
    let server = rt.block_on(BackendServer::start(
        config.port(),
        backend_state(&config, client),
    ))?;

    let env = terraform_environment(&session, server.port(), &reference, &variables);
    let status = env.and_then(|env| {
        let executable = config.terraform_executable();
        info!(executable, ?args, "running terraform");
        Command::new(executable)
            .args(args)
            .envs(env)
            .status()
            .map_err(|e| BwStateError::CommandFailed(format!("{executable}: {e}")))
    });

    rt.block_on(server.stop())?;
    let status = status?;

    // Forward terraform's exit code.
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(BwStateError::ChildProcessFailed(code)),
        None => Err(BwStateError::CommandFailed(
            "terraform terminated by signal".into(),
        )),
    }
}

/// Variables handed to terraform on top of the inherited environment.
pub fn terraform_environment(
    session: &str,
    port: u16,
    reference: &Reference,
    variables: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let address = backend_address(port, reference)?;

    let mut env = BTreeMap::new();
    env.insert(SESSION_ENV.to_string(), session.to_string());
    env.insert("TF_BACKEND".to_string(), "http".to_string());
    env.insert("TF_HTTP_ADDRESS".to_string(), address.clone());
    env.insert("TF_HTTP_LOCK_ADDRESS".to_string(), address.clone());
    env.insert("TF_HTTP_UNLOCK_ADDRESS".to_string(), address);
    env.insert("TF_HTTP_RETRY_MAX".to_string(), "0".to_string());
    for (label, value) in variables {
        env.insert(format!("TF_VAR_{label}"), value.clone());
    }
    Ok(env)
}

/// The address terraform is pointed at, for display.
pub fn describe_backend(config: &Config) -> Result<String> {
    backend_address(config.port(), &config.state_reference()?)
}
