//! `bwstate vars` — list configured variables without touching the vault.

use crate::cli::{output, Cli};
use crate::errors::Result;

/// Execute the `vars` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    output::print_variables_table(&config.variable);
    Ok(())
}
