//! `bwstate completions <shell>`.

use std::io::Write;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::errors::Result;

/// Execute the `completions` command.
pub fn execute(shell: Shell) -> Result<()> {
    write_script(shell, &mut std::io::stdout())
}

/// Write the completion script for `shell` to `out`.
pub fn write_script(shell: Shell, out: &mut dyn Write) -> Result<()> {
    generate(shell, &mut Cli::command(), "bwstate", out);
    out.flush()?;
    Ok(())
}
