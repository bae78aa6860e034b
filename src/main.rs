use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bwstate::cli::{Cli, Commands};
use bwstate::errors::BwStateError;

fn main() {
    let mut cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Some(dir) = &cli.chdir {
        if let Err(e) = std::env::set_current_dir(dir) {
            bwstate::cli::output::error(&format!("cannot change to {}: {e}", dir.display()));
            std::process::exit(1);
        }
    }

    let Some(command) = cli.take_command() else {
        Cli::command()
            .error(
                ErrorKind::MissingSubcommand,
                "a subcommand or `-- <terraform args>` is required",
            )
            .exit()
    };

    let result = match command {
        Commands::Wrap { ref args } => bwstate::cli::commands::wrap::execute(&cli, args),
        Commands::Serve => bwstate::cli::commands::serve::execute(&cli),
        Commands::Vars => bwstate::cli::commands::vars::execute(&cli),
        Commands::Revisions => bwstate::cli::commands::revisions::execute(&cli),
        Commands::Item {
            ref id,
            ref name,
            ref scope,
            ref attachments,
        } => bwstate::cli::commands::item::execute(
            &cli,
            id.as_deref(),
            name.as_deref(),
            scope,
            attachments,
        ),
        Commands::Items {
            ref search,
            ref scope,
            ref attachments,
        } => bwstate::cli::commands::item::execute_search(
            &cli,
            search.as_deref(),
            scope,
            attachments,
        ),
        Commands::Completions { shell } => bwstate::cli::commands::completions::execute(shell),
    };

    match result {
        Ok(()) => {}
        // terraform already reported its own failure.
        Err(BwStateError::ChildProcessFailed(code)) => std::process::exit(code),
        Err(e) => {
            bwstate::cli::output::error(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `--log-level`, else `RUST_LOG`, else `info`.
fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
