//! `bwstate serve` — run only the backend, e.g. for a terraform started
//! by hand.

use std::sync::Arc;

use crate::cli::commands::wrap::describe_backend;
use crate::cli::{backend_state, open_vault, output, runtime, Cli};
use crate::errors::Result;
use crate::server::{shutdown_signal, BackendServer};
use crate::vault::VaultClient;

/// Execute the `serve` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let vault = open_vault(&config)?;
    let client: Arc<dyn VaultClient> = Arc::new(vault);

    let rt = runtime()?;
    rt.block_on(async {
        let server = BackendServer::start(config.port(), backend_state(&config, client)).await?;
        output::success(&format!(
            "Backend listening on http://{} (Ctrl-C to stop)",
            server.local_addr()
        ));
        match describe_backend(&config) {
            Ok(address) => output::tip(&format!("export TF_HTTP_ADDRESS='{address}'")),
            Err(_) => output::tip("Pass ?item=id:<uuid> or ?item=name:<name> with every request."),
        }

        shutdown_signal().await;
        server.stop().await
    })
}
