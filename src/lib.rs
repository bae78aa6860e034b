pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod server;
pub mod store;
pub mod variables;
pub mod vault;
