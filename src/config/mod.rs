//! Config module — layered TOML configuration.
//!
//! This module provides:
//! - `Config` and its sections, with left-biased merging (`settings`)
//! - Reading the user and project files and interpolating the user
//!   layer into the project layer (`layers`)

pub mod layers;
pub mod settings;

// Re-export the most commonly used items.
pub use layers::{default_user_config_path, load, PROJECT_CONFIG_FILE};
pub use settings::{
    BackendSettings, BitwardenSettings, Config, StateSettings, TerraformSettings, DEFAULT_PORT,
};
