//! Built-in providers

pub mod file_system;
pub mod path_utils;
pub mod shell;
pub mod web;

pub use file_system::FileSystemProvider;
pub use shell::ShellProvider;
pub use web::WebProvider;

use crate::{CapabilityRegistry, Result};
use hivemind_config::Config;

/// Register `file_system`, `shell` and `web` for the configured workspace
pub fn register_builtin(registry: &mut CapabilityRegistry, config: &Config) -> Result<()> {
    let workspace = config.workspace_path();

    registry.register(FileSystemProvider::new(workspace.clone()))?;
    registry.register(ShellProvider::new(
        config.capabilities.shell.timeout_secs,
        workspace,
    ))?;
    registry.register(WebProvider::from_config(config))?;
    Ok(())
}
