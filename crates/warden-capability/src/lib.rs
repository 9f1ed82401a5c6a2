//! # warden-capability
//!
//! Built-in capability handlers for the Warden gateway: filesystem
//! read/write/delete, shell execution, package installation, and model
//! invocation with a free local fallback. Hosts with their own handlers
//! can skip this crate entirely and register against the gateway directly.

pub mod fs;
pub mod model;
pub mod shell;

pub use fs::FsCapability;
pub use model::{LocalModelCapability, ModelCapability};
pub use shell::ShellCapability;

use std::sync::Arc;

use warden_config::WardenConfig;
use warden_core::ActionKind;
use warden_gateway::CapabilityRegistry;

/// Register every built-in handler. The local model goes into the
/// fallback lane so a budget rejection downgrades instead of blocking.
pub fn register_builtins(
    registry: &mut CapabilityRegistry,
    config: &WardenConfig,
) -> warden_core::Result<()> {
    let fs = Arc::new(FsCapability::new());
    registry.register(ActionKind::ReadFile, fs.clone())?;
    registry.register(ActionKind::WriteFile, fs.clone())?;
    registry.register(ActionKind::DeleteFile, fs)?;

    let shell = Arc::new(ShellCapability::new());
    registry.register(ActionKind::RunCommand, shell.clone())?;
    registry.register(ActionKind::InstallPackage, shell)?;

    registry.register(
        ActionKind::InvokeModel,
        Arc::new(ModelCapability::new(&config.model)),
    )?;
    registry.register_fallback(
        ActionKind::InvokeModel,
        Arc::new(LocalModelCapability::new(&config.model)),
    )?;

    Ok(())
}
