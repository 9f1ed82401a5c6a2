//! # warden-config
//!
//! Configuration system for the Warden gateway. Reads from `warden.toml`
//! and environment variables — in that precedence order. The policy table
//! and budget settings are validated once at startup; malformed entries
//! abort with a descriptive error rather than failing at request time.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    ApprovalConfig, BudgetConfig, GuardrailConfig, LoggingConfig, ModelConfig, WardenConfig,
};
