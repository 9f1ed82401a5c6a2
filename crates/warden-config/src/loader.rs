use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::WardenConfig;

/// Loads the Warden configuration once at startup. There is no hot reload:
/// the policy table is immutable for the lifetime of the gateway.
pub struct ConfigLoader {
    config: WardenConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > WARDEN_CONFIG env > ~/.warden/warden.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("WARDEN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("warden.toml")
    }

    /// Load the config from disk, falling back to defaults when the file is
    /// absent. Parse errors and validation failures abort startup.
    pub fn load(path: Option<&Path>) -> warden_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<WardenConfig>(&raw).map_err(|e| {
                warden_core::WardenError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            WardenConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate — log warnings, fail on errors.
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(warden_core::WardenError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get(&self) -> &WardenConfig {
        &self.config
    }

    pub fn into_config(self) -> WardenConfig {
        self.config
    }

    /// Path the config was read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (WARDEN_DAILY_CAP, WARDEN_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: WardenConfig) -> WardenConfig {
        if let Ok(v) = std::env::var("WARDEN_DAILY_CAP") {
            if let Ok(cap) = v.parse::<f64>() {
                config.budget.daily_cap_usd = cap;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_APPROVAL_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.approval.timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LEDGER_PATH") {
            config.budget.ledger_path = Some(PathBuf::from(v));
        }
        config
    }
}
