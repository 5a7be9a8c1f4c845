use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::CarapaceConfig;

/// Loads the Carapace configuration from disk.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the config path: explicit path > CARAPACE_CONFIG env > ~/.carapace/carapace.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CARAPACE_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".carapace")
            .join("carapace.toml")
    }

    /// Load the config from disk, falling back to defaults when the file is absent.
    pub fn load(path: Option<&Path>) -> carapace_core::Result<CarapaceConfig> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<CarapaceConfig>(&raw).map_err(|e| {
                carapace_core::CarapaceError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            CarapaceConfig::default()
        };

        Ok(Self::apply_env_overrides(config))
    }

    /// Apply env var overrides. The config file takes priority; env fills gaps.
    fn apply_env_overrides(mut config: CarapaceConfig) -> CarapaceConfig {
        if let Ok(v) = std::env::var("CARAPACE_AGENT_MODEL") {
            config.agent.model = v;
        }
        if let Ok(v) = std::env::var("CARAPACE_GATEWAY_LISTEN") {
            config.gateway.listen = v;
        }
        if config.agent.api_key.is_none() {
            if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
                config.agent.api_key = Some(v);
            }
        }
        if config.gateway.auth_token.is_none() {
            if let Ok(v) = std::env::var("CARAPACE_AUTH_TOKEN") {
                config.gateway.auth_token = Some(v);
            }
        }
        config
    }
}
