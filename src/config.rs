use crate::evolution::EvolutionConfig;
use anyhow::{Context, Result};
use std::{env, fs, net::SocketAddr, path::Path};

pub const BIND_ADDR_VAR: &str = "ARCHIPELAGO_BIND_ADDR";
pub const CONFIG_PATH_VAR: &str = "ARCHIPELAGO_CONFIG";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// Worker settings resolved from the environment (and an optional JSON file).
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_address: SocketAddr,
    pub evolution: EvolutionConfig,
}

impl Settings {
    /// Reads `ARCHIPELAGO_BIND_ADDR` and `ARCHIPELAGO_CONFIG`. Call
    /// `dotenv` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        let bind_address = env::var(BIND_ADDR_VAR)
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .with_context(|| format!("{BIND_ADDR_VAR} must be a socket address"))?;

        let evolution = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => load_evolution_config(&path)?,
            Err(_) => EvolutionConfig::default(),
        };

        Ok(Settings {
            bind_address,
            evolution,
        })
    }
}

pub fn load_evolution_config(path: impl AsRef<Path>) -> Result<EvolutionConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read evolution config at {}", path.display()))?;
    let config: EvolutionConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse evolution config at {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
