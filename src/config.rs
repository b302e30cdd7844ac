use anyhow::{Context, Result};
use biogate_engine::EngineConfig;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("BIOGATE_CONFIG_PATH").unwrap_or("/usr/local/etc/biogate/config.toml"))
});

pub static STORE_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("BIOGATE_STORE_PREFIX").unwrap_or("/usr/local/var/biogate"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    pub scanner: String,
    pub store_dir: PathBuf,
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "camera0".to_string(),
            scanner: "scanner0".to_string(),
            store_dir: STORE_PREFIX.to_path_buf(),
            engine: EngineConfig::default(),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
