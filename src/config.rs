use std::{
    env, fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

pub const DEFAULT_FREELANCE_FEE_BASIS_POINTS: u32 = 500;
pub const DEFAULT_STOREFRONT_FEE_BASIS_POINTS: u32 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub legacy_dir: PathBuf,
    pub freelance_fee_basis_points: u32,
    pub storefront_fee_basis_points: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            backoff_multiplier: 2,
            max_delay_ms: 5_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            data_dir: default_base_dir().join("data"),
            legacy_dir: default_base_dir().join("legacy"),
            freelance_fee_basis_points: DEFAULT_FREELANCE_FEE_BASIS_POINTS,
            storefront_fee_basis_points: DEFAULT_STOREFRONT_FEE_BASIS_POINTS,
            retry: RetryConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

fn default_base_dir() -> PathBuf {
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn default_config_path() -> Result<PathBuf> {
    let mut path = env::current_dir().map_err(|err| StoreError::Config(err.to_string()))?;
    path.push(".marketfs");
    path.push("config.toml");
    Ok(path)
}

pub fn load_or_default(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let config_path = if let Some(path) = path {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        path
    } else {
        default_config_path()?
    };

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)?;
        let cfg: Config = toml::from_str(&contents)?;
        cfg.ensure_data_dir()?;
        Ok((cfg, config_path))
    } else {
        let cfg = Config::default();
        cfg.ensure_data_dir()?;
        cfg.save(&config_path)?;
        Ok((cfg, config_path))
    }
}

impl Config {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut cfg = self.clone();
        cfg.updated_at = Utc::now();
        let contents = toml::to_string_pretty(&cfg)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn ensure_data_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
