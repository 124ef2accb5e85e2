use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::Region;
use crate::error::LamError;
use crate::riot::DEFAULT_MATCH_COUNT;

pub const APP_DIR: &str = "league-account-manager";
pub const CONFIG_FILE: &str = "lam.json";
pub const STORE_FILE: &str = "accounts.json";
pub const API_KEY_ENV: &str = "RIOT_API_KEY";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_region: Option<String>,
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub match_count: Option<u32>,
}

#[derive(Clone)]
pub struct ResolvedConfig {
    pub api_key: Option<String>,
    pub default_region: Region,
    pub store_path: Utf8PathBuf,
    pub request_timeout: Duration,
    pub match_count: u32,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("default_region", &self.default_region)
            .field("store_path", &self.store_path)
            .field("request_timeout", &self.request_timeout)
            .field("match_count", &self.match_count)
            .finish()
    }
}

impl ResolvedConfig {
    pub fn require_api_key(&self) -> Result<&str, LamError> {
        self.api_key.as_deref().ok_or(LamError::MissingApiKey)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path` if given, otherwise the per-user config file. Only an
    /// explicit path is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LamError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR).join(CONFIG_FILE)),
        };

        let mut config = match config_path {
            Some(config_path) if path.is_some() || config_path.exists() => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| LamError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| LamError::ConfigParse(err.to_string()))?
            }
            _ => Config::default(),
        };

        if let Ok(key) = env::var(API_KEY_ENV) {
            config.api_key = Some(key);
        }

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LamError> {
        let default_region = match config.default_region.as_deref() {
            Some(region) => region.parse()?,
            None => Region::Euw1,
        };

        let store_path = match config.store_path {
            Some(path) => Utf8PathBuf::from(path),
            None => default_store_path()?,
        };

        let api_key = config
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(ResolvedConfig {
            api_key,
            default_region,
            store_path,
            request_timeout: Duration::from_secs(
                config.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            match_count: config.match_count.unwrap_or(DEFAULT_MATCH_COUNT),
        })
    }
}

pub fn default_store_path() -> Result<Utf8PathBuf, LamError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_dir().join(APP_DIR).join(STORE_FILE)).ok()
        })
        .ok_or_else(|| LamError::Storage("unable to resolve data directory".to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn explicit_values_win_over_defaults() {
        let config = Config {
            api_key: Some("  RGAPI-123 ".to_string()),
            default_region: Some("na".to_string()),
            store_path: Some("/tmp/lam/accounts.json".to_string()),
            request_timeout_secs: Some(5),
            match_count: Some(20),
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.api_key.as_deref(), Some("RGAPI-123"));
        assert_eq!(resolved.default_region, Region::Na1);
        assert_eq!(resolved.store_path, Utf8PathBuf::from("/tmp/lam/accounts.json"));
        assert_eq!(resolved.request_timeout, Duration::from_secs(5));
        assert_eq!(resolved.match_count, 20);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = Config {
            api_key: Some("   ".to_string()),
            store_path: Some("accounts.json".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_matches!(resolved.require_api_key(), Err(LamError::MissingApiKey));
    }

    #[test]
    fn unknown_region_is_rejected() {
        let config = Config {
            default_region: Some("atlantis".to_string()),
            ..Config::default()
        };
        assert_matches!(
            ConfigLoader::resolve_config(config),
            Err(LamError::InvalidRegion(_))
        );
    }
}
