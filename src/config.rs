//! Configuration Management
//!
//! Handles persistent configuration storage for cloudrec.

use crate::context::{Account, Region};
use crate::provider::GatewayConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "CLOUDREC_CACHE_DIR";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Account id stamped on enumerated objects
    #[serde(default)]
    pub account_id: Option<String>,
    /// Account name, also the cache namespace
    #[serde(default)]
    pub account_name: Option<String>,
    /// Managed regions, in enumeration order
    #[serde(default)]
    pub regions: Vec<String>,
    /// Last used region
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
    /// Static gateway token
    #[serde(default)]
    pub gateway_token: Option<String>,
    /// Fall back to Application Default Credentials for gateway tokens
    #[serde(default)]
    pub use_adc: bool,
    /// OAuth scopes for ADC tokens; empty means cloud-platform
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adc_scopes: Vec<String>,
}

impl Config {
    /// `<config dir>/cloudrec`, also home of the log file
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudrec"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from `path`; missing or unparseable files give the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective cache directory (CLI > env > config > default)
    pub fn effective_cache_dir(&self, cli: Option<&Path>) -> PathBuf {
        let env = std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from);
        resolve_cache_dir(cli, env, self.cache_dir.as_deref())
    }

    /// Get effective region (CLI > config > first managed region)
    pub fn effective_region(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(|| self.regions.first().cloned())
    }

    /// Build the account described by this configuration
    pub fn account(&self) -> Result<Account> {
        let id = self.account_id.clone().unwrap_or_default();
        let name = self
            .account_name
            .clone()
            .unwrap_or_else(|| if id.is_empty() { "default".to_string() } else { id.clone() });

        let mut account = Account::new(id, name);
        for mark in &self.regions {
            account.add_region(Region::get(mark)?);
        }
        if let Some(mark) = &self.region {
            account.set_default_region(Region::get(mark)?);
        }
        Ok(account)
    }

    /// Make `region` the default, adding it to the managed regions
    pub fn set_region(&mut self, region: &str) -> Result<()> {
        let region = Region::get(region)?;
        if !self.regions.iter().any(|mark| mark == region.mark()) {
            self.regions.push(region.mark().to_string());
        }
        self.region = Some(region.mark().to_string());
        Ok(())
    }
}

fn resolve_cache_dir(cli: Option<&Path>, env: Option<PathBuf>, config: Option<&Path>) -> PathBuf {
    cli.map(Path::to_path_buf)
        .or(env)
        .or_else(|| config.map(Path::to_path_buf))
        .or_else(|| dirs::cache_dir().map(|p| p.join("cloudrec")))
        .unwrap_or_else(|| PathBuf::from(".cloudrec-cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_precedence() {
        let cli = Path::new("/cli");
        let config = Path::new("/config");

        assert_eq!(
            resolve_cache_dir(Some(cli), Some("/env".into()), Some(config)),
            PathBuf::from("/cli")
        );
        assert_eq!(
            resolve_cache_dir(None, Some("/env".into()), Some(config)),
            PathBuf::from("/env")
        );
        assert_eq!(resolve_cache_dir(None, None, Some(config)), PathBuf::from("/config"));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert_eq!(Config::load_from(&path), Config::default());

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            account_id: Some("123456789012".to_string()),
            regions: vec!["us-west-2".to_string(), "eu-west-1".to_string()],
            gateway: Some(GatewayConfig::new("http://localhost:8080")),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn set_region_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config {
            regions: vec!["us-west-2".to_string()],
            ..Default::default()
        };

        config.set_region("ap-south-1").unwrap();
        config.set_region("us-west-2").unwrap();
        assert!(config.set_region("not a region").is_err());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.region.as_deref(), Some("us-west-2"));
        assert_eq!(loaded.regions, vec!["us-west-2", "ap-south-1"]);
    }

    #[test]
    fn account_from_config() {
        let config = Config {
            account_id: Some("123456789012".to_string()),
            regions: vec!["us-west-2".to_string(), "eu-west-1".to_string()],
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };

        let account = config.account().unwrap();
        assert_eq!(account.name, "123456789012");
        assert_eq!(account.regions().len(), 2);
        assert_eq!(account.default_region().unwrap().mark(), "eu-west-1");
        assert_eq!(config.effective_region(None).as_deref(), Some("eu-west-1"));
        assert_eq!(config.effective_region(Some("us-east-1")).as_deref(), Some("us-east-1"));
    }
}
