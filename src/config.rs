use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::engine::PlatformConfig;
use crate::error::SomaError;
use crate::store::default_storage_root;

pub const CONFIG_FILE: &str = "soma-ingest.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub storage_root: Option<String>,
    #[serde(default)]
    pub platform_config: Option<PlatformConfig>,
    #[serde(default)]
    pub alt_name: Option<String>,
    #[serde(default)]
    pub index_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub storage_root: Utf8PathBuf,
    pub platform_config: PlatformConfig,
    pub alt_name: String,
    pub index_prefix: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`, or `soma-ingest.json` in the working directory. An absent
    /// default file yields the built-in defaults; an absent explicit file is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SomaError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SomaError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SomaError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, SomaError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(SomaError::ConfigParse(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let storage_root = match config.storage_root {
            Some(root) if root.trim().is_empty() => {
                return Err(SomaError::Configuration(
                    "storage_root must not be empty".to_string(),
                ));
            }
            Some(root) => Utf8PathBuf::from(root.trim()),
            None => default_storage_root()?,
        };

        Ok(ResolvedConfig {
            schema_version,
            storage_root,
            platform_config: config.platform_config.unwrap_or_default(),
            alt_name: config.alt_name.unwrap_or_else(default_alt_name),
            index_prefix: config.index_prefix.unwrap_or_else(default_index_prefix),
        })
    }
}

pub fn default_alt_name() -> String {
    "cellID".to_string()
}

pub fn default_index_prefix() -> String {
    "soma".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_explicit_values() {
        let config = Config {
            schema_version: None,
            storage_root: Some("/data/soma".to_string()),
            platform_config: None,
            alt_name: Some("barcode".to_string()),
            index_prefix: None,
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.storage_root, Utf8PathBuf::from("/data/soma"));
        assert_eq!(resolved.alt_name, "barcode");
        assert_eq!(resolved.index_prefix, default_index_prefix());
        assert!(resolved.platform_config.is_empty());
    }
}
