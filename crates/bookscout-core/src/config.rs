use bookscout_api::{RetryConfig, SortOrder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
///
/// Loaded from `<config_dir>/bookscout/config.toml`. Priority is
/// CLI > env > file > defaults; the CLI applies its overrides on top.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Config {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> crate::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)
                .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// XDG config dir on Linux, Application Support on macOS, AppData on Windows
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?;
        Ok(config_dir.join("bookscout").join("config.toml"))
    }

    /// Where the bookmark database lives unless `storage.db_path` says otherwise
    pub fn database_path(&self) -> crate::Result<PathBuf> {
        if let Some(path) = &self.storage.db_path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find data directory".into()))?;
        Ok(data_dir.join("bookscout").join("bookscout.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    /// Kakao REST API key, sent as `Authorization: KakaoAK <key>`
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Results per page (the API accepts 1-50)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub sort: SortOrder,
}

fn default_base_url() -> String {
    "https://dapi.kakao.com".to_string()
}

fn default_page_size() -> u32 {
    10
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            page_size: default_page_size(),
            sort: SortOrder::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Override for the SQLite file
    pub db_path: Option<PathBuf>,

    /// Size of the recently viewed list
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

fn default_recent_limit() -> usize {
    bookscout_store::DEFAULT_RECENT_CAPACITY
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            recent_limit: default_recent_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

fn default_initial_delay() -> u64 {
    RetryConfig::default().initial_delay_ms
}

fn default_max_delay() -> u64 {
    RetryConfig::default().max_delay_ms
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_retries: settings.max_retries,
            initial_delay_ms: settings.initial_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            ..RetryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.catalog.page_size, 10);
        assert_eq!(config.catalog.base_url, "https://dapi.kakao.com");
        assert_eq!(config.catalog.sort, SortOrder::Accuracy);
        assert_eq!(config.storage.recent_limit, 10);
        assert!(config.catalog.api_key.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [catalog]
            api_key = "abc"
            sort = "latest"
            "#,
        )
        .unwrap();

        assert_eq!(config.catalog.api_key.as_deref(), Some("abc"));
        assert_eq!(config.catalog.sort, SortOrder::Latest);
        assert_eq!(config.catalog.page_size, 10);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bookscout").join("config.toml");

        let mut config = Config::default();
        config.catalog.page_size = 25;
        config.storage.db_path = Some(dir.path().join("books.db"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.database_path().unwrap(), dir.path().join("books.db"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let loaded = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_retry_settings_conversion() {
        let settings = RetrySettings {
            max_retries: 1,
            initial_delay_ms: 20,
            max_delay_ms: 40,
        };
        let retry = RetryConfig::from(&settings);
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.initial_delay_ms, 20);
        assert_eq!(retry.max_delay_ms, 40);
    }
}
