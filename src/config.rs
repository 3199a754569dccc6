//! Configuration for feedback-board
//!
//! Built once in `main` and passed to the HTTP server. The services never
//! see it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BoardError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedback-board")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Database file name inside storage_dir
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Address to bind the HTTP server to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Presentation settings served to the front end
    #[serde(default)]
    pub site: SiteConfig,
}

/// Text shown by the board front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub heading: String,

    /// Name used when a visitor has not entered one
    #[serde(default = "default_anonymous_name")]
    pub anonymous_name: String,
}

fn default_db_file() -> String {
    "feedback.db".to_string()
}

fn default_http_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_title() -> String {
    "Feedback".to_string()
}

fn default_anonymous_name() -> String {
    "Anonym".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            heading: String::new(),
            anonymous_name: default_anonymous_name(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            db_file: default_db_file(),
            http_port: default_http_port(),
            bind_address: default_bind_address(),
            site: SiteConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BoardError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BoardError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BoardError> {
        let content = toml::to_string_pretty(self).map_err(|e| BoardError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.db_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            http_port = 8099

            [site]
            title = "Wunschliste"
            "#,
        )
        .unwrap();

        assert_eq!(config.http_port, 8099);
        assert_eq!(config.db_file, "feedback.db");
        assert_eq!(config.site.title, "Wunschliste");
        assert_eq!(config.site.anonymous_name, "Anonym");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage_dir = dir.path().to_path_buf();
        config.site.heading = "Ideas".to_string();

        config.save(config.config_path()).unwrap();
        let loaded = Config::load(config.config_path()).unwrap();

        assert_eq!(loaded.site, config.site);
        assert_eq!(loaded.db_path(), dir.path().join("feedback.db"));
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "http_port = \"not a number\"").unwrap();
        assert!(matches!(Config::load(&path), Err(BoardError::Config(_))));
    }
}
