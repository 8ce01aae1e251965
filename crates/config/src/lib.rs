// Configuration Management
//
// This crate handles all configuration loading for the chat API.
// It provides:
// - Configuration structs with environment and YAML loading
// - Default configuration values
//
// This keeps configuration concerns separate from domain logic.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found. Tried paths: {paths}")]
    FileNotFound { paths: String },

    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("Invalid environment configuration: {0}")]
    Environment(String),
}

const CONFIG_PATHS: [&str; 3] = ["config/config.yaml", "config.yaml", "config/default.yaml"];

/// Main configuration loading interface
impl ApiConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ApiConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from the first YAML file found, falling back to the environment
    pub fn load() -> Result<Self, ConfigError> {
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        Self::from_env().map_err(ConfigError::Environment)
    }

    /// Load configuration strictly from a file location, failing when none exists
    pub fn load_file_only() -> Result<Self, ConfigError> {
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        Err(ConfigError::FileNotFound {
            paths: CONFIG_PATHS.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_yaml_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: 127.0.0.1
  port: 8080
database:
  host: localhost
  port: 5432
  database: chat
  username: postgres
  password: postgres
completion:
  api_key: test-key
"#
        )
        .unwrap();

        let config = ApiConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.completion.api_key, "test-key");
        assert_eq!(
            config.completion.base_url,
            "https://api.groq.com/openai/v1"
        );
        assert_eq!(config.logging.level, "info");
        assert!(config.rag.is_none());
        assert!(config.web_search.api_key.is_none());
        assert_eq!(config.guest.retention_days, 30);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_load_from_file_with_rag_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database:
  host: db
  port: 5432
  database: chat
  username: u
  password: p
completion:
  api_key: k
rag:
  embedding_api_key: sk-embed
  max_results: 3
"#
        )
        .unwrap();

        let config = ApiConfig::load_from_file(file.path()).unwrap();
        let rag = config.rag.expect("rag section should be parsed");

        assert_eq!(rag.embedding_api_key, "sk-embed");
        assert_eq!(rag.max_results, 3);
        assert_eq!(rag.embedding_model, "text-embedding-3-small");
        assert!((rag.score_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server: [not, a, map").unwrap();

        let err = ApiConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
