//! Application configuration.
//!
//! Layered: built-in defaults, then `cardsmith.toml` in the working
//! directory, then `CARDSMITH_`-prefixed environment variables (nested
//! keys separated by `__`, e.g. `CARDSMITH_OPENAI__API_KEY`).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub database: DatabaseConfig,
    pub docfile: DocfileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    /// Override for the API base URL (tests, proxies).
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite database file.
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocfileConfig {
    /// Endpoint of the external document-parsing service, if configured.
    pub endpoint: Option<String>,
    pub allow_remote_artifacts: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::default(),
            database: DatabaseConfig::default(),
            docfile: DocfileConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for DocfileConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            allow_remote_artifacts: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("cardsmith.toml"))
            .merge(Env::prefixed("CARDSMITH_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.openai.api_key.is_empty());
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.database.data_dir, PathBuf::from("data"));
        assert!(config.docfile.endpoint.is_none());
        assert!(!config.docfile.allow_remote_artifacts);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cardsmith.toml",
                r#"
                [openai]
                model = "gpt-4.1"

                [docfile]
                endpoint = "http://localhost:9000/parse"
                "#,
            )?;
            let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
                .merge(Toml::file("cardsmith.toml"))
                .extract()?;
            assert_eq!(config.openai.model, "gpt-4.1");
            assert_eq!(
                config.docfile.endpoint.as_deref(),
                Some("http://localhost:9000/parse")
            );
            // Untouched sections keep their defaults.
            assert_eq!(config.database.data_dir, PathBuf::from("data"));
            Ok(())
        });
    }
}
