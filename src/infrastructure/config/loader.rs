use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, EmbeddingProviderKind, IndexBackend};

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".patternbase";

/// Environment variable prefix; `__` separates nested keys.
pub const ENV_PREFIX: &str = "PATTERNBASE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid vector index url: {0:?}. Must start with http:// or https://")]
    InvalidIndexUrl(String),

    #[error("Collection name cannot be empty")]
    EmptyCollection,

    #[error("Invalid {0}: must be greater than 0")]
    ZeroValue(&'static str),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid retry jitter: {0}. Must be between 0.0 and 1.0")]
    InvalidJitter(f64),

    #[error("Invalid min_score: {0}. Must be a finite number")]
    InvalidMinScore(f32),

    #[error("Embedding model {0} is not a local model; set embedding.provider to openai")]
    NonLocalModel(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .patternbase/config.yaml (project config)
    /// 3. .patternbase/local.yaml (project local overrides, optional)
    /// 4. Environment variables (PATTERNBASE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`load`](Self::load) with the project rooted at `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let config_dir = root.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_dir.join("config.yaml")))
            .merge(Yaml::file(config_dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        // Embedding
        let embedding = &config.embedding;
        match embedding.provider {
            EmbeddingProviderKind::Local if !embedding.model.is_local() => {
                return Err(ConfigError::NonLocalModel(embedding.model.to_string()));
            }
            EmbeddingProviderKind::Openai if embedding.openai.dimension == 0 => {
                return Err(ConfigError::ZeroValue("embedding.openai.dimension"));
            }
            EmbeddingProviderKind::Openai if embedding.openai.max_batch_size == 0 => {
                return Err(ConfigError::ZeroValue("embedding.openai.max_batch_size"));
            }
            _ => {}
        }
        if embedding.load_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("embedding.load_timeout_ms"));
        }

        // Vector index
        let index = &config.vector_index;
        if index.backend == IndexBackend::Http
            && !(index.url.starts_with("http://") || index.url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidIndexUrl(index.url.clone()));
        }
        if index.collection.trim().is_empty() {
            return Err(ConfigError::EmptyCollection);
        }
        if index.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("vector_index.request_timeout_ms"));
        }

        let retry = &index.retry;
        if retry.initial_backoff_ms == 0 {
            return Err(ConfigError::ZeroValue("vector_index.retry.initial_backoff_ms"));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(ConfigError::InvalidJitter(retry.jitter));
        }

        // Cache
        if config.cache.enabled && config.cache.memory_capacity == 0 {
            return Err(ConfigError::ZeroValue("cache.memory_capacity"));
        }
        if config.cache.directory.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "cache.directory cannot be empty; omit it for memory-only caching".to_string(),
            ));
        }

        // Knowledge base
        if config.knowledge_base.default_limit == 0 {
            return Err(ConfigError::ZeroValue("knowledge_base.default_limit"));
        }
        if let Some(min_score) = config.knowledge_base.min_score {
            if !min_score.is_finite() {
                return Err(ConfigError::InvalidMinScore(min_score));
            }
        }

        // Lifecycle
        if config.lifecycle.init_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("lifecycle.init_timeout_ms"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Distance, EmbeddingModel};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vector_index.url, "http://localhost:6333");
        assert_eq!(config.vector_index.collection, "patterns");
        assert!(!config.vector_index.critical);
        assert_eq!(config.embedding.model.dimensions(), 384);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
logging:
  level: debug
  format: json
embedding:
  model: local_mpnet
vector_index:
  url: https://qdrant.internal:6333
  collection: snippets
  distance: dot
  critical: true
  search_dialect: search
  retry:
    max_retries: 5
cache:
  directory: /var/cache/patternbase
  max_disk_bytes: 1048576
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.embedding.model, EmbeddingModel::LocalMPNet);
        assert_eq!(config.vector_index.collection, "snippets");
        assert_eq!(config.vector_index.distance, Distance::Dot);
        assert!(config.vector_index.critical);
        assert_eq!(config.vector_index.retry.max_retries, 5);
        assert_eq!(config.vector_index.retry.initial_backoff_ms, 200);
        assert_eq!(config.cache.max_disk_bytes, Some(1_048_576));

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_index_url() {
        let mut config = Config::default();
        config.vector_index.url = "localhost:6333".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidIndexUrl(_)
        ));

        config.vector_index.backend = IndexBackend::Memory;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.vector_index.retry.initial_backoff_ms = 30_000;
        config.vector_index.retry.max_backoff_ms = 10_000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.knowledge_base.default_limit = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroValue("knowledge_base.default_limit")
        ));

        let mut config = Config::default();
        config.lifecycle.init_timeout_ms = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_cloud_model_needs_openai_provider() {
        let mut config = Config::default();
        config.embedding.model = EmbeddingModel::OpenAISmall;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::NonLocalModel(_)
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "logging:\n  level: info\n  format: json\nvector_index:\n  collection: base"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "logging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.logging.level, "debug", "Override should win");
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
        assert_eq!(config.vector_index.collection, "base");
    }
}
