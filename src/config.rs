// file: src/config.rs
// description: application configuration management with toml and environment support
// reference: https://docs.rs/config

use crate::error::{DocsKbError, Result};
use crate::utils::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub github: GitHubConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub knowledge: KnowledgeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    pub extensions: Vec<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    pub max_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_batch_size: usize,
    pub transient_retries: usize,
    pub allow_empty_listing: bool,
    pub lock_stale_after_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeConfig {
    pub uri: String,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    pub embedding_dim: usize,
    pub max_embed_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub default_query_limit: usize,
    pub max_query_limit: usize,
    pub max_files_per_request: usize,
    pub max_concurrency: usize,
}

impl SyncConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let defaults = config::Config::try_from(&Self::default_config())
            .map_err(|e| DocsKbError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new("config/default.toml")).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOCS_KB")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| DocsKbError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| DocsKbError::Config(e.to_string()))?;

        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        let data_dir = std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".docs-kb"))
            .unwrap_or_else(|_| PathBuf::from(".docs-kb"));
        let lancedb_uri = data_dir.join("lancedb").to_string_lossy().to_string();

        Self {
            github: GitHubConfig {
                api_url: "https://api.github.com".to_string(),
                token: None,
                user_agent: format!("docs_kb/{}", env!("CARGO_PKG_VERSION")),
                request_timeout_secs: 30,
            },
            sync: SyncConfig {
                extensions: vec![".md".to_string(), ".mdx".to_string()],
                path_prefix: None,
                max_concurrency: 20,
                fetch_timeout_secs: 30,
                fetch_batch_size: 100,
                transient_retries: 1,
                allow_empty_listing: false,
                lock_stale_after_secs: 3600,
            },
            storage: StorageConfig { data_dir },
            knowledge: KnowledgeConfig {
                uri: lancedb_uri,
                embedding_url: "http://localhost:11434/v1/embeddings".to_string(),
                embedding_model: "nomic-embed-text".to_string(),
                embedding_api_key: None,
                embedding_dim: 768,
                max_embed_chars: 8000,
            },
            server: ServerConfig {
                default_query_limit: 10,
                max_query_limit: 50,
                max_files_per_request: 50,
                max_concurrency: 20,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        Validator::validate_url(&self.github.api_url)?;
        Validator::validate_url(&self.knowledge.embedding_url)?;

        if self.sync.max_concurrency == 0 {
            return Err(DocsKbError::Config(
                "sync.max_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.sync.fetch_batch_size == 0 {
            return Err(DocsKbError::Config(
                "sync.fetch_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.sync.fetch_timeout_secs == 0 {
            return Err(DocsKbError::Config(
                "sync.fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.sync.extensions.is_empty() {
            return Err(DocsKbError::Config(
                "sync.extensions must list at least one extension".to_string(),
            ));
        }

        if self.knowledge.embedding_dim == 0 {
            return Err(DocsKbError::Config(
                "knowledge.embedding_dim must be greater than 0".to_string(),
            ));
        }

        if self.server.max_concurrency == 0 || self.server.max_query_limit == 0 {
            return Err(DocsKbError::Config(
                "server limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn repositories_dir(&self) -> PathBuf {
        self.storage.data_dir.join("repositories")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.storage.data_dir.join("locks")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.extensions, vec![".md", ".mdx"]);
        assert_eq!(config.sync.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default_config();
        config.sync.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_overrides_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("docs_kb.toml");
        fs::write(
            &path,
            "[sync]\nmax_concurrency = 4\nextensions = [\".md\"]\n\n[storage]\ndata_dir = \"/tmp/docs-kb-test\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.sync.max_concurrency, 4);
        assert_eq!(config.sync.extensions, vec![".md"]);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/docs-kb-test"));
        // untouched keys keep their defaults
        assert_eq!(config.sync.fetch_batch_size, 100);
    }

    #[test]
    fn test_derived_directories() {
        let mut config = Config::default_config();
        config.storage.data_dir = PathBuf::from("/data");
        assert_eq!(config.repositories_dir(), PathBuf::from("/data/repositories"));
        assert_eq!(config.locks_dir(), PathBuf::from("/data/locks"));
    }
}
