//! TOML configuration for a whole engine instance.
//!
//! Every section and field has a default, so an empty file is valid:
//!
//! ```toml
//! [chunker]
//! kind = "markdown"
//! max_tokens = 256
//!
//! [embedder]
//! provider = "tfidf"
//! max_vocab = 4096
//!
//! [index]
//! m = 16
//! ef_search = 64
//!
//! [storage]
//! backend = "sqlite"
//! path = ".recall/index.db"
//!
//! [indexer]
//! extensions = ["md"]
//! poll_interval_secs = 30
//! ```

use crate::index::HnswConfig;
use crate::storage::{StorageBackend, StorageConfig};
use recall_context::ChunkerConfig;
use recall_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory inside a workspace that holds the default database.
pub const DATA_DIR: &str = ".recall";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the file [`Indexer`](crate::indexer::Indexer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// File extensions to index, without the dot
    pub extensions: Vec<String>,
    /// Rescan period for `watch`; no background loop when unset
    pub poll_interval_secs: Option<u64>,
    /// Upper bound for a single background scan
    pub scan_timeout_secs: u64,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string()],
            poll_interval_secs: None,
            scan_timeout_secs: 300,
        }
    }
}

impl IndexerSettings {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    pub chunker: ChunkerConfig,
    pub embedder: EmbedConfig,
    pub index: HnswConfig,
    pub storage: StorageConfig,
    pub indexer: IndexerSettings,
}

impl RecallConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Catch settings that would only fail once the engine is running.
    ///
    /// Remote embedder credentials are checked when the provider is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunker.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "chunker.max_tokens must be positive".to_string(),
            ));
        }
        if let EmbedConfig::TfIdf(tfidf) = &self.embedder {
            if tfidf.max_vocab == 0 {
                return Err(ConfigError::Invalid(
                    "embedder.max_vocab must be positive".to_string(),
                ));
            }
        }
        self.index
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("index: {e}")))?;
        if self.indexer.extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "indexer.extensions must not be empty".to_string(),
            ));
        }
        if self.indexer.poll_interval_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "indexer.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.indexer.scan_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "indexer.scan_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve workspace-relative settings: a missing SQLite path becomes
    /// `<workspace>/.recall/index.db` and a relative one is joined onto the
    /// workspace.
    pub fn with_workspace(mut self, workspace: &Path) -> Self {
        if self.storage.backend == StorageBackend::Sqlite {
            let path = match self.storage.path.take() {
                Some(path) if path.is_relative() => workspace.join(path),
                Some(path) => path,
                None => workspace.join(DATA_DIR).join("index.db"),
            };
            self.storage.path = Some(path);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_context::ChunkerKind;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: RecallConfig = toml::from_str("").unwrap();
        assert_eq!(config, RecallConfig::default());
        assert_eq!(config.indexer.extensions, vec!["md"]);
        assert_eq!(config.index.m, 16);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_file() {
        let text = r#"
            [chunker]
            kind = "fixed"
            max_tokens = 64
            overlap = 8

            [embedder]
            provider = "tfidf"
            max_vocab = 512

            [index]
            m = 8
            ef_search = 32
            seed = 7

            [storage]
            backend = "memory"

            [indexer]
            extensions = ["md", "txt"]
            poll_interval_secs = 15
        "#;
        let config: RecallConfig = toml::from_str(text).unwrap();
        assert_eq!(config.chunker.kind, ChunkerKind::Fixed);
        assert_eq!(config.chunker.overlap, 8);
        assert!(matches!(config.embedder, EmbedConfig::TfIdf(ref t) if t.max_vocab == 512));
        assert_eq!(config.index.m, 8);
        assert_eq!(config.index.ef_construction, 200);
        assert_eq!(config.index.seed, Some(7));
        assert_eq!(config.storage, StorageConfig::memory());
        assert_eq!(config.indexer.poll_interval(), Some(Duration::from_secs(15)));
        assert_eq!(config.indexer.scan_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_load_reports_errors() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let missing = RecallConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let bad_path = dir.path().join("bad.toml");
        std::fs::File::create(&bad_path)?.write_all(b"[index\nm = ")?;
        assert!(matches!(
            RecallConfig::load(&bad_path),
            Err(ConfigError::Parse { .. })
        ));

        let invalid_path = dir.path().join("invalid.toml");
        std::fs::write(&invalid_path, "[indexer]\nextensions = []\n")?;
        assert!(matches!(
            RecallConfig::load(&invalid_path),
            Err(ConfigError::Invalid(_))
        ));

        let good_path = dir.path().join("good.toml");
        std::fs::write(&good_path, "[chunker]\nmax_tokens = 100\n")?;
        assert_eq!(RecallConfig::load(&good_path)?.chunker.max_tokens, 100);
        Ok(())
    }

    #[test]
    fn test_with_workspace_resolves_database_path() {
        let workspace = Path::new("/work");

        let config = RecallConfig::default().with_workspace(workspace);
        assert_eq!(
            config.storage.path.as_deref(),
            Some(Path::new("/work/.recall/index.db"))
        );

        let mut relative = RecallConfig::default();
        relative.storage.path = Some(PathBuf::from("db/recall.db"));
        assert_eq!(
            relative.with_workspace(workspace).storage.path.as_deref(),
            Some(Path::new("/work/db/recall.db"))
        );

        let memory = RecallConfig {
            storage: StorageConfig::memory(),
            ..Default::default()
        };
        assert_eq!(memory.with_workspace(workspace).storage.path, None);
    }
}
