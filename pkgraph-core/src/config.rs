use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Which graph store backend the import writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Neo4j,
    Sqlite,
}

/// Top-level pkgraph configuration, matching `pkgraph.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PkgraphConfig {
    #[serde(default)]
    pub dataset: DatasetSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub neo4j: Neo4jSection,
    #[serde(default)]
    pub sqlite: SqliteSection,
}

impl PkgraphConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSection {
    /// Directory holding `<category>.json` lists and `packages/`.
    pub root: PathBuf,
}

impl Default for DatasetSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dataset"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jSection {
    pub uri: String,
    pub user: String,
    /// Environment variable consulted first for the password.
    pub password_env: String,
    /// Fallback password when the environment variable is unset.
    pub password: Option<String>,
    pub database: Option<String>,
}

impl Default for Neo4jSection {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password_env: "PKGRAPH_NEO4J_PASSWORD".to_string(),
            password: Some("password".to_string()),
            database: None,
        }
    }
}

impl Neo4jSection {
    pub fn resolve_password(&self) -> Result<String, ConfigError> {
        std::env::var(&self.password_env)
            .ok()
            .or_else(|| self.password.clone())
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "neo4j password not set (export {} or set neo4j.password)",
                    self.password_env
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSection {
    pub path: PathBuf,
}

impl Default for SqliteSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pkgraph.db"),
        }
    }
}
