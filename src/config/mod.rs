//! Application configuration management

mod descriptors;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use descriptors::DescriptorFile;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// SQLite database URL (`sqlite://path` or `sqlite::memory:`)
    pub database_url: String,

    /// YAML or JSON file holding entity descriptors and options
    pub entities_path: PathBuf,

    pub database_max_connections: u32,

    /// Issue `CREATE TABLE IF NOT EXISTS` for every entity on startup
    pub create_tables: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/entity-graphql.db".to_string()),

            entities_path: env::var("ENTITIES_PATH")
                .unwrap_or_else(|_| "./entities.yaml".to_string())
                .into(),

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,

            create_tables: env::var("CREATE_TABLES")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid CREATE_TABLES")?,
        })
    }

    /// Directory holding the SQLite file, if the URL points at one.
    pub fn database_dir(&self) -> Option<PathBuf> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        if path.starts_with(':') {
            return None;
        }
        let path = path.split('?').next().unwrap_or(path);
        PathBuf::from(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
    }
}
