mod file_config;

pub use file_config::{FileConfig, HistoryConfig};

use crate::history_store::{latest_schema_version, IdentityKey};
use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub supported_version: Option<usize>,
    pub identity_key: Option<IdentityKey>,
}

/// Everything [`crate::DbProvider`] needs to open a history database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub db_path: PathBuf,
    /// Schema version this process reads and writes. Files stamped with a
    /// newer version are refused.
    pub supported_version: usize,
    pub identity_key: IdentityKey,
}

impl DbConfig {
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Self {
        Self {
            db_path: db_path.into(),
            supported_version: latest_schema_version(),
            identity_key: IdentityKey::default(),
        }
    }

    pub fn with_supported_version(mut self, supported_version: usize) -> Self {
        self.supported_version = supported_version;
        self
    }

    pub fn with_identity_key(mut self, identity_key: IdentityKey) -> Self {
        self.identity_key = identity_key;
        self
    }

    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.and_then(|f| f.history).unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow!("db_path must be specified on the command line or in the config file")
            })?;

        let identity_key = match file.identity_key {
            Some(s) => IdentityKey::parse(&s).ok_or_else(|| {
                anyhow!(
                    "Invalid identity_key {:?}, expected \"{}\" or \"{}\"",
                    s,
                    IdentityKey::TypeAndId.as_str(),
                    IdentityKey::ResourceIdOnly.as_str()
                )
            })?,
            None => cli.identity_key.unwrap_or_default(),
        };

        let supported_version = file
            .supported_version
            .or(cli.supported_version)
            .unwrap_or_else(latest_schema_version);

        Ok(Self {
            db_path,
            supported_version,
            identity_key,
        })
    }
}
