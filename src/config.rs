use crate::descriptor::{ConnectionDescriptor, Credentials};
use crate::error::ConfigError;
use std::time::Duration;

/// Name of the access list file inside the base folder
pub const ACCESS_LIST_FILE: &str = "allowed_ids.txt";

/// Connect timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connections made for uploads and access list updates
    pub connect: Duration,
    /// Connections made by health checks
    pub probe: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            probe: Duration::from_secs(10),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Where files go
    pub descriptor: ConnectionDescriptor,
    /// Folder under the login root holding user folders and the access list
    pub base_folder: Option<String>,
    /// Identities allowed before the remote list is loaded
    pub seed_ids: Vec<i64>,
    pub timeouts: Timeouts,
}

impl StoreConfig {
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            base_folder: None,
            seed_ids: Vec::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Set the base folder. Blank values mean "no base folder".
    pub fn base_folder(mut self, folder: impl Into<String>) -> Self {
        let folder = folder.into();
        let trimmed = folder.trim().trim_matches('/');
        self.base_folder = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn seed_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.seed_ids.extend(ids);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build from environment variables
    ///
    /// `STORE_HOST`, `STORE_USER`, `STORE_PASS` (or the older `FTP_HOST`,
    /// `FTP_USER`, `FTP_PASS`), optional `BASE_FOLDER` and `ALLOWED_IDS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` with a pluggable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let either = |primary: &str, legacy: &str| lookup(primary).or_else(|| lookup(legacy));

        let host = either("STORE_HOST", "FTP_HOST").ok_or(ConfigError::Missing("STORE_HOST"))?;
        let user = either("STORE_USER", "FTP_USER").unwrap_or_default();
        let secret = either("STORE_PASS", "FTP_PASS").unwrap_or_default();

        let descriptor = ConnectionDescriptor::parse(&host, Credentials::new(user, secret));
        let mut config = Self::new(descriptor);

        if let Some(folder) = lookup("BASE_FOLDER") {
            config = config.base_folder(folder);
        }
        if let Some(ids) = lookup("ALLOWED_IDS") {
            config = config.seed_ids(parse_seed_ids(&ids)?);
        }

        Ok(config)
    }
}

/// Parse a comma separated list of identities, skipping empty items
pub fn parse_seed_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse()
                .map_err(|_| ConfigError::InvalidIdentity(item.to_string()))
        })
        .collect()
}
