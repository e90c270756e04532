// Ledger Configuration
//
// Family identity and page capacity, threaded into the engine and the
// client at construction time.

use serde::{Deserialize, Serialize};

use crate::address::{namespace_prefix, NamespacePrefix};

pub const DEFAULT_FAMILY_NAME: &str = "alethia";
pub const DEFAULT_FAMILY_VERSION: &str = "0.0.1";

/// Maximum number of records per page.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_page_size must be at least 1")]
    ZeroPageSize,

    #[error("family_name must not be empty")]
    EmptyFamilyName,

    #[error("invalid config JSON: {0}")]
    Parse(String),
}

/// Configuration loaded from JSON. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub family_name: String,
    pub family_version: String,
    pub max_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            family_name: DEFAULT_FAMILY_NAME.into(),
            family_version: DEFAULT_FAMILY_VERSION.into(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.family_name.is_empty() {
            return Err(ConfigError::EmptyFamilyName);
        }
        Ok(())
    }

    pub fn namespace_prefix(&self) -> NamespacePrefix {
        namespace_prefix(&self.family_name)
    }
}
