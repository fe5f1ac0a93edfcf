use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::fs::FileSystemStorage;
use crate::traits::ObjectStorage;

pub const STORAGE_PROVIDER_ENV: &str = "STORAGE_PROVIDER";
pub const LOCAL_BASE_PATH_ENV: &str = "LOCAL_TEMPLATE_STORAGE_BASE_PATH";
pub const BUCKET_NAME_ENV: &str = "TEMPLATE_BUCKET_NAME";

/// Where template objects live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageProvider {
    #[default]
    #[serde(rename = "GCPBucket")]
    Gcp,
    #[serde(rename = "AWSBucket")]
    Aws,
    Local,
}

impl FromStr for StorageProvider {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GCPBucket" => Ok(Self::Gcp),
            "AWSBucket" => Ok(Self::Aws),
            "Local" => Ok(Self::Local),
            other => Err(StoreError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcp => write!(f, "GCPBucket"),
            Self::Aws => write!(f, "AWSBucket"),
            Self::Local => write!(f, "Local"),
        }
    }
}

/// Template storage configuration, resolved once at process start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    /// Root directory for the `Local` provider.
    pub local_base_path: PathBuf,
    /// Bucket for the cloud providers.
    pub bucket_name: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            local_base_path: PathBuf::from("/tmp/templates"),
            bucket_name: None,
        }
    }
}

impl StorageConfig {
    /// Read `STORAGE_PROVIDER`, `LOCAL_TEMPLATE_STORAGE_BASE_PATH` and
    /// `TEMPLATE_BUCKET_NAME` from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let defaults = Self::default();
        let provider = match lookup(STORAGE_PROVIDER_ENV) {
            Some(value) if !value.is_empty() => value.parse()?,
            _ => defaults.provider,
        };
        let local_base_path = lookup(LOCAL_BASE_PATH_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.local_base_path);
        let bucket_name = lookup(BUCKET_NAME_ENV).filter(|v| !v.is_empty());

        let config = Self {
            provider,
            local_base_path,
            bucket_name,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document with the same fields.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        match self.provider {
            StorageProvider::Local => Ok(()),
            StorageProvider::Gcp | StorageProvider::Aws if self.bucket_name.is_none() => {
                Err(StoreError::Config(format!(
                    "{BUCKET_NAME_ENV} is required for provider {}",
                    self.provider
                )))
            }
            StorageProvider::Gcp | StorageProvider::Aws => Ok(()),
        }
    }

    /// Construct the configured backend.
    pub fn open(&self) -> StoreResult<Arc<dyn ObjectStorage>> {
        self.validate()?;
        match self.provider {
            StorageProvider::Local => {
                let storage = FileSystemStorage::new(&self.local_base_path);
                info!(details = %storage.details(), "opened template storage");
                Ok(Arc::new(storage))
            }
            other => Err(StoreError::UnsupportedProvider(other.to_string())),
        }
    }
}
