//! Application configuration.
//!
//! Settings come from a TOML file, then environment variables prefixed with
//! `DELTA_UTILS` override individual keys (`DELTA_UTILS__STORAGE__ACCESS_KEY`).

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

use crate::error::{Error, Result};
use crate::logging::LogFormat;
use crate::table::{TableLocation, DEFAULT_DATE_COLUMN};

const ENV_PREFIX: &str = "DELTA_UTILS";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub table: TableConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    S3(StoreConfig),
    Filesystem { root: PathBuf, bucket: String },
}

/// Connection settings for an S3-compatible store.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub bucket: String,
    /// Defaults to true when the endpoint uses plain `http://`.
    #[serde(default)]
    pub allow_http: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub path: String,
    #[serde(default = "default_date_column")]
    pub date_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_date_column() -> String {
    DEFAULT_DATE_COLUMN.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file with environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        Self::build(Some(path), environment())
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::build(None, environment())
    }

    fn build(path: Option<&str>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        let config = builder.add_source(env).build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        match &self.storage {
            StorageConfig::S3(store) => store.validate()?,
            StorageConfig::Filesystem { root, bucket } => {
                if root.as_os_str().is_empty() {
                    return Err(Error::Config("filesystem root must not be empty".into()));
                }
                validate_bucket_name(bucket)?;
            }
        }

        TableLocation::new(self.bucket(), &self.table.path)?;

        if self.table.date_column.trim().is_empty() {
            return Err(Error::Config("table.date_column must not be empty".into()));
        }

        Ok(())
    }

    pub fn bucket(&self) -> &str {
        match &self.storage {
            StorageConfig::S3(store) => &store.bucket,
            StorageConfig::Filesystem { bucket, .. } => bucket,
        }
    }

    /// Location of the configured table.
    pub fn table_location(&self) -> Result<TableLocation> {
        TableLocation::new(self.bucket(), &self.table.path)
    }
}

impl StoreConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: default_region(),
            bucket: bucket.into(),
            allow_http: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "endpoint '{}' must use http or https",
                self.endpoint
            )));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::Config("access_key and secret_key are required".into()));
        }
        if self.region.is_empty() {
            return Err(Error::Config("region must not be empty".into()));
        }
        validate_bucket_name(&self.bucket)
    }

    pub fn allow_http(&self) -> bool {
        self.allow_http
            .unwrap_or_else(|| self.endpoint.starts_with("http://"))
    }
}

/// S3 bucket naming rules: 3-63 chars of lowercase letters, digits, `-` and
/// `.`, starting and ending with a letter or digit.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);

    if (3..=63).contains(&name.len()) && valid_chars && valid_edges && !name.contains("..") {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid bucket name '{}'", name)))
    }
}
