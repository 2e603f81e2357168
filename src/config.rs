use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::coordinator::ExecutionMode;
use crate::error::TransformationError;
use crate::options::{JsonLdTransformOptions, XmlTransformOptions};

/// Connection settings for the remote transformation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteConfig {
    pub base_url: String,
    pub migrate_path: String,
    pub project_path: String,
    pub health_path: String,
    /// Bound on a full transformation round trip
    pub timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            migrate_path: "/api/convert/v2".to_string(),
            project_path: "/api/convert/jsonld".to_string(),
            health_path: "/health".to_string(),
            timeout_secs: 20,
            probe_timeout_secs: 5,
        }
    }
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Join the base URL and an endpoint path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Top-level converter configuration, usually read from a YAML file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConverterConfig {
    pub remote: Option<RemoteConfig>,
    pub execution: ExecutionMode,
    pub xml: XmlTransformOptions,
    pub json_ld: JsonLdTransformOptions,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create remote client: {0}")]
    Client(#[from] TransformationError),
}

impl ConverterConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ConverterConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };

        let url_pattern = Regex::new(r"^https?://[^\s/]+(/\S*)?$")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !url_pattern.is_match(&remote.base_url) {
            return Err(ConfigError::Invalid(format!(
                "remote.baseUrl '{}' is not an http(s) URL",
                remote.base_url
            )));
        }
        if remote.timeout_secs == 0 || remote.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "remote timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
