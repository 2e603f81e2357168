//! Backend selection with local fallback.
//!
//! Each operation first tries the remote backend (when one is configured and
//! the caller did not ask for local execution), then the local engine. A remote
//! failure is logged and recorded on the step but never returned; if the local
//! engine fails as well, its error is the result.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::backend::{BackendKind, LocalBackend, TransformBackend};
use crate::config::{ConfigError, ConverterConfig};
use crate::error::ConversionError;
use crate::options::{JsonLdTransformOptions, XmlTransformOptions};
use crate::remote::RemoteBackend;

/// Whether the remote backend may be used for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "local", alias = "local-only")]
    LocalOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Migrate,
    Project,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Migrate => write!(f, "migrate"),
            Operation::Project => write!(f, "project"),
        }
    }
}

/// How one step of a conversion was carried out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub operation: Operation,
    pub backend: BackendKind,
    /// Remote failure absorbed before falling back, if any
    pub remote_failure: Option<String>,
}

/// Output of a conversion plus the steps that produced it
#[derive(Debug, Clone)]
pub struct Conversion {
    pub output: String,
    pub steps: Vec<StepRecord>,
}

impl Conversion {
    pub fn used_fallback(&self) -> bool {
        self.steps.iter().any(|step| step.remote_failure.is_some())
    }
}

enum Request<'a> {
    Migrate {
        xml: &'a str,
        options: &'a XmlTransformOptions,
    },
    Project {
        xml: &'a str,
        options: &'a JsonLdTransformOptions,
    },
}

impl Request<'_> {
    fn operation(&self) -> Operation {
        match self {
            Request::Migrate { .. } => Operation::Migrate,
            Request::Project { .. } => Operation::Project,
        }
    }

    async fn send(&self, backend: &dyn TransformBackend) -> Result<String, ConversionError> {
        match self {
            Request::Migrate { xml, options } => backend.migrate(xml, options).await,
            Request::Project { xml, options } => backend.project(xml, options).await,
        }
    }
}

/// Arbitrates between a local engine and an optional remote service
pub struct FallbackCoordinator {
    local: Arc<dyn TransformBackend>,
    remote: Option<Arc<dyn TransformBackend>>,
}

impl FallbackCoordinator {
    pub fn new(
        local: Arc<dyn TransformBackend>,
        remote: Option<Arc<dyn TransformBackend>>,
    ) -> Self {
        Self { local, remote }
    }

    pub fn local_only() -> Self {
        Self::new(Arc::new(LocalBackend), None)
    }

    /// Build from a configuration, validating it first
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let remote = match &config.remote {
            Some(remote) => {
                let backend: Arc<dyn TransformBackend> =
                    Arc::new(RemoteBackend::new(remote.clone())?);
                Some(backend)
            }
            None => None,
        };
        Ok(Self::new(Arc::new(LocalBackend), remote))
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn remote_for(&self, mode: ExecutionMode) -> Option<&dyn TransformBackend> {
        match mode {
            ExecutionMode::Auto => self.remote.as_deref(),
            ExecutionMode::LocalOnly => None,
        }
    }

    async fn run(
        &self,
        request: Request<'_>,
        mode: ExecutionMode,
    ) -> Result<(String, StepRecord), ConversionError> {
        let operation = request.operation();
        let mut remote_failure = None;

        if let Some(remote) = self.remote_for(mode) {
            match request.send(remote).await {
                Ok(output) => {
                    info!("{} completed on {} backend", operation, remote.kind());
                    return Ok((
                        output,
                        StepRecord {
                            operation,
                            backend: remote.kind(),
                            remote_failure: None,
                        },
                    ));
                }
                Err(e) => {
                    warn!("Remote {} failed, falling back to local engine: {}", operation, e);
                    remote_failure = Some(e.to_string());
                }
            }
        }

        let output = request.send(self.local.as_ref()).await?;
        info!("{} completed on {} backend", operation, self.local.kind());
        Ok((
            output,
            StepRecord {
                operation,
                backend: self.local.kind(),
                remote_failure,
            },
        ))
    }

    /// Version 1 XML to version 2 XML
    pub async fn convert_to_v2(
        &self,
        xml: &str,
        options: &XmlTransformOptions,
        mode: ExecutionMode,
    ) -> Result<Conversion, ConversionError> {
        let (output, step) = self.run(Request::Migrate { xml, options }, mode).await?;
        Ok(Conversion {
            output,
            steps: vec![step],
        })
    }

    /// Version 2 XML to JSON-LD
    pub async fn convert_to_jsonld(
        &self,
        xml: &str,
        options: &JsonLdTransformOptions,
        mode: ExecutionMode,
    ) -> Result<Conversion, ConversionError> {
        let (output, step) = self.run(Request::Project { xml, options }, mode).await?;
        Ok(Conversion {
            output,
            steps: vec![step],
        })
    }

    /// Version 1 XML to JSON-LD as migrate then project, each step with its
    /// own fallback
    pub async fn convert_v1_to_jsonld(
        &self,
        xml: &str,
        options: &JsonLdTransformOptions,
        mode: ExecutionMode,
    ) -> Result<Conversion, ConversionError> {
        let migrate_options = XmlTransformOptions::default();
        let (migrated, first) = self
            .run(
                Request::Migrate {
                    xml,
                    options: &migrate_options,
                },
                mode,
            )
            .await?;
        let (output, second) = self
            .run(
                Request::Project {
                    xml: &migrated,
                    options,
                },
                mode,
            )
            .await?;
        Ok(Conversion {
            output,
            steps: vec![first, second],
        })
    }

    /// Probe the remote service; `false` when none is configured. The result
    /// has no influence on later conversions.
    pub async fn test_connection(&self) -> bool {
        match &self.remote {
            Some(remote) => remote.test_connection().await,
            None => false,
        }
    }
}
