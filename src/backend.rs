use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConversionError;
use crate::migrator::SchemaMigrator;
use crate::options::{JsonLdTransformOptions, XmlTransformOptions};
use crate::projector::EventProjector;

/// Which engine produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// An engine able to perform both document transformations
#[async_trait]
pub trait TransformBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Version 1 (or 2) XML in, version 2 XML out
    async fn migrate(
        &self,
        xml: &str,
        options: &XmlTransformOptions,
    ) -> Result<String, ConversionError>;

    /// Version 2 XML in, rendered JSON-LD out
    async fn project(
        &self,
        xml: &str,
        options: &JsonLdTransformOptions,
    ) -> Result<String, ConversionError>;

    /// Best-effort reachability probe
    async fn test_connection(&self) -> bool;
}

/// In-process engine built on [`SchemaMigrator`] and [`EventProjector`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend;

#[async_trait]
impl TransformBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn migrate(
        &self,
        xml: &str,
        options: &XmlTransformOptions,
    ) -> Result<String, ConversionError> {
        SchemaMigrator::new(*options).migrate_text(xml)
    }

    async fn project(
        &self,
        xml: &str,
        options: &JsonLdTransformOptions,
    ) -> Result<String, ConversionError> {
        EventProjector::new(*options).project_text(xml)
    }

    async fn test_connection(&self) -> bool {
        true
    }
}
