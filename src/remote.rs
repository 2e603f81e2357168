use async_trait::async_trait;
use log::debug;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;

use crate::backend::{BackendKind, TransformBackend};
use crate::config::RemoteConfig;
use crate::error::{ConversionError, TransformationError};
use crate::event::{validate_jsonld, JsonLdDocument, EPCIS_JSONLD_CONTEXT};
use crate::options::{JsonLdTransformOptions, XmlTransformOptions};
use crate::schema_version::SchemaVersion;
use crate::validation::{parse_well_formed, require_version};

const XML_CONTENT_TYPE: &str = "application/xml";
const ERROR_BODY_LIMIT: usize = 512;

/// Client for an external transformation service exposing migrate and project
/// endpoints. Every response is verified before it is accepted.
pub struct RemoteBackend {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Result<Self, TransformationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn post(
        &self,
        path: &str,
        body: &str,
        accept: &str,
        query: &[(&str, bool)],
    ) -> Result<String, TransformationError> {
        let url = self.config.url(path);
        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header(ACCEPT, accept)
            .query(query)
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransformationError::RemoteStatus {
                status: status.as_u16(),
                body: truncate(&text, ERROR_BODY_LIMIT),
            });
        }
        Ok(text)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => format!("{}…", &text[..index]),
        None => text.to_string(),
    }
}

#[async_trait]
impl TransformBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn migrate(
        &self,
        xml: &str,
        options: &XmlTransformOptions,
    ) -> Result<String, ConversionError> {
        let query = [
            ("validateBeforeTransform", options.validate_before_transform),
            ("preserveComments", options.preserve_comments),
        ];
        let migrated = self
            .post(&self.config.migrate_path, xml, XML_CONTENT_TYPE, &query)
            .await?;

        let doc = parse_well_formed(&migrated)
            .map_err(|e| TransformationError::RemoteResponseRejected(e.to_string()))?;
        require_version(&doc, SchemaVersion::V2)
            .map_err(|e| TransformationError::RemoteResponseRejected(e.to_string()))?;
        Ok(migrated)
    }

    async fn project(
        &self,
        xml: &str,
        options: &JsonLdTransformOptions,
    ) -> Result<String, ConversionError> {
        let query = [
            ("prettyPrint", options.pretty_print),
            ("includeContext", options.include_context),
        ];
        let body = self
            .post(&self.config.project_path, xml, "application/ld+json", &query)
            .await?;

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| TransformationError::RemoteResponseRejected(e.to_string()))?;
        validate_jsonld(&value)?;

        // Re-render locally so output shape and formatting do not depend on
        // which backend answered
        let mut projected: JsonLdDocument = serde_json::from_value(value)
            .map_err(|e| TransformationError::RemoteResponseRejected(e.to_string()))?;
        projected.context = options
            .include_context
            .then(|| EPCIS_JSONLD_CONTEXT.to_string());
        Ok(projected.render(options.pretty_print)?)
    }

    async fn test_connection(&self) -> bool {
        let url = self.config.url(&self.config.health_path);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(self.config.probe_timeout_secs))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Connection probe to {} failed: {}", url, e);
                false
            }
        }
    }
}
