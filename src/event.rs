//! JSON-LD projection types.
//!
//! [`JsonLdDocument`] is the fixed output shape of the projector. The same
//! shape is described by [`jsonld_output_schema`], which is used to verify
//! projections produced by the remote service before they are trusted.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use crate::error::TransformationError;

/// Context URI emitted as `@context` when requested
pub const EPCIS_JSONLD_CONTEXT: &str =
    "https://ref.gs1.org/standards/epcis/2.0.0/epcis-context.jsonld";

pub const JSONLD_DOCUMENT_TYPE: &str = "EPCISDocument";

/// The five EPCIS event variants, in projection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    ObjectEvent,
    AggregationEvent,
    TransactionEvent,
    TransformationEvent,
    AssociationEvent,
}

impl EventType {
    /// Projection order: every event of one variant is emitted before the next
    pub const ALL: [EventType; 5] = [
        EventType::ObjectEvent,
        EventType::AggregationEvent,
        EventType::TransactionEvent,
        EventType::TransformationEvent,
        EventType::AssociationEvent,
    ];

    pub fn tag_name(self) -> &'static str {
        match self {
            EventType::ObjectEvent => "ObjectEvent",
            EventType::AggregationEvent => "AggregationEvent",
            EventType::TransactionEvent => "TransactionEvent",
            EventType::TransformationEvent => "TransformationEvent",
            EventType::AssociationEvent => "AssociationEvent",
        }
    }

    pub fn from_local_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag_name() == name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// `readPoint` / `bizLocation` reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: String,
}

/// One projected event; absent source fields are omitted from the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpcisEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time_zone_offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epc_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biz_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_point: Option<LocationRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biz_location: Option<LocationRef>,
}

impl EpcisEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            event_time: None,
            event_time_zone_offset: None,
            epc_list: None,
            action: None,
            biz_step: None,
            disposition: None,
            read_point: None,
            biz_location: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpcisBody {
    #[serde(default)]
    pub event_list: Vec<EpcisEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonLdDocument {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(rename = "type")]
    pub document_type: String,
    pub schema_version: String,
    pub creation_date: String,
    pub epcis_body: EpcisBody,
}

impl JsonLdDocument {
    pub fn events(&self) -> &[EpcisEvent] {
        &self.epcis_body.event_list
    }

    /// Render with two-space indentation or in compact form
    pub fn render(&self, pretty: bool) -> Result<String, TransformationError> {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        rendered.map_err(|e| TransformationError::SerializationFailed(e.to_string()))
    }
}

/// JSON schema of the projection shape
pub fn jsonld_output_schema() -> serde_json::Value {
    let event_types: Vec<&str> = EventType::ALL.iter().map(|t| t.tag_name()).collect();
    let location = json!({
        "type": "object",
        "required": ["id"],
        "properties": { "id": { "type": "string" } }
    });
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["type", "schemaVersion", "creationDate", "epcisBody"],
        "properties": {
            "@context": {},
            "type": { "const": JSONLD_DOCUMENT_TYPE },
            "schemaVersion": { "type": "string" },
            "creationDate": { "type": "string" },
            "epcisBody": {
                "type": "object",
                "required": ["eventList"],
                "properties": {
                    "eventList": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["type"],
                            "properties": {
                                "type": {
                                    "enum": event_types
                                },
                                "eventTime": { "type": "string" },
                                "eventTimeZoneOffset": { "type": "string" },
                                "epcList": { "type": "array", "items": { "type": "string" } },
                                "action": { "type": "string" },
                                "bizStep": { "type": "string" },
                                "disposition": { "type": "string" },
                                "readPoint": location.clone(),
                                "bizLocation": location
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Check a JSON value against [`jsonld_output_schema`]
pub fn validate_jsonld(instance: &serde_json::Value) -> Result<(), TransformationError> {
    let schema = jsonld_output_schema();
    let compiled = jsonschema::JSONSchema::compile(&schema)
        .map_err(|e| TransformationError::SerializationFailed(format!("Invalid output schema: {}", e)))?;

    if let Err(errors) = compiled.validate(instance) {
        let messages: Vec<String> = errors
            .map(|error| format!("{}: {}", error.instance_path, error))
            .collect();
        return Err(TransformationError::RemoteResponseRejected(format!(
            "JSON-LD output failed schema validation with {} error(s): {}",
            messages.len(),
            messages.join("; ")
        )));
    }
    Ok(())
}
