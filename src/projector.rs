use chrono::{SecondsFormat, Utc};
use log::debug;

use crate::document::{NodeId, ParsedDocument};
use crate::error::ConversionError;
use crate::event::{
    EpcisBody, EpcisEvent, EventType, JsonLdDocument, LocationRef, EPCIS_JSONLD_CONTEXT,
    JSONLD_DOCUMENT_TYPE,
};
use crate::options::JsonLdTransformOptions;
use crate::schema_version::{SchemaVersion, EPCIS_V1_NAMESPACE, EPCIS_V2_NAMESPACE};
use crate::validation::{parse_well_formed, require_version};

/// Projects a version 2 EPCIS document into the JSON-LD event shape
pub struct EventProjector {
    options: JsonLdTransformOptions,
}

impl EventProjector {
    pub fn new(options: JsonLdTransformOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &JsonLdTransformOptions {
        &self.options
    }

    /// Parse, validate, project and render in one step
    pub fn project_text(&self, xml: &str) -> Result<String, ConversionError> {
        let doc = parse_well_formed(xml)?;
        let projected = self.project(&doc)?;
        Ok(projected.render(self.options.pretty_print)?)
    }

    /// Walk the event list of `doc`. The document must be an EPCIS 2.0 document;
    /// a missing body or event list yields an empty event list.
    pub fn project(&self, doc: &ParsedDocument) -> Result<JsonLdDocument, ConversionError> {
        require_version(doc, SchemaVersion::V2)?;

        let mut events = Vec::new();
        if let Some(event_list) = find_event_list(doc) {
            for event_type in EventType::ALL {
                let before = events.len();
                for child in doc.child_elements(event_list) {
                    if matches_tag(doc, child, event_type.tag_name()) {
                        events.push(extract_event(doc, child, event_type));
                    }
                }
                if events.len() > before {
                    debug!("Projected {} {}(s)", events.len() - before, event_type);
                }
            }
        } else {
            debug!("No EPCISBody/EventList found, projecting an empty event list");
        }

        let root = doc.root_element();
        let schema_version = root
            .attribute("schemaVersion")
            .unwrap_or(SchemaVersion::V2.attribute_value())
            .to_string();
        let creation_date = root
            .attribute("creationDate")
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        Ok(JsonLdDocument {
            context: self
                .options
                .include_context
                .then(|| EPCIS_JSONLD_CONTEXT.to_string()),
            document_type: JSONLD_DOCUMENT_TYPE.to_string(),
            schema_version,
            creation_date,
            epcis_body: EpcisBody { event_list: events },
        })
    }
}

/// Whether element `id` has local name `local` and is either unqualified or in
/// an EPCIS namespace; prefixed and bare spellings are treated alike
pub(crate) fn matches_tag(doc: &ParsedDocument, id: NodeId, local: &str) -> bool {
    let Some(qname) = doc.qname(id) else {
        return false;
    };
    if qname.local_name != local {
        return false;
    }
    match qname.namespace {
        None => true,
        Some(ns) => {
            ns == EPCIS_V1_NAMESPACE
                || ns == EPCIS_V2_NAMESPACE
                || doc.namespace_uri(doc.root()) == Some(ns)
        }
    }
}

fn find_descendant(doc: &ParsedDocument, from: NodeId, local: &str) -> Option<NodeId> {
    doc.descendant_elements(from)
        .into_iter()
        .find(|id| matches_tag(doc, *id, local))
}

/// Locate `EPCISBody/EventList`
pub(crate) fn find_event_list(doc: &ParsedDocument) -> Option<NodeId> {
    let body = find_descendant(doc, doc.root(), "EPCISBody")?;
    find_descendant(doc, body, "EventList")
}

fn child_element(doc: &ParsedDocument, parent: NodeId, local: &str) -> Option<NodeId> {
    doc.child_elements(parent)
        .find(|id| matches_tag(doc, *id, local))
}

/// Trimmed text of the first matching child; empty text counts as absent
fn child_text(doc: &ParsedDocument, parent: NodeId, local: &str) -> Option<String> {
    let child = child_element(doc, parent, local)?;
    let text = doc.text_content(child).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn location(doc: &ParsedDocument, event: NodeId, local: &str) -> Option<LocationRef> {
    let container = child_element(doc, event, local)?;
    child_text(doc, container, "id").map(|id| LocationRef { id })
}

fn epc_list(doc: &ParsedDocument, event: NodeId) -> Option<Vec<String>> {
    let container = child_element(doc, event, "epcList")?;
    let epcs = doc
        .child_elements(container)
        .filter(|id| matches_tag(doc, *id, "epc"))
        .map(|id| doc.text_content(id).trim().to_string())
        .filter(|epc| !epc.is_empty())
        .collect();
    Some(epcs)
}

fn extract_event(doc: &ParsedDocument, id: NodeId, event_type: EventType) -> EpcisEvent {
    EpcisEvent {
        event_type,
        event_time: child_text(doc, id, "eventTime"),
        event_time_zone_offset: child_text(doc, id, "eventTimeZoneOffset"),
        epc_list: epc_list(doc, id),
        action: child_text(doc, id, "action"),
        biz_step: child_text(doc, id, "bizStep"),
        disposition: child_text(doc, id, "disposition"),
        read_point: location(doc, id, "readPoint"),
        biz_location: location(doc, id, "bizLocation"),
    }
}
