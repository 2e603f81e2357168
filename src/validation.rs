use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{DocumentError, ParsedDocument};
use crate::event::EventType;
use crate::projector::{find_event_list, matches_tag};
use crate::schema_version::SchemaVersion;

/// Local name every EPCIS document root must carry
pub const EPCIS_ROOT_ELEMENT: &str = "EPCISDocument";

/// Input rejected before any transformation was attempted
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    pub error_type: ValidationErrorType,
    pub message: String,
    pub location: Option<String>,
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorType {
    MalformedXml,
    NotEpcisDocument,
    UnsupportedVersion,
    WrongVersion,
}

impl ValidationError {
    pub fn new(error_type: ValidationErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            location: None,
            suggested_fix: None,
        }
    }

    pub fn with_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_suggested_fix(mut self, fix: String) -> Self {
        self.suggested_fix = Some(fix);
        self
    }
}

impl From<DocumentError> for ValidationError {
    fn from(err: DocumentError) -> Self {
        let location = match &err {
            DocumentError::Syntax { position, .. } | DocumentError::TextOutsideRoot(position) => {
                Some(format!("byte {}", position))
            }
            _ => None,
        };
        let mut error = ValidationError::new(
            ValidationErrorType::MalformedXml,
            format!("Document is not well-formed XML: {}", err),
        );
        error.location = location;
        error
    }
}

/// Parse `text`, rejecting anything that is not well-formed XML
pub fn parse_well_formed(text: &str) -> Result<ParsedDocument, ValidationError> {
    ParsedDocument::parse(text).map_err(ValidationError::from)
}

pub fn check_well_formed(text: &str) -> Result<(), ValidationError> {
    parse_well_formed(text).map(|_| ())
}

/// Determine the schema version from the root namespace, falling back to the
/// root `schemaVersion` attribute
pub fn detect_version(doc: &ParsedDocument) -> Option<SchemaVersion> {
    let from_namespace = doc
        .namespace_uri(doc.root())
        .and_then(SchemaVersion::from_namespace);
    from_namespace.or_else(|| {
        doc.root_element()
            .attribute("schemaVersion")
            .and_then(SchemaVersion::from_attribute)
    })
}

/// Confirm the root is an EPCIS document and report its schema version
pub fn check_is_epcis_document(doc: &ParsedDocument) -> Result<SchemaVersion, ValidationError> {
    let root = doc.root_element();
    if root.local_name() != EPCIS_ROOT_ELEMENT {
        return Err(ValidationError::new(
            ValidationErrorType::NotEpcisDocument,
            format!(
                "Root element is <{}>, expected <{}>",
                root.name, EPCIS_ROOT_ELEMENT
            ),
        )
        .with_location("/".to_string()));
    }

    detect_version(doc).ok_or_else(|| {
        let namespace = doc.namespace_uri(doc.root()).unwrap_or("<none>");
        ValidationError::new(
            ValidationErrorType::UnsupportedVersion,
            format!("Cannot determine EPCIS schema version (namespace {})", namespace),
        )
        .with_location(format!("/{}", root.name))
        .with_suggested_fix(format!(
            "Bind the root element to {} or {}",
            SchemaVersion::V1.namespace(),
            SchemaVersion::V2.namespace()
        ))
    })
}

/// Require the document to be an EPCIS document of exactly `expected` version
pub fn require_version(
    doc: &ParsedDocument,
    expected: SchemaVersion,
) -> Result<(), ValidationError> {
    let found = check_is_epcis_document(doc)?;
    if found != expected {
        let mut error = ValidationError::new(
            ValidationErrorType::WrongVersion,
            format!(
                "Expected an EPCIS {} document but found EPCIS {}",
                expected, found
            ),
        )
        .with_location(format!("/{}", doc.root_element().name));
        if found == SchemaVersion::V1 && expected == SchemaVersion::V2 {
            error = error
                .with_suggested_fix("Convert the document to version 2 first".to_string());
        }
        return Err(error);
    }
    Ok(())
}

/// Non-failing diagnostics for a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub detected_version: Option<SchemaVersion>,
    pub event_count: usize,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            detected_version: None,
            event_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Validation warning for non-critical issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub location: String,
    pub warning_type: ValidationWarningType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarningType {
    MissingEventList,
    UnrecognizedEvent,
    MissingEventTime,
}

impl ValidationWarning {
    pub fn new(location: String, warning_type: ValidationWarningType, message: String) -> Self {
        Self {
            location,
            warning_type,
            message,
        }
    }
}

/// Run every check and collect the findings instead of stopping at the first
pub fn validate_document(text: &str) -> ValidationReport {
    let mut report = ValidationReport::new();

    let doc = match parse_well_formed(text) {
        Ok(doc) => doc,
        Err(error) => {
            report.add_error(error);
            return report;
        }
    };

    match check_is_epcis_document(&doc) {
        Ok(version) => report.detected_version = Some(version),
        Err(error) => {
            report.add_error(error);
            return report;
        }
    }

    let Some(event_list) = find_event_list(&doc) else {
        report.add_warning(ValidationWarning::new(
            format!("/{}", doc.root_element().name),
            ValidationWarningType::MissingEventList,
            "No EPCISBody/EventList element; the document contains no events".to_string(),
        ));
        return report;
    };

    for (index, child) in doc.child_elements(event_list).enumerate() {
        let Some(element) = doc.element(child) else {
            continue;
        };
        let location = format!("EventList/{}[{}]", element.name, index + 1);

        if EventType::from_local_name(element.local_name()).is_none() {
            report.add_warning(ValidationWarning::new(
                location,
                ValidationWarningType::UnrecognizedEvent,
                format!("<{}> is not a known event type and will be skipped", element.name),
            ));
            continue;
        }

        report.event_count += 1;
        let has_time = doc
            .child_elements(child)
            .any(|field| matches_tag(&doc, field, "eventTime"));
        if !has_time {
            report.add_warning(ValidationWarning::new(
                location,
                ValidationWarningType::MissingEventTime,
                "Event has no eventTime".to_string(),
            ));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1_DOC: &str = r#"<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:1" schemaVersion="1.2"><EPCISBody><EventList><ObjectEvent><action>ADD</action></ObjectEvent></EventList></EPCISBody></epcis:EPCISDocument>"#;
    const V2_DOC: &str = r#"<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:2" schemaVersion="2.0"><EPCISBody><EventList/></EPCISBody></epcis:EPCISDocument>"#;

    #[test]
    fn test_check_well_formed() {
        assert!(check_well_formed(V1_DOC).is_ok());
        let err = check_well_formed("<a><b></a>").unwrap_err();
        assert_eq!(err.error_type, ValidationErrorType::MalformedXml);
        assert!(err.location.is_some());
    }

    #[test]
    fn test_check_is_epcis_document() {
        let doc = parse_well_formed(V1_DOC).unwrap();
        assert_eq!(check_is_epcis_document(&doc).unwrap(), SchemaVersion::V1);

        let doc = parse_well_formed(V2_DOC).unwrap();
        assert_eq!(check_is_epcis_document(&doc).unwrap(), SchemaVersion::V2);

        let doc = parse_well_formed("<Other/>").unwrap();
        let err = check_is_epcis_document(&doc).unwrap_err();
        assert_eq!(err.error_type, ValidationErrorType::NotEpcisDocument);
    }

    #[test]
    fn test_unprefixed_root_uses_version_attribute() {
        let doc = parse_well_formed(r#"<EPCISDocument schemaVersion="2.0"/>"#).unwrap();
        assert_eq!(check_is_epcis_document(&doc).unwrap(), SchemaVersion::V2);

        let doc = parse_well_formed("<EPCISDocument/>").unwrap();
        let err = check_is_epcis_document(&doc).unwrap_err();
        assert_eq!(err.error_type, ValidationErrorType::UnsupportedVersion);
        assert!(err.suggested_fix.is_some());
    }

    #[test]
    fn test_require_version_rejects_v1_for_v2_entry_points() {
        let doc = parse_well_formed(V1_DOC).unwrap();
        let err = require_version(&doc, SchemaVersion::V2).unwrap_err();
        assert_eq!(err.error_type, ValidationErrorType::WrongVersion);
        assert!(require_version(&doc, SchemaVersion::V1).is_ok());
    }

    #[test]
    fn test_validate_document_collects_warnings() {
        let text = r#"<EPCISDocument xmlns="urn:epcglobal:epcis:xsd:2"><EPCISBody><EventList><ObjectEvent><eventTime>2024-01-01T00:00:00Z</eventTime></ObjectEvent><QuantityEvent/><AggregationEvent/></EventList></EPCISBody></EPCISDocument>"#;
        let report = validate_document(text);
        assert!(report.is_valid);
        assert_eq!(report.detected_version, Some(SchemaVersion::V2));
        assert_eq!(report.event_count, 2);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(
            report.warnings[0].warning_type,
            ValidationWarningType::UnrecognizedEvent
        );
        assert_eq!(
            report.warnings[1].warning_type,
            ValidationWarningType::MissingEventTime
        );
    }

    #[test]
    fn test_validate_document_reports_errors() {
        let report = validate_document("not xml at all");
        assert!(!report.is_valid);
        assert!(report.has_errors());

        let report = validate_document(r#"<EPCISDocument schemaVersion="2.0"/>"#);
        assert!(report.is_valid);
        assert_eq!(
            report.warnings[0].warning_type,
            ValidationWarningType::MissingEventList
        );
    }
}
