// EPCIS document conversion: 1.x XML to 2.0 XML, and 2.0 XML to JSON-LD
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod event;
pub mod migrator;
pub mod options;
pub mod projector;
pub mod remote;
pub mod reporter;
pub mod schema_version;
pub mod validation;

// Re-export core types for convenience
pub use backend::{BackendKind, LocalBackend, TransformBackend};
pub use config::{ConfigError, ConverterConfig, RemoteConfig};
pub use coordinator::{Conversion, ExecutionMode, FallbackCoordinator, Operation, StepRecord};
pub use document::ParsedDocument;
pub use error::{ConversionError, TransformationError};
pub use event::{EpcisEvent, EventType, JsonLdDocument};
pub use migrator::{MigrationChange, SchemaMigrator};
pub use options::{JsonLdTransformOptions, XmlTransformOptions};
pub use projector::EventProjector;
pub use remote::RemoteBackend;
pub use reporter::{ReportFormat, TransformationReport, TransformationReporter};
pub use schema_version::SchemaVersion;
pub use validation::{validate_document, ValidationError, ValidationReport, ValidationWarning};
