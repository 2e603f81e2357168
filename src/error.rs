use thiserror::Error;

use crate::validation::ValidationError;

/// Failure of a recognised document during migration or projection, or of a
/// dependency (remote service, serializer) used along the way
#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Projection failed: {0}")]
    ProjectionFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Remote service returned status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("Remote response rejected: {0}")]
    RemoteResponseRejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error returned by every conversion entry point
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transformation(#[from] TransformationError),
}

impl ConversionError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ConversionError::Validation(_))
    }
}
