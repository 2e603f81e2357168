use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Namespace URI of EPCIS 1.x documents.
pub const EPCIS_V1_NAMESPACE: &str = "urn:epcglobal:epcis:xsd:1";
/// Namespace URI of EPCIS 2.0 documents.
pub const EPCIS_V2_NAMESPACE: &str = "urn:epcglobal:epcis:xsd:2";

static NAMESPACE_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":xsd:(\d+)$").expect("namespace pattern is valid"));

/// Major version of the EPCIS XML schema a document is written against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            SchemaVersion::V1 => EPCIS_V1_NAMESPACE,
            SchemaVersion::V2 => EPCIS_V2_NAMESPACE,
        }
    }

    /// Value written to the root `schemaVersion` attribute after migration
    pub fn attribute_value(self) -> &'static str {
        match self {
            SchemaVersion::V1 => "1.2",
            SchemaVersion::V2 => "2.0",
        }
    }

    /// Detect the version from a namespace URI ending in `:xsd:<major>`
    pub fn from_namespace(uri: &str) -> Option<Self> {
        let caps = NAMESPACE_VERSION.captures(uri.trim())?;
        match &caps[1] {
            "1" => Some(SchemaVersion::V1),
            "2" => Some(SchemaVersion::V2),
            _ => None,
        }
    }

    /// Detect the version from a `schemaVersion` attribute such as `1.2` or `2.0`
    pub fn from_attribute(value: &str) -> Option<Self> {
        let major = value.trim().split('.').next()?;
        match major {
            "1" => Some(SchemaVersion::V1),
            "2" => Some(SchemaVersion::V2),
            _ => None,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "1.x"),
            SchemaVersion::V2 => write!(f, "2.0"),
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(SchemaVersion::V1),
            "v2" | "2" => Ok(SchemaVersion::V2),
            other => SchemaVersion::from_attribute(other)
                .ok_or_else(|| SchemaVersionError::InvalidFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SchemaVersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_namespace() {
        assert_eq!(
            SchemaVersion::from_namespace(EPCIS_V1_NAMESPACE),
            Some(SchemaVersion::V1)
        );
        assert_eq!(
            SchemaVersion::from_namespace(EPCIS_V2_NAMESPACE),
            Some(SchemaVersion::V2)
        );
        assert_eq!(SchemaVersion::from_namespace("urn:example:xsd:3"), None);
        assert_eq!(SchemaVersion::from_namespace("http://example.com/ns"), None);
    }

    #[test]
    fn test_version_from_attribute() {
        assert_eq!(SchemaVersion::from_attribute("1.2"), Some(SchemaVersion::V1));
        assert_eq!(SchemaVersion::from_attribute("2.0"), Some(SchemaVersion::V2));
        assert_eq!(SchemaVersion::from_attribute(" 2 "), Some(SchemaVersion::V2));
        assert_eq!(SchemaVersion::from_attribute("3.0"), None);
        assert_eq!(SchemaVersion::from_attribute(""), None);
    }

    #[test]
    fn test_schema_version_from_str() {
        assert_eq!("v1".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert_eq!("V2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
        assert_eq!("1.2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert!("invalid".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_schema_version_ordering() {
        assert!(SchemaVersion::V1 < SchemaVersion::V2);
        assert_eq!(SchemaVersion::V2.attribute_value(), "2.0");
        assert_eq!(SchemaVersion::V2.namespace(), EPCIS_V2_NAMESPACE);
    }
}
