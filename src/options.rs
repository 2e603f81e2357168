use serde::{Deserialize, Serialize};

/// Options for the version 1 to version 2 XML migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XmlTransformOptions {
    /// Run the validation gate before migrating
    pub validate_before_transform: bool,
    /// Keep comment nodes when the root is rebuilt
    pub preserve_comments: bool,
}

/// Options for the version 2 to JSON-LD projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonLdTransformOptions {
    pub pretty_print: bool,
    pub include_context: bool,
}

impl Default for JsonLdTransformOptions {
    fn default() -> Self {
        Self {
            pretty_print: true,
            include_context: true,
        }
    }
}

impl XmlTransformOptions {
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_before_transform = validate;
        self
    }

    pub fn with_comments(mut self, preserve: bool) -> Self {
        self.preserve_comments = preserve;
        self
    }
}

impl JsonLdTransformOptions {
    pub fn compact(mut self) -> Self {
        self.pretty_print = false;
        self
    }

    pub fn without_context(mut self) -> Self {
        self.include_context = false;
        self
    }
}
