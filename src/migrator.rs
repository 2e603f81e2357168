use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::document::{Attribute, Element, NodeKind, ParsedDocument};
use crate::error::{ConversionError, TransformationError};
use crate::options::XmlTransformOptions;
use crate::schema_version::{SchemaVersion, EPCIS_V1_NAMESPACE, EPCIS_V2_NAMESPACE};
use crate::validation::{check_is_epcis_document, detect_version, parse_well_formed};

/// A single change made while migrating a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationChange {
    NamespaceRewritten {
        attribute: String,
        from: Option<String>,
        to: String,
    },
    SchemaVersionSet {
        previous: Option<String>,
    },
    CommentsDropped(usize),
}

/// Result of migrating one document
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub document: ParsedDocument,
    pub source_version: SchemaVersion,
    pub changes: Vec<MigrationChange>,
}

/// Rewrites EPCIS 1.x documents to the 2.0 namespace by direct tree surgery
pub struct SchemaMigrator {
    options: XmlTransformOptions,
}

impl SchemaMigrator {
    pub fn new(options: XmlTransformOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &XmlTransformOptions {
        &self.options
    }

    /// Parse, optionally validate, migrate and serialize
    pub fn migrate_text(&self, xml: &str) -> Result<String, ConversionError> {
        let doc = if self.options.validate_before_transform {
            let doc = parse_well_formed(xml)?;
            check_is_epcis_document(&doc)?;
            doc
        } else {
            ParsedDocument::parse(xml)
                .map_err(|e| TransformationError::MigrationFailed(e.to_string()))?
        };

        let outcome = self.migrate(doc)?;
        let xml = outcome
            .document
            .to_xml()
            .map_err(|e| TransformationError::SerializationFailed(e.to_string()))?;
        Ok(xml)
    }

    /// Migrate a parsed document to schema version 2
    pub fn migrate(&self, doc: ParsedDocument) -> Result<MigrationOutcome, ConversionError> {
        let source_version = detect_version(&doc).ok_or_else(|| {
            TransformationError::MigrationFailed(format!(
                "Cannot determine the schema version of <{}>",
                doc.root_element().name
            ))
        })?;

        let outcome = match source_version {
            SchemaVersion::V2 => self.normalize(doc),
            SchemaVersion::V1 => self.rebuild_root(doc),
        };

        for change in &outcome.changes {
            debug!("Applied migration change: {:?}", change);
        }
        info!(
            "Migrated EPCIS {} document to {} ({} change(s))",
            outcome.source_version,
            SchemaVersion::V2,
            outcome.changes.len()
        );
        Ok(outcome)
    }

    /// Already version 2: only the `schemaVersion` attribute is touched
    fn normalize(&self, mut doc: ParsedDocument) -> MigrationOutcome {
        let target = SchemaVersion::V2.attribute_value();
        let previous = doc.root_element_mut().set_attribute("schemaVersion", target);

        let mut changes = Vec::new();
        if previous.as_deref() != Some(target) {
            changes.push(MigrationChange::SchemaVersionSet { previous });
        }

        MigrationOutcome {
            document: doc,
            source_version: SchemaVersion::V2,
            changes,
        }
    }

    /// Build a new root bound to the version 2 namespace and move every child
    /// of the old root under it
    fn rebuild_root(&self, mut doc: ParsedDocument) -> MigrationOutcome {
        let target_ns = SchemaVersion::V2.namespace();
        let old_root = doc.root();
        let old_ns = doc.namespace_uri(old_root).map(str::to_string);
        let old = doc.root_element().clone();

        let own_declaration = match old.prefix() {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };

        let mut changes = Vec::new();
        let mut new_root = Element::new(old.name.clone());
        let mut declared = false;

        for attr in &old.attributes {
            let rewrite = attr.is_namespace_declaration()
                && (attr.name == own_declaration
                    || attr.value == EPCIS_V1_NAMESPACE);
            if rewrite {
                declared |= attr.name == own_declaration;
                changes.push(MigrationChange::NamespaceRewritten {
                    attribute: attr.name.clone(),
                    from: Some(attr.value.clone()),
                    to: target_ns.to_string(),
                });
                new_root.attributes.push(Attribute::new(attr.name.clone(), target_ns));
            } else {
                new_root.attributes.push(attr.clone());
            }
        }

        // Version came from the attribute alone; bind the root explicitly
        if !declared && old_ns.as_deref() != Some(target_ns) {
            let declaration = if old.prefix().is_none() && old_ns.is_none() {
                // A default declaration would also capture every unprefixed
                // descendant, so the root gets a prefix of its own
                let prefix = free_prefix(&old);
                new_root.name = format!("{}:{}", prefix, old.local_name());
                format!("xmlns:{}", prefix)
            } else {
                own_declaration
            };

            if new_root.attribute(&declaration).is_none() {
                changes.push(MigrationChange::NamespaceRewritten {
                    attribute: declaration.clone(),
                    from: old_ns,
                    to: target_ns.to_string(),
                });
                new_root
                    .attributes
                    .insert(0, Attribute::new(declaration, target_ns));
            }
        }

        let previous = new_root.set_attribute("schemaVersion", SchemaVersion::V2.attribute_value());
        changes.push(MigrationChange::SchemaVersionSet { previous });

        let new_root = doc.create_node(NodeKind::Element(new_root));
        for child in doc.take_children(old_root) {
            doc.append_child(new_root, child);
        }
        doc.replace_root(new_root);

        if !self.options.preserve_comments {
            let comments = doc.comments_under(new_root);
            if !comments.is_empty() {
                changes.push(MigrationChange::CommentsDropped(comments.len()));
            }
            for comment in comments {
                doc.detach(comment);
            }
        }

        MigrationOutcome {
            document: doc,
            source_version: SchemaVersion::V1,
            changes,
        }
    }
}

/// First `epcis`-style prefix that the root does not already bind to a
/// foreign namespace
fn free_prefix(root: &Element) -> String {
    let mut candidate = "epcis".to_string();
    let mut suffix = 1;
    loop {
        match root.attribute(&format!("xmlns:{}", candidate)) {
            None => return candidate,
            Some(uri) if uri == EPCIS_V1_NAMESPACE || uri == EPCIS_V2_NAMESPACE => {
                return candidate
            }
            Some(_) => {
                suffix += 1;
                candidate = format!("epcis{}", suffix);
            }
        }
    }
}
