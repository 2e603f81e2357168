//! Arena-backed XML document model.
//!
//! A [`ParsedDocument`] owns every node in a flat `Vec`; parent and child links
//! are [`NodeId`] indices into that arena. Namespace URIs are not stored on the
//! elements but resolved on demand from the in-scope `xmlns` declarations, so
//! rewriting a declaration on an ancestor is immediately visible to every
//! descendant.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use thiserror::Error;

/// Index of a node inside a [`ParsedDocument`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Whether this attribute is an `xmlns` or `xmlns:prefix` declaration
    pub fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written in the source, e.g. `epcis:EventList`
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<NodeId>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Set an attribute in place, appending it when not yet present
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => Some(std::mem::replace(&mut existing.value, value)),
            None => {
                self.attributes.push(Attribute::new(name, value));
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
}

/// Namespace URI plus local name of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName<'a> {
    pub namespace: Option<&'a str>,
    pub local_name: &'a str,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("XML syntax error at position {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Multiple root elements: <{0}> appears after the document element")]
    MultipleRoots(String),

    #[error("Text content outside the document element at position {0}")]
    TextOutsideRoot(u64),

    #[error("Unclosed element <{0}>")]
    UnclosedElement(String),

    #[error("Failed to write XML: {0}")]
    Write(String),
}

/// Mutable in-memory XML document with exactly one root element
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    nodes: Vec<Node>,
    root: NodeId,
    prolog: Vec<NodeId>,
    epilog: Vec<NodeId>,
    has_declaration: bool,
}

impl ParsedDocument {
    /// Parse UTF-8 XML text into an owned tree
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(text);
        let mut builder = TreeBuilder::default();

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader.read_event().map_err(|e| DocumentError::Syntax {
                position,
                message: e.to_string(),
            })?;

            match event {
                Event::Decl(_) => builder.has_declaration = true,
                Event::Start(e) => {
                    let element = element_from_start(&e, position)?;
                    builder.open(element)?;
                }
                Event::Empty(e) => {
                    let element = element_from_start(&e, position)?;
                    builder.open(element)?;
                    builder.close();
                }
                Event::End(_) => builder.close(),
                Event::Text(e) => {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    let text = unescape_at(&raw, position)?;
                    builder.text(&text, position)?;
                }
                Event::GeneralRef(r) => {
                    let name = String::from_utf8_lossy(r.as_ref());
                    let resolved = unescape_at(&format!("&{};", name), position)?;
                    builder.text(&resolved, position)?;
                }
                Event::CData(e) => {
                    let content = String::from_utf8_lossy(e.as_ref()).into_owned();
                    builder.misc(NodeKind::CData(content), position)?;
                }
                Event::Comment(e) => {
                    let content = String::from_utf8_lossy(e.as_ref()).into_owned();
                    builder.misc(NodeKind::Comment(content), position)?;
                }
                Event::PI(e) => {
                    let content = String::from_utf8_lossy(e.as_ref()).into_owned();
                    builder.misc(NodeKind::ProcessingInstruction(content), position)?;
                }
                Event::DocType(e) => {
                    let content = String::from_utf8_lossy(e.as_ref()).into_owned();
                    builder.misc(NodeKind::DocType(content), position)?;
                }
                Event::Eof => break,
            }
        }

        builder.finish()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn has_declaration(&self) -> bool {
        self.has_declaration
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn root_element(&self) -> &Element {
        match &self.nodes[self.root.0].kind {
            NodeKind::Element(element) => element,
            _ => unreachable!("root node is always an element"),
        }
    }

    pub fn root_element_mut(&mut self) -> &mut Element {
        let root = self.root;
        match &mut self.nodes[root.0].kind {
            NodeKind::Element(element) => element,
            _ => unreachable!("root node is always an element"),
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id)
            .map(|element| element.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |child| self.element(*child).is_some())
    }

    /// All element descendants of `id` in document order, excluding `id` itself
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.child_elements(id).collect();
        stack.reverse();
        while let Some(current) = stack.pop() {
            found.push(current);
            let mut children: Vec<NodeId> = self.child_elements(current).collect();
            children.reverse();
            stack.extend(children);
        }
        found
    }

    /// Resolve the namespace URI bound to `prefix` at node `id`
    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<&str> {
        let declaration: Cow<'_, str> = match prefix {
            Some("xml") => return Some("http://www.w3.org/XML/1998/namespace"),
            Some(prefix) => Cow::Owned(format!("xmlns:{}", prefix)),
            None => Cow::Borrowed("xmlns"),
        };

        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(value) = self
                .element(node)
                .and_then(|element| element.attribute(&declaration))
            {
                return if value.is_empty() { None } else { Some(value) };
            }
            current = self.parent(node);
        }
        None
    }

    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        let element = self.element(id)?;
        self.lookup_namespace(id, element.prefix())
    }

    pub fn qname(&self, id: NodeId) -> Option<QName<'_>> {
        let element = self.element(id)?;
        Some(QName {
            namespace: self.namespace_uri(id),
            local_name: element.local_name(),
        })
    }

    /// Concatenated text and CDATA content of a node and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) | NodeKind::CData(text) => out.push_str(text),
            NodeKind::Element(element) => {
                for child in &element.children {
                    self.collect_text(*child, out);
                }
            }
            _ => {}
        }
    }

    /// Allocate a detached node
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, parent: None });
        id
    }

    /// Detach all children of `id` and return them in order
    pub fn take_children(&mut self, id: NodeId) -> Vec<NodeId> {
        let children = match self.element_mut(id) {
            Some(element) => std::mem::take(&mut element.children),
            None => Vec::new(),
        };
        for child in &children {
            self.nodes[child.0].parent = None;
        }
        children
    }

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(element) = self.element_mut(parent) {
            element.children.push(child);
            self.nodes[child.0].parent = Some(parent);
        }
    }

    /// Remove `id` from its parent's child list
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            if let Some(element) = self.element_mut(parent) {
                element.children.retain(|child| *child != id);
            }
        }
    }

    /// Make the detached element `id` the document root; the old root is left
    /// unreachable in the arena
    pub fn replace_root(&mut self, id: NodeId) {
        debug_assert!(self.element(id).is_some());
        self.nodes[id.0].parent = None;
        self.root = id;
    }

    /// Comment nodes reachable from the root, in document order
    pub fn comments_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut comments = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            for child in self.children(current).iter().rev() {
                match self.kind(*child) {
                    NodeKind::Comment(_) => comments.push(*child),
                    NodeKind::Element(_) => stack.push(*child),
                    _ => {}
                }
            }
        }
        comments.sort();
        comments
    }

    /// Serialize the document back to XML text
    pub fn to_xml(&self) -> Result<String, DocumentError> {
        let mut writer = Writer::new(Vec::new());

        if self.has_declaration {
            write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
            write(&mut writer, Event::Text(BytesText::new("\n")))?;
        }
        for id in &self.prolog {
            self.write_node(&mut writer, *id)?;
            write(&mut writer, Event::Text(BytesText::new("\n")))?;
        }
        self.write_node(&mut writer, self.root)?;
        for id in &self.epilog {
            write(&mut writer, Event::Text(BytesText::new("\n")))?;
            self.write_node(&mut writer, *id)?;
        }

        String::from_utf8(writer.into_inner()).map_err(|e| DocumentError::Write(e.to_string()))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<(), DocumentError> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => {
                let mut start = BytesStart::new(element.name.as_str());
                for attr in &element.attributes {
                    start.push_attribute((attr.name.as_str(), attr.value.as_str()));
                }
                if element.children.is_empty() {
                    write(writer, Event::Empty(start))?;
                } else {
                    write(writer, Event::Start(start))?;
                    for child in &element.children {
                        self.write_node(writer, *child)?;
                    }
                    write(writer, Event::End(BytesEnd::new(element.name.as_str())))?;
                }
            }
            NodeKind::Text(text) => write(writer, Event::Text(BytesText::new(text)))?,
            NodeKind::CData(text) => write(writer, Event::CData(BytesCData::new(text.as_str())))?,
            NodeKind::Comment(text) => {
                write(writer, Event::Comment(BytesText::from_escaped(text.as_str())))?
            }
            NodeKind::ProcessingInstruction(text) => {
                write(writer, Event::PI(BytesPI::new(text.as_str())))?
            }
            NodeKind::DocType(text) => {
                write(writer, Event::DocType(BytesText::from_escaped(text.as_str())))?
            }
        }
        Ok(())
    }
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), DocumentError> {
    writer
        .write_event(event)
        .map_err(|e| DocumentError::Write(e.to_string()))
}

fn unescape_at(raw: &str, position: u64) -> Result<String, DocumentError> {
    unescape(raw)
        .map(Cow::into_owned)
        .map_err(|e| DocumentError::Syntax {
            position,
            message: e.to_string(),
        })
}

fn element_from_start(start: &BytesStart<'_>, position: u64) -> Result<Element, DocumentError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::Syntax {
            position,
            message: e.to_string(),
        })?;
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape_at(&raw, position)?;
        element.attributes.push(Attribute { name, value });
    }
    Ok(element)
}

/// Incremental tree construction driven by reader events
#[derive(Default)]
struct TreeBuilder {
    nodes: Vec<Node>,
    root: Option<NodeId>,
    open: Vec<NodeId>,
    prolog: Vec<NodeId>,
    epilog: Vec<NodeId>,
    has_declaration: bool,
}

impl TreeBuilder {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = self.open.last().copied();
        self.nodes.push(Node { kind, parent });
        if let Some(parent) = parent {
            if let NodeKind::Element(element) = &mut self.nodes[parent.0].kind {
                element.children.push(id);
            }
        }
        id
    }

    fn open(&mut self, element: Element) -> Result<(), DocumentError> {
        if self.open.is_empty() && self.root.is_some() {
            return Err(DocumentError::MultipleRoots(element.name));
        }
        let id = self.push(NodeKind::Element(element));
        if self.root.is_none() {
            self.root = Some(id);
        }
        self.open.push(id);
        Ok(())
    }

    fn close(&mut self) {
        self.open.pop();
    }

    fn text(&mut self, text: &str, position: u64) -> Result<(), DocumentError> {
        let Some(parent) = self.open.last().copied() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(DocumentError::TextOutsideRoot(position));
        };

        // Entity references arrive as separate events; fold them into the
        // preceding text node.
        let last = match &self.nodes[parent.0].kind {
            NodeKind::Element(element) => element.children.last().copied(),
            _ => None,
        };
        if let Some(last) = last {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return Ok(());
            }
        }
        self.push(NodeKind::Text(text.to_string()));
        Ok(())
    }

    fn misc(&mut self, kind: NodeKind, position: u64) -> Result<(), DocumentError> {
        if !self.open.is_empty() {
            self.push(kind);
            return Ok(());
        }
        if matches!(kind, NodeKind::CData(_)) {
            return Err(DocumentError::TextOutsideRoot(position));
        }
        let id = self.push(kind);
        if self.root.is_some() {
            self.epilog.push(id);
        } else {
            self.prolog.push(id);
        }
        Ok(())
    }

    fn finish(self) -> Result<ParsedDocument, DocumentError> {
        if let Some(open) = self.open.last() {
            let name = match &self.nodes[open.0].kind {
                NodeKind::Element(element) => element.name.clone(),
                _ => String::new(),
            };
            return Err(DocumentError::UnclosedElement(name));
        }
        let root = self.root.ok_or(DocumentError::MissingRoot)?;
        Ok(ParsedDocument {
            nodes: self.nodes,
            root,
            prolog: self.prolog,
            epilog: self.epilog,
            has_declaration: self.has_declaration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<epcis:EPCISDocument xmlns:epcis="urn:epcglobal:epcis:xsd:1" schemaVersion="1.2">
  <!-- header -->
  <EPCISBody>
    <EventList>
      <ObjectEvent><action>ADD</action><note>a &amp; b</note></ObjectEvent>
    </EventList>
  </EPCISBody>
</epcis:EPCISDocument>"#;

    #[test]
    fn test_parse_builds_tree() {
        let doc = ParsedDocument::parse(SAMPLE).unwrap();
        let root = doc.root_element();
        assert_eq!(root.name, "epcis:EPCISDocument");
        assert_eq!(root.local_name(), "EPCISDocument");
        assert_eq!(root.prefix(), Some("epcis"));
        assert_eq!(root.attribute("schemaVersion"), Some("1.2"));
        assert!(doc.has_declaration());

        let body: Vec<_> = doc.child_elements(doc.root()).collect();
        assert_eq!(body.len(), 1);
        assert_eq!(doc.element(body[0]).unwrap().name, "EPCISBody");
        assert_eq!(doc.parent(body[0]), Some(doc.root()));
    }

    #[test]
    fn test_namespace_resolution() {
        let doc = ParsedDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.namespace_uri(doc.root()), Some("urn:epcglobal:epcis:xsd:1"));

        let body = doc.child_elements(doc.root()).next().unwrap();
        // Unprefixed and no default namespace in scope
        assert_eq!(doc.namespace_uri(body), None);

        let qname = doc.qname(doc.root()).unwrap();
        assert_eq!(qname.local_name, "EPCISDocument");
    }

    #[test]
    fn test_entities_are_resolved_in_text() {
        let doc = ParsedDocument::parse(SAMPLE).unwrap();
        let note = doc
            .descendant_elements(doc.root())
            .into_iter()
            .find(|id| doc.element(*id).unwrap().name == "note")
            .unwrap();
        assert_eq!(doc.text_content(note), "a & b");
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(ParsedDocument::parse("").is_err());
        assert!(ParsedDocument::parse("<a><b></a>").is_err());
        assert!(ParsedDocument::parse("<a>").is_err());
        assert!(matches!(
            ParsedDocument::parse("<a/><b/>"),
            Err(DocumentError::MultipleRoots(_))
        ));
        assert!(matches!(
            ParsedDocument::parse("<a/>trailing"),
            Err(DocumentError::TextOutsideRoot(_))
        ));
    }

    #[test]
    fn test_serialize_keeps_structure() {
        let doc = ParsedDocument::parse(SAMPLE).unwrap();
        let xml = doc.to_xml().unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<!-- header -->"));
        assert!(xml.contains("a &amp; b"));

        let reparsed = ParsedDocument::parse(&xml).unwrap();
        assert_eq!(
            reparsed.descendant_elements(reparsed.root()).len(),
            doc.descendant_elements(doc.root()).len()
        );
    }

    #[test]
    fn test_reparent_children() {
        let mut doc = ParsedDocument::parse("<a><b/><c/></a>").unwrap();
        let old_root = doc.root();
        let new_root = doc.create_node(NodeKind::Element(Element::new("z")));
        for child in doc.take_children(old_root) {
            doc.append_child(new_root, child);
        }
        doc.replace_root(new_root);

        assert_eq!(doc.to_xml().unwrap(), "<z><b/><c/></z>");
        let first = doc.children(new_root)[0];
        assert_eq!(doc.parent(first), Some(new_root));
    }

    #[test]
    fn test_comments_under() {
        let doc = ParsedDocument::parse("<a><!--x--><b><!--y--></b></a>").unwrap();
        assert_eq!(doc.comments_under(doc.root()).len(), 2);
    }
}
