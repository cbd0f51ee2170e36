use std::io::Cursor;

use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Node handle into a parsed [`Document`].
pub type NodeId = usize;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("XML is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("document has no root element")]
    NoRootElement,
    #[error("unbalanced element nesting")]
    Unbalanced,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    /// Qualified name exactly as it appeared on the wire (prefix included).
    pub qname: String,
    /// Unescaped value.
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Element {
        qname: String,
        attributes: Vec<Attribute>,
        children: Vec<NodeId>,
        self_closing: bool,
    },
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
}

/// A handle into the DOM sufficient to overwrite an identifier value later,
/// without disturbing anything around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomSite {
    /// An attribute on an element, addressed by local name.
    Attribute { node: NodeId, name: String },
    /// The text content of an element.
    Text { node: NodeId },
}

/// A lightweight DOM that preserves namespace prefixes, attribute order and
/// document order, so that a rewritten document serializes back into the
/// shape downstream actors expect.
///
/// Elements are matched by local name; prefixes are carried verbatim and
/// never rewritten.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    /// Children of the synthetic document root (declaration excluded).
    top_level: Vec<NodeId>,
    decl: Option<(String, Option<String>, Option<String>)>,
}

impl Document {
    pub fn parse(input: &str) -> Result<Document, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut doc = Document {
            nodes: Vec::new(),
            top_level: Vec::new(),
            decl: None,
        };
        // Stack of open elements; None marks the synthetic root.
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Decl(e)) => {
                    let version = cow_utf8(e.version().map_err(parse_err)?)?;
                    let encoding = match e.encoding() {
                        Some(enc) => Some(cow_utf8(enc.map_err(parse_err)?)?),
                        None => None,
                    };
                    let standalone = match e.standalone() {
                        Some(sa) => Some(cow_utf8(sa.map_err(parse_err)?)?),
                        None => None,
                    };
                    doc.decl = Some((version, encoding, standalone));
                }
                Ok(Event::Start(e)) => {
                    let id = doc.push_element(&e, false, &stack)?;
                    stack.push(id);
                }
                Ok(Event::Empty(e)) => {
                    doc.push_element(&e, true, &stack)?;
                }
                Ok(Event::End(_)) => {
                    stack.pop().ok_or(XmlError::Unbalanced)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(parse_err)?.into_owned();
                    doc.push_node(NodeKind::Text(text), &stack);
                }
                Ok(Event::CData(e)) => {
                    let raw = String::from_utf8(e.into_inner().into_owned())
                        .map_err(|e| XmlError::Encoding(e.to_string()))?;
                    doc.push_node(NodeKind::CData(raw), &stack);
                }
                Ok(Event::Comment(e)) => {
                    let raw = String::from_utf8(e.to_vec())
                        .map_err(|e| XmlError::Encoding(e.to_string()))?;
                    doc.push_node(NodeKind::Comment(raw), &stack);
                }
                Ok(Event::PI(e)) => {
                    let raw = String::from_utf8(e.to_vec())
                        .map_err(|e| XmlError::Encoding(e.to_string()))?;
                    doc.push_node(NodeKind::ProcessingInstruction(raw), &stack);
                }
                Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(XmlError::Parse(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Unbalanced);
        }
        if doc.root().is_none() {
            return Err(XmlError::NoRootElement);
        }
        Ok(doc)
    }

    fn push_element(
        &mut self,
        e: &BytesStart,
        self_closing: bool,
        stack: &[NodeId],
    ) -> Result<NodeId, XmlError> {
        let qname = bytes_utf8(e.name().as_ref())?;
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
            attributes.push(Attribute {
                qname: bytes_utf8(attr.key.as_ref())?,
                value: attr.unescape_value().map_err(parse_err)?.into_owned(),
            });
        }
        Ok(self.push_node(
            NodeKind::Element {
                qname,
                attributes,
                children: Vec::new(),
                self_closing,
            },
            stack,
        ))
    }

    fn push_node(&mut self, kind: NodeKind, stack: &[NodeId]) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { kind });
        match stack.last() {
            Some(&parent) => {
                if let NodeKind::Element { children, .. } = &mut self.nodes[parent].kind {
                    children.push(id);
                }
            }
            None => self.top_level.push(id),
        }
        id
    }

    /// The document's root element.
    pub fn root(&self) -> Option<NodeId> {
        self.top_level
            .iter()
            .copied()
            .find(|&id| matches!(self.nodes[id].kind, NodeKind::Element { .. }))
    }

    /// Qualified name of an element node, empty for non-elements.
    pub fn qname(&self, id: NodeId) -> &str {
        match &self.nodes[id].kind {
            NodeKind::Element { qname, .. } => qname,
            _ => "",
        }
    }

    /// Local (prefix-stripped) name of an element node.
    pub fn local_name(&self, id: NodeId) -> &str {
        strip_prefix(self.qname(id))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id].kind {
            NodeKind::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| matches!(self.nodes[c].kind, NodeKind::Element { .. }))
    }

    /// Element children with the given local name.
    pub fn child_elements(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.element_children(id)
            .filter(|&c| self.local_name(c) == local)
            .collect()
    }

    pub fn first_child_element(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.element_children(id)
            .find(|&c| self.local_name(c) == local)
    }

    /// All descendant elements of `from` (preorder), including `from` itself
    /// when it matches.
    pub fn descendant_elements(&self, from: NodeId, local: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if self.local_name(id) == local {
                out.push(id);
            }
            let mut kids: Vec<NodeId> = self.element_children(id).collect();
            kids.reverse();
            pending.extend(kids);
        }
        out.sort_unstable();
        out
    }

    /// Attribute value by local name.
    pub fn attr(&self, id: NodeId, local: &str) -> Option<&str> {
        match &self.nodes[id].kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|a| strip_prefix(&a.qname) == local)
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    /// Replace an attribute value in place, keeping its position. Appends the
    /// attribute when absent.
    pub fn set_attr(&mut self, id: NodeId, local: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id].kind {
            match attributes.iter_mut().find(|a| strip_prefix(&a.qname) == local) {
                Some(attr) => attr.value = value.to_string(),
                None => attributes.push(Attribute {
                    qname: local.to_string(),
                    value: value.to_string(),
                }),
            }
        }
    }

    /// Concatenated direct text content of an element.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &c in self.children(id) {
            match &self.nodes[c].kind {
                NodeKind::Text(t) | NodeKind::CData(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    /// Replace the direct text content of an element.
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        let existing = self.children(id).iter().copied().find(|&c| {
            matches!(
                self.nodes[c].kind,
                NodeKind::Text(_) | NodeKind::CData(_)
            )
        });
        match existing {
            Some(text_id) => {
                self.nodes[text_id].kind = NodeKind::Text(value.to_string());
                // Collapse any further text fragments.
                let extra: Vec<NodeId> = self
                    .children(id)
                    .iter()
                    .copied()
                    .filter(|&c| {
                        c != text_id
                            && matches!(
                                self.nodes[c].kind,
                                NodeKind::Text(_) | NodeKind::CData(_)
                            )
                    })
                    .collect();
                for e in extra {
                    self.nodes[e].kind = NodeKind::Text(String::new());
                }
            }
            None => {
                let text_id = self.nodes.len();
                self.nodes.push(Node {
                    kind: NodeKind::Text(value.to_string()),
                });
                if let NodeKind::Element { children, .. } = &mut self.nodes[id].kind {
                    children.push(text_id);
                }
            }
        }
    }

    /// Read the current value at a rewrite site.
    pub fn read_site(&self, site: &DomSite) -> Option<String> {
        match site {
            DomSite::Attribute { node, name } => self.attr(*node, name).map(str::to_string),
            DomSite::Text { node } => Some(self.text(*node)),
        }
    }

    /// Overwrite the value at a rewrite site.
    pub fn write_site(&mut self, site: &DomSite, value: &str) {
        match site {
            DomSite::Attribute { node, name } => self.set_attr(*node, name, value),
            DomSite::Text { node } => self.set_text(*node, value),
        }
    }

    /// Serialize the document back out, preserving element order, attribute
    /// order and namespace prefixes.
    pub fn to_string(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        if let Some((version, encoding, standalone)) = &self.decl {
            writer
                .write_event(Event::Decl(BytesDecl::new(
                    version,
                    encoding.as_deref(),
                    standalone.as_deref(),
                )))
                .map_err(write_err)?;
        }
        for &id in &self.top_level {
            self.write_node(&mut writer, id)?;
        }
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| XmlError::Encoding(e.to_string()))
    }

    fn write_node(
        &self,
        writer: &mut Writer<Cursor<Vec<u8>>>,
        id: NodeId,
    ) -> Result<(), XmlError> {
        match &self.nodes[id].kind {
            NodeKind::Element {
                qname,
                attributes,
                children,
                self_closing,
            } => {
                let mut elem = BytesStart::new(qname.as_str());
                for attr in attributes {
                    elem.push_attribute((attr.qname.as_str(), attr.value.as_str()));
                }
                if children.is_empty() && *self_closing {
                    writer.write_event(Event::Empty(elem)).map_err(write_err)?;
                } else {
                    writer.write_event(Event::Start(elem)).map_err(write_err)?;
                    for &c in children {
                        self.write_node(writer, c)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new(qname.as_str())))
                        .map_err(write_err)?;
                }
            }
            NodeKind::Text(t) => {
                if !t.is_empty() {
                    writer
                        .write_event(Event::Text(BytesText::new(t)))
                        .map_err(write_err)?;
                }
            }
            NodeKind::CData(t) => {
                writer
                    .write_event(Event::CData(BytesCData::new(t.as_str())))
                    .map_err(write_err)?;
            }
            NodeKind::Comment(t) => {
                writer
                    .write_event(Event::Comment(BytesText::from_escaped(t.as_str())))
                    .map_err(write_err)?;
            }
            NodeKind::ProcessingInstruction(t) => {
                writer
                    .write_event(Event::PI(BytesText::new(t.as_str())))
                    .map_err(write_err)?;
            }
        }
        Ok(())
    }
}

fn strip_prefix(qname: &str) -> &str {
    match qname.rsplit_once(':') {
        Some((_, local)) => local,
        None => qname,
    }
}

fn parse_err<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError::Parse(e.to_string())
}

fn write_err<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError::Parse(e.to_string())
}

fn bytes_utf8(bytes: &[u8]) -> Result<String, XmlError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| XmlError::Encoding(e.to_string()))
}

fn cow_utf8(bytes: std::borrow::Cow<'_, [u8]>) -> Result<String, XmlError> {
    bytes_utf8(bytes.as_ref())
}
