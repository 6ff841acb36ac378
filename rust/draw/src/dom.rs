// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vector document tree
//!
//! A small order-preserving XML element tree used for the serializer output
//! and the document merge. The merge step never mutates a parsed tree in
//! place; it builds a new tree from the two inputs, so subtree ownership is
//! explicit. Output is ASCII: non-ASCII characters are written as numeric
//! character references.

use crate::error::{Error, Result};

/// A child node: element or character data
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with ordered attributes and children
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set an attribute, replacing an existing one of the same name
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Child elements, skipping text nodes
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements (self included) in document order
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        fn walk<'a>(e: &'a Element, out: &mut Vec<&'a Element>) {
            out.push(e);
            for c in e.child_elements() {
                walk(c, out);
            }
        }
        walk(self, &mut out);
        out
    }

    /// Descendant `<g>` elements with the given class, in document order
    pub fn groups_with_class(&self, class: &str) -> Vec<&Element> {
        self.descendants()
            .into_iter()
            .filter(|e| e.tag == "g" && e.attr("class") == Some(class))
            .collect()
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_into(value, true, out);
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                Node::Element(e) => e.write(out),
                Node::Text(t) => escape_into(t, false, out),
            }
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

/// A complete vector document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    /// Serialize with an XML declaration
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"us-ascii\"?>\n");
        self.root.write(&mut out);
        out
    }

    /// Serialize to ASCII bytes, replacing non-ASCII characters with
    /// numeric character references
    pub fn to_ascii_bytes(&self) -> Vec<u8> {
        let xml = self.to_xml();
        let mut out = Vec::with_capacity(xml.len());
        for ch in xml.chars() {
            if ch.is_ascii() {
                out.push(ch as u8);
            } else {
                out.extend_from_slice(format!("&#{};", ch as u32).as_bytes());
            }
        }
        out
    }

    /// Parse a document produced by this pipeline.
    ///
    /// Supports the XML subset the serializer emits: one root element,
    /// attributes in single or double quotes, character data, comments and
    /// processing instructions (skipped), and the five predefined entities
    /// plus numeric character references.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            bytes: input.as_bytes(),
            pos: 0,
        };
        parser.skip_misc();
        let root = parser.parse_element()?;
        parser.skip_misc();
        if parser.pos != parser.bytes.len() {
            return Err(Error::Document(format!(
                "trailing content at byte {}",
                parser.pos
            )));
        }
        Ok(Self { root })
    }
}

fn escape_into(s: &str, in_attribute: bool, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, message: &str) -> Error {
        Error::Document(format!("{message} at byte {}", self.pos))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Skip whitespace, comments, processing instructions and doctypes
    fn skip_misc(&mut self) {
        loop {
            self.skip_ws();
            if self.starts_with("<!--") {
                match find_from(self.bytes, self.pos + 4, b"-->") {
                    Some(end) => self.pos = end + 3,
                    None => {
                        self.pos = self.bytes.len();
                        return;
                    }
                }
            } else if self.starts_with("<?") || self.starts_with("<!") {
                match find_from(self.bytes, self.pos, b">") {
                    Some(end) => self.pos = end + 1,
                    None => {
                        self.pos = self.bytes.len();
                        return;
                    }
                }
            } else {
                return;
            }
        }
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, b':' | b'_' | b'-' | b'.') {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected name"));
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn parse_element(&mut self) -> Result<Element> {
        if self.peek() != Some(b'<') {
            return Err(self.err("expected element"));
        }
        self.pos += 1;
        let tag = self.read_name()?;
        let mut element = Element::new(tag);

        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() != Some(b'>') {
                        return Err(self.err("expected '>' after '/'"));
                    }
                    self.pos += 1;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let name = self.read_name()?;
                    self.skip_ws();
                    if self.peek() != Some(b'=') {
                        return Err(self.err("expected '=' in attribute"));
                    }
                    self.pos += 1;
                    self.skip_ws();
                    let quote = match self.peek() {
                        Some(q @ (b'"' | b'\'')) => q,
                        _ => return Err(self.err("expected quoted attribute value")),
                    };
                    self.pos += 1;
                    let start = self.pos;
                    let end = find_from(self.bytes, start, &[quote])
                        .ok_or_else(|| self.err("unterminated attribute value"))?;
                    let raw = String::from_utf8_lossy(&self.bytes[start..end]).into_owned();
                    self.pos = end + 1;
                    element.set_attr(name, unescape(&raw)?);
                }
                None => return Err(self.err("unexpected end of input in tag")),
            }
        }

        // Children until the matching end tag
        loop {
            if self.starts_with("<!--") {
                self.skip_misc();
                continue;
            }
            match self.peek() {
                Some(b'<') => {
                    if self.starts_with("</") {
                        self.pos += 2;
                        let name = self.read_name()?;
                        if name != element.tag {
                            return Err(self.err("mismatched end tag"));
                        }
                        self.skip_ws();
                        if self.peek() != Some(b'>') {
                            return Err(self.err("expected '>' in end tag"));
                        }
                        self.pos += 1;
                        return Ok(element);
                    }
                    element.children.push(Node::Element(self.parse_element()?));
                }
                Some(_) => {
                    let start = self.pos;
                    let end = find_from(self.bytes, start, b"<")
                        .ok_or_else(|| self.err("unterminated element content"))?;
                    let raw = String::from_utf8_lossy(&self.bytes[start..end]).into_owned();
                    self.pos = end;
                    let text = unescape(&raw)?;
                    if !text.trim().is_empty() {
                        element.children.push(Node::Text(text));
                    }
                }
                None => return Err(self.err("unexpected end of input in element")),
            }
        }
    }
}

fn find_from(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    if start > bytes.len() {
        return None;
    }
    bytes[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| start + i)
}

fn unescape(s: &str) -> Result<String> {
    if !s.contains('&') {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest
            .find(';')
            .ok_or_else(|| Error::Document("unterminated entity reference".to_string()))?;
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|h| u32::from_str_radix(h, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .transpose()
                    .ok()
                    .flatten()
                    .ok_or_else(|| Error::Document(format!("unknown entity '&{entity};'")))?;
                out.push(
                    char::from_u32(code)
                        .ok_or_else(|| Error::Document(format!("invalid character {code}")))?,
                );
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_parse_roundtrip() {
        let mut root = Element::new("svg").with_attr("xmlns", "http://www.w3.org/2000/svg");
        let mut group = Element::new("g")
            .with_attr("class", "projection")
            .with_attr("ifc:name", "Ground \"floor\" & more");
        group.push(Element::new("path").with_attr("d", "M0,0 L10,0"));
        let mut label = Element::new("text");
        label.push_text("Caf\u{e9} <1>");
        group.push(label);
        root.push(group);

        let doc = Document::new(root);
        let parsed = Document::parse(&doc.to_xml()).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_ascii_bytes_use_character_references() {
        let mut root = Element::new("svg");
        let mut text = Element::new("text");
        text.push_text("Caf\u{e9}");
        root.push(text);
        let bytes = Document::new(root).to_ascii_bytes();
        assert!(bytes.is_ascii());
        let s = String::from_utf8(bytes).unwrap();
        assert!(s.contains("Caf&#233;"), "{s}");
    }

    #[test]
    fn test_groups_with_class_in_document_order() {
        let xml = r#"<svg>
            <g ifc:name="A"><g class="projection"><path d="M0,0 L1,1"/></g><g class="section"/></g>
            <g ifc:name="B"><g class="projection"/></g>
        </svg>"#;
        let doc = Document::parse(xml).unwrap();
        let groups = doc.root.groups_with_class("projection");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].child_elements().count(), 1);
    }

    #[test]
    fn test_parse_rejects_mismatched_tags() {
        assert!(Document::parse("<svg><g></svg>").is_err());
    }

    #[test]
    fn test_parse_skips_declaration_and_comments() {
        let xml = "<?xml version=\"1.0\"?><!-- header --><svg a='1'><!-- inner --></svg>";
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.root.attr("a"), Some("1"));
    }

    #[test]
    fn test_set_attr_replaces_existing() {
        let mut e = Element::new("path").with_attr("class", "old");
        e.set_attr("class", "new");
        assert_eq!(e.attr("class"), Some("new"));
        assert_eq!(e.attrs().count(), 1);
    }
}
