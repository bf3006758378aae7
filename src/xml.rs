//! Minimal owned XML tree built on `quick-xml` events.
//!
//! The lexicon needs structural rewrites (glyph substitution) and inner-markup
//! serialization, which the streaming reader alone does not give us.

use crate::error::ParseError;
use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First descendant (not self) named `name`, in document order.
    pub fn find_first(&self, name: &str) -> Option<&Element> {
        for child in self.child_elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find_first(name) {
                return Some(found);
            }
        }
        None
    }

    /// Every descendant named `name`, in document order, nested matches included.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name == name {
                found.push(child);
            }
            child.collect_named(name, found);
        }
    }

    /// Concatenated text of all descendant text and CDATA nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Element(element) => element.push_text(out),
                Node::Text(text) | Node::CData(text) => out.push_str(text),
                Node::Comment(_) => {}
            }
        }
    }

    /// Serialized markup of the children, without this element's own tags.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_node(child, &mut out);
        }
        out
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Element(element) => write_element(element, out),
        Node::Text(text) => out.push_str(&partial_escape(text.as_str())),
        Node::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

/// Parses a complete document. Exactly one root element is accepted and
/// non-whitespace text outside it is rejected.
pub fn parse(xml: &str) -> Result<Document, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|err| malformed(position, err))?;
        match event {
            Event::Start(start) => stack.push(open_element(&start, position)?),
            Event::Empty(start) => {
                let element = open_element(&start, position)?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(position, "closing tag without an open element"))?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(|err| malformed(position, err))?;
                push_content(&mut stack, Node::Text(value.into_owned()), position)?;
            }
            Event::CData(data) => {
                let value = utf8(&data, position)?;
                push_content(&mut stack, Node::CData(value.into_owned()), position)?;
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    let value = utf8(&comment, position)?;
                    parent.children.push(Node::Comment(value.into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::Unclosed(open.name));
    }
    root.map(|root| Document { root }).ok_or(ParseError::NoRoot)
}

fn open_element(start: &BytesStart<'_>, position: u64) -> Result<Element, ParseError> {
    let name = utf8(start.name().as_ref(), position)?.into_owned();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|err| malformed(position, err))?;
        let key = utf8(attr.key.as_ref(), position)?.into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(position, err))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: u64,
) -> Result<(), ParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed(position, "document has more than one root element"));
    }
    *root = Some(element);
    Ok(())
}

fn push_content(stack: &mut [Element], node: Node, position: u64) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => match &node {
            Node::Text(text) if text.trim().is_empty() => Ok(()),
            _ => Err(malformed(position, "content outside the root element")),
        },
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<Cow<'_, str>, ParseError> {
    std::str::from_utf8(bytes)
        .map(Cow::Borrowed)
        .map_err(|err| malformed(position, err))
}

fn malformed(position: u64, message: impl ToString) -> ParseError {
    ParseError::Malformed {
        position,
        message: message.to_string(),
    }
}
