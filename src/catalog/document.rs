use super::error::ValidationError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::Cursor;

/// A node in the parsed document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its attributes (in document order) and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First direct child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated direct text content, or `None` if the element has no text nodes.
    pub fn text(&self) -> Option<String> {
        let mut text: Option<String> = None;
        for node in &self.children {
            if let Node::Text(t) = node {
                text.get_or_insert_with(String::new).push_str(t);
            }
        }
        text
    }

    /// All descendant elements named `name`, in document order, excluding `self`.
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        while let Some(el) = stack.pop() {
            if el.name == name {
                found.push(el);
            }
            let before = stack.len();
            stack.extend(el.child_elements());
            stack[before..].reverse();
        }
        found
    }

    fn push_text(&mut self, text: &str) {
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }
}

/// A parsed, well-formed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
}

/// Parses a complete XML document into an element tree.
///
/// Entity references are resolved for the five predefined entities and for
/// character references; anything else is rejected, as is more than one root
/// element, non-whitespace text outside the root, or an unclosed element.
///
/// The doctype is skipped, internal subset included. General entities declared
/// in an internal subset (`<!DOCTYPE R [ <!ENTITY x "..."> ]>`) are therefore not
/// expanded, and a reference to one fails as an unknown entity.
pub fn parse_document(content: &[u8]) -> Result<Document, ValidationError> {
    let mut reader = Reader::from_reader(Cursor::new(content));
    reader.config_mut().check_end_names = true;

    let mut buf = Vec::with_capacity(8192);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ValidationError::Parse(format!("{e} at byte {}", reader.error_position())))?;

        match event {
            Event::Start(e) => {
                let element = start_element(&e)?;
                if stack.is_empty() && root.is_some() {
                    return Err(extra_content(&element.name));
                }
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = start_element(&e)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(e) => {
                let name = decode_name(e.name().as_ref())?;
                let element = stack.pop().ok_or_else(|| {
                    ValidationError::Parse(format!("Unexpected closing tag </{name}>"))
                })?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(e) => {
                let text = e
                    .decode()
                    .map_err(|e| ValidationError::Parse(format!("Failed to decode XML text: {e}")))?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(&e)
                    .map_err(|e| ValidationError::Parse(format!("Invalid UTF-8 in CDATA: {e}")))?;
                if stack.is_empty() {
                    return Err(ValidationError::Parse(
                        "CDATA section outside the root element".into(),
                    ));
                }
                append_text(&mut stack, text)?;
            }
            Event::GeneralRef(e) => {
                let name = e
                    .decode()
                    .map_err(|e| ValidationError::Parse(format!("Failed to decode reference: {e}")))?;
                let resolved = resolve_reference(&name)?;
                if stack.is_empty() {
                    return Err(ValidationError::Parse(format!(
                        "Entity reference &{name}; outside the root element"
                    )));
                }
                append_text(&mut stack, &resolved)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and the doctype carry no tree content.
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ValidationError::Parse(format!(
            "Unexpected end of document: <{}> is not closed",
            open.name
        )));
    }

    root.map(|root| Document { root })
        .ok_or_else(|| ValidationError::Parse("Document has no root element".into()))
}

fn start_element(e: &BytesStart) -> Result<Element, ValidationError> {
    let name = decode_name(e.name().as_ref())?;
    let mut attributes: Vec<(String, String)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| ValidationError::Parse(format!("Bad attribute on <{name}>: {err}")))?;
        let key = decode_name(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|err| ValidationError::Parse(format!("Bad value for {key} on <{name}>: {err}")))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element::new(name, attributes))
}

fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), ValidationError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(extra_content(&element.name)),
    }
    Ok(())
}

fn append_text(stack: &mut [Element], text: &str) -> Result<(), ValidationError> {
    match stack.last_mut() {
        Some(current) => current.push_text(text),
        None if text.trim().is_empty() => {}
        None => {
            return Err(ValidationError::Parse(
                "Text content outside the root element".into(),
            ))
        }
    }
    Ok(())
}

fn extra_content(name: &str) -> ValidationError {
    ValidationError::Parse(format!(
        "Extra content at the end of the document: <{name}>"
    ))
}

fn decode_name(raw: &[u8]) -> Result<String, ValidationError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| ValidationError::Parse(format!("Invalid UTF-8 in name: {e}")))
}

fn resolve_reference(name: &str) -> Result<String, ValidationError> {
    let resolved = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                return Err(ValidationError::Parse(format!(
                    "Entity '{name}' not defined"
                )));
            };
            return code
                .and_then(char::from_u32)
                .map(String::from)
                .ok_or_else(|| {
                    ValidationError::Parse(format!("Invalid character reference &{name};"))
                });
        }
    };
    Ok(resolved.to_string())
}
