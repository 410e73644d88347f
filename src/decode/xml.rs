//! XML decoder.
//!
//! Streams the document with `quick-xml` and builds an [`Element`] tree.
//! Comments, processing instructions and the prolog are skipped; CDATA is
//! kept as text.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use super::tree::{Element, Node};
use super::{DecodeError, Decoder, strip_bom};

/// XML-specific decode failures.
#[derive(Debug, Error)]
pub enum XmlDecodeError {
    #[error("document has no root element")]
    NoRoot,

    #[error("malformed at byte {position}: {cause}")]
    Malformed { position: u64, cause: String },

    #[error("unexpected closing tag </{0}>")]
    UnbalancedEnd(String),

    #[error("unclosed element <{0}>")]
    Unclosed(String),
}

/// Decoder for XML documents (bug exports, Atom feeds).
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDecoder;

impl Decoder for XmlDecoder {
    type Output = Element;
    const NAME: &'static str = "xml";

    fn decode(&self, raw: &[u8]) -> Result<Element, DecodeError> {
        let text = String::from_utf8_lossy(strip_bom(raw));
        parse(&text).map_err(DecodeError::from)
    }
}

fn parse(text: &str) -> Result<Element, XmlDecodeError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| malformed(&reader, &e))?;
        match event {
            Event::Start(start) => {
                stack.push(open(&reader, &start)?);
            }
            Event::Empty(start) => {
                let el = open(&reader, &start)?;
                attach(&mut stack, &mut root, el);
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let Some(el) = stack.pop() else {
                    return Err(XmlDecodeError::UnbalancedEnd(name));
                };
                if el.name != name {
                    return Err(XmlDecodeError::UnbalancedEnd(name));
                }
                attach(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                let value = t.unescape().map_err(|e| malformed(&reader, &e))?;
                push_text(&mut stack, &value);
            }
            Event::CData(c) => {
                let value = String::from_utf8_lossy(&c.into_inner()).into_owned();
                push_text(&mut stack, &value);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlDecodeError::Unclosed(open.name));
    }
    root.ok_or(XmlDecodeError::NoRoot)
}

fn open(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Element, XmlDecodeError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(reader, &e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(reader, &e))?
            .into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        // A second top-level element is ignored; the first one is the document.
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

fn push_text(stack: &mut [Element], value: &str) {
    if let Some(parent) = stack.last_mut() {
        if !value.is_empty() {
            parent.children.push(Node::Text(value.to_string()));
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
fn malformed(reader: &Reader<&[u8]>, err: &impl std::fmt::Display) -> XmlDecodeError {
    XmlDecodeError::Malformed {
        position: reader.buffer_position() as u64,
        cause: err.to_string(),
    }
}
