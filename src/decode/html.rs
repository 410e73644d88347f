//! HTML decoder.
//!
//! Parses a (possibly sloppy) HTML document with `scraper` and copies it
//! into an [`Element`] tree. Comment, doctype and processing-instruction
//! nodes are dropped, so markup comments never reach consumers as data.

use scraper::{ElementRef, Html, Node as HtmlNode};
use thiserror::Error;

use super::tree::{Element, Node};
use super::{DecodeError, Decoder, strip_bom};

/// HTML-specific decode failures.
#[derive(Debug, Error)]
pub enum HtmlDecodeError {
    #[error("document has no root element")]
    NoRoot,
}

/// Decoder for HTML pages (activity tables and the like).
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlDecoder;

impl Decoder for HtmlDecoder {
    type Output = Element;
    const NAME: &'static str = "html";

    fn decode(&self, raw: &[u8]) -> Result<Element, DecodeError> {
        let text = String::from_utf8_lossy(strip_bom(raw));
        if !text.contains('<') {
            return Err(HtmlDecodeError::NoRoot.into());
        }

        let document = Html::parse_document(&text);
        let root = convert(document.root_element());

        if root.elements().next().is_none() && root.text_trimmed().is_empty() {
            return Err(HtmlDecodeError::NoRoot.into());
        }
        Ok(root)
    }
}

/// Elements that end a line when an HTML fragment is flattened to text.
const LINE_BREAKING: &[&str] = &["br", "div", "li", "ol", "p", "tr", "ul"];

/// Plain text of an HTML fragment.
///
/// Tags are dropped and character references decoded (`&gt;`, `&#8594;`,
/// ...). Block elements and `<br>` end the current line, so list items and
/// paragraphs come out one per line.
#[must_use]
pub fn fragment_text(fragment: &str) -> String {
    let html = Html::parse_fragment(fragment);
    let mut out = String::new();
    push_fragment_text(html.root_element(), &mut out);
    out
}

fn push_fragment_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            HtmlNode::Text(text) => out.push_str(text),
            HtmlNode::Element(value) => {
                let breaks = LINE_BREAKING.contains(&value.name());
                if breaks && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_fragment_text(child_el, out);
                }
                if breaks && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn convert(el: ElementRef<'_>) -> Element {
    let value = el.value();
    let mut out = Element::new(value.name());
    out.attrs = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for child in el.children() {
        match child.value() {
            HtmlNode::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.children.push(Node::Element(convert(child_el)));
                }
            }
            HtmlNode::Text(text) => {
                let text: &str = text;
                if !text.trim().is_empty() {
                    out.children.push(Node::Text(text.to_string()));
                }
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_are_stripped() {
        let raw = b"<html><body><!-- hidden --><table><tr><td rowspan=\"2\">alice<!-- x --></td></tr></table></body></html>";
        let root = HtmlDecoder.decode(raw).unwrap();

        let cells = root.descendants_named("td");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].attr("rowspan"), Some("2"));
        assert_eq!(cells[0].text(), "alice");
        assert!(!root.text().contains("hidden"));
    }

    #[test]
    fn test_fragment_is_wrapped_in_document() {
        let root = HtmlDecoder.decode(b"<p>hi</p>").unwrap();
        assert_eq!(root.name, "html");
        assert_eq!(root.descendants_named("p").len(), 1);
    }

    #[test]
    fn test_fragment_text_decodes_references() {
        let text = fragment_text("<ul><li><b>status</b>: open &#8594; closed</li><li>a &amp;&nbsp;b</li></ul>");
        assert_eq!(text, "status: open \u{2192} closed\na &\u{a0}b\n");
        assert_eq!(fragment_text("x: 1 --&gt; 2<br>y: 3 -> 4"), "x: 1 --> 2\ny: 3 -> 4");
        assert_eq!(fragment_text("<!-- note -->plain"), "plain");
    }

    #[test]
    fn test_no_markup_is_error() {
        let err = HtmlDecoder.decode(b"   plain text   ").unwrap_err();
        assert!(matches!(err, DecodeError::Html(HtmlDecodeError::NoRoot)));
        assert!(HtmlDecoder.decode(b"").is_err());
    }
}
