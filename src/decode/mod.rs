//! Format decoders.
//!
//! Each decoder turns raw response bytes into a syntax-level structure and
//! nothing more: rows for CSV, an element tree for HTML and XML, a value
//! tree for JSON. No decoder interprets tracker semantics.
//!
//! Decoders fail only on structurally malformed input. Missing optional
//! fields are the caller's business.
//!
//! # Submodules
//!
//! - [`tree`] - Element tree shared by the HTML and XML decoders
//! - [`csv`] - CSV rows with a mandatory header
//! - [`html`] - HTML documents, comments stripped
//! - [`xml`] - XML documents
//! - [`json`] - JSON documents and JSON-lines streams

pub mod csv;
pub mod html;
pub mod json;
pub mod tree;
pub mod xml;

use thiserror::Error;

pub use self::csv::{CsvDecodeError, CsvDecoder, CsvRecord, CsvTable};
pub use self::html::{HtmlDecodeError, HtmlDecoder, fragment_text};
pub use self::json::{JsonDecodeError, JsonDecoder, JsonLinesDecoder};
pub use self::tree::{Element, Node};
pub use self::xml::{XmlDecodeError, XmlDecoder};

/// Common contract of every format decoder.
pub trait Decoder {
    /// The intermediate structure this decoder produces.
    type Output;

    /// Decoder name used in errors and logs.
    const NAME: &'static str;

    /// Decode raw bytes into the intermediate structure.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError` tagged with this decoder when the input is
    /// structurally malformed.
    fn decode(&self, raw: &[u8]) -> Result<Self::Output, DecodeError>;
}

/// A decoder failure, tagged with the decoder that produced it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("csv decoder: {0}")]
    Csv(#[from] CsvDecodeError),

    #[error("html decoder: {0}")]
    Html(#[from] HtmlDecodeError),

    #[error("xml decoder: {0}")]
    Xml(#[from] XmlDecodeError),

    #[error("json decoder: {0}")]
    Json(#[from] JsonDecodeError),
}

impl DecodeError {
    /// Name of the decoder that failed.
    #[must_use]
    pub const fn decoder(&self) -> &'static str {
        match self {
            Self::Csv(_) => CsvDecoder::NAME,
            Self::Html(_) => HtmlDecoder::NAME,
            Self::Xml(_) => XmlDecoder::NAME,
            Self::Json(_) => JsonDecoder::NAME,
        }
    }
}

/// Strip a UTF-8 byte order mark, if present.
pub(crate) fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw)
}
