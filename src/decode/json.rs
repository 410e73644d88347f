//! JSON decoders.
//!
//! [`JsonDecoder`] parses a single document; [`JsonLinesDecoder`] parses a
//! newline-delimited stream such as `gerrit query --format=JSON` output.

use serde_json::Value;
use thiserror::Error;

use super::{DecodeError, Decoder, strip_bom};

/// Prefix some REST APIs put in front of JSON bodies to defeat XSSI.
const XSSI_PREFIX: &[u8] = b")]}'";

/// JSON-specific decode failures.
#[derive(Debug, Error)]
pub enum JsonDecodeError {
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("malformed line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Decoder for a single JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    type Output = Value;
    const NAME: &'static str = "json";

    fn decode(&self, raw: &[u8]) -> Result<Value, DecodeError> {
        let body = strip_bom(raw);
        let body = body.strip_prefix(XSSI_PREFIX).unwrap_or(body);
        serde_json::from_slice(body)
            .map_err(JsonDecodeError::from)
            .map_err(DecodeError::from)
    }
}

/// Decoder for newline-delimited JSON; blank lines are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesDecoder;

impl Decoder for JsonLinesDecoder {
    type Output = Vec<Value>;
    const NAME: &'static str = "json";

    fn decode(&self, raw: &[u8]) -> Result<Vec<Value>, DecodeError> {
        strip_bom(raw)
            .split(|b| *b == b'\n')
            .enumerate()
            .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
            .map(|(idx, line)| {
                serde_json::from_slice(line).map_err(|source| {
                    DecodeError::from(JsonDecodeError::MalformedLine {
                        line: idx + 1,
                        source,
                    })
                })
            })
            .collect()
    }
}
