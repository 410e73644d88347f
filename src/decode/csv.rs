//! CSV decoder.
//!
//! Produces a header plus rows. A document without a header row is
//! malformed; rows shorter than the header are padded on access.

use thiserror::Error;

use super::{DecodeError, Decoder, strip_bom};

/// CSV-specific decode failures.
#[derive(Debug, Error)]
pub enum CsvDecodeError {
    #[error("input has no header row")]
    MissingHeader,

    #[error("malformed record: {0}")]
    Malformed(#[from] ::csv::Error),
}

/// A decoded CSV document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Index of a column by header name (ASCII case-insensitive).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Iterate rows as name-addressable records.
    pub fn records(&self) -> impl Iterator<Item = CsvRecord<'_>> {
        self.rows.iter().map(move |values| CsvRecord {
            table: self,
            values,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row of a [`CsvTable`].
#[derive(Debug, Clone, Copy)]
pub struct CsvRecord<'a> {
    table: &'a CsvTable,
    values: &'a [String],
}

impl<'a> CsvRecord<'a> {
    /// Trimmed value of the named column; `None` if the column is unknown or blank.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.table.column(column)?;
        self.values
            .get(idx)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Decoder for comma-separated listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDecoder;

impl Decoder for CsvDecoder {
    type Output = CsvTable;
    const NAME: &'static str = "csv";

    fn decode(&self, raw: &[u8]) -> Result<CsvTable, DecodeError> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(strip_bom(raw));

        let headers: Vec<String> = reader
            .headers()
            .map_err(CsvDecodeError::from)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(String::is_empty) {
            return Err(CsvDecodeError::MissingHeader.into());
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(CsvDecodeError::from)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(CsvTable { headers, rows })
    }
}
