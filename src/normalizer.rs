// incident_ingestor/src/normalizer.rs
// Reads semicolon-delimited exports and turns each record into a normalized row.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use encoding_rs::Encoding;
use tracing::debug;

use crate::error::{IngestorError, Result};

/// Field delimiter used by the incident exports.
pub const DELIMITER: u8 = b';';

/// Canonical column name: trimmed, spaces turned into underscores, lower-cased.
pub fn normalize_field_name(raw: &str) -> String {
    raw.trim().replace(' ', "_").to_lowercase()
}

/// One source record keyed by normalized column name.
///
/// Absent columns read as the empty string, so callers never have to tell
/// "missing" apart from "blank".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRow {
    fields: HashMap<String, String>,
}

impl NormalizedRow {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (normalize_field_name(k.as_ref()), v.as_ref().trim().to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn has_value(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn decode(bytes: &[u8], encoding: &'static Encoding, path: &Path) -> Result<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
        .ok_or_else(|| {
            IngestorError::IoError(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} contains bytes that are not valid {}", path.display(), encoding.name()),
            ))
        })
}

/// Reads a whole export into memory.
///
/// Any open, parse or decode failure is returned as an error; the caller is
/// expected to abort the run rather than load half a file.
pub fn read_rows(path: &Path, encoding: &'static Encoding) -> Result<Vec<NormalizedRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let header_record = reader.byte_headers()?.clone();
    let headers = header_record
        .iter()
        .map(|h| decode(h, encoding, path).map(|h| normalize_field_name(&h)))
        .collect::<Result<Vec<String>>>()?;

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let mut fields = HashMap::with_capacity(headers.len());
        for (idx, header) in headers.iter().enumerate() {
            let value = match record.get(idx) {
                Some(raw) => decode(raw, encoding, path)?.trim().to_string(),
                None => String::new(),
            };
            fields.insert(header.clone(), value);
        }
        rows.push(NormalizedRow { fields });
    }

    debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}
