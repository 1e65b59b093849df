// src/process/mod.rs
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use tracing::{debug, trace};

pub mod date_parser;
pub mod normalize;
pub mod utils;

use utils::clean_header;

/// One data line of a snapshot: ordered (column, value) pairs.
///
/// Column names are cleaned on the way in; values are kept raw so the
/// normalizer decides how each one is coerced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (clean_header(k.as_ref()), v.into()))
                .collect(),
        }
    }

    /// Value of the first column named `column`, if the row has one.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every value is empty once quotes and whitespace are removed.
    pub fn is_blank(&self) -> bool {
        self.cells
            .iter()
            .all(|(_, v)| utils::clean_str(v).is_empty())
    }
}

/// A decoded snapshot: the header line plus every non-blank data line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Cleaned column names, in file order.
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }
}

/// Decode snapshot bytes: UTF-8 when valid (BOM dropped), otherwise the
/// Windows-1252 code page spreadsheet exports fall back to.
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            debug!("snapshot is not UTF-8, decoding as windows-1252");
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text
        }
    }
}

/// Parse a raw `*_AO_GENERAL.txt` export.
///
/// Layout:
/// - line 1: title/metadata, discarded
/// - line 2: tab-separated header
/// - rest: tab-separated data, short rows padded with nothing, extra cells dropped
///
/// Quotes are not treated as field delimiters because exports leave them
/// unbalanced; they are stripped later by the normalizer. A file without a
/// header line yields an empty table, which fails the structural check.
#[tracing::instrument(level = "debug", skip(bytes), fields(len = bytes.len()))]
pub fn load_report(bytes: &[u8]) -> Result<RawTable> {
    let text = decode_bytes(bytes);
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes());

    let mut records = rdr.records();

    // title line
    match records.next() {
        Some(title) => {
            let title = title.context("reading title line")?;
            trace!(title = ?title.get(0), "skipping title line");
        }
        None => return Ok(RawTable::default()),
    }

    let headers: Vec<String> = match records.next() {
        Some(header) => header
            .context("reading header line")?
            .iter()
            .map(clean_header)
            .collect(),
        None => return Ok(RawTable::default()),
    };

    let mut rows = Vec::new();
    for (idx, result) in records.enumerate() {
        let record = result.with_context(|| format!("reading data line {}", idx + 3))?;
        let row = RawRow {
            cells: headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect(),
        };
        if row.is_blank() {
            continue;
        }
        rows.push(row);
    }

    debug!(columns = headers.len(), rows = rows.len(), "loaded report");
    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Reporte AO General\t\t\n\
\"Nivel\" \t Elementos\t\"Hormigonado\"\tVolumenHA\n\
N1\tMuro\tSí\t1,50\n\
\t\t\t\n\
\"N2\"\tLosa\"\tNo\t2,00\n";

    #[test]
    fn header_is_second_line_and_cleaned() {
        let table = load_report(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            table.headers,
            vec!["Nivel", "Elementos", "Hormigonado", "VolumenHA"]
        );
        assert_eq!(table.rows.len(), 2, "blank line must be dropped");
        assert_eq!(table.rows[0].get("Hormigonado"), Some("Sí"));
        assert_eq!(table.rows[0].get("VolumenHA"), Some("1,50"));
        // raw values keep their quotes until normalization
        assert_eq!(table.rows[1].get("Nivel"), Some("\"N2\""));
        assert!(table.has_column("Elementos"));
    }

    #[test]
    fn short_rows_lack_trailing_columns() {
        let text = "title\nNivel\tElementos\tVolumenHA\nN1\tMuro\n";
        let table = load_report(text.as_bytes()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].get("Elementos"), Some("Muro"));
        assert_eq!(table.rows[0].get("VolumenHA"), None);
    }

    #[test]
    fn windows_1252_bytes_are_decoded() {
        let mut bytes = b"title\nNivel\tElementos\tHormigonado\nN1\tMuro\tS".to_vec();
        bytes.push(0xED); // 'í' in windows-1252
        bytes.extend_from_slice(b"\n");
        let table = load_report(&bytes).unwrap();
        assert_eq!(table.rows[0].get("Hormigonado"), Some("Sí"));
    }

    #[test]
    fn bom_and_crlf_are_tolerated() {
        let text = "\u{FEFF}title\r\nNivel\tElementos\r\nN1\tMuro\r\n";
        let table = load_report(text.as_bytes()).unwrap();
        assert_eq!(table.headers, vec!["Nivel", "Elementos"]);
        assert_eq!(table.rows[0].get("Elementos"), Some("Muro"));
    }

    #[test]
    fn missing_header_gives_empty_table() {
        assert_eq!(load_report(b"").unwrap(), RawTable::default());
        assert_eq!(load_report(b"only a title\n").unwrap(), RawTable::default());
    }

    #[test]
    fn raw_row_cleans_column_names() {
        let row = RawRow::from_pairs([(" \"Nivel\" ", "N1"), ("Elementos", "Muro")]);
        assert_eq!(row.get("Nivel"), Some("N1"));
        assert_eq!(row.len(), 2);
        assert!(!row.is_blank());
        assert!(RawRow::from_pairs([("Nivel", " \"\" ")]).is_blank());
    }
}
