//! Uploaded bytes → ordered header/value records.
//!
//! Spreadsheets (xlsx, xls, ods) are read with calamine from the first
//! worksheet; everything else is treated as delimited text. Headers are
//! trimmed and lowercased so lookups never depend on the author's casing.
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::collections::BTreeMap;
use std::io::Cursor;
use thiserror::Error;

/// Column order of the downloadable template.
pub const TEMPLATE_HEADERS: [&str; 7] = [
    "email",
    "nombre",
    "apellido",
    "documento",
    "proveedor",
    "codigo_curso",
    "rol_en_curso",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid delimited text: {0}")]
    Csv(#[from] csv::Error),
    #[error("unreadable spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("spreadsheet has no worksheets")]
    NoWorksheet,
}

/// One data line keyed by normalised header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRow {
    fields: BTreeMap<String, String>,
}

impl ImportRow {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn is_blank(&self) -> bool {
        self.fields.values().all(|v| v.trim().is_empty())
    }
}

pub fn is_spreadsheet(bytes: &[u8], mime_type: &str, file_name: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    let name = file_name.to_ascii_lowercase();
    mime.contains("spreadsheet")
        || mime.contains("excel")
        || [".xlsx", ".xlsm", ".xls", ".ods"]
            .iter()
            .any(|ext| name.ends_with(ext))
        || bytes.starts_with(ZIP_MAGIC)
        || bytes.starts_with(OLE_MAGIC)
}

pub fn parse_rows(
    bytes: &[u8],
    mime_type: &str,
    file_name: &str,
) -> Result<Vec<ImportRow>, ParseError> {
    let rows = if is_spreadsheet(bytes, mime_type, file_name) {
        parse_spreadsheet(bytes)?
    } else {
        parse_csv(bytes)?
    };
    Ok(rows.into_iter().filter(|r| !r.is_blank()).collect())
}

fn normalise_header(h: &str) -> String {
    h.trim().to_lowercase()
}

fn sniff_delimiter(text: &[u8]) -> u8 {
    let first_line = text.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<ImportRow>, ParseError> {
    let text = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .has_headers(true)
        .flexible(true)
        .from_reader(text);

    let headers: Vec<String> = reader.headers()?.iter().map(normalise_header).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(ImportRow::from_pairs(
            headers.iter().cloned().zip(record.iter().map(str::to_string)),
        ));
    }
    Ok(rows)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Excel stores every number as a float; ids and phone numbers should not gain ".0"
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn parse_spreadsheet(bytes: &[u8]) -> Result<Vec<ImportRow>, ParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheet)??;

    let mut lines = range.rows();
    let Some(header_row) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row
        .iter()
        .map(|c| normalise_header(&cell_to_string(c)))
        .collect();

    Ok(lines
        .map(|cells| {
            ImportRow::from_pairs(
                headers
                    .iter()
                    .cloned()
                    .zip(cells.iter().map(cell_to_string)),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semicolon_csv_with_bom_and_mixed_case_headers() {
        let input = "\u{feff}Email; Nombre ;PROVEEDOR;codigo_curso\na@x.com;Ana;P1;CUR-001\n";
        let rows = parse_rows(input.as_bytes(), "text/csv", "p.csv").unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("email"), Some("a@x.com"));
        assert_eq!(rows[0].get("nombre"), Some("Ana"));
        assert_eq!(rows[0].get("proveedor"), Some("P1"));
    }

    #[test]
    fn test_comma_csv_skips_blank_lines() {
        let input = "email,nombre,proveedor,codigo_curso\n\na@x.com,Ana,P1,CUR-001\n,,,\nb@x.com,Bea,P1,CUR-001\n";
        let rows = parse_rows(input.as_bytes(), "text/csv", "p.csv").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("email"), Some("b@x.com"));
    }

    #[test]
    fn test_short_records_leave_fields_absent() {
        let input = "email,nombre,apellido\na@x.com,Ana\n";
        let rows = parse_rows(input.as_bytes(), "", "p.csv").unwrap();

        assert_eq!(rows[0].get("nombre"), Some("Ana"));
        assert_eq!(rows[0].get("apellido"), None);
    }

    #[test]
    fn test_blank_values_read_as_absent() {
        let row = ImportRow::from_pairs([("email", "   "), ("nombre", " Ana ")]);
        assert_eq!(row.get("email"), None);
        assert_eq!(row.get("nombre"), Some("Ana"));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let input = b"email,nombre\n\xff\xfe,Ana\n";
        assert!(matches!(
            parse_rows(input, "text/csv", "p.csv"),
            Err(ParseError::Csv(_))
        ));
    }

    #[test]
    fn test_garbage_spreadsheet_is_a_parse_error() {
        let err = parse_rows(b"PK\x03\x04not really a zip", "", "p.xlsx").unwrap_err();
        assert!(matches!(err, ParseError::Spreadsheet(_)));
    }

    #[test]
    fn test_spreadsheet_detection() {
        assert!(is_spreadsheet(
            b"",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "upload"
        ));
        assert!(is_spreadsheet(b"", "application/octet-stream", "Lista.XLSX"));
        assert!(is_spreadsheet(OLE_MAGIC, "", "upload"));
        assert!(!is_spreadsheet(b"email,nombre", "text/csv", "p.csv"));
    }

    #[test]
    fn test_whole_number_cells_have_no_decimal_part() {
        assert_eq!(cell_to_string(&Data::Float(12345678.0)), "12345678");
        assert_eq!(cell_to_string(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
