use super::parser::TEMPLATE_HEADERS;
use rust_xlsxwriter::{Format, Workbook, XlsxError};

pub const TEMPLATE_FILE_NAME: &str = "plantilla_participantes.xlsx";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SAMPLE_ROW: [&str; 7] = [
    "ana.perez@example.com",
    "Ana",
    "Pérez",
    "12345678A",
    "Formación Norte",
    "CUR-001",
    "alumno",
];

/// Workbook with the header row and one sample participant.
pub fn build_template() -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("participantes")?;
    for (col, (header, sample)) in TEMPLATE_HEADERS.iter().zip(SAMPLE_ROW).enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, *header, &bold)?;
        sheet.write_string(1, col, sample)?;
        sheet.set_column_width(col, 22)?;
    }

    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto_from_rs, Reader};
    use std::io::Cursor;

    #[test]
    fn test_template_headers_match_importer() {
        let bytes = build_template().unwrap();
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();

        assert_eq!(workbook.sheet_names(), vec!["participantes".to_string()]);

        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        let header: Vec<String> = range.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(header, TEMPLATE_HEADERS);
    }

    #[test]
    fn test_template_sample_row_imports_cleanly() {
        let bytes = build_template().unwrap();
        let rows = crate::import::parser::parse_rows(&bytes, XLSX_MIME, TEMPLATE_FILE_NAME).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("codigo_curso"), Some("CUR-001"));
        assert!(crate::import::resolver::missing_fields(&rows[0]).is_empty());
    }
}
