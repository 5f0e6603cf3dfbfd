//! Operator input ingestion: uploaded `.csv` / `.xlsx` files and typed text.
//!
//! [`ingest`] decodes file bytes into a [`RawInput`]; the [`normalize`]
//! module turns any `RawInput` into a [`UrlSet`](scrapedesk_shared::UrlSet).
//! Decoding is all-or-nothing: either every cell comes back or an
//! [`ScrapeDeskError::Ingest`] does.

pub mod normalize;

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use scrapedesk_shared::{FileKind, Result, ScrapeDeskError};
use tracing::{debug, instrument};

pub use normalize::{
    NormalizeOptions, RawInput, normalize, normalize_cells, normalize_input, normalize_text,
};

/// UTF-8 byte order mark some spreadsheet tools prepend to CSV exports.
const UTF8_BOM: &str = "\u{feff}";

/// Resolve the upload format from the file name, rejecting anything that is
/// not `.csv` or `.xlsx`.
pub fn file_kind(path: &Path) -> Result<FileKind> {
    FileKind::from_path(path).ok_or_else(|| ScrapeDeskError::UnsupportedFile {
        path: path.to_path_buf(),
    })
}

/// Read and decode a file from disk. The extension is checked before any
/// bytes are read.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn ingest_file(path: &Path) -> Result<RawInput> {
    let kind = file_kind(path)?;
    let bytes = std::fs::read(path).map_err(|e| ScrapeDeskError::io(path, e))?;
    ingest(&bytes, kind)
}

/// Decode uploaded bytes of the given kind.
pub fn ingest(bytes: &[u8], kind: FileKind) -> Result<RawInput> {
    let input = match kind {
        FileKind::Delimited => RawInput::Text(decode_text(bytes)?),
        FileKind::Spreadsheet => RawInput::Cells(read_first_sheet(bytes)?),
    };
    debug!(%kind, bytes = bytes.len(), "ingested upload");
    Ok(input)
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        ScrapeDeskError::ingest(FileKind::Delimited, format!("file is not valid UTF-8: {e}"))
    })?;
    Ok(text.strip_prefix(UTF8_BOM).unwrap_or(text).to_string())
}

/// Flatten the first worksheet row-major into non-empty cell strings.
fn read_first_sheet(bytes: &[u8]) -> Result<Vec<String>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(corrupt_sheet)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ScrapeDeskError::ingest(FileKind::Spreadsheet, "workbook has no sheets"))?
        .map_err(corrupt_sheet)?;

    let cells = range
        .rows()
        .flat_map(|row| row.iter())
        .filter_map(cell_to_string)
        .collect();
    Ok(cells)
}

fn corrupt_sheet(e: calamine::XlsxError) -> ScrapeDeskError {
    ScrapeDeskError::ingest(FileKind::Spreadsheet, e.to_string())
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn workbook_bytes(build: impl FnOnce(&mut Workbook)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        build(&mut workbook);
        workbook.save_to_buffer().expect("xlsx buffer")
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = file_kind(Path::new("urls.txt")).unwrap_err();
        assert!(matches!(err, ScrapeDeskError::UnsupportedFile { ref path } if path == Path::new("urls.txt")));
        assert!(err.to_string().contains(".csv or .xlsx"));
        assert_eq!(file_kind(Path::new("urls.csv")).unwrap(), FileKind::Delimited);
    }

    #[test]
    fn csv_is_decoded_as_text() {
        let bytes = "\u{feff}https://a,https://b\nhttps://c\n".as_bytes();
        let input = ingest(bytes, FileKind::Delimited).expect("ingest");
        assert_eq!(
            input,
            RawInput::Text("https://a,https://b\nhttps://c\n".into())
        );
        let urls = normalize_input(&input, NormalizeOptions::default());
        assert_eq!(urls.len(), 3);
    }

    #[test]
    fn invalid_utf8_fails_atomically() {
        let err = ingest(&[0x68, 0x74, 0xff, 0xfe], FileKind::Delimited).unwrap_err();
        assert!(matches!(
            err,
            ScrapeDeskError::Ingest {
                kind: FileKind::Delimited,
                ..
            }
        ));
    }

    #[test]
    fn spreadsheet_is_flattened_row_major() {
        let bytes = workbook_bytes(|wb| {
            let ws = wb.add_worksheet();
            ws.write_string(0, 0, "Category URL").unwrap();
            ws.write_string(0, 1, "Notes").unwrap();
            ws.write_string(1, 0, "https://shop.example.com/c1").unwrap();
            ws.write_number(1, 1, 7.0).unwrap();
            ws.write_string(2, 1, "https://shop.example.com/c2").unwrap();
            ws.write_string(3, 0, "https://shop.example.com/c3").unwrap();
        });

        let input = ingest(&bytes, FileKind::Spreadsheet).expect("ingest");
        let RawInput::Cells(cells) = &input else {
            panic!("expected cells, got {input:?}");
        };
        assert_eq!(cells[0], "Category URL");
        assert!(cells.contains(&"7".to_string()));

        let urls = normalize_input(&input, NormalizeOptions::default());
        assert_eq!(
            urls.to_strings(),
            vec![
                "https://shop.example.com/c1",
                "https://shop.example.com/c2",
                "https://shop.example.com/c3"
            ]
        );
    }

    #[test]
    fn only_first_sheet_is_read() {
        let bytes = workbook_bytes(|wb| {
            wb.add_worksheet()
                .write_string(0, 0, "https://first.example.com")
                .unwrap();
            wb.add_worksheet()
                .write_string(0, 0, "https://second.example.com")
                .unwrap();
        });

        let input = ingest(&bytes, FileKind::Spreadsheet).expect("ingest");
        assert_eq!(
            input,
            RawInput::Cells(vec!["https://first.example.com".into()])
        );
    }

    #[test]
    fn corrupt_spreadsheet_names_the_kind() {
        let err = ingest(b"definitely not a zip archive", FileKind::Spreadsheet).unwrap_err();
        assert!(err.to_string().starts_with("ingest error (spreadsheet)"));
    }
}
