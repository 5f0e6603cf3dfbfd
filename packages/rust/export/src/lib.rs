//! Spreadsheet export of scrape results.
//!
//! Each export produces a single-sheet `.xlsx` workbook as an in-memory
//! buffer; [`write_export`] saves a buffer into the output directory.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use scrapedesk_shared::{ProductDetailRecord, Result, ScrapeDeskError, UrlSet};
use tracing::{debug, info};

/// File name used for the URL discovery export.
pub const URLS_FILE_NAME: &str = "product_urls.xlsx";

/// File name used for the detail extraction export.
pub const DETAILS_FILE_NAME: &str = "product_details.xlsx";

const URLS_SHEET: &str = "Product URLs";
const DETAILS_SHEET: &str = "Product Details";

const URLS_HEADER: &[&str] = &["Product URL"];
const DETAILS_HEADER: &[&str] = &["URL", "Product Name", "Price", "Currency"];

/// Render discovered product URLs as a workbook, one row per URL in order.
pub fn export_urls(urls: &UrlSet) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(URLS_SHEET).map_err(export_error)?;
    write_header(sheet, URLS_HEADER)?;

    for (row, url) in (1u32..).zip(urls.iter()) {
        sheet
            .write_string(row, 0, url.as_str())
            .map_err(export_error)?;
    }

    debug!(rows = urls.len(), "rendered product URL sheet");
    workbook.save_to_buffer().map_err(export_error)
}

/// Render product detail records as a workbook.
///
/// Prices are written as numeric cells. Absent fields leave the cell empty.
pub fn export_details(records: &[ProductDetailRecord]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(DETAILS_SHEET).map_err(export_error)?;
    write_header(sheet, DETAILS_HEADER)?;

    for (row, record) in (1u32..).zip(records) {
        sheet
            .write_string(row, 0, record.source_url.as_str())
            .map_err(export_error)?;
        if let Some(name) = &record.name {
            sheet.write_string(row, 1, name).map_err(export_error)?;
        }
        if let Some(price) = record.price {
            sheet.write_number(row, 2, price).map_err(export_error)?;
        }
        if let Some(currency) = &record.currency {
            sheet.write_string(row, 3, currency).map_err(export_error)?;
        }
    }

    debug!(rows = records.len(), "rendered product detail sheet");
    workbook.save_to_buffer().map_err(export_error)
}

/// Save an export buffer as `dir/name`, creating `dir` if needed.
pub fn write_export(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| ScrapeDeskError::io(dir, e))?;
    let path = dir.join(name);
    std::fs::write(&path, bytes).map_err(|e| ScrapeDeskError::io(&path, e))?;
    info!(path = %path.display(), bytes = bytes.len(), "export written");
    Ok(path)
}

fn write_header(sheet: &mut Worksheet, columns: &[&str]) -> Result<()> {
    let bold = Format::new().set_bold();
    for (col, title) in (0u16..).zip(columns) {
        sheet
            .write_string_with_format(0, col, *title, &bold)
            .map_err(export_error)?;
    }
    Ok(())
}

fn export_error(e: XlsxError) -> ScrapeDeskError {
    ScrapeDeskError::Export(e.to_string())
}
