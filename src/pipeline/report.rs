//! Identifier extraction: spreadsheet rows → ordered invoice identifiers.
//!
//! Reading cells is delegated to a [`ReportReader`] so the extraction rules
//! (skip header rows, skip empty identifier cells, sanitise) stay independent
//! of the spreadsheet format. [`CalamineReader`] reads `.xls`/`.xlsx`/`.ods`.

use crate::config::ReportLayout;
use crate::error::InvoiceMergeError;
use crate::invoice::InvoiceId;
use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use tracing::{debug, info};

/// Reads the first sheet of a spreadsheet as rows of displayed cell text.
///
/// Row `i` of the result must be row `i` of the sheet (counting from the
/// sheet's first row, not from the first used row), so that header skipping
/// and column addressing are absolute.
pub trait ReportReader: Send + Sync {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<String>>, InvoiceMergeError>;
}

/// [`ReportReader`] backed by calamine.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineReader;

impl ReportReader for CalamineReader {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<String>>, InvoiceMergeError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| InvoiceMergeError::ReportUnreadable {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| InvoiceMergeError::NoSheet {
                path: path.to_path_buf(),
            })?
            .map_err(|e| InvoiceMergeError::ReportUnreadable {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let (Some((start_row, start_col)), Some((end_row, _))) = (range.start(), range.end())
        else {
            return Ok(Vec::new());
        };

        // Pad leading empty rows/columns so positions stay absolute.
        let mut rows = vec![Vec::new(); start_row as usize];
        for row in range.rows() {
            let mut cells = vec![String::new(); start_col as usize];
            cells.extend(row.iter().map(|cell| cell.to_string()));
            rows.push(cells);
        }
        debug!(
            "Read {} rows (used range ends at row {}) from {}",
            rows.len(),
            end_row,
            path.display()
        );

        Ok(rows)
    }
}

/// Apply the layout rules to already-read rows.
///
/// Rows before `layout.header_rows` are metadata. Rows whose identifier cell
/// is missing or blank carry no invoice and are skipped. Order is preserved.
pub fn extract_identifiers(rows: &[Vec<String>], layout: &ReportLayout) -> Vec<InvoiceId> {
    rows.iter()
        .skip(layout.header_rows)
        .filter_map(|row| row.get(layout.id_column))
        .filter(|cell| !cell.trim().is_empty())
        .map(|cell| InvoiceId::new(cell))
        .collect()
}

/// Read the report at `path` and extract its invoice identifiers.
pub fn read_identifiers(
    reader: &dyn ReportReader,
    path: &Path,
    layout: &ReportLayout,
) -> Result<Vec<InvoiceId>, InvoiceMergeError> {
    let rows = reader.read_rows(path)?;
    let ids = extract_identifiers(&rows, layout);
    info!("Found {} invoice identifiers in {}", ids.len(), path.display());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> Vec<String> {
        let mut r = vec![String::new(); 8];
        r.push(id.to_string());
        r
    }

    fn header() -> Vec<String> {
        row("Numero documento")
    }

    #[test]
    fn skips_header_rows() {
        let rows = vec![header(), header(), header(), header(), row("ID-A"), row("ID-B")];
        let ids = extract_identifiers(&rows, &ReportLayout::default());
        let ids: Vec<&str> = ids.iter().map(InvoiceId::as_str).collect();
        assert_eq!(ids, vec!["ID-A", "ID-B"]);
    }

    #[test]
    fn skips_blank_and_short_rows() {
        let rows = vec![
            header(),
            header(),
            header(),
            header(),
            row("CCSR/1"),
            row(""),
            row("   "),
            vec!["only".to_string(), "two".to_string()],
            row("CCSR/2"),
        ];
        let ids = extract_identifiers(&rows, &ReportLayout::default());
        let ids: Vec<&str> = ids.iter().map(InvoiceId::as_str).collect();
        assert_eq!(ids, vec!["CCSR-1", "CCSR-2"]);
    }

    #[test]
    fn custom_layout() {
        let rows = vec![
            vec!["title".to_string()],
            vec!["A/1".to_string()],
            vec!["B/2".to_string()],
        ];
        let layout = ReportLayout {
            header_rows: 1,
            id_column: 0,
        };
        let ids = extract_identifiers(&rows, &layout);
        assert_eq!(ids, vec![InvoiceId::new("A-1"), InvoiceId::new("B-2")]);
    }

    #[test]
    fn fewer_rows_than_header_yields_nothing() {
        let rows = vec![row("x"), row("y")];
        assert!(extract_identifiers(&rows, &ReportLayout::default()).is_empty());
    }

    #[test]
    fn unreadable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xls");
        std::fs::write(&path, b"definitely not a spreadsheet").unwrap();

        let err = CalamineReader.read_rows(&path).unwrap_err();
        assert!(matches!(err, InvoiceMergeError::ReportUnreadable { .. }));
    }
}
