//! URL extraction: scan the flat-ODS rendering of the report for invoice links.
//!
//! The converter writes each hyperlinked cell on its own line, so a plain line
//! scan for a marker substring finds the links in row order without parsing
//! the XML. The first strict URL on a matching line is taken and its
//! entity-escaped ampersands are decoded.

use crate::error::InvoiceMergeError;
use crate::invoice::InvoiceUrl;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info};

// Scheme-qualified URL, stopping at whitespace, quotes or markup delimiters.
static RE_STRICT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bhttps?://[^\s"'<>]+"#).unwrap());

/// First scheme-qualified URL on `line`, as written (still entity-escaped).
pub fn find_url(line: &str) -> Option<&str> {
    RE_STRICT_URL.find(line).map(|m| m.as_str())
}

/// Scan `reader` line by line and collect every invoice URL in encounter order.
///
/// A line that contains `marker` but no well-formed URL is an error: keeping
/// it would either shift every later URL by one row or silently drop a row.
pub fn scan_urls<R: BufRead>(
    reader: R,
    marker: &str,
    source: &Path,
) -> Result<Vec<InvoiceUrl>, InvoiceMergeError> {
    let mut urls = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| InvoiceMergeError::UrlScanFailed {
            path: source.to_path_buf(),
            source: e,
        })?;
        if !line.contains(marker) {
            continue;
        }

        let url = find_url(&line)
            .and_then(InvoiceUrl::parse)
            .ok_or_else(|| InvoiceMergeError::MalformedLink {
                path: source.to_path_buf(),
                line: line_no + 1,
            })?;
        debug!("Line {}: {}", line_no + 1, url);
        urls.push(url);
    }

    Ok(urls)
}

/// Open the converted report at `path` and extract its invoice URLs.
pub fn read_urls(path: &Path, marker: &str) -> Result<Vec<InvoiceUrl>, InvoiceMergeError> {
    let file = std::fs::File::open(path).map_err(|e| InvoiceMergeError::UrlScanFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    let urls = scan_urls(std::io::BufReader::new(file), marker, path)?;
    info!("Found {} invoice URLs in {}", urls.len(), path.display());
    Ok(urls)
}
