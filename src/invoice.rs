//! Invoice identifiers, URLs and the paired request record.
//!
//! The report yields identifiers and URLs as two separate sequences that only
//! line up by row position. [`pair_requests`] joins them once, up front, into
//! [`InvoiceRequest`] records so nothing downstream can misalign them.

use crate::error::InvoiceMergeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sanitised invoice identifier, used as the downloaded file's base name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    /// Build an identifier from a raw cell value, replacing every `/` with `-`.
    pub fn new(raw: &str) -> Self {
        Self(sanitize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name for this invoice with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace path separators that cannot appear in a file name.
pub fn sanitize(raw: &str) -> String {
    raw.replace('/', "-")
}

/// Absolute URL of a single invoice document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceUrl(String);

impl InvoiceUrl {
    /// Decode entity-escaped ampersands and check the URL is absolute http(s).
    ///
    /// Returns `None` when the decoded text is not a valid http/https URL.
    pub fn parse(raw: &str) -> Option<Self> {
        let decoded = decode_ampersands(raw);
        let parsed = reqwest::Url::parse(&decoded).ok()?;
        match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some() => Some(Self(decoded)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `&amp;` → `&`.
pub fn decode_ampersands(raw: &str) -> String {
    raw.replace("&amp;", "&")
}

/// One invoice to retrieve: its report row position, name and source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    /// Zero-based position among the report's data rows.
    pub index: usize,
    pub id: InvoiceId,
    pub url: InvoiceUrl,
}

/// Join identifiers and URLs by position.
///
/// # Errors
/// [`InvoiceMergeError::CountMismatch`] when the sequences differ in length;
/// no partial pairing is ever returned.
pub fn pair_requests(
    ids: Vec<InvoiceId>,
    urls: Vec<InvoiceUrl>,
) -> Result<Vec<InvoiceRequest>, InvoiceMergeError> {
    if ids.len() != urls.len() {
        return Err(InvoiceMergeError::CountMismatch {
            ids: ids.len(),
            urls: urls.len(),
        });
    }

    Ok(ids
        .into_iter()
        .zip(urls)
        .enumerate()
        .map(|(index, (id, url))| InvoiceRequest { index, id, url })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_slashes() {
        assert_eq!(InvoiceId::new("CCSR/2024/0012").as_str(), "CCSR-2024-0012");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["A/B/C", "plain", "//", " x/y ", "a-b/c-d"] {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn file_name_appends_extension() {
        assert_eq!(InvoiceId::new("ID/A").file_name("pdf"), "ID-A.pdf");
    }

    #[test]
    fn url_decodes_entity_ampersand() {
        let url = InvoiceUrl::parse("http://host/files/get?type=invoice&amp;id=123").unwrap();
        assert_eq!(url.as_str(), "http://host/files/get?type=invoice&id=123");
        assert!(url.as_str().contains("&id=123"));
    }

    #[test]
    fn url_rejects_relative_and_non_http() {
        assert!(InvoiceUrl::parse("/files/get?id=1").is_none());
        assert!(InvoiceUrl::parse("ftp://host/file").is_none());
        assert!(InvoiceUrl::parse("mailto:a@b.c").is_none());
    }

    #[test]
    fn pairing_keeps_positions() {
        let ids = vec![InvoiceId::new("A"), InvoiceId::new("B")];
        let urls = vec![
            InvoiceUrl::parse("http://h/x?id=1").unwrap(),
            InvoiceUrl::parse("http://h/x?id=2").unwrap(),
        ];
        let reqs = pair_requests(ids, urls).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[1].index, 1);
        assert_eq!(reqs[1].id.as_str(), "B");
        assert!(reqs[1].url.as_str().ends_with("id=2"));
    }

    #[test]
    fn pairing_rejects_count_mismatch() {
        let ids = vec![InvoiceId::new("A"), InvoiceId::new("B")];
        let urls = vec![InvoiceUrl::parse("http://h/x?id=1").unwrap()];
        let err = pair_requests(ids, urls).unwrap_err();
        assert!(matches!(
            err,
            InvoiceMergeError::CountMismatch { ids: 2, urls: 1 }
        ));
    }
}
