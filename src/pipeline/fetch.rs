//! HTTP retrieval of a single invoice document.
//!
//! One GET per invoice, no retry. Redirects follow reqwest's default policy.
//! Every failure (transport, non-2xx status, timeout, body read) becomes a
//! [`DownloadError`] for that invoice only.

use crate::error::{DownloadError, InvoiceMergeError};
use crate::invoice::InvoiceUrl;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Fetches the body of one invoice URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &InvoiceUrl) -> Result<Vec<u8>, DownloadError>;
}

/// [`Fetcher`] backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout_secs`.
    pub fn new(timeout_secs: u64) -> Result<Self, InvoiceMergeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("invoice-merge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InvoiceMergeError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn map_err(&self, url: &InvoiceUrl, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            DownloadError::Transport {
                url: url.to_string(),
                detail: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &InvoiceUrl) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| self.map_err(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_err(url, e))?;
        debug!("GET {} → {} bytes", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
