//! GKG feed discovery and download.
//!
//! Each GKG stream publishes a master file list: one line per published file,
//! whitespace-separated as `size hash url`. The newest file is near the bottom.
//! This module follows the same two-phase pattern for every feed:
//!
//! 1. **Discovery**: [`latest_file_url`] reads the master list and returns the
//!    bottom-most GKG archive URL
//! 2. **Fetching**: [`fetch::fetch_lines`] downloads that archive and decodes
//!    its single entry into lines
//!
//! Network access goes through [`FeedTransport`] so the orchestrator can be
//! exercised against in-memory feeds.

pub mod fetch;

use crate::error::PipelineError;
use chrono::{NaiveDateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Substring identifying a GKG archive in a master list URL.
pub const GKG_ARCHIVE_MARKER: &str = "gkg.csv.zip";

/// Minimal HTTP surface the pipeline needs.
pub trait FeedTransport {
    /// GET `url` and return the body as text.
    async fn get_text(&self, url: &str) -> Result<String, PipelineError>;

    /// GET `url` and return the raw body.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError>;
}

/// [`FeedTransport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, PipelineError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::http(url, e))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }
}

impl FeedTransport for HttpFeedClient {
    async fn get_text(&self, url: &str) -> Result<String, PipelineError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| PipelineError::http(url, e))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| PipelineError::http(url, e))?;
        Ok(bytes.to_vec())
    }
}

/// Build the shared HTTP client used for every request.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {e}")))
}

/// Select the bottom-most GKG archive URL from master list text.
///
/// Lines are scanned from the end; the first one with at least three tokens
/// whose third token contains [`GKG_ARCHIVE_MARKER`] wins.
pub fn select_latest_gkg_url(master_list: &str) -> Option<&str> {
    master_list
        .lines()
        .rev()
        .filter_map(|line| line.split_whitespace().nth(2))
        .find(|url| url.contains(GKG_ARCHIVE_MARKER))
}

/// Resolve the latest GKG file URL of a feed.
///
/// Any fetch failure is logged and reported as `None`: the caller treats it
/// as "no update this tick".
#[instrument(level = "info", skip(transport))]
pub async fn latest_file_url<F: FeedTransport>(transport: &F, master_url: &str) -> Option<String> {
    let text = match transport.get_text(master_url).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to fetch master list");
            return None;
        }
    };

    match select_latest_gkg_url(&text) {
        Some(url) => {
            debug!(%url, "Resolved latest GKG file");
            Some(url.to_string())
        }
        None => {
            info!(lines = text.lines().count(), "Master list has no GKG archive entry");
            None
        }
    }
}

/// Publication time encoded in a GKG file name, e.g.
/// `.../20250101120000.translation.gkg.csv.zip`.
pub fn file_timestamp(url: &str) -> Option<NaiveDateTime> {
    let name = url.rsplit('/').next()?;
    let stamp = name.get(..14)?;
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S").ok()
}

/// Seconds between a file's publication and now, when the name carries a time.
pub fn file_lag_secs(url: &str) -> Option<i64> {
    file_timestamp(url).map(|ts| (Utc::now().naive_utc() - ts).num_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticTransport {
        pages: HashMap<String, String>,
    }

    impl FeedTransport for StaticTransport {
        async fn get_text(&self, url: &str) -> Result<String, PipelineError> {
            self.pages.get(url).cloned().ok_or(PipelineError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
            self.get_text(url).await.map(String::into_bytes)
        }
    }

    const MASTER: &str = "\
150383 297a16b493de7cf6ca809a7cc31d0b93 http://data.gdeltproject.org/gdeltv2/20250101114500.export.CSV.zip
318084 bb27f78ba45f69a17ea6ed7755e9f8ff http://data.gdeltproject.org/gdeltv2/20250101114500.gkg.csv.zip
10768507 ea8dde0beb0ba98810a92db068c0ce99 http://data.gdeltproject.org/gdeltv2/20250101120000.gkg.csv.zip
149211 2a91041d7e72b0fc6a629e2ff867b240 http://data.gdeltproject.org/gdeltv2/20250101120000.mentions.CSV.zip
";

    #[test]
    fn test_select_latest_returns_bottom_most_gkg_line() {
        assert_eq!(
            select_latest_gkg_url(MASTER),
            Some("http://data.gdeltproject.org/gdeltv2/20250101120000.gkg.csv.zip")
        );
    }

    #[test]
    fn test_select_latest_none_without_gkg_line() {
        let text = "1 a http://example.com/20250101120000.export.CSV.zip\nshort line\n\n";
        assert_eq!(select_latest_gkg_url(text), None);
        assert_eq!(select_latest_gkg_url(""), None);
    }

    #[test]
    fn test_marker_must_be_in_third_token() {
        let text = "gkg.csv.zip gkg.csv.zip http://example.com/x.zip";
        assert_eq!(select_latest_gkg_url(text), None);
    }

    #[test]
    fn test_file_timestamp() {
        let ts = file_timestamp("http://data.gdeltproject.org/gdeltv2/20250101120000.translation.gkg.csv.zip")
            .unwrap();
        assert_eq!(ts.to_string(), "2025-01-01 12:00:00");
        assert_eq!(file_timestamp("http://example.com/latest.zip"), None);
    }

    #[tokio::test]
    async fn test_latest_file_url_from_transport() {
        let transport = StaticTransport {
            pages: HashMap::from([("http://m/list.txt".to_string(), MASTER.to_string())]),
        };
        assert_eq!(
            latest_file_url(&transport, "http://m/list.txt").await.as_deref(),
            Some("http://data.gdeltproject.org/gdeltv2/20250101120000.gkg.csv.zip")
        );
    }

    #[tokio::test]
    async fn test_latest_file_url_network_failure_is_none() {
        let transport = StaticTransport {
            pages: HashMap::new(),
        };
        assert_eq!(latest_file_url(&transport, "http://m/missing.txt").await, None);
    }
}
