//! Optional hand-off of cleaned records to an external consumer.
//!
//! The sink is fire-and-forget from the pipeline's point of view: the clean
//! archive is already on disk when [`forward`] runs, and a sink failure is
//! only logged. When no sink URL is configured every call is a no-op, so the
//! orchestrator calls it unconditionally.

use crate::error::PipelineError;
use crate::models::SinkRecord;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Something that accepts a batch of cleaned records.
pub trait ArticleSink {
    async fn submit(&self, records: &[SinkRecord]) -> Result<(), PipelineError>;
}

/// POSTs records as a JSON array to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl ArticleSink for HttpSink {
    #[instrument(level = "info", skip_all, fields(url = %self.url, records = records.len()))]
    async fn submit(&self, records: &[SinkRecord]) -> Result<(), PipelineError> {
        let t0 = Instant::now();
        self.client
            .post(&self.url)
            .json(records)
            .send()
            .await
            .map_err(|e| PipelineError::Sink(format!("{}: {e}", self.url)))?
            .error_for_status()
            .map_err(|e| PipelineError::Sink(format!("{}: {e}", self.url)))?;
        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Records delivered to sink"
        );
        Ok(())
    }
}

/// The sink chosen at startup.
#[derive(Debug, Clone)]
pub enum ConfiguredSink {
    Disabled,
    Http(HttpSink),
}

impl ConfiguredSink {
    /// Build from an optional URL; `None` disables forwarding.
    pub fn from_url(client: &reqwest::Client, url: Option<&str>) -> Result<Self, PipelineError> {
        match url {
            None => Ok(ConfiguredSink::Disabled),
            Some(url) => {
                url::Url::parse(url)
                    .map_err(|e| PipelineError::Config(format!("bad sink URL {url}: {e}")))?;
                Ok(ConfiguredSink::Http(HttpSink::new(client.clone(), url)))
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, ConfiguredSink::Disabled)
    }
}

impl ArticleSink for ConfiguredSink {
    async fn submit(&self, records: &[SinkRecord]) -> Result<(), PipelineError> {
        match self {
            ConfiguredSink::Disabled => Ok(()),
            ConfiguredSink::Http(sink) => sink.submit(records).await,
        }
    }
}

/// Submit `records` and swallow any failure after logging it.
///
/// Returns whether the sink accepted the batch.
pub async fn forward<S: ArticleSink>(sink: &S, records: &[SinkRecord]) -> bool {
    if records.is_empty() {
        return true;
    }
    match sink.submit(records).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, records = records.len(), "Sink rejected batch; archive is unaffected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl ArticleSink for RecordingSink {
        async fn submit(&self, records: &[SinkRecord]) -> Result<(), PipelineError> {
            if self.fail {
                return Err(PipelineError::Sink("unavailable".into()));
            }
            self.batches.lock().unwrap().push(records.len());
            Ok(())
        }
    }

    fn record(title: &str) -> SinkRecord {
        SinkRecord {
            title: title.to_string(),
            url: "https://example.com/a".to_string(),
            date: "20250101120000".to_string(),
            themes: String::new(),
            location_names: String::new(),
            persons: Vec::new(),
            organizations: Vec::new(),
            tone: None,
        }
    }

    #[tokio::test]
    async fn test_forward_delivers_batch() {
        let sink = RecordingSink::default();
        assert!(forward(&sink, &[record("a"), record("b")]).await);
        assert_eq!(*sink.batches.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_forward_swallows_failure() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        assert!(!forward(&sink, &[record("a")]).await);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let sink = RecordingSink::default();
        assert!(forward(&sink, &[]).await);
        assert!(sink.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configured_sink_from_url() {
        let client = reqwest::Client::new();
        let disabled = ConfiguredSink::from_url(&client, None).unwrap();
        assert!(!disabled.is_enabled());
        assert!(disabled.submit(&[record("a")]).await.is_ok());

        assert!(ConfiguredSink::from_url(&client, Some("http://localhost:8000/articles"))
            .unwrap()
            .is_enabled());
        assert!(ConfiguredSink::from_url(&client, Some("not a url")).is_err());
    }
}
