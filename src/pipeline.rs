//! The polling loop that ties every stage together.
//!
//! One [`Pipeline`] owns both feeds and walks them sequentially on every
//! tick, translation feed first:
//!
//! 1. resolve the newest file URL from the feed's master list
//! 2. skip it if it is the URL processed last time
//! 3. download, parse, normalize and translate it
//! 4. append to the raw archive, then the clean archive
//! 5. hand the clean records to the sink
//!
//! A feed's `last_seen` only moves after step 4 succeeds. Any error aborts the
//! current file alone; the URL is retried on the next tick.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::feeds::fetch::fetch_lines;
use crate::feeds::{FeedTransport, file_lag_secs, file_timestamp, latest_file_url};
use crate::models::{ArchiveVariant, FeedKind, FeedSource, NormalizedArticle, SinkRecord};
use crate::normalize::normalize;
use crate::outputs::archive;
use crate::outputs::sink::{self, ArticleSink};
use crate::parser::parse_lines;
use crate::translate::{TranslationReport, Translator, translate_batch};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Counters for one processed file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub rows: usize,
    pub translation: TranslationReport,
    pub sink_accepted: bool,
}

/// What happened during one tick across both feeds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Files fully processed this tick.
    pub processed: usize,
    /// Files whose processing failed and will be retried.
    pub failed: usize,
    /// Feeds whose master list yielded a URL.
    pub resolved: usize,
}

impl TickOutcome {
    pub fn is_idle(&self) -> bool {
        self.processed == 0 && self.failed == 0
    }
}

pub struct Pipeline<F, T, S> {
    config: PipelineConfig,
    transport: F,
    translator: T,
    sink: S,
    feeds: [FeedSource; 2],
}

impl<F, T, S> Pipeline<F, T, S>
where
    F: FeedTransport,
    T: Translator,
    S: ArticleSink,
{
    pub fn new(config: PipelineConfig, transport: F, translator: T, sink: S) -> Self {
        let feeds = [
            FeedSource::new(FeedKind::Translation, config.translation_master_url.clone()),
            FeedSource::new(FeedKind::Original, config.original_master_url.clone()),
        ];
        Self {
            config,
            transport,
            translator,
            sink,
            feeds,
        }
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.feeds
    }

    /// Poll both feeds once and process whatever is new.
    #[instrument(level = "info", skip_all)]
    pub async fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for idx in 0..self.feeds.len() {
            let kind = self.feeds[idx].kind;
            let Some(url) = latest_file_url(&self.transport, &self.feeds[idx].master_url).await
            else {
                continue;
            };
            outcome.resolved += 1;

            if !self.feeds[idx].is_new(&url) {
                debug!(feed = %kind, %url, "Latest file already processed");
                continue;
            }

            info!(
                feed = %kind,
                %url,
                file_time = ?file_timestamp(&url),
                lag_secs = ?file_lag_secs(&url),
                "New update detected"
            );

            match self.process_file(kind, &url).await {
                Ok(_) => {
                    self.feeds[idx].last_seen = Some(url);
                    outcome.processed += 1;
                }
                Err(e) => {
                    error!(
                        feed = %kind,
                        %url,
                        error = %e,
                        transient = e.is_transient(),
                        "Skipping file; it will be retried next tick"
                    );
                    outcome.failed += 1;
                }
            }
        }

        if outcome.resolved == 0 {
            info!("Waiting for updates");
        }
        outcome
    }

    /// Run one file through every stage.
    #[instrument(level = "info", skip(self))]
    pub async fn process_file(&self, kind: FeedKind, url: &str) -> Result<FileReport, PipelineError> {
        let t0 = Instant::now();
        let extract = &self.config.extract;

        let lines = fetch_lines(&self.transport, url, extract.line_encoding).await?;
        if lines.is_empty() {
            info!("File holds no records");
            return Ok(FileReport {
                sink_accepted: true,
                ..Default::default()
            });
        }

        let (records, stats) = parse_lines(&lines, extract);
        drop(lines);
        if stats.missing_title > 0 || stats.missing_locations > 0 {
            debug!(?stats, "Some lines lacked optional fields");
        }

        let (raw, mut clean): (Vec<NormalizedArticle>, Vec<NormalizedArticle>) =
            records.iter().map(normalize).unzip();

        let translation = if self.config.translate {
            translate_batch(&mut clean, kind, &self.translator, self.config.translation_workers).await
        } else {
            TranslationReport::default()
        };

        // A layout mismatch on either archive aborts before anything is written.
        archive::check_header(&self.config.raw_archive_path).await?;
        archive::check_header(&self.config.archive_path).await?;

        archive::append(&self.config.raw_archive_path, &raw, ArchiveVariant::Raw).await?;
        archive::append(&self.config.archive_path, &clean, ArchiveVariant::Clean).await?;

        let sink_records: Vec<SinkRecord> = clean.iter().map(SinkRecord::from).collect();
        let sink_accepted = sink::forward(&self.sink, &sink_records).await;

        let report = FileReport {
            rows: clean.len(),
            translation,
            sink_accepted,
        };
        info!(
            rows = report.rows,
            translated = report.translation.translated,
            failed_translations = report.translation.failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "File processed"
        );
        Ok(report)
    }

    /// Tick forever, sleeping `poll_interval` between ticks.
    ///
    /// Returns once `shutdown` flips to `true` (or its sender goes away). A
    /// file being processed when the signal arrives is finished first.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            workers = self.config.translation_workers,
            translate = self.config.translate,
            "Pipeline started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let outcome = self.tick().await;
            if !outcome.is_idle() {
                info!(
                    processed = outcome.processed,
                    failed = outcome.failed,
                    "Tick complete"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed");
                    }
                    break;
                }
            }
        }
        info!("Pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractConfig;
    use crate::feeds::fetch::zip_bytes;
    use crate::parser::fixture;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const ORIGINAL_MASTER: &str = "http://m/masterfilelist.txt";
    const TRANSLATION_MASTER: &str = "http://m/masterfilelist-translation.txt";
    const ORIGINAL_FILE: &str = "http://d/20250101120000.gkg.csv.zip";
    const TRANSLATION_FILE: &str = "http://d/20250101120000.translation.gkg.csv.zip";

    #[derive(Default)]
    struct MemoryTransport {
        pages: HashMap<String, Vec<u8>>,
        downloads: AtomicUsize,
    }

    impl MemoryTransport {
        fn with(mut self, url: &str, body: Vec<u8>) -> Self {
            self.pages.insert(url.to_string(), body);
            self
        }

        fn body(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
            self.pages.get(url).cloned().ok_or(PipelineError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    impl FeedTransport for MemoryTransport {
        async fn get_text(&self, url: &str) -> Result<String, PipelineError> {
            Ok(String::from_utf8_lossy(&self.body(url)?).into_owned())
        }

        async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.body(url)
        }
    }

    struct PrefixTranslator;

    impl Translator for PrefixTranslator {
        async fn translate(&self, text: &str) -> Result<String, PipelineError> {
            Ok(format!("EN: {text}"))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        titles: Mutex<Vec<String>>,
    }

    impl ArticleSink for RecordingSink {
        async fn submit(&self, records: &[SinkRecord]) -> Result<(), PipelineError> {
            let mut titles = self.titles.lock().unwrap();
            titles.extend(records.iter().map(|r| r.title.clone()));
            Ok(())
        }
    }

    fn master_list(file_url: &str) -> Vec<u8> {
        format!(
            "100 aaa http://d/20250101114500.export.CSV.zip\n\
             200 bbb {file_url}\n\
             300 ccc http://d/20250101120000.mentions.CSV.zip\n"
        )
        .into_bytes()
    }

    fn gkg_zip(lines: &[String]) -> Vec<u8> {
        let content = lines.join("\n");
        zip_bytes(&[("20250101120000.gkg.csv", content.as_bytes())])
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            original_master_url: ORIGINAL_MASTER.to_string(),
            translation_master_url: TRANSLATION_MASTER.to_string(),
            archive_path: dir.join("news.csv"),
            raw_archive_path: dir.join("news_native.csv"),
            poll_interval: Duration::from_secs(3600),
            translation_workers: 4,
            translate: true,
            extract: ExtractConfig::default(),
        }
    }

    fn both_feeds() -> MemoryTransport {
        MemoryTransport::default()
            .with(ORIGINAL_MASTER, master_list(ORIGINAL_FILE))
            .with(TRANSLATION_MASTER, master_list(TRANSLATION_FILE))
            .with(ORIGINAL_FILE, gkg_zip(&[fixture::line()]))
            .with(
                TRANSLATION_FILE,
                gkg_zip(&[
                    fixture::line_with_title("Macron parle a la nation"),
                    fixture::line_with_title("Le budget est adopte"),
                ]),
            )
    }

    fn data_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_tick_processes_both_feeds_translation_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            both_feeds(),
            PrefixTranslator,
            RecordingSink::default(),
        );

        let outcome = pipeline.tick().await;
        assert_eq!(
            outcome,
            TickOutcome {
                processed: 2,
                failed: 0,
                resolved: 2
            }
        );
        assert_eq!(pipeline.feeds()[0].last_seen.as_deref(), Some(TRANSLATION_FILE));
        assert_eq!(pipeline.feeds()[1].last_seen.as_deref(), Some(ORIGINAL_FILE));

        let raw = data_lines(&dir.path().join("news_native.csv"));
        let clean = data_lines(&dir.path().join("news.csv"));
        assert_eq!(raw.len(), 3);
        assert_eq!(clean.len(), 3);
        assert!(raw[0].contains(",Macron parle a la nation,"));
        assert!(raw[0].contains("TAX_FNCACT_PRESIDENT:2"));
        assert!(clean[0].contains(",EN: Macron parle a la nation,"));
        assert!(clean[0].contains("President;Public Sector Management;Forests Rivers Oceans"));
        // English title on the original feed is left alone.
        assert!(clean[2].contains(&format!(",{},", fixture::TITLE)));

        let titles = pipeline.sink.titles.lock().unwrap().clone();
        assert_eq!(
            titles,
            vec![
                "EN: Macron parle a la nation".to_string(),
                "EN: Le budget est adopte".to_string(),
                fixture::TITLE.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_same_url_is_not_processed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            both_feeds(),
            PrefixTranslator,
            RecordingSink::default(),
        );

        pipeline.tick().await;
        let second = pipeline.tick().await;

        assert!(second.is_idle());
        assert_eq!(second.resolved, 2);
        assert_eq!(pipeline.transport.downloads.load(Ordering::SeqCst), 2);
        assert_eq!(data_lines(&dir.path().join("news.csv")).len(), 3);
    }

    #[tokio::test]
    async fn test_bad_archive_keeps_last_seen() {
        let dir = tempfile::tempdir().unwrap();
        let transport = both_feeds().with(TRANSLATION_FILE, b"<html>oops</html>".to_vec());
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            transport,
            PrefixTranslator,
            RecordingSink::default(),
        );

        let outcome = pipeline.tick().await;
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.processed, 1);
        assert_eq!(pipeline.feeds()[0].last_seen, None);
        assert_eq!(pipeline.feeds()[1].last_seen.as_deref(), Some(ORIGINAL_FILE));

        // The failed URL is attempted again on the next tick.
        let retry = pipeline.tick().await;
        assert_eq!(retry.failed, 1);
        assert_eq!(pipeline.transport.downloads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_foreign_clean_header_leaves_raw_archive_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let clean_path = dir.path().join("news.csv");
        let raw_path = dir.path().join("news_native.csv");
        std::fs::write(&clean_path, "date,title\n").unwrap();

        let transport = MemoryTransport::default()
            .with(ORIGINAL_MASTER, master_list(ORIGINAL_FILE))
            .with(ORIGINAL_FILE, gkg_zip(&[fixture::line()]));
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            transport,
            PrefixTranslator,
            RecordingSink::default(),
        );

        for _ in 0..3 {
            let outcome = pipeline.tick().await;
            assert_eq!(outcome.failed, 1);
        }

        assert_eq!(pipeline.feeds()[1].last_seen, None);
        assert!(!raw_path.exists());
        assert_eq!(std::fs::read_to_string(&clean_path).unwrap(), "date,title\n");
        assert!(pipeline.sink.titles.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_master_lists_wait() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            MemoryTransport::default(),
            PrefixTranslator,
            RecordingSink::default(),
        );

        let outcome = pipeline.tick().await;
        assert_eq!(outcome, TickOutcome::default());
        assert!(!dir.path().join("news.csv").exists());
    }

    #[tokio::test]
    async fn test_empty_file_counts_as_processed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MemoryTransport::default()
            .with(ORIGINAL_MASTER, master_list(ORIGINAL_FILE))
            .with(ORIGINAL_FILE, gkg_zip(&[]));
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            transport,
            PrefixTranslator,
            RecordingSink::default(),
        );

        let outcome = pipeline.tick().await;
        assert_eq!(outcome.processed, 1);
        assert_eq!(pipeline.feeds()[1].last_seen.as_deref(), Some(ORIGINAL_FILE));
        assert!(!dir.path().join("news.csv").exists());
    }

    #[tokio::test]
    async fn test_no_translate_keeps_titles() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.translate = false;
        let mut pipeline = Pipeline::new(cfg, both_feeds(), PrefixTranslator, RecordingSink::default());

        pipeline.tick().await;
        let clean = data_lines(&dir.path().join("news.csv"));
        assert!(clean[0].contains(",Macron parle a la nation,"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_during_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = Pipeline::new(
            config(dir.path()),
            both_feeds(),
            PrefixTranslator,
            RecordingSink::default(),
        );
        let (tx, rx) = watch::channel(false);

        let stop = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        };
        tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(pipeline.run(rx), stop)
        })
        .await
        .unwrap();

        assert_eq!(pipeline.feeds()[0].last_seen.as_deref(), Some(TRANSLATION_FILE));
    }
}
