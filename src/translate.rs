//! Selective, bounded-concurrency title translation.
//!
//! This module decides which titles need translating and runs those
//! translations concurrently while keeping the batch in its original order.
//!
//! # Architecture
//!
//! - [`Translator`]: the seam to any "auto-detect -> English" provider
//! - [`GoogleTranslator`]: the public Google translate endpoint over `reqwest`
//! - [`translate_batch`]: selection, fan-out, write-back
//!
//! # Failure policy
//!
//! A title whose translation fails keeps its entity-decoded original text.
//! One failure never fails the batch, and there are no retries beyond the
//! HTTP client's own timeout.

use crate::error::PipelineError;
use crate::models::{FeedKind, NormalizedArticle};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Titles on the original feed are translated when more than this share of
/// their characters lies outside ASCII.
pub const NON_ASCII_THRESHOLD: f64 = 0.2;

/// Default number of concurrent translation requests.
pub const DEFAULT_WORKERS: usize = 10;

const PROGRESS_EVERY: usize = 100;

/// Something that can translate a single piece of text into English.
pub trait Translator {
    /// Translate `text`, auto-detecting its source language.
    async fn translate(&self, text: &str) -> Result<String, PipelineError>;
}

/// Client for the public Google `translate_a/single` endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
    target: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            target: "en".to_string(),
        }
    }
}

impl Translator for GoogleTranslator {
    #[instrument(level = "debug", skip_all)]
    async fn translate(&self, text: &str) -> Result<String, PipelineError> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", self.target.as_str()),
                ("dt", "t"),
                ("q", text),
            ],
        )
        .map_err(|e| PipelineError::Config(format!("bad translate endpoint: {e}")))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::http(&self.endpoint, e))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Status {
                url: self.endpoint.clone(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp
            .text()
            .await
            .map_err(|e| PipelineError::http(&self.endpoint, e))?;
        parse_google_response(&body)
    }
}

/// Join the translated segments of a `translate_a/single` response.
///
/// The body is a nested array whose first element lists
/// `[translated, original, ...]` segments.
pub fn parse_google_response(body: &str) -> Result<String, PipelineError> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        PipelineError::Translation(format!(
            "unreadable response ({e}): {}",
            truncate_for_log(body, 120)
        ))
    })?;

    let translated: String = value
        .get(0)
        .and_then(|segments| segments.as_array())
        .into_iter()
        .flatten()
        .filter_map(|segment| segment.get(0).and_then(|s| s.as_str()))
        .collect();

    if translated.trim().is_empty() {
        return Err(PipelineError::Translation(
            "response contained no translated text".to_string(),
        ));
    }
    Ok(translated)
}

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z][A-Za-z0-9]*);").expect("entity pattern")
});

/// Replacement text for an entity body (the part between `&` and `;`).
fn resolve_entity(body: &str) -> Option<Cow<'static, str>> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(&['x', 'X'][..]) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(|c| Cow::Owned(c.to_string()));
    }
    resolve_html5_entity(body).map(Cow::Borrowed)
}

/// Decode HTML entities (`&amp;`, `&eacute;`, `&#233;`...).
///
/// Every well-formed entity is decoded on its own. A bare `&`, an unknown
/// name or an out-of-range code point is left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &Captures| match resolve_entity(&caps[1]) {
        Some(decoded) => decoded.into_owned(),
        None => caps[0].to_string(),
    })
}

/// Share of characters whose code point is above 127.
pub fn non_ascii_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let non_ascii = text.chars().filter(|c| (*c as u32) > 127).count();
    non_ascii as f64 / total as f64
}

/// Decide whether a title should be translated.
///
/// Everything on the translation feed is. On the original feed, a title is
/// translated only when its entity-decoded form is mostly non-ASCII, which
/// catches foreign articles mistagged as English.
pub fn needs_translation(title: &str, feed: FeedKind) -> bool {
    match feed {
        FeedKind::Translation => true,
        FeedKind::Original => non_ascii_ratio(&decode_entities(title)) > NON_ASCII_THRESHOLD,
    }
}

/// Outcome counters for one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TranslationReport {
    pub selected: usize,
    pub translated: usize,
    pub failed: usize,
}

/// Translate the titles of `articles` that need it, in place and in order.
///
/// Selected titles are entity-decoded, then translated with at most
/// `workers` requests in flight. Results are written back to the article
/// they came from regardless of completion order. A failed title falls back
/// to its decoded original.
#[instrument(level = "info", skip_all, fields(%feed, articles = articles.len(), workers = workers))]
pub async fn translate_batch<T: Translator>(
    articles: &mut [NormalizedArticle],
    feed: FeedKind,
    translator: &T,
    workers: usize,
) -> TranslationReport {
    let jobs: Vec<(usize, String)> = articles
        .iter()
        .enumerate()
        .filter_map(|(idx, article)| {
            let title = article.title.as_deref()?;
            needs_translation(title, feed).then(|| (idx, decode_entities(title).into_owned()))
        })
        .collect();

    let mut report = TranslationReport {
        selected: jobs.len(),
        ..Default::default()
    };
    if jobs.is_empty() {
        debug!("No titles selected for translation");
        return report;
    }

    let t0 = Instant::now();
    let total = jobs.len();
    info!(selected = total, "Translating titles");

    let mut completed = stream::iter(jobs)
        .map(|(idx, original)| async move {
            let result = translator.translate(&original).await;
            (idx, original, result)
        })
        .buffer_unordered(workers.max(1));

    let mut done = 0usize;
    while let Some((idx, original, result)) = completed.next().await {
        let title = match result {
            Ok(translated) => {
                report.translated += 1;
                translated
            }
            Err(e) => {
                report.failed += 1;
                debug!(
                    index = idx,
                    error = %e,
                    title = %truncate_for_log(&original, 80),
                    "Translation failed; keeping original title"
                );
                original
            }
        };
        articles[idx].title = Some(title);

        done += 1;
        if done % PROGRESS_EVERY == 0 || done == total {
            info!(done, total, "Translation progress");
        }
    }

    if report.failed > 0 {
        warn!(
            failed = report.failed,
            total, "Some titles could not be translated"
        );
    }
    info!(
        translated = report.translated,
        failed = report.failed,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Translation batch complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Uppercases text after a delay that shrinks with the input length, so
    /// completion order differs from submission order. Fails on "FAIL".
    #[derive(Default)]
    struct FakeTranslator {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Translator for FakeTranslator {
        async fn translate(&self, text: &str) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = 40u64.saturating_sub(text.chars().count() as u64 * 2);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if text.contains("FAIL") {
                Err(PipelineError::Translation("provider error".into()))
            } else {
                Ok(format!("EN:{}", text.to_uppercase()))
            }
        }
    }

    fn article(title: &str) -> NormalizedArticle {
        NormalizedArticle {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_non_ascii_ratio() {
        assert_eq!(non_ascii_ratio(""), 0.0);
        assert_eq!(non_ascii_ratio("abcd"), 0.0);
        assert!((non_ascii_ratio("ab日本") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_needs_translation_rules() {
        assert!(needs_translation("Plain English", FeedKind::Translation));
        assert!(!needs_translation("Plain English", FeedKind::Original));
        assert!(needs_translation("Путин заявил о переговорах", FeedKind::Original));
        // One accented letter in a long title stays below the threshold.
        assert!(!needs_translation("Café owners protest new rules", FeedKind::Original));
    }

    #[test]
    fn test_entities_are_decoded_before_measuring() {
        // Raw text is pure ASCII, decoded text is all Cyrillic.
        let encoded = "&#1055;&#1088;&#1080;&#1074;&#1077;&#1090;";
        assert_eq!(non_ascii_ratio(encoded), 0.0);
        assert!(needs_translation(encoded, FeedKind::Original));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("caf&eacute;"), "café");
        assert_eq!(decode_entities("no entities"), "no entities");
        assert_eq!(decode_entities("broken & text"), "broken & text");
        assert_eq!(decode_entities("caf&#xE9; &#X41;"), "café A");
    }

    #[test]
    fn test_bare_ampersand_does_not_block_other_entities() {
        assert_eq!(decode_entities("Tom & Jerry&#39;s"), "Tom & Jerry's");
        assert_eq!(decode_entities("AT&T &amp; Q&A"), "AT&T & Q&A");
        assert_eq!(decode_entities("&bogus; &#1114112; &eacute;"), "&bogus; &#1114112; é");

        let title = "&#1055;&#1088;&#1080;&#1074;&#1077;&#1090; & co";
        assert_eq!(decode_entities(title), "Привет & co");
        assert!(needs_translation(title, FeedKind::Original));
    }

    #[test]
    fn test_parse_google_response() {
        let body = r#"[[["Hello ","Hola ",null,null,10],["world","mundo",null,null,10]],null,"es"]"#;
        assert_eq!(parse_google_response(body).unwrap(), "Hello world");

        assert!(parse_google_response("<html>").is_err());
        assert!(parse_google_response("[[]]").is_err());
    }

    #[tokio::test]
    async fn test_one_failure_keeps_original_and_preserves_order() {
        let mut articles = vec![
            article("uno"),
            article("dos &amp; FAIL"),
            article("a much longer third title"),
            article("cuatro"),
        ];
        let translator = FakeTranslator::default();

        let report = translate_batch(&mut articles, FeedKind::Translation, &translator, 3).await;

        assert_eq!(report.selected, 4);
        assert_eq!(report.translated, 3);
        assert_eq!(report.failed, 1);
        let titles: Vec<_> = articles.iter().map(|a| a.title.clone().unwrap()).collect();
        assert_eq!(
            titles,
            vec![
                "EN:UNO",
                "dos & FAIL",
                "EN:A MUCH LONGER THIRD TITLE",
                "EN:CUATRO",
            ]
        );
    }

    #[tokio::test]
    async fn test_original_feed_only_translates_foreign_titles() {
        let mut articles = vec![
            article("Markets rally on rate cut hopes"),
            article("Привет мир"),
            NormalizedArticle::default(),
        ];
        let translator = FakeTranslator::default();

        let report = translate_batch(&mut articles, FeedKind::Original, &translator, 10).await;

        assert_eq!(report.selected, 1);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(articles[0].title.as_deref(), Some("Markets rally on rate cut hopes"));
        assert_eq!(articles[1].title.as_deref(), Some("EN:ПРИВЕТ МИР"));
        assert_eq!(articles[2].title, None);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut articles: Vec<_> = (0..12).map(|i| article(&format!("t{i}"))).collect();
        let translator = FakeTranslator::default();

        translate_batch(&mut articles, FeedKind::Translation, &translator, 4).await;

        assert_eq!(translator.calls.load(Ordering::SeqCst), 12);
        assert!(translator.max_in_flight.load(Ordering::SeqCst) <= 4);
    }
}
