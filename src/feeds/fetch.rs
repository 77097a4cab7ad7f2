//! Download a GKG archive and decode its entry into text lines.
//!
//! GKG files are zip containers with exactly one tab-separated entry. The
//! whole download is held in memory; the entry is read line by line.

use super::FeedTransport;
use crate::config::LineEncoding;
use crate::error::PipelineError;
use std::borrow::Cow;
use std::io::{BufRead, BufReader, Cursor};
use std::time::Instant;
use tracing::{info, instrument, warn};
use zip::ZipArchive;

/// Decode one line of bytes.
///
/// Latin-1 maps every byte to a character and cannot fail. UTF-8 replaces
/// invalid sequences with U+FFFD instead of dropping the line.
pub fn decode_line(bytes: &[u8], encoding: LineEncoding) -> Cow<'_, str> {
    match encoding {
        LineEncoding::Latin1 => encoding_rs::mem::decode_latin1(bytes),
        LineEncoding::Utf8 => String::from_utf8_lossy(bytes),
    }
}

/// Open an in-memory zip and decode the lines of its first entry.
///
/// Lines keep their on-disk order; empty lines are skipped. A container with
/// more than one entry is read anyway, first entry only, with a warning.
pub fn decode_archive_lines(
    bytes: &[u8],
    url: &str,
    encoding: LineEncoding,
) -> Result<Vec<String>, PipelineError> {
    let zip_err = |source: zip::result::ZipError| PipelineError::Zip {
        url: url.to_string(),
        source,
    };

    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_err)?;
    if archive.len() == 0 {
        return Err(PipelineError::EmptyArchive {
            url: url.to_string(),
        });
    }
    if archive.len() > 1 {
        warn!(entries = archive.len(), %url, "Archive has more than one entry; reading the first");
    }

    let entry = archive.by_index(0).map_err(zip_err)?;
    let entry_name = entry.name().to_string();

    let mut lines = Vec::new();
    for raw in BufReader::new(entry).split(b'\n') {
        let raw = raw.map_err(|e| zip_err(e.into()))?;
        if raw.is_empty() {
            continue;
        }
        lines.push(decode_line(&raw, encoding).into_owned());
    }

    info!(entry = %entry_name, lines = lines.len(), "Decoded archive entry");
    Ok(lines)
}

/// Download `url` and return the decoded lines of its single entry.
#[instrument(level = "info", skip(transport, encoding))]
pub async fn fetch_lines<F: FeedTransport>(
    transport: &F,
    url: &str,
    encoding: LineEncoding,
) -> Result<Vec<String>, PipelineError> {
    let t0 = Instant::now();
    let bytes = transport.get_bytes(url).await?;
    info!(
        bytes = bytes.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Downloaded GKG archive"
    );
    decode_archive_lines(&bytes, url, encoding)
}

/// Build an in-memory zip from `(name, content)` entries.
#[cfg(test)]
pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}
