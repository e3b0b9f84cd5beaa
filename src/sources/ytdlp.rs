//! yt-dlp subprocess extractor.
//!
//! Extraction is a blocking, network-bound, possibly multi-second operation,
//! so the subprocess always runs on the blocking pool and never on the event
//! loop. Failures are classified from stderr into the engine's typed error
//! kinds; the raw text only ever reaches the log.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PlaybackError, PlaybackResult};
use crate::sources::{cookies::CookieStore, ResolveMode, TrackExtractor, TrackMetadata};

pub struct YtDlpExtractor {
    cookies: Arc<CookieStore>,
}

impl YtDlpExtractor {
    pub fn new(cookies: Arc<CookieStore>) -> Self {
        Self { cookies }
    }
}

#[async_trait]
impl TrackExtractor for YtDlpExtractor {
    async fn extract(&self, input: &str, mode: ResolveMode) -> PlaybackResult<TrackMetadata> {
        let target = match mode {
            ResolveMode::Search => format!("ytsearch1:{input}"),
            ResolveMode::Direct => input.to_string(),
        };
        let cookie_file = self.cookies.cookie_file();
        debug!(
            "🔍 Extracting ({:?}) {} [cookies: {}]",
            mode,
            target,
            cookie_file.is_some()
        );

        let command_target = target.clone();
        let output = tokio::task::spawn_blocking(move || {
            let mut cmd = std::process::Command::new("yt-dlp");
            cmd.args([
                "--dump-single-json",
                "--no-playlist",
                "--default-search",
                "ytsearch",
                "--format",
                "bestaudio/best",
                "--quiet",
                "--no-warnings",
                "--socket-timeout",
                "30",
                "--retries",
                "3",
                "--source-address",
                "0.0.0.0",
            ]);
            if let Some(path) = cookie_file {
                cmd.arg("--cookies").arg(path);
            }
            cmd.arg(&command_target);
            cmd.output()
        })
        .await;

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("yt-dlp process error: {}", e);
                return Err(PlaybackError::Unavailable);
            }
            Err(e) => {
                warn!("yt-dlp task join error: {}", e);
                return Err(PlaybackError::Unavailable);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp extraction failed for {}: {}", target, stderr.trim());
            return Err(classify_failure(&stderr));
        }

        parse_metadata(&output.stdout, &target)
    }
}

#[derive(Debug, Deserialize)]
struct ExtractedInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    entries: Option<Vec<ExtractedInfo>>,
}

/// Parse the `--dump-single-json` payload. Collections are unwrapped one
/// level; only the first entry is used (playlist import is unsupported).
fn parse_metadata(payload: &[u8], requested: &str) -> PlaybackResult<TrackMetadata> {
    let info: ExtractedInfo = serde_json::from_slice(payload).map_err(|e| {
        warn!("yt-dlp returned malformed JSON: {}", e);
        PlaybackError::Unavailable
    })?;

    let info = match info.entries {
        Some(entries) => match entries.into_iter().next() {
            Some(first) => first,
            None => return Err(PlaybackError::NotFound),
        },
        None => info,
    };

    Ok(TrackMetadata {
        title: info.title.unwrap_or_else(|| "Unknown title".to_string()),
        webpage_url: info
            .webpage_url
            .unwrap_or_else(|| requested.to_string()),
        stream_url: info.url,
        duration: info.duration.map(Duration::from_secs_f64),
        thumbnail: info.thumbnail,
    })
}

/// Map yt-dlp stderr onto the typed taxonomy. The age check runs before the
/// sign-in check: "Sign in to confirm your age" must not read as a bot wall.
fn classify_failure(stderr: &str) -> PlaybackError {
    let s = stderr.to_lowercase();
    if s.contains("confirm your age") || s.contains("age-restricted") {
        PlaybackError::AgeRestricted
    } else if s.contains("sign in to confirm")
        || s.contains("not a bot")
        || s.contains("http error 429")
        || s.contains("captcha")
    {
        PlaybackError::AccessBlocked
    } else if s.contains("private video") {
        PlaybackError::Private
    } else if s.contains("is not a valid url") || s.contains("no video results") {
        PlaybackError::NotFound
    } else if s.contains("video unavailable") || s.contains("no longer available") {
        PlaybackError::Unavailable
    } else {
        PlaybackError::Unavailable
    }
}
