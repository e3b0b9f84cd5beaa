//! Stream resolution: query/URL in, playable metadata out.
//!
//! [`StreamResolver`] sits between the scheduler and the extractor
//! subprocess. Its one piece of policy: when the upstream signals
//! bot-detection, refresh the cookie jar once and retry once. A second
//! blocked response is reported as-is so a degraded upstream is never
//! hammered in a loop.

pub mod cookies;
pub mod ytdlp;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::error::{PlaybackError, PlaybackResult};

pub use cookies::{CookieStatus, CookieStore};
pub use ytdlp::YtDlpExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Free-text query; the first upstream search result wins.
    Search,
    /// The input is already a URL; extract it directly.
    Direct,
}

/// What the resolver knows about a playable track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub webpage_url: String,
    pub stream_url: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// The extraction seam. Production uses the yt-dlp subprocess; tests mock it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackExtractor: Send + Sync {
    async fn extract(&self, input: &str, mode: ResolveMode) -> PlaybackResult<TrackMetadata>;
}

pub struct StreamResolver {
    extractor: Arc<dyn TrackExtractor>,
    cookies: Arc<CookieStore>,
}

impl StreamResolver {
    pub fn new(extractor: Arc<dyn TrackExtractor>, cookies: Arc<CookieStore>) -> Self {
        Self { extractor, cookies }
    }

    /// Direct for anything that parses as an http(s) URL, Search otherwise.
    pub fn mode_for(input: &str) -> ResolveMode {
        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => ResolveMode::Direct,
            _ => ResolveMode::Search,
        }
    }

    pub async fn resolve(&self, input: &str, mode: ResolveMode) -> PlaybackResult<TrackMetadata> {
        match self.extractor.extract(input, mode).await {
            Err(PlaybackError::AccessBlocked) => {
                warn!("🧱 Upstream blocked the request; refreshing cookies and retrying once");
                if let Err(e) = self.cookies.refresh(true).await {
                    // Degraded fallback: retry unauthenticated anyway.
                    warn!("Cookie refresh failed: {}", e);
                }
                self.extractor.extract(input, mode).await
            }
            other => other,
        }
    }
}
