//! Cookie-jar ownership for the stream extractor.
//!
//! The jar is a Netscape-format text export of browser cookies. It reduces
//! bot-detection failures upstream, but it is strictly optional: every
//! refresh failure is logged and extraction carries on unauthenticated.
//! Both the admin refresh command and the resolver's automatic
//! blocked-request recovery funnel through [`CookieStore::refresh`].

use anyhow::Result;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
struct JarState {
    loaded: bool,
    valid: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CookieStatus {
    pub present: bool,
    pub age_seconds: Option<u64>,
    pub refreshes: u64,
}

pub struct CookieStore {
    path: PathBuf,
    state: RwLock<JarState>,
    refreshes: AtomicU64,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(JarState::default()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Path to pass to the extractor, only while the jar is known good.
    pub fn cookie_file(&self) -> Option<PathBuf> {
        let state = self.state.read();
        (state.loaded && state.valid).then(|| self.path.clone())
    }

    /// Idempotent lazy initialization.
    pub async fn load(&self) -> Result<()> {
        if self.state.read().loaded {
            return Ok(());
        }
        self.refresh(false).await
    }

    /// Re-read and re-validate the jar. `force` bypasses the loaded-and-valid
    /// fast path and is what the blocked-request recovery uses.
    pub async fn refresh(&self, force: bool) -> Result<()> {
        {
            let state = self.state.read();
            if !force && state.loaded && state.valid {
                return Ok(());
            }
        }

        self.refreshes.fetch_add(1, Ordering::SeqCst);

        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if is_netscape_jar(&content) => {
                *self.state.write() = JarState {
                    loaded: true,
                    valid: true,
                };
                info!("🍪 Cookie jar loaded from {}", self.path.display());
                Ok(())
            }
            Ok(_) => {
                *self.state.write() = JarState {
                    loaded: true,
                    valid: false,
                };
                warn!(
                    "🍪 {} is not a Netscape cookie jar; continuing without cookies",
                    self.path.display()
                );
                anyhow::bail!("invalid cookie jar format")
            }
            Err(e) => {
                *self.state.write() = JarState {
                    loaded: true,
                    valid: false,
                };
                warn!(
                    "🍪 Could not read cookie jar {}: {}; continuing without cookies",
                    self.path.display(),
                    e
                );
                Err(e.into())
            }
        }
    }

    pub fn status(&self) -> CookieStatus {
        let age_seconds = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .map(|age| age.as_secs());

        CookieStatus {
            present: self.path.exists(),
            age_seconds,
            refreshes: self.refreshes.load(Ordering::SeqCst),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// At least one non-comment line with three or more tab-separated fields.
/// Partial field counts are tolerated for forward compatibility.
fn is_netscape_jar(content: &str) -> bool {
    content.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with('#') && line.split('\t').count() >= 3
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_JAR: &str = "# Netscape HTTP Cookie File\n\
        .youtube.com\tTRUE\t/\tTRUE\t1893456000\tSID\tabc123\n";

    fn jar_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write jar");
        file
    }

    #[test]
    fn netscape_validation_accepts_tab_separated_lines() {
        assert!(is_netscape_jar(VALID_JAR));
        // Short lines are tolerated as long as they have three fields.
        assert!(is_netscape_jar("a\tb\tc\n"));
    }

    #[test]
    fn netscape_validation_rejects_comments_and_prose() {
        assert!(!is_netscape_jar("# only a header\n# and another comment\n"));
        assert!(!is_netscape_jar("this is not a cookie file\n"));
        assert!(!is_netscape_jar(""));
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let file = jar_file(VALID_JAR);
        let store = CookieStore::new(file.path());

        store.load().await.expect("first load");
        store.load().await.expect("second load");

        assert_eq!(store.status().refreshes, 1);
        assert!(store.cookie_file().is_some());
    }

    #[tokio::test]
    async fn forced_refresh_rereads_the_jar() {
        let file = jar_file(VALID_JAR);
        let store = CookieStore::new(file.path());

        store.load().await.expect("load");
        store.refresh(true).await.expect("forced refresh");

        assert_eq!(store.status().refreshes, 2);
    }

    #[tokio::test]
    async fn refresh_failure_is_not_fatal() {
        let store = CookieStore::new("/definitely/not/a/real/path/cookies.txt");

        assert!(store.refresh(true).await.is_err());
        assert!(store.cookie_file().is_none());

        let status = store.status();
        assert!(!status.present);
        assert_eq!(status.refreshes, 1);
    }

    #[tokio::test]
    async fn malformed_jar_is_never_handed_to_the_extractor() {
        let file = jar_file("not a cookie jar at all\n");
        let store = CookieStore::new(file.path());

        assert!(store.load().await.is_err());
        assert!(store.cookie_file().is_none());
        assert!(store.status().present);
    }
}
