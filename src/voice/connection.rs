//! Per-guild voice connection lifecycle.
//!
//! A guild has at most one live voice connection. [`ConnectionManager`]
//! guarantees that by funnelling every connect/move/disconnect through a
//! per-guild async lock, and tolerates transient join failures with bounded
//! retries: each try is a connect with a hard timeout followed by a
//! handshake-ready poll that confirms the transport is actually usable.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PlaybackError, PlaybackResult};
use crate::voice::{VoiceGateway, VoiceHandle};

/// Retry and timeout knobs for the join sequence.
#[derive(Debug, Clone)]
pub struct ConnectTuning {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub handshake_poll: Duration,
    pub backoff_step: Duration,
    pub attempts: u32,
}

impl Default for ConnectTuning {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            handshake_timeout: Duration::from_secs(12),
            handshake_poll: Duration::from_millis(200),
            backoff_step: Duration::from_secs(2),
            attempts: 3,
        }
    }
}

impl ConnectTuning {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
            ..Self::default()
        }
    }
}

pub struct ConnectionManager {
    gateway: Arc<dyn VoiceGateway>,
    locks: DashMap<GuildId, Arc<Mutex<()>>>,
    tuning: ConnectTuning,
}

impl ConnectionManager {
    pub fn new(gateway: Arc<dyn VoiceGateway>, tuning: ConnectTuning) -> Self {
        Self {
            gateway,
            locks: DashMap::new(),
            tuning,
        }
    }

    /// The guild's live handle, without touching the connection.
    pub fn current(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceHandle>> {
        self.gateway.get(guild_id)
    }

    /// Return a usable connection to `target`, reusing, moving or rebuilding
    /// as needed. Commands racing for the same guild queue behind the lock
    /// instead of creating duplicate connections.
    pub async fn ensure_connected(
        &self,
        guild_id: GuildId,
        target: ChannelId,
    ) -> PlaybackResult<Arc<dyn VoiceHandle>> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if let Some(handle) = self.gateway.get(guild_id) {
            let channel = handle.current_channel().await;
            if channel == Some(target) && handle.is_ready().await {
                return Ok(handle);
            }
            if channel.is_some() && channel != Some(target) {
                debug!("↪️ Moving to channel {} in guild {}", target, guild_id);
                if handle.move_to(target).await.is_ok() && self.wait_handshake(&*handle).await {
                    return Ok(handle);
                }
                warn!("Move failed in guild {}, rebuilding the connection", guild_id);
            }
            let _ = handle.disconnect(true).await;
        }

        for attempt in 1..=self.tuning.attempts {
            debug!(
                "🔌 Voice connect attempt {}/{} for guild {}",
                attempt, self.tuning.attempts, guild_id
            );
            match timeout(
                self.tuning.connect_timeout,
                self.gateway.connect(guild_id, target),
            )
            .await
            {
                Ok(Ok(handle)) => {
                    if self.wait_handshake(&*handle).await {
                        info!("🔊 Connected to channel {} in guild {}", target, guild_id);
                        return Ok(handle);
                    }
                    // Half-open: a socket came up but the media transport
                    // never became usable. Tear it down before retrying.
                    warn!(
                        "Voice handshake never completed (attempt {}) in guild {}",
                        attempt, guild_id
                    );
                    let _ = handle.disconnect(true).await;
                }
                Ok(Err(e)) => {
                    warn!(
                        "Voice join failed (attempt {}) in guild {}: {}",
                        attempt, guild_id, e
                    );
                }
                Err(_) => {
                    warn!(
                        "Voice join timed out after {:?} (attempt {}) in guild {}",
                        self.tuning.connect_timeout, attempt, guild_id
                    );
                }
            }
            if attempt < self.tuning.attempts {
                sleep(self.tuning.backoff_step * attempt).await;
            }
        }

        Err(PlaybackError::VoiceJoinFailed)
    }

    /// Tear down the guild's connection, serialized with any in-flight join.
    pub async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;
        self.gateway.disconnect(guild_id).await
    }

    /// Drop the per-guild lock entry after the guild's state is gone.
    pub fn forget(&self, guild_id: GuildId) {
        self.locks.remove(&guild_id);
    }

    async fn wait_handshake(&self, handle: &dyn VoiceHandle) -> bool {
        let deadline = Instant::now() + self.tuning.handshake_timeout;
        while Instant::now() < deadline {
            if handle.is_ready().await {
                return true;
            }
            sleep(self.tuning.handshake_poll).await;
        }
        false
    }

    fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::testing::{FakeGateway, FakeHandle};
    use std::sync::atomic::Ordering;

    fn fast_tuning() -> ConnectTuning {
        ConnectTuning {
            connect_timeout: Duration::from_millis(100),
            handshake_timeout: Duration::from_millis(50),
            handshake_poll: Duration::from_millis(5),
            backoff_step: Duration::from_millis(10),
            attempts: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_existing_connection_to_target() {
        let gateway = Arc::new(FakeGateway::new());
        let channel = ChannelId::new(10);
        gateway.install(FakeHandle::connected(channel));
        let manager = ConnectionManager::new(gateway.clone(), fast_tuning());

        let handle = manager
            .ensure_connected(GuildId::new(1), channel)
            .await
            .expect("existing connection should be reused");

        assert_eq!(handle.current_channel().await, Some(channel));
        assert_eq!(gateway.connect_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn moves_when_connected_elsewhere() {
        let gateway = Arc::new(FakeGateway::new());
        let handle = FakeHandle::connected(ChannelId::new(10));
        gateway.install(handle.clone());
        let manager = ConnectionManager::new(gateway.clone(), fast_tuning());

        let target = ChannelId::new(20);
        manager
            .ensure_connected(GuildId::new(1), target)
            .await
            .expect("move should succeed");

        assert_eq!(handle.channel_now(), Some(target));
        assert_eq!(gateway.connect_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn three_join_failures_yield_voice_join_failed() {
        // Scenario: the platform rejects every join.
        let gateway = Arc::new(FakeGateway::new());
        gateway.fail_connects(usize::MAX);
        let manager = ConnectionManager::new(gateway.clone(), fast_tuning());

        let err = manager
            .ensure_connected(GuildId::new(1), ChannelId::new(10))
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::VoiceJoinFailed);
        assert_eq!(gateway.connect_attempts.load(Ordering::SeqCst), 3);
        assert!(gateway.handle().is_none(), "no half-open handle may survive");
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_handshake_is_torn_down_before_retry() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.connect_unready(); // sockets open, handshake never completes
        let manager = ConnectionManager::new(gateway.clone(), fast_tuning());

        let err = manager
            .ensure_connected(GuildId::new(1), ChannelId::new(10))
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::VoiceJoinFailed);
        assert_eq!(gateway.connect_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(gateway.force_disconnects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let gateway = Arc::new(FakeGateway::new());
        gateway.fail_connects(2);
        let manager = ConnectionManager::new(gateway.clone(), fast_tuning());

        let handle = manager
            .ensure_connected(GuildId::new(1), ChannelId::new(10))
            .await
            .expect("third attempt should connect");

        assert!(handle.is_ready().await);
        assert_eq!(gateway.connect_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ensures_share_one_connection() {
        let gateway = Arc::new(FakeGateway::new());
        let manager = Arc::new(ConnectionManager::new(gateway.clone(), fast_tuning()));
        let guild = GuildId::new(1);
        let channel = ChannelId::new(10);

        let (a, b) = tokio::join!(
            manager.ensure_connected(guild, channel),
            manager.ensure_connected(guild, channel),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(
            gateway.connect_attempts.load(Ordering::SeqCst),
            1,
            "the second command must queue behind the lock, not reconnect"
        );
    }
}
