//! Voice-platform seam.
//!
//! Everything the engine needs from the voice transport is expressed as three
//! traits so the playback state machine can be driven against fakes in tests
//! and against songbird in production:
//!
//! - [`VoiceGateway`] - process-wide join/lookup/disconnect per guild
//! - [`VoiceHandle`] - one live connection: move, readiness, playback start
//! - [`TrackControl`] - the playing sink: pause/resume/stop/volume
//!
//! Track completion is never a direct callback into shared state. The handle
//! is given a [`CompletionNotifier`], and the sink posts a
//! [`PlaybackEvent::TrackEnded`] message onto the scheduler's event queue
//! from whatever thread the driver finishes on.

pub mod connection;
pub mod songbird_impl;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::error::PlaybackResult;
use crate::playback::PlaybackEvent;

pub use connection::{ConnectTuning, ConnectionManager};
pub use songbird_impl::SongbirdGateway;

/// A resolved, directly playable audio stream.
#[derive(Debug, Clone)]
pub struct PlayableSource {
    pub stream_url: String,
    pub volume: f32,
}

/// Posts track-completion events back onto the scheduler's queue.
#[derive(Clone)]
pub struct CompletionNotifier {
    events: UnboundedSender<PlaybackEvent>,
    guild_id: GuildId,
    play_id: u64,
}

impl CompletionNotifier {
    pub fn new(events: UnboundedSender<PlaybackEvent>, guild_id: GuildId, play_id: u64) -> Self {
        Self {
            events,
            guild_id,
            play_id,
        }
    }

    /// Safe to call from any thread; the receiver may be gone during shutdown.
    pub fn notify(&self) {
        debug!(
            "🏁 Track finished in guild {} (play {})",
            self.guild_id, self.play_id
        );
        let _ = self.events.send(PlaybackEvent::TrackEnded {
            guild_id: self.guild_id,
            play_id: self.play_id,
        });
    }
}

/// Controls for the currently playing sink.
pub trait TrackControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    fn set_volume(&self, volume: f32);
}

/// One live voice connection for a guild.
#[async_trait]
pub trait VoiceHandle: Send + Sync {
    /// Channel the transport currently sits in, if any.
    async fn current_channel(&self) -> Option<ChannelId>;

    /// Whether the media transport finished its handshake and is usable,
    /// not merely that a socket opened.
    async fn is_ready(&self) -> bool;

    async fn move_to(&self, channel_id: ChannelId) -> PlaybackResult<()>;

    async fn disconnect(&self, force: bool) -> PlaybackResult<()>;

    /// Start playing `source`, wiring `on_complete` to the sink's end event.
    async fn play(
        &self,
        source: PlayableSource,
        on_complete: CompletionNotifier,
    ) -> PlaybackResult<Arc<dyn TrackControl>>;
}

impl std::fmt::Debug for dyn VoiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VoiceHandle")
    }
}

/// Process-wide voice connection registry.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Open a connection for `guild_id` in `channel_id`. Resolving the future
    /// does not imply the handshake finished; callers poll
    /// [`VoiceHandle::is_ready`].
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<Arc<dyn VoiceHandle>>;

    /// Existing live handle for the guild, if one is registered.
    fn get(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceHandle>>;

    /// Tear down the guild's connection. A no-op when not connected.
    async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()>;
}
