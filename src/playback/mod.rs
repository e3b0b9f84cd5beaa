//! The playback engine: per-guild state, the play/advance/idle state
//! machine, and the idle-disconnect reaper.

pub mod reaper;
pub mod scheduler;
pub mod state;

use serenity::model::id::GuildId;

pub use reaper::InactivityReaper;
pub use scheduler::{EnqueueRequest, Enqueued, NowPlayingNotice, PlaybackScheduler};
pub use state::{ConnectionPhase, GuildPlaybackState, QueueSnapshot, TrackRequest};

/// Messages posted onto the scheduler's event queue. Sinks and timers live
/// on other tasks/threads; they communicate with the scheduler exclusively
/// through these, never by mutating guild state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A sink finished or was stopped. `play_id` identifies which playback
    /// this notice belongs to, so a late event from a replaced sink is
    /// recognized as stale and dropped.
    TrackEnded { guild_id: GuildId, play_id: u64 },
    /// An idle timer fired; the scheduler re-verifies idleness before
    /// acting on it.
    InactivityTimeout { guild_id: GuildId },
}
