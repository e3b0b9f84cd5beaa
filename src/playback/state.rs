//! Per-guild playback state.
//!
//! One [`GuildPlaybackState`] exists per guild, created lazily on the first
//! command that references the guild and dropped on disconnect. The queue is
//! strictly FIFO; the only mutation besides enqueue/dequeue is the 1-based
//! `remove`. All mutation happens under the scheduler's lock discipline -
//! nothing here synchronizes on its own.

use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, UserId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PlaybackError, PlaybackResult};
use crate::sources::TrackMetadata;
use crate::voice::TrackControl;

/// A queued (or playing) request.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    pub title: String,
    /// The query or URL exactly as the member typed it.
    pub source: String,
    /// Lazily populated; may be re-resolved when missing or expired.
    pub stream_url: Option<String>,
    pub webpage_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
}

impl TrackRequest {
    pub fn from_metadata(meta: TrackMetadata, source: String, requested_by: UserId) -> Self {
        Self {
            title: meta.title,
            source,
            stream_url: meta.stream_url,
            webpage_url: meta.webpage_url,
            duration: meta.duration,
            thumbnail: meta.thumbnail,
            requested_by,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of a guild's queue for the command layer.
#[derive(Clone, Default)]
pub struct QueueSnapshot {
    pub current: Option<TrackRequest>,
    pub upcoming: Vec<TrackRequest>,
    pub volume: f32,
}

pub struct GuildPlaybackState {
    queue: VecDeque<TrackRequest>,
    current: Option<TrackRequest>,
    current_play_id: Option<u64>,
    sink: Option<Arc<dyn TrackControl>>,
    volume: f32,
    max_queue: usize,
    pub announce_channel_id: Option<ChannelId>,
    pub last_voice_channel_id: Option<ChannelId>,
    pub phase: ConnectionPhase,
    /// Bumped on teardown so in-flight work can tell its results are stale.
    generation: u64,
}

impl GuildPlaybackState {
    pub fn new(volume: f32, max_queue: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            current: None,
            current_play_id: None,
            sink: None,
            volume,
            max_queue,
            announce_channel_id: None,
            last_voice_channel_id: None,
            phase: ConnectionPhase::Disconnected,
            generation: 0,
        }
    }

    /// Append a track; returns its 1-based queue position.
    pub fn enqueue(&mut self, track: TrackRequest) -> PlaybackResult<usize> {
        if self.queue.len() >= self.max_queue {
            return Err(PlaybackError::QueueFull(self.max_queue));
        }
        self.queue.push_back(track);
        Ok(self.queue.len())
    }

    pub fn dequeue(&mut self) -> Option<TrackRequest> {
        self.queue.pop_front()
    }

    /// Remove by 1-based position. Out-of-range positions leave the queue
    /// untouched.
    pub fn remove(&mut self, position: usize) -> PlaybackResult<TrackRequest> {
        if position < 1 {
            return Err(PlaybackError::InvalidPosition(position));
        }
        self.queue
            .remove(position - 1)
            .ok_or(PlaybackError::InvalidPosition(position))
    }

    /// Empty the queue and drop the current track (used by Stop).
    pub fn clear(&mut self) {
        self.queue.clear();
        self.finish_current();
    }

    /// Reject out-of-range values before any mutation.
    pub fn set_volume(&mut self, volume: f32) -> PlaybackResult<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        self.volume = volume;
        Ok(())
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn begin(&mut self, track: TrackRequest, sink: Arc<dyn TrackControl>, play_id: u64) {
        self.current = Some(track);
        self.sink = Some(sink);
        self.current_play_id = Some(play_id);
    }

    pub fn finish_current(&mut self) {
        self.current = None;
        self.sink = None;
        self.current_play_id = None;
    }

    pub fn current(&self) -> Option<&TrackRequest> {
        self.current.as_ref()
    }

    pub fn current_play_id(&self) -> Option<u64> {
        self.current_play_id
    }

    pub fn sink(&self) -> Option<Arc<dyn TrackControl>> {
        self.sink.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            upcoming: self.queue.iter().cloned().collect(),
            volume: self.volume,
        }
    }
}
