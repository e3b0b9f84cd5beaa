//! The play/advance/idle state machine.
//!
//! [`PlaybackScheduler`] is the single entry point the command layer talks
//! to. It owns the guild-state map, the connection manager, the resolver and
//! the inactivity reaper, and it runs one event task that serializes every
//! completion callback and timer fire. Per guild the machine moves
//! Idle -> Connecting -> Resolving -> Playing, loops on Playing while the
//! queue has tracks, and parks at Idle (reaper armed) or Disconnected.

use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PlaybackError, PlaybackResult};
use crate::playback::{
    reaper::InactivityReaper,
    state::{ConnectionPhase, GuildPlaybackState, QueueSnapshot, TrackRequest},
    PlaybackEvent,
};
use crate::sources::{ResolveMode, StreamResolver};
use crate::voice::{CompletionNotifier, ConnectionManager, PlayableSource, TrackControl};

/// Consecutive broken queue entries tolerated before the guild goes idle
/// instead of fail-and-advancing forever.
const MAX_ADVANCE_FAILURES: usize = 3;

pub struct EnqueueRequest {
    pub guild_id: GuildId,
    pub voice_channel_id: ChannelId,
    pub announce_channel_id: Option<ChannelId>,
    pub query: String,
    pub requested_by: UserId,
}

/// What `enqueue` reports back for UI feedback.
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub track: TrackRequest,
    pub position: usize,
    pub started: bool,
}

/// Emitted whenever a track starts, for the announcement layer.
#[derive(Debug, Clone)]
pub struct NowPlayingNotice {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub track: TrackRequest,
    pub volume: f32,
}

pub struct PlaybackScheduler {
    states: DashMap<GuildId, Arc<RwLock<GuildPlaybackState>>>,
    /// Serializes `advance` per guild: the event task and an `enqueue`
    /// kick-start must never race each other into a double play.
    advance_locks: DashMap<GuildId, Arc<Mutex<()>>>,
    connections: Arc<ConnectionManager>,
    resolver: Arc<StreamResolver>,
    reaper: InactivityReaper,
    events: UnboundedSender<PlaybackEvent>,
    notices: UnboundedSender<NowPlayingNotice>,
    play_ids: AtomicU64,
    default_volume: f32,
    max_queue_size: usize,
}

impl PlaybackScheduler {
    /// Build the scheduler and spawn its event task. The returned receiver
    /// carries now-playing notices for the announcement layer.
    pub fn spawn(
        connections: Arc<ConnectionManager>,
        resolver: Arc<StreamResolver>,
        config: &Config,
    ) -> (Arc<Self>, UnboundedReceiver<NowPlayingNotice>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();

        let scheduler = Arc::new(Self {
            states: DashMap::new(),
            advance_locks: DashMap::new(),
            connections,
            resolver,
            reaper: InactivityReaper::new(
                events_tx.clone(),
                Duration::from_secs(config.inactivity_timeout_secs),
            ),
            events: events_tx,
            notices: notices_tx,
            play_ids: AtomicU64::new(0),
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
        });

        let event_task = scheduler.clone();
        tokio::spawn(async move { event_task.run(events_rx).await });

        (scheduler, notices_rx)
    }

    /// Completion callbacks and timer fires are strictly serialized here. A
    /// sink finishing on a driver thread only ever posts a message; this
    /// task is the one that touches guild state.
    async fn run(self: Arc<Self>, mut events: UnboundedReceiver<PlaybackEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PlaybackEvent::TrackEnded { guild_id, play_id } => {
                    self.on_track_ended(guild_id, play_id).await;
                }
                PlaybackEvent::InactivityTimeout { guild_id } => {
                    self.reap(guild_id).await;
                }
            }
        }
    }

    /// Resolve the query, append it, and start playback when the guild was
    /// idle. Connection and resolution failures are returned to the caller
    /// and leave the guild exactly as it was - nothing half-queued.
    pub async fn enqueue(&self, request: EnqueueRequest) -> PlaybackResult<Enqueued> {
        let EnqueueRequest {
            guild_id,
            voice_channel_id,
            announce_channel_id,
            query,
            requested_by,
        } = request;

        // Playback is about to (re)start; a pending idle timer must not
        // fire underneath us.
        self.reaper.cancel(guild_id);

        let state = self.guild_state(guild_id);
        {
            let mut st = state.write();
            st.announce_channel_id = announce_channel_id;
            st.last_voice_channel_id = Some(voice_channel_id);
            if st.phase == ConnectionPhase::Disconnected {
                st.phase = ConnectionPhase::Connecting;
            }
        }

        match self
            .connections
            .ensure_connected(guild_id, voice_channel_id)
            .await
        {
            Ok(_) => state.write().phase = ConnectionPhase::Connected,
            Err(e) => {
                state.write().phase = ConnectionPhase::Disconnected;
                return Err(e);
            }
        }

        let mode = StreamResolver::mode_for(&query);
        let meta = match self.resolver.resolve(&query, mode).await {
            Ok(meta) => meta,
            Err(e) => {
                if state.read().is_idle() {
                    self.reaper.arm(guild_id);
                }
                return Err(e);
            }
        };

        let track = TrackRequest::from_metadata(meta, query, requested_by);
        let position = state.write().enqueue(track.clone())?;
        info!(
            "➕ Queued \"{}\" at position {} in guild {}",
            track.title, position, guild_id
        );

        let mut started = false;
        if state.read().current().is_none() {
            self.advance(guild_id).await;
            started = state.read().current().is_some();
        }

        Ok(Enqueued {
            track,
            position,
            started,
        })
    }

    /// Stop the current sink. The sink's end event drives the same advance
    /// path as natural completion, so skip never touches the queue itself.
    pub fn skip(&self, guild_id: GuildId) -> PlaybackResult<TrackRequest> {
        let state = self.existing_state(guild_id).ok_or(PlaybackError::QueueEmpty)?;
        let (current, sink) = {
            let st = state.read();
            (st.current().cloned(), st.sink())
        };
        let current = current.ok_or(PlaybackError::QueueEmpty)?;
        let sink = sink.ok_or(PlaybackError::QueueEmpty)?;

        info!("⏭️ Skipping \"{}\" in guild {}", current.title, guild_id);
        sink.stop();
        Ok(current)
    }

    /// Clear everything, disconnect, and drop the guild's state. Terminal
    /// until the next command re-enters through `enqueue`.
    pub async fn stop(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.reaper.cancel(guild_id);

        if let Some(state) = self.existing_state(guild_id) {
            let sink = {
                let mut st = state.write();
                st.bump_generation();
                let sink = st.sink();
                st.clear();
                st.phase = ConnectionPhase::Disconnected;
                sink
            };
            if let Some(sink) = sink {
                sink.stop();
            }
        }

        self.connections.disconnect(guild_id).await?;
        self.drop_guild(guild_id);
        info!("⏹️ Stopped playback and disconnected guild {}", guild_id);
        Ok(())
    }

    pub fn pause(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.live_sink(guild_id)?.pause();
        Ok(())
    }

    pub fn resume(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.live_sink(guild_id)?.resume();
        Ok(())
    }

    /// Volume is validated against [0, 1] before any mutation; when a sink
    /// is live the new volume applies to it immediately.
    pub fn set_volume(&self, guild_id: GuildId, volume: f32) -> PlaybackResult<()> {
        let state = self.guild_state(guild_id);
        state.write().set_volume(volume)?;
        if let Some(sink) = state.read().sink() {
            sink.set_volume(volume);
        }
        Ok(())
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> PlaybackResult<TrackRequest> {
        let state = self
            .existing_state(guild_id)
            .ok_or(PlaybackError::InvalidPosition(position))?;
        let removed = state.write().remove(position)?;
        info!(
            "🗑️ Removed \"{}\" from position {} in guild {}",
            removed.title, position, guild_id
        );
        Ok(removed)
    }

    pub fn queue(&self, guild_id: GuildId) -> QueueSnapshot {
        self.existing_state(guild_id)
            .map(|state| state.read().snapshot())
            .unwrap_or_default()
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<TrackRequest> {
        self.existing_state(guild_id)
            .and_then(|state| state.read().current().cloned())
    }

    /// Whether the idle timer is pending for the guild.
    pub fn inactivity_armed(&self, guild_id: GuildId) -> bool {
        self.reaper.is_armed(guild_id)
    }

    /// The voice platform dropped our connection out from under us: drop
    /// in-memory state and cancel every timer for the guild.
    pub fn handle_external_disconnect(&self, guild_id: GuildId) {
        info!("🔌 External voice disconnect in guild {}; dropping state", guild_id);
        if let Some(state) = self.existing_state(guild_id) {
            let mut st = state.write();
            st.bump_generation();
            st.clear();
            st.phase = ConnectionPhase::Disconnected;
        }
        self.drop_guild(guild_id);
    }

    /// Deterministic teardown of everything keyed by the guild.
    pub fn drop_guild(&self, guild_id: GuildId) {
        self.reaper.cancel(guild_id);
        self.states.remove(&guild_id);
        self.advance_locks.remove(&guild_id);
        self.connections.forget(guild_id);
    }

    async fn on_track_ended(&self, guild_id: GuildId, play_id: u64) {
        let Some(state) = self.existing_state(guild_id) else {
            debug!("Completion event for unknown guild {}; ignoring", guild_id);
            return;
        };
        {
            let mut st = state.write();
            if st.current_play_id() != Some(play_id) {
                // A replaced or stopped sink reporting in late.
                debug!("Stale completion event in guild {}; ignoring", guild_id);
                return;
            }
            st.finish_current();
        }
        self.advance(guild_id).await;
    }

    /// Dequeue and start the next track, fail-and-advancing over broken
    /// entries (bounded), or go idle and arm the reaper.
    async fn advance(&self, guild_id: GuildId) {
        let lock = self.advance_lock(guild_id);
        let _guard = lock.lock().await;

        let Some(state) = self.existing_state(guild_id) else {
            return;
        };
        if state.read().current().is_some() {
            // Another entrant started playback while we waited on the lock.
            return;
        }

        let mut failures = 0usize;
        loop {
            let (next, generation) = {
                let mut st = state.write();
                let next = st.dequeue();
                (next, st.generation())
            };
            let Some(mut track) = next else {
                info!("📭 Queue empty in guild {}; going idle", guild_id);
                self.reaper.arm(guild_id);
                return;
            };

            if track.stream_url.is_none() {
                match self
                    .resolver
                    .resolve(&track.webpage_url, ResolveMode::Direct)
                    .await
                {
                    Ok(meta) => track.stream_url = meta.stream_url,
                    Err(e) => {
                        warn!(
                            "Re-resolution of \"{}\" failed in guild {}: {}",
                            track.title, guild_id, e
                        );
                        failures += 1;
                        if failures >= MAX_ADVANCE_FAILURES {
                            self.give_up(guild_id, &state);
                            return;
                        }
                        continue;
                    }
                }
                // The guild may have been stopped or torn down while we were
                // resolving; a stale result must not restart playback.
                if !self.states.contains_key(&guild_id)
                    || state.read().generation() != generation
                {
                    debug!("Guild {} torn down mid-resolve; discarding result", guild_id);
                    return;
                }
            }

            match self.start_track(guild_id, &state, track).await {
                Ok(()) => return,
                Err(e) => {
                    warn!("Failed to start track in guild {}: {}", guild_id, e);
                    failures += 1;
                    if failures >= MAX_ADVANCE_FAILURES {
                        self.give_up(guild_id, &state);
                        return;
                    }
                }
            }
        }
    }

    async fn start_track(
        &self,
        guild_id: GuildId,
        state: &Arc<RwLock<GuildPlaybackState>>,
        track: TrackRequest,
    ) -> PlaybackResult<()> {
        // Invariant: the idle timer is gone before any play begins.
        self.reaper.cancel(guild_id);

        let handle = match self.connections.current(guild_id) {
            Some(handle) => handle,
            None => {
                // Reconnect to the last known channel before advancing.
                let channel = state
                    .read()
                    .last_voice_channel_id
                    .ok_or(PlaybackError::VoiceJoinFailed)?;
                let handle = self.connections.ensure_connected(guild_id, channel).await?;
                state.write().phase = ConnectionPhase::Connected;
                handle
            }
        };

        let stream_url = track.stream_url.clone().ok_or(PlaybackError::Unavailable)?;
        let volume = state.read().volume();
        let play_id = self.play_ids.fetch_add(1, Ordering::SeqCst);
        let notifier = CompletionNotifier::new(self.events.clone(), guild_id, play_id);

        let sink = handle
            .play(PlayableSource { stream_url, volume }, notifier)
            .await?;

        info!("🎵 Now playing \"{}\" in guild {}", track.title, guild_id);
        let announce = {
            let mut st = state.write();
            st.begin(track.clone(), sink, play_id);
            st.announce_channel_id
        };
        if let Some(channel_id) = announce {
            let _ = self.notices.send(NowPlayingNotice {
                guild_id,
                channel_id,
                track,
                volume,
            });
        }
        Ok(())
    }

    fn give_up(&self, guild_id: GuildId, state: &Arc<RwLock<GuildPlaybackState>>) {
        warn!(
            "Giving up after {} consecutive broken tracks in guild {}; going idle",
            MAX_ADVANCE_FAILURES, guild_id
        );
        state.write().finish_current();
        self.reaper.arm(guild_id);
    }

    /// Idle timer fired. Re-verify: the guild may have become busy between
    /// arming and firing, in which case this is a no-op.
    async fn reap(&self, guild_id: GuildId) {
        let Some(state) = self.existing_state(guild_id) else {
            return;
        };
        if !state.read().is_idle() {
            debug!(
                "Inactivity timer fired while guild {} is busy; ignoring",
                guild_id
            );
            return;
        }
        info!("💤 Idle timeout in guild {}; disconnecting", guild_id);
        let _ = self.connections.disconnect(guild_id).await;
        self.drop_guild(guild_id);
    }

    fn guild_state(&self, guild_id: GuildId) -> Arc<RwLock<GuildPlaybackState>> {
        self.states
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(RwLock::new(GuildPlaybackState::new(
                    self.default_volume,
                    self.max_queue_size,
                )))
            })
            .clone()
    }

    fn existing_state(&self, guild_id: GuildId) -> Option<Arc<RwLock<GuildPlaybackState>>> {
        self.states.get(&guild_id).map(|s| s.clone())
    }

    fn live_sink(&self, guild_id: GuildId) -> PlaybackResult<Arc<dyn TrackControl>> {
        self.existing_state(guild_id)
            .and_then(|state| state.read().sink())
            .ok_or(PlaybackError::QueueEmpty)
    }

    fn advance_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.advance_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
