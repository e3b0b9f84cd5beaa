//! Hand-rolled voice fakes for state-machine tests.
//!
//! Connection tests need stateful sequencing (fail N joins, stay unready,
//! record force-disconnects) that is clearer as a small fake than as mock
//! expectations. `FakeTrack::stop` fires the completion notifier, mirroring
//! the real driver where stopping a sink raises its end event.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{PlaybackError, PlaybackResult};
use crate::voice::{CompletionNotifier, PlayableSource, TrackControl, VoiceGateway, VoiceHandle};

pub struct FakeTrack {
    notifier: CompletionNotifier,
    pub stopped: AtomicBool,
    pub paused: AtomicBool,
    pub volume: Mutex<f32>,
}

impl FakeTrack {
    /// Simulate natural completion: the driver finished the stream.
    pub fn finish(&self) {
        self.notifier.notify();
    }
}

impl TrackControl for FakeTrack {
    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notifier.notify();
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume;
    }
}

pub struct FakeHandle {
    channel: Mutex<Option<ChannelId>>,
    pub ready: AtomicBool,
    pub move_ok: AtomicBool,
    pub force_disconnects: Arc<AtomicUsize>,
    pub played: Mutex<Vec<PlayableSource>>,
    pub tracks: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeHandle {
    pub fn connected(channel: ChannelId) -> Arc<Self> {
        Self::with_counter(channel, Arc::new(AtomicUsize::new(0)))
    }

    pub fn with_counter(channel: ChannelId, counter: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            channel: Mutex::new(Some(channel)),
            ready: AtomicBool::new(true),
            move_ok: AtomicBool::new(true),
            force_disconnects: counter,
            played: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
        })
    }

    pub fn last_track(&self) -> Option<Arc<FakeTrack>> {
        self.tracks.lock().last().cloned()
    }

    /// Sync view of the fake's channel, for assertions.
    pub fn channel_now(&self) -> Option<ChannelId> {
        *self.channel.lock()
    }
}

#[async_trait]
impl VoiceHandle for FakeHandle {
    async fn current_channel(&self) -> Option<ChannelId> {
        *self.channel.lock()
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn move_to(&self, channel_id: ChannelId) -> PlaybackResult<()> {
        if self.move_ok.load(Ordering::SeqCst) {
            *self.channel.lock() = Some(channel_id);
            Ok(())
        } else {
            Err(PlaybackError::VoiceJoinFailed)
        }
    }

    async fn disconnect(&self, force: bool) -> PlaybackResult<()> {
        if force {
            self.force_disconnects.fetch_add(1, Ordering::SeqCst);
        }
        *self.channel.lock() = None;
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn play(
        &self,
        source: PlayableSource,
        on_complete: CompletionNotifier,
    ) -> PlaybackResult<Arc<dyn TrackControl>> {
        let volume = source.volume;
        self.played.lock().push(source);
        let track = Arc::new(FakeTrack {
            notifier: on_complete,
            stopped: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            volume: Mutex::new(volume),
        });
        self.tracks.lock().push(track.clone());
        Ok(track)
    }
}

pub struct FakeGateway {
    handle: Mutex<Option<Arc<FakeHandle>>>,
    pub connect_attempts: AtomicUsize,
    pub force_disconnects: Arc<AtomicUsize>,
    failures_left: AtomicUsize,
    connect_ready: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            connect_attempts: AtomicUsize::new(0),
            force_disconnects: Arc::new(AtomicUsize::new(0)),
            failures_left: AtomicUsize::new(0),
            connect_ready: AtomicBool::new(true),
        }
    }

    /// Reject the next `n` connect calls (`usize::MAX` = reject all).
    pub fn fail_connects(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Connects succeed but the handshake never completes.
    pub fn connect_unready(&self) {
        self.connect_ready.store(false, Ordering::SeqCst);
    }

    pub fn install(&self, handle: Arc<FakeHandle>) {
        *self.handle.lock() = Some(handle);
    }

    pub fn handle(&self) -> Option<Arc<FakeHandle>> {
        self.handle.lock().clone()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<Arc<dyn VoiceHandle>> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let failures = self.failures_left.load(Ordering::SeqCst);
        if failures > 0 {
            if failures != usize::MAX {
                self.failures_left.store(failures - 1, Ordering::SeqCst);
            }
            return Err(PlaybackError::VoiceJoinFailed);
        }

        let handle = FakeHandle::with_counter(channel_id, self.force_disconnects.clone());
        handle
            .ready
            .store(self.connect_ready.load(Ordering::SeqCst), Ordering::SeqCst);
        *self.handle.lock() = Some(handle.clone());
        Ok(handle)
    }

    fn get(&self, _guild_id: GuildId) -> Option<Arc<dyn VoiceHandle>> {
        // A handle that disconnected itself no longer counts as live.
        self.handle
            .lock()
            .clone()
            .filter(|h| h.channel.lock().is_some())
            .map(|h| h as Arc<dyn VoiceHandle>)
    }

    async fn disconnect(&self, _guild_id: GuildId) -> PlaybackResult<()> {
        *self.handle.lock() = None;
        Ok(())
    }
}
