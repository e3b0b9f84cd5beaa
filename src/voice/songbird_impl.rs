//! Songbird-backed implementation of the voice seam.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::{PlaybackError, PlaybackResult};
use crate::voice::{CompletionNotifier, PlayableSource, TrackControl, VoiceGateway, VoiceHandle};

pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>) -> anyhow::Result<Self> {
        // One pooled client for every stream input, reused across tracks.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self { manager, http })
    }

    fn handle_for(&self, guild_id: GuildId, call: Arc<Mutex<Call>>) -> Arc<dyn VoiceHandle> {
        Arc::new(SongbirdHandle {
            guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
        })
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<Arc<dyn VoiceHandle>> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(call) => Ok(self.handle_for(guild_id, call)),
            Err(e) => {
                warn!("Songbird join error in guild {}: {}", guild_id, e);
                Err(PlaybackError::VoiceJoinFailed)
            }
        }
    }

    fn get(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceHandle>> {
        self.manager
            .get(guild_id)
            .map(|call| self.handle_for(guild_id, call))
    }

    async fn disconnect(&self, guild_id: GuildId) -> PlaybackResult<()> {
        if self.manager.get(guild_id).is_some() {
            if let Err(e) = self.manager.remove(guild_id).await {
                // Teardown is best effort; a failed remove must not block
                // state cleanup.
                warn!("Songbird remove error in guild {}: {}", guild_id, e);
            }
        }
        Ok(())
    }
}

struct SongbirdHandle {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
}

#[async_trait]
impl VoiceHandle for SongbirdHandle {
    async fn current_channel(&self) -> Option<ChannelId> {
        let call = self.call.lock().await;
        call.current_channel().map(|c| ChannelId::from(c.0))
    }

    async fn is_ready(&self) -> bool {
        // The connection info is only populated once the voice websocket and
        // UDP handshake have both completed.
        let call = self.call.lock().await;
        call.current_connection().is_some()
    }

    async fn move_to(&self, channel_id: ChannelId) -> PlaybackResult<()> {
        // Joining while connected moves the existing call.
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Move failed in guild {}: {}", self.guild_id, e);
                PlaybackError::VoiceJoinFailed
            })
    }

    async fn disconnect(&self, force: bool) -> PlaybackResult<()> {
        if force {
            if let Err(e) = self.manager.remove(self.guild_id).await {
                warn!("Force disconnect error in guild {}: {}", self.guild_id, e);
            }
        } else {
            let mut call = self.call.lock().await;
            if let Err(e) = call.leave().await {
                warn!("Leave error in guild {}: {}", self.guild_id, e);
            }
        }
        Ok(())
    }

    async fn play(
        &self,
        source: PlayableSource,
        on_complete: CompletionNotifier,
    ) -> PlaybackResult<Arc<dyn TrackControl>> {
        debug!("🎧 Starting stream input for guild {}", self.guild_id);
        let request = HttpRequest::new(self.http.clone(), source.stream_url.clone());
        let input = Input::from(request);

        let mut call = self.call.lock().await;
        let track = call.play_input(input);
        let _ = track.set_volume(source.volume);

        // End and Error both funnel into the same completion notice; a track
        // that errors mid-stream advances exactly like one that finished.
        let fired = Arc::new(AtomicBool::new(false));
        for event in [TrackEvent::End, TrackEvent::Error] {
            track
                .add_event(
                    Event::Track(event),
                    TrackEndNotifier {
                        notifier: on_complete.clone(),
                        fired: fired.clone(),
                    },
                )
                .map_err(|e| {
                    error!("Failed to register track event: {}", e);
                    PlaybackError::Unavailable
                })?;
        }

        Ok(Arc::new(SongbirdTrack { handle: track }))
    }
}

struct SongbirdTrack {
    handle: TrackHandle,
}

impl TrackControl for SongbirdTrack {
    fn pause(&self) {
        let _ = self.handle.pause();
    }

    fn resume(&self) {
        let _ = self.handle.play();
    }

    fn stop(&self) {
        let _ = self.handle.stop();
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.handle.set_volume(volume);
    }
}

/// Posts the completion event once, no matter which track event fires first.
struct TrackEndNotifier {
    notifier: CompletionNotifier,
    fired: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.notifier.notify();
        }
        None
    }
}
