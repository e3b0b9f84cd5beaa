//! # Bot Module
//!
//! Serenity event handler wiring the Discord gateway to the playback engine.
//!
//! [`JukeboxBot`] owns the [`PlaybackScheduler`] and translates gateway
//! events into engine calls:
//!
//! - `ready` registers slash commands and starts the now-playing announcer
//! - `interaction_create` dispatches commands through [`handlers`]
//! - `voice_state_update` detects external disconnects so the engine can
//!   drop the guild's in-memory state

use serenity::{
    all::{Context, EventHandler, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    http::Http,
    model::id::GuildId,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    config::Config,
    playback::{NowPlayingNotice, PlaybackScheduler},
    sources::CookieStore,
    ui::embeds,
};

pub struct JukeboxBot {
    config: Arc<Config>,
    pub scheduler: Arc<PlaybackScheduler>,
    pub cookies: Arc<CookieStore>,
    /// Taken by the first `ready`; the announcer task owns it afterwards.
    notices: parking_lot::Mutex<Option<UnboundedReceiver<NowPlayingNotice>>>,
}

impl JukeboxBot {
    pub fn new(
        config: Config,
        scheduler: Arc<PlaybackScheduler>,
        cookies: Arc<CookieStore>,
        notices: UnboundedReceiver<NowPlayingNotice>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            cookies,
            notices: parking_lot::Mutex::new(Some(notices)),
        }
    }

    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                info!("📝 Registering commands for dev guild {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registering global commands");
                commands::register_global_commands(ctx).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }

        // `ready` can fire again on reconnect; the announcer only starts once.
        if let Some(notices) = self.notices.lock().take() {
            let http = ctx.http.clone();
            tokio::spawn(async move { announce_loop(http, notices).await });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error handling command: {:?}", e);
            }
        }
    }

    /// Watch for the bot being disconnected out-of-band (kick, channel
    /// deleted, voice server outage). The engine drops the guild's state and
    /// timers; the next command starts from scratch.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            return;
        }

        let was_connected = old.and_then(|state| state.channel_id).is_some();
        if was_connected && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                warn!("🔌 Bot was disconnected from voice in guild {}", guild_id);
                self.scheduler.handle_external_disconnect(guild_id);
            }
        }
    }
}

/// Forward now-playing notices into their guilds' announce channels.
/// Send failures (missing permissions, deleted channel) are not errors the
/// engine cares about.
async fn announce_loop(http: Arc<Http>, mut notices: UnboundedReceiver<NowPlayingNotice>) {
    while let Some(notice) = notices.recv().await {
        let message = CreateMessage::new()
            .embed(embeds::now_playing_embed(&notice.track, notice.volume));
        if let Err(e) = notice.channel_id.send_message(&http, message).await {
            debug!(
                "Could not announce in channel {}: {}",
                notice.channel_id, e
            );
        }
    }
}
