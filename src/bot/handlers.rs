//! Slash-command dispatch.
//!
//! Handlers are a thin shim between interactions and the scheduler: pull the
//! options out, call the one scheduler operation, render the typed result.
//! Every engine failure reaches the member as a stable
//! [`PlaybackError::user_message`], never as raw error text.

use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::info;

use crate::{
    bot::JukeboxBot,
    playback::EnqueueRequest,
    ui::embeds,
};

pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("command used outside a guild"))?;

    info!(
        "📝 Command /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, command, bot, guild_id).await?,
        "cookies" => handle_cookies(ctx, command, bot).await?,
        _ => respond_text(ctx, &command, "❌ Unknown command", true).await?,
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("query option missing"))?
        .to_string();

    // Resolution can take seconds; defer so the interaction does not expire.
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new().content("❌ You must be in a voice channel!"),
            )
            .await?;
        return Ok(());
    };

    let request = EnqueueRequest {
        guild_id,
        voice_channel_id,
        announce_channel_id: Some(command.channel_id),
        query,
        requested_by: command.user.id,
    };

    let response = match bot.scheduler.enqueue(request).await {
        Ok(enqueued) => EditInteractionResponse::new().embed(embeds::track_added_embed(&enqueued)),
        Err(e) => EditInteractionResponse::new().content(e.user_message()),
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.pause(guild_id) {
        Ok(()) => respond_text(ctx, &command, "⏸️ Paused!", false).await,
        Err(e) => respond_text(ctx, &command, &e.user_message(), true).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.resume(guild_id) {
        Ok(()) => respond_text(ctx, &command, "▶️ Resumed!", false).await,
        Err(e) => respond_text(ctx, &command, &e.user_message(), true).await,
    }
}

async fn handle_skip(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.skip(guild_id) {
        Ok(skipped) => {
            respond_text(ctx, &command, &format!("⏭️ Skipped **{}**!", skipped.title), false).await
        }
        Err(e) => respond_text(ctx, &command, &e.user_message(), true).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.scheduler.stop(guild_id).await {
        Ok(()) => respond_text(ctx, &command, "⏹️ Stopped and disconnected!", false).await,
        Err(e) => respond_text(ctx, &command, &e.user_message(), true).await,
    }
}

async fn handle_queue(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot.scheduler.queue(guild_id);
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::queue_embed(&snapshot)),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let volume = bot.scheduler.queue(guild_id).volume;
    match bot.scheduler.now_playing(guild_id) {
        Some(track) => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::now_playing_embed(&track, volume)),
                    ),
                )
                .await?;
            Ok(())
        }
        None => respond_text(ctx, &command, "❌ Nothing is playing!", true).await,
    }
}

async fn handle_volume(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let percent = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "volume")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("volume option missing"))?;

    match bot.scheduler.set_volume(guild_id, percent as f32 / 100.0) {
        Ok(()) => {
            respond_text(ctx, &command, &format!("🔊 Volume set to {percent}%"), false).await
        }
        Err(e) => respond_text(ctx, &command, &e.user_message(), true).await,
    }
}

async fn handle_remove(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "position")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("position option missing"))?;

    match bot.scheduler.remove(guild_id, position.max(0) as usize) {
        Ok(removed) => {
            respond_text(
                ctx,
                &command,
                &format!("🗑️ Removed **{}** from the queue", removed.title),
                false,
            )
            .await
        }
        Err(e) => respond_text(ctx, &command, &e.user_message(), true).await,
    }
}

async fn handle_cookies(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    if !is_admin(&command) {
        return respond_text(
            ctx,
            &command,
            "❌ You need administrator permissions to use this command!",
            true,
        )
        .await;
    }

    let subcommand = command
        .data
        .options
        .first()
        .map(|opt| opt.name.as_str())
        .unwrap_or("status");

    match subcommand {
        "refresh" => match bot.cookies.refresh(true).await {
            Ok(()) => respond_text(ctx, &command, "✅ Cookies refreshed", true).await,
            Err(e) => {
                respond_text(ctx, &command, &format!("❌ Cookie refresh failed: {e}"), true).await
            }
        },
        _ => {
            let embed = embeds::cookie_status_embed(&bot.cookies.status(), bot.cookies.path());
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new().embed(embed).ephemeral(true),
                    ),
                )
                .await?;
            Ok(())
        }
    }
}

async fn respond_text(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|state| state.channel_id)
}

fn is_admin(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map(|permissions| permissions.administrator())
        .unwrap_or(false)
}
