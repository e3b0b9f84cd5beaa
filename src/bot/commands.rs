use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        volume_command(),
        remove_command(),
        cookies_command(),
    ]
}

/// Register commands globally (~1h propagation).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Register commands for a single guild (fast propagation, development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song (URL or search query)")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL or search terms",
            )
            .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause playback")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume playback")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop music and clear the queue")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current music queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the currently playing song")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Set playback volume (0-100)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "volume", "Volume percentage")
                .min_int_value(0)
                .max_int_value(100)
                .required(true),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Remove a song from the queue by position")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "position",
                "1-based queue position",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn cookies_command() -> CreateCommand {
    CreateCommand::new("cookies")
        .description("Manage resolver cookies (Admin only)")
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "status",
            "Show cookie file status",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "refresh",
            "Reload the cookie file from disk",
        ))
}
