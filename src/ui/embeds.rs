//! Discord embeds for playback feedback.

use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::playback::{Enqueued, QueueSnapshot, TrackRequest};
use crate::sources::CookieStatus;

/// Standard color palette for the bot.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
}

const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Tracks shown per queue embed before "... and N more".
const QUEUE_PAGE: usize = 10;

pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => {
            let total = d.as_secs();
            format!("{}:{:02}", total / 60, total % 60)
        }
        None => "Unknown".to_string(),
    }
}

pub fn track_added_embed(enqueued: &Enqueued) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Added to Queue")
        .description(format!("**{}**", enqueued.track.title))
        .color(colors::SUCCESS_GREEN)
        .field("Position", enqueued.position.to_string(), true)
        .field("Duration", format_duration(enqueued.track.duration), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(thumbnail) = &enqueued.track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

pub fn now_playing_embed(track: &TrackRequest, volume: f32) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("Duration", format_duration(track.duration), true)
        .field("Volume", format!("{}%", (volume * 100.0) as u8), true)
        .field("Requested by", format!("<@{}>", track.requested_by), true)
        .url(&track.webpage_url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

pub fn queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Music Queue")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(current) = &snapshot.current {
        embed = embed.field("Now Playing", format!("**{}**", current.title), false);
    }

    let up_next = if snapshot.upcoming.is_empty() {
        "Queue is empty".to_string()
    } else {
        queue_lines(&snapshot.upcoming).join("\n")
    };
    embed.field("Up Next", up_next, false)
}

pub fn cookie_status_embed(status: &CookieStatus, path: &std::path::Path) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🍪 Cookie Status")
        .color(colors::INFO_BLUE)
        .field(
            "Cookie File",
            if status.present { "✅ Found" } else { "❌ Not Found" },
            false,
        )
        .field("File Path", path.display().to_string(), false)
        .field("Refreshes", status.refreshes.to_string(), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(age) = status.age_seconds {
        embed = embed.field("File Age", format!("{}h {}m", age / 3600, (age % 3600) / 60), true);
    }

    embed
}

fn queue_lines(upcoming: &[TrackRequest]) -> Vec<String> {
    let mut lines: Vec<String> = upcoming
        .iter()
        .take(QUEUE_PAGE)
        .enumerate()
        .map(|(idx, track)| {
            format!(
                "{}. {} ({})",
                idx + 1,
                track.title,
                format_duration(track.duration)
            )
        })
        .collect();

    if upcoming.len() > QUEUE_PAGE {
        lines.push(format!("... and {} more", upcoming.len() - QUEUE_PAGE));
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serenity::model::id::UserId;

    fn track(title: &str) -> TrackRequest {
        TrackRequest {
            title: title.to_string(),
            source: title.to_string(),
            stream_url: None,
            webpage_url: format!("https://yt/{title}"),
            duration: Some(Duration::from_secs(125)),
            thumbnail: None,
            requested_by: UserId::new(7),
            requested_at: Utc::now(),
        }
    }

    #[test]
    fn durations_format_as_minutes_and_seconds() {
        assert_eq!(format_duration(Some(Duration::from_secs(125))), "2:05");
        assert_eq!(format_duration(Some(Duration::from_secs(59))), "0:59");
        assert_eq!(format_duration(Some(Duration::from_secs(3600))), "60:00");
        assert_eq!(format_duration(None), "Unknown");
    }

    #[test]
    fn long_queues_are_truncated_with_a_tail_count() {
        let upcoming: Vec<_> = (0..13).map(|i| track(&format!("t{i}"))).collect();

        let lines = queue_lines(&upcoming);

        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "1. t0 (2:05)");
        assert_eq!(lines[10], "... and 3 more");
    }

    #[test]
    fn short_queues_list_every_track() {
        let upcoming: Vec<_> = (0..2).map(|i| track(&format!("t{i}"))).collect();
        assert_eq!(queue_lines(&upcoming).len(), 2);
    }
}
