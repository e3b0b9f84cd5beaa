//! Typed failures for the playback engine.
//!
//! Every error the command layer can see is one of these variants, so the
//! user-facing wording stays stable even when the underlying extractor or
//! voice transport changes its own messages. Raw subprocess/stderr text is
//! logged, never surfaced.

use thiserror::Error;

pub type PlaybackResult<T> = Result<T, PlaybackError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("could not join the voice channel")]
    VoiceJoinFailed,

    #[error("no results found")]
    NotFound,

    #[error("the upstream service blocked the request")]
    AccessBlocked,

    #[error("the track is unavailable")]
    Unavailable,

    #[error("the track is private")]
    Private,

    #[error("the track is age restricted")]
    AgeRestricted,

    #[error("queue position {0} does not exist")]
    InvalidPosition(usize),

    #[error("volume {0} is outside 0.0..=1.0")]
    InvalidVolume(f32),

    #[error("nothing is playing")]
    QueueEmpty,

    #[error("the queue is full ({0} tracks)")]
    QueueFull(usize),
}

impl PlaybackError {
    /// Message shown to the member who ran the command.
    pub fn user_message(&self) -> String {
        match self {
            Self::VoiceJoinFailed => {
                "❌ Failed to join the voice channel. Please try again.".to_string()
            }
            Self::NotFound => "❌ No results found or unable to extract audio.".to_string(),
            Self::AccessBlocked => {
                "❌ The source is blocking requests right now. Try again in a bit.".to_string()
            }
            Self::Unavailable => "❌ That track is unavailable.".to_string(),
            Self::Private => "❌ That track is private.".to_string(),
            Self::AgeRestricted => "❌ That track is age restricted.".to_string(),
            Self::InvalidPosition(_) => "❌ Invalid queue position!".to_string(),
            Self::InvalidVolume(_) => "❌ Volume must be between 0 and 100!".to_string(),
            Self::QueueEmpty => "❌ Nothing is playing!".to_string(),
            Self::QueueFull(max) => format!("❌ The queue is full (max {max} tracks)."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_never_leak_internals() {
        let errors = [
            PlaybackError::VoiceJoinFailed,
            PlaybackError::AccessBlocked,
            PlaybackError::InvalidPosition(99),
            PlaybackError::QueueFull(100),
        ];
        for err in errors {
            let msg = err.user_message();
            assert!(msg.starts_with('❌'), "message should be user-facing: {msg}");
            assert!(!msg.contains("yt-dlp"));
        }
    }
}
