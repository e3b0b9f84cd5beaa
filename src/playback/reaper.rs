//! Idle-disconnect timers.
//!
//! One cancellable timer per guild, stored next to the state it protects so
//! `Stop`/`drop_guild` can tear it down deterministically. Firing only posts
//! an event; the scheduler re-verifies the guild is still idle before
//! disconnecting, because state may have changed between arming and firing.

use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::playback::PlaybackEvent;

pub struct InactivityReaper {
    timers: DashMap<GuildId, JoinHandle<()>>,
    events: UnboundedSender<PlaybackEvent>,
    delay: Duration,
}

impl InactivityReaper {
    pub fn new(events: UnboundedSender<PlaybackEvent>, delay: Duration) -> Self {
        Self {
            timers: DashMap::new(),
            events,
            delay,
        }
    }

    /// Schedule a disconnect check, replacing any timer already armed for
    /// the guild.
    pub fn arm(&self, guild_id: GuildId) {
        let events = self.events.clone();
        let delay = self.delay;
        debug!("⏲️ Arming inactivity timer ({:?}) for guild {}", delay, guild_id);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(PlaybackEvent::InactivityTimeout { guild_id });
        });
        if let Some(previous) = self.timers.insert(guild_id, timer) {
            previous.abort();
        }
    }

    /// Must run before any playback (re)start for the guild, so a pending
    /// timer can never fire during a legitimate resume.
    pub fn cancel(&self, guild_id: GuildId) {
        if let Some((_, timer)) = self.timers.remove(&guild_id) {
            timer.abort();
            debug!("⏲️ Cancelled inactivity timer for guild {}", guild_id);
        }
    }

    pub fn is_armed(&self, guild_id: GuildId) -> bool {
        self.timers
            .get(&guild_id)
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const DELAY: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_the_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reaper = InactivityReaper::new(tx, DELAY);
        let guild = GuildId::new(1);

        reaper.arm(guild);
        assert!(reaper.is_armed(guild));

        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            PlaybackEvent::InactivityTimeout { guild_id: guild }
        );
        assert!(rx.try_recv().is_err(), "timer must fire exactly once");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reaper = InactivityReaper::new(tx, DELAY);
        let guild = GuildId::new(1);

        reaper.arm(guild);
        reaper.cancel(guild);
        assert!(!reaper.is_armed(guild));

        tokio::time::sleep(DELAY * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reaper = InactivityReaper::new(tx, DELAY);
        let guild = GuildId::new(1);

        reaper.arm(guild);
        tokio::time::sleep(DELAY / 2).await;
        reaper.arm(guild);

        // The original deadline passes; only the replacement may fire.
        tokio::time::sleep(DELAY / 2 + Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(DELAY).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            PlaybackEvent::InactivityTimeout { guild_id: guild }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timers_are_independent_per_guild() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reaper = InactivityReaper::new(tx, DELAY);

        reaper.arm(GuildId::new(1));
        reaper.arm(GuildId::new(2));
        reaper.cancel(GuildId::new(1));

        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            PlaybackEvent::InactivityTimeout {
                guild_id: GuildId::new(2)
            }
        );
        assert!(rx.try_recv().is_err());
    }
}
