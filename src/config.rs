use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // dev-only command registration

    // Playback
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Resolver
    pub cookie_file: PathBuf,

    // Lifecycles
    pub inactivity_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Playback
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Resolver
            cookie_file: std::env::var("COOKIE_FILE")
                .unwrap_or_else(|_| "youtube_cookies.txt".to_string())
                .into(),

            // Lifecycles
            inactivity_timeout_secs: std::env::var("INACTIVITY_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            connect_timeout_secs: std::env::var("CONNECT_TIMEOUT")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            handshake_timeout_secs: std::env::var("HANDSHAKE_TIMEOUT")
                .unwrap_or_else(|_| "12".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks that catch common mistakes before the bot starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.inactivity_timeout_secs == 0 {
            anyhow::bail!("Inactivity timeout must be greater than 0");
        }

        if self.connect_timeout_secs == 0 || self.handshake_timeout_secs == 0 {
            anyhow::bail!("Voice timeouts must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Playback defaults
            default_volume: 0.5,
            max_queue_size: 1000,

            // Resolver defaults
            cookie_file: "youtube_cookies.txt".into(),

            // Lifecycle defaults
            inactivity_timeout_secs: 300,
            connect_timeout_secs: 20,
            handshake_timeout_secs: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_volume_is_rejected() {
        let config = Config {
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_size_is_rejected() {
        let config = Config {
            max_queue_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
