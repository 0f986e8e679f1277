use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: f32, // Porcentaje
    pub max_queue_size: usize,

    // Búsqueda
    pub search_results_count: usize,
    pub autoplay_search_count: usize,

    // Binarios externos
    pub ffmpeg_path: String,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            // Búsqueda
            search_results_count: env_or("SEARCH_RESULTS_COUNT", defaults.search_results_count)?,
            autoplay_search_count: env_or("AUTOPLAY_SEARCH_COUNT", defaults.autoplay_search_count)?,

            // Binarios externos
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must not be negative (values above 100% are allowed)
    /// - Search counts and the queue limit must be greater than 0
    /// - Binary paths must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || !self.default_volume.is_finite() {
            anyhow::bail!("Default volume must be a non-negative percentage, got: {}", self.default_volume);
        }

        if self.search_results_count == 0 {
            anyhow::bail!("Search results count must be greater than 0");
        }

        if self.autoplay_search_count == 0 {
            anyhow::bail!("Autoplay search count must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.ffmpeg_path.trim().is_empty() || self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("ffmpeg and yt-dlp paths must not be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Audio: {}% default volume, {} max queue\n  \
            Search: {} results, {} autoplay candidates\n  \
            Binaries: ffmpeg={}, yt-dlp={}",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.default_volume,
            self.max_queue_size,
            self.search_results_count,
            self.autoplay_search_count,
            self.ffmpeg_path,
            self.ytdlp_path,
        )
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, val)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            default_volume: 10.0,
            max_queue_size: 1000,

            search_results_count: 10,
            autoplay_search_count: 50,

            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::registry::PlayerSettings;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(PlayerSettings::from(&config), PlayerSettings::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let negative = Config {
            default_volume: -1.0,
            ..Config::default()
        };
        assert!(negative.validate().is_err());

        let no_results = Config {
            search_results_count: 0,
            ..Config::default()
        };
        assert!(no_results.validate().is_err());

        let no_ffmpeg = Config {
            ffmpeg_path: " ".to_string(),
            ..Config::default()
        };
        assert!(no_ffmpeg.validate().is_err());
    }

    #[test]
    fn test_volume_above_hundred_is_allowed() {
        let loud = Config {
            default_volume: 150.0,
            ..Config::default()
        };
        assert!(loud.validate().is_ok());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "secret-token".to_string(),
            guild_id: Some(42),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("secret-token"));
        assert!(summary.contains("guild 42"));
    }
}
