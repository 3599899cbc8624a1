use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::player::PlayerSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub idle_timeout_secs: u64,

    // Mensajes
    pub now_playing_ttl_secs: u64,
    pub error_message_ttl_secs: u64,

    // Extractor
    pub ytdlp_path: String,
    pub resolve_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de
    /// variables; `load` usa el entorno del proceso.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            command_prefix: lookup("COMMAND_PREFIX").unwrap_or(defaults.command_prefix),

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout_secs: parse_or(&lookup, "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,

            // Mensajes
            now_playing_ttl_secs: parse_or(
                &lookup,
                "NOW_PLAYING_TTL_SECS",
                defaults.now_playing_ttl_secs,
            )?,
            error_message_ttl_secs: parse_or(
                &lookup,
                "ERROR_MESSAGE_TTL_SECS",
                defaults.error_message_ttl_secs,
            )?,

            // Extractor
            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            resolve_timeout_secs: parse_or(
                &lookup,
                "RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout_secs,
            )?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and command prefix must not be empty
    /// - Volume must be between 0.0 and 1.0
    /// - Timeouts must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            volume: self.default_volume,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    pub fn now_playing_ttl(&self) -> Duration {
        Duration::from_secs(self.now_playing_ttl_secs)
    }

    pub fn error_message_ttl(&self) -> Duration {
        Duration::from_secs(self.error_message_ttl_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix `{}`\n  \
            Audio: {}% vol, {}s idle timeout\n  \
            Messages: now playing {}s, errors {}s\n  \
            Extractor: {} ({}s timeout)",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.idle_timeout_secs,
            self.now_playing_ttl_secs,
            self.error_message_ttl_secs,
            self.ytdlp_path,
            self.resolve_timeout_secs
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, value)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (el token no tiene default)
            discord_token: String::new(),
            command_prefix: "!".to_string(),

            // Audio
            default_volume: 0.5,
            idle_timeout_secs: 300, // 5 minutos

            // Mensajes
            now_playing_ttl_secs: 30,
            error_message_ttl_secs: 5,

            // Extractor
            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_only_token_is_set() {
        let config = Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "abc")])).unwrap();

        assert_eq!(config.command_prefix, "!");
        assert_eq!(
            config.player_settings(),
            PlayerSettings {
                volume: 0.5,
                idle_timeout: Duration::from_secs(300),
            }
        );
        assert_eq!(config.now_playing_ttl(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("DEFAULT_VOLUME", "0.8"),
            ("IDLE_TIMEOUT_SECS", " 100 "),
            ("COMMAND_PREFIX", "?"),
        ]))
        .unwrap();

        assert_eq!(config.default_volume, 0.8);
        assert_eq!(config.player_settings().idle_timeout, Duration::from_secs(100));
        assert_eq!(config.command_prefix, "?");
    }

    #[test]
    fn test_missing_token_fails() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("IDLE_TIMEOUT_SECS", "cinco"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("IDLE_TIMEOUT_SECS"));

        let loud = Config {
            discord_token: "abc".into(),
            default_volume: 1.5,
            ..Config::default()
        };
        assert!(loud.validate().is_err());

        let never_idle = Config {
            discord_token: "abc".into(),
            idle_timeout_secs: 0,
            ..Config::default()
        };
        assert!(never_idle.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".into(),
            ..Config::default()
        };
        assert!(!config.summary().contains("super-secret"));
    }
}
