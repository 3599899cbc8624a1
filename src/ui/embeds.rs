use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
    model::id::UserId,
};
use std::time::Duration;

use crate::audio::queue::TrackSummary;

/// Paleta de colores del bot
pub mod colors {
    use serenity::all::Colour;

    pub const NOW_PLAYING: Colour = Colour::BLURPLE;
    pub const QUEUED: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

const STANDARD_FOOTER: &str = "🎵 guildtune";

/// Embed de "Now playing" con los datos del track.
pub fn create_now_playing_embed(track: &TrackSummary, requested_by: UserId) -> CreateEmbed {
    let uploader = match &track.uploader_url {
        Some(url) => format!("[{}]({})", track.uploader, url),
        None => track.uploader.clone(),
    };

    let mut embed = CreateEmbed::new()
        .title("Now playing")
        .description(format!("```css\n{}\n```", track.title))
        .color(colors::NOW_PLAYING)
        .field("Duración", describe_duration(track.duration), true)
        .field("Solicitado por", format!("<@{}>", requested_by), true)
        .field("Uploader", uploader, true)
        .field("URL", format!("[Click]({})", track.url), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Confirmación de que un track quedó en cola.
pub fn create_queued_embed(track: &TrackSummary, position: usize) -> CreateEmbed {
    let position = if position == 0 {
        "a continuación".to_string()
    } else {
        format!("#{}", position + 1)
    };

    CreateEmbed::new()
        .title("➕ Agregado a la cola")
        .description(format!("**{}**", track.title))
        .color(colors::QUEUED)
        .field("Posición", position, true)
        .field("Duración", describe_duration(track.duration), true)
        .url(&track.url)
}

pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("❌ Error")
        .description(message)
        .color(colors::ERROR_RED)
}

fn describe_duration(duration: Option<Duration>) -> String {
    match duration.map(format_duration) {
        Some(text) if !text.is_empty() => text,
        _ => "🔴 En vivo".to_string(),
    }
}

/// Duración legible: `1 hours, 2 minutes, 5 seconds`. Omite las unidades
/// en cero.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);

    [(days, "days"), (hours, "hours"), (minutes, "minutes"), (seconds, "seconds")]
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| format!("{} {}", amount, unit))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration_skips_zero_units() {
        assert_eq!(format_duration(Duration::from_secs(205)), "3 minutes, 25 seconds");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1 hours");
        assert_eq!(
            format_duration(Duration::from_secs(90_061)),
            "1 days, 1 hours, 1 minutes, 1 seconds"
        );
        assert_eq!(format_duration(Duration::ZERO), "");
    }

    #[test]
    fn test_missing_duration_reads_as_live() {
        assert_eq!(describe_duration(None), "🔴 En vivo");
        assert_eq!(describe_duration(Some(Duration::ZERO)), "🔴 En vivo");
        assert_eq!(describe_duration(Some(Duration::from_secs(2))), "2 seconds");
    }

    #[test]
    fn test_now_playing_embed_contents() {
        let track = TrackSummary::new("Song", "https://yt/watch?v=1")
            .with_uploader("Band", Some("https://yt/band".into()));

        let embed = serde_json::to_value(create_now_playing_embed(&track, UserId::new(7))).unwrap();

        assert_eq!(embed["title"], "Now playing");
        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["value"] == "<@7>"));
        assert!(fields.iter().any(|f| f["value"] == "[Band](https://yt/band)"));
    }
}
