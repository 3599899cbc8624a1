use anyhow::Result;
use serenity::{
    builder::CreateMessage,
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{info, warn};

use super::{notifier::ChannelNotifier, GuildTuneBot};
use crate::{
    audio::{registry::PlayerContext, songbird_sink::SongbirdSink},
    ui::embeds,
};

/// Comandos de texto reconocidos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Skip,
    Stop,
    Pause,
    Resume,
    Join,
    Disconnect,
    NowPlaying,
    Unknown(String),
}

impl Command {
    /// Interpreta un mensaje. `None` si no empieza con el prefijo.
    pub fn parse(prefix: &str, content: &str) -> Option<Command> {
        let body = content.trim().strip_prefix(prefix)?;
        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "" => return None,
            "play" | "p" => Command::Play(args.to_string()),
            "skip" => Command::Skip,
            "stop" => Command::Stop,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "join" | "connect" => Command::Join,
            "disconnect" | "leave" => Command::Disconnect,
            "np" | "nowplaying" => Command::NowPlaying,
            other => Command::Unknown(other.to_string()),
        };

        Some(command)
    }
}

/// Maneja un mensaje de texto de un guild
pub async fn handle_message(ctx: &Context, msg: &Message, bot: &GuildTuneBot) -> Result<()> {
    let Some(command) = Command::parse(&bot.config.command_prefix, &msg.content) else {
        return Ok(());
    };
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    info!("📝 Comando {:?} usado por {} en guild {}", command, msg.author.name, guild_id);

    match command {
        Command::Play(query) => handle_play(ctx, msg, bot, guild_id, &query).await?,
        Command::Skip => {
            if bot.registry.skip(guild_id) {
                msg.react(&ctx.http, '⏭').await?;
            }
        }
        Command::Stop | Command::Disconnect => {
            if !bot.registry.stop_and_teardown(guild_id).await {
                // Sin player puede quedar una conexión abierta por `join`
                bot.leave_voice_channel(ctx, guild_id).await?;
            }
            msg.react(&ctx.http, '⏹').await?;
        }
        Command::Pause => {
            if bot.registry.pause(guild_id) {
                msg.react(&ctx.http, '⏸').await?;
            }
        }
        Command::Resume => {
            if bot.registry.resume(guild_id) {
                msg.react(&ctx.http, '▶').await?;
            }
        }
        Command::Join => {
            let channel_id = get_user_voice_channel(ctx, guild_id, msg.author.id)?;
            bot.join_voice_channel(ctx, guild_id, channel_id).await?;
            reply(ctx, bot, msg.channel_id, format!("🔊 Conectado a <#{}>", channel_id)).await?;
        }
        Command::NowPlaying => match bot.registry.now_playing(guild_id) {
            Some(track) => {
                let embed = embeds::create_now_playing_embed(&track, msg.author.id);
                msg.channel_id
                    .send_message(&ctx.http, CreateMessage::new().embed(embed))
                    .await?;
            }
            None => reply(ctx, bot, msg.channel_id, "No estoy reproduciendo nada".to_string()).await?,
        },
        Command::Unknown(_) => {}
    }

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    msg: &Message,
    bot: &GuildTuneBot,
    guild_id: GuildId,
    query: &str,
) -> Result<()> {
    if query.is_empty() {
        let usage = format!("Uso: `{}play <búsqueda o URL>`", bot.config.command_prefix);
        return reply(ctx, bot, msg.channel_id, usage).await;
    }

    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

    // El canal se resuelve ya, pero la conexión se hace recién al reproducir:
    // si la búsqueda falla el bot no queda en voz sin player
    let channel_id = match current_voice_channel(&manager, guild_id).await {
        Some(channel_id) => channel_id,
        None => get_user_voice_channel(ctx, guild_id, msg.author.id)?,
    };

    let typing = msg.channel_id.start_typing(&ctx.http);
    let queued = bot
        .registry
        .resolve_and_enqueue(
            bot.resolver.as_ref(),
            guild_id,
            query,
            msg.author.id,
            || PlayerContext {
                sink: Arc::new(SongbirdSink::new(
                    manager.clone(),
                    &bot.voice_sessions,
                    guild_id,
                    channel_id,
                )),
                notifier: Arc::new(ChannelNotifier::new(ctx.http.clone(), msg.channel_id, &bot.config)),
            },
        )
        .await;
    typing.stop();

    let (player, summary) = match queued {
        Ok(queued) => queued,
        Err(e) => {
            warn!("⚠️ No se pudo resolver {} en guild {}: {}", query, guild_id, e);
            let text = format!("No puedo reproducir `{}`: {}", query, e);
            return reply(ctx, bot, msg.channel_id, text).await;
        }
    };

    info!("➕ {} en cola para guild {}", summary.title, guild_id);
    let position = player.queued().saturating_sub(1);
    let embed = embeds::create_queued_embed(&summary, position);
    let sent = msg
        .channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    super::notifier::delete_after(
        ctx.http.clone(),
        msg.channel_id,
        sent.id,
        bot.config.now_playing_ttl(),
    );

    Ok(())
}

/// Canal en el que songbird ya está conectado en el guild, si lo hay.
async fn current_voice_channel(manager: &Songbird, guild_id: GuildId) -> Option<ChannelId> {
    let call = manager.get(guild_id)?;
    let channel = call.lock().await.current_channel();
    channel.map(|channel| ChannelId::from(channel.0))
}

/// Responde con un texto que se borra solo.
async fn reply(ctx: &Context, bot: &GuildTuneBot, channel_id: ChannelId, content: String) -> Result<()> {
    let sent = channel_id.say(&ctx.http, content).await?;
    super::notifier::delete_after(ctx.http.clone(), channel_id, sent.id, bot.config.error_message_ttl());
    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_play_keeps_query() {
        assert_eq!(
            Command::parse("!", "!play never gonna give you up"),
            Some(Command::Play("never gonna give you up".into()))
        );
        assert_eq!(Command::parse("!", "!p  lofi "), Some(Command::Play("lofi".into())));
        assert_eq!(Command::parse("!", "!play"), Some(Command::Play(String::new())));
    }

    #[test]
    fn test_parse_aliases_and_case() {
        assert_eq!(Command::parse("!", "!SKIP"), Some(Command::Skip));
        assert_eq!(Command::parse("!", "!connect"), Some(Command::Join));
        assert_eq!(Command::parse("!", "!leave"), Some(Command::Disconnect));
        assert_eq!(Command::parse("?", "?np"), Some(Command::NowPlaying));
    }

    #[test]
    fn test_parse_ignores_unprefixed_and_bare_prefix() {
        assert_eq!(Command::parse("!", "play something"), None);
        assert_eq!(Command::parse("!", "!"), None);
        assert_eq!(Command::parse("!", "!dance"), Some(Command::Unknown("dance".into())));
    }
}
