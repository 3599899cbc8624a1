//! # Bot Module
//!
//! Discord glue for guildtune.
//!
//! This module wires Serenity events into the audio core:
//! - Prefix commands from text channels ([`commands`])
//! - Voice connection management through Songbird
//! - Player teardown when the bot is disconnected from voice
//! - Text-channel notifications for the players ([`notifier`])
//!
//! ## Architecture
//!
//! [`GuildTuneBot`] implements Serenity's [`EventHandler`]. It owns the
//! [`PlayerRegistry`] shared with `main` (for shutdown) and the
//! [`Resolver`] that turns queries into queue items.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
};
use songbird::input::Input;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

pub mod commands;
pub mod notifier;

use crate::{
    audio::{
        registry::PlayerRegistry,
        songbird_sink::{self, SongbirdSink, VoiceSessions},
    },
    config::Config,
    sources::Resolver,
};

/// Main Discord event handler.
pub struct GuildTuneBot {
    /// Configuration loaded from the environment
    pub config: Arc<Config>,
    /// One player per guild with queued or playing audio
    pub registry: Arc<PlayerRegistry<SongbirdSink>>,
    /// Query to playable item resolution
    pub resolver: Arc<dyn Resolver<Input>>,
    /// Which player last used each guild's voice connection
    pub voice_sessions: Arc<VoiceSessions>,
}

impl GuildTuneBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<PlayerRegistry<SongbirdSink>>,
        resolver: Arc<dyn Resolver<Input>>,
    ) -> Self {
        Self {
            config,
            registry,
            resolver,
            voice_sessions: Arc::new(VoiceSessions::new()),
        }
    }

    /// Connects the bot to a voice channel.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<Mutex<songbird::Call>>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        match manager.join(guild_id, channel_id).await {
            Ok(call) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(call)
            }
            Err(e) => {
                error!("Error al obtener handler de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Disconnects the bot from voice in a guild without a player.
    ///
    /// Guilds with a player go through [`PlayerRegistry::stop_and_teardown`],
    /// which disconnects as part of the teardown.
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if manager.get(guild_id).is_none() {
            return Ok(());
        }

        manager.remove(guild_id).await?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for GuildTuneBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = commands::handle_message(&ctx, &msg, self).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    /// Tears the guild's player down when the bot leaves voice by any means
    /// other than the player itself (kicked, moved out, channel deleted).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Un evento atrasado no debe destruir al player que ya se reconectó
        if songbird_sink::still_in_voice(songbird::get(&ctx).await, guild_id).await {
            debug!("Evento de salida de voz atrasado en guild {}, ignorado", guild_id);
            return;
        }

        info!("🔌 Bot desconectado en guild {}", guild_id);

        // No-op si el player ya se destruyó solo
        self.registry.stop_and_teardown(guild_id).await;
    }
}
