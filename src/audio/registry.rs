use serenity::model::id::{GuildId, UserId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::{
    player::{GuildPlayer, PlayerMap, PlayerSettings, PlayerState},
    queue::{QueueItem, TrackSummary},
    sink::{NotificationChannel, VoiceSink},
};
use crate::{error::ResolutionError, sources::Resolver};

/// Lo necesario para construir el player de un guild.
pub struct PlayerContext<K: VoiceSink> {
    pub sink: Arc<K>,
    pub notifier: Arc<dyn NotificationChannel>,
}

/// Registro guild -> player. A lo sumo un player por guild.
///
/// Es propiedad del servicio de más alto nivel y se inyecta en los
/// handlers de comandos; no hay estado global. Crear y quitar entradas
/// son las únicas mutaciones, y los run-loops se quitan a sí mismos sólo a
/// través de él.
pub struct PlayerRegistry<K: VoiceSink> {
    players: Arc<PlayerMap<K>>,
    settings: PlayerSettings,
    next_id: AtomicU64,
}

impl<K: VoiceSink> PlayerRegistry<K> {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            players: Arc::new(PlayerMap::new()),
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer<K>>> {
        self.players.get(&guild_id).map(|player| player.clone())
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.players.contains_key(&guild_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Devuelve el player del guild o crea uno con el contexto dado. El
    /// contexto sólo se construye si hace falta.
    pub fn get_or_create(
        &self,
        guild_id: GuildId,
        context: impl FnOnce() -> PlayerContext<K>,
    ) -> Arc<GuildPlayer<K>> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| self.spawn(guild_id, context()))
            .clone()
    }

    /// Encola en el player del guild, creándolo si no existe. Nunca falla.
    ///
    /// El envío se hace con la entrada del mapa tomada, así que no puede
    /// cruzarse con un player que se está quitando por inactividad.
    pub fn enqueue(
        &self,
        guild_id: GuildId,
        item: QueueItem<K::Stream>,
        context: impl Fn() -> PlayerContext<K>,
    ) -> Arc<GuildPlayer<K>> {
        let mut item = item;

        loop {
            let entry = self
                .players
                .entry(guild_id)
                .or_insert_with(|| self.spawn(guild_id, context()));

            match entry.enqueue(item) {
                Ok(()) => return entry.clone(),
                Err(rejected) => {
                    let stale = entry.id();
                    drop(entry);
                    warn!("♻️ Player {} del guild {} ya no acepta items, reemplazando", stale, guild_id);
                    self.players
                        .remove_if(&guild_id, |_, player| player.id() == stale && player.is_closed());
                    item = rejected;
                }
            }
        }
    }

    /// Resuelve `query` y encola el resultado en el player del guild.
    ///
    /// La resolución termina antes de tocar el registro: si falla, el guild
    /// queda como estaba y `context` nunca se llama. Devuelve el player y el
    /// resumen de lo encolado.
    pub async fn resolve_and_enqueue(
        &self,
        resolver: &dyn Resolver<K::Stream>,
        guild_id: GuildId,
        query: &str,
        requested_by: UserId,
        context: impl Fn() -> PlayerContext<K>,
    ) -> Result<(Arc<GuildPlayer<K>>, TrackSummary), ResolutionError> {
        let item = resolver.resolve(query, requested_by).await?;
        let summary = item.summary();
        Ok((self.enqueue(guild_id, item, context), summary))
    }

    /// Quita la entrada del guild. Idempotente.
    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer<K>>> {
        self.players.remove(&guild_id).map(|(_, player)| player)
    }

    /// Salta el item actual. Devuelve `false` si el guild no tiene player.
    pub fn skip(&self, guild_id: GuildId) -> bool {
        self.with_player(guild_id, |player| player.skip())
    }

    pub fn pause(&self, guild_id: GuildId) -> bool {
        self.with_player(guild_id, |player| player.pause())
    }

    pub fn resume(&self, guild_id: GuildId) -> bool {
        self.with_player(guild_id, |player| player.resume())
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<TrackSummary> {
        self.get(guild_id).and_then(|player| player.now_playing())
    }

    pub fn state(&self, guild_id: GuildId) -> Option<PlayerState> {
        self.get(guild_id).map(|player| player.state())
    }

    pub fn queued(&self, guild_id: GuildId) -> usize {
        self.get(guild_id).map_or(0, |player| player.queued())
    }

    /// Detiene lo que suene, destruye el player y espera su teardown.
    /// Devuelve `false` si no había player para el guild.
    pub async fn stop_and_teardown(&self, guild_id: GuildId) -> bool {
        match self.remove(guild_id) {
            Some(player) => {
                info!("⏹️ Teardown solicitado para guild {}", guild_id);
                player.shutdown().await;
                true
            }
            None => {
                debug!("No hay player que detener en guild {}", guild_id);
                false
            }
        }
    }

    /// Destruye todos los players; se usa al apagar el bot.
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|entry| *entry.key()).collect();
        info!("🛑 Destruyendo {} players", guilds.len());

        for guild_id in guilds {
            self.stop_and_teardown(guild_id).await;
        }
    }

    fn with_player(&self, guild_id: GuildId, action: impl FnOnce(&GuildPlayer<K>)) -> bool {
        match self.get(guild_id) {
            Some(player) => {
                action(&player);
                true
            }
            None => false,
        }
    }

    fn spawn(&self, guild_id: GuildId, context: PlayerContext<K>) -> Arc<GuildPlayer<K>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (player, run) = GuildPlayer::new(
            id,
            guild_id,
            context.sink,
            context.notifier,
            self.settings.clone(),
        );

        let player = Arc::new(player);
        player.start(run.owned_by(&self.players));
        info!("🆕 Player {} creado para guild {}", id, guild_id);
        player
    }
}
