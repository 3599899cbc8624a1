use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::Input,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::{
    signal::{CompletionSignal, PlaybackEnd},
    sink::{PlaybackHandle, VoiceSink},
};
use crate::error::SinkError;

/// Qué sink usó por última vez la conexión de voz de un guild.
///
/// Players sucesivos del mismo guild comparten el `Call` de songbird. Un
/// player viejo que termina su teardown sólo desconecta si nadie reprodujo
/// después que él.
#[derive(Debug, Default)]
struct VoiceOwner(Option<u64>);

impl VoiceOwner {
    fn claim(&mut self, token: u64) {
        self.0 = Some(token);
    }

    /// `true` si `token` puede soltar la conexión.
    fn release(&mut self, token: u64) -> bool {
        match self.0 {
            Some(owner) if owner != token => false,
            _ => {
                self.0 = None;
                true
            }
        }
    }
}

/// Sesiones de voz por guild, compartidas por todos los `SongbirdSink`.
#[derive(Default)]
pub struct VoiceSessions {
    guilds: DashMap<GuildId, Arc<tokio::sync::Mutex<VoiceOwner>>>,
    next_token: AtomicU64,
}

impl VoiceSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<VoiceOwner>> {
        self.guilds.entry(guild_id).or_default().clone()
    }

    fn token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Conexión de voz de un guild sobre songbird.
///
/// El `Call` se busca en cada `play` y, si se perdió, se vuelve a unir al
/// canal con el que se creó el sink.
pub struct SongbirdSink {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
    session: Arc<tokio::sync::Mutex<VoiceOwner>>,
    token: u64,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(
        manager: Arc<Songbird>,
        sessions: &VoiceSessions,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Self {
        Self {
            guild_id,
            channel_id,
            manager,
            session: sessions.session(guild_id),
            token: sessions.token(),
            current: Mutex::new(None),
        }
    }

    async fn connected_call(&self) -> Result<Arc<tokio::sync::Mutex<Call>>, SinkError> {
        if let Some(call) = self.manager.get(self.guild_id) {
            if call.lock().await.current_channel().is_some() {
                return Ok(call);
            }
        }

        info!("🔊 Uniéndose a <#{}> en guild {}", self.channel_id, self.guild_id);
        let call = self
            .manager
            .join(self.guild_id, self.channel_id)
            .await
            .map_err(|e| SinkError::Connect(format!("{:?}", e)))?;

        if call.lock().await.current_channel().is_none() {
            return Err(SinkError::NotConnected);
        }
        Ok(call)
    }
}

/// `true` si songbird sigue conectado a un canal de voz en el guild.
///
/// Los eventos de "el bot salió de voz" pueden llegar después de que un
/// player nuevo ya volvió a unirse; sólo cuentan si la llamada actual de
/// verdad no tiene canal.
pub async fn still_in_voice(manager: Option<Arc<Songbird>>, guild_id: GuildId) -> bool {
    let Some(call) = manager.and_then(|manager| manager.get(guild_id)) else {
        return false;
    };
    let connected = call.lock().await.current_channel().is_some();
    connected
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    type Stream = Input;
    type Handle = TrackHandle;

    async fn play(
        &self,
        stream: Input,
        volume: f32,
        on_complete: CompletionSignal,
    ) -> Result<TrackHandle, SinkError> {
        let handle = {
            // Con la sesión tomada un teardown viejo no puede desconectar en medio
            let mut owner = self.session.lock().await;
            owner.claim(self.token);

            let call = self.connected_call().await?;
            let mut call = call.lock().await;
            call.play_input(stream)
        };

        if let Err(e) = handle.set_volume(volume) {
            warn!("No se pudo ajustar volumen en guild {}: {:?}", self.guild_id, e);
        }

        let notifier = TrackEndNotifier {
            guild_id: self.guild_id,
            signal: on_complete.clone(),
        };

        // Si el track ya terminó no acepta eventos: se avisa a mano para
        // que el run-loop no espere para siempre
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                debug!("Track terminado antes de registrar eventos: {:?}", e);
                on_complete.complete(PlaybackEnd::Failed(format!("{:?}", e)));
                break;
            }
        }

        *self.current.lock() = Some(handle.clone());
        Ok(handle)
    }

    fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }
    }

    fn pause(&self) {
        if let Some(handle) = self.current.lock().as_ref() {
            let _ = handle.pause();
        }
    }

    fn resume(&self) {
        if let Some(handle) = self.current.lock().as_ref() {
            let _ = handle.play();
        }
    }

    async fn disconnect(&self) {
        self.stop();

        let mut owner = self.session.lock().await;
        if !owner.release(self.token) {
            debug!("La conexión de voz del guild {} ya es de otro player", self.guild_id);
            return;
        }

        // Sin llamada activa songbird devuelve error; no importa
        if let Err(e) = self.manager.remove(self.guild_id).await {
            debug!("Desconexión en guild {} sin efecto: {:?}", self.guild_id, e);
        }
    }
}

impl PlaybackHandle for TrackHandle {
    fn release(self) {
        // Detener el track suelta el input y el proceso/conexión que lo alimenta
        let _ = self.stop();
    }
}

/// Traduce los eventos de fin/error del track a la señal del run-loop.
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    signal: CompletionSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(track_list) => track_list
                .first()
                .map(|(state, _handle)| playback_end(&state.playing))
                .unwrap_or(PlaybackEnd::Finished),
            _ => PlaybackEnd::Finished,
        };

        if self.signal.complete(reason.clone()) {
            debug!("🔚 Track terminado en guild {}: {:?}", self.guild_id, reason);
        }

        None
    }
}

fn playback_end(mode: &PlayMode) -> PlaybackEnd {
    match mode {
        PlayMode::Stop => PlaybackEnd::Stopped,
        PlayMode::Errored(e) => PlaybackEnd::Failed(format!("{:?}", e)),
        _ => PlaybackEnd::Finished,
    }
}
