use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{GuildId, UserId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use super::{
    queue::{playback_queue, Dequeued, PlaybackQueue, QueueItem, QueueSender, TrackSummary},
    signal::{CompletionSignal, PlaybackEnd},
    sink::{ActiveStream, NotificationChannel, VoiceSink},
};
use crate::error::{SinkError, TeardownReason};

/// Mapa guild -> player que comparte el registro con los run-loops.
pub(crate) type PlayerMap<K> = DashMap<GuildId, Arc<GuildPlayer<K>>>;

/// Parámetros que el core consume de la configuración.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    /// Volumen de salida, fracción entre 0.0 y 1.0.
    pub volume: f32,
    /// Tiempo que un player espera con la cola vacía antes de destruirse.
    pub idle_timeout: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 0.5,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Destroyed,
}

#[derive(Debug)]
struct PlayerStatus {
    state: PlayerState,
    current: Option<TrackSummary>,
}

/// Handle de un player de guild.
///
/// Construirlo no arranca nada: [`GuildPlayer::new`] devuelve el handle y
/// el [`PlayerLoop`], y [`GuildPlayer::start`] lanza el run-loop como tarea
/// independiente. Todo lo que hacen los comandos (encolar, saltar, pausar,
/// destruir) pasa por aquí.
pub struct GuildPlayer<K: VoiceSink> {
    id: u64,
    guild_id: GuildId,
    queue: QueueSender<K::Stream>,
    sink: Arc<K>,
    shutdown: CancellationToken,
    status: Arc<RwLock<PlayerStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    finished: CancellationToken,
}

/// El run-loop de un guild: saca items de la cola y los reproduce de a uno.
pub struct PlayerLoop<K: VoiceSink> {
    id: u64,
    guild_id: GuildId,
    queue: PlaybackQueue<K::Stream>,
    sink: Arc<K>,
    notifier: Arc<dyn NotificationChannel>,
    settings: PlayerSettings,
    shutdown: CancellationToken,
    status: Arc<RwLock<PlayerStatus>>,
    owner: Option<Weak<PlayerMap<K>>>,
    // Se suelta al terminar el teardown (o si la tarea muere)
    _finished: DropGuard,
}

impl<K: VoiceSink> GuildPlayer<K> {
    pub fn new(
        id: u64,
        guild_id: GuildId,
        sink: Arc<K>,
        notifier: Arc<dyn NotificationChannel>,
        settings: PlayerSettings,
    ) -> (Self, PlayerLoop<K>) {
        let (sender, queue) = playback_queue();
        let shutdown = CancellationToken::new();
        let finished = CancellationToken::new();
        let status = Arc::new(RwLock::new(PlayerStatus {
            state: PlayerState::Idle,
            current: None,
        }));

        let player = Self {
            id,
            guild_id,
            queue: sender,
            sink: sink.clone(),
            shutdown: shutdown.clone(),
            status: status.clone(),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
            finished: finished.clone(),
        };

        let run = PlayerLoop {
            id,
            guild_id,
            queue,
            sink,
            notifier,
            settings,
            shutdown,
            status,
            owner: None,
            _finished: finished.drop_guard(),
        };

        (player, run)
    }

    /// Lanza el run-loop en el runtime actual.
    pub fn start(&self, run: PlayerLoop<K>) {
        debug_assert_eq!(self.id, run.id, "el run-loop pertenece a otro player");

        self.started.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(run.run());
        if let Some(previous) = self.task.lock().replace(handle) {
            warn!("Player {} del guild {} arrancado dos veces", self.id, self.guild_id);
            previous.abort();
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Encola al final. Sólo falla si el run-loop ya terminó; en ese caso
    /// el item vuelve intacto para que el registro lo reintente.
    ///
    /// Los productores pasan por [`PlayerRegistry::enqueue`], que toma el
    /// mismo lock que usa el run-loop para quitarse por inactividad.
    ///
    /// [`PlayerRegistry::enqueue`]: super::registry::PlayerRegistry::enqueue
    pub(crate) fn enqueue(&self, item: QueueItem<K::Stream>) -> Result<(), QueueItem<K::Stream>> {
        debug!("➕ Encolando {:?} en guild {}", item, self.guild_id);
        self.queue.enqueue(item)
    }

    /// Corta el item actual; el run-loop lo ve como una finalización normal
    /// y pasa al siguiente. La cola no se toca.
    pub fn skip(&self) {
        info!("⏭️ Skip en guild {}", self.guild_id);
        self.sink.stop();
    }

    pub fn pause(&self) {
        info!("⏸️ Pausa en guild {}", self.guild_id);
        self.sink.pause();
    }

    pub fn resume(&self) {
        info!("▶️ Reanudando en guild {}", self.guild_id);
        self.sink.resume();
    }

    pub fn state(&self) -> PlayerState {
        self.status.read().state
    }

    pub fn now_playing(&self) -> Option<TrackSummary> {
        self.status.read().current.clone()
    }

    /// Items esperando, sin contar el que suena.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Destruye el player aunque esté reproduciendo.
    ///
    /// Detiene el stream actual (lo que desbloquea la espera de
    /// finalización), cancela el run-loop y espera a que termine su
    /// teardown. Llamarlo más de una vez es inofensivo.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.sink.stop();

        if !self.started.load(Ordering::SeqCst) {
            // Nunca arrancó: nadie más va a desconectar
            self.sink.disconnect().await;
            self.status.write().state = PlayerState::Destroyed;
            return;
        }

        self.join().await;
    }

    /// Espera a que el run-loop termine y complete su teardown, lo haya
    /// pedido quien sea. Varios llamadores pueden esperar a la vez.
    pub async fn join(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("El run-loop del guild {} terminó con error: {:?}", self.guild_id, e);
            }
        }

        // Otro llamador puede tener el JoinHandle; el guard del loop avisa igual
        self.finished.cancelled().await;
    }
}

impl<K: VoiceSink> PlayerLoop<K> {
    /// Ata el run-loop a un registro: al destruirse se quitará de él.
    pub(crate) fn owned_by(mut self, players: &Arc<PlayerMap<K>>) -> Self {
        self.owner = Some(Arc::downgrade(players));
        self
    }

    pub async fn run(mut self) {
        info!("🎛️ Player {} iniciado para guild {}", self.id, self.guild_id);

        let reason = loop {
            self.set_status(PlayerState::Idle, None);

            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                next = self.queue.dequeue(self.settings.idle_timeout) => Some(next),
            };

            let item = match next {
                None | Some(Dequeued::Closed) => break TeardownReason::Requested,
                Some(Dequeued::Item(item)) => item,
                Some(Dequeued::TimedOut) => {
                    if self.detach_if_idle() {
                        break TeardownReason::IdleTimeout;
                    }
                    debug!("Llegó un item justo al expirar en guild {}, sigo", self.guild_id);
                    continue;
                }
            };

            if let Err(e) = self.play(item).await {
                error!("❌ Conexión de voz inutilizable en guild {}: {}", self.guild_id, e);
                break TeardownReason::SinkFailed(e.to_string());
            }
        };

        self.teardown(reason).await;
    }

    /// Reproduce un item hasta que termina, se salta o se destruye el player.
    ///
    /// Sólo devuelve error si el sink no pudo empezar a reproducir; los
    /// fallos del item en sí se notifican y el loop sigue.
    async fn play(&mut self, item: QueueItem<K::Stream>) -> Result<(), SinkError> {
        let summary = item.summary();
        let requested_by = item.requested_by();

        let opened = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Ok(()),
            opened = item.open_stream() => opened,
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("⚠️ No se pudo abrir {} en guild {}: {}", summary.title, self.guild_id, e);
                self.notify_error(format!("No se pudo reproducir **{}**: {}", summary.title, e));
                return Ok(());
            }
        };

        let (signal, wait) = CompletionSignal::channel();
        let handle = self.sink.play(stream, self.settings.volume, signal).await?;
        let active = ActiveStream::new(handle, summary.title.clone());

        let waited = (Utc::now() - item.added_at()).num_seconds().max(0);
        info!(
            "🎵 Reproduciendo {} en guild {} (esperó {}s en cola)",
            summary.title, self.guild_id, waited
        );
        self.set_status(PlayerState::Playing, Some(summary.clone()));
        self.notify_now_playing(summary.clone(), requested_by);

        let end = tokio::select! {
            end = wait.wait() => end,
            _ = self.shutdown.cancelled() => {
                self.sink.stop();
                PlaybackEnd::Stopped
            }
        };

        drop(active);

        match end {
            PlaybackEnd::Finished => debug!("✅ Terminó {} en guild {}", summary.title, self.guild_id),
            PlaybackEnd::Stopped => debug!("⏹️ Detenido {} en guild {}", summary.title, self.guild_id),
            PlaybackEnd::Failed(why) => {
                warn!("⚠️ Falló la reproducción en guild {}: {}", self.guild_id, why);
                self.notify_error(format!("Error durante la reproducción: {}", why));
            }
        }

        Ok(())
    }

    /// Intenta quitarse del registro tras expirar la espera.
    ///
    /// La comprobación de cola vacía se hace con el shard del mapa tomado,
    /// el mismo lock que sostiene el registro al encolar, así que un item
    /// nunca cae en un player que ya decidió morir.
    fn detach_if_idle(&self) -> bool {
        let Some(players) = self.owner.as_ref().and_then(Weak::upgrade) else {
            return self.queue.is_empty();
        };

        let queue = &self.queue;
        let removed = players.remove_if(&self.guild_id, |_, player| {
            player.id == self.id && queue.is_empty()
        });

        let still_registered = players
            .get(&self.guild_id)
            .is_some_and(|player| player.id == self.id);

        removed.is_some() || !still_registered
    }

    async fn teardown(mut self, reason: TeardownReason) {
        if let Some(players) = self.owner.as_ref().and_then(Weak::upgrade) {
            players.remove_if(&self.guild_id, |_, player| player.id == self.id);
        }

        let leftovers = self.queue.close();
        if !leftovers.is_empty() {
            warn!(
                "🗑️ Descartando {} items pendientes en guild {}",
                leftovers.len(),
                self.guild_id
            );
        }

        self.sink.stop();
        self.sink.disconnect().await;

        if let TeardownReason::SinkFailed(why) = &reason {
            self.notify_error(format!("Se perdió la conexión de voz: {}", why));
        }

        self.set_status(PlayerState::Destroyed, None);
        info!("👋 Player {} del guild {} destruido por {}", self.id, self.guild_id, reason);
    }

    fn set_status(&self, state: PlayerState, current: Option<TrackSummary>) {
        let mut status = self.status.write();
        status.state = state;
        status.current = current;
    }

    fn notify_now_playing(&self, summary: TrackSummary, requested_by: UserId) {
        let notifier = self.notifier.clone();
        let guild_id = self.guild_id;

        tokio::spawn(async move {
            if let Err(e) = notifier.send_now_playing(&summary, requested_by).await {
                warn!("No se pudo anunciar {} en guild {}: {:?}", summary.title, guild_id, e);
            }
        });
    }

    fn notify_error(&self, message: String) {
        let notifier = self.notifier.clone();
        let guild_id = self.guild_id;

        tokio::spawn(async move {
            if let Err(e) = notifier.send_error(&message).await {
                warn!("No se pudo enviar error al guild {}: {:?}", guild_id, e);
            }
        });
    }
}
