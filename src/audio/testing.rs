//! Dobles de prueba para el core: un sink que registra lo que le piden y
//! un notificador que guarda los mensajes.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    queue::TrackSummary,
    signal::{CompletionSignal, PlaybackEnd},
    sink::{NotificationChannel, PlaybackHandle, VoiceSink},
};
use crate::error::SinkError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Play(String),
    Stop,
    Pause,
    Resume,
    Disconnect,
    Release(String),
}

#[derive(Default)]
struct FakeState {
    events: Mutex<Vec<SinkEvent>>,
    current: Mutex<Option<CompletionSignal>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail_play: AtomicBool,
    volumes: Mutex<Vec<f32>>,
}

/// Sink falso. Las señales de finalización se disparan desde un hilo del
/// sistema operativo, como lo haría la librería de audio real.
#[derive(Clone, Default)]
pub struct FakeSink {
    state: Arc<FakeState>,
}

pub struct FakeHandle {
    title: String,
    state: Arc<FakeState>,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.state.fail_play.store(true, Ordering::SeqCst);
        sink
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.events.lock().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Play(title) => Some(title),
                _ => None,
            })
            .collect()
    }

    /// Volumen recibido en cada `play`, en orden.
    pub fn volumes(&self) -> Vec<f32> {
        self.state.volumes.lock().clone()
    }

    pub fn count(&self, wanted: &SinkEvent) -> usize {
        self.events().iter().filter(|event| *event == wanted).count()
    }

    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.state.current.lock().is_some()
    }

    /// Termina el item actual de forma natural.
    pub fn finish_current(&self) -> bool {
        self.fire(PlaybackEnd::Finished)
    }

    pub fn fail_current(&self, why: &str) -> bool {
        self.fire(PlaybackEnd::Failed(why.to_string()))
    }

    fn fire(&self, reason: PlaybackEnd) -> bool {
        let Some(signal) = self.state.current.lock().take() else {
            return false;
        };
        std::thread::spawn(move || signal.complete(reason))
            .join()
            .unwrap_or(false)
    }

    fn record(&self, event: SinkEvent) {
        self.state.events.lock().push(event);
    }
}

#[async_trait]
impl VoiceSink for FakeSink {
    type Stream = String;
    type Handle = FakeHandle;

    async fn play(
        &self,
        stream: String,
        volume: f32,
        on_complete: CompletionSignal,
    ) -> Result<FakeHandle, SinkError> {
        if self.state.fail_play.load(Ordering::SeqCst) {
            return Err(SinkError::NotConnected);
        }

        self.record(SinkEvent::Play(stream.clone()));
        self.state.volumes.lock().push(volume);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        *self.state.current.lock() = Some(on_complete);

        Ok(FakeHandle {
            title: stream,
            state: self.state.clone(),
        })
    }

    fn stop(&self) {
        self.record(SinkEvent::Stop);
        self.fire(PlaybackEnd::Stopped);
    }

    fn pause(&self) {
        self.record(SinkEvent::Pause);
    }

    fn resume(&self) {
        self.record(SinkEvent::Resume);
    }

    async fn disconnect(&self) {
        self.record(SinkEvent::Disconnect);
    }
}

impl PlaybackHandle for FakeHandle {
    fn release(self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state
            .events
            .lock()
            .push(SinkEvent::Release(self.title));
    }
}

/// Notificador que guarda todo lo enviado.
#[derive(Default)]
pub struct RecordingNotifier {
    pub now_playing: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    async fn send_now_playing(&self, summary: &TrackSummary, _requested_by: UserId) -> Result<()> {
        self.now_playing.lock().push(summary.title.clone());
        Ok(())
    }

    async fn send_error(&self, message: &str) -> Result<()> {
        self.errors.lock().push(message.to_string());
        Ok(())
    }
}

/// Deja correr a las demás tareas hasta que se cumpla `cond`.
pub async fn settle(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    // Última oportunidad con un pequeño avance de reloj
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(cond(), "la condición no se cumplió a tiempo");
}
