use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use tracing::debug;

use super::{queue::TrackSummary, signal::CompletionSignal};
use crate::error::SinkError;

/// Capacidad de salida de audio de un guild (la conexión de voz).
///
/// `stop`, `pause`, `resume` y `disconnect` son idempotentes: llamarlos
/// cuando no aplican no hace nada.
#[async_trait]
pub trait VoiceSink: Send + Sync + 'static {
    /// Stream de audio vivo que acepta el sink.
    type Stream: Send + 'static;
    /// Handle de la reproducción en curso; se libera al salir de `Playing`.
    type Handle: PlaybackHandle;

    /// Empieza a reproducir. `on_complete` se dispara exactamente una vez,
    /// por fin natural o por `stop()`.
    async fn play(
        &self,
        stream: Self::Stream,
        volume: f32,
        on_complete: CompletionSignal,
    ) -> Result<Self::Handle, SinkError>;

    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    async fn disconnect(&self);
}

/// Libera los recursos del stream (procesos, sockets, buffers).
pub trait PlaybackHandle: Send + 'static {
    fn release(self);
}

/// Canal de notificaciones hacia los usuarios. Best-effort: el core nunca
/// espera ni propaga sus fallos.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_now_playing(&self, summary: &TrackSummary, requested_by: UserId) -> Result<()>;

    async fn send_error(&self, message: &str) -> Result<()>;
}

/// Guard del stream en reproducción: al soltarse libera el handle, ya sea
/// que el item terminó, se saltó o el player se destruyó.
pub struct ActiveStream<H: PlaybackHandle> {
    handle: Option<H>,
    title: String,
}

impl<H: PlaybackHandle> ActiveStream<H> {
    pub fn new(handle: H, title: impl Into<String>) -> Self {
        Self {
            handle: Some(handle),
            title: title.into(),
        }
    }
}

impl<H: PlaybackHandle> Drop for ActiveStream<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.release();
            debug!("🧹 Recursos liberados para: {}", self.title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountingHandle(Arc<AtomicUsize>);

    impl PlaybackHandle for CountingHandle {
        fn release(self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_active_stream_releases_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let _active = ActiveStream::new(CountingHandle(released.clone()), "a");
            assert_eq!(released.load(Ordering::SeqCst), 0);
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_active_stream_releases_during_unwind() {
        let released = Arc::new(AtomicUsize::new(0));
        let inner = released.clone();

        let outcome = std::panic::catch_unwind(move || {
            let _active = ActiveStream::new(CountingHandle(inner), "b");
            panic!("fallo en medio de la reproducción");
        });

        assert!(outcome.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
