use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Motivo por el que terminó la reproducción de un item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// El stream se agotó de forma natural.
    Finished,
    /// Alguien llamó `stop()` en el sink (skip o teardown).
    Stopped,
    /// El sink reportó un error durante la reproducción.
    Failed(String),
}

/// Lado emisor de la señal de finalización.
///
/// Se entrega al `VoiceSink` junto con el stream. Puede clonarse y
/// dispararse desde cualquier hilo (los callbacks de songbird corren en sus
/// propios workers); sólo el primer disparo cuenta, los siguientes se ignoran.
/// La señal nunca toca el estado del run-loop, sólo lo despierta.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<Mutex<Option<oneshot::Sender<PlaybackEnd>>>>,
}

/// Lado receptor, propiedad exclusiva del run-loop.
#[derive(Debug)]
pub struct CompletionWait {
    rx: oneshot::Receiver<PlaybackEnd>,
}

impl CompletionSignal {
    pub fn channel() -> (CompletionSignal, CompletionWait) {
        let (tx, rx) = oneshot::channel();
        (
            CompletionSignal {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            CompletionWait { rx },
        )
    }

    /// Dispara la señal. Devuelve `false` si ya se había disparado antes.
    pub fn complete(&self, reason: PlaybackEnd) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // Si el receptor ya no existe el run-loop terminó; no hay a quién avisar
                let _ = tx.send(reason);
                true
            }
            None => {
                debug!("Señal de finalización repetida ignorada: {:?}", reason);
                false
            }
        }
    }
}

impl CompletionWait {
    /// Espera el fin de la reproducción.
    ///
    /// Si el sink soltó todas las copias de la señal sin dispararla, el
    /// item se da por fallido en vez de bloquear el guild para siempre.
    pub async fn wait(self) -> PlaybackEnd {
        self.rx
            .await
            .unwrap_or_else(|_| PlaybackEnd::Failed("el sink descartó la señal de finalización".into()))
    }
}
