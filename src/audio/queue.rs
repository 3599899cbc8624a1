use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::StreamOpenError;

/// Datos de presentación de un track (lo que se muestra en "now playing").
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub title: String,
    pub duration: Option<Duration>,
    pub uploader: String,
    pub uploader_url: Option<String>,
    pub url: String,
    pub thumbnail: Option<String>,
}

impl TrackSummary {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            duration: None,
            uploader: "Unknown".to_string(),
            uploader_url: None,
            url: url.into(),
            thumbnail: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>, uploader_url: Option<String>) -> Self {
        self.uploader = uploader.into();
        self.uploader_url = uploader_url;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }
}

/// Algo que puede reproducirse: produce un resumen y, sólo cuando toca
/// sonar, un stream de audio vivo del tipo `S` que consume el sink.
#[async_trait]
pub trait Playable<S>: Send + Sync {
    fn summary(&self) -> TrackSummary;

    async fn open_stream(&self) -> Result<S, StreamOpenError>;
}

/// Una petición de reproducción ya resuelta. Inmutable una vez encolada.
pub struct QueueItem<S> {
    source: Box<dyn Playable<S>>,
    requested_by: UserId,
    added_at: DateTime<Utc>,
}

impl<S> QueueItem<S> {
    pub fn new(source: impl Playable<S> + 'static, requested_by: UserId) -> Self {
        Self {
            source: Box::new(source),
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> TrackSummary {
        self.source.summary()
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Abre el stream. Es la única operación cara y se hace en el run-loop.
    pub async fn open_stream(&self) -> Result<S, StreamOpenError> {
        self.source.open_stream().await
    }
}

impl<S> fmt::Debug for QueueItem<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("title", &self.source.summary().title)
            .field("requested_by", &self.requested_by)
            .field("added_at", &self.added_at)
            .finish()
    }
}

/// Resultado de esperar el siguiente item.
#[derive(Debug)]
pub enum Dequeued<S> {
    Item(QueueItem<S>),
    TimedOut,
    Closed,
}

/// Crea una cola FIFO sin límite: un productor clonable y un único consumidor.
pub fn playback_queue<S>() -> (QueueSender<S>, PlaybackQueue<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));

    (
        QueueSender {
            tx,
            pending: pending.clone(),
        },
        PlaybackQueue { rx, pending },
    )
}

/// Lado productor. Cualquier handler de comandos del guild puede tener uno.
pub struct QueueSender<S> {
    tx: mpsc::UnboundedSender<QueueItem<S>>,
    pending: Arc<AtomicUsize>,
}

impl<S> Clone for QueueSender<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pending: self.pending.clone(),
        }
    }
}

impl<S> QueueSender<S> {
    /// Agrega al final. Nunca bloquea; sólo falla si el consumidor ya no
    /// existe, y en ese caso devuelve el item intacto.
    pub fn enqueue(&self, item: QueueItem<S>) -> Result<(), QueueItem<S>> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(item).map_err(|mpsc::error::SendError(item)| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            item
        })
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Lado consumidor, propiedad exclusiva del run-loop del guild.
pub struct PlaybackQueue<S> {
    rx: mpsc::UnboundedReceiver<QueueItem<S>>,
    pending: Arc<AtomicUsize>,
}

impl<S> PlaybackQueue<S> {
    /// Saca la cabeza de la cola, esperando como máximo `idle` si está vacía.
    ///
    /// Es cancel-safe: si el future se descarta antes de terminar no se
    /// pierde ningún item.
    pub async fn dequeue(&mut self, idle: Duration) -> Dequeued<S> {
        match tokio::time::timeout(idle, self.rx.recv()).await {
            Ok(Some(item)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Dequeued::Item(item)
            }
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::TimedOut,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cierra la cola para nuevos envíos y devuelve lo que quedaba.
    pub fn close(&mut self) -> Vec<QueueItem<S>> {
        self.rx.close();

        let mut leftovers = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            leftovers.push(item);
        }

        if !leftovers.is_empty() {
            debug!("Cola cerrada con {} items sin reproducir", leftovers.len());
        }
        leftovers
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Track de prueba cuyo "stream" es simplemente su título.
    pub(crate) struct StaticTrack {
        pub summary: TrackSummary,
        pub fail_open: bool,
    }

    impl StaticTrack {
        pub(crate) fn item(title: &str) -> QueueItem<String> {
            QueueItem::new(
                StaticTrack {
                    summary: TrackSummary::new(title, format!("https://example.com/{}", title)),
                    fail_open: false,
                },
                UserId::new(42),
            )
        }

        pub(crate) fn broken(title: &str) -> QueueItem<String> {
            QueueItem::new(
                StaticTrack {
                    summary: TrackSummary::new(title, format!("https://example.com/{}", title)),
                    fail_open: true,
                },
                UserId::new(42),
            )
        }
    }

    #[async_trait]
    impl Playable<String> for StaticTrack {
        fn summary(&self) -> TrackSummary {
            self.summary.clone()
        }

        async fn open_stream(&self) -> Result<String, StreamOpenError> {
            if self.fail_open {
                Err(StreamOpenError::NoStreamUrl(self.summary.title.clone()))
            } else {
                Ok(self.summary.title.clone())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_preserves_insertion_order() {
        let (tx, mut queue) = playback_queue();
        let producer = tx.clone();

        tx.enqueue(StaticTrack::item("a")).unwrap();
        producer.enqueue(StaticTrack::item("b")).unwrap();
        tx.enqueue(StaticTrack::item("c")).unwrap();
        assert_eq!(queue.len(), 3);

        let mut titles = Vec::new();
        while let Dequeued::Item(item) = queue.dequeue(Duration::from_secs(1)).await {
            titles.push(item.summary().title);
        }

        assert_eq!(titles, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_queue_times_out() {
        let (_tx, mut queue) = playback_queue::<String>();
        let started = tokio::time::Instant::now();

        assert!(matches!(
            queue.dequeue(Duration::from_secs(100)).await,
            Dequeued::TimedOut
        ));
        assert!(started.elapsed() >= Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_consumer_wakes_on_enqueue() {
        let (tx, mut queue) = playback_queue();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.enqueue(StaticTrack::item("late")).unwrap();
        });

        match queue.dequeue(Duration::from_secs(100)).await {
            Dequeued::Item(item) => assert_eq!(item.summary().title, "late"),
            other => panic!("se esperaba un item, llegó {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_and_returns_item() {
        let (tx, mut queue) = playback_queue();
        tx.enqueue(StaticTrack::item("left")).unwrap();

        let leftovers = queue.close();
        assert_eq!(leftovers.len(), 1);
        assert!(tx.is_closed());

        let rejected = tx.enqueue(StaticTrack::item("late")).unwrap_err();
        assert_eq!(rejected.summary().title, "late");
        assert_eq!(tx.len(), 0);
    }

    #[tokio::test]
    async fn test_stream_is_opened_lazily() {
        let item = StaticTrack::broken("bad");
        // Encolar no abre nada; el fallo aparece recién al abrir
        assert_eq!(item.summary().title, "bad");
        assert!(item.open_stream().await.is_err());
    }
}
