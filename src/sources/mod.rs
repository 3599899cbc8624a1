pub mod youtube;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::{audio::queue::QueueItem, error::ResolutionError};

pub use youtube::{YtDlpResolver, YtDlpTrack};

/// Convierte un término de búsqueda o URL en algo reproducible.
///
/// El core no mira dentro del item: sólo le pide resumen y stream.
#[async_trait]
pub trait Resolver<S>: Send + Sync {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<QueueItem<S>, ResolutionError>;
}
