use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, MessageId, UserId},
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::{
    audio::{queue::TrackSummary, sink::NotificationChannel},
    config::Config,
    ui::embeds,
};

/// Notificaciones del player hacia el canal de texto donde se pidió la
/// primera canción. Los mensajes se borran solos pasado su TTL.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
    now_playing_ttl: Duration,
    error_ttl: Duration,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId, config: &Config) -> Self {
        Self {
            http,
            channel_id,
            now_playing_ttl: config.now_playing_ttl(),
            error_ttl: config.error_message_ttl(),
        }
    }
}

#[async_trait]
impl NotificationChannel for ChannelNotifier {
    async fn send_now_playing(&self, summary: &TrackSummary, requested_by: UserId) -> Result<()> {
        let embed = embeds::create_now_playing_embed(summary, requested_by);
        let message = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;

        delete_after(self.http.clone(), self.channel_id, message.id, self.now_playing_ttl);
        Ok(())
    }

    async fn send_error(&self, message: &str) -> Result<()> {
        let embed = embeds::create_error_embed(message);
        let sent = self
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;

        delete_after(self.http.clone(), self.channel_id, sent.id, self.error_ttl);
        Ok(())
    }
}

/// Borra un mensaje en segundo plano tras `ttl`.
pub fn delete_after(http: Arc<Http>, channel_id: ChannelId, message_id: MessageId, ttl: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        if let Err(e) = channel_id.delete_message(&http, message_id).await {
            debug!("No se pudo borrar el mensaje {}: {:?}", message_id, e);
        }
    });
}
