use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::scheduler::Notifier;

/// Envía los avisos del planificador al último canal de texto donde se usó `/tts`.
pub struct DiscordNotifier {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl DiscordNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    pub fn forget_guild(&self, guild_id: GuildId) {
        self.channels.remove(&guild_id);
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, guild_id: GuildId, message: &str) {
        let Some(channel_id) = self.channels.get(&guild_id).map(|c| *c) else {
            debug!("Sin canal para avisos en guild {}: {}", guild_id, message);
            return;
        };

        // Se envía fuera de la sección crítica de la guild
        let http = self.http.clone();
        let message = message.to_string();
        tokio::spawn(async move {
            if let Err(e) = channel_id.say(&http, message).await {
                warn!("⚠️ No se pudo enviar aviso a {}: {:?}", channel_id, e);
            }
        });
    }
}
