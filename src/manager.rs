//! Registro de controladores de sesión, uno por servidor.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::audio::AudioBackend;
use crate::error::Result;
use crate::player::{PlayerEvent, PlayerHandle, PlayerSettings};
use crate::sources::Resolver;

/// Dueño de todos los controladores activos.
///
/// Cada sesión (servidor) tiene a lo sumo un controlador; se crea en el
/// primer uso y se desmonta con el leave hard. Las sesiones son
/// independientes entre sí: ninguna operación acá bloquea a otra.
pub struct PlayerManager {
    players: DashMap<GuildId, PlayerHandle>,
    settings: PlayerSettings,
    resolver: Arc<Resolver>,
    backend: Arc<dyn AudioBackend>,
    events: mpsc::UnboundedSender<(GuildId, PlayerEvent)>,
}

impl PlayerManager {
    pub fn new(
        settings: PlayerSettings,
        resolver: Arc<Resolver>,
        backend: Arc<dyn AudioBackend>,
        events: mpsc::UnboundedSender<(GuildId, PlayerEvent)>,
    ) -> Self {
        Self {
            players: DashMap::new(),
            settings,
            resolver,
            backend,
            events,
        }
    }

    /// Controlador de la sesión, creándolo si todavía no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> PlayerHandle {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Controlador creado para {}", guild_id);
                PlayerHandle::spawn(
                    guild_id,
                    self.settings.clone(),
                    Arc::clone(&self.resolver),
                    Arc::clone(&self.backend),
                    self.events.clone(),
                )
            })
            .clone()
    }

    /// Controlador de la sesión, solo si ya existe.
    pub fn get(&self, guild_id: GuildId) -> Option<PlayerHandle> {
        self.players.get(&guild_id).map(|entry| entry.clone())
    }

    pub fn session_count(&self) -> usize {
        self.players.len()
    }

    /// Leave hard: desmonta el controlador y lo saca del registro.
    pub async fn teardown(&self, guild_id: GuildId) -> Result<()> {
        if let Some((_, handle)) = self.players.remove(&guild_id) {
            handle.leave(true).await?;
            info!("🗑️ Controlador de {} eliminado del registro", guild_id);
        }
        Ok(())
    }

    /// Alguien entró a un canal de voz de este servidor. El controlador
    /// decide si le concierne (canal vinculado + primer oyente → reconexión).
    pub fn voice_arrival(&self, guild_id: GuildId, channel: ChannelId, non_bot_count: usize) {
        if let Some(handle) = self.get(guild_id) {
            handle.notify_arrival(channel, non_bot_count);
        }
    }

    /// Alguien salió de un canal de voz de este servidor (canal vinculado
    /// vacío → desconexión soft).
    pub fn voice_departure(&self, guild_id: GuildId, channel: ChannelId, non_bot_remaining: usize) {
        if let Some(handle) = self.get(guild_id) {
            handle.notify_departure(channel, non_bot_remaining);
        }
    }

    /// Cambio de canal dentro del servidor: se evalúan las dos reglas.
    pub fn voice_switch(
        &self,
        guild_id: GuildId,
        from: ChannelId,
        from_remaining: usize,
        to: ChannelId,
        to_count: usize,
    ) {
        if let Some(handle) = self.get(guild_id) {
            handle.notify_departure(from, from_remaining);
            handle.notify_arrival(to, to_count);
        }
    }
}
