use async_trait::async_trait;
use serenity::model::id::ChannelId;
use tokio::sync::mpsc;
use tracing::info;

use crate::player::VoiceSession;
use crate::sources::Song;

/// Fin de una pista, natural o por falla del pipeline.
///
/// `seq` identifica la pista que terminó; el controlador descarta avisos de
/// pistas que ya dejó atrás.
#[derive(Debug, Clone)]
pub struct TrackEnd {
    pub seq: u64,
    pub error: Option<String>,
}

pub type TrackEndTx = mpsc::UnboundedSender<TrackEnd>;

/// Frontera con el transporte de voz / pipeline de audio.
///
/// El controlador es el único que llama acá adentro. Contrato de
/// completación: la implementación manda [`TrackEnd`] por `on_end` cuando la
/// pista termina sola o falla, y NUNCA en respuesta a [`AudioBackend::stop`]
/// (esa transición la maneja el controlador por su cuenta).
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Conecta (o reconecta) al canal de voz.
    async fn connect(&self, voice: ChannelId) -> anyhow::Result<()>;

    /// Desconecta del canal de voz. `hard` libera todo recurso asociado;
    /// soft deja la sesión lista para reconectar.
    async fn disconnect(&self, voice: ChannelId, hard: bool) -> anyhow::Result<()>;

    /// Empieza a reproducir el stream link de `song` en la sesión.
    async fn play(
        &self,
        session: &VoiceSession,
        song: &Song,
        volume: f32,
        seq: u64,
        on_end: TrackEndTx,
    ) -> anyhow::Result<()>;

    async fn pause(&self, session: &VoiceSession) -> anyhow::Result<()>;

    async fn resume(&self, session: &VoiceSession) -> anyhow::Result<()>;

    /// Corta la pista actual sin emitir `TrackEnd`.
    async fn stop(&self, session: &VoiceSession) -> anyhow::Result<()>;

    async fn set_volume(&self, session: &VoiceSession, volume: f32) -> anyhow::Result<()>;
}

/// Backend que solo traza lo que haría. Sirve para el driver de consola y
/// para correr el núcleo sin transporte de voz real.
#[derive(Debug, Default)]
pub struct LogBackend;

#[async_trait]
impl AudioBackend for LogBackend {
    async fn connect(&self, voice: ChannelId) -> anyhow::Result<()> {
        info!("🔌 Conectado al canal de voz {}", voice);
        Ok(())
    }

    async fn disconnect(&self, voice: ChannelId, hard: bool) -> anyhow::Result<()> {
        info!(
            "🔌 Desconectado del canal de voz {} ({})",
            voice,
            if hard { "hard" } else { "soft" }
        );
        Ok(())
    }

    async fn play(
        &self,
        _session: &VoiceSession,
        song: &Song,
        volume: f32,
        _seq: u64,
        _on_end: TrackEndTx,
    ) -> anyhow::Result<()> {
        info!(
            "🎵 Reproduciendo: {} ({}%) -> {}",
            song.title,
            (volume * 100.0) as u16,
            song.link
        );
        Ok(())
    }

    async fn pause(&self, _session: &VoiceSession) -> anyhow::Result<()> {
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&self, _session: &VoiceSession) -> anyhow::Result<()> {
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    async fn stop(&self, _session: &VoiceSession) -> anyhow::Result<()> {
        info!("⏹️ Reproducción detenida");
        Ok(())
    }

    async fn set_volume(&self, _session: &VoiceSession, volume: f32) -> anyhow::Result<()> {
        info!("🔊 Volumen ajustado a {}%", (volume * 100.0) as u16);
        Ok(())
    }
}
