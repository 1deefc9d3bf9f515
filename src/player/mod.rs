mod actor;
mod state;

pub use state::{PlaybackState, PlaybackTimer, Progress};

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::audio::AudioBackend;
use crate::config::Config;
use crate::error::{MusicError, Result};
use crate::sources::{PlaylistMeta, Resolver, SearchHit, Song};
use crate::vote::{VoteChoice, VoteKind, VoteOutcome};

/// Vínculo de una sesión: canal de voz + canal de texto de salida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSession {
    pub voice: ChannelId,
    pub output: ChannelId,
}

/// Capacidades de una sesión. Un solo controlador parametrizado, no
/// variantes paralelas.
#[derive(Debug, Clone, Copy)]
pub struct PlayerCapabilities {
    pub majority_vote: bool,
    pub file_playback: bool,
}

impl Default for PlayerCapabilities {
    fn default() -> Self {
        Self {
            majority_vote: true,
            file_playback: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub vote_timeout: Duration,
    pub capabilities: PlayerCapabilities,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            max_queue_size: 1000,
            vote_timeout: Duration::from_secs(30),
            capabilities: PlayerCapabilities::default(),
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            max_queue_size: config.max_queue_size,
            vote_timeout: config.vote_timeout,
            capabilities: PlayerCapabilities {
                majority_vote: config.majority_vote_capable,
                file_playback: config.file_playback_capable,
            },
        }
    }
}

/// Resultado de encolar una consulta resuelta.
#[derive(Debug)]
pub enum PlayAck {
    /// La cola estaba vacía, la canción arrancó ya mismo.
    Started(Song),
    /// Había algo sonando; la canción quedó en la posición indicada.
    Queued { song: Song, position: usize },
    /// Playlist encolada en lote, con conteo de items fallidos.
    Playlist {
        meta: PlaylistMeta,
        added: usize,
        failed: usize,
        started: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseToggled {
    Paused,
    Resumed,
}

/// Estado de una votación, tal como se reporta al invocador.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteStatus {
    pub kind: VoteKind,
    pub outcome: VoteOutcome,
    pub eligible: usize,
    /// Aprobaciones que faltan para el quórum, ya descontadas las puestas.
    pub approvals_needed: usize,
}

/// Resultado de una acción que puede estar sujeta a votación (skip/stop).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateAck {
    /// Modo de votación apagado: la acción se ejecutó directo.
    Acted,
    /// Modo de votación prendido: estado de la votación tras el voto
    /// automático del invocador. `Approved` significa que la acción ya se
    /// ejecutó.
    Vote(VoteStatus),
}

/// Copia ordenada de la cola. El índice 0 es la canción activa.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub songs: Vec<Song>,
}

impl QueueSnapshot {
    /// Página 1-based de la cola detrás del head, para vistas paginadas.
    /// `per_page == 0` se trata como 1.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let tail = self.songs.get(1..).unwrap_or_default();
        let total_pages = if tail.is_empty() {
            1
        } else {
            tail.len().div_ceil(per_page)
        };
        let page = page.clamp(1, total_pages);
        let start = (page - 1) * per_page;
        let end = (start + per_page).min(tail.len());

        QueuePage {
            songs: tail[start..end].to_vec(),
            page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub songs: Vec<Song>,
    pub page: usize,
    pub total_pages: usize,
}

/// Lo que una sesión reporta de forma asíncrona (para renderizar en el
/// canal de salida). Los acks sincrónicos viajan en la respuesta de cada
/// comando, no acá.
#[derive(Debug)]
pub enum PlayerEvent {
    NowPlaying(Song),
    QueueEnded,
    /// Un item de playlist que no se pudo resolver (el resto siguió).
    PlaylistItemFailed { message: String },
    RenewalFailed { title: String, message: String },
    /// Falla del pipeline de audio; se trata como fin de pista.
    PlaybackError { title: String, message: String },
    VoteFinished { kind: VoteKind, outcome: VoteOutcome },
}

pub(crate) enum Command {
    Play {
        requester: UserId,
        query: String,
        reply: oneshot::Sender<Result<PlayAck>>,
    },
    PlayFile {
        requester: UserId,
        file_ref: String,
        reply: oneshot::Sender<Result<PlayAck>>,
    },
    PauseToggle {
        reply: oneshot::Sender<Result<PauseToggled>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    Skip {
        voter: UserId,
        listeners: Vec<UserId>,
        reply: oneshot::Sender<Result<GateAck>>,
    },
    Stop {
        voter: UserId,
        listeners: Vec<UserId>,
        reply: oneshot::Sender<Result<GateAck>>,
    },
    CastVote {
        voter: UserId,
        choice: VoteChoice,
        reply: oneshot::Sender<Result<VoteStatus>>,
    },
    ToggleLoop {
        reply: oneshot::Sender<Result<bool>>,
    },
    ToggleMajorityVote {
        reply: oneshot::Sender<Result<bool>>,
    },
    Shuffle {
        reply: oneshot::Sender<Result<()>>,
    },
    SetVolume {
        percent: u16,
        reply: oneshot::Sender<Result<f32>>,
    },
    MoveSong {
        from: usize,
        to: usize,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveSong {
        index: usize,
        reply: oneshot::Sender<Result<Song>>,
    },
    Progress {
        reply: oneshot::Sender<Result<Progress>>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Search {
        query: String,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<SearchHit>>>,
    },
    Join {
        voice: ChannelId,
        output: ChannelId,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        hard: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Señales del colaborador de presencia de voz.
    Arrival {
        channel: ChannelId,
        non_bot_count: usize,
    },
    Departure {
        channel: ChannelId,
        non_bot_remaining: usize,
    },
}

/// Punto de entrada único a una sesión de reproducción.
///
/// Clonable y barato; todos los comandos se serializan en la tarea del
/// controlador, así que dos comandos para la misma sesión nunca mutan
/// estado en paralelo.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PlayerHandle {
    /// Crea el controlador de una sesión y arranca su tarea.
    pub fn spawn(
        guild_id: GuildId,
        settings: PlayerSettings,
        resolver: Arc<Resolver>,
        backend: Arc<dyn AudioBackend>,
        events: mpsc::UnboundedSender<(GuildId, PlayerEvent)>,
    ) -> Self {
        let tx = actor::spawn(guild_id, settings, resolver, backend, events);
        Self { tx }
    }

    async fn send<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.tx
            .send(command)
            .map_err(|_| MusicError::ControllerClosed)?;
        rx.await.map_err(|_| MusicError::ControllerClosed)?
    }

    /// Resuelve una consulta y la encola (o la arranca si no hay nada
    /// sonando). La resolución corre fuera del controlador; la respuesta
    /// llega cuando la canción quedó encolada.
    pub async fn play(&self, requester: UserId, query: impl Into<String>) -> Result<PlayAck> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Play {
                requester,
                query: query.into(),
                reply,
            },
            rx,
        )
        .await
    }

    /// Encola un archivo local.
    pub async fn play_file(
        &self,
        requester: UserId,
        file_ref: impl Into<String>,
    ) -> Result<PlayAck> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::PlayFile {
                requester,
                file_ref: file_ref.into(),
                reply,
            },
            rx,
        )
        .await
    }

    /// Alterna pausa/reanudar y devuelve qué transición ocurrió.
    pub async fn pause_toggle(&self) -> Result<PauseToggled> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PauseToggle { reply }, rx).await
    }

    /// Reanuda si está en pausa; si no, no hace nada.
    pub async fn resume(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Resume { reply }, rx).await
    }

    /// Salta la canción actual. Con modo de votación prendido arranca (o
    /// alimenta) una votación de mayoría; `listeners` es la foto de los
    /// participantes elegibles.
    pub async fn skip(&self, voter: UserId, listeners: Vec<UserId>) -> Result<GateAck> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Skip {
                voter,
                listeners,
                reply,
            },
            rx,
        )
        .await
    }

    /// Detiene todo y limpia la cola. Con modo de votación prendido exige
    /// unanimidad.
    pub async fn stop(&self, voter: UserId, listeners: Vec<UserId>) -> Result<GateAck> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Stop {
                voter,
                listeners,
                reply,
            },
            rx,
        )
        .await
    }

    /// Registra un voto en la votación pendiente.
    pub async fn cast_vote(&self, voter: UserId, choice: VoteChoice) -> Result<VoteStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CastVote { voter, choice, reply }, rx)
            .await
    }

    pub async fn toggle_loop(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ToggleLoop { reply }, rx).await
    }

    pub async fn toggle_majority_vote(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ToggleMajorityVote { reply }, rx).await
    }

    pub async fn shuffle(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shuffle { reply }, rx).await
    }

    /// Volumen en porcentaje 0-200. Devuelve el factor aplicado.
    pub async fn set_volume(&self, percent: u16) -> Result<f32> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetVolume { percent, reply }, rx).await
    }

    pub async fn move_song(&self, from: usize, to: usize) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::MoveSong { from, to, reply }, rx).await
    }

    pub async fn remove_song(&self, index: usize) -> Result<Song> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RemoveSong { index, reply }, rx).await
    }

    pub async fn progress(&self) -> Result<Progress> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Progress { reply }, rx).await
    }

    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .map_err(|_| MusicError::ControllerClosed)?;
        rx.await.map_err(|_| MusicError::ControllerClosed)
    }

    /// Top N resultados de búsqueda para listas de selección.
    pub async fn search(&self, query: impl Into<String>, limit: usize) -> Result<Vec<SearchHit>> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::Search {
                query: query.into(),
                limit,
                reply,
            },
            rx,
        )
        .await
    }

    /// Vincula la sesión a un canal de voz y uno de salida.
    pub async fn join(&self, voice: ChannelId, output: ChannelId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Join { voice, output, reply }, rx).await
    }

    /// Desvincula la sesión. Soft deja el vínculo latente para reconectar;
    /// hard desmonta el controlador.
    pub async fn leave(&self, hard: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Leave { hard, reply }, rx).await
    }

    /// Alguien entró a un canal de voz (conteo sin bots, ya incluido el
    /// recién llegado).
    pub fn notify_arrival(&self, channel: ChannelId, non_bot_count: usize) {
        let _ = self.tx.send(Command::Arrival {
            channel,
            non_bot_count,
        });
    }

    /// Alguien salió de un canal de voz (conteo sin bots de los que
    /// quedan).
    pub fn notify_departure(&self, channel: ChannelId, non_bot_remaining: usize) {
        let _ = self.tx.send(Command::Departure {
            channel,
            non_bot_remaining,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(n: usize) -> QueueSnapshot {
        let songs = (0..n)
            .map(|i| {
                Song::new(
                    format!("s{i}"),
                    format!("url{i}"),
                    format!("link{i}"),
                    UserId::new(1),
                )
            })
            .collect();
        QueueSnapshot { songs }
    }

    #[test]
    fn paging_excludes_active_head() {
        // head + 30 encoladas → 2 páginas de 25
        let view = snapshot(31).page(1, 25);
        assert_eq!(view.total_pages, 2);
        assert_eq!(view.songs.len(), 25);
        assert_eq!(view.songs[0].title, "s1");

        let view = snapshot(31).page(2, 25);
        assert_eq!(view.songs.len(), 5);
        assert_eq!(view.songs[0].title, "s26");
    }

    #[test]
    fn paging_clamps_out_of_range_pages() {
        let view = snapshot(5).page(99, 25);
        assert_eq!(view.page, 1);
        assert_eq!(view.songs.len(), 4);

        // Cola vacía o solo head: una página vacía.
        let view = snapshot(1).page(1, 25);
        assert_eq!(view.total_pages, 1);
        assert!(view.songs.is_empty());
    }

    #[test]
    fn zero_page_size_does_not_panic() {
        let view = snapshot(5).page(1, 0);
        assert_eq!(view.songs.len(), 1);
        assert_eq!(view.total_pages, 4);
    }
}
