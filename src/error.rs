use thiserror::Error;

/// Taxonomía de errores del núcleo de reproducción.
///
/// Nada de esto es fatal para el proceso: cada sesión reporta y sigue.
#[derive(Debug, Error)]
pub enum MusicError {
    /// Una fuente no pudo resolver la consulta (URL inválida, sin
    /// resultados, proveedor caído).
    #[error("unable to resolve from {origin}: {cause}")]
    Resolve {
        origin: &'static str,
        #[source]
        cause: anyhow::Error,
    },

    /// El stream link expiró y no se pudo renovar.
    #[error("unable to renew stream link for \"{title}\": {cause}")]
    Renewal {
        title: String,
        #[source]
        cause: anyhow::Error,
    },

    /// Índice de cola inválido. Índice 0 (la canción activa) nunca es un
    /// destino válido para mover/eliminar.
    #[error("invalid queue index {index} (queue holds {len} songs)")]
    Bounds { index: usize, len: usize },

    /// Ya hay una votación pendiente en esta sesión.
    #[error("a vote is already in progress")]
    VoteInProgress,

    /// Se intentó votar sin una votación pendiente.
    #[error("no vote is in progress")]
    NoVote,

    /// La cola llegó a su tamaño máximo configurado.
    #[error("the queue is full ({max} songs)")]
    QueueFull { max: usize },

    /// El controlador no está vinculado a un canal de voz.
    #[error("not connected to a voice channel")]
    NotConnected,

    /// No hay ninguna canción activa.
    #[error("nothing is playing")]
    NotPlaying,

    /// La sesión no tiene habilitada esta capacidad.
    #[error("this session does not support {0}")]
    Unsupported(&'static str),

    /// Volumen fuera del rango 0-200%.
    #[error("volume must be between 0 and 200, got {0}")]
    InvalidVolume(u16),

    /// Falla reportada por el pipeline de audio.
    #[error("audio backend error: {0}")]
    Backend(#[source] anyhow::Error),

    /// La sesión terminó mientras una operación estaba en vuelo; el
    /// resultado tardío se descarta.
    #[error("the session ended before the operation completed")]
    SessionEnded,

    /// El controlador ya fue desmontado.
    #[error("the player for this session is gone")]
    ControllerClosed,
}

pub type Result<T, E = MusicError> = std::result::Result<T, E>;
