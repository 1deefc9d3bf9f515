//! Núcleo de reproducción de música por sesión para un bot de voz grupal.
//!
//! Resuelve consultas multi-fuente (YouTube, Spotify, SoundCloud, búsqueda
//! de texto libre) a canciones reproducibles, mantiene una cola por sesión y
//! la reproduce secuencialmente con pausa/reanudar/loop/skip/stop, votación
//! por mayoría para skip/stop y renovación de stream links vencidos.
//!
//! La superficie de comandos (Discord u otra) y el transporte de voz quedan
//! afuera: se conectan por [`player::PlayerHandle`] y [`audio::AudioBackend`].

pub mod audio;
pub mod config;
pub mod error;
pub mod manager;
pub mod player;
pub mod queue;
pub mod sources;
pub mod vote;

pub use config::Config;
pub use error::{MusicError, Result};
pub use manager::PlayerManager;
pub use player::{PlayerEvent, PlayerHandle, PlayerSettings};
pub use sources::{Resolver, Song};
