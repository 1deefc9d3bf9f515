use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Configuración global cargada desde el entorno.
#[derive(Debug, Clone)]
pub struct Config {
    // Spotify (opcional - sin credenciales los links de Spotify fallan con
    // un error de resolución, el resto de fuentes sigue funcionando)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_refresh_token: Option<String>,

    // Resolución
    pub ytdlp_bin: String,
    pub cookies_path: Option<PathBuf>,
    /// Sufijo agregado a las búsquedas de texto libre para sesgar hacia
    /// audio de estudio. Heurística deliberada, no política fija.
    pub search_suffix: String,
    pub max_playlist_size: usize,

    // Reproducción
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub vote_timeout: Duration,

    // Capacidades por sesión
    pub majority_vote_capable: bool,
    pub file_playback_capable: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").ok(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").ok(),
            spotify_refresh_token: std::env::var("SPOTIFY_REFRESH_TOKEN").ok(),

            ytdlp_bin: std::env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            cookies_path: std::env::var("COOKIES_PATH").ok().map(PathBuf::from),
            search_suffix: std::env::var("SEARCH_SUFFIX")
                .unwrap_or_else(|_| "lyrics".to_string()),
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            vote_timeout: Duration::from_secs(
                std::env::var("VOTE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            ),

            majority_vote_capable: std::env::var("ENABLE_MAJORITY_VOTE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            file_playback_capable: std::env::var("ENABLE_FILE_PLAYBACK")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.vote_timeout.is_zero() {
            anyhow::bail!("Vote timeout must be greater than 0");
        }

        if self.ytdlp_bin.trim().is_empty() {
            anyhow::bail!("yt-dlp binary path cannot be empty");
        }

        // Spotify es todo-o-nada: con credenciales parciales es casi seguro
        // un .env mal copiado
        let spotify_vars = [
            self.spotify_client_id.is_some(),
            self.spotify_client_secret.is_some(),
            self.spotify_refresh_token.is_some(),
        ];
        if spotify_vars.iter().any(|v| *v) && !spotify_vars.iter().all(|v| *v) {
            anyhow::bail!(
                "Spotify requires SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and \
                 SPOTIFY_REFRESH_TOKEN to all be set (or none)"
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_refresh_token: None,

            ytdlp_bin: "yt-dlp".to_string(),
            cookies_path: None,
            search_suffix: "lyrics".to_string(),
            max_playlist_size: 100,

            default_volume: 1.0,
            max_queue_size: 1000,
            vote_timeout: Duration::from_secs(30),

            majority_vote_capable: true,
            file_playback_capable: true,
        }
    }
}
