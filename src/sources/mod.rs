pub mod expiry;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serenity::model::id::UserId;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::error::MusicError;

pub use spotify::SpotifyClient;
pub use youtube::YtDlpClient;

/// Una canción resuelta y lista para encolar.
///
/// Inmutable salvo `link`, que se reemplaza cuando el stream expira y se
/// renueva. `duration_secs == 0` significa duración desconocida / en vivo.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub title: String,
    /// URL de origen compartible (se re-resuelve desde acá al renovar).
    pub url: String,
    /// Stream link directo, con expiración embebida.
    pub link: String,
    pub thumbnail: Option<String>,
    pub duration_secs: u64,
    pub requested_by: UserId,
    pub is_local_file: bool,
    pub added_at: DateTime<Utc>,
}

impl Song {
    pub fn new(title: String, url: String, link: String, requested_by: UserId) -> Self {
        Self {
            title,
            url,
            link,
            thumbnail: None,
            duration_secs: 0,
            requested_by,
            is_local_file: false,
            added_at: Utc::now(),
        }
    }

    /// Canción respaldada por un archivo local: sin expiración, duración
    /// desconocida.
    pub fn local_file(path: String, requested_by: UserId) -> Self {
        let title = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&path)
            .to_string();
        Self {
            title,
            url: path.clone(),
            link: path,
            thumbnail: None,
            duration_secs: 0,
            requested_by,
            is_local_file: true,
            added_at: Utc::now(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_duration(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }
}

/// Encabezado de metadata de una playlist resuelta.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistMeta {
    pub name: String,
    pub song_count: usize,
    pub thumbnail: Option<String>,
}

/// Metadata cruda de un track, como la devuelve el proveedor.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub title: String,
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
    /// Stream link directo.
    pub link: String,
    /// URL compartible del track (cuando el proveedor la conoce).
    pub url: Option<String>,
}

/// Resultado de búsqueda para listas de selección.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// Referencia a un track del catálogo de Spotify.
#[derive(Debug, Clone)]
pub struct CatalogTrack {
    pub title: String,
    pub artist: String,
}

/// Resolución de tracks contra la plataforma de video (yt-dlp por debajo).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackLookup: Send + Sync {
    /// Metadata + stream link de una URL concreta.
    async fn from_url(&self, url: &str) -> anyhow::Result<TrackInfo>;

    /// Primer resultado de una búsqueda de texto.
    async fn from_query(&self, query: &str) -> anyhow::Result<TrackInfo>;

    /// Encabezado + URLs de los items de una playlist (extracción plana).
    async fn playlist(&self, url: &str) -> anyhow::Result<(PlaylistMeta, Vec<String>)>;

    /// Top N resultados de una búsqueda, solo título y URL.
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Catálogo de metadata del servicio de música (Spotify).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpotifyCatalog: Send + Sync {
    async fn track(&self, url: &str) -> anyhow::Result<CatalogTrack>;

    async fn playlist(&self, url: &str) -> anyhow::Result<(PlaylistMeta, Vec<CatalogTrack>)>;
}

/// Clasificación de una consulta cruda. El primer patrón que matchea gana.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    YouTubePlaylist,
    YouTube,
    SpotifyPlaylist,
    Spotify,
    SoundCloudSet,
    SoundCloud,
    Search,
}

static YOUTUBE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://)?(www\.)?(youtube\.com|youtu\.be)/").expect("static regex"));
static YOUTUBE_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://)?(www\.)?(youtube\.com|youtu\.be)/playlist\?list=[\w-]+").expect("static regex")
});
static SPOTIFY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://)?(open\.)?spotify\.com/").expect("static regex"));
static SPOTIFY_PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?://)?(open\.)?spotify\.com/(playlist|album)/[a-zA-Z0-9]+").expect("static regex")
});
static SOUNDCLOUD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(https?://)?(www\.)?soundcloud\.com/").expect("static regex"));
static SOUNDCLOUD_SET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?soundcloud\.com/[^/]+/sets/[^/]+/?").expect("static regex")
});
static TITLE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-]").expect("static regex"));

/// Determina la fuente de una consulta. Todo lo que no es un link conocido
/// se trata como búsqueda de texto libre.
pub fn classify(query: &str) -> SourceKind {
    let query = query.to_lowercase();

    if YOUTUBE.is_match(&query) {
        if YOUTUBE_PLAYLIST.is_match(&query) {
            return SourceKind::YouTubePlaylist;
        }
        return SourceKind::YouTube;
    }
    if SPOTIFY.is_match(&query) {
        if SPOTIFY_PLAYLIST.is_match(&query) {
            return SourceKind::SpotifyPlaylist;
        }
        return SourceKind::Spotify;
    }
    if SOUNDCLOUD.is_match(&query) {
        if SOUNDCLOUD_SET.is_match(&query) {
            return SourceKind::SoundCloudSet;
        }
        return SourceKind::SoundCloud;
    }

    SourceKind::Search
}

/// Limpia un título para mostrar: solo alfanuméricos, espacios y guiones.
pub fn sanitize_title(raw: &str) -> String {
    TITLE_NOISE.replace_all(raw, "").trim().to_string()
}

/// Resultado de una resolución: una canción suelta o una playlist expandida.
#[derive(Debug)]
pub enum Resolved {
    Song(Song),
    Playlist {
        meta: PlaylistMeta,
        songs: Vec<Song>,
        /// Fallas por item, aisladas: nunca abortan el resto.
        failures: Vec<MusicError>,
    },
}

/// Despachador multi-fuente: clasifica la consulta y la ruta al handler de
/// la fuente que corresponde, normalizando todo a [`Song`].
pub struct Resolver {
    lookup: Arc<dyn TrackLookup>,
    catalog: Option<Arc<dyn SpotifyCatalog>>,
    search_suffix: String,
    max_playlist: usize,
}

impl Resolver {
    pub fn new(
        lookup: Arc<dyn TrackLookup>,
        catalog: Option<Arc<dyn SpotifyCatalog>>,
        search_suffix: String,
        max_playlist: usize,
    ) -> Self {
        Self {
            lookup,
            catalog,
            search_suffix,
            max_playlist,
        }
    }

    /// Resuelve una consulta cruda a una o más canciones.
    pub async fn resolve(&self, requested_by: UserId, query: &str) -> Result<Resolved, MusicError> {
        match classify(query) {
            SourceKind::YouTubePlaylist => {
                debug!("Detectada playlist de YouTube");
                self.platform_playlist(requested_by, query, "youtube").await
            }
            SourceKind::YouTube => {
                debug!("Detectado link de YouTube");
                self.single_link(requested_by, query, "youtube").await
            }
            SourceKind::SpotifyPlaylist => {
                debug!("Detectada playlist/álbum de Spotify");
                self.spotify_playlist(requested_by, query).await
            }
            SourceKind::Spotify => {
                debug!("Detectado link de Spotify");
                self.spotify_track(requested_by, query).await
            }
            SourceKind::SoundCloudSet => {
                debug!("Detectado set de SoundCloud");
                self.platform_playlist(requested_by, query, "soundcloud").await
            }
            SourceKind::SoundCloud => {
                debug!("Detectado link de SoundCloud");
                self.single_link(requested_by, query, "soundcloud").await
            }
            SourceKind::Search => {
                debug!("Consulta de texto libre - búsqueda en YouTube");
                self.text_search(requested_by, query).await
            }
        }
    }

    /// Re-resuelve el stream link de una canción desde su URL de origen.
    /// Solo devuelve el link nuevo; el resto de la canción no cambia.
    pub async fn renew_link(&self, origin_url: &str) -> Result<String, MusicError> {
        let info = self
            .lookup
            .from_url(origin_url)
            .await
            .map_err(|cause| MusicError::Resolve {
                origin: "youtube",
                cause,
            })?;
        Ok(info.link)
    }

    /// Top N resultados para listas de selección.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, MusicError> {
        let suffixed = self.with_suffix(query);
        let hits = self
            .lookup
            .search(&suffixed, limit)
            .await
            .map_err(|cause| MusicError::Resolve {
                origin: "youtube",
                cause,
            })?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                title: sanitize_title(&hit.title),
                url: hit.url,
            })
            .collect())
    }

    fn with_suffix(&self, query: &str) -> String {
        if self.search_suffix.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, self.search_suffix)
        }
    }

    fn song_from_info(&self, info: TrackInfo, origin: &str, requested_by: UserId) -> Song {
        let url = info.url.unwrap_or_else(|| origin.to_string());
        Song::new(sanitize_title(&info.title), url, info.link, requested_by)
            .with_thumbnail(info.thumbnail)
            .with_duration(info.duration_secs)
    }

    async fn single_link(
        &self,
        requested_by: UserId,
        url: &str,
        origin: &'static str,
    ) -> Result<Resolved, MusicError> {
        let info = self
            .lookup
            .from_url(url)
            .await
            .map_err(|cause| MusicError::Resolve { origin, cause })?;

        Ok(Resolved::Song(self.song_from_info(info, url, requested_by)))
    }

    async fn text_search(&self, requested_by: UserId, query: &str) -> Result<Resolved, MusicError> {
        let suffixed = self.with_suffix(query);
        let info = self
            .lookup
            .from_query(&suffixed)
            .await
            .map_err(|cause| MusicError::Resolve {
                origin: "youtube",
                cause,
            })?;

        Ok(Resolved::Song(self.song_from_info(info, query, requested_by)))
    }

    /// Playlists de YouTube/SoundCloud: extracción plana de URLs y después
    /// cada item se resuelve por separado. Una falla se loguea, se anota y
    /// se sigue con el resto.
    async fn platform_playlist(
        &self,
        requested_by: UserId,
        url: &str,
        origin: &'static str,
    ) -> Result<Resolved, MusicError> {
        let (mut meta, entries) = self
            .lookup
            .playlist(url)
            .await
            .map_err(|cause| MusicError::Resolve { origin, cause })?;
        meta.name = sanitize_title(&meta.name);

        let mut songs = Vec::new();
        let mut failures = Vec::new();

        for entry_url in entries.into_iter().take(self.max_playlist) {
            match self.lookup.from_url(&entry_url).await {
                Ok(info) => songs.push(self.song_from_info(info, &entry_url, requested_by)),
                Err(cause) => {
                    warn!("No se pudo resolver item de playlist {}: {}", entry_url, cause);
                    failures.push(MusicError::Resolve { origin, cause });
                }
            }
        }

        Ok(Resolved::Playlist {
            meta,
            songs,
            failures,
        })
    }

    fn catalog(&self) -> Result<&Arc<dyn SpotifyCatalog>, MusicError> {
        self.catalog.as_ref().ok_or_else(|| MusicError::Resolve {
            origin: "spotify",
            cause: anyhow::anyhow!("Spotify credentials are not configured"),
        })
    }

    /// Track suelto de Spotify: el catálogo da título + artista y se
    /// re-busca en la plataforma de video.
    async fn spotify_track(&self, requested_by: UserId, url: &str) -> Result<Resolved, MusicError> {
        let track = self
            .catalog()?
            .track(url)
            .await
            .map_err(|cause| MusicError::Resolve {
                origin: "spotify",
                cause,
            })?;

        let query = self.with_suffix(&format!("{} by {}", track.title, track.artist));
        debug!("Buscando canción de Spotify: {}", query);

        let info = self
            .lookup
            .from_query(&query)
            .await
            .map_err(|cause| MusicError::Resolve {
                origin: "spotify",
                cause,
            })?;

        Ok(Resolved::Song(self.song_from_info(info, url, requested_by)))
    }

    /// Playlist/álbum de Spotify: cada track del catálogo se re-busca por
    /// "título by artista", con la misma aislación de fallas por item.
    async fn spotify_playlist(
        &self,
        requested_by: UserId,
        url: &str,
    ) -> Result<Resolved, MusicError> {
        let (mut meta, tracks) = self
            .catalog()?
            .playlist(url)
            .await
            .map_err(|cause| MusicError::Resolve {
                origin: "spotify",
                cause,
            })?;
        meta.name = sanitize_title(&meta.name);

        let mut songs = Vec::new();
        let mut failures = Vec::new();

        for track in tracks.into_iter().take(self.max_playlist) {
            let query = self.with_suffix(&format!("{} by {}", track.title, track.artist));
            match self.lookup.from_query(&query).await {
                Ok(info) => songs.push(self.song_from_info(info, url, requested_by)),
                Err(cause) => {
                    warn!("No se pudo resolver track de Spotify \"{}\": {}", track.title, cause);
                    failures.push(MusicError::Resolve {
                        origin: "spotify",
                        cause,
                    });
                }
            }
        }

        Ok(Resolved::Playlist {
            meta,
            songs,
            failures,
        })
    }
}
