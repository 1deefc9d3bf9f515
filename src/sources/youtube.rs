use anyhow::{Context, Result};
use async_process::Command;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{PlaylistMeta, SearchHit, TrackInfo, TrackLookup};

/// Cliente de yt-dlp para YouTube y SoundCloud.
///
/// Cada consulta es una invocación del binario con salida JSON; un semáforo
/// limita las invocaciones concurrentes para no disparar rate limiting.
pub struct YtDlpClient {
    bin: String,
    cookies: Option<PathBuf>,
    limiter: Semaphore,
}

/// Salida de `--dump-json` para un track concreto.
#[derive(Debug, Deserialize)]
struct YtDlpTrack {
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// Stream link directo del formato elegido por `-f`.
    url: Option<String>,
}

/// Entrada plana de `--flat-playlist`.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    title: Option<String>,
    url: Option<String>,
}

/// Salida de `-J --flat-playlist` para una playlist completa.
#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    title: Option<String>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<YtDlpThumbnail>>,
    entries: Option<Vec<FlatEntry>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: String,
}

impl YtDlpClient {
    pub fn new(bin: String, cookies: Option<PathBuf>) -> Self {
        Self {
            bin,
            cookies,
            // 3 procesos yt-dlp a la vez como máximo
            limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.limiter.acquire().await?;

        let mut command = Command::new(&self.bin);
        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.args(args);

        let output = command
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.bin))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn track(&self, target: &str) -> Result<TrackInfo> {
        debug!("📊 Obteniendo info de: {}", target);

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                target,
            ])
            .await?;

        let track: YtDlpTrack = serde_json::from_str(stdout.trim())
            .context("failed to parse yt-dlp track output")?;

        let link = track
            .url
            .context("yt-dlp returned no stream url for the selected format")?;

        Ok(TrackInfo {
            title: track.title,
            duration_secs: track.duration.unwrap_or(0.0) as u64,
            thumbnail: track.thumbnail,
            link,
            url: track.webpage_url,
        })
    }
}

#[async_trait::async_trait]
impl TrackLookup for YtDlpClient {
    async fn from_url(&self, url: &str) -> Result<TrackInfo> {
        self.track(url).await
    }

    async fn from_query(&self, query: &str) -> Result<TrackInfo> {
        let target = format!("ytsearch1:{query}");
        self.track(&target).await
    }

    async fn playlist(&self, url: &str) -> Result<(PlaylistMeta, Vec<String>)> {
        info!("📋 Obteniendo playlist: {}", url);

        let stdout = self
            .run(&["--flat-playlist", "-J", "--no-warnings", url])
            .await?;

        let playlist: YtDlpPlaylist = serde_json::from_str(stdout.trim())
            .context("failed to parse yt-dlp playlist output")?;

        let entries: Vec<String> = playlist
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.url)
            .collect();

        let thumbnail = playlist.thumbnail.or_else(|| {
            playlist
                .thumbnails
                .and_then(|thumbs| thumbs.into_iter().next_back().map(|t| t.url))
        });

        let meta = PlaylistMeta {
            name: playlist.title.unwrap_or_else(|| "Unknown Playlist".to_string()),
            song_count: entries.len(),
            thumbnail,
        };

        Ok((meta, entries))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let target = format!("ytsearch{limit}:{query}");
        let stdout = self
            .run(&["--flat-playlist", "--dump-json", "--no-warnings", &target])
            .await?;

        let hits = stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
            .filter_map(|entry| match (entry.title, entry.url) {
                (Some(title), Some(url)) => Some(SearchHit { title, url }),
                _ => None,
            })
            .collect();

        Ok(hits)
    }
}
