use anyhow::{Context, Result};
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use super::{CatalogTrack, PlaylistMeta, SpotifyCatalog};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static TRACK_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"spotify\.com/track/([a-zA-Z0-9]+)").expect("static regex"));
static PLAYLIST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"spotify\.com/playlist/([a-zA-Z0-9]+)").expect("static regex"));
static ALBUM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"spotify\.com/album/([a-zA-Z0-9]+)").expect("static regex"));

/// Cliente de la Web API de Spotify, solo para metadata de catálogo.
///
/// Autenticación por refresh token; el access token se cachea y se renueva
/// una única vez ante una respuesta de autorización fallida.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    access_token: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            refresh_token,
            access_token: Mutex::new(None),
        }
    }

    async fn refresh_access_token(&self) -> Result<String> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .context("failed to reach the Spotify token endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("failed to refresh Spotify token: {} - {}", status, body);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("failed to parse Spotify token response")?;

        debug!("Token de Spotify renovado");
        *self.access_token.lock() = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn current_token(&self) -> Result<String> {
        let cached = self.access_token.lock().clone();
        match cached {
            Some(token) => Ok(token),
            None => self.refresh_access_token().await,
        }
    }

    /// GET autenticado con un reintento tras renovar el token.
    async fn get_json(&self, endpoint: &str) -> Result<Value> {
        let mut token = self.current_token().await?;

        for attempt in 0..2 {
            let response = self
                .http
                .get(endpoint)
                .bearer_auth(&token)
                .send()
                .await
                .context("failed to reach the Spotify API")?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .context("failed to parse Spotify API response");
            }

            if attempt == 0 && (status == 401 || status == 403) {
                debug!("Respuesta {} de Spotify, renovando token", status);
                token = self.refresh_access_token().await?;
                continue;
            }

            anyhow::bail!("Spotify API returned {}", status)
        }

        unreachable!("the retry loop always returns or bails")
    }
}

fn capture_id(pattern: &Regex, url: &str) -> Option<String> {
    pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Track de un item de playlist (`item.track.*`) o de álbum (`item.*`).
fn item_to_track(item: &Value, nested: bool) -> Option<CatalogTrack> {
    let track = if nested { item.get("track")? } else { item };
    Some(CatalogTrack {
        title: track.get("name")?.as_str()?.to_string(),
        artist: str_at(track, "/artists/0/name")?.to_string(),
    })
}

#[async_trait::async_trait]
impl SpotifyCatalog for SpotifyClient {
    async fn track(&self, url: &str) -> Result<CatalogTrack> {
        let id = capture_id(&TRACK_ID, url).context("invalid Spotify track URL")?;
        let body = self.get_json(&format!("{API_BASE}/tracks/{id}")).await?;

        item_to_track(&body, false).context("malformed Spotify track response")
    }

    async fn playlist(&self, url: &str) -> Result<(PlaylistMeta, Vec<CatalogTrack>)> {
        // Playlists y álbumes comparten forma salvo el anidado de items
        let (endpoint, nested) = if let Some(id) = capture_id(&PLAYLIST_ID, url) {
            (format!("{API_BASE}/playlists/{id}"), true)
        } else if let Some(id) = capture_id(&ALBUM_ID, url) {
            (format!("{API_BASE}/albums/{id}"), false)
        } else {
            anyhow::bail!("invalid Spotify playlist or album URL");
        };

        let body = self.get_json(&endpoint).await?;

        let tracks: Vec<CatalogTrack> = body
            .pointer("/tracks/items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item_to_track(item, nested))
                    .collect()
            })
            .unwrap_or_default();

        let meta = PlaylistMeta {
            name: body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown Playlist")
                .to_string(),
            song_count: tracks.len(),
            thumbnail: str_at(&body, "/images/0/url").map(str::to_string),
        };

        Ok((meta, tracks))
    }
}
