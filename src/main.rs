use anyhow::Result;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use venus_music::audio::LogBackend;
use venus_music::player::{GateAck, PlayAck, PlayerEvent, PlayerSettings};
use venus_music::sources::{SpotifyCatalog, SpotifyClient, TrackLookup, YtDlpClient};
use venus_music::vote::VoteChoice;
use venus_music::{Config, PlayerManager, Resolver};

/// Driver de consola: maneja una única sesión simulada para ejercitar el
/// núcleo sin transporte de voz real.
const GUILD: GuildId = GuildId::new(1);
const VOICE: ChannelId = ChannelId::new(10);
const OUTPUT: ChannelId = ChannelId::new(20);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("venus_music=debug".parse()?),
        )
        .init();

    info!("🎶 Iniciando venus-music v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    let lookup: Arc<dyn TrackLookup> = Arc::new(YtDlpClient::new(
        config.ytdlp_bin.clone(),
        config.cookies_path.clone(),
    ));
    let catalog: Option<Arc<dyn SpotifyCatalog>> = match (
        &config.spotify_client_id,
        &config.spotify_client_secret,
        &config.spotify_refresh_token,
    ) {
        (Some(id), Some(secret), Some(token)) => Some(Arc::new(SpotifyClient::new(
            id.clone(),
            secret.clone(),
            token.clone(),
        ))),
        _ => {
            warn!("⚠️ Sin credenciales de Spotify: sus links no van a resolver");
            None
        }
    };
    let resolver = Arc::new(Resolver::new(
        lookup,
        catalog,
        config.search_suffix.clone(),
        config.max_playlist_size,
    ));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let manager = Arc::new(PlayerManager::new(
        PlayerSettings::from(&config),
        resolver,
        Arc::new(LogBackend),
        event_tx,
    ));

    tokio::spawn(async move {
        while let Some((guild, event)) = event_rx.recv().await {
            print_event(guild, event);
        }
    });

    let player = manager.get_or_create(GUILD);
    player.join(VOICE, OUTPUT).await?;

    println!("venus-music console. Comandos:");
    println!("  play <consulta> | playfile <ruta> | search <consulta>");
    println!("  pause | resume | skip | stop | vote yes|no");
    println!("  loop | votes | shuffle | volume <0-200>");
    println!("  queue [página] | np | move <de> <a> | remove <i>");
    println!("  user <id> | listeners <id...> | leave | quit");

    // Identidad simulada del invocador y foto de oyentes para las votaciones.
    let mut user = UserId::new(1);
    let mut listeners = vec![UserId::new(1)];

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else { continue };
        let rest: Vec<&str> = parts.collect();

        let result: Result<()> = match verb {
            "play" => {
                match player.play(user, rest.join(" ")).await {
                    Ok(PlayAck::Started(song)) => println!("▶️ Sonando: {}", song.title),
                    Ok(PlayAck::Queued { song, position }) => {
                        println!("➕ #{}: {}", position, song.title)
                    }
                    Ok(PlayAck::Playlist { meta, added, failed, started }) => println!(
                        "📋 {}: {} encoladas, {} fallidas{}",
                        meta.name,
                        added,
                        failed,
                        if started { ", sonando" } else { "" }
                    ),
                    Err(err) => println!("❌ {err}"),
                }
                Ok(())
            }
            "playfile" => {
                match player.play_file(user, rest.join(" ")).await {
                    Ok(PlayAck::Started(song)) => println!("▶️ Sonando: {}", song.title),
                    Ok(PlayAck::Queued { song, position }) => {
                        println!("➕ #{}: {}", position, song.title)
                    }
                    Ok(_) => {}
                    Err(err) => println!("❌ {err}"),
                }
                Ok(())
            }
            "search" => {
                match player.search(rest.join(" "), 5).await {
                    Ok(hits) => {
                        for (i, hit) in hits.iter().enumerate() {
                            println!("{}. {} <{}>", i + 1, hit.title, hit.url);
                        }
                    }
                    Err(err) => println!("❌ {err}"),
                }
                Ok(())
            }
            "pause" => {
                report(player.pause_toggle().await.map(|t| format!("{t:?}")));
                Ok(())
            }
            "resume" => {
                report(player.resume().await.map(|_| "reanudado".to_string()));
                Ok(())
            }
            "skip" => {
                report_gate(player.skip(user, listeners.clone()).await);
                Ok(())
            }
            "stop" => {
                report_gate(player.stop(user, listeners.clone()).await);
                Ok(())
            }
            "vote" => {
                let choice = match rest.first() {
                    Some(&"yes") => VoteChoice::Approve,
                    Some(&"no") => VoteChoice::Reject,
                    _ => {
                        println!("uso: vote yes|no");
                        continue;
                    }
                };
                match player.cast_vote(user, choice).await {
                    Ok(status) => println!(
                        "🗳️ {}: {:?} (faltan {} de {} oyentes)",
                        status.kind.as_str(),
                        status.outcome,
                        status.approvals_needed,
                        status.eligible
                    ),
                    Err(err) => println!("❌ {err}"),
                }
                Ok(())
            }
            "loop" => {
                report(player.toggle_loop().await.map(|on| format!("loop: {on}")));
                Ok(())
            }
            "votes" => {
                report(
                    player
                        .toggle_majority_vote()
                        .await
                        .map(|on| format!("votación por mayoría: {on}")),
                );
                Ok(())
            }
            "shuffle" => {
                report(player.shuffle().await.map(|_| "cola mezclada".to_string()));
                Ok(())
            }
            "volume" => {
                let percent = rest.first().and_then(|v| v.parse().ok()).unwrap_or(100);
                report(
                    player
                        .set_volume(percent)
                        .await
                        .map(|factor| format!("volumen: {}%", (factor * 100.0) as u16)),
                );
                Ok(())
            }
            "queue" => {
                let page = rest.first().and_then(|v| v.parse().ok()).unwrap_or(1);
                let snapshot = player.queue_snapshot().await?;
                match snapshot.songs.first() {
                    Some(head) => println!("🎵 Ahora: {}", head.title),
                    None => println!("(cola vacía)"),
                }
                let view = snapshot.page(page, 25);
                for (i, song) in view.songs.iter().enumerate() {
                    let index = (view.page - 1) * 25 + i + 1;
                    println!("{index}. {} (pidió {})", song.title, song.requested_by);
                }
                println!("página {}/{}", view.page, view.total_pages);
                Ok(())
            }
            "np" => {
                match player.progress().await {
                    Ok(progress) => println!("⏱️ {progress}"),
                    Err(err) => println!("❌ {err}"),
                }
                Ok(())
            }
            "move" => {
                let (from, to) = match (
                    rest.first().and_then(|v| v.parse().ok()),
                    rest.get(1).and_then(|v| v.parse().ok()),
                ) {
                    (Some(from), Some(to)) => (from, to),
                    _ => {
                        println!("uso: move <de> <a>");
                        continue;
                    }
                };
                report(player.move_song(from, to).await.map(|_| "movida".to_string()));
                Ok(())
            }
            "remove" => {
                let Some(index) = rest.first().and_then(|v| v.parse().ok()) else {
                    println!("uso: remove <i>");
                    continue;
                };
                report(
                    player
                        .remove_song(index)
                        .await
                        .map(|song| format!("eliminada: {}", song.title)),
                );
                Ok(())
            }
            "user" => {
                if let Some(id) = rest.first().and_then(|v| v.parse().ok()) {
                    user = UserId::new(id);
                    println!("actuando como {user}");
                }
                Ok(())
            }
            "listeners" => {
                listeners = rest
                    .iter()
                    .filter_map(|v| v.parse().ok())
                    .map(UserId::new)
                    .collect();
                println!("{} oyentes simulados", listeners.len());
                Ok(())
            }
            "leave" => {
                report(player.leave(false).await.map(|_| "desconectado".to_string()));
                Ok(())
            }
            "quit" => break,
            other => {
                println!("comando desconocido: {other}");
                Ok(())
            }
        };
        result?;
    }

    manager.teardown(GUILD).await?;
    info!("👋 venus-music terminado");
    Ok(())
}

fn report(result: venus_music::Result<String>) {
    match result {
        Ok(message) => println!("✅ {message}"),
        Err(err) => println!("❌ {err}"),
    }
}

fn report_gate(result: venus_music::Result<GateAck>) {
    match result {
        Ok(GateAck::Acted) => println!("✅ hecho"),
        Ok(GateAck::Vote(status)) => println!(
            "🗳️ votación de {}: {:?} (faltan {} de {} oyentes)",
            status.kind.as_str(),
            status.outcome,
            status.approvals_needed,
            status.eligible
        ),
        Err(err) => println!("❌ {err}"),
    }
}

fn print_event(guild: GuildId, event: PlayerEvent) {
    match event {
        PlayerEvent::NowPlaying(song) => info!("[{}] 🎵 Ahora suena: {}", guild, song.title),
        PlayerEvent::QueueEnded => info!("[{}] 🏁 Cola terminada", guild),
        PlayerEvent::PlaylistItemFailed { message } => {
            warn!("[{}] ⚠️ Item de playlist falló: {}", guild, message)
        }
        PlayerEvent::RenewalFailed { title, message } => {
            warn!("[{}] ⚠️ Renovación de \"{}\" falló: {}", guild, title, message)
        }
        PlayerEvent::PlaybackError { title, message } => {
            warn!("[{}] 💥 Error reproduciendo \"{}\": {}", guild, title, message)
        }
        PlayerEvent::VoteFinished { kind, outcome } => {
            info!("[{}] 🗳️ Votación de {} terminó: {:?}", guild, kind.as_str(), outcome)
        }
    }
}
