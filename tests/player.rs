//! Tests de integración del controlador de reproducción, con fuentes y
//! backend de audio falsos.

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use venus_music::audio::{AudioBackend, TrackEnd, TrackEndTx};
use venus_music::error::MusicError;
use venus_music::player::{
    GateAck, PauseToggled, PlayAck, PlayerEvent, PlayerHandle, PlayerSettings, VoiceSession,
};
use venus_music::sources::{PlaylistMeta, Resolver, SearchHit, Song, TrackInfo, TrackLookup};
use venus_music::vote::{RejectReason, VoteChoice, VoteKind, VoteOutcome};

/// Fuente falsa: respuestas por URL/consulta, consumidas en orden (la
/// última se repite). Una clave ausente falla la resolución.
#[derive(Default)]
struct FakeLookup {
    responses: Mutex<HashMap<String, Vec<TrackInfo>>>,
    playlists: Mutex<HashMap<String, (PlaylistMeta, Vec<String>)>>,
    url_calls: AtomicUsize,
}

impl FakeLookup {
    fn put(&self, key: &str, infos: Vec<TrackInfo>) {
        self.responses.lock().insert(key.to_string(), infos);
    }

    fn put_playlist(&self, key: &str, meta: PlaylistMeta, entries: Vec<&str>) {
        self.playlists.lock().insert(
            key.to_string(),
            (meta, entries.into_iter().map(String::from).collect()),
        );
    }

    fn take(&self, key: &str) -> anyhow::Result<TrackInfo> {
        let mut responses = self.responses.lock();
        let infos = responses
            .get_mut(key)
            .ok_or_else(|| anyhow::anyhow!("no results for {key}"))?;
        if infos.len() > 1 {
            Ok(infos.remove(0))
        } else {
            infos
                .first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no results for {key}"))
        }
    }
}

fn track(title: &str, origin: &str, link: &str) -> TrackInfo {
    TrackInfo {
        title: title.to_string(),
        duration_secs: 180,
        thumbnail: None,
        link: link.to_string(),
        url: Some(origin.to_string()),
    }
}

#[async_trait]
impl TrackLookup for FakeLookup {
    async fn from_url(&self, url: &str) -> anyhow::Result<TrackInfo> {
        self.url_calls.fetch_add(1, Ordering::SeqCst);
        self.take(url)
    }

    async fn from_query(&self, query: &str) -> anyhow::Result<TrackInfo> {
        self.take(query)
    }

    async fn playlist(&self, url: &str) -> anyhow::Result<(PlaylistMeta, Vec<String>)> {
        self.playlists
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no playlist at {url}"))
    }

    async fn search(&self, _query: &str, _limit: usize) -> anyhow::Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// Backend falso: registra las llamadas y deja disparar el fin de pista a
/// mano, como lo haría el pipeline real.
#[derive(Default)]
struct FakeBackend {
    plays: Mutex<Vec<(String, String)>>,
    current: Mutex<Option<(u64, TrackEndTx)>>,
    connects: AtomicUsize,
    stops: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    volumes: Mutex<Vec<f32>>,
}

impl FakeBackend {
    fn finish_current(&self) {
        if let Some((seq, tx)) = self.current.lock().clone() {
            let _ = tx.send(TrackEnd { seq, error: None });
        }
    }

    fn fail_current(&self, message: &str) {
        if let Some((seq, tx)) = self.current.lock().clone() {
            let _ = tx.send(TrackEnd {
                seq,
                error: Some(message.to_string()),
            });
        }
    }

    fn played_titles(&self) -> Vec<String> {
        self.plays.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    fn last_link(&self) -> Option<String> {
        self.plays.lock().last().map(|(_, l)| l.clone())
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn connect(&self, _voice: ChannelId) -> anyhow::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self, _voice: ChannelId, _hard: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn play(
        &self,
        _session: &VoiceSession,
        song: &Song,
        _volume: f32,
        seq: u64,
        on_end: TrackEndTx,
    ) -> anyhow::Result<()> {
        self.plays
            .lock()
            .push((song.title.clone(), song.link.clone()));
        *self.current.lock() = Some((seq, on_end));
        Ok(())
    }

    async fn pause(&self, _session: &VoiceSession) -> anyhow::Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self, _session: &VoiceSession) -> anyhow::Result<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self, _session: &VoiceSession) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, _session: &VoiceSession, volume: f32) -> anyhow::Result<()> {
        self.volumes.lock().push(volume);
        Ok(())
    }
}

struct Harness {
    player: PlayerHandle,
    lookup: Arc<FakeLookup>,
    backend: Arc<FakeBackend>,
    events: mpsc::UnboundedReceiver<(GuildId, PlayerEvent)>,
}

async fn harness(settings: PlayerSettings) -> Harness {
    let lookup = Arc::new(FakeLookup::default());
    let backend = Arc::new(FakeBackend::default());
    let resolver = Arc::new(Resolver::new(
        Arc::clone(&lookup) as Arc<dyn TrackLookup>,
        None,
        "lyrics".to_string(),
        100,
    ));
    let (events_tx, events) = mpsc::unbounded_channel();
    let player = PlayerHandle::spawn(
        GuildId::new(9),
        settings,
        resolver,
        Arc::clone(&backend) as Arc<dyn AudioBackend>,
        events_tx,
    );
    player
        .join(ChannelId::new(10), ChannelId::new(20))
        .await
        .unwrap();

    Harness {
        player,
        lookup,
        backend,
        events,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<(GuildId, PlayerEvent)>) -> PlayerEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no llegó ningún evento")
        .expect("canal de eventos cerrado")
        .1
}

const URL_A: &str = "https://www.youtube.com/watch?v=aaa";
const URL_B: &str = "https://www.youtube.com/watch?v=bbb";

fn user(n: u64) -> UserId {
    UserId::new(n)
}

#[tokio::test]
async fn enqueue_play_complete_stop_cycle() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.lookup
        .put(URL_B, vec![track("Song B", URL_B, "https://cdn/b")]);

    // Cola vacía: la primera canción arranca al toque.
    let ack = h.player.play(user(1), URL_A).await.unwrap();
    let started = match ack {
        PlayAck::Started(song) => song,
        other => panic!("esperaba Started, llegó {other:?}"),
    };
    assert_eq!(started.title, "Song A");
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "Song A"
    ));

    let progress = h.player.progress().await.unwrap();
    assert!(progress.elapsed < Duration::from_secs(2));
    assert_eq!(progress.total_secs, 180);

    // Con algo sonando, lo nuevo se encola detrás sin tocar la activa.
    let ack = h.player.play(user(2), URL_B).await.unwrap();
    assert!(matches!(ack, PlayAck::Queued { position: 1, .. }));
    let snapshot = h.player.queue_snapshot().await.unwrap();
    assert_eq!(
        snapshot.songs.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
        vec!["Song A", "Song B"]
    );

    // Fin natural de A sin loop: B pasa a ser el head activo.
    h.backend.finish_current();
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "Song B"
    ));
    let snapshot = h.player.queue_snapshot().await.unwrap();
    assert_eq!(snapshot.songs.len(), 1);

    // Stop con votación apagada: directo, cola limpia, Idle.
    let ack = h.player.stop(user(1), vec![user(1)]).await.unwrap();
    assert_eq!(ack, GateAck::Acted);
    assert!(h.player.queue_snapshot().await.unwrap().songs.is_empty());
    assert!(matches!(
        h.player.progress().await,
        Err(MusicError::NotPlaying)
    ));
    assert!(h.backend.stops.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn loop_replays_head_on_natural_completion() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);

    h.player.toggle_loop().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.backend.finish_current();
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "Song A"
    ));
    assert_eq!(h.backend.played_titles(), vec!["Song A", "Song A"]);
    assert_eq!(h.player.queue_snapshot().await.unwrap().songs.len(), 1);

    // Sin loop, el próximo fin vacía la cola.
    h.player.toggle_loop().await.unwrap();
    h.backend.finish_current();
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::QueueEnded
    ));
}

#[tokio::test]
async fn playback_failure_advances_even_under_loop() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.lookup
        .put(URL_B, vec![track("Song B", URL_B, "https://cdn/b")]);

    h.player.toggle_loop().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;
    h.player.play(user(1), URL_B).await.unwrap();

    // Una pista rota no se repite aunque el loop esté prendido.
    h.backend.fail_current("códec inválido");
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::PlaybackError { ref title, .. } if title == "Song A"
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "Song B"
    ));
}

#[tokio::test]
async fn majority_skip_vote_lifecycle() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);

    h.player.toggle_majority_vote().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;

    // 3 oyentes: skip necesita 2 aprobaciones; el invocador ya puso la suya.
    let listeners = vec![user(1), user(2), user(3)];
    let ack = h.player.skip(user(1), listeners.clone()).await.unwrap();
    let status = match ack {
        GateAck::Vote(status) => status,
        other => panic!("esperaba votación, llegó {other:?}"),
    };
    assert_eq!(status.kind, VoteKind::Skip);
    assert_eq!(status.outcome, VoteOutcome::Pending);
    // Quórum de skip con 3 oyentes: 2 a favor; ya hay 1, falta 1.
    assert_eq!(status.approvals_needed, 1);

    // Una segunda acción con voto pendiente se rechaza.
    assert!(matches!(
        h.player.skip(user(2), listeners).await,
        Err(MusicError::VoteInProgress)
    ));

    // La segunda aprobación cierra la votación y ejecuta el skip.
    let status = h
        .player
        .cast_vote(user(2), VoteChoice::Approve)
        .await
        .unwrap();
    assert_eq!(status.outcome, VoteOutcome::Approved);
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::VoteFinished {
            kind: VoteKind::Skip,
            outcome: VoteOutcome::Approved,
        }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::QueueEnded
    ));
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 1);

    // Cerrada la votación, votar de nuevo ya no tiene destino.
    assert!(matches!(
        h.player.cast_vote(user(3), VoteChoice::Approve).await,
        Err(MusicError::NoVote)
    ));
}

#[tokio::test]
async fn vote_deadline_rejects_without_quorum() {
    let settings = PlayerSettings {
        vote_timeout: Duration::from_millis(50),
        ..PlayerSettings::default()
    };
    let mut h = harness(settings).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);

    h.player.toggle_majority_vote().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;

    let ack = h
        .player
        .skip(user(1), vec![user(1), user(2), user(3)])
        .await
        .unwrap();
    assert!(matches!(
        ack,
        GateAck::Vote(status) if status.outcome == VoteOutcome::Pending
    ));

    // Nadie más vota: el deadline cierra la votación en contra.
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::VoteFinished {
            kind: VoteKind::Skip,
            outcome: VoteOutcome::Rejected(RejectReason::TimedOut),
        }
    ));
    // La canción sigue sonando.
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 0);
    assert!(h.player.progress().await.is_ok());
}

#[tokio::test]
async fn unanimous_stop_clears_queue() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.lookup
        .put(URL_B, vec![track("Song B", URL_B, "https://cdn/b")]);

    h.player.toggle_majority_vote().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;
    h.player.play(user(2), URL_B).await.unwrap();

    let listeners = vec![user(1), user(2)];
    let ack = h.player.stop(user(1), listeners).await.unwrap();
    let status = match ack {
        GateAck::Vote(status) => status,
        other => panic!("esperaba votación, llegó {other:?}"),
    };
    // Stop exige unanimidad: con 2 oyentes y 1 voto puesto falta 1.
    assert_eq!(status.approvals_needed, 1);
    assert_eq!(status.outcome, VoteOutcome::Pending);

    let status = h
        .player
        .cast_vote(user(2), VoteChoice::Approve)
        .await
        .unwrap();
    assert_eq!(status.outcome, VoteOutcome::Approved);
    let _ = next_event(&mut h.events).await; // VoteFinished

    assert!(h.player.queue_snapshot().await.unwrap().songs.is_empty());
    assert!(matches!(
        h.player.progress().await,
        Err(MusicError::NotPlaying)
    ));
}

#[tokio::test]
async fn expired_link_renews_before_starting() {
    let mut h = harness(PlayerSettings::default()).await;
    // La resolución inicial devuelve un link ya vencido; la renovación
    // entrega uno fresco.
    h.lookup.put(
        URL_A,
        vec![
            track("Song A", URL_A, "https://cdn/a?expire=100"),
            track("Song A", URL_A, "https://cdn/a?expire=99999999999"),
        ],
    );

    let ack = h.player.play(user(1), URL_A).await.unwrap();
    assert!(matches!(ack, PlayAck::Started(_)));
    let _ = next_event(&mut h.events).await;

    // Dos resoluciones: la original y la renovación del link.
    assert_eq!(h.lookup.url_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.backend.last_link(),
        Some("https://cdn/a?expire=99999999999".to_string())
    );
    // El head quedó con el link renovado.
    let snapshot = h.player.queue_snapshot().await.unwrap();
    assert_eq!(snapshot.songs[0].link, "https://cdn/a?expire=99999999999");
}

#[tokio::test]
async fn renewal_failure_skips_to_next_song() {
    let mut h = harness(PlayerSettings::default()).await;
    let url_c = "https://www.youtube.com/watch?v=ccc";
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    // B queda encolada con el link ya vencido; no se chequea hasta que le
    // toca arrancar.
    h.lookup.put(
        URL_B,
        vec![track("Song B", URL_B, "https://cdn/b?expire=100")],
    );
    h.lookup
        .put(url_c, vec![track("Song C", url_c, "https://cdn/c")]);

    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;
    h.player.play(user(1), URL_B).await.unwrap();
    h.player.play(user(1), url_c).await.unwrap();

    // El origen de B deja de resolver: su renovación va a fallar.
    h.lookup.responses.lock().remove(URL_B);

    // Fin de A: B vencida y sin renovación posible se auto-salta, C arranca.
    h.backend.finish_current();
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::RenewalFailed { ref title, .. } if title == "Song B"
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "Song C"
    ));
    let snapshot = h.player.queue_snapshot().await.unwrap();
    assert_eq!(
        snapshot.songs.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
        vec!["Song C"]
    );
}

#[tokio::test]
async fn playlist_partial_failure_keeps_source_order() {
    let mut h = harness(PlayerSettings::default()).await;
    let playlist_url = "https://www.youtube.com/playlist?list=plmix";
    let entries: Vec<String> = (1..=5)
        .map(|i| format!("https://www.youtube.com/watch?v=v{i}"))
        .collect();
    h.lookup.put_playlist(
        playlist_url,
        PlaylistMeta {
            name: "Mix".to_string(),
            song_count: 5,
            thumbnail: None,
        },
        entries.iter().map(String::as_str).collect(),
    );
    for i in [1usize, 2, 4, 5] {
        let url = &entries[i - 1];
        h.lookup.put(
            url,
            vec![track(&format!("v{i}"), url, &format!("https://cdn/v{i}"))],
        );
    }
    // v3 no resuelve: falla aislada, el resto sigue.

    let ack = h.player.play(user(1), playlist_url).await.unwrap();
    match ack {
        PlayAck::Playlist { meta, added, failed, started } => {
            assert_eq!(meta.name, "Mix");
            assert_eq!(added, 4);
            assert_eq!(failed, 1);
            assert!(started);
        }
        other => panic!("esperaba Playlist, llegó {other:?}"),
    }

    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::PlaylistItemFailed { .. }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "v1"
    ));
    let snapshot = h.player.queue_snapshot().await.unwrap();
    assert_eq!(
        snapshot.songs.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
        vec!["v1", "v2", "v4", "v5"]
    );
}

#[tokio::test]
async fn pause_resume_and_volume() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;

    assert_eq!(h.player.pause_toggle().await.unwrap(), PauseToggled::Paused);
    assert_eq!(h.backend.pauses.load(Ordering::SeqCst), 1);

    // resume() explícito es idempotente sobre Playing.
    h.player.resume().await.unwrap();
    h.player.resume().await.unwrap();
    assert_eq!(h.backend.resumes.load(Ordering::SeqCst), 1);

    assert_eq!(h.player.set_volume(150).await.unwrap(), 1.5);
    assert_eq!(h.backend.volumes.lock().last(), Some(&1.5));
    assert!(matches!(
        h.player.set_volume(201).await,
        Err(MusicError::InvalidVolume(201))
    ));
}

#[tokio::test]
async fn file_playback_respects_capability() {
    let mut settings = PlayerSettings::default();
    settings.capabilities.file_playback = false;
    let h = harness(settings).await;

    assert!(matches!(
        h.player.play_file(user(1), "/tmp/demo.ogg").await,
        Err(MusicError::Unsupported(_))
    ));

    let mut h = harness(PlayerSettings::default()).await;
    let ack = h.player.play_file(user(1), "/tmp/demo.ogg").await.unwrap();
    let started = match ack {
        PlayAck::Started(song) => song,
        other => panic!("esperaba Started, llegó {other:?}"),
    };
    assert_eq!(started.title, "demo.ogg");
    assert!(started.is_local_file);
    let _ = next_event(&mut h.events).await;
    // Los archivos locales no pasan por el chequeo de expiración.
    assert_eq!(h.lookup.url_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_bound_channel_soft_disconnects_but_keeps_binding() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.lookup
        .put(URL_B, vec![track("Song B", URL_B, "https://cdn/b")]);

    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;
    h.player.play(user(2), URL_B).await.unwrap();

    // Salidas que no vacían el canal vinculado no tocan nada.
    h.player.notify_departure(ChannelId::new(99), 0);
    h.player.notify_departure(ChannelId::new(10), 1);
    assert_eq!(h.player.queue_snapshot().await.unwrap().songs.len(), 2);

    // El último humano se va: desconexión soft, cola limpia, Idle.
    h.player.notify_departure(ChannelId::new(10), 0);
    assert!(h.player.queue_snapshot().await.unwrap().songs.is_empty());
    assert!(matches!(
        h.player.progress().await,
        Err(MusicError::NotPlaying)
    ));
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 1);

    // El vínculo queda latente: se puede volver a reproducir sin re-join.
    let ack = h.player.play(user(1), URL_A).await.unwrap();
    assert!(matches!(ack, PlayAck::Started(_)));
}

#[tokio::test]
async fn first_arrival_on_bound_channel_reconnects() {
    let h = harness(PlayerSettings::default()).await;
    // El join del arnés ya conectó una vez.
    assert_eq!(h.backend.connects.load(Ordering::SeqCst), 1);

    h.player.notify_arrival(ChannelId::new(10), 1);
    h.player.queue_snapshot().await.unwrap();
    assert_eq!(h.backend.connects.load(Ordering::SeqCst), 2);

    // Canal ajeno, o canal vinculado que ya tenía gente: no reconecta.
    h.player.notify_arrival(ChannelId::new(99), 1);
    h.player.notify_arrival(ChannelId::new(10), 2);
    h.player.queue_snapshot().await.unwrap();
    assert_eq!(h.backend.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn vote_resolves_once_when_threshold_and_deadline_race() {
    let settings = PlayerSettings {
        vote_timeout: Duration::from_millis(150),
        ..PlayerSettings::default()
    };
    let mut h = harness(settings).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);

    h.player.toggle_majority_vote().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.player
        .skip(user(1), vec![user(1), user(2), user(3)])
        .await
        .unwrap();
    let status = h
        .player
        .cast_vote(user(2), VoteChoice::Approve)
        .await
        .unwrap();
    assert_eq!(status.outcome, VoteOutcome::Approved);

    // Cierre por quórum: un solo VoteFinished, y el QueueEnded del skip.
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::VoteFinished {
            kind: VoteKind::Skip,
            outcome: VoteOutcome::Approved,
        }
    ));
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::QueueEnded
    ));

    // El deadline dispara después con la generación vieja y se ignora: no
    // hay un segundo cierre por timeout.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.events.try_recv().is_err());
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn skip_vote_is_voided_when_track_ends_naturally() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);

    h.player.toggle_majority_vote().await.unwrap();
    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;

    h.player
        .skip(user(1), vec![user(1), user(2), user(3)])
        .await
        .unwrap();

    // La pista termina sola antes del quórum: la votación queda sin objeto.
    h.backend.finish_current();
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::QueueEnded
    ));
    assert!(matches!(
        h.player.cast_vote(user(2), VoteChoice::Approve).await,
        Err(MusicError::NoVote)
    ));
    // Nada cortó ni volvió a vaciar la cola.
    assert_eq!(h.backend.stops.load(Ordering::SeqCst), 0);
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn paused_session_stays_paused_across_track_end() {
    let mut h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.lookup
        .put(URL_B, vec![track("Song B", URL_B, "https://cdn/b")]);

    h.player.play(user(1), URL_A).await.unwrap();
    let _ = next_event(&mut h.events).await;
    h.player.play(user(1), URL_B).await.unwrap();

    assert_eq!(h.player.pause_toggle().await.unwrap(), PauseToggled::Paused);

    // El stream pausado llega a EOF: la siguiente arranca pausada.
    h.backend.finish_current();
    assert!(matches!(
        next_event(&mut h.events).await,
        PlayerEvent::NowPlaying(song) if song.title == "Song B"
    ));
    // Sigue en pausa: el toggle la reanuda.
    assert_eq!(
        h.player.pause_toggle().await.unwrap(),
        PauseToggled::Resumed
    );
    assert_eq!(h.backend.pauses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn hard_leave_tears_controller_down() {
    let h = harness(PlayerSettings::default()).await;
    h.lookup
        .put(URL_A, vec![track("Song A", URL_A, "https://cdn/a")]);
    h.player.play(user(1), URL_A).await.unwrap();

    h.player.leave(true).await.unwrap();
    // El controlador está desmontado: todo comando posterior falla.
    assert!(matches!(
        h.player.play(user(1), URL_A).await,
        Err(MusicError::ControllerClosed)
    ));
}
