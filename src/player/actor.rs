//! Tarea controladora de una sesión de reproducción.
//!
//! Todo el estado mutable vive acá adentro; los comandos llegan por mpsc y
//! se atienden de a uno. Los fines de pista, los deadlines de votación y los
//! resultados de resolución entran como mensajes, nunca como mutación
//! directa.

use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, TrackEnd};
use crate::error::{MusicError, Result};
use crate::player::state::{PlaybackState, PlaybackTimer, Progress};
use crate::player::{
    Command, GateAck, PauseToggled, PlayAck, PlayerEvent, PlayerSettings, QueueSnapshot,
    VoiceSession, VoteStatus,
};
use crate::queue::SongQueue;
use crate::sources::{expiry, Resolved, Resolver, Song};
use crate::vote::{VoteChoice, VoteKind, VoteOutcome, VoteSession};

/// Mensajes que el controlador se manda a sí mismo desde tareas auxiliares.
enum Internal {
    Resolved {
        epoch: u64,
        outcome: Result<Resolved>,
        reply: oneshot::Sender<Result<PlayAck>>,
    },
    VoteDeadline {
        generation: u64,
    },
}

pub(super) fn spawn(
    guild_id: GuildId,
    settings: PlayerSettings,
    resolver: Arc<Resolver>,
    backend: Arc<dyn AudioBackend>,
    events: mpsc::UnboundedSender<(GuildId, PlayerEvent)>,
) -> mpsc::UnboundedSender<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    let (internal_tx, internal_rx) = mpsc::unbounded_channel();
    let (end_tx, end_rx) = mpsc::unbounded_channel();

    let actor = Actor {
        guild_id,
        settings,
        resolver,
        backend,
        events,
        internal_tx,
        end_tx,
        session: None,
        queue: SongQueue::new(),
        state: PlaybackState::Idle,
        timer: PlaybackTimer::default(),
        volume: 1.0,
        looping: false,
        majority_vote: false,
        vote: None,
        vote_generation: 0,
        track_seq: 0,
        epoch: 0,
    };

    tokio::spawn(actor.run(rx, internal_rx, end_rx));
    tx
}

struct Actor {
    guild_id: GuildId,
    settings: PlayerSettings,
    resolver: Arc<Resolver>,
    backend: Arc<dyn AudioBackend>,
    events: mpsc::UnboundedSender<(GuildId, PlayerEvent)>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    end_tx: mpsc::UnboundedSender<TrackEnd>,

    session: Option<VoiceSession>,
    queue: SongQueue,
    state: PlaybackState,
    timer: PlaybackTimer,
    volume: f32,
    looping: bool,
    majority_vote: bool,
    vote: Option<VoteSession>,
    /// Invalida deadlines de votaciones ya resueltas.
    vote_generation: u64,
    /// Identifica la pista en curso; avisos de fin con otro seq se descartan.
    track_seq: u64,
    /// Invalida resoluciones en vuelo de una sesión ya desmontada.
    epoch: u64,
}

impl Actor {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        mut end_rx: mpsc::UnboundedReceiver<TrackEnd>,
    ) {
        self.volume = self.settings.default_volume;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            break;
                        }
                    }
                    // Todos los handles se soltaron.
                    None => break,
                },
                Some(end) = end_rx.recv() => self.handle_track_end(end).await,
                Some(msg) = internal_rx.recv() => self.handle_internal(msg).await,
            }
        }

        debug!("🧹 Controlador de {} desmontado", self.guild_id);
    }

    /// Devuelve `true` cuando el controlador debe desmontarse (leave hard).
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Play { requester, query, reply } => {
                if self.session.is_none() {
                    let _ = reply.send(Err(MusicError::NotConnected));
                    return false;
                }
                // La resolución puede tardar segundos; corre aparte y vuelve
                // como mensaje con el epoch de esta sesión.
                let resolver = Arc::clone(&self.resolver);
                let internal = self.internal_tx.clone();
                let epoch = self.epoch;
                tokio::spawn(async move {
                    let outcome = resolver.resolve(requester, &query).await;
                    let _ = internal.send(Internal::Resolved { epoch, outcome, reply });
                });
            }
            Command::PlayFile { requester, file_ref, reply } => {
                let ack = self.play_file(requester, file_ref).await;
                let _ = reply.send(ack);
            }
            Command::PauseToggle { reply } => {
                let _ = reply.send(self.pause_toggle().await);
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            Command::Skip { voter, listeners, reply } => {
                let ack = self.gated_action(VoteKind::Skip, voter, listeners).await;
                let _ = reply.send(ack);
            }
            Command::Stop { voter, listeners, reply } => {
                let ack = self.gated_action(VoteKind::Stop, voter, listeners).await;
                let _ = reply.send(ack);
            }
            Command::CastVote { voter, choice, reply } => {
                let _ = reply.send(self.cast_vote(voter, choice).await);
            }
            Command::ToggleLoop { reply } => {
                self.looping = !self.looping;
                info!(
                    "🔁 Loop {} para {}",
                    if self.looping { "activado" } else { "desactivado" },
                    self.guild_id
                );
                let _ = reply.send(Ok(self.looping));
            }
            Command::ToggleMajorityVote { reply } => {
                let _ = reply.send(self.toggle_majority_vote());
            }
            Command::Shuffle { reply } => {
                // Sin sesión vinculada no hay nada que mezclar.
                if self.session.is_some() {
                    self.queue.shuffle_rest();
                    info!("🔀 Cola mezclada para {}", self.guild_id);
                }
                let _ = reply.send(Ok(()));
            }
            Command::SetVolume { percent, reply } => {
                let _ = reply.send(self.set_volume(percent).await);
            }
            Command::MoveSong { from, to, reply } => {
                let _ = reply.send(self.queue.move_to(from, to));
            }
            Command::RemoveSong { index, reply } => {
                let _ = reply.send(self.queue.remove_at(index));
            }
            Command::Progress { reply } => {
                let _ = reply.send(self.progress());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(QueueSnapshot {
                    songs: self.queue.snapshot(),
                });
            }
            Command::Search { query, limit, reply } => {
                // Solo lectura: no toca estado, puede correr aparte.
                let resolver = Arc::clone(&self.resolver);
                tokio::spawn(async move {
                    let _ = reply.send(resolver.search(&query, limit).await);
                });
            }
            Command::Join { voice, output, reply } => {
                let _ = reply.send(self.join(voice, output).await);
            }
            Command::Leave { hard, reply } => {
                let result = self.leave(hard).await;
                let ok = result.is_ok();
                let _ = reply.send(result);
                return hard && ok;
            }
            Command::Arrival { channel, non_bot_count } => {
                self.on_arrival(channel, non_bot_count).await;
            }
            Command::Departure { channel, non_bot_remaining } => {
                self.on_departure(channel, non_bot_remaining).await;
            }
        }

        false
    }

    async fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Resolved { epoch, outcome, reply } => {
                if epoch != self.epoch || self.session.is_none() {
                    // Resultado tardío de una sesión que ya no existe.
                    let _ = reply.send(Err(MusicError::SessionEnded));
                    return;
                }
                let ack = match outcome {
                    Ok(Resolved::Song(song)) => self.enqueue_song(song).await,
                    Ok(Resolved::Playlist { meta, songs, failures }) => {
                        self.enqueue_playlist(meta, songs, failures).await
                    }
                    Err(err) => Err(err),
                };
                let _ = reply.send(ack);
            }
            Internal::VoteDeadline { generation } => {
                if generation != self.vote_generation {
                    return;
                }
                if let Some(vote) = &self.vote {
                    let outcome = vote.timed_out();
                    info!(
                        "⏰ Votación de {} expiró sin quórum en {}",
                        vote.kind().as_str(),
                        self.guild_id
                    );
                    self.finish_vote(outcome).await;
                }
            }
        }
    }

    /// Fin de pista reportado por el backend (natural o por falla).
    async fn handle_track_end(&mut self, end: TrackEnd) {
        if end.seq != self.track_seq || self.state == PlaybackState::Idle {
            return;
        }

        // Una votación de skip pendiente queda sin objeto: la pista que se
        // quería saltar ya terminó sola. Se descarta para que una
        // aprobación tardía no corte la pista siguiente.
        if self.vote.as_ref().map(|vote| vote.kind()) == Some(VoteKind::Skip) {
            debug!("🗳️ Votación de skip descartada: la pista terminó sola");
            self.vote = None;
            self.vote_generation += 1;
        }

        let was_paused = self.state == PlaybackState::Paused;

        if let Some(message) = end.error {
            let title = self
                .queue
                .peek_head()
                .map(|song| song.title.clone())
                .unwrap_or_default();
            warn!("💥 Falla de reproducción en \"{}\": {}", title, message);
            self.emit(PlayerEvent::PlaybackError { title, message });
            // Una pista rota no se re-intenta aunque el loop esté prendido.
            self.queue.pop_head();
            self.advance().await;
        } else {
            self.complete_current().await;
        }

        // Fin de pista con la sesión en pausa (p. ej. EOF del stream): la
        // siguiente arranca pausada en vez de des-pausear en silencio.
        if was_paused && self.state == PlaybackState::Playing {
            if let Some(session) = self.session {
                if let Err(err) = self.backend.pause(&session).await {
                    warn!("⚠️ Error del backend al re-pausar: {}", err);
                }
            }
            self.timer.pause(Instant::now());
            self.state = PlaybackState::Paused;
        }
    }

    /// Transición de fin natural: con loop el head se repite, sin loop se
    /// descarta y sigue el próximo.
    async fn complete_current(&mut self) {
        if !self.looping {
            self.queue.pop_head();
        }
        self.advance().await;
    }

    async fn advance(&mut self) {
        if self.queue.is_empty() {
            self.state = PlaybackState::Idle;
            self.timer.reset();
            info!("🏁 Cola terminada para {}", self.guild_id);
            self.emit(PlayerEvent::QueueEnded);
            return;
        }
        if self.start_head().await.is_err() {
            // Se agotó la cola saltando canciones irreproducibles; cada
            // falla ya salió como evento.
            self.emit(PlayerEvent::QueueEnded);
        }
    }

    /// Arranca el head de la cola, renovando el stream link si ya expiró.
    /// Las canciones que no se pueden arrancar se saltan; devuelve la que
    /// quedó sonando o el último error si la cola se agotó.
    async fn start_head(&mut self) -> Result<Song> {
        let session = self.session.ok_or(MusicError::NotConnected)?;
        let mut last_err = MusicError::NotPlaying;

        while let Some(head) = self.queue.peek_head() {
            let mut song = head.clone();

            if !song.is_local_file && expiry::is_expired(&song.link, epoch_now()) {
                info!("⏳ Stream link vencido para \"{}\", renovando", song.title);
                match self.resolver.renew_link(&song.url).await {
                    Ok(link) => {
                        song.link = link.clone();
                        if let Some(head) = self.queue.peek_head_mut() {
                            head.link = link;
                        }
                    }
                    Err(cause) => {
                        let err = MusicError::Renewal {
                            title: song.title.clone(),
                            cause: cause.into(),
                        };
                        warn!("⚠️ {}", err);
                        self.emit(PlayerEvent::RenewalFailed {
                            title: song.title,
                            message: err.to_string(),
                        });
                        self.queue.pop_head();
                        last_err = err;
                        continue;
                    }
                }
            }

            self.track_seq += 1;
            match self
                .backend
                .play(&session, &song, self.volume, self.track_seq, self.end_tx.clone())
                .await
            {
                Ok(()) => {
                    self.state = PlaybackState::Playing;
                    self.timer.reset();
                    self.timer.start(Instant::now());
                    info!("🎵 Sonando \"{}\" en {}", song.title, self.guild_id);
                    self.emit(PlayerEvent::NowPlaying(song.clone()));
                    return Ok(song);
                }
                Err(cause) => {
                    let err = MusicError::Backend(cause);
                    warn!("💥 No se pudo arrancar \"{}\": {}", song.title, err);
                    self.emit(PlayerEvent::PlaybackError {
                        title: song.title,
                        message: err.to_string(),
                    });
                    self.queue.pop_head();
                    last_err = err;
                }
            }
        }

        self.state = PlaybackState::Idle;
        self.timer.reset();
        Err(last_err)
    }

    async fn enqueue_song(&mut self, song: Song) -> Result<PlayAck> {
        if self.queue.len() >= self.settings.max_queue_size {
            return Err(MusicError::QueueFull {
                max: self.settings.max_queue_size,
            });
        }

        let start_now = self.queue.is_empty() && self.state == PlaybackState::Idle;
        self.queue.push(song.clone());

        if start_now {
            let playing = self.start_head().await?;
            Ok(PlayAck::Started(playing))
        } else {
            let position = self.queue.len() - 1;
            debug!("➕ \"{}\" encolada en posición {}", song.title, position);
            Ok(PlayAck::Queued { song, position })
        }
    }

    async fn enqueue_playlist(
        &mut self,
        meta: crate::sources::PlaylistMeta,
        songs: Vec<Song>,
        failures: Vec<MusicError>,
    ) -> Result<PlayAck> {
        for failure in &failures {
            self.emit(PlayerEvent::PlaylistItemFailed {
                message: failure.to_string(),
            });
        }

        let was_empty = self.queue.is_empty() && self.state == PlaybackState::Idle;
        let mut added = 0usize;
        let mut overflow = 0usize;
        for song in songs {
            if self.queue.len() >= self.settings.max_queue_size {
                overflow += 1;
                continue;
            }
            self.queue.push(song);
            added += 1;
        }

        info!(
            "📋 Playlist \"{}\": {} encoladas, {} fallidas",
            meta.name,
            added,
            failures.len() + overflow
        );

        let started = was_empty && added > 0 && self.start_head().await.is_ok();
        Ok(PlayAck::Playlist {
            meta,
            added,
            failed: failures.len() + overflow,
            started,
        })
    }

    async fn play_file(&mut self, requester: UserId, file_ref: String) -> Result<PlayAck> {
        if !self.settings.capabilities.file_playback {
            return Err(MusicError::Unsupported("file playback"));
        }
        if self.session.is_none() {
            return Err(MusicError::NotConnected);
        }
        self.enqueue_song(Song::local_file(file_ref, requester)).await
    }

    async fn pause_toggle(&mut self) -> Result<PauseToggled> {
        let session = self.session.ok_or(MusicError::NotConnected)?;
        match self.state {
            PlaybackState::Playing => {
                self.backend
                    .pause(&session)
                    .await
                    .map_err(MusicError::Backend)?;
                self.timer.pause(Instant::now());
                self.state = PlaybackState::Paused;
                Ok(PauseToggled::Paused)
            }
            PlaybackState::Paused => {
                self.backend
                    .resume(&session)
                    .await
                    .map_err(MusicError::Backend)?;
                self.timer.resume(Instant::now());
                self.state = PlaybackState::Playing;
                Ok(PauseToggled::Resumed)
            }
            PlaybackState::Idle => Err(MusicError::NotPlaying),
        }
    }

    async fn resume(&mut self) -> Result<()> {
        if self.state != PlaybackState::Paused {
            return Ok(());
        }
        let session = self.session.ok_or(MusicError::NotConnected)?;
        self.backend
            .resume(&session)
            .await
            .map_err(MusicError::Backend)?;
        self.timer.resume(Instant::now());
        self.state = PlaybackState::Playing;
        Ok(())
    }

    fn toggle_majority_vote(&mut self) -> Result<bool> {
        if !self.settings.capabilities.majority_vote {
            return Err(MusicError::Unsupported("majority voting"));
        }
        self.majority_vote = !self.majority_vote;
        if !self.majority_vote && self.vote.is_some() {
            // Apagar el modo descarta la votación pendiente.
            self.vote = None;
            self.vote_generation += 1;
        }
        info!(
            "🗳️ Votación por mayoría {} para {}",
            if self.majority_vote { "activada" } else { "desactivada" },
            self.guild_id
        );
        Ok(self.majority_vote)
    }

    /// Skip/stop, con o sin votación según el flag de la sesión.
    async fn gated_action(
        &mut self,
        kind: VoteKind,
        voter: UserId,
        listeners: Vec<UserId>,
    ) -> Result<GateAck> {
        if self.session.is_none() {
            return Err(MusicError::NotConnected);
        }
        if kind == VoteKind::Skip && self.state == PlaybackState::Idle {
            return Err(MusicError::NotPlaying);
        }

        let gated = self.settings.capabilities.majority_vote && self.majority_vote;
        if !gated || listeners.is_empty() {
            self.perform(kind).await;
            return Ok(GateAck::Acted);
        }

        if self.vote.is_some() {
            return Err(MusicError::VoteInProgress);
        }

        let mut vote = VoteSession::new(kind, listeners);
        let outcome = vote.cast(voter, VoteChoice::Approve);
        let status = VoteStatus {
            kind,
            outcome,
            eligible: vote.eligible_count(),
            approvals_needed: vote.approvals_needed(),
        };

        if outcome.is_terminal() {
            // Único oyente: su voto decide al toque.
            self.emit(PlayerEvent::VoteFinished { kind, outcome });
            if outcome == VoteOutcome::Approved {
                self.perform(kind).await;
            }
            return Ok(GateAck::Vote(status));
        }

        info!(
            "🗳️ Votación de {} abierta en {}: faltan {} aprobaciones de {} oyentes",
            kind.as_str(),
            self.guild_id,
            vote.approvals_needed(),
            vote.eligible_count()
        );
        self.vote = Some(vote);
        self.vote_generation += 1;

        let internal = self.internal_tx.clone();
        let generation = self.vote_generation;
        let timeout = self.settings.vote_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = internal.send(Internal::VoteDeadline { generation });
        });

        Ok(GateAck::Vote(status))
    }

    async fn cast_vote(&mut self, voter: UserId, choice: VoteChoice) -> Result<VoteStatus> {
        let Some(vote) = self.vote.as_mut() else {
            return Err(MusicError::NoVote);
        };

        let outcome = vote.cast(voter, choice);
        let status = VoteStatus {
            kind: vote.kind(),
            outcome,
            eligible: vote.eligible_count(),
            approvals_needed: vote.approvals_needed(),
        };

        if outcome.is_terminal() {
            self.finish_vote(outcome).await;
        }

        Ok(status)
    }

    /// Cierra la votación pendiente exactamente una vez y ejecuta la acción
    /// si fue aprobada.
    async fn finish_vote(&mut self, outcome: VoteOutcome) {
        let Some(vote) = self.vote.take() else {
            return;
        };
        // Un deadline que llegue después de esto ya no matchea.
        self.vote_generation += 1;

        let kind = vote.kind();
        info!(
            "🗳️ Votación de {} en {} terminó: {:?}",
            kind.as_str(),
            self.guild_id,
            outcome
        );
        self.emit(PlayerEvent::VoteFinished { kind, outcome });

        if outcome == VoteOutcome::Approved {
            self.perform(kind).await;
        }
    }

    async fn perform(&mut self, kind: VoteKind) {
        match kind {
            VoteKind::Skip => self.do_skip().await,
            VoteKind::Stop => self.do_stop().await,
        }
    }

    /// Corta la pista actual y dispara la transición de fin. Con loop
    /// prendido el head vuelve a arrancar, igual que un fin natural.
    async fn do_skip(&mut self) {
        // Sin pista activa no hay nada que saltar.
        if self.state == PlaybackState::Idle {
            return;
        }
        let Some(session) = self.session else { return };
        // Invalida el aviso de fin de la pista cortada, por si el backend
        // lo emite igual.
        self.track_seq += 1;
        if let Err(err) = self.backend.stop(&session).await {
            warn!("⚠️ Error del backend al cortar la pista: {}", err);
        }
        info!("⏭️ Skip en {}", self.guild_id);
        self.complete_current().await;
    }

    async fn do_stop(&mut self) {
        self.track_seq += 1;
        if let Some(session) = self.session {
            if let Err(err) = self.backend.stop(&session).await {
                warn!("⚠️ Error del backend al detener: {}", err);
            }
        }
        self.queue.clear();
        self.looping = false;
        self.state = PlaybackState::Idle;
        self.timer.reset();
        info!("⏹️ Sesión {} detenida y cola limpia", self.guild_id);
    }

    async fn set_volume(&mut self, percent: u16) -> Result<f32> {
        if percent > 200 {
            return Err(MusicError::InvalidVolume(percent));
        }
        self.volume = f32::from(percent) / 100.0;
        if self.state != PlaybackState::Idle {
            if let Some(session) = self.session {
                self.backend
                    .set_volume(&session, self.volume)
                    .await
                    .map_err(MusicError::Backend)?;
            }
        }
        Ok(self.volume)
    }

    fn progress(&self) -> Result<Progress> {
        if self.state == PlaybackState::Idle {
            return Err(MusicError::NotPlaying);
        }
        let total_secs = self
            .queue
            .peek_head()
            .map(|song| song.duration_secs)
            .unwrap_or(0);
        Ok(Progress {
            elapsed: self.timer.elapsed(Instant::now()),
            total_secs,
        })
    }

    async fn join(
        &mut self,
        voice: serenity::model::id::ChannelId,
        output: serenity::model::id::ChannelId,
    ) -> Result<()> {
        self.backend
            .connect(voice)
            .await
            .map_err(MusicError::Backend)?;
        self.session = Some(VoiceSession { voice, output });
        info!("🔗 Sesión {} vinculada a voz {} / salida {}", self.guild_id, voice, output);
        Ok(())
    }

    /// Ambos sabores limpian cola, loop y reproducción. Soft deja el
    /// vínculo latente para que las reglas de presencia reconecten; hard
    /// desmonta el controlador.
    async fn leave(&mut self, hard: bool) -> Result<()> {
        if self.session.is_none() && !hard {
            return Err(MusicError::NotConnected);
        }

        self.do_stop().await;
        self.vote = None;
        self.vote_generation += 1;
        // Las resoluciones en vuelo quedan huérfanas.
        self.epoch += 1;

        if let Some(session) = self.session {
            if let Err(err) = self.backend.disconnect(session.voice, hard).await {
                warn!("⚠️ Error del backend al desconectar: {}", err);
            }
        }
        if hard {
            self.session = None;
        }
        info!(
            "👋 Sesión {} desvinculada ({})",
            self.guild_id,
            if hard { "hard" } else { "soft" }
        );
        Ok(())
    }

    /// Alguien entró a un canal de voz. Si es el canal vinculado y quedó
    /// como único ocupante humano, el bot se reconecta.
    async fn on_arrival(&mut self, channel: serenity::model::id::ChannelId, non_bot_count: usize) {
        let Some(session) = self.session else { return };
        if session.voice != channel || non_bot_count != 1 {
            return;
        }
        if let Err(err) = self.backend.connect(session.voice).await {
            warn!("⚠️ No se pudo reconectar a {}: {}", session.voice, err);
            return;
        }
        info!("👋 Reconectado a {} tras la llegada de un oyente", session.voice);
    }

    /// El último humano salió del canal vinculado: leave soft.
    async fn on_departure(
        &mut self,
        channel: serenity::model::id::ChannelId,
        non_bot_remaining: usize,
    ) {
        let Some(session) = self.session else { return };
        if session.voice != channel || non_bot_remaining != 0 {
            return;
        }
        info!("🚪 Canal {} quedó vacío, desconexión soft", session.voice);
        if let Err(err) = self.leave(false).await {
            warn!("⚠️ Desconexión soft falló: {}", err);
        }
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send((self.guild_id, event));
    }
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
