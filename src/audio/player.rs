//! # Guild Queue
//!
//! The per-guild playback state machine.
//!
//! ```text
//! Init ──play──▶ Playing ◀──setState──▶ Paused
//!                   │                      │
//!                   └──────destroy─────────┴──▶ Destroyed
//! ```
//!
//! ## Serialisation of work
//!
//! Every command and every playback notification takes the queue's async
//! mutex and keeps it for the whole operation, including the
//! stop → resolve → start sequence of a restart. `tokio::sync::Mutex` is
//! FIFO-fair, so two quick `skip` commands run one after the other and a
//! track-end notification that arrives mid-restart waits for it to finish.
//! At most one restart is in flight per queue.
//!
//! ## Stale notifications
//!
//! Each restart allocates a new [`PlaybackId`]. The transcode session and the
//! voice connection tag their notifications with it, and the queue drops any
//! notification whose id is not the current one. Stopping the previous track
//! therefore never triggers a second restart.
//!
//! A stream also runs dry when ffmpeg dies, so an end notification is only
//! treated as the natural end of a track once the session's process has
//! exited cleanly (or is still running after a short grace period).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::autoplay::{recommendation_query, AutoplayResolver};
use super::queue::{QueuePage, RepeatMode, TrackList};
use super::registry::{PlayerServices, QueueEvent, RegistryInner};
use super::transcode::{
    ProcessExit, TranscodeRequest, TranscodeSession, EXIT_GRACE, IDENTITY_FILTER,
};
use super::voice::{
    PlayOptions, PlaybackEvent, PlaybackEventReceiver, PlaybackEventSender, PlaybackId,
    Subscription, VoiceConnection,
};
use crate::error::{PlayerError, PlayerResult};
use crate::sources::Track;

pub const DEFAULT_BAR_SIZE: usize = 20;
pub const DEFAULT_POINTER: &str = "●";
pub const DEFAULT_LINE: &str = "▬";

/// Estado de reproducción de la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Init,
    Paused,
    Playing,
    Destroyed,
}

/// Dirección de `skip`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDirection {
    Previous,
    Next,
}

/// Barra de progreso de la canción actual
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackProgress {
    pub bar: String,
    pub percent: u8,
    pub elapsed: u64,
}

/// Estado serializable de una cola
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub track_index: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub guild_id: GuildId,
    pub text_channel_id: Option<ChannelId>,
    pub connection: Option<GuildId>,
    pub volume: f32,
    pub filter: String,
    pub state: QueueState,
    pub repeat: RepeatMode,
    pub tracks: Vec<Track>,
    pub history: Vec<Track>,
    pub custom: BTreeMap<String, serde_json::Value>,
}

struct QueueInner {
    tracks: TrackList,
    autoplay: AutoplayResolver,
    session: Option<TranscodeSession>,
    connection: Option<Arc<dyn VoiceConnection>>,
    subscription: Option<Subscription>,
    events: Option<PlaybackEventSender>,
    playback: PlaybackId,
    playback_started: Option<Instant>,
    seek: u64,
    volume: f32,
    filter: String,
    state: QueueState,
    repeat: RepeatMode,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    text_channel_id: Option<ChannelId>,
    custom: BTreeMap<String, serde_json::Value>,
}

impl QueueInner {
    fn ensure_alive(&self) -> PlayerResult<()> {
        if self.state == QueueState::Destroyed {
            return Err(PlayerError::Destroyed);
        }
        Ok(())
    }

    fn elapsed(&self) -> u64 {
        self.playback_started
            .map(|started| started.elapsed().as_secs())
            .unwrap_or(0)
            + self.seek
    }
}

/// Cola de reproducción de una guild
pub struct GuildQueue {
    guild_id: GuildId,
    services: Arc<PlayerServices>,
    registry: Weak<RegistryInner>,
    inner: Mutex<QueueInner>,
}

impl GuildQueue {
    pub(crate) fn new(
        connection: Arc<dyn VoiceConnection>,
        text_channel_id: Option<ChannelId>,
        services: Arc<PlayerServices>,
        registry: Weak<RegistryInner>,
    ) -> Arc<Self> {
        let guild_id = connection.guild_id();
        let (events, receiver) = mpsc::unbounded_channel();
        let subscription = connection.subscribe(events.clone());

        let inner = QueueInner {
            tracks: TrackList::new(),
            autoplay: AutoplayResolver::new(),
            session: None,
            connection: Some(connection),
            subscription: Some(subscription),
            events: Some(events),
            playback: PlaybackId::default(),
            playback_started: None,
            seek: 0,
            volume: services.settings.default_volume / 100.0,
            filter: IDENTITY_FILTER.to_string(),
            state: QueueState::Init,
            repeat: RepeatMode::None,
            started_at: None,
            ended_at: None,
            text_channel_id,
            custom: BTreeMap::new(),
        };

        let queue = Arc::new(Self {
            guild_id,
            services,
            registry,
            inner: Mutex::new(inner),
        });

        tokio::spawn(pump_events(Arc::downgrade(&queue), receiver));
        queue
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega canciones al final de la cola sin tocar la reproducción
    pub async fn add_tracks(&self, requester: UserId, tracks: Vec<Track>) -> PlayerResult<Vec<Track>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        let max = self.services.settings.max_queue_size;
        if inner.tracks.len() + tracks.len() > max {
            return Err(PlayerError::QueueFull(max));
        }

        let added = inner.tracks.append(requester, tracks);
        self.services.emit(QueueEvent::TracksAdded {
            guild_id: self.guild_id,
            tracks: added.clone(),
        });

        Ok(added)
    }

    /// Reproduce la canción actual desde el inicio
    pub async fn play(&self) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;
        self.restart_or_fail(&mut inner, 0).await
    }

    /// Inicia la reproducción solo si la cola nunca ha sonado
    pub async fn start_if_idle(&self) -> PlayerResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        if inner.state != QueueState::Init {
            return Ok(false);
        }

        self.restart_or_fail(&mut inner, 0).await?;
        Ok(true)
    }

    /// Cambia el filtro de ffmpeg y reinicia la canción
    pub async fn set_filter(&self, fragments: &[String]) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        inner.filter = if fragments.is_empty() {
            IDENTITY_FILTER.to_string()
        } else {
            fragments.join(",")
        };
        info!("🎛️ Filtro de guild {}: {}", self.guild_id, inner.filter);

        self.restart_or_fail(&mut inner, 0).await
    }

    /// Ajusta el volumen a partir de un porcentaje; devuelve el multiplicador aplicado
    pub async fn set_volume(&self, percent: Option<f32>) -> PlayerResult<f32> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        let percent = percent.unwrap_or(self.services.settings.default_volume);
        inner.volume = percent / 100.0;

        if let Some(connection) = inner.connection.clone() {
            if let Err(e) = connection.set_volume(inner.volume).await {
                let err = PlayerError::connection(e);
                self.fail(&mut inner, err.clone()).await;
                return Err(err);
            }
        }

        info!("🔊 Volumen de guild {} ajustado a {}%", self.guild_id, percent);
        Ok(inner.volume)
    }

    /// Pausa o reanuda sin reiniciar la sesión
    pub async fn set_state(&self, target: QueueState) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        if inner.state == QueueState::Init {
            return Err(PlayerError::InvalidState(
                "no hay nada reproduciéndose".to_string(),
            ));
        }

        let Some(connection) = inner.connection.clone() else {
            return Err(PlayerError::Destroyed);
        };

        let result = match target {
            QueueState::Paused => connection.pause().await,
            QueueState::Playing => connection.resume().await,
            other => {
                return Err(PlayerError::InvalidState(format!("{:?}", other)));
            }
        };

        if let Err(e) = result {
            let err = PlayerError::connection(e);
            self.fail(&mut inner, err.clone()).await;
            return Err(err);
        }

        inner.state = target;
        match target {
            QueueState::Paused => info!("⏸️ Reproducción pausada en guild {}", self.guild_id),
            _ => info!("▶️ Reproducción reanudada en guild {}", self.guild_id),
        }
        Ok(())
    }

    /// Cambia el modo de repetición; aplica al terminar la canción actual
    pub async fn set_repeat(&self, mode: RepeatMode) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        inner.repeat = mode;
        match mode {
            RepeatMode::None => info!("➡️ Repetición desactivada"),
            RepeatMode::Track => info!("🔂 Repetir canción activado"),
            RepeatMode::Queue => info!("🔁 Repetir cola activado"),
            RepeatMode::Autoplay => info!("📻 Autoplay activado"),
        }
        Ok(())
    }

    /// Salta a la canción siguiente o anterior (con vuelta)
    pub async fn skip(&self, direction: SkipDirection) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        if inner.tracks.is_empty() {
            return Err(PlayerError::EmptyQueue);
        }

        match direction {
            SkipDirection::Next => inner.tracks.advance(),
            SkipDirection::Previous => inner.tracks.retreat(),
        }
        info!("⏭️ Skip {:?} en guild {}", direction, self.guild_id);

        self.restart_or_fail(&mut inner, 0).await
    }

    /// Reinicia la canción actual desde `seconds`
    pub async fn seek(&self, seconds: u64) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;

        info!("⏩ Seek a {}s en guild {}", seconds, self.guild_id);
        self.restart_or_fail(&mut inner, seconds).await
    }

    /// Mezcla la cola sin afectar lo que suena
    pub async fn shuffle(&self) -> PlayerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_alive()?;
        inner.tracks.shuffle();
        Ok(())
    }

    /// Calcula la barra de progreso de la canción actual
    pub async fn progress(&self, size: usize, pointer: &str, line: &str) -> TrackProgress {
        let inner = self.inner.lock().await;

        let total = inner.tracks.current().map(|t| t.duration.value).unwrap_or(0);
        let elapsed = inner.elapsed();

        render_progress(elapsed, total, size, pointer, line)
    }

    /// Busca la letra de la canción actual
    pub async fn lyrics(&self) -> PlayerResult<Option<String>> {
        let query = {
            let inner = self.inner.lock().await;
            inner.ensure_alive()?;
            let track = inner.tracks.current().ok_or(PlayerError::EmptyQueue)?;
            recommendation_query(track)
        };

        debug!("📝 Buscando letra: {}", query);
        self.services.providers.lyrics(&query).await
    }

    /// Destruye la cola; llamadas repetidas no hacen nada
    pub async fn destroy(&self) {
        let mut inner = self.inner.lock().await;
        self.destroy_locked(&mut inner).await;
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock().await;
        self.snapshot_of(&inner)
    }

    pub async fn state(&self) -> QueueState {
        self.inner.lock().await.state
    }

    pub async fn repeat(&self) -> RepeatMode {
        self.inner.lock().await.repeat
    }

    pub async fn volume(&self) -> f32 {
        self.inner.lock().await.volume
    }

    pub async fn filter(&self) -> String {
        self.inner.lock().await.filter.clone()
    }

    pub async fn cursor(&self) -> usize {
        self.inner.lock().await.tracks.cursor()
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.tracks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.tracks.is_empty()
    }

    pub async fn now_playing(&self) -> Option<Track> {
        self.inner.lock().await.tracks.current().cloned()
    }

    pub async fn history(&self) -> Vec<Track> {
        self.inner.lock().await.tracks.history().to_vec()
    }

    /// Página de las canciones pendientes
    pub async fn upcoming_page(&self, page: usize, per_page: usize) -> QueuePage {
        let inner = self.inner.lock().await;
        QueuePage::of(inner.tracks.upcoming(), page, per_page)
    }

    /// Duración total de la cola en segundos
    pub async fn total_duration(&self) -> u64 {
        self.inner.lock().await.tracks.total_duration()
    }

    pub async fn text_channel_id(&self) -> Option<ChannelId> {
        self.inner.lock().await.text_channel_id
    }

    pub async fn set_text_channel_id(&self, channel_id: Option<ChannelId>) {
        self.inner.lock().await.text_channel_id = channel_id;
    }

    /// Guarda un valor arbitrario asociado a la cola
    pub async fn set_custom<T: Serialize>(&self, key: &str, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.inner.lock().await.custom.insert(key.to_string(), value);
        Ok(())
    }

    /// Lee un valor guardado con [`GuildQueue::set_custom`]
    pub async fn custom<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.lock().await;
        let value = inner.custom.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    async fn handle_playback_event(&self, event: PlaybackEvent) {
        let mut inner = self.inner.lock().await;

        if inner.state == QueueState::Destroyed {
            return;
        }
        if event.playback() != inner.playback {
            debug!(
                "Ignorando evento de reproducción obsoleta {} (actual {})",
                event.playback(),
                inner.playback
            );
            return;
        }

        match event {
            PlaybackEvent::Ended(_) => {
                // El stream también se agota cuando ffmpeg muere
                let exit = match inner.session.as_ref() {
                    Some(session) => session.exit_status(EXIT_GRACE).await,
                    None => None,
                };
                if let Some(ProcessExit::Failure(message)) = exit {
                    self.fail(&mut inner, PlayerError::Stream(message)).await;
                    return;
                }

                if let Err(err) = self.on_track_end(&mut inner).await {
                    self.fail(&mut inner, err).await;
                }
            }
            PlaybackEvent::Errored(_, message) => {
                self.fail(&mut inner, PlayerError::Stream(message)).await;
            }
        }
    }

    async fn on_track_end(&self, inner: &mut QueueInner) -> PlayerResult<()> {
        if inner.tracks.is_empty() || inner.tracks.cursor() >= inner.tracks.len() {
            info!("📭 Cola de guild {} terminada", self.guild_id);
            self.destroy_locked(inner).await;
            return Ok(());
        }

        match inner.repeat {
            RepeatMode::None => {
                if !inner.tracks.step_forward() {
                    info!("📭 No hay más canciones en guild {}", self.guild_id);
                    self.destroy_locked(inner).await;
                    return Ok(());
                }
            }
            RepeatMode::Track => {
                debug!("🔂 Repitiendo canción en guild {}", self.guild_id);
            }
            RepeatMode::Queue => inner.tracks.advance(),
            RepeatMode::Autoplay => self.queue_recommendation(inner).await?,
        }

        self.restart(inner, 0).await
    }

    async fn queue_recommendation(&self, inner: &mut QueueInner) -> PlayerResult<()> {
        let current = inner.tracks.current().cloned().ok_or(PlayerError::EmptyQueue)?;

        let QueueInner {
            autoplay, tracks, ..
        } = inner;
        autoplay
            .ensure_filled(
                &current,
                tracks.history(),
                &self.services.providers,
                self.services.settings.autoplay_search_count,
            )
            .await?;

        if let Some(next) = autoplay.take_next() {
            info!("📻 Autoplay: {}", next.title);
            let added = tracks.append(self.services.bot_user_id, vec![next]);
            self.services.emit(QueueEvent::TracksAdded {
                guild_id: self.guild_id,
                tracks: added,
            });
        }

        if !tracks.step_forward() {
            return Err(PlayerError::AutoplayExhausted);
        }
        Ok(())
    }

    async fn restart_or_fail(&self, inner: &mut QueueInner, seek: u64) -> PlayerResult<()> {
        match self.restart(inner, seek).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.is_fatal() {
                    self.fail(inner, err.clone()).await;
                }
                Err(err)
            }
        }
    }

    /// Detiene la sesión anterior, resuelve la fuente y adjunta una sesión nueva
    async fn restart(&self, inner: &mut QueueInner, seek: u64) -> PlayerResult<()> {
        let track = inner.tracks.current().cloned().ok_or(PlayerError::EmptyQueue)?;
        let connection = inner.connection.clone().ok_or(PlayerError::Destroyed)?;
        let events = inner.events.clone().ok_or(PlayerError::Destroyed)?;

        inner.playback = inner.playback.next();
        let playback = inner.playback;
        inner.playback_started = None;

        if let Some(mut session) = inner.session.take() {
            session.stop();
        }
        connection.stop().await.map_err(PlayerError::connection)?;

        info!("🎵 Reproduciendo: {} ({})", track.title, playback);

        let source_url = self
            .services
            .resolver
            .resolve(&track.url)
            .await
            .map_err(PlayerError::resolution)?;

        let request = TranscodeRequest {
            source_url,
            filter: inner.filter.clone(),
            seek,
        };
        let (session, stream) =
            TranscodeSession::start(self.services.transcoder.as_ref(), request, playback, events)
                .map_err(PlayerError::stream)?;

        inner.session = Some(session);
        inner.seek = seek;
        if inner.started_at.is_none() {
            inner.started_at = Some(Utc::now());
        }
        inner.state = QueueState::Playing;

        connection
            .set_volume(inner.volume)
            .await
            .map_err(PlayerError::connection)?;
        connection
            .play(
                stream,
                PlayOptions {
                    playback,
                    inline_volume: true,
                },
            )
            .await
            .map_err(PlayerError::connection)?;

        inner.playback_started = Some(Instant::now());
        inner.tracks.record_history(&track);

        self.services.emit(QueueEvent::TrackStarted {
            guild_id: self.guild_id,
            track,
            text_channel_id: inner.text_channel_id,
        });
        Ok(())
    }

    async fn fail(&self, inner: &mut QueueInner, err: PlayerError) {
        error!("❌ Error fatal en la cola de guild {}: {}", self.guild_id, err);
        self.destroy_locked(inner).await;
        self.services.emit(QueueEvent::Error {
            guild_id: self.guild_id,
            error: err,
            text_channel_id: inner.text_channel_id,
        });
    }

    async fn destroy_locked(&self, inner: &mut QueueInner) {
        if inner.state == QueueState::Destroyed {
            return;
        }

        inner.playback = inner.playback.next();
        inner.playback_started = None;
        if let Some(mut session) = inner.session.take() {
            session.stop();
        }
        inner.events = None;

        if let Some(connection) = inner.connection.take() {
            if let Some(subscription) = inner.subscription.take() {
                connection.unsubscribe(subscription);
            }
            if let Err(e) = connection.stop().await {
                warn!("⚠️ Error al detener la conexión de guild {}: {:#}", self.guild_id, e);
            }
            if let Err(e) = connection.disconnect().await {
                warn!("⚠️ Error al desconectar guild {}: {:#}", self.guild_id, e);
            }
        }

        inner.ended_at = Some(Utc::now());
        inner.state = QueueState::Destroyed;

        if let Some(registry) = self.registry.upgrade() {
            registry.release(self);
        }

        info!("👋 Cola de guild {} destruida", self.guild_id);
        self.services.emit(QueueEvent::QueueEnded(self.snapshot_of(inner)));
    }

    fn snapshot_of(&self, inner: &QueueInner) -> QueueSnapshot {
        QueueSnapshot {
            track_index: inner.tracks.cursor(),
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            guild_id: self.guild_id,
            text_channel_id: inner.text_channel_id,
            connection: inner.connection.as_ref().map(|c| c.guild_id()),
            volume: inner.volume,
            filter: inner.filter.clone(),
            state: inner.state,
            repeat: inner.repeat,
            tracks: inner.tracks.tracks().to_vec(),
            history: inner.tracks.history().to_vec(),
            custom: inner.custom.clone(),
        }
    }
}

async fn pump_events(queue: Weak<GuildQueue>, mut receiver: PlaybackEventReceiver) {
    while let Some(event) = receiver.recv().await {
        let Some(queue) = queue.upgrade() else {
            break;
        };
        queue.handle_playback_event(event).await;
    }
    debug!("Canal de eventos de reproducción cerrado");
}

/// Dibuja la barra de progreso: `line * lleno + pointer + line * resto`
pub fn render_progress(
    elapsed: u64,
    total: u64,
    size: usize,
    pointer: &str,
    line: &str,
) -> TrackProgress {
    if total == 0 || elapsed == 0 {
        return TrackProgress {
            bar: format!("{}{}", pointer, line.repeat(size)),
            percent: 0,
            elapsed,
        };
    }

    let ratio = (elapsed as f64 / total as f64).min(1.0);
    let filled = ((ratio * size as f64).round() as usize).min(size);

    TrackProgress {
        bar: format!(
            "{}{}{}",
            line.repeat(filled),
            pointer,
            line.repeat(size - filled)
        ),
        percent: (ratio * 100.0).floor() as u8,
        elapsed,
    }
}
