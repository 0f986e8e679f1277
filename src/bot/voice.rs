use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{AudioStream, Input, LiveInput},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use symphonia::core::{
    io::{MediaSource, ReadOnlySource},
    probe::Hint,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::voice::{
    Listeners, PlayOptions, PlaybackEvent, PlaybackEventSender, PlaybackId, Subscription,
    TranscodedStream, VoiceConnection,
};

/// Conexión de voz de songbird para una guild
pub struct SongbirdConnection {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    listeners: Arc<Listeners>,
    current: parking_lot::Mutex<Option<TrackHandle>>,
    volume: parking_lot::Mutex<f32>,
}

impl SongbirdConnection {
    /// Se une al canal de voz y envuelve la llamada resultante
    pub async fn join(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<Self>> {
        let call = manager
            .join(guild_id, channel_id)
            .await
            .context("Error al conectar al canal de voz")?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(Self {
            guild_id,
            manager,
            call,
            listeners: Arc::new(Listeners::new()),
            current: parking_lot::Mutex::new(None),
            volume: parking_lot::Mutex::new(1.0),
        }))
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn subscribe(&self, events: PlaybackEventSender) -> Subscription {
        self.listeners.add(events)
    }

    fn unsubscribe(&self, subscription: Subscription) {
        self.listeners.remove(subscription);
    }

    async fn play(&self, stream: TranscodedStream, options: PlayOptions) -> Result<()> {
        let mut hint = Hint::new();
        hint.with_extension(stream.format.extension());

        let source: Box<dyn MediaSource> = Box::new(ReadOnlySource::new(stream.reader));
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: source,
                hint: Some(hint),
            }),
            None,
        );

        let handle = self.call.lock().await.play_only_input(input);

        for (event, kind) in [
            (TrackEvent::End, NotifyKind::End),
            (TrackEvent::Error, NotifyKind::Error),
        ] {
            handle
                .add_event(
                    Event::Track(event),
                    PlaybackNotifier {
                        playback: options.playback,
                        listeners: self.listeners.clone(),
                        kind,
                    },
                )
                .context("No se pudo registrar el evento de la pista")?;
        }

        if options.inline_volume {
            handle.set_volume(*self.volume.lock())?;
        }

        debug!("🎧 Pista {} adjuntada en guild {}", options.playback, self.guild_id);
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.current.lock().take();
        self.call.lock().await.stop();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        match self.current() {
            Some(handle) => Ok(handle.pause()?),
            None => Ok(()),
        }
    }

    async fn resume(&self) -> Result<()> {
        match self.current() {
            Some(handle) => Ok(handle.play()?),
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        *self.volume.lock() = volume;
        if let Some(handle) = self.current() {
            handle.set_volume(volume)?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum NotifyKind {
    End,
    Error,
}

/// Reenvía fin y error de una pista a los receptores, etiquetados con su reproducción
struct PlaybackNotifier {
    playback: PlaybackId,
    listeners: Arc<Listeners>,
    kind: NotifyKind,
}

#[async_trait]
impl VoiceEventHandler for PlaybackNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let event = match self.kind {
            NotifyKind::End => PlaybackEvent::Ended(self.playback),
            NotifyKind::Error => {
                let message = match ctx {
                    EventContext::Track(tracks) => tracks
                        .iter()
                        .find_map(|(state, _)| match &state.playing {
                            PlayMode::Errored(e) => Some(e.to_string()),
                            _ => None,
                        }),
                    _ => None,
                }
                .unwrap_or_else(|| "error desconocido en la pista".to_string());

                warn!("❌ Error en pista {}: {}", self.playback, message);
                PlaybackEvent::Errored(self.playback, message)
            }
        };

        self.listeners.notify(event);
        None
    }
}
