use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Identificador de una reproducción concreta dentro de una cola.
///
/// Cada reinicio asigna un id nuevo. Las notificaciones llevan el id de la
/// reproducción que las generó, así la cola descarta eventos de streams que
/// ya reemplazó.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackId(u64);

impl PlaybackId {
    pub fn next(self) -> Self {
        PlaybackId(self.0 + 1)
    }
}

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notificaciones asíncronas de la conexión y del transcodificador
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// El stream adjunto se agotó
    Ended(PlaybackId),
    /// El stream o el proceso fallaron
    Errored(PlaybackId, String),
}

impl PlaybackEvent {
    pub fn playback(&self) -> PlaybackId {
        match self {
            PlaybackEvent::Ended(id) | PlaybackEvent::Errored(id, _) => *id,
        }
    }
}

pub type PlaybackEventSender = mpsc::UnboundedSender<PlaybackEvent>;
pub type PlaybackEventReceiver = mpsc::UnboundedReceiver<PlaybackEvent>;

/// Handle devuelto por [`VoiceConnection::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Formato del stream que entrega el transcodificador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// PCM s16le 48 kHz estéreo dentro de un contenedor WAV
    Wav,
}

impl StreamFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StreamFormat::Wav => "wav",
        }
    }
}

/// Bytes de audio decodificado listos para la conexión de voz
pub struct TranscodedStream {
    pub reader: Box<dyn Read + Send + Sync>,
    pub format: StreamFormat,
}

impl std::fmt::Debug for TranscodedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodedStream")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Opciones de [`VoiceConnection::play`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub playback: PlaybackId,
    pub inline_volume: bool,
}

/// Conexión de voz de una guild.
///
/// La cola nunca es dueña de la conexión. Se suscribe una vez a los avisos de
/// fin y error y guarda la [`Subscription`] devuelta, así al destruirse quita
/// exactamente su propio receptor.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    fn guild_id(&self) -> GuildId;

    /// Registra un receptor de eventos de reproducción
    fn subscribe(&self, events: PlaybackEventSender) -> Subscription;

    fn unsubscribe(&self, subscription: Subscription);

    /// Reproduce el stream, reemplazando el que estuviera sonando
    async fn play(&self, stream: TranscodedStream, options: PlayOptions) -> Result<()>;

    /// Detiene el stream actual sin desconectar
    async fn stop(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Ajusta el volumen (1.0 = 100%)
    async fn set_volume(&self, volume: f32) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Registro de receptores compartido por las implementaciones de [`VoiceConnection`]
#[derive(Debug, Default)]
pub struct Listeners {
    next_id: AtomicU64,
    senders: DashMap<u64, PlaybackEventSender>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sender: PlaybackEventSender) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders.insert(id, sender);
        Subscription(id)
    }

    pub fn remove(&self, subscription: Subscription) {
        self.senders.remove(&subscription.0);
    }

    /// Envía el evento a todos los receptores, descartando los cerrados
    pub fn notify(&self, event: PlaybackEvent) {
        self.senders.retain(|id, sender| {
            let delivered = sender.send(event.clone()).is_ok();
            if !delivered {
                debug!("Receptor {} cerrado, eliminándolo", id);
            }
            delivered
        });
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
