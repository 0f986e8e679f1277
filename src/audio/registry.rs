use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::filters::FilterRegistry;
use super::player::{GuildQueue, QueueSnapshot};
use super::transcode::Transcoder;
use super::voice::VoiceConnection;
use crate::config::Config;
use crate::error::{PlayerError, PlayerResult};
use crate::sources::{Providers, SearchKind, SearchRequest, SearchResults, SourceResolver, Track};

const EVENT_CAPACITY: usize = 256;

/// Notificaciones emitidas por las colas
#[derive(Debug, Clone)]
pub enum QueueEvent {
    TracksAdded { guild_id: GuildId, tracks: Vec<Track> },
    TrackStarted {
        guild_id: GuildId,
        track: Track,
        text_channel_id: Option<ChannelId>,
    },
    QueueEnded(QueueSnapshot),
    Error {
        guild_id: GuildId,
        error: PlayerError,
        text_channel_id: Option<ChannelId>,
    },
}

/// Ajustes de reproducción derivados de la configuración
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    /// Volumen por defecto en porcentaje
    pub default_volume: f32,
    pub search_results_count: usize,
    pub autoplay_search_count: usize,
    pub max_queue_size: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_volume: 10.0,
            search_results_count: 10,
            autoplay_search_count: 50,
            max_queue_size: 1000,
        }
    }
}

impl From<&Config> for PlayerSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            search_results_count: config.search_results_count,
            autoplay_search_count: config.autoplay_search_count,
            max_queue_size: config.max_queue_size,
        }
    }
}

/// Colaboradores compartidos por todas las colas
pub struct PlayerServices {
    pub settings: PlayerSettings,
    pub providers: Providers,
    pub resolver: Arc<dyn SourceResolver>,
    pub transcoder: Arc<dyn Transcoder>,
    pub filters: FilterRegistry,
    /// Identidad usada para las canciones agregadas por autoplay
    pub bot_user_id: UserId,
    pub(crate) events: broadcast::Sender<QueueEvent>,
}

impl PlayerServices {
    pub(crate) fn emit(&self, event: QueueEvent) {
        if self.events.send(event).is_err() {
            debug!("Evento de cola sin receptores");
        }
    }
}

pub(crate) struct RegistryInner {
    queues: DashMap<GuildId, Arc<GuildQueue>>,
    services: Arc<PlayerServices>,
}

impl RegistryInner {
    /// Quita la cola solo si sigue siendo la registrada para su guild
    pub(crate) fn release(&self, queue: &GuildQueue) {
        let removed = self
            .queues
            .remove_if(&queue.guild_id(), |_, registered| {
                std::ptr::eq(Arc::as_ptr(registered), queue)
            })
            .is_some();

        if removed {
            debug!("🗑️ Cola de guild {} eliminada del registro", queue.guild_id());
        }
    }
}

/// Registro de colas: una por guild.
///
/// Las colas solo entran por [`QueueRegistry::create`] y solo salen por
/// [`GuildQueue::destroy`].
#[derive(Clone)]
pub struct QueueRegistry {
    inner: Arc<RegistryInner>,
}

impl QueueRegistry {
    pub fn new(
        settings: PlayerSettings,
        providers: Providers,
        resolver: Arc<dyn SourceResolver>,
        transcoder: Arc<dyn Transcoder>,
        bot_user_id: UserId,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let services = PlayerServices {
            settings,
            providers,
            resolver,
            transcoder,
            filters: FilterRegistry::new(),
            bot_user_id,
            events,
        };

        Self {
            inner: Arc::new(RegistryInner {
                queues: DashMap::new(),
                services: Arc::new(services),
            }),
        }
    }

    /// Crea la cola de la guild de la conexión, o devuelve la que ya existe
    pub fn create(
        &self,
        connection: Arc<dyn VoiceConnection>,
        text_channel_id: Option<ChannelId>,
    ) -> Arc<GuildQueue> {
        let guild_id = connection.guild_id();

        self.inner
            .queues
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎶 Nueva cola para guild {}", guild_id);
                GuildQueue::new(
                    connection,
                    text_channel_id,
                    self.inner.services.clone(),
                    Arc::downgrade(&self.inner),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildQueue>> {
        self.inner.queues.get(&guild_id).map(|q| q.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queues.is_empty()
    }

    /// Recibe todas las notificaciones de las colas
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.services.events.subscribe()
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.inner.services.settings
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.inner.services.filters
    }

    /// Busca con los proveedores registrados
    pub async fn search(
        &self,
        query: &str,
        kind: SearchKind,
        count: Option<usize>,
    ) -> PlayerResult<SearchResults> {
        let count = count.unwrap_or(self.inner.services.settings.search_results_count);

        self.inner
            .services
            .providers
            .search(SearchRequest {
                kind,
                query: query.to_string(),
                count,
            })
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::testing::{FakeConnection, FakeTranscoder};
    use crate::sources::MockSourceResolver;
    use pretty_assertions::assert_eq;

    pub(crate) fn registry_with(providers: Providers, transcoder: Arc<FakeTranscoder>) -> QueueRegistry {
        let mut resolver = MockSourceResolver::new();
        resolver
            .expect_resolve()
            .returning(|url| Ok(format!("{url}/audio.webm")));

        QueueRegistry::new(
            PlayerSettings::default(),
            providers,
            Arc::new(resolver),
            transcoder,
            UserId::new(999),
        )
    }

    #[tokio::test]
    async fn test_create_returns_existing_queue() {
        let registry = registry_with(Providers::new(), Arc::new(FakeTranscoder::new()));
        let connection = FakeConnection::new(GuildId::new(1));

        let first = registry.create(connection.clone(), None);
        let second = registry.create(connection.clone(), Some(ChannelId::new(5)));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(connection.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_destroy_removes_only_its_own_entry() {
        let registry = registry_with(Providers::new(), Arc::new(FakeTranscoder::new()));
        let first = registry.create(FakeConnection::new(GuildId::new(1)), None);

        first.destroy().await;
        assert!(registry.get(GuildId::new(1)).is_none());

        let second = registry.create(FakeConnection::new(GuildId::new(1)), None);
        first.destroy().await;

        let registered = registry.get(GuildId::new(1)).unwrap();
        assert!(Arc::ptr_eq(&registered, &second));
    }

    #[tokio::test]
    async fn test_search_without_provider() {
        let registry = registry_with(Providers::new(), Arc::new(FakeTranscoder::new()));
        let err = registry
            .search("lofi", SearchKind::Track, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlayerError::MissingProvider(_)));
    }
}
