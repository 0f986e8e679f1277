//! # Sources Module
//!
//! Track metadata model and the contracts the queue needs from the outside
//! world to find music:
//!
//! - [`SearchProvider`]: turns a query into tracks or playlists
//! - [`LyricsProvider`]: turns a query into lyrics text
//! - [`SourceResolver`]: turns a track page URL into a playable audio URL
//!
//! Providers are collected into a [`Providers`] set. Lookups walk the
//! providers in registration order and stop at the first one that returns
//! something other than "not found".
//!
//! The only concrete implementation shipped with the bot is
//! [`ytdlp::YtDlpClient`], which implements both search and source resolution
//! on top of the `yt-dlp` binary.

pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PlayerError, PlayerResult, ProviderKind};

pub use ytdlp::YtDlpClient;

/// Autor o canal de un track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrackArtist {
    pub name: String,
    pub url: String,
}

/// Duración de un track: segundos totales y segmentos para mostrar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrackDuration {
    pub value: u64,
    pub format: Vec<String>,
}

impl TrackDuration {
    /// Construye la duración con los segmentos `[horas, minutos, segundos]`
    pub fn from_secs(value: u64) -> Self {
        let format = vec![
            (value / 3600).to_string(),
            format!("{:02}", (value % 3600) / 60),
            format!("{:02}", value % 60),
        ];

        Self { value, format }
    }

    /// Texto legible, omitiendo las horas cuando son cero
    pub fn display(&self) -> String {
        match self.format.as_slice() {
            [hours, minutes, seconds] if hours == "0" => format!("{}:{}", minutes, seconds),
            segments => segments.join(":"),
        }
    }
}

/// Representa un track de música.
///
/// Es inmutable una vez encolado, salvo `requested_by`, que la cola asigna al
/// agregarlo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub url: String,
    pub title: String,
    pub artist: TrackArtist,
    pub thumbnail: String,
    pub duration: TrackDuration,
    pub description: Option<String>,
    pub requested_by: Option<UserId>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            title: title.into(),
            artist: TrackArtist::default(),
            thumbnail: String::new(),
            duration: TrackDuration::default(),
            description: None,
            requested_by: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_artist(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.artist = TrackArtist {
            name: name.into(),
            url: url.into(),
        };
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration = TrackDuration::from_secs(secs);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = thumbnail.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_requested_by(mut self, user_id: UserId) -> Self {
        self.requested_by = Some(user_id);
        self
    }

    /// Identidad usada para comparar con el historial: el id si existe, si no la URL
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.url)
    }

    pub fn same_as(&self, other: &Track) -> bool {
        self.key() == other.key()
    }
}

/// Playlist devuelta por un proveedor de búsqueda
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: TrackDuration,
    pub items: Vec<Track>,
}

/// Tipo de búsqueda
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Track,
    Playlist,
}

/// Petición de búsqueda
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub kind: SearchKind,
    pub query: String,
    pub count: usize,
}

/// Resultado de búsqueda
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResults {
    Tracks(Vec<Track>),
    Playlists(Vec<Playlist>),
    NotFound,
}

impl SearchResults {
    /// Aplana el resultado en una lista de tracks
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            SearchResults::Tracks(tracks) => tracks,
            SearchResults::Playlists(playlists) => {
                playlists.into_iter().flat_map(|p| p.items).collect()
            }
            SearchResults::NotFound => Vec::new(),
        }
    }
}

/// Proveedor de búsqueda de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Nombre del proveedor
    fn name(&self) -> &'static str;

    /// Busca tracks o playlists
    async fn resolve(&self, request: SearchRequest) -> Result<SearchResults>;
}

/// Proveedor de letras
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Devuelve la letra o `None` si no la encuentra
    async fn resolve(&self, query: &str) -> Result<Option<String>>;
}

/// Obtiene la URL reproducible (solo audio) de la página de un track.
///
/// Las implementaciones eligen una variante concreta y fallan si ninguna
/// coincide; la cola nunca reintenta.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, track_url: &str) -> Result<String>;
}

/// Conjunto ordenado de proveedores
#[derive(Default, Clone)]
pub struct Providers {
    search: Vec<Arc<dyn SearchProvider>>,
    lyrics: Vec<Arc<dyn LyricsProvider>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search.push(provider);
        self
    }

    pub fn with_lyrics(mut self, provider: Arc<dyn LyricsProvider>) -> Self {
        self.lyrics.push(provider);
        self
    }

    pub fn has_search(&self) -> bool {
        !self.search.is_empty()
    }

    pub fn has_lyrics(&self) -> bool {
        !self.lyrics.is_empty()
    }

    /// Busca usando el primer proveedor que devuelva resultados
    pub async fn search(&self, request: SearchRequest) -> PlayerResult<SearchResults> {
        if self.search.is_empty() {
            return Err(PlayerError::MissingProvider(ProviderKind::Search));
        }

        debug!(
            "🔍 {} proveedores de búsqueda disponibles para '{}'",
            self.search.len(),
            request.query
        );

        for provider in &self.search {
            let results = provider
                .resolve(request.clone())
                .await
                .map_err(|e| PlayerError::Search(format!("{e:#}")))?;

            if results != SearchResults::NotFound {
                debug!("✅ Resultados de búsqueda de {}", provider.name());
                return Ok(results);
            }
        }

        Ok(SearchResults::NotFound)
    }

    /// Busca letras usando el primer proveedor que las encuentre
    pub async fn lyrics(&self, query: &str) -> PlayerResult<Option<String>> {
        if self.lyrics.is_empty() {
            return Err(PlayerError::MissingProvider(ProviderKind::Lyrics));
        }

        for provider in &self.lyrics {
            let lyrics = provider
                .resolve(query)
                .await
                .map_err(|e| PlayerError::Lyrics(format!("{e:#}")))?;

            if lyrics.is_some() {
                debug!("✅ Letras encontradas con {}", provider.name());
                return Ok(lyrics);
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            kind: SearchKind::Track,
            query: query.to_string(),
            count: 10,
        }
    }

    #[test]
    fn test_duration_segments() {
        let duration = TrackDuration::from_secs(3725);
        assert_eq!(duration.format, vec!["1", "02", "05"]);
        assert_eq!(duration.display(), "1:02:05");
        assert_eq!(TrackDuration::from_secs(185).display(), "03:05");
    }

    #[test]
    fn test_track_key_prefers_id() {
        let a = Track::new("A", "https://example.com/a").with_id("a");
        let b = Track::new("A again", "https://example.com/other").with_id("a");
        let c = Track::new("C", "https://example.com/c");
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_eq!(c.key(), "https://example.com/c");
    }

    #[tokio::test]
    async fn test_search_without_provider_is_configuration_error() {
        let providers = Providers::new();
        let err = providers.search(request("x")).await.unwrap_err();
        assert_eq!(err, PlayerError::MissingProvider(ProviderKind::Search));
    }

    #[tokio::test]
    async fn test_search_falls_through_not_found() {
        let mut empty = MockSearchProvider::new();
        empty.expect_name().return_const("empty");
        empty
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(SearchResults::NotFound));

        let mut full = MockSearchProvider::new();
        full.expect_name().return_const("full");
        full.expect_resolve()
            .times(1)
            .returning(|req| Ok(SearchResults::Tracks(vec![Track::new(req.query, "u")])));

        let providers = Providers::new()
            .with_search(Arc::new(empty))
            .with_search(Arc::new(full));

        let tracks = providers.search(request("hello")).await.unwrap().into_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "hello");
    }

    #[tokio::test]
    async fn test_lyrics_without_provider_is_configuration_error() {
        let err = Providers::new().lyrics("song").await.unwrap_err();
        assert_eq!(err, PlayerError::MissingProvider(ProviderKind::Lyrics));
    }

    #[tokio::test]
    async fn test_lyrics_provider_failure_keeps_message() {
        let mut provider = MockLyricsProvider::new();
        provider.expect_name().return_const("broken");
        provider
            .expect_resolve()
            .returning(|_| Err(anyhow::anyhow!("rate limited")));

        let providers = Providers::new().with_lyrics(Arc::new(provider));
        let err = providers.lyrics("song").await.unwrap_err();
        assert_eq!(err, PlayerError::Lyrics("rate limited".to_string()));
    }

    #[test]
    fn test_playlists_flatten_into_tracks() {
        let playlist = Playlist {
            id: "p".into(),
            url: "https://example.com/p".into(),
            title: "P".into(),
            thumbnail: String::new(),
            duration: TrackDuration::from_secs(20),
            items: vec![Track::new("1", "u1"), Track::new("2", "u2")],
        };
        let tracks = SearchResults::Playlists(vec![playlist]).into_tracks();
        assert_eq!(tracks.len(), 2);
    }
}
