use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::PlayerResult;
use crate::sources::{Providers, SearchKind, SearchRequest, Track};

/// Sufijos que los canales autogenerados agregan al nombre del artista
const CHANNEL_NOISE: [&str; 4] = ["- Topic", "- topic", "- тема", "- Тема"];

/// Limpia el nombre del artista de sufijos de canal
pub fn clean_artist(name: &str) -> String {
    CHANNEL_NOISE
        .iter()
        .fold(name.to_string(), |acc, noise| acc.replace(noise, ""))
        .trim()
        .to_string()
}

/// Consulta usada para recomendaciones y letras
pub fn recommendation_query(track: &Track) -> String {
    if track.title.contains(&track.artist.name) {
        return track.title.clone();
    }

    format!("{} {}", clean_artist(&track.artist.name), track.title)
        .trim()
        .to_string()
}

/// Buffer de canciones recomendadas para el modo autoplay
#[derive(Debug, Default)]
pub struct AutoplayResolver {
    buffer: VecDeque<Track>,
}

impl AutoplayResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rellena el buffer si está vacío, descartando lo ya escuchado
    pub async fn ensure_filled(
        &mut self,
        current: &Track,
        history: &[Track],
        providers: &Providers,
        count: usize,
    ) -> PlayerResult<()> {
        if !self.buffer.is_empty() {
            return Ok(());
        }

        let query = recommendation_query(current);
        info!("📻 Buscando recomendaciones para: {}", query);

        let results = providers
            .search(SearchRequest {
                kind: SearchKind::Track,
                query,
                count,
            })
            .await?
            .into_tracks();

        let total = results.len();
        for track in results {
            let buffered = self.buffer.iter().any(|t| t.same_as(&track));
            let played = history.iter().any(|h| h.same_as(&track));
            if !buffered && !played {
                self.buffer.push_back(track);
            }
        }

        debug!(
            "📻 {} de {} recomendaciones son nuevas",
            self.buffer.len(),
            total
        );
        Ok(())
    }

    /// Saca la siguiente recomendación
    pub fn take_next(&mut self) -> Option<Track> {
        self.buffer.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockSearchProvider, SearchResults};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn track(id: &str, title: &str, artist: &str) -> Track {
        Track::new(title, format!("https://example.com/{id}"))
            .with_id(id)
            .with_artist(artist, "")
    }

    fn providers_returning(tracks: Vec<Track>, times: usize) -> Providers {
        let mut provider = MockSearchProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_resolve()
            .times(times)
            .returning(move |_| Ok(SearchResults::Tracks(tracks.clone())));
        Providers::new().with_search(Arc::new(provider))
    }

    #[test]
    fn test_query_uses_bare_title_when_it_contains_artist() {
        let t = track("1", "Daft Punk - One More Time", "Daft Punk");
        assert_eq!(recommendation_query(&t), "Daft Punk - One More Time");
    }

    #[test]
    fn test_query_strips_channel_noise() {
        assert_eq!(
            recommendation_query(&track("1", "Around the World", "Daft Punk - Topic")),
            "Daft Punk Around the World"
        );
        assert_eq!(
            recommendation_query(&track("2", "Кино", "Виктор Цой - Тема")),
            "Виктор Цой Кино"
        );
    }

    #[tokio::test]
    async fn test_fill_skips_history_and_duplicates() {
        let current = track("a", "A", "X");
        let history = vec![current.clone(), track("b", "B", "X")];
        let providers = providers_returning(
            vec![track("b", "B", "X"), track("c", "C", "X"), track("c", "C", "X"), track("d", "D", "X")],
            1,
        );

        let mut resolver = AutoplayResolver::new();
        resolver
            .ensure_filled(&current, &history, &providers, 50)
            .await
            .unwrap();

        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.take_next().and_then(|t| t.id), Some("c".to_string()));
        assert_eq!(resolver.take_next().and_then(|t| t.id), Some("d".to_string()));
        assert!(resolver.take_next().is_none());
    }

    #[tokio::test]
    async fn test_fill_does_not_search_while_buffer_has_tracks() {
        let current = track("a", "A", "X");
        let providers = providers_returning(vec![track("c", "C", "X"), track("d", "D", "X")], 1);

        let mut resolver = AutoplayResolver::new();
        resolver.ensure_filled(&current, &[], &providers, 50).await.unwrap();
        resolver.take_next();
        resolver.ensure_filled(&current, &[], &providers, 50).await.unwrap();

        assert_eq!(resolver.len(), 1);
    }

    #[tokio::test]
    async fn test_fill_with_only_history_leaves_buffer_empty() {
        let current = track("a", "A", "X");
        let providers = providers_returning(vec![current.clone()], 1);

        let mut resolver = AutoplayResolver::new();
        resolver
            .ensure_filled(&current, &[current.clone()], &providers, 50)
            .await
            .unwrap();

        assert!(resolver.is_empty());
    }
}
