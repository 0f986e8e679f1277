use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{
    Playlist, SearchKind, SearchProvider, SearchRequest, SearchResults, SourceResolver, Track,
    TrackDuration,
};

/// Rendición de audio aceptada para reproducir
const REQUIRED_CODEC: &str = "opus";
const REQUIRED_CONTAINER: &str = "webm";
const REQUIRED_SAMPLE_RATE: u32 = 48_000;
const REQUIRED_QUALITY: &str = "medium";

/// Cliente que usa el binario yt-dlp para buscar tracks y extraer URLs de audio
pub struct YtDlpClient {
    binary: String,
}

#[derive(Debug, Default, Deserialize)]
struct YtDlpEntry {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    channel_url: Option<String>,
    uploader_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<YtDlpThumbnail>,
    description: Option<String>,
    #[serde(default)]
    entries: Vec<YtDlpEntry>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    ext: Option<String>,
    asr: Option<u32>,
    format_note: Option<String>,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Ejecuta yt-dlp y parsea su salida JSON (`-J`)
    async fn dump_json(&self, args: &[&str], target: &str) -> Result<YtDlpEntry> {
        debug!("🔧 {} {:?} {}", self.binary, args, target);

        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .args([
                "--dump-single-json",
                "--quiet",
                "--no-warnings",
                "--socket-timeout",
                "15",
            ])
            .arg(target)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para {}: {}", target, error.trim());
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        parse_dump(&output.stdout)
    }
}

fn parse_dump(stdout: &[u8]) -> Result<YtDlpEntry> {
    serde_json::from_slice(stdout).context("Salida JSON de yt-dlp inválida")
}

fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

impl YtDlpEntry {
    fn is_playlist(&self) -> bool {
        self.kind.as_deref() == Some("playlist")
    }

    fn page_url(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone().filter(|u| is_url(u)))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
    }

    fn best_thumbnail(&self) -> String {
        self.thumbnail
            .clone()
            .or_else(|| self.thumbnails.last().map(|t| t.url.clone()))
            .unwrap_or_default()
    }

    fn into_track(self) -> Option<Track> {
        let url = self.page_url()?;
        let thumbnail = self.best_thumbnail();
        let artist = self.channel.or(self.uploader).unwrap_or_default();
        let artist_url = self.channel_url.or(self.uploader_url).unwrap_or_default();

        let mut track = Track::new(self.title.unwrap_or_else(|| "Unknown".to_string()), url)
            .with_artist(artist, artist_url)
            .with_duration(self.duration.map(|d| d.max(0.0) as u64).unwrap_or(0))
            .with_thumbnail(thumbnail);

        if let Some(id) = self.id {
            track = track.with_id(id);
        }
        if let Some(description) = self.description.filter(|d| !d.is_empty()) {
            track = track.with_description(description);
        }

        Some(track)
    }

    fn into_playlist(self) -> Playlist {
        let url = self.page_url().unwrap_or_default();
        let thumbnail = self.best_thumbnail();
        let items: Vec<Track> = self
            .entries
            .into_iter()
            .filter_map(YtDlpEntry::into_track)
            .collect();
        let total = items.iter().map(|t| t.duration.value).sum();

        Playlist {
            id: self.id.unwrap_or_default(),
            url,
            title: self.title.unwrap_or_else(|| "Playlist".to_string()),
            thumbnail,
            duration: TrackDuration::from_secs(total),
            items,
        }
    }
}

/// Elige la rendición solo-audio opus/webm a 48 kHz de calidad media
fn select_rendition(formats: &[YtDlpFormat]) -> Option<&str> {
    formats
        .iter()
        .filter(|f| f.vcodec.as_deref().map_or(true, |v| v == "none"))
        .filter(|f| f.acodec.as_deref() == Some(REQUIRED_CODEC))
        .filter(|f| f.ext.as_deref() == Some(REQUIRED_CONTAINER))
        .filter(|f| f.asr == Some(REQUIRED_SAMPLE_RATE))
        .filter(|f| {
            f.format_note
                .as_deref()
                .map_or(false, |n| n.to_lowercase().contains(REQUIRED_QUALITY))
        })
        .find_map(|f| f.url.as_deref())
}

#[async_trait]
impl SearchProvider for YtDlpClient {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, request: SearchRequest) -> Result<SearchResults> {
        info!("🔍 Búsqueda yt-dlp: {} ({:?})", request.query, request.kind);

        let dump = if is_url(&request.query) {
            self.dump_json(&["--flat-playlist"], &request.query).await?
        } else {
            if request.kind == SearchKind::Playlist {
                return Ok(SearchResults::NotFound);
            }
            let target = format!("ytsearch{}:{}", request.count.max(1), request.query);
            self.dump_json(&["--flat-playlist"], &target).await?
        };

        let results = into_results(dump, &request);
        match &results {
            SearchResults::Tracks(tracks) => info!("🔍 Encontrados {} tracks", tracks.len()),
            SearchResults::Playlists(lists) => info!("🔍 Encontradas {} playlists", lists.len()),
            SearchResults::NotFound => info!("📭 Sin resultados para: {}", request.query),
        }

        Ok(results)
    }
}

fn into_results(dump: YtDlpEntry, request: &SearchRequest) -> SearchResults {
    let is_search = !is_url(&request.query);

    if dump.is_playlist() && (is_search || request.kind == SearchKind::Track) {
        let tracks: Vec<Track> = dump
            .entries
            .into_iter()
            .filter_map(YtDlpEntry::into_track)
            .take(request.count.max(1))
            .collect();

        return if tracks.is_empty() {
            SearchResults::NotFound
        } else {
            SearchResults::Tracks(tracks)
        };
    }

    if dump.is_playlist() {
        return SearchResults::Playlists(vec![dump.into_playlist()]);
    }

    match dump.into_track() {
        Some(track) if request.kind == SearchKind::Track => SearchResults::Tracks(vec![track]),
        _ => SearchResults::NotFound,
    }
}

#[async_trait]
impl SourceResolver for YtDlpClient {
    async fn resolve(&self, track_url: &str) -> Result<String> {
        let dump = self.dump_json(&["--no-playlist"], track_url).await?;

        let url = select_rendition(&dump.formats)
            .map(str::to_string)
            .with_context(|| {
                format!(
                    "Ninguna rendición {}/{} a {} Hz disponible para {}",
                    REQUIRED_CODEC, REQUIRED_CONTAINER, REQUIRED_SAMPLE_RATE, track_url
                )
            })?;

        debug!("🎯 URL de audio resuelta para {}", track_url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SEARCH_DUMP: &str = r#"{
        "_type": "playlist",
        "id": "lofi",
        "title": "lofi",
        "entries": [
            {"id": "abc", "url": "https://www.youtube.com/watch?v=abc", "title": "Song A",
             "channel": "Artist - Topic", "channel_url": "https://www.youtube.com/channel/x",
             "duration": 185.0, "thumbnails": [{"url": "small.jpg"}, {"url": "big.jpg"}]},
            {"id": "def", "title": "Song B", "uploader": "Someone", "duration": null}
        ]
    }"#;

    const VIDEO_DUMP: &str = r#"{
        "id": "abc",
        "title": "Song A",
        "webpage_url": "https://www.youtube.com/watch?v=abc",
        "formats": [
            {"url": "https://cdn/249", "acodec": "opus", "vcodec": "none", "ext": "webm", "asr": 48000, "format_note": "low"},
            {"url": "https://cdn/140", "acodec": "mp4a.40.2", "vcodec": "none", "ext": "m4a", "asr": 44100, "format_note": "medium"},
            {"url": "https://cdn/251", "acodec": "opus", "vcodec": "none", "ext": "webm", "asr": 48000, "format_note": "medium"},
            {"url": "https://cdn/18", "acodec": "opus", "vcodec": "avc1", "ext": "webm", "asr": 48000, "format_note": "medium"}
        ]
    }"#;

    fn search(query: &str, count: usize) -> SearchRequest {
        SearchRequest {
            kind: SearchKind::Track,
            query: query.to_string(),
            count,
        }
    }

    #[test]
    fn test_search_dump_becomes_tracks() {
        let dump = parse_dump(SEARCH_DUMP.as_bytes()).unwrap();
        let SearchResults::Tracks(tracks) = into_results(dump, &search("lofi", 10)) else {
            panic!("expected tracks");
        };

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id.as_deref(), Some("abc"));
        assert_eq!(tracks[0].artist.name, "Artist - Topic");
        assert_eq!(tracks[0].thumbnail, "big.jpg");
        assert_eq!(tracks[0].duration.value, 185);
        assert_eq!(tracks[1].url, "https://www.youtube.com/watch?v=def");
        assert_eq!(tracks[1].duration.value, 0);
    }

    #[test]
    fn test_search_respects_count() {
        let dump = parse_dump(SEARCH_DUMP.as_bytes()).unwrap();
        let tracks = into_results(dump, &search("lofi", 1)).into_tracks();
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn test_playlist_url_with_playlist_kind() {
        let dump = parse_dump(SEARCH_DUMP.as_bytes()).unwrap();
        let request = SearchRequest {
            kind: SearchKind::Playlist,
            query: "https://www.youtube.com/playlist?list=lofi".to_string(),
            count: 10,
        };
        let SearchResults::Playlists(lists) = into_results(dump, &request) else {
            panic!("expected playlists");
        };
        assert_eq!(lists[0].items.len(), 2);
        assert_eq!(lists[0].duration.value, 185);
    }

    #[test]
    fn test_selects_medium_opus_webm_audio_only() {
        let dump = parse_dump(VIDEO_DUMP.as_bytes()).unwrap();
        assert_eq!(select_rendition(&dump.formats), Some("https://cdn/251"));
    }

    #[test]
    fn test_no_matching_rendition() {
        let dump = parse_dump(VIDEO_DUMP.as_bytes()).unwrap();
        let formats: Vec<YtDlpFormat> = dump
            .formats
            .into_iter()
            .filter(|f| f.url.as_deref() != Some("https://cdn/251"))
            .collect();
        assert_eq!(select_rendition(&formats), None);
    }

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/file"));
    }
}
