use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{
        player::{QueueSnapshot, TrackProgress},
        queue::{QueuePage, RepeatMode},
    },
    sources::{Track, TrackDuration},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 GuildTune";

/// Límite de Discord para la descripción de un embed
const DESCRIPTION_LIMIT: usize = 4096;

/// Límite de Discord para el valor de un campo
const FIELD_LIMIT: usize = 1024;

/// Estado del reproductor que acompaña a `/nowplaying`
#[derive(Debug, Clone)]
pub struct PlayerStatus {
    pub progress: TrackProgress,
    pub repeat: RepeatMode,
    pub volume: f32,
    pub filter: String,
    pub paused: bool,
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, status: Option<&PlayerStatus>) -> CreateEmbed {
    let title = match status {
        Some(status) if status.paused => "⏸️ En Pausa",
        _ => "🎵 Reproduciendo Ahora",
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", artist_or_unknown(track), true)
        .field("⏱️ Duración", format_duration(&track.duration), true);

    if let Some(user) = track.requested_by {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    if let Some(status) = status {
        let elapsed = TrackDuration::from_secs(status.progress.elapsed).display();
        embed = embed
            .field(
                "📊 Progreso",
                format!(
                    "{} `{}/{}` ({}%)",
                    status.progress.bar,
                    elapsed,
                    format_duration(&track.duration),
                    status.progress.percent
                ),
                false,
            )
            .field("🔁 Repetición", status.repeat.to_string(), true)
            .field("🔊 Volumen", format!("{:.0}%", status.volume * 100.0), true)
            .field("🎛️ Filtro", format!("`{}`", truncate(&status.filter, FIELD_LIMIT - 2)), true);
    }

    if !track.thumbnail.is_empty() {
        embed = embed.thumbnail(&track.thumbnail);
    }

    embed
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para las canciones agregadas a la cola
pub fn create_tracks_added_embed(tracks: &[Track], started: bool) -> CreateEmbed {
    let footer = if started {
        "🎵 La reproducción ha comenzado"
    } else {
        "🎵 Se reproducirá cuando termine lo que está sonando"
    };

    let embed = match tracks {
        [track] => {
            let mut embed = CreateEmbed::default()
                .title("✅ Canción Agregada")
                .description(format!("**{}** se ha agregado a la cola", track.title))
                .color(colors::SUCCESS_GREEN)
                .field("🎤 Artista", artist_or_unknown(track), true)
                .field("⏱️ Duración", format_duration(&track.duration), true)
                .url(&track.url);

            if !track.thumbnail.is_empty() {
                embed = embed.thumbnail(&track.thumbnail);
            }
            embed
        }
        _ => {
            let total: u64 = tracks.iter().map(|t| t.duration.value).sum();
            CreateEmbed::default()
                .title("📋 Playlist Agregada")
                .description(format!(
                    "Se agregaron **{} canciones** a la cola",
                    tracks.len()
                ))
                .color(colors::MUSIC_PURPLE)
                .field("📊 Canciones", tracks.len().to_string(), true)
                .field("⏱️ Duración", TrackDuration::from_secs(total).display(), true)
        }
    };

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(
    current: Option<&Track>,
    page: &QueuePage,
    repeat: RepeatMode,
    total_duration: u64,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    let Some(current) = current else {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    };

    let status = match repeat {
        RepeatMode::Track => "🔂",
        RepeatMode::Queue => "🔁",
        RepeatMode::Autoplay => "📻",
        RepeatMode::None => "▶️",
    };

    embed = embed.field(
        format!("{} Reproduciendo", status),
        truncate(&format!("**{}** - {}", current.title, artist_or_unknown(current)), FIELD_LIMIT),
        false,
    );

    if !page.items.is_empty() {
        let mut description = String::new();
        for (i, item) in page.items.iter().enumerate() {
            description.push_str(&format!(
                "**{}**. {} `[{}]`\n",
                page.offset + i + 1,
                item.title,
                format_duration(&item.duration)
            ));
        }
        embed = embed.field("Próximas canciones", truncate(&description, FIELD_LIMIT), false);
    }

    embed = embed.field(
        "Información",
        format!(
            "**Pendientes:** {} • **Duración total:** {} • **Repetición:** {}",
            page.total_items,
            TrackDuration::from_secs(total_duration).display(),
            repeat
        ),
        false,
    );

    let footer = if page.total_pages > 1 {
        format!(
            "Página {} de {} • GuildTune",
            page.current_page, page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed con la letra de la canción
pub fn create_lyrics_embed(track: &Track, lyrics: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("📝 {}", track.title))
        .description(truncate(lyrics, DESCRIPTION_LIMIT))
        .color(colors::MUSIC_PURPLE)
        .url(&track.url)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed de despedida cuando una cola termina
pub fn create_queue_ended_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let played = snapshot.history.len();
    let description = match played {
        0 => "No se reprodujo ninguna canción.".to_string(),
        1 => "Se reprodujo **1 canción**. ¡Hasta la próxima!".to_string(),
        n => format!("Se reprodujeron **{} canciones**. ¡Hasta la próxima!", n),
    };

    let mut embed = CreateEmbed::default()
        .title("👋 Cola Terminada")
        .description(description)
        .color(colors::WARNING_ORANGE);

    if let (Some(started), Some(ended)) = (snapshot.started_at, snapshot.ended_at) {
        let secs = (ended - started).num_seconds().max(0) as u64;
        embed = embed.field(
            "⏱️ Tiempo en el canal",
            TrackDuration::from_secs(secs).display(),
            true,
        );
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(truncate(description, DESCRIPTION_LIMIT))
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn artist_or_unknown(track: &Track) -> &str {
    if track.artist.name.is_empty() {
        "Desconocido"
    } else {
        &track.artist.name
    }
}

/// Formatea una duración; cero se muestra como transmisión en vivo
fn format_duration(duration: &TrackDuration) -> String {
    if duration.value == 0 {
        "🔴 En vivo".to_string()
    } else {
        duration.display()
    }
}

/// Recorta el texto a `limit` caracteres, terminando en "…"
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn render(embed: CreateEmbed) -> Value {
        serde_json::to_value(embed).unwrap()
    }

    fn track(title: &str, secs: u64) -> Track {
        Track::new(title, format!("https://youtu.be/{title}"))
            .with_artist("Artist", "https://youtube.com/@artist")
            .with_duration(secs)
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("canción", 10), "canción");
        assert_eq!(truncate("ñandú ñandú", 5), "ñand…");
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn test_live_tracks_show_live_badge() {
        assert_eq!(format_duration(&TrackDuration::from_secs(0)), "🔴 En vivo");
        assert_eq!(format_duration(&TrackDuration::from_secs(75)), "01:15");
    }

    #[test]
    fn test_single_and_multiple_added() {
        let single = render(create_tracks_added_embed(&[track("A", 60)], true));
        assert_eq!(single["title"], "✅ Canción Agregada");

        let many = render(create_tracks_added_embed(&[track("A", 60), track("B", 60)], false));
        assert_eq!(many["title"], "📋 Playlist Agregada");
        assert_eq!(many["fields"][1]["value"], "02:00");
    }

    #[test]
    fn test_empty_queue_embed() {
        let page = QueuePage::of(&[], 1, 10);
        let embed = render(create_queue_embed(None, &page, RepeatMode::None, 0));
        assert!(embed["description"].as_str().unwrap().contains("vacía"));
    }

    #[test]
    fn test_queue_embed_numbers_from_offset() {
        let upcoming: Vec<Track> = (0..12).map(|i| track(&format!("T{i}"), 30)).collect();
        let page = QueuePage::of(&upcoming, 2, 10);
        let current = track("Now", 30);

        let embed = render(create_queue_embed(Some(&current), &page, RepeatMode::Queue, 390));
        let list = embed["fields"][1]["value"].as_str().unwrap();
        assert!(list.starts_with("**11**. T10"));
        assert_eq!(embed["footer"]["text"], "Página 2 de 2 • GuildTune");
    }

    #[test]
    fn test_now_playing_with_status() {
        let status = PlayerStatus {
            progress: TrackProgress {
                bar: "▬●▬".to_string(),
                percent: 50,
                elapsed: 30,
            },
            repeat: RepeatMode::Autoplay,
            volume: 0.25,
            filter: "anull".to_string(),
            paused: true,
        };

        let embed = render(create_now_playing_embed(&track("A", 60), Some(&status)));
        assert_eq!(embed["title"], "⏸️ En Pausa");
        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["value"] == "25%"));
        assert!(fields.iter().any(|f| f["value"] == "Autoplay"));
    }
}
