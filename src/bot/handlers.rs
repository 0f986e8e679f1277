use anyhow::{Context as _, Result};
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::voice::SongbirdConnection;
use crate::{
    audio::{
        player::{GuildQueue, QueueState, SkipDirection, DEFAULT_BAR_SIZE, DEFAULT_LINE, DEFAULT_POINTER},
        queue::RepeatMode,
        registry::QueueRegistry,
    },
    sources::SearchKind,
    ui::embeds::{self, PlayerStatus},
};

const QUEUE_PAGE_SIZE: usize = 10;

/// Maneja comandos slash.
///
/// Todo comando se difiere primero: búsqueda, resolución y arranque de ffmpeg
/// pueden superar la ventana de tres segundos de Discord.
pub async fn handle_command(ctx: &Context, command: CommandInteraction) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let registry = super::registry(ctx).await?;

    let outcome = match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, &registry, guild_id).await,
        "pause" => handle_pause(&registry, guild_id).await,
        "resume" => handle_resume(&registry, guild_id).await,
        "skip" => handle_skip(&registry, guild_id, SkipDirection::Next).await,
        "previous" => handle_skip(&registry, guild_id, SkipDirection::Previous).await,
        "seek" => handle_seek(&command, &registry, guild_id).await,
        "volume" => handle_volume(&command, &registry, guild_id).await,
        "filter" => handle_filter(&command, &registry, guild_id).await,
        "repeat" => handle_repeat(&command, &registry, guild_id).await,
        "shuffle" => handle_shuffle(&registry, guild_id).await,
        "lyrics" => handle_lyrics(&registry, guild_id).await,
        "nowplaying" => handle_nowplaying(&registry, guild_id).await,
        "queue" => handle_queue(&command, &registry, guild_id).await,
        "stop" => handle_stop(&registry, guild_id).await,
        other => Err(anyhow::anyhow!("Comando no reconocido: /{}", other)),
    };

    let embed = outcome.unwrap_or_else(|e| {
        warn!("⚠️ /{} falló en guild {}: {:#}", command.data.name, guild_id, e);
        embeds::create_error_embed("No se pudo completar el comando", &format!("{:#}", e))
    });

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    registry: &QueueRegistry,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;
    let kind = match string_option(command, "type") {
        Some("playlist") => SearchKind::Playlist,
        _ => SearchKind::Track,
    };

    // Verificar que el usuario esté en un canal de voz
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    // Una búsqueda de texto reproduce el primer resultado
    let count = match kind {
        SearchKind::Track => Some(1),
        SearchKind::Playlist => None,
    };
    let tracks = registry.search(query, kind, count).await?.into_tracks();
    if tracks.is_empty() {
        anyhow::bail!("No se encontraron resultados para `{}`", query);
    }

    let queue = match registry.get(guild_id) {
        Some(queue) => queue,
        None => {
            let manager = songbird::get(ctx)
                .await
                .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
            let connection = SongbirdConnection::join(manager, guild_id, voice_channel_id).await?;
            registry.create(connection, Some(command.channel_id))
        }
    };

    let added = queue.add_tracks(command.user.id, tracks).await?;
    let started = queue.start_if_idle().await?;

    Ok(embeds::create_tracks_added_embed(&added, started))
}

async fn handle_pause(registry: &QueueRegistry, guild_id: GuildId) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    queue.set_state(QueueState::Paused).await?;

    Ok(embeds::create_success_embed("Pausado", "⏸️ Reproducción pausada"))
}

async fn handle_resume(registry: &QueueRegistry, guild_id: GuildId) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    queue.set_state(QueueState::Playing).await?;

    Ok(embeds::create_success_embed("Reanudado", "▶️ Reproducción reanudada"))
}

async fn handle_skip(
    registry: &QueueRegistry,
    guild_id: GuildId,
    direction: SkipDirection,
) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    queue.skip(direction).await?;

    let title = match direction {
        SkipDirection::Next => "⏭️ Siguiente",
        SkipDirection::Previous => "⏮️ Anterior",
    };
    let description = match queue.now_playing().await {
        Some(track) => format!("Ahora suena **{}**", track.title),
        None => "Canción cambiada".to_string(),
    };

    Ok(embeds::create_info_embed(title, &description))
}

async fn handle_seek(
    command: &CommandInteraction,
    registry: &QueueRegistry,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let seconds = integer_option(command, "seconds")
        .ok_or_else(|| anyhow::anyhow!("Segundo no proporcionado"))?;
    let seconds = u64::try_from(seconds).context("El segundo debe ser positivo")?;

    let queue = active_queue(registry, guild_id)?;
    queue.seek(seconds).await?;

    Ok(embeds::create_success_embed(
        "Posición cambiada",
        &format!("⏩ Reproduciendo desde el segundo {}", seconds),
    ))
}

async fn handle_volume(
    command: &CommandInteraction,
    registry: &QueueRegistry,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let percent = integer_option(command, "percent").map(|p| p as f32);

    let queue = active_queue(registry, guild_id)?;
    let volume = queue.set_volume(percent).await?;

    Ok(embeds::create_success_embed(
        "Volumen ajustado",
        &format!("🔊 Volumen al {:.0}%", volume * 100.0),
    ))
}

async fn handle_filter(
    command: &CommandInteraction,
    registry: &QueueRegistry,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let name = string_option(command, "name")
        .ok_or_else(|| anyhow::anyhow!("Filtro no proporcionado"))?;
    let filter = registry
        .filters()
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("Filtro desconocido: {}", name))?;

    let queue = active_queue(registry, guild_id)?;
    queue.set_filter(&[filter.value]).await?;

    Ok(embeds::create_success_embed(
        "Filtro aplicado",
        &format!("🎛️ Filtro **{}** activo", filter.name),
    ))
}

async fn handle_repeat(
    command: &CommandInteraction,
    registry: &QueueRegistry,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let raw = integer_option(command, "mode")
        .ok_or_else(|| anyhow::anyhow!("Modo no proporcionado"))?;
    let raw = i8::try_from(raw).with_context(|| format!("Modo de repetición inválido: {}", raw))?;
    let mode = RepeatMode::try_from(raw)?;

    let queue = active_queue(registry, guild_id)?;
    queue.set_repeat(mode).await?;

    Ok(embeds::create_success_embed(
        "Repetición",
        &format!("🔁 Modo de repetición: **{}**", mode),
    ))
}

async fn handle_shuffle(registry: &QueueRegistry, guild_id: GuildId) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    queue.shuffle().await?;

    Ok(embeds::create_success_embed("Cola mezclada", "🔀 La cola ha sido mezclada"))
}

async fn handle_lyrics(registry: &QueueRegistry, guild_id: GuildId) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    let track = queue
        .now_playing()
        .await
        .ok_or_else(|| anyhow::anyhow!("No hay nada reproduciéndose"))?;

    match queue.lyrics().await? {
        Some(lyrics) => Ok(embeds::create_lyrics_embed(&track, &lyrics)),
        None => Ok(embeds::create_info_embed(
            "Sin letra",
            &format!("No se encontró la letra de **{}**", track.title),
        )),
    }
}

async fn handle_nowplaying(registry: &QueueRegistry, guild_id: GuildId) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    let track = queue
        .now_playing()
        .await
        .ok_or_else(|| anyhow::anyhow!("No hay nada reproduciéndose"))?;

    let status = PlayerStatus {
        progress: queue
            .progress(DEFAULT_BAR_SIZE, DEFAULT_POINTER, DEFAULT_LINE)
            .await,
        repeat: queue.repeat().await,
        volume: queue.volume().await,
        filter: queue.filter().await,
        paused: queue.state().await == QueueState::Paused,
    };

    Ok(embeds::create_now_playing_embed(&track, Some(&status)))
}

async fn handle_queue(
    command: &CommandInteraction,
    registry: &QueueRegistry,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let page = integer_option(command, "page")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1);

    let Some(queue) = registry.get(guild_id) else {
        let empty = crate::audio::queue::QueuePage::of(&[], 1, QUEUE_PAGE_SIZE);
        return Ok(embeds::create_queue_embed(None, &empty, RepeatMode::None, 0));
    };

    let upcoming = queue.upcoming_page(page, QUEUE_PAGE_SIZE).await;
    let current = queue.now_playing().await;

    Ok(embeds::create_queue_embed(
        current.as_ref(),
        &upcoming,
        queue.repeat().await,
        queue.total_duration().await,
    ))
}

async fn handle_stop(registry: &QueueRegistry, guild_id: GuildId) -> Result<CreateEmbed> {
    let queue = active_queue(registry, guild_id)?;
    queue.destroy().await;

    Ok(embeds::create_success_embed(
        "Detenido",
        "⏹️ Música detenida y cola eliminada",
    ))
}

// Funciones auxiliares

fn active_queue(registry: &QueueRegistry, guild_id: GuildId) -> Result<Arc<GuildQueue>> {
    registry
        .get(guild_id)
        .ok_or_else(|| anyhow::anyhow!("No hay ninguna cola activa en este servidor"))
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
