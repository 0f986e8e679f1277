use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::filters::PlaybackFilter;

/// Discord acepta como máximo 25 opciones fijas por parámetro
const MAX_CHOICES: usize = 25;

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context, filters: &[PlaybackFilter]) -> Result<()> {
    for command in all_commands(filters) {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(
    ctx: &Context,
    guild_id: GuildId,
    filters: &[PlaybackFilter],
) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands(filters)).await?;

    Ok(())
}

fn all_commands(filters: &[PlaybackFilter]) -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        previous_command(),
        seek_command(),
        volume_command(),
        filter_command(filters),
        repeat_command(),
        shuffle_command(),
        lyrics_command(),
        nowplaying_command(),
        queue_command(),
        stop_command(),
    ]
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "type", "Qué buscar")
                .add_string_choice("Canción", "track")
                .add_string_choice("Playlist", "playlist"),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn previous_command() -> CreateCommand {
    CreateCommand::new("previous").description("Vuelve a la canción anterior")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a un punto de la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "seconds", "Segundo de destino")
                .min_int_value(0)
                .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la música y sale del canal de voz")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla las canciones de la cola")
}

fn repeat_command() -> CreateCommand {
    CreateCommand::new("repeat")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "mode", "Modo de repetición")
                .add_int_choice("Desactivar", 0)
                .add_int_choice("Canción", 1)
                .add_int_choice("Cola", 2)
                .add_int_choice("Autoplay", -1)
                .required(true),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen (sin valor vuelve al predeterminado)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "percent", "Volumen en porcentaje")
                .min_int_value(0)
                .max_int_value(200),
        )
}

fn filter_command(filters: &[PlaybackFilter]) -> CreateCommand {
    let option = filters.iter().take(MAX_CHOICES).fold(
        CreateCommandOption::new(CommandOptionType::String, "name", "Filtro a aplicar")
            .required(true),
        |option, filter| option.add_string_choice(&filter.name, &filter.name),
    );

    CreateCommand::new("filter")
        .description("Aplica un filtro de audio a la canción actual")
        .add_option(option)
}

fn lyrics_command() -> CreateCommand {
    CreateCommand::new("lyrics").description("Muestra la letra de la canción actual")
}
