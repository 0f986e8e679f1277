use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

use guildtune::audio::registry::{PlayerSettings, QueueRegistry};
use guildtune::audio::transcode::FfmpegTranscoder;
use guildtune::bot::{GuildTuneBot, QueueRegistryKey};
use guildtune::config::Config;
use guildtune::sources::{Providers, YtDlpClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guildtune=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando GuildTune v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = GuildTuneBot::new(config.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // El autoplay agrega canciones en nombre del bot
    let bot_user_id = client.http.get_current_user().await?.id;

    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
    let registry = QueueRegistry::new(
        PlayerSettings::from(&config),
        Providers::new().with_search(ytdlp.clone()),
        ytdlp,
        Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone())),
        bot_user_id,
    );

    {
        let mut data = client.data.write().await;
        data.insert::<QueueRegistryKey>(registry);
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Verifica que los binarios externos respondan
async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
