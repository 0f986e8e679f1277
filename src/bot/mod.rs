//! # Bot Module
//!
//! Discord surface of GuildTune.
//!
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - The songbird-backed [`voice::SongbirdConnection`]
//! - Announcements: queue events from the [`QueueRegistry`] are posted to the
//!   text channel the queue was created from
//!
//! The registry itself lives in the client's `TypeMap` under
//! [`QueueRegistryKey`], because it needs the bot's user id and is therefore
//! built after the client.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Http, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    prelude::TypeMapKey,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{
    audio::registry::{QueueEvent, QueueRegistry},
    config::Config,
    ui::embeds,
};

/// Clave del registro de colas en el `TypeMap` del cliente
pub struct QueueRegistryKey;

impl TypeMapKey for QueueRegistryKey {
    type Value = QueueRegistry;
}

/// Obtiene el registro de colas del contexto
pub async fn registry(ctx: &Context) -> Result<QueueRegistry> {
    ctx.data
        .read()
        .await
        .get::<QueueRegistryKey>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Registro de colas no inicializado"))
}

/// Handler de eventos de Discord
pub struct GuildTuneBot {
    config: Arc<Config>,
    announcer_started: AtomicBool,
}

impl GuildTuneBot {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            announcer_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash, globales o en la guild de desarrollo
    async fn register_commands(&self, ctx: &Context, registry: &QueueRegistry) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        let filters = registry.filters().all();

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                commands::register_guild_commands(ctx, guild_id, &filters)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx, &filters)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos globales: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                    })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for GuildTuneBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let registry = match registry(&ctx).await {
            Ok(registry) => registry,
            Err(e) => {
                error!("❌ {:#}", e);
                return;
            }
        };

        if let Err(e) = self.register_commands(&ctx, &registry).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión
        if !self.announcer_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(announce_events(ctx.http.clone(), registry));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Destruye la cola cuando alguien desconecta al bot del canal
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);

        match registry(&ctx).await {
            Ok(registry) => {
                if let Some(queue) = registry.get(guild_id) {
                    queue.destroy().await;
                }
            }
            Err(e) => warn!("⚠️ {:#}", e),
        }
    }
}

/// Publica los eventos de las colas en su canal de texto
async fn announce_events(http: Arc<Http>, registry: QueueRegistry) {
    let mut events = registry.subscribe();

    info!("📣 Anuncios de cola activos");

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Se perdieron {} eventos de cola", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let (channel_id, embed) = match event {
            QueueEvent::TracksAdded { guild_id, tracks } => {
                debug!("➕ {} canciones agregadas en guild {}", tracks.len(), guild_id);
                continue;
            }
            QueueEvent::TrackStarted {
                track,
                text_channel_id,
                ..
            } => (text_channel_id, embeds::create_now_playing_embed(&track, None)),
            QueueEvent::QueueEnded(snapshot) => (
                snapshot.text_channel_id,
                embeds::create_queue_ended_embed(&snapshot),
            ),
            QueueEvent::Error {
                error,
                text_channel_id,
                ..
            } => (
                text_channel_id,
                embeds::create_error_embed("Error de reproducción", &error.to_string()),
            ),
        };

        let Some(channel_id) = channel_id else {
            continue;
        };

        if let Err(e) = channel_id
            .send_message(http.as_ref(), CreateMessage::new().embed(embed))
            .await
        {
            warn!("⚠️ No se pudo enviar el anuncio al canal {}: {:?}", channel_id, e);
        }
    }

    info!("📣 Anuncios de cola detenidos");
}
