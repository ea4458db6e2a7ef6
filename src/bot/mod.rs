//! # Bot Module
//!
//! Discord front end for neko-tts.
//!
//! This module contains:
//! - Slash command registration ([`commands`]) and handling ([`handlers`])
//! - Voice connection management through songbird
//! - Event handling (ready, guild joins and leaves, interactions, voice state updates)
//! - Delivery of scheduler notices to text channels ([`notifier`])
//!
//! ## Architecture
//!
//! [`TtsBot`] implements Serenity's [`EventHandler`] trait. Guild lifecycle
//! events are forwarded to the [`Scheduler`]:
//!
//! | Event                               | Scheduler call        |
//! |-------------------------------------|-----------------------|
//! | `ready`                             | `drop_absent` + `ensure_guild` + `resume_all` |
//! | `guild_create`                      | `ensure_guild`        |
//! | `guild_delete`                      | `drop_guild`          |
//! | bot disconnected from voice         | `clear`               |
//! | `/join`                             | `resume`              |

use anyhow::Result;
use serenity::{
    all::{
        ChannelId, Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild,
        VoiceState,
    },
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod notifier;
pub mod presence;

pub use notifier::DiscordNotifier;

use crate::{
    audio::scheduler::Scheduler,
    config::Config,
    storage::JsonStorage,
    tts::{PiperSynthesizer, ProviderRegistry},
};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration
/// - `scheduler`: Per-guild TTS playback queue
/// - `providers`: TTS providers loaded from the config directory
/// - `prefs`: Per-user provider preferences
/// - `synthesizer`: piper wrapper that writes the audio artifacts
/// - `notifier`: Text channel per guild for scheduler notices
/// - `songbird`: Voice manager shared with the client
pub struct TtsBot {
    pub config: Arc<Config>,
    pub scheduler: Scheduler,
    pub providers: Arc<ProviderRegistry>,
    pub prefs: Arc<Mutex<JsonStorage>>,
    pub synthesizer: Arc<PiperSynthesizer>,
    pub notifier: Arc<DiscordNotifier>,
    pub songbird: Arc<Songbird>,
}

impl TtsBot {
    pub fn new(
        config: Config,
        scheduler: Scheduler,
        providers: Arc<ProviderRegistry>,
        prefs: Arc<Mutex<JsonStorage>>,
        synthesizer: Arc<PiperSynthesizer>,
        notifier: Arc<DiscordNotifier>,
        songbird: Arc<Songbird>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            scheduler,
            providers,
            prefs,
            synthesizer,
            notifier,
            songbird,
        }
    }

    /// Registra los comandos slash de una guild, registrando el error sin propagarlo
    async fn register_commands(&self, ctx: &Context, guild_id: GuildId) {
        match commands::register_guild_commands(ctx, guild_id).await {
            Ok(()) => info!("✅ Comandos registrados en guild {}", guild_id),
            Err(e) => error!("❌ Error registrando comandos en guild {}: {:?}", guild_id, e),
        }
    }

    /// Connects the bot to a voice channel.
    ///
    /// # Required Permissions
    ///
    /// - `Connect` - To join the voice channel
    /// - `Speak` - To play audio in the channel
    pub async fn join_voice_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        match self.songbird.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Disconnects the bot from the guild's voice channel.
    pub async fn leave_voice_channel(&self, guild_id: GuildId) -> Result<()> {
        self.songbird.remove(guild_id).await?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.songbird.get(guild_id).is_some()
    }
}

#[async_trait]
impl EventHandler for TtsBot {
    /// Drops queues of guilds the bot no longer belongs to, registers commands
    /// in every guild, resumes the guilds that still have a voice connection
    /// and starts the presence rotation.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let present: Vec<GuildId> = ready.guilds.iter().map(|guild| guild.id).collect();

        // Guilds que nos expulsaron mientras el bot estaba apagado
        let dropped = self.scheduler.drop_absent(&present).await;
        if dropped > 0 {
            info!("🧹 {} colas de guilds abandonadas descartadas", dropped);
        }

        for &guild_id in &present {
            self.register_commands(&ctx, guild_id).await;
            self.scheduler.ensure_guild(guild_id).await;
        }

        self.scheduler.resume_all().await;

        tokio::spawn(presence::rotate_presence(ctx));
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        self.scheduler.ensure_guild(guild.id).await;

        // En el arranque `ready` ya registró los comandos
        if is_new == Some(true) {
            info!("🏠 Añadido a la guild {} ({})", guild.name, guild.id);
            self.register_commands(&ctx, guild.id).await;
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una caída de Discord no significa que nos hayan expulsado
        if incomplete.unavailable {
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }

        info!("🚪 Eliminado de la guild {}", incomplete.id);
        self.scheduler.drop_guild(incomplete.id).await;
        self.notifier.forget_guild(incomplete.id);

        if self.is_connected(incomplete.id) {
            if let Err(e) = self.leave_voice_channel(incomplete.id).await {
                warn!("No se pudo cerrar la llamada de {}: {:?}", incomplete.id, e);
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Stops playback and empties the queue when the bot is disconnected
    /// from voice (kicked, moved out, or channel deleted).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.scheduler.clear(guild_id).await;
        }
    }
}
