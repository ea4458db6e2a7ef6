use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info};

use crate::{audio::queue::QueueItem, bot::TtsBot};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &TtsBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "tts" => handle_tts(ctx, &command, bot, guild_id).await?,
        "settts" => handle_settts(ctx, &command, bot, guild_id).await?,
        "providers" => handle_providers(ctx, &command, bot).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "reload" => handle_reload(ctx, &command, bot, guild_id).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TtsBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(voice_channel_id) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ ¡No estás en un canal de voz!", true).await;
    };

    bot.join_voice_channel(guild_id, voice_channel_id).await?;
    bot.notifier.remember_channel(guild_id, command.channel_id);

    reply(ctx, command, &format!("🔊 Conectado a <#{}>", voice_channel_id), false).await?;

    // Audios que quedaron pendientes (p. ej. tras un reinicio)
    bot.scheduler.resume(guild_id).await;

    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TtsBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.is_connected(guild_id) {
        return reply(ctx, command, "❌ ¡No estoy en un canal de voz!", true).await;
    }

    let discarded = bot.scheduler.clear(guild_id).await;
    bot.leave_voice_channel(guild_id).await?;

    let content = if discarded > 0 {
        format!("👋 Desconectado del canal de voz ({} audios descartados)", discarded)
    } else {
        "👋 Desconectado del canal de voz".to_string()
    };
    reply(ctx, command, &content, false).await
}

async fn handle_tts(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TtsBot,
    guild_id: GuildId,
) -> Result<()> {
    let text = string_option(command, "message")
        .ok_or_else(|| anyhow::anyhow!("Mensaje no proporcionado"))?;

    let provider = {
        let prefs = bot.prefs.lock().await;
        resolve_provider(
            string_option(command, "provider"),
            prefs.provider_for(guild_id, command.user.id),
            &bot.config.default_provider,
        )
    };

    let Some(provider_config) = bot.providers.get(&provider) else {
        let content = format!(
            "❌ Proveedor desconocido: **{}**\nDisponibles: {}",
            provider,
            bot.providers.names().join(", ")
        );
        return reply(ctx, command, &content, true).await;
    };

    if !bot.is_connected(guild_id) {
        return reply(ctx, command, "❌ ¡No estoy en un canal de voz! Usa /join primero.", true)
            .await;
    }

    // piper puede tardar varios segundos
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let audio_path = match bot.synthesizer.synthesize(text, &provider, &provider_config).await {
        Ok(path) => path,
        Err(e) => {
            error!("❌ Error generando TTS con {}: {}", provider, e);
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().content("❌ No se pudo generar el audio TTS."),
                )
                .await?;
            return Ok(());
        }
    };

    bot.notifier.remember_channel(guild_id, command.channel_id);
    let position = bot
        .scheduler
        .enqueue(guild_id, QueueItem::new(audio_path, provider.clone()))
        .await;

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().content(queued_message(&provider, position)),
        )
        .await?;

    Ok(())
}

async fn handle_settts(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TtsBot,
    guild_id: GuildId,
) -> Result<()> {
    let input = string_option(command, "provider")
        .ok_or_else(|| anyhow::anyhow!("Proveedor no proporcionado"))?;

    let Some(provider) = bot.providers.find_ignore_case(input) else {
        let content = format!(
            "❌ Proveedor desconocido: **{}**\nDisponibles: {}",
            input,
            bot.providers.names().join(", ")
        );
        return reply(ctx, command, &content, true).await;
    };

    bot.prefs
        .lock()
        .await
        .set_provider(guild_id, command.user.id, &provider)
        .await?;

    reply(ctx, command, &format!("✅ Tu proveedor TTS ahora es **{}**.", provider), false).await
}

async fn handle_providers(ctx: &Context, command: &CommandInteraction, bot: &TtsBot) -> Result<()> {
    let providers = bot.providers.describe();

    let content = if providers.is_empty() {
        "No hay proveedores TTS configurados.".to_string()
    } else {
        format!("Proveedores TTS disponibles: {}", format_providers(&providers))
    };

    reply(ctx, command, &content, false).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TtsBot,
    guild_id: GuildId,
) -> Result<()> {
    let pending = bot.scheduler.pending(guild_id).await;
    let playing = bot.scheduler.is_playing(guild_id).await;

    reply(ctx, command, &format_queue(&pending, playing), true).await
}

async fn handle_reload(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &TtsBot,
    guild_id: GuildId,
) -> Result<()> {
    let is_admin = command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.administrator());

    if !is_admin {
        return reply(
            ctx,
            command,
            "❌ Necesitas permisos de Administrador para usar este comando.",
            true,
        )
        .await;
    }

    let reloaded = async {
        let count = bot.providers.reload().await?;
        let guilds = super::commands::register_all_guilds(ctx).await?;
        anyhow::Ok((count, guilds))
    }
    .await;

    match reloaded {
        Ok((count, guilds)) => {
            info!("🔄 /reload en guild {}: {} guilds actualizadas", guild_id, guilds);
            let content = format!(
                "🔄 Comandos recargados en {} servidores ({} proveedores TTS).",
                guilds, count
            );
            reply(ctx, command, &content, false).await
        }
        Err(e) => {
            error!("Error recargando comandos: {:?}", e);
            reply(ctx, command, "❌ No se pudieron recargar los comandos.", true).await
        }
    }
}

// Funciones auxiliares

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);

    channel_id
}

/// Opción del comando, luego la preferencia del usuario y por último el proveedor por defecto
fn resolve_provider(option: Option<&str>, preference: Option<&str>, default: &str) -> String {
    option
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or(preference)
        .unwrap_or(default)
        .to_string()
}

/// `position` es 0 cuando el audio se reproduce de inmediato
fn queued_message(provider: &str, position: usize) -> String {
    if position == 0 {
        format!("🎙️ Audio generado con {}.", provider)
    } else {
        format!("🎙️ Audio generado con {}. En cola, posición {}.", provider, position + 1)
    }
}

fn format_providers(providers: &[(String, String)]) -> String {
    providers
        .iter()
        .map(|(name, language)| format!("{} ({})", name, language))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_queue(pending: &[QueueItem], playing: bool) -> String {
    if pending.is_empty() {
        return "📭 La cola TTS está vacía.".to_string();
    }

    let mut lines = vec![format!("📋 **{} audios en cola**", pending.len())];
    for (index, item) in pending.iter().enumerate() {
        let marker = if index == 0 && playing { "🔊" } else { "⏳" };
        lines.push(format!("{} {}. {}", marker, index + 1, item.provider));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_provider_precedence() {
        assert_eq!(resolve_provider(Some("es_es"), Some("en_gb"), "en_us"), "es_es");
        assert_eq!(resolve_provider(None, Some("en_gb"), "en_us"), "en_gb");
        assert_eq!(resolve_provider(None, None, "en_us"), "en_us");
        assert_eq!(resolve_provider(Some("  "), None, "en_us"), "en_us");
    }

    #[test]
    fn test_queued_message_mentions_position() {
        assert_eq!(queued_message("en_us", 0), "🎙️ Audio generado con en_us.");
        assert_eq!(
            queued_message("en_us", 2),
            "🎙️ Audio generado con en_us. En cola, posición 3."
        );
    }

    #[test]
    fn test_format_providers() {
        let providers = vec![
            ("en_us".to_string(), "English (United States)".to_string()),
            ("es_es".to_string(), "Unknown Language".to_string()),
        ];
        assert_eq!(
            format_providers(&providers),
            "en_us (English (United States)), es_es (Unknown Language)"
        );
    }

    #[test]
    fn test_format_queue() {
        assert_eq!(format_queue(&[], false), "📭 La cola TTS está vacía.");

        let pending = vec![QueueItem::new("a.wav", "en_us"), QueueItem::new("b.wav", "es_es")];
        assert_eq!(
            format_queue(&pending, true),
            "📋 **2 audios en cola**\n🔊 1. en_us\n⏳ 2. es_es"
        );
    }
}
