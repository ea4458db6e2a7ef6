use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, permissions::Permissions},
    prelude::Context,
};
use std::future::Future;
use tracing::warn;

/// Registra los comandos slash en una guild
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

/// Registra los comandos en todas las guilds de la caché; devuelve cuántas tuvieron éxito
pub async fn register_all_guilds(ctx: &Context) -> Result<usize> {
    let guild_ids = ctx.cache.guilds();
    let registered = register_each(&guild_ids, |guild_id| register_guild_commands(ctx, guild_id)).await;

    if registered == 0 && !guild_ids.is_empty() {
        anyhow::bail!("No se pudieron registrar comandos en ninguna guild");
    }
    Ok(registered)
}

/// Una guild que falla no impide registrar el resto
async fn register_each<F, Fut>(guild_ids: &[GuildId], mut register: F) -> usize
where
    F: FnMut(GuildId) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut registered = 0;
    for &guild_id in guild_ids {
        match register(guild_id).await {
            Ok(()) => registered += 1,
            Err(e) => warn!("⚠️ No se pudieron registrar comandos en guild {}: {:?}", guild_id, e),
        }
    }
    registered
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        tts_command(),
        settts_command(),
        providers_command(),
        queue_command(),
        reload_command(),
    ]
}

// Comandos de voz

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Se une a tu canal de voz")
        .default_member_permissions(Permissions::CONNECT)
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave")
        .description("Sale del canal de voz y vacía la cola TTS")
        .default_member_permissions(Permissions::CONNECT)
}

// Comandos TTS

fn tts_command() -> CreateCommand {
    CreateCommand::new("tts")
        .description("Convierte texto a voz y lo reproduce en el canal de voz")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "message", "Texto a convertir")
                .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "provider",
            "Proveedor TTS (opcional, usa tu preferencia si no se indica)",
        ))
        .default_member_permissions(Permissions::CONNECT)
}

fn settts_command() -> CreateCommand {
    CreateCommand::new("settts")
        .description("Define tu proveedor TTS preferido")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "provider",
                "Proveedor TTS a guardar como preferencia",
            )
            .required(true),
        )
        .default_member_permissions(Permissions::CONNECT)
}

fn providers_command() -> CreateCommand {
    CreateCommand::new("providers")
        .description("Lista los proveedores TTS disponibles")
        .default_member_permissions(Permissions::CONNECT)
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra los audios TTS pendientes")
        .default_member_permissions(Permissions::CONNECT)
}

// Administración

fn reload_command() -> CreateCommand {
    CreateCommand::new("reload")
        .description("Recarga proveedores y comandos (solo administradores)")
        .default_member_permissions(Permissions::ADMINISTRATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_names() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|command| serde_json::to_value(command).unwrap()["name"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(
            names,
            vec!["join", "leave", "tts", "settts", "providers", "queue", "reload"]
        );
    }

    #[tokio::test]
    async fn test_register_each_continues_after_failure() {
        let guild_ids = [GuildId::new(1), GuildId::new(2), GuildId::new(3)];
        let mut attempted = Vec::new();

        let registered = register_each(&guild_ids, |guild_id| {
            attempted.push(guild_id);
            async move {
                if guild_id == GuildId::new(2) {
                    anyhow::bail!("sin permisos");
                }
                Ok(())
            }
        })
        .await;

        assert_eq!(registered, 2);
        assert_eq!(attempted, guild_ids.to_vec());
    }

    #[test]
    fn test_reload_is_admin_only() {
        let reload = serde_json::to_value(reload_command()).unwrap();
        assert_eq!(
            reload["default_member_permissions"],
            serde_json::json!(Permissions::ADMINISTRATOR.bits().to_string())
        );
    }
}
