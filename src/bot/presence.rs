use serenity::all::{ActivityData, Context, OnlineStatus};
use std::time::Duration;
use tracing::debug;

const ROTATION_INTERVAL: Duration = Duration::from_secs(10);

/// Mensajes de estado; el último queda fijo con el número de usuarios servidos
pub fn presence_messages(users: u64) -> Vec<String> {
    let noun = if users == 1 { "User" } else { "Users" };

    vec![
        "/tts || RAWR! || IM A BIG CUTIE".to_string(),
        "/tts || Neko TTS BOT || MY MASTER NEKOSUNEVR IS A CUTIE!".to_string(),
        "/tts || Neko TTS BOT || NOTICE ME SENPAI!! UWU".to_string(),
        format!("/tts || NEKO BOT || Serving: {} {}", users, noun),
    ]
}

/// Suma de miembros de las guilds en caché
pub fn served_users(ctx: &Context) -> u64 {
    ctx.cache
        .guilds()
        .into_iter()
        .filter_map(|guild_id| ctx.cache.guild(guild_id).map(|guild| guild.member_count))
        .sum()
}

/// Recorre los mensajes una vez, cada 10 s, con estado "No molestar"
pub async fn rotate_presence(ctx: Context) {
    let messages = presence_messages(served_users(&ctx));
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);

    for message in messages {
        interval.tick().await;
        debug!("💬 Presencia: {}", message);
        ctx.set_presence(Some(ActivityData::watching(message)), OnlineStatus::DoNotDisturb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_last_message_counts_users() {
        let messages = presence_messages(42);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3], "/tts || NEKO BOT || Serving: 42 Users");
        assert_eq!(presence_messages(1)[3], "/tts || NEKO BOT || Serving: 1 User");
    }
}
