use anyhow::Result;
use serenity::model::id::{GuildId, UserId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

const USER_PREFS_FILE: &str = "user_prefs.json";

/// Preferencias de proveedor TTS por usuario, almacenadas en JSON
///
/// Las claves tienen la forma `"<guild_id>:<user_id>"`.
pub struct JsonStorage {
    data_dir: PathBuf,
    prefs_cache: BTreeMap<String, String>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        // Crear directorio de datos si no existe
        fs::create_dir_all(&data_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            prefs_cache: BTreeMap::new(),
        };

        storage.load_prefs().await?;

        Ok(storage)
    }

    /// Proveedor preferido de un usuario en una guild
    pub fn provider_for(&self, guild_id: GuildId, user_id: UserId) -> Option<&str> {
        self.prefs_cache
            .get(&pref_key(guild_id, user_id))
            .map(String::as_str)
    }

    /// Guarda el proveedor preferido de un usuario
    pub async fn set_provider(
        &mut self,
        guild_id: GuildId,
        user_id: UserId,
        provider: &str,
    ) -> Result<()> {
        self.prefs_cache
            .insert(pref_key(guild_id, user_id), provider.to_string());
        self.save_prefs().await?;

        info!("💾 Preferencia guardada: {}:{} → {}", guild_id, user_id, provider);
        Ok(())
    }

    // Métodos privados

    async fn load_prefs(&mut self) -> Result<()> {
        let file_path = self.prefs_path();

        match fs::read_to_string(&file_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(prefs) => {
                    self.prefs_cache = prefs;
                    info!("📂 Cargadas {} preferencias de usuario", self.prefs_cache.len());
                }
                Err(e) => {
                    warn!("Preferencias ilegibles en {}: {}", file_path.display(), e);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.save_prefs().await?;
                info!("📝 Archivo de preferencias vacío creado");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    async fn save_prefs(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.prefs_cache)?;
        fs::write(self.prefs_path(), content).await?;
        Ok(())
    }

    fn prefs_path(&self) -> PathBuf {
        self.data_dir.join(USER_PREFS_FILE)
    }
}

fn pref_key(guild_id: GuildId, user_id: UserId) -> String {
    format!("{}:{}", guild_id, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_creates_empty_prefs_file() {
        let temp_dir = tempdir().unwrap();
        let storage = JsonStorage::new(temp_dir.path().to_path_buf()).await.unwrap();

        assert!(temp_dir.path().join(USER_PREFS_FILE).exists());
        assert_eq!(storage.provider_for(GuildId::new(1), UserId::new(2)), None);
    }

    #[tokio::test]
    async fn test_preference_survives_reload() {
        let temp_dir = tempdir().unwrap();
        let mut storage = JsonStorage::new(temp_dir.path().to_path_buf()).await.unwrap();
        storage
            .set_provider(GuildId::new(1), UserId::new(2), "de_thorsten")
            .await
            .unwrap();

        let reloaded = JsonStorage::new(temp_dir.path().to_path_buf()).await.unwrap();
        assert_eq!(
            reloaded.provider_for(GuildId::new(1), UserId::new(2)),
            Some("de_thorsten")
        );
        // Las preferencias son por guild
        assert_eq!(reloaded.provider_for(GuildId::new(9), UserId::new(2)), None);

        let raw = std::fs::read_to_string(temp_dir.path().join(USER_PREFS_FILE)).unwrap();
        assert!(raw.contains("\"1:2\""));
    }
}
