use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Paths
    pub data_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub tts_config_dir: PathBuf,

    // TTS
    pub default_provider: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            audio_dir: std::env::var("AUDIO_DIR")
                .unwrap_or_else(|_| "audios".to_string())
                .into(),
            tts_config_dir: std::env::var("TTS_CONFIG_DIR")
                .unwrap_or_else(|_| "tts_configs".to_string())
                .into(),

            // TTS
            default_provider: std::env::var("DEFAULT_PROVIDER")
                .unwrap_or_else(|_| "en_us_lessac".to_string()),
        };

        config.validate()?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.audio_dir)?;
        std::fs::create_dir_all(&config.tts_config_dir)?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The Discord token must not be empty
    /// - The default provider must be a plain file stem (no path separators)
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if self.default_provider.trim().is_empty() {
            anyhow::bail!("Default provider must not be empty");
        }

        if self.default_provider.contains(['/', '\\']) {
            anyhow::bail!(
                "Default provider must be a provider name, got: {}",
                self.default_provider
            );
        }

        Ok(())
    }

    /// Documento de la cola TTS persistida
    pub fn queue_file(&self) -> PathBuf {
        self.data_dir.join("tts_queue.json")
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Paths: data={}, audio={}, tts configs={}\n  \
            TTS: default provider {}",
            self.data_dir.display(),
            self.audio_dir.display(),
            self.tts_config_dir.display(),
            self.default_provider,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),

            // Path defaults
            data_dir: "data".into(),
            audio_dir: "audios".into(),
            tts_config_dir: "tts_configs".into(),

            default_provider: "en_us_lessac".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn with_token() -> Config {
        Config {
            discord_token: "token".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_requires_token() {
        assert!(Config::default().validate().is_err());
        assert!(with_token().validate().is_ok());
    }

    #[test]
    fn test_rejects_provider_paths() {
        let config = Config {
            default_provider: "../etc/passwd".to_string(),
            ..with_token()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_file_lives_in_data_dir() {
        let config = Config {
            data_dir: "/srv/neko".into(),
            ..with_token()
        };
        assert_eq!(config.queue_file(), PathBuf::from("/srv/neko/tts_queue.json"));
        assert!(!config.summary().contains("token"));
    }
}
