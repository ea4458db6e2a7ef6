//! # TTS Module
//!
//! Text-to-speech providers and synthesis.
//!
//! Each provider is a JSON file in the TTS config directory; the file stem is
//! the provider name used by `/tts` and `/settts`:
//!
//! ```json
//! {
//!   "provider": "en_us",
//!   "voice": "en_US-lessac-medium",
//!   "language": "English (United States)",
//!   "pythonPath": "python-portable/bin/python3",
//!   "modelPath": "piper/models/en_US-lessac-medium.onnx",
//!   "configPath": "piper/models/en_US-lessac-medium.onnx.json"
//! }
//! ```
//!
//! Synthesis is delegated to piper ([`piper::PiperSynthesizer`]), which writes
//! a WAV artifact that the playback queue later consumes and deletes.

pub mod piper;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

pub use piper::PiperSynthesizer;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("proveedor TTS desconocido: {0}")]
    UnknownProvider(String),
    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
    #[error("piper terminó con código {0:?}")]
    Exit(Option<i32>),
}

/// Configuración de un proveedor piper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_python")]
    pub python_path: PathBuf,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub config_path: Option<PathBuf>,
}

fn default_voice() -> String {
    "en_US-lessac-medium".to_string()
}

fn default_python() -> PathBuf {
    PathBuf::from("python3")
}

impl ProviderConfig {
    /// Modelo ONNX; por defecto `./piper/models/<voice>.onnx`
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("./piper/models/{}.onnx", self.voice)))
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or("Unknown Language")
    }
}

/// Proveedores cargados desde el directorio de configuración.
pub struct ProviderRegistry {
    config_dir: PathBuf,
    providers: RwLock<BTreeMap<String, ProviderConfig>>,
}

impl ProviderRegistry {
    pub async fn load(config_dir: impl Into<PathBuf>) -> Result<Self, TtsError> {
        let registry = Self {
            config_dir: config_dir.into(),
            providers: RwLock::new(BTreeMap::new()),
        };
        registry.reload().await?;
        Ok(registry)
    }

    /// Vuelve a leer el directorio y reemplaza los proveedores cargados
    pub async fn reload(&self) -> Result<usize, TtsError> {
        let providers = read_configs(&self.config_dir).await?;
        let count = providers.len();
        *self.providers.write() = providers;

        info!("🗣️ {} proveedores TTS cargados desde {}", count, self.config_dir.display());
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<ProviderConfig> {
        self.providers.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<ProviderConfig, TtsError> {
        self.get(name)
            .ok_or_else(|| TtsError::UnknownProvider(name.to_string()))
    }

    /// Busca un proveedor sin distinguir mayúsculas y devuelve su nombre canónico
    pub fn find_ignore_case(&self, input: &str) -> Option<String> {
        let wanted = input.trim().to_lowercase();
        self.providers
            .read()
            .keys()
            .find(|name| name.to_lowercase() == wanted)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Pares (nombre, idioma) para `/providers`
    pub fn describe(&self) -> Vec<(String, String)> {
        self.providers
            .read()
            .iter()
            .map(|(name, config)| (name.clone(), config.language().to_string()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

async fn read_configs(config_dir: &Path) -> Result<BTreeMap<String, ProviderConfig>, TtsError> {
    fs::create_dir_all(config_dir).await?;

    let mut providers = BTreeMap::new();
    let mut entries = fs::read_dir(config_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
            continue;
        };

        let content = fs::read_to_string(&path).await?;
        match serde_json::from_str::<ProviderConfig>(&content) {
            Ok(config) => {
                debug!("Proveedor TTS cargado: {}", name);
                providers.insert(name.to_string(), config);
            }
            Err(e) => {
                warn!("⚠️ Error parseando configuración TTS {}: {}", path.display(), e);
            }
        }
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const LESSAC: &str = r#"{
        "provider": "en_us",
        "voice": "en_US-lessac-medium",
        "language": "English (United States)",
        "pythonPath": "/opt/python/bin/python3",
        "modelPath": "piper/models/en_US-lessac-medium.onnx"
    }"#;

    #[tokio::test]
    async fn test_load_skips_invalid_and_foreign_files() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("en_us_lessac.json"), LESSAC).unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{ nope").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = ProviderRegistry::load(temp_dir.path()).await.unwrap();

        assert_eq!(registry.names(), vec!["en_us_lessac".to_string()]);
        let config = registry.get("en_us_lessac").unwrap();
        assert_eq!(config.python_path, PathBuf::from("/opt/python/bin/python3"));
        assert_eq!(config.model_path(), PathBuf::from("piper/models/en_US-lessac-medium.onnx"));
        assert_eq!(
            registry.describe(),
            vec![("en_us_lessac".to_string(), "English (United States)".to_string())]
        );
    }

    #[tokio::test]
    async fn test_defaults_for_missing_fields() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(temp_dir.path().join("minimal.json"), r#"{ "voice": "de_DE-thorsten-medium" }"#)
            .unwrap();

        let registry = ProviderRegistry::load(temp_dir.path()).await.unwrap();
        let config = registry.require("minimal").unwrap();

        assert_eq!(config.python_path, PathBuf::from("python3"));
        assert_eq!(config.model_path(), PathBuf::from("./piper/models/de_DE-thorsten-medium.onnx"));
        assert_eq!(config.language(), "Unknown Language");
        assert!(matches!(registry.require("nope"), Err(TtsError::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn test_find_ignore_case_and_reload() {
        let temp_dir = tempdir().unwrap();
        let registry = ProviderRegistry::load(temp_dir.path().join("configs")).await.unwrap();
        assert!(registry.is_empty());

        std::fs::write(temp_dir.path().join("configs/En_US_Lessac.json"), LESSAC).unwrap();
        assert_eq!(registry.reload().await.unwrap(), 1);

        assert_eq!(registry.find_ignore_case("en_us_lessac"), Some("En_US_Lessac".to_string()));
        assert_eq!(registry.find_ignore_case("fr_fr"), None);
    }
}
