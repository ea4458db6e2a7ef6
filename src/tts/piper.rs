use async_process::{Command, Stdio};
use chrono::Utc;
use futures::io::AsyncWriteExt;
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::fs;
use tracing::{debug, error, info};

use super::{ProviderConfig, TtsError};

/// Sintetiza texto con `python -m piper`, escribiendo un WAV por petición.
pub struct PiperSynthesizer {
    audio_dir: PathBuf,
    sequence: AtomicU64,
}

impl PiperSynthesizer {
    pub async fn new(audio_dir: PathBuf) -> Result<Self, TtsError> {
        fs::create_dir_all(&audio_dir).await?;

        Ok(Self {
            audio_dir,
            sequence: AtomicU64::new(0),
        })
    }

    /// Ruta única para el próximo artefacto del proveedor
    pub fn output_path(&self, provider: &str) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.audio_dir.join(format!(
            "output_{}_{}_{}.wav",
            provider,
            Utc::now().timestamp_millis(),
            seq
        ))
    }

    /// Genera el audio y devuelve la ruta del artefacto
    pub async fn synthesize(
        &self,
        text: &str,
        provider: &str,
        config: &ProviderConfig,
    ) -> Result<PathBuf, TtsError> {
        let output = self.output_path(provider);
        let model = config.model_path();

        debug!(
            "🎙️ piper: {} --model {} --output_file {}",
            config.python_path.display(),
            model.display(),
            output.display()
        );

        let mut child = Command::new(&config.python_path)
            .arg("-m")
            .arg("piper")
            .arg("--model")
            .arg(&model)
            .arg("--output_file")
            .arg(&output)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(format!("{}\n", text).as_bytes()).await?;
            stdin.close().await?;
        }

        let status = child.status().await?;
        if !status.success() {
            error!("❌ piper terminó con {:?} para el proveedor {}", status.code(), provider);
            let _ = fs::remove_file(&output).await;
            return Err(TtsError::Exit(status.code()));
        }

        info!("🎙️ Audio generado con {}: {}", provider, output.display());
        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    /// Intérprete falso: `$6` es la ruta de `--output_file`
    fn fake_python(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("fake-python");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(python: PathBuf) -> ProviderConfig {
        ProviderConfig {
            provider: None,
            voice: "en_US-lessac-medium".to_string(),
            language: None,
            python_path: python,
            model_path: None,
            config_path: None,
        }
    }

    #[tokio::test]
    async fn test_synthesize_writes_artifact() {
        let temp_dir = tempdir().unwrap();
        let python = fake_python(temp_dir.path(), r#"cat > "$6""#);
        let synth = PiperSynthesizer::new(temp_dir.path().join("audios")).await.unwrap();

        let output = synth
            .synthesize("hola mundo", "en_us_lessac", &config(python))
            .await
            .unwrap();

        assert!(output.starts_with(temp_dir.path().join("audios")));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "hola mundo\n");
    }

    #[tokio::test]
    async fn test_synthesize_reports_exit_code() {
        let temp_dir = tempdir().unwrap();
        let python = fake_python(temp_dir.path(), "cat > /dev/null; exit 3");
        let synth = PiperSynthesizer::new(temp_dir.path().join("audios")).await.unwrap();

        let result = synth.synthesize("hola", "x", &config(python)).await;
        assert!(matches!(result, Err(TtsError::Exit(Some(3)))));
    }

    #[tokio::test]
    async fn test_output_paths_are_unique() {
        let temp_dir = tempdir().unwrap();
        let synth = PiperSynthesizer::new(temp_dir.path().to_path_buf()).await.unwrap();

        let a = synth.output_path("x");
        let b = synth.output_path("x");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("output_x_"));
    }
}
