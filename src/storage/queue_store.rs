use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs,
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, info, warn};

use crate::audio::queue::QueueItem;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error de E/S en {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error serializando la cola: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("el escritor de la cola se detuvo")]
    WriterClosed,
}

/// Documento persistido: id de guild → items pendientes (el head incluido).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueDocument {
    guilds: BTreeMap<String, Vec<QueueItem>>,
}

impl QueueDocument {
    /// Itera las guilds con id válido; las claves que no son un snowflake se ignoran.
    pub fn guilds(&self) -> impl Iterator<Item = (GuildId, &[QueueItem])> + '_ {
        self.guilds.iter().filter_map(|(key, items)| match parse_guild_id(key) {
            Some(guild_id) => Some((guild_id, items.as_slice())),
            None => {
                warn!("⚠️ Clave de guild inválida en la cola persistida: {:?}", key);
                None
            }
        })
    }

    #[cfg(test)]
    pub fn get(&self, guild_id: GuildId) -> Option<&[QueueItem]> {
        self.guilds.get(&guild_id.to_string()).map(Vec::as_slice)
    }

    pub fn set(&mut self, guild_id: GuildId, items: Vec<QueueItem>) {
        self.guilds.insert(guild_id.to_string(), items);
    }

    pub fn remove(&mut self, guild_id: GuildId) -> bool {
        self.guilds.remove(&guild_id.to_string()).is_some()
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }
}

fn parse_guild_id(key: &str) -> Option<GuildId> {
    key.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

/// Archivo JSON con las colas de todas las guilds.
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Carga el documento. Un archivo ausente o corrupto equivale a un documento vacío.
    pub async fn load(&self) -> QueueDocument {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📭 Sin cola persistida en {}, empezando vacía", self.path.display());
                return QueueDocument::default();
            }
            Err(e) => {
                warn!("⚠️ No se pudo leer {}: {}, empezando vacía", self.path.display(), e);
                return QueueDocument::default();
            }
        };

        match serde_json::from_str::<QueueDocument>(&content) {
            Ok(document) => {
                info!("📂 Cola restaurada: {} guilds", document.len());
                document
            }
            Err(e) => {
                warn!("⚠️ Cola persistida ilegible ({}), empezando vacía", e);
                QueueDocument::default()
            }
        }
    }

    /// Reemplaza el documento de forma atómica (archivo temporal + rename).
    pub async fn save(&self, document: &QueueDocument) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(document)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })?
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(content).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}

enum WriteRequest {
    Put {
        guild_id: GuildId,
        items: Vec<QueueItem>,
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
    Remove {
        guild_id: GuildId,
        ack: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Escritor único del documento.
///
/// La tarea de fondo mantiene el documento completo en memoria; cada guild
/// envía su lista entera de items y espera la confirmación de escritura, así
/// dos guilds nunca escriben una copia desactualizada de la otra.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::UnboundedSender<WriteRequest>,
}

impl StoreWriter {
    pub fn spawn(store: QueueStore, document: QueueDocument) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(store, document, rx));
        Self { tx }
    }

    /// Persiste los items actuales de una guild
    pub async fn put(&self, guild_id: GuildId, items: Vec<QueueItem>) -> Result<(), StoreError> {
        self.request(|ack| WriteRequest::Put {
            guild_id,
            items,
            ack,
        })
        .await
    }

    /// Elimina la guild del documento
    pub async fn remove(&self, guild_id: GuildId) -> Result<(), StoreError> {
        self.request(|ack| WriteRequest::Remove { guild_id, ack })
            .await
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<(), StoreError>>) -> WriteRequest,
    ) -> Result<(), StoreError> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(build(ack))
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)?
    }
}

async fn run_writer(
    store: QueueStore,
    mut document: QueueDocument,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
) {
    while let Some(request) = rx.recv().await {
        let ack = match request {
            WriteRequest::Put {
                guild_id,
                items,
                ack,
            } => {
                document.set(guild_id, items);
                ack
            }
            WriteRequest::Remove { guild_id, ack } => {
                document.remove(guild_id);
                ack
            }
        };

        let result = store.save(&document).await;
        if let Err(e) = &result {
            error!("💾 No se pudo guardar la cola: {}", e);
        }
        let _ = ack.send(result);
    }

    debug!("Escritor de cola detenido");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn item(path: &str) -> QueueItem {
        QueueItem::new(path, "en_us_lessac")
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let temp_dir = tempdir().unwrap();
        let store = QueueStore::new(temp_dir.path().join("tts_queue.json"));

        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tts_queue.json");
        std::fs::write(&path, "{ esto no es json").unwrap();

        assert!(QueueStore::new(&path).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = tempdir().unwrap();
        let store = QueueStore::new(temp_dir.path().join("nested/tts_queue.json"));
        let guild = GuildId::new(42);

        let mut document = QueueDocument::default();
        document.set(guild, vec![item("a.wav"), item("b.wav")]);
        store.save(&document).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded, document);
        assert_eq!(loaded.get(guild), Some(&[item("a.wav"), item("b.wav")][..]));
    }

    #[tokio::test]
    async fn test_document_file_format() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tts_queue.json");
        std::fs::write(
            &path,
            r#"{ "123": [ { "audioPath": "audios/a.wav", "provider": "x" } ], "not-a-guild": [] }"#,
        )
        .unwrap();

        let document = QueueStore::new(&path).load().await;
        let guilds: Vec<_> = document.guilds().collect();
        assert_eq!(guilds.len(), 1);
        assert_eq!(guilds[0].0, GuildId::new(123));
        assert_eq!(guilds[0].1, &[QueueItem::new("audios/a.wav", "x")][..]);
    }

    #[tokio::test]
    async fn test_writer_keeps_every_guild() {
        let temp_dir = tempdir().unwrap();
        let store = QueueStore::new(temp_dir.path().join("tts_queue.json"));
        let mut initial = QueueDocument::default();
        initial.set(GuildId::new(1), vec![item("old.wav")]);

        let writer = StoreWriter::spawn(store.clone(), initial);
        let (a, b) = tokio::join!(
            writer.put(GuildId::new(2), vec![item("a.wav")]),
            writer.put(GuildId::new(3), vec![item("b.wav")]),
        );
        a.unwrap();
        b.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get(GuildId::new(1)), Some(&[item("old.wav")][..]));

        writer.remove(GuildId::new(1)).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded.get(GuildId::new(1)), None);
        assert_eq!(loaded.get(GuildId::new(3)), Some(&[item("b.wav")][..]));
    }

    #[tokio::test]
    async fn test_writer_reports_save_failure() {
        let temp_dir = tempdir().unwrap();
        // El destino es un directorio: el rename final falla
        let blocked = temp_dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), b"x").unwrap();

        let writer = StoreWriter::spawn(QueueStore::new(&blocked), QueueDocument::default());
        let result = writer.put(GuildId::new(1), vec![item("a.wav")]).await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }
}
