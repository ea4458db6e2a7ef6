use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    player::{Playback, PlaybackOutcome, PlayerError, SinkProvider},
    queue::{GuildQueue, QueueItem},
};
use crate::storage::{QueueDocument, StoreWriter};

/// Mensajes de estado para quien pidió el audio. Los fallos de envío se tragan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, guild_id: GuildId, message: &str);
}

/// Planificador de reproducción por guild.
///
/// Cada guild tiene su propia sección crítica (un `Mutex` asíncrono dentro del
/// mapa); no existe un lock global. Mientras se sostiene el lock de una guild
/// se muta la cola, se persiste y, si corresponde, se arranca el siguiente
/// reproductor, de modo que nunca hay dos reproductores activos en la misma
/// guild y el documento persistido refleja la cola antes de devolver el control.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    guilds: DashMap<GuildId, Arc<Mutex<GuildQueue>>>,
    store: StoreWriter,
    sinks: Arc<dyn SinkProvider>,
    notifier: Arc<dyn Notifier>,
    next_playback_id: AtomicU64,
}

impl Scheduler {
    pub fn new(store: StoreWriter, sinks: Arc<dyn SinkProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                guilds: DashMap::new(),
                store,
                sinks,
                notifier,
                next_playback_id: AtomicU64::new(1),
            }),
        }
    }

    /// Siembra las colas desde el documento cargado al arrancar. Todas quedan en Idle.
    pub fn restore(&self, document: &QueueDocument) {
        let mut restored = 0;
        for (guild_id, items) in document.guilds() {
            if !items.is_empty() {
                info!("♻️ Guild {}: {} items pendientes de la sesión anterior", guild_id, items.len());
            }
            self.inner.guilds.insert(
                guild_id,
                Arc::new(Mutex::new(GuildQueue::restored(items.to_vec()))),
            );
            restored += 1;
        }
        info!("📂 {} colas restauradas", restored);
    }

    /// Agrega un item a la cola de la guild y arranca la reproducción si estaba en Idle.
    ///
    /// Devuelve la posición en la que quedó el item (0 = se reproduce ahora).
    pub async fn enqueue(&self, guild_id: GuildId, item: QueueItem) -> usize {
        let mut queue = self.lock_guild(guild_id).await;
        let position = queue.push(item);
        self.persist(guild_id, &queue).await;

        if !queue.is_playing() {
            self.advance(guild_id, &mut queue).await;
        }

        position
    }

    /// Procesa el resultado del reproductor `playback_id`.
    ///
    /// Un resultado que no corresponde al reproductor activo (guild eliminada,
    /// cola limpiada o resultado duplicado) se ignora.
    pub async fn on_player_outcome(&self, guild_id: GuildId, playback_id: u64, outcome: PlaybackOutcome) {
        let Some(mut queue) = self.lock_existing(guild_id).await else {
            debug!("Resultado para guild {} ya eliminada, ignorado", guild_id);
            return;
        };

        let Some(finished) = queue.finish(playback_id) else {
            return;
        };

        match &outcome {
            PlaybackOutcome::Completed => {
                info!("✅ Terminado {} en guild {}", finished.audio_path.display(), guild_id);
            }
            PlaybackOutcome::Failed(reason) => {
                error!("❌ Falló {} en guild {}: {}", finished.audio_path.display(), guild_id, reason);
                self.inner
                    .notifier
                    .notify(guild_id, &failure_message(reason))
                    .await;
            }
        }

        remove_artifact(&finished.audio_path).await;
        self.persist(guild_id, &queue).await;
        self.advance(guild_id, &mut queue).await;
    }

    /// La guild dejó de servirse: cancela el reproductor, descarta la cola y la quita del documento.
    pub async fn drop_guild(&self, guild_id: GuildId) {
        match self.lock_existing(guild_id).await {
            Some(mut queue) => {
                queue.retire();
                let discarded = self.discard(&mut queue).await;
                if let Err(e) = self.inner.store.remove(guild_id).await {
                    warn!("⚠️ No se pudo quitar la guild {} del documento: {}", guild_id, e);
                }
                self.inner.guilds.remove(&guild_id);
                info!("🗑️ Guild {} eliminada ({} items descartados)", guild_id, discarded);
            }
            None => {
                if let Err(e) = self.inner.store.remove(guild_id).await {
                    warn!("⚠️ No se pudo quitar la guild {} del documento: {}", guild_id, e);
                }
            }
        }
    }

    /// Detiene la reproducción y vacía la cola, conservando la guild.
    pub async fn clear(&self, guild_id: GuildId) -> usize {
        let Some(mut queue) = self.lock_existing(guild_id).await else {
            return 0;
        };

        let discarded = self.discard(&mut queue).await;
        self.persist(guild_id, &queue).await;

        info!("⏹️ Cola de guild {} limpiada: {} items descartados", guild_id, discarded);
        discarded
    }

    /// Registra una guild recién observada con la cola vacía.
    pub async fn ensure_guild(&self, guild_id: GuildId) {
        let queue = self.lock_guild(guild_id).await;
        self.persist(guild_id, &queue).await;
    }

    /// Arranca una guild en Idle que tiene items pendientes.
    pub async fn resume(&self, guild_id: GuildId) {
        let Some(mut queue) = self.lock_existing(guild_id).await else {
            return;
        };

        if !queue.is_playing() && !queue.is_empty() {
            info!("▶️ Reanudando {} items en guild {}", queue.len(), guild_id);
            self.advance(guild_id, &mut queue).await;
        }
    }

    /// Reanuda las guilds con items pendientes que ya tienen conexión de voz.
    ///
    /// Las que no la tienen conservan sus items hasta el próximo `/join`.
    pub async fn resume_all(&self) {
        for guild_id in self.guild_ids() {
            if self.inner.sinks.sink(guild_id).await.is_none() {
                debug!("Guild {} sin conexión de voz, esperando /join", guild_id);
                continue;
            }
            self.resume(guild_id).await;
        }
    }

    /// Elimina las guilds conocidas que ya no están en `present`
    /// (p. ej. el bot fue expulsado mientras estaba apagado).
    pub async fn drop_absent(&self, present: &[GuildId]) -> usize {
        let absent: Vec<GuildId> = self
            .guild_ids()
            .into_iter()
            .filter(|guild_id| !present.contains(guild_id))
            .collect();

        for guild_id in &absent {
            info!("🧹 Guild {} ya no está disponible, descartando su cola", guild_id);
            self.drop_guild(*guild_id).await;
        }
        absent.len()
    }

    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.inner.guilds.iter().map(|entry| *entry.key()).collect()
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        match self.lock_existing(guild_id).await {
            Some(queue) => queue.is_playing(),
            None => false,
        }
    }

    /// Items pendientes de la guild, el head incluido
    pub async fn pending(&self, guild_id: GuildId) -> Vec<QueueItem> {
        match self.lock_existing(guild_id).await {
            Some(queue) => queue.snapshot(),
            None => Vec::new(),
        }
    }

    // Funciones privadas

    /// Única función de transición: arranca el head o, si no se puede, lo
    /// descarta y prueba con el siguiente hasta que la cola queda vacía.
    async fn advance(&self, guild_id: GuildId, queue: &mut GuildQueue) {
        while let Some(head) = queue.head().cloned() {
            match self.start(guild_id, &head).await {
                Ok(playback) => {
                    let playback_id = self.inner.next_playback_id.fetch_add(1, Ordering::Relaxed);
                    queue.attach(playback_id, playback.control);
                    self.watch(guild_id, playback_id, playback.outcome);

                    info!(
                        "🔊 Reproduciendo {} en guild {} (playback {})",
                        head.audio_path.display(),
                        guild_id,
                        playback_id
                    );
                    self.inner
                        .notifier
                        .notify(guild_id, &format!("🔊 Reproduciendo TTS con {}.", head.provider))
                        .await;
                    return;
                }
                Err(e) => {
                    warn!("⏭️ Saltando {} en guild {}: {}", head.audio_path.display(), guild_id, e);
                    self.inner
                        .notifier
                        .notify(guild_id, &failure_message(&e.to_string()))
                        .await;

                    queue.skip_head();
                    remove_artifact(&head.audio_path).await;
                    self.persist(guild_id, queue).await;
                }
            }
        }

        debug!("📭 Cola vacía en guild {}", guild_id);
    }

    async fn start(&self, guild_id: GuildId, item: &QueueItem) -> Result<Playback, PlayerError> {
        if !artifact_exists(&item.audio_path).await {
            return Err(PlayerError::MissingArtifact(item.audio_path.clone()));
        }

        let sink = self
            .inner
            .sinks
            .sink(guild_id)
            .await
            .ok_or(PlayerError::NoSink)?;

        sink.play(&item.audio_path).await
    }

    fn watch(&self, guild_id: GuildId, playback_id: u64, outcome: oneshot::Receiver<PlaybackOutcome>) {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let outcome = outcome.await.unwrap_or_else(|_| {
                PlaybackOutcome::Failed("el reproductor terminó sin informar resultado".to_string())
            });
            scheduler.on_player_outcome(guild_id, playback_id, outcome).await;
        });
    }

    async fn discard(&self, queue: &mut GuildQueue) -> usize {
        if let Some(control) = queue.detach() {
            control.cancel();
        }

        let items = queue.drain();
        for item in &items {
            remove_artifact(&item.audio_path).await;
        }
        items.len()
    }

    async fn persist(&self, guild_id: GuildId, queue: &GuildQueue) {
        if let Err(e) = self.inner.store.put(guild_id, queue.snapshot()).await {
            warn!("⚠️ Cola de guild {} sólo en memoria: {}", guild_id, e);
        }
    }

    /// Bloquea la cola de la guild, creándola si no existe
    async fn lock_guild(&self, guild_id: GuildId) -> OwnedMutexGuard<GuildQueue> {
        loop {
            let queue = self
                .inner
                .guilds
                .entry(guild_id)
                .or_insert_with(|| Arc::new(Mutex::new(GuildQueue::new())))
                .clone();

            let guard = queue.lock_owned().await;
            if !guard.is_retired() {
                return guard;
            }
        }
    }

    /// Bloquea la cola de la guild sólo si existe
    async fn lock_existing(&self, guild_id: GuildId) -> Option<OwnedMutexGuard<GuildQueue>> {
        loop {
            let queue = self.inner.guilds.get(&guild_id).map(|entry| entry.value().clone())?;

            let guard = queue.lock_owned().await;
            if !guard.is_retired() {
                return Some(guard);
            }
        }
    }
}

fn failure_message(reason: &str) -> String {
    format!("❌ No se pudo reproducir el audio TTS: {}", reason)
}

async fn artifact_exists(path: &Path) -> bool {
    !path.as_os_str().is_empty() && tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Borrado best-effort del artefacto consumido
async fn remove_artifact(path: &Path) {
    if path.as_os_str().is_empty() {
        return;
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("🗑️ Artefacto eliminado: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("No se pudo eliminar {}: {}", path.display(), e),
    }
}
