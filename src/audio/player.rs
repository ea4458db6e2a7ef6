use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    input::File as FileInput,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, warn};

/// Resultado terminal de una reproducción. Se emite exactamente uno por `play`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("el artefacto de audio no existe: {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("la guild no tiene conexión de voz")]
    NoSink,
    #[error("la llamada de voz no está conectada")]
    NotConnected,
    #[error("error al controlar la pista: {0}")]
    Track(String),
}

/// Control sobre una reproducción en curso.
pub trait PlaybackControl: Send + Sync {
    /// Detiene la reproducción. Llamarlo más de una vez no tiene efecto.
    fn cancel(&self);
}

/// Reproducción iniciada: el control para cancelarla y el canal por el que llegará su resultado.
pub struct Playback {
    pub outcome: oneshot::Receiver<PlaybackOutcome>,
    pub control: Box<dyn PlaybackControl>,
}

impl Playback {
    pub fn new(outcome: oneshot::Receiver<PlaybackOutcome>, control: Box<dyn PlaybackControl>) -> Self {
        Self { outcome, control }
    }
}

/// Destino de audio de una guild.
///
/// Cada llamada a `play` crea un reproductor nuevo; nunca se reutiliza uno
/// que ya emitió su resultado. Si la salida no está disponible, `play` debe
/// fallar de inmediato en lugar de quedarse esperando.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn play(&self, audio_path: &Path) -> Result<Playback, PlayerError>;
}

/// Búsqueda del sink activo de una guild.
#[async_trait]
pub trait SinkProvider: Send + Sync {
    async fn sink(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceSink>>;
}

/// Sinks respaldados por las llamadas de songbird.
pub struct SongbirdSinks {
    manager: Arc<Songbird>,
}

impl SongbirdSinks {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl SinkProvider for SongbirdSinks {
    async fn sink(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceSink>> {
        self.manager
            .get(guild_id)
            .map(|call| Arc::new(SongbirdSink::new(call)) as Arc<dyn VoiceSink>)
    }
}

pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
}

impl SongbirdSink {
    pub fn new(call: Arc<Mutex<Call>>) -> Self {
        Self { call }
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn play(&self, audio_path: &Path) -> Result<Playback, PlayerError> {
        let mut call = self.call.lock().await;

        if call.current_connection().is_none() {
            return Err(PlayerError::NotConnected);
        }

        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(SyncMutex::new(Some(tx)));

        // play_only_input detiene cualquier otra pista de la llamada
        let input = FileInput::new(audio_path.to_path_buf());
        let track_handle = call.play_only_input(input.into());

        for event in [TrackEvent::Error, TrackEvent::End] {
            let reporter = OutcomeReporter {
                slot: slot.clone(),
                event,
            };
            if let Err(e) = track_handle.add_event(Event::Track(event), reporter) {
                let _ = track_handle.stop();
                return Err(PlayerError::Track(e.to_string()));
            }
        }

        debug!("▶️ Pista iniciada: {}", audio_path.display());
        Ok(Playback::new(rx, Box::new(track_handle)))
    }
}

impl PlaybackControl for TrackHandle {
    fn cancel(&self) {
        if let Err(e) = self.stop() {
            debug!("La pista ya estaba detenida: {:?}", e);
        }
    }
}

/// Traduce los eventos de fin/error de la pista en un único resultado.
struct OutcomeReporter {
    slot: Arc<SyncMutex<Option<oneshot::Sender<PlaybackOutcome>>>>,
    event: TrackEvent,
}

#[async_trait]
impl VoiceEventHandler for OutcomeReporter {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match self.event {
            TrackEvent::Error => {
                let mut reason = String::from("error desconocido en la pista");
                if let EventContext::Track(track_list) = ctx {
                    for (state, _handle) in *track_list {
                        if let PlayMode::Errored(e) = &state.playing {
                            reason = format!("{:?}", e);
                        }
                    }
                }
                error!("❌ Error en pista TTS: {}", reason);
                PlaybackOutcome::Failed(reason)
            }
            _ => PlaybackOutcome::Completed,
        };

        if let Some(tx) = self.slot.lock().take() {
            if tx.send(outcome).is_err() {
                warn!("Nadie esperaba el resultado de la pista");
            }
        }

        None
    }
}
