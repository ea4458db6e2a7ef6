use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, path::PathBuf};
use tracing::{debug, info};

use super::player::PlaybackControl;

/// Una petición de reproducción pendiente: el artefacto WAV generado y el proveedor que lo sintetizó.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub audio_path: PathBuf,
    pub provider: String,
}

impl QueueItem {
    pub fn new(audio_path: impl Into<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            audio_path: audio_path.into(),
            provider: provider.into(),
        }
    }
}

/// Estado de reproducción de una guild.
pub enum PlaybackState {
    Idle,
    Playing {
        playback_id: u64,
        control: Box<dyn PlaybackControl>,
    },
}

impl std::fmt::Debug for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Playing { playback_id, .. } => {
                write!(f, "Playing({})", playback_id)
            }
        }
    }
}

/// Cola FIFO de una guild.
///
/// El elemento en reproducción sigue siendo `items[0]` hasta que su intento
/// termina; sólo [`GuildQueue::finish`] y [`GuildQueue::skip_head`] lo retiran.
#[derive(Debug)]
pub struct GuildQueue {
    items: VecDeque<QueueItem>,
    state: PlaybackState,
    retired: bool,
}

impl GuildQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
            state: PlaybackState::Idle,
            retired: false,
        }
    }

    /// Reconstruye una cola persistida, siempre en Idle.
    pub fn restored(items: Vec<QueueItem>) -> Self {
        Self {
            items: items.into(),
            state: PlaybackState::Idle,
            retired: false,
        }
    }

    /// Agrega un item al final y devuelve su posición
    pub fn push(&mut self, item: QueueItem) -> usize {
        info!("➕ Agregado a la cola: {}", item.audio_path.display());
        self.items.push_back(item);
        self.items.len() - 1
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Idle → Playing con el head actual.
    pub fn attach(&mut self, playback_id: u64, control: Box<dyn PlaybackControl>) {
        debug_assert!(!self.is_playing(), "ya hay un reproductor activo");
        debug_assert!(!self.items.is_empty(), "no hay head que reproducir");
        self.state = PlaybackState::Playing {
            playback_id,
            control,
        };
    }

    /// Cierra el intento `playback_id` y retira el head.
    ///
    /// Devuelve `None` si `playback_id` no corresponde al reproductor activo
    /// (resultado obsoleto o duplicado); la cola no cambia en ese caso.
    pub fn finish(&mut self, playback_id: u64) -> Option<QueueItem> {
        match self.state {
            PlaybackState::Playing {
                playback_id: active,
                ..
            } if active == playback_id => {
                self.state = PlaybackState::Idle;
                self.items.pop_front()
            }
            _ => {
                debug!("Resultado obsoleto ignorado (playback {})", playback_id);
                None
            }
        }
    }

    /// Descarta el head sin haberlo reproducido (archivo ausente, sin sink, error al iniciar)
    pub fn skip_head(&mut self) -> Option<QueueItem> {
        if self.is_playing() {
            return None;
        }
        self.items.pop_front()
    }

    /// Playing → Idle sin tocar los items, devolviendo el control para cancelarlo.
    pub fn detach(&mut self) -> Option<Box<dyn PlaybackControl>> {
        match std::mem::replace(&mut self.state, PlaybackState::Idle) {
            PlaybackState::Playing { control, .. } => Some(control),
            PlaybackState::Idle => None,
        }
    }

    /// Vacía la cola
    pub fn drain(&mut self) -> Vec<QueueItem> {
        self.items.drain(..).collect()
    }

    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items.iter().cloned().collect()
    }

    /// Marca la cola como retirada: la guild ya no se sirve.
    pub fn retire(&mut self) {
        self.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

impl Default for GuildQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    struct FlagControl(Arc<AtomicBool>);

    impl PlaybackControl for FlagControl {
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn control() -> (Box<dyn PlaybackControl>, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Box::new(FlagControl(flag.clone())), flag)
    }

    #[test]
    fn test_push_keeps_fifo_order() {
        let mut queue = GuildQueue::new();
        assert_eq!(queue.push(QueueItem::new("a.wav", "x")), 0);
        assert_eq!(queue.push(QueueItem::new("b.wav", "x")), 1);

        assert_eq!(queue.head(), Some(&QueueItem::new("a.wav", "x")));
        assert_eq!(
            queue.snapshot(),
            vec![QueueItem::new("a.wav", "x"), QueueItem::new("b.wav", "x")]
        );
    }

    #[test]
    fn test_head_stays_until_finished() {
        let mut queue = GuildQueue::restored(vec![
            QueueItem::new("a.wav", "x"),
            QueueItem::new("b.wav", "x"),
        ]);
        let (ctrl, _) = control();
        queue.attach(7, ctrl);

        assert!(queue.is_playing());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.skip_head(), None);

        assert_eq!(queue.finish(7), Some(QueueItem::new("a.wav", "x")));
        assert!(!queue.is_playing());
        assert_eq!(queue.head(), Some(&QueueItem::new("b.wav", "x")));
    }

    #[test]
    fn test_stale_playback_id_is_ignored() {
        let mut queue = GuildQueue::restored(vec![QueueItem::new("a.wav", "x")]);
        let (ctrl, _) = control();
        queue.attach(2, ctrl);

        assert_eq!(queue.finish(1), None);
        assert!(queue.is_playing());
        assert_eq!(queue.len(), 1);

        // Un segundo resultado del mismo intento tampoco retira nada
        assert!(queue.finish(2).is_some());
        assert_eq!(queue.finish(2), None);
    }

    #[test]
    fn test_detach_returns_control_and_keeps_items() {
        let mut queue = GuildQueue::restored(vec![QueueItem::new("a.wav", "x")]);
        let (ctrl, cancelled) = control();
        queue.attach(1, ctrl);

        let ctrl = queue.detach().expect("había un reproductor");
        ctrl.cancel();
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(!queue.is_playing());
        assert_eq!(queue.len(), 1);
        assert!(queue.detach().is_none());
    }

    #[test]
    fn test_restored_queue_starts_idle() {
        let queue = GuildQueue::restored(vec![QueueItem::new("a.wav", "x")]);
        assert!(!queue.is_playing());
        assert!(!queue.is_retired());
    }

    #[test]
    fn test_item_json_shape() {
        let json = serde_json::to_value(QueueItem::new("audios/a.wav", "en_us_lessac")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "audioPath": "audios/a.wav", "provider": "en_us_lessac" })
        );
    }
}
