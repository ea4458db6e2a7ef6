//! # Audio Module
//!
//! Per-guild TTS playback queue for neko-tts.
//!
//! TTS requests arrive one per `/tts` command and must be spoken in the
//! guild's voice connection exactly once, in submission order, never two at
//! the same time, and survive a restart of the bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Guild Queue
//! - Ordered pending items for one guild plus its playing state
//! - The head item stays in place until its playback attempt ends
//!
//! ### [`player`] - Voice Output
//! - [`player::VoiceSink`] plays one artifact and reports exactly one outcome
//! - Songbird backend built on `Call::play_only_input` and track events
//!
//! ### [`scheduler`] - Scheduler
//! - Owns every guild queue behind its own async mutex
//! - Starts the next item when a playback ends and persists after every change
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use neko_tts::audio::{queue::QueueItem, scheduler::Scheduler};
//! use serenity::all::GuildId;
//!
//! # async fn example(scheduler: Scheduler) {
//! let guild_id = GuildId::new(123456789);
//! let position = scheduler
//!     .enqueue(guild_id, QueueItem::new("audios/output_en_us_1.wav", "en_us"))
//!     .await;
//! println!("posición en la cola: {}", position);
//! # }
//! ```

pub mod player;
pub mod queue;
pub mod scheduler;
