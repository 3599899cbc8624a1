//! # Audio Module
//!
//! Per-guild playback core.
//!
//! Each guild gets one [`player::GuildPlayer`] that owns a FIFO
//! [`queue::PlaybackQueue`] and a run-loop that plays items strictly one
//! after the other through a [`sink::VoiceSink`]. The
//! [`registry::PlayerRegistry`] guarantees at most one player per guild.
//!
//! ## Architecture
//!
//! ### [`queue`] - Playback Queue
//! - Unbounded, single consumer, many producers
//! - Streams are opened lazily, right before an item plays
//!
//! ### [`player`] - Guild Player
//! - `Idle` -> `Playing` -> `Idle` ... -> `Destroyed`
//! - Idle timeout tears the player down and unregisters it
//! - Stream failures are reported and skipped, sink failures tear down
//!
//! ### [`signal`] - Completion Signal
//! - Fired from whatever thread the audio library uses
//! - Carries why playback ended (`Finished`, `Stopped`, `Failed`)
//!
//! ### [`songbird_sink`] - Songbird Voice Sink
//! - [`sink::VoiceSink`] over a songbird `Call`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guildtune::audio::{player::PlayerSettings, registry::PlayerRegistry};
//! use guildtune::audio::songbird_sink::SongbirdSink;
//!
//! let registry: PlayerRegistry<SongbirdSink> = PlayerRegistry::new(PlayerSettings::default());
//! // registry.enqueue(guild_id, item, || PlayerContext { sink, notifier });
//! // registry.skip(guild_id);
//! // registry.stop_and_teardown(guild_id).await;
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod signal;
pub mod sink;
pub mod songbird_sink;

#[cfg(test)]
pub(crate) mod testing;
